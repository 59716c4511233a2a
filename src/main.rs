#[rocket::launch]
fn rocket() -> _ {
    kubrik_api::rocket()
}
