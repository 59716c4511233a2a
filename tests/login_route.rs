use kubrik_api::auth::JwtService;
use kubrik_api::auth::responses::TokenResponse;
use kubrik_api::error::{ErrorResponse, WWW_AUTHENTICATE};
use kubrik_api::models::NewUser;
use kubrik_api::store::{MemoryUserStore, UserStore};
use kubrik_api::test_support::{
    TestRocketBuilder, memory_auth_state, test_auth_config, test_password_service,
};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use uuid::Uuid;

const PASSWORD: &str = "correct horse battery staple";

async fn seeded_client() -> (Client, MemoryUserStore, Uuid) {
    let store = MemoryUserStore::new();
    let hash = test_password_service()
        .hash_password(PASSWORD)
        .expect("hash password");
    let user = store
        .create_user(NewUser {
            username: Some("alice".into()),
            email: "alice@example.com".into(),
            password_hash: Some(hash),
        })
        .await
        .expect("seed user");

    let client = TestRocketBuilder::new()
        .mount_api_routes()
        .manage_auth_state(memory_auth_state(&store, Vec::new()))
        .async_client()
        .await;
    (client, store, user.id)
}

async fn post_login<'c>(client: &'c Client, body: &str) -> LocalResponse<'c> {
    client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await
}

#[rocket::async_test]
async fn login_with_username_or_email_returns_token_for_user() {
    let (client, _store, user_id) = seeded_client().await;
    let jwt = JwtService::from_config(&test_auth_config()).expect("jwt service");

    for body in [
        format!(r#"{{"username":"alice","password":"{PASSWORD}"}}"#),
        format!(r#"{{"email":"Alice@Example.com","password":"{PASSWORD}"}}"#),
    ] {
        let response = post_login(&client, &body).await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::JSON));

        let token: TokenResponse = response.into_json().await.expect("token body");
        assert_eq!(token.token_type, "bearer");
        let claims = jwt.decode_session_token(&token.token).expect("valid token");
        assert_eq!(claims.sub, user_id);
    }
}

#[rocket::async_test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let (client, _store, _) = seeded_client().await;

    let wrong_password = post_login(&client, r#"{"username":"alice","password":"nope"}"#).await;
    let unknown_user = post_login(&client, r#"{"username":"mallory","password":"nope"}"#).await;

    for response in [&wrong_password, &unknown_user] {
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(
            response.headers().get_one("WWW-Authenticate"),
            Some(WWW_AUTHENTICATE)
        );
    }

    let wrong_password: ErrorResponse = wrong_password.into_json().await.expect("error body");
    let unknown_user: ErrorResponse = unknown_user.into_json().await.expect("error body");
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(wrong_password.http_status, 401);
    assert_eq!(
        wrong_password.errors[0].fields,
        vec!["password", "email", "username"]
    );
}

#[rocket::async_test]
async fn shape_violations_are_unprocessable_with_field_errors() {
    let (client, _store, _) = seeded_client().await;

    let cases: [(&str, Vec<Vec<&str>>); 4] = [
        (
            r#"{"username":"alice","email":"alice@example.com","password":"pw"}"#,
            vec![vec!["username", "email"]],
        ),
        (r#"{"password":"pw"}"#, vec![vec!["username", "email"]]),
        (r#"{"username":"alice"}"#, vec![vec!["password"]]),
        (r#"{}"#, vec![vec!["username", "email"], vec!["password"]]),
    ];

    for (body, expected_fields) in cases {
        let response = post_login(&client, body).await;
        assert_eq!(response.status(), Status::UnprocessableEntity, "{body}");

        let error: ErrorResponse = response.into_json().await.expect("error body");
        assert_eq!(error.http_status, 422);
        let fields: Vec<Vec<String>> = error.errors.into_iter().map(|e| e.fields).collect();
        assert_eq!(fields, expected_fields, "{body}");
    }
}

#[rocket::async_test]
async fn malformed_body_is_bad_request_without_touching_the_store() {
    let (client, store, _) = seeded_client().await;
    store.set_unavailable(true);

    for body in [r#"{"username":"alice","#, r#"{"username":5,"password":"pw"}"#, "not json"] {
        let response = post_login(&client, body).await;
        assert_eq!(response.status(), Status::BadRequest, "{body}");

        let error: ErrorResponse = response.into_json().await.expect("error body");
        assert_eq!(error.http_status, 400);
        assert_eq!(error.message, "Bad request");
    }
}

#[rocket::async_test]
async fn store_outage_is_an_internal_error_with_no_detail() {
    let (client, store, _) = seeded_client().await;
    store.set_unavailable(true);

    let body = format!(r#"{{"username":"alice","password":"{PASSWORD}"}}"#);
    let response = post_login(&client, &body).await;
    assert_eq!(response.status(), Status::InternalServerError);

    let error: ErrorResponse = response.into_json().await.expect("error body");
    assert_eq!(error.message, "Internal server error");
    assert!(error.errors.is_empty());
}
