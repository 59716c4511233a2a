use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use kubrik_api::auth::PasswordService;
use kubrik_api::models::NewUser;
use kubrik_api::store::{PgUserStore, StoreError, UserStore};

#[derive(Parser, Debug)]
#[command(
    name = "create_user",
    about = "Create a local Kubrik account that can log in with a password"
)]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Optional username, usable instead of the email at login.
    #[arg(long)]
    username: Option<String>,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = args.email.trim().to_string();
    let username = args
        .username
        .map(|username| username.trim().to_string())
        .filter(|username| !username.is_empty());

    if !email.contains('@') {
        writeln!(io::stderr(), "error: email must contain '@'")?;
        std::process::exit(1);
    }
    if args.password.is_empty() {
        writeln!(io::stderr(), "error: password must not be empty")?;
        std::process::exit(1);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    let store = PgUserStore::new(pool);

    let password_hash = PasswordService::new()?.hash_password(&args.password)?;

    let created = store
        .create_user(NewUser {
            username,
            email: email.clone(),
            password_hash: Some(password_hash),
        })
        .await;

    match created {
        Ok(user) => {
            println!("Created user '{}' with id {}", user.email, user.id);
            Ok(())
        }
        Err(StoreError::Conflict { .. }) => {
            writeln!(
                io::stderr(),
                "error: a user with that email or username already exists."
            )?;
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}
