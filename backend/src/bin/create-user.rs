//! Create a staff account, e.g. the first super_admin of a fresh install.
//!
//! Usage: create-user --email EMAIL --full-name NAME [--role ROLE]
//!   The password is read from --password or CREATE_USER_PASSWORD.

use anyhow::Context;
use clap::Parser;

use landing_cms_api::{
    db::{
        self,
        accounts::{AccountStore, PgAccountStore},
    },
    models::user::{Account, UserRole},
    services::password::PasswordHasher,
};

#[derive(Parser)]
#[command(name = "create-user", about = "Create a landing CMS staff account")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long)]
    email: String,

    #[arg(long, env = "CREATE_USER_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    full_name: String,

    /// editor, admin or super_admin
    #[arg(long, default_value = "editor")]
    role: UserRole,

    #[arg(long, env = "BCRYPT_COST", default_value_t = 12)]
    bcrypt_cost: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let email = args.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        anyhow::bail!("invalid email address: {}", args.email);
    }
    if !(8..=72).contains(&args.password.len()) {
        anyhow::bail!("password must be between 8 and 72 characters");
    }
    if !(4..=31).contains(&args.bcrypt_cost) {
        anyhow::bail!("BCRYPT_COST must be between 4 and 31");
    }

    let pool = db::create_pool(&args.database_url).await?;
    db::run_migrations(&pool).await?;
    let accounts = PgAccountStore::new(pool);

    if accounts.find_by_email(&email).await?.is_some() {
        anyhow::bail!("an account with email {email} already exists");
    }

    let hash = PasswordHasher::new(args.bcrypt_cost)
        .hash(&args.password)
        .await
        .context("hash password")?;
    let account = Account::new(&email, hash, args.full_name.trim(), args.role);
    accounts.create(&account).await?;

    tracing::info!(user_id = %account.id, %email, role = %account.role, "account created");
    Ok(())
}
