//! Creates the first admin account.
//!
//! Reads `DATABASE_URL`, `ADMIN_USERNAME` (default `admin`), `ADMIN_EMAIL`
//! and `ADMIN_PASSWORD`. Does nothing when an admin already exists.

use anyhow::Context;
use blogsphere::{db_helpers::create_admin_in_db, init_db, init_tracing, RegisterRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let request = RegisterRequest {
        username: Some(std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_owned())),
        email: Some(std::env::var("ADMIN_EMAIL").context("ADMIN_EMAIL must be set")?),
        password: Some(std::env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD must be set")?),
    };
    let admin = request.validate()?;

    let pool = init_db(&database_url).await?;
    let created = create_admin_in_db(&pool, admin).await;
    pool.close().await;

    match created? {
        Some(admin) => tracing::info!(
            user_id = admin.id,
            username = %admin.username,
            email = %admin.email,
            "admin user created"
        ),
        None => tracing::info!("admin user already exists, nothing to do"),
    }
    Ok(())
}
