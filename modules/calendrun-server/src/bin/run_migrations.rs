//! Applies the read model schema and exits.
//!
//! The schema is embedded at compile time. Run before the server when the
//! database should be prepared ahead of a deploy.

use calendrun_readmodel::ReadModel;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;

    println!("Running database migrations...");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    ReadModel::new(pool).migrate().await?;

    println!("Migrations completed successfully.");

    Ok(())
}
