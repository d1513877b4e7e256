use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReadModelError>;

#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
