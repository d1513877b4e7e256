//! Relational read model: projection tables in Postgres.
//!
//! Every write method is a single guarded statement. The guard compares the
//! row's `last_applied_event_id` with the incoming event id, so applying the
//! same event twice leaves the row exactly as the first application did.
//! Write methods return the number of rows the statement touched; zero means
//! the guard (or a missing row) suppressed the write.

pub mod challenges;
pub mod clubs;
pub mod error;
pub mod runs;
pub mod templates;
pub mod users;

pub use challenges::{ChallengeInstanceRow, ChallengePatch, NewChallenge};
pub use clubs::{ClubPatch, ClubRow, MembershipRow, NewClub, NewMembership};
pub use error::{ReadModelError, Result};
pub use runs::{NewRun, PerformanceLogEntry, PerformanceLogFilter, PerformanceLogRow, RunFilter, RunPatch, RunRow};
pub use templates::{NewTemplate, TemplatePatch, TemplateRow};
pub use users::UserRow;

use sqlx::PgPool;
use tracing::{info, warn};

/// Tables dropped by [`ReadModel::reset`], including the migration ledger so
/// the schema is recreated from scratch.
const RESET_TABLES: &[&str] = &[
    "performance_log",
    "performance",
    "club_membership",
    "club",
    "challenge_instance",
    "challenge_template",
    "app_user",
    "_sqlx_migrations",
];

#[derive(Clone)]
pub struct ReadModel {
    pool: PgPool,
}

impl ReadModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing projection tables. Safe against existing data.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Read model schema ready");
        Ok(())
    }

    /// Drop every projection table. Rebuilding relies on a full backlog replay.
    pub async fn reset(&self) -> Result<()> {
        warn!("Dropping read model tables");
        for table in RESET_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
