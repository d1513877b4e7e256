use std::sync::Arc;

use anyhow::{bail, Context, Result};
use calendrun_common::{AppConfig, EventKey};
use calendrun_projector::{DispatchRegistry, EventSource, ProjectionEngine, UnitOutcome};
use calendrun_readmodel::ReadModel;
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use flowcore_client::{FlowcoreClient, TimeBucket};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "calendrun-replay",
    about = "Replay a range of hourly buckets through the projection handlers"
)]
struct Cli {
    /// First bucket to replay, as YYYYMMDDHH0000 or an RFC 3339 timestamp.
    /// Defaults to 30 days ago.
    #[arg(long)]
    from: Option<String>,

    /// Last bucket to replay (inclusive). Defaults to the current hour.
    #[arg(long)]
    to: Option<String>,

    /// Only replay event types of this flow.
    #[arg(long)]
    flow: Option<String>,

    /// Only replay this event type.
    #[arg(long)]
    event_type: Option<String>,

    /// Fetch and count events without applying them.
    #[arg(long)]
    dry_run: bool,
}

fn parse_bucket(raw: &str) -> Result<TimeBucket> {
    if let Ok(bucket) = TimeBucket::parse(raw) {
        return Ok(bucket);
    }
    let at = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("{raw:?} is neither YYYYMMDDHH0000 nor RFC 3339"))?;
    Ok(TimeBucket::from_datetime(at.with_timezone(&Utc)))
}

/// Resolve the inclusive bucket range, oldest first.
fn bucket_range(cli: &Cli, now: DateTime<Utc>) -> Result<Vec<TimeBucket>> {
    let from = match cli.from.as_deref() {
        Some(raw) => parse_bucket(raw)?,
        None => TimeBucket::from_datetime(now - Duration::days(DEFAULT_LOOKBACK_DAYS)),
    };
    let to = match cli.to.as_deref() {
        Some(raw) => parse_bucket(raw)?,
        None => TimeBucket::current(now),
    };
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    Ok(TimeBucket::range(&from, &to))
}

#[derive(Debug, Default)]
struct ReplayTotals {
    events: usize,
    failed: usize,
    abandoned_units: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calendrun=info".parse()?))
        .init();

    let cli = Cli::parse();
    let buckets = bucket_range(&cli, Utc::now())?;

    let config = AppConfig::from_env()?;

    let pool_options = sqlx::postgres::PgPoolOptions::new().max_connections(4);
    let read_model = if cli.dry_run {
        // Handlers are never invoked, so the database is never touched.
        ReadModel::new(pool_options.connect_lazy(&config.database_url)?)
    } else {
        let read_model = ReadModel::new(
            pool_options
                .connect(&config.database_url)
                .await
                .context("Failed to connect to database")?,
        );
        read_model.migrate().await?;
        read_model
    };

    let registry = DispatchRegistry::calendrun(read_model)
        .filtered(cli.flow.as_deref(), cli.event_type.as_deref());
    if registry.is_empty() {
        bail!(
            "no registered handlers match flow={:?} event_type={:?}",
            cli.flow,
            cli.event_type
        );
    }
    let keys: Vec<EventKey> = registry.keys().cloned().collect();

    let client = FlowcoreClient::new(config.flowcore());
    client
        .data_core_id()
        .await
        .context("Failed to resolve data core")?;
    let source: Arc<dyn EventSource> = Arc::new(client);
    let mut engine = ProjectionEngine::new(source, Arc::new(registry), config.page_size);

    tracing::info!(
        from = %buckets[0],
        to = %buckets[buckets.len() - 1],
        buckets = buckets.len(),
        pairs = keys.len(),
        dry_run = cli.dry_run,
        "Starting replay"
    );

    let mut totals = ReplayTotals::default();
    for bucket in &buckets {
        for key in &keys {
            if cli.dry_run {
                match engine.count_unit(key, bucket).await {
                    Ok(0) => {}
                    Ok(n) => {
                        tracing::info!(flow = %key.flow_type, event_type = %key.event_type, bucket = %bucket, events = n, "Would replay");
                        totals.events += n;
                    }
                    Err(e) => {
                        tracing::warn!(flow = %key.flow_type, event_type = %key.event_type, bucket = %bucket, error = %e, "Count failed");
                        totals.abandoned_units += 1;
                    }
                }
                continue;
            }

            let report = engine.process_unit(key, bucket).await;
            totals.events += report.processed;
            totals.failed += report.failed;
            if matches!(report.outcome, UnitOutcome::Abandoned(_)) {
                totals.abandoned_units += 1;
            }
        }
    }

    tracing::info!(
        events = totals.events,
        failed = totals.failed,
        abandoned_units = totals.abandoned_units,
        dry_run = cli.dry_run,
        "Replay complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("calendrun-replay").chain(args.iter().copied())).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 14, 25, 0).unwrap()
    }

    #[test]
    fn accepts_bucket_keys_and_timestamps() {
        assert_eq!(parse_bucket("20250310090000").unwrap().as_str(), "20250310090000");
        assert_eq!(
            parse_bucket("2025-03-10T09:45:00+02:00").unwrap().as_str(),
            "20250310070000"
        );
        assert!(parse_bucket("yesterday").is_err());
    }

    #[test]
    fn explicit_range_is_inclusive() {
        let args = cli(&["--from", "20250310090000", "--to", "20250310110000"]);
        let buckets = bucket_range(&args, now()).unwrap();
        let keys: Vec<&str> = buckets.iter().map(TimeBucket::as_str).collect();
        assert_eq!(keys, vec!["20250310090000", "20250310100000", "20250310110000"]);
    }

    #[test]
    fn default_range_spans_thirty_days_to_now() {
        let buckets = bucket_range(&cli(&[]), now()).unwrap();
        assert_eq!(buckets.first().unwrap().as_str(), "20250208140000");
        assert_eq!(buckets.last().unwrap().as_str(), "20250310140000");
        assert_eq!(buckets.len(), 30 * 24 + 1);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let args = cli(&["--from", "20250310110000", "--to", "20250310090000"]);
        assert!(bucket_range(&args, now()).is_err());
    }

    #[test]
    fn filters_and_dry_run_parse() {
        let args = cli(&["--flow", "run.0", "--event-type", "run.logged.0", "--dry-run"]);
        assert_eq!(args.flow.as_deref(), Some("run.0"));
        assert_eq!(args.event_type.as_deref(), Some("run.logged.0"));
        assert!(args.dry_run);
    }
}
