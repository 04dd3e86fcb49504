//! Walksync CLI
//!
//! Drives the sync engine against a local database and a shared remote, so two
//! databases pointed at the same remote behave like two devices.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use walksync::error::{Result, WalkSyncError};
use walksync::events::ChangeNotifier;
use walksync::storage::{LocalStore, Storage};
#[cfg(feature = "cloud")]
use walksync::sync::S3Remote;
use walksync::sync::{DirRemote, RemoteStore, SyncOrchestrator};
use walksync::types::*;

#[derive(Parser)]
#[command(name = "walksync")]
#[command(about = "Multi-device state sync for walking progress")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(
        long,
        env = "WALKSYNC_DB_PATH",
        default_value = "~/.local/share/walksync/walksync.db"
    )]
    db_path: String,

    /// Remote URI (dir:///path or s3://bucket/prefix)
    #[arg(long, env = "WALKSYNC_REMOTE")]
    remote: Option<String>,

    /// User namespace on the remote
    #[arg(long, env = "WALKSYNC_NAMESPACE", default_value = "walksync-default")]
    namespace: String,

    /// Maximum records per remote write
    #[arg(long, env = "WALKSYNC_MAX_BATCH_SIZE", default_value = "400")]
    max_batch_size: usize,

    /// Delay between push and pull for `sync`, in ms
    #[arg(long, env = "WALKSYNC_FORCE_PULL_DELAY_MS", default_value = "1500")]
    force_pull_delay_ms: u64,

    /// Existence probe timeout in ms
    #[arg(long, env = "WALKSYNC_PROBE_TIMEOUT_MS", default_value = "5000")]
    probe_timeout_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "WALKSYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the last sync outcome
    Status,
    /// Push all local data
    Push,
    /// Pull and merge all remote data
    Pull,
    /// Push, then pull
    Sync,
    /// Check whether the remote already has this user's data
    Probe,
    /// Delete the remote namespace
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Record a step count for a day
    LogSteps {
        /// Day (YYYY-MM-DD)
        day: String,
        /// Steps walked
        steps: u32,
        /// Daily step goal
        #[arg(short, long, default_value = "10000")]
        goal: u32,
    },
    /// Print local data
    Show,
}

fn init_logging(json: bool) {
    // Logs go to stderr; stdout carries command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}

fn default_remote_uri() -> Result<String> {
    let base = dirs::data_dir()
        .ok_or_else(|| WalkSyncError::Config("No data directory; pass --remote".to_string()))?;
    Ok(format!("dir://{}", base.join("walksync").join("remote").display()))
}

async fn open_remote(uri: &str, namespace: &str) -> Result<Arc<dyn RemoteStore>> {
    if uri.starts_with("dir://") {
        return Ok(Arc::new(DirRemote::from_uri(uri, namespace)?));
    }
    #[cfg(feature = "cloud")]
    if uri.starts_with("s3://") {
        return Ok(Arc::new(S3Remote::from_uri(uri, namespace).await?));
    }
    Err(WalkSyncError::Config(format!("Unsupported remote URI: {}", uri)))
}

/// Apply a met goal on `date` to the streak
fn record_goal_met(game: &mut GameState, date: NaiveDate) -> Result<()> {
    let noon = date
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| WalkSyncError::InvalidInput(format!("bad date {}", date)))?;
    let met_at = Utc.from_utc_datetime(&noon);
    let streak = &mut game.streak;

    let previous = streak.last_goal_met_date.map(|d| d.date_naive());
    match previous {
        Some(prev) if prev >= date => return Ok(()),
        Some(prev) if prev + Duration::days(1) == date => {
            streak.current_streak += 1;
        }
        _ => {
            streak.current_streak = 1;
            streak.streak_start_date = Some(met_at);
        }
    }
    streak.last_goal_met_date = Some(met_at);
    streak.consecutive_goal_days += 1;
    streak.longest_streak = streak.longest_streak.max(streak.current_streak);
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    // Expand ~ in path
    let db_path = shellexpand::tilde(&cli.db_path).to_string();

    let notifier = ChangeNotifier::new();
    let storage = Arc::new(Storage::open(&db_path)?.with_notifier(notifier.clone()));

    match cli.command {
        Commands::LogSteps { day, steps, goal } => {
            let date = parse_day_key(&day)?;
            let mut log = storage
                .load::<DailyLog>(&day)?
                .unwrap_or_else(|| DailyLog::new(day.clone()));
            log.steps = log.steps.max(steps);
            log.goal_met = log.goal_met || log.steps >= goal;
            storage.save(&log)?;

            let mut game = storage.load::<GameState>(GAME_STATE_KEY)?.unwrap_or_default();
            if log.goal_met {
                record_goal_met(&mut game, date)?;
            }
            storage.save(&game)?;

            info!(day = %log.day, steps = log.steps, goal_met = log.goal_met, "Steps recorded");
            return print_json(&json!({ "daily_log": log, "streak": game.streak }));
        }
        Commands::Show => {
            let game = storage.load::<GameState>(GAME_STATE_KEY)?;
            let logs: Vec<DailyLog> = storage.load_all()?;
            let walks: Vec<TrackedWalk> = storage.load_all()?;
            return print_json(&json!({
                "game_state": game,
                "daily_logs": logs,
                "tracked_walks": walks.len(),
            }));
        }
        _ => {}
    }

    let uri = match cli.remote {
        Some(uri) => uri,
        None => default_remote_uri()?,
    };
    let remote = open_remote(&uri, &cli.namespace).await?;

    let config = SyncConfig {
        namespace: cli.namespace.clone(),
        max_batch_size: cli.max_batch_size,
        force_pull_delay_ms: cli.force_pull_delay_ms,
        probe_timeout_ms: cli.probe_timeout_ms,
        ..SyncConfig::default()
    };
    let sync = SyncOrchestrator::new(storage.clone(), remote.clone(), notifier, config)?;

    let outcome = match cli.command {
        Commands::Status => {
            let marker = storage.load_sync_marker()?;
            print_json(&json!({
                "remote": remote.describe(),
                "namespace": cli.namespace,
                "last_sync": marker.last_sync,
                "last_error": marker.last_error,
            }))
        }
        Commands::Push => {
            let report = sync.push_all().await?;
            print_json(&json!({
                "written": report.as_ref().map(|r| r.written),
                "chunks": report.as_ref().map(|r| r.chunks),
                "skipped": report.as_ref().map(|r| r.skipped),
            }))
        }
        Commands::Pull => {
            let report = sync.pull_all().await?;
            print_json(&json!({
                "fetched": report.as_ref().map(|r| r.fetched),
                "merged": report.as_ref().map(|r| r.merged),
            }))
        }
        Commands::Sync => {
            sync.force_sync().await?;
            print_json(&json!({ "status": sync.status() }))
        }
        Commands::Probe => {
            let exists = sync.probe().await?;
            print_json(&json!({ "returning_user": exists }))
        }
        Commands::Reset { yes } => {
            if !yes {
                return Err(WalkSyncError::InvalidInput(
                    "Refusing to delete the remote namespace without --yes".to_string(),
                ));
            }
            sync.reset_remote().await?;
            print_json(&json!({ "deleted": remote.describe() }))
        }
        Commands::LogSteps { .. } | Commands::Show => Ok(()),
    };

    // One-shot commands must not leave retry timers behind
    sync.shutdown();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_day_key(s).unwrap()
    }

    #[test]
    fn test_consecutive_days_extend_streak() {
        let mut game = GameState::default();
        record_goal_met(&mut game, date("2026-10-17")).unwrap();
        record_goal_met(&mut game, date("2026-10-18")).unwrap();
        record_goal_met(&mut game, date("2026-10-18")).unwrap();
        assert_eq!(game.streak.current_streak, 2);
        assert_eq!(game.streak.longest_streak, 2);

        record_goal_met(&mut game, date("2026-10-20")).unwrap();
        assert_eq!(game.streak.current_streak, 1);
        assert_eq!(game.streak.longest_streak, 2);
        assert_eq!(
            game.streak.streak_start_date.map(|d| d.date_naive()),
            Some(date("2026-10-20"))
        );
    }
}
