use chrono::Utc;
use clap::{Parser, Subcommand};
use edgit_core::{EdgitConfig, ObjectId, ObjectType, StoredObject, Tier};
use edgit_storage::tiering_manager::{
    AccessTracker, DecayOptions, MigratorBackend, SchedulerState, TierMigrationScheduler,
    TierMigrator,
};
use edgit_storage::{ControlPlaneStore, MemoryTierStorage, SqliteControlPlane};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "edgit-tierd")]
#[command(about = "Tier migration daemon for the edgit object store", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the standard search path)
    #[arg(long, env = "EDGIT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the background migration scheduler until Ctrl-C
    Run {
        /// Seed the hot tier with this many synthetic blobs
        #[arg(long, default_value_t = 0)]
        seed: usize,
    },

    /// Show scheduler state, pending alarm and active policy
    Status,

    /// Show recent migrations, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Pause scheduled migrations
    Pause {
        #[arg(long, default_value = "paused by operator")]
        reason: String,
    },

    /// Resume scheduled migrations and run a cycle right away
    Resume,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EdgitConfig::from_file(path)?,
        None => EdgitConfig::load()?,
    };
    let control = Arc::new(SqliteControlPlane::connect(&config.control_plane.database_url).await?);

    match cli.command {
        Commands::Run { seed } => run(config, control, seed).await,

        Commands::Status => {
            let state = control.load_state().await?.unwrap_or_default();
            let policy = control
                .load_policy()
                .await?
                .unwrap_or_else(|| config.migration.clone());

            print_state(&state);
            match control.get_alarm().await? {
                Some(at) => println!("  Next alarm: {}", at.to_rfc3339()),
                None => println!("  Next alarm: none"),
            }
            println!("\nPolicy:");
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }

        Commands::History { limit, offset } => {
            let entries = control.list_history(limit, offset).await?;
            if entries.is_empty() {
                println!("No migrations recorded");
            }
            for entry in entries {
                println!(
                    "{}  {}  {} -> {}  {}{}",
                    entry.timestamp.to_rfc3339(),
                    entry.sha,
                    entry.source_tier,
                    entry.target_tier,
                    entry.state,
                    entry
                        .error
                        .map(|e| format!("  ({e})"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }

        Commands::Pause { reason } => {
            let mut state = control.load_state().await?.unwrap_or_default();
            state.paused = true;
            state.pause_reason = Some(reason.clone());
            control.save_state(&state).await?;
            control.delete_alarm().await?;

            tracing::info!(reason = %reason, "Migration paused");
            println!("⏸  Migration paused: {reason}");
            Ok(())
        }

        Commands::Resume => {
            let mut state = control.load_state().await?.unwrap_or_default();
            state.paused = false;
            state.pause_reason = None;
            state.consecutive_failures = 0;
            let now = Utc::now();
            state.next_migration_at = Some(now);
            control.save_state(&state).await?;
            control.set_alarm(now).await?;

            tracing::info!("Migration resumed");
            println!("▶  Migration resumed");
            Ok(())
        }
    }
}

async fn run(
    config: EdgitConfig,
    control: Arc<SqliteControlPlane>,
    seed: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = MemoryTierStorage::shared();
    for n in 0..seed {
        let sha = ObjectId::parse(&format!("{n:040x}"))?;
        storage.seed(Tier::Hot, StoredObject::new(sha, ObjectType::Blob, vec![0u8; 1024]));
    }

    let tracker = Arc::new(AccessTracker::new(storage.clone(), control.clone()));
    tracker.load_from_storage().await?;

    let migrator = Arc::new(TierMigrator::new(storage.clone()));
    let backend = Arc::new(MigratorBackend::new(
        storage.clone(),
        migrator,
        Arc::clone(&tracker),
    ));

    let mut scheduler =
        TierMigrationScheduler::new(backend, control.clone(), config.migration.clone())?;
    scheduler.initialize().await?;
    scheduler.start_worker();

    let decay = DecayOptions::from(&config.access_tracking);
    let decay_interval = config.access_tracking.decay_interval();
    let decay_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(decay_interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = tracker.apply_decay(decay).await {
                tracing::error!(error = %e, "Access decay failed");
            }
        }
    });

    tracing::info!(
        database = %config.control_plane.database_url,
        seeded = seed,
        "edgit-tierd running"
    );
    tokio::signal::ctrl_c().await?;

    decay_task.abort();
    scheduler.shutdown().await?;
    print_state(&scheduler.get_state());
    Ok(())
}

fn print_state(state: &SchedulerState) {
    println!("Scheduler:");
    println!(
        "  Paused: {}{}",
        state.paused,
        state
            .pause_reason
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default()
    );
    println!("  Consecutive failures: {}", state.consecutive_failures);
    println!("  Total migrated: {}", state.total_migrated);
    println!("  Total bytes migrated: {}", state.total_bytes_migrated);
    if let Some(at) = state.last_migration_at {
        println!("  Last migration: {}", at.to_rfc3339());
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
