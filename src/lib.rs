pub mod clock;
pub mod db;
pub mod models;
pub mod plan;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod timer;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::Database;
pub use models::{HistoryEntry, Segment, SegmentKind, SessionRecord};
pub use plan::build_plan;
pub use scheduler::{SchedulerError, SegmentManager, TickEvent};
pub use settings::{FocusSettings, SettingsStore};
pub use store::{MemoryStore, SessionStore};
pub use timer::{ControllerConfig, SessionController};

const DEFAULT_USER: &str = "local";

fn data_dir() -> PathBuf {
    std::env::var_os("STUDYFOCUS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".studyfocus"))
}

/// Runs the user's active session (or a new one) in the foreground until it
/// finishes or the process receives Ctrl-C. A segment left waiting (a break
/// with auto-start off) starts when a line arrives on stdin.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("StudyFocus starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let database = Database::new(data_dir.join("studyfocus.sqlite3"))?;
    let user_id = std::env::var("STUDYFOCUS_USER").unwrap_or_else(|_| DEFAULT_USER.to_string());

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let outcome = runtime.block_on(async move {
        let controller = SessionController::open(
            Arc::new(database),
            &user_id,
            settings_store.focus(),
            Arc::new(SystemClock),
            ControllerConfig::from_env(),
        )
        .await?;

        let mut last = controller.start().await?;
        info!(
            "Session {} segment {}/{} ({}) with {}s left",
            last.session_id,
            last.segment_index + 1,
            last.segment_count,
            last.kind.as_str(),
            last.time_left
        );

        let mut poll = tokio::time::interval(Duration::from_secs(1));
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut input_open = true;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; saving session");
                    break;
                }
                line = input.next_line(), if input_open => {
                    match line {
                        Ok(Some(_)) => {
                            let snapshot = controller.snapshot().await;
                            if !snapshot.is_running && !snapshot.is_done {
                                controller.start().await?;
                            }
                        }
                        Ok(None) => input_open = false,
                        Err(err) => {
                            warn!("Ignoring stdin: {err}");
                            input_open = false;
                        }
                    }
                }
                _ = poll.tick() => {}
            }

            let snapshot = controller.snapshot().await;
            if snapshot.is_done {
                info!("Session {} complete", snapshot.session_id);
                break;
            }
            if snapshot.segment_index != last.segment_index {
                info!(
                    "Segment {}/{} ({}) {}",
                    snapshot.segment_index + 1,
                    snapshot.segment_count,
                    snapshot.kind.as_str(),
                    if snapshot.is_running { "running" } else { "waiting; press Enter to start" }
                );
            }
            last = snapshot;
        }

        controller.shutdown().await
    });

    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(500));
    outcome
}
