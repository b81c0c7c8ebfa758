use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn describe(&self) -> String {
        match self {
            Location::File(path) => path.display().to_string(),
            Location::Memory => ":memory:".to_string(),
        }
    }
}

/// Owns the worker. Dropping the last handle closes the queue; the worker
/// drains what is already queued and exits.
struct Worker {
    queue: Option<mpsc::Sender<DbTask>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(thread) = self.thread.take() {
            if let Err(join_err) = thread.join() {
                error!("Database worker panicked: {join_err:?}");
            }
        }
    }
}

/// SQLite handle for the session store. A single connection lives on the
/// `studyfocus-db` thread; callers queue closures and await their result.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        Self::spawn(Location::File(db_path))
    }

    /// Private database that disappears with the last handle.
    pub fn in_memory() -> Result<Self> {
        Self::spawn(Location::Memory)
    }

    /// File backing the database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    fn spawn(location: Location) -> Result<Self> {
        let (queue, tasks) = mpsc::channel::<DbTask>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path = match &location {
            Location::File(path) => Some(Arc::new(path.clone())),
            Location::Memory => None,
        };
        let described = location.describe();

        let thread = thread::Builder::new()
            .name("studyfocus-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&location) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                for task in tasks {
                    task(&mut conn);
                }
                info!("Database worker for {} stopped", location.describe());
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;
        info!("Session database ready at {described}");

        Ok(Self {
            worker: Arc::new(Worker {
                queue: Some(queue),
                thread: Some(thread),
            }),
            path,
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let queue = self
            .worker
            .queue
            .as_ref()
            .ok_or_else(|| anyhow!("database worker is shutting down"))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        queue
            .send(Box::new(move |conn| {
                // The caller may have given up waiting; the work still ran.
                let _ = reply_tx.send(task(conn));
            }))
            .map_err(|_| anyhow!("database worker is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

fn open_connection(location: &Location) -> Result<Connection> {
    let mut conn = match location {
        Location::File(path) => Connection::open(path)
            .with_context(|| format!("failed to open SQLite database {}", path.display()))?,
        Location::Memory => {
            Connection::open_in_memory().context("failed to open in-memory SQLite database")?
        }
    };

    conn.busy_timeout(BUSY_TIMEOUT)?;
    if let Location::File(_) = location {
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}
