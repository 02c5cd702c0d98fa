use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
mod repositories;

pub use repositories::health_readings::HealthReading;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Close,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;

    migrations::run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

/// Owns the connection for its whole life. Reports readiness once, then
/// serves jobs in arrival order until closed or every sender is gone.
fn worker_loop(path: PathBuf, ready: mpsc::Sender<Result<()>>, inbox: mpsc::Receiver<Message>) {
    let mut conn = match open_connection(&path) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    for message in inbox {
        match message {
            Message::Run(job) => job(&mut conn),
            Message::Close => break,
        }
    }
    info!("Database worker for {} exiting", path.display());
}

struct Worker {
    inbox: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        if self.inbox.send(Message::Close).is_err() {
            error!("Database worker already gone at shutdown");
        }
        if let Err(panic) = handle.join() {
            error!("Database worker panicked: {panic:?}");
        }
    }
}

/// SQLite session index. Every statement runs on one dedicated thread;
/// callers hand it closures and wait for the reply, either async or blocking.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (inbox_tx, inbox_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_path = path.clone();
        let thread = thread::Builder::new()
            .name("plantwatch-db".into())
            .spawn(move || worker_loop(worker_path, ready_tx, inbox_rx))
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before it was ready")??;
        info!("Session database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                inbox: inbox_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn submit<F, T>(&self, task: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });
        self.worker
            .inbox
            .send(Message::Run(job))
            .map_err(|_| anyhow!("database worker is not running"))?;
        Ok(reply_rx)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }

    /// Same as `execute` for callers on a blocking thread. Must not be called
    /// from inside an async task.
    pub fn execute_blocking<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?
            .blocking_recv()
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_open_is_reported_by_new() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        assert!(Database::new(dir.path().to_path_buf()).is_err());
    }

    #[tokio::test]
    async fn jobs_run_on_the_worker_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("plantwatch.sqlite3")).unwrap();
        assert!(db.path().ends_with("plantwatch.sqlite3"));

        let fk: i64 = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }
}
