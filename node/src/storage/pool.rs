// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bounded SQLite connection pool.
//!
//! Permits bound concurrency, the idle list keeps opened connections. Work
//! runs on the blocking pool since rusqlite is synchronous. A checked-out
//! connection is returned by [`PooledConnection`]'s `Drop`, so error returns
//! and panics inside the closure release it as well.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::{JournalError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

/// Connection on loan from the pool.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if std::thread::panicking() {
                // Possibly mid-transaction; let rusqlite close it.
                return;
            }
            self.pool.idle.lock().push(conn);
        }
    }
}

impl ConnectionPool {
    pub fn new(path: impl AsRef<Path>, size: usize) -> Arc<Self> {
        Arc::new(Self {
            path: path.as_ref().to_path_buf(),
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size.max(1))),
            size: size.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| JournalError::transient(format!("open {}", self.path.display()), e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| JournalError::storage("configure connection", e))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| JournalError::storage("configure connection", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| JournalError::storage("configure connection", e))?;
        Ok(conn)
    }

    fn checkout(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> Result<PooledConnection> {
        let existing = self.idle.lock().pop();
        let conn = match existing {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Runs `op` on a pooled connection off the async executor.
    pub async fn run<F, T>(self: &Arc<Self>, context: String, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| JournalError::transient(context.clone(), "connection pool closed"))?;
        let pool = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.checkout(permit)?;
            op(&mut conn)
        })
        .await
        .map_err(|e| JournalError::transient(context, format!("blocking task failed: {}", e)))?
    }

    /// Stops handing out connections and closes idle ones.
    pub fn close(&self) {
        self.permits.close();
        self.idle.lock().clear();
    }
}
