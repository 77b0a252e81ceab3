// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! SQLite backend
//!
//! # Schema
//! ```sql
//! CREATE TABLE journal_offsets (
//!     ordering       INTEGER PRIMARY KEY AUTOINCREMENT,  -- global offset
//!     persistence_id TEXT    NOT NULL,
//!     sequence_nr    INTEGER NOT NULL,
//!     UNIQUE (persistence_id, sequence_nr)
//! );
//! CREATE TABLE journal_metadata (
//!     persistence_id  TEXT PRIMARY KEY,
//!     max_sequence_nr INTEGER NOT NULL
//! );
//! -- one per routing target: journal, journal_p{n}, journal_p{n}_b{m}
//! CREATE TABLE journal (
//!     ordering       INTEGER PRIMARY KEY,
//!     persistence_id TEXT    NOT NULL,
//!     sequence_nr    INTEGER NOT NULL,
//!     payload        BLOB    NOT NULL,
//!     manifest       TEXT    NOT NULL,
//!     writer_id      TEXT    NOT NULL,
//!     tags           TEXT    NOT NULL,
//!     checksum       INTEGER NOT NULL,
//!     deleted        INTEGER NOT NULL DEFAULT 0,
//!     UNIQUE (persistence_id, sequence_nr)
//! );
//! ```
//!
//! `journal_offsets` allocates offsets inside the write transaction, which
//! keeps offsets unique across every partition table and gives the tracker a
//! single index to probe. Partition tables are created on first write; reads
//! of a table that does not exist yet return an empty page.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rowjournal_kernel::{JournalRow, OrderingOffset, SequenceNr, Target};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use crate::errors::{JournalError, Result};
use crate::storage::pool::ConnectionPool;
use crate::storage::{JournalStorage, OrderingSource, PageQuery, PageSource, RoutedWrite};

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS journal_offsets (
    ordering       INTEGER PRIMARY KEY AUTOINCREMENT,
    persistence_id TEXT    NOT NULL,
    sequence_nr    INTEGER NOT NULL,
    UNIQUE (persistence_id, sequence_nr)
);
CREATE TABLE IF NOT EXISTS journal_metadata (
    persistence_id  TEXT PRIMARY KEY,
    max_sequence_nr INTEGER NOT NULL
);
";

pub struct SqliteStorage {
    pool: Arc<ConnectionPool>,
    known_tables: Arc<Mutex<HashSet<String>>>,
}

impl SqliteStorage {
    pub async fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| JournalError::storage(format!("create {}", parent.display()), e))?;
            }
        }

        let pool = ConnectionPool::new(path, pool_size);
        pool.run("create base schema".to_string(), |conn| {
            conn.execute_batch(BASE_SCHEMA)
                .map_err(|e| map_sqlite_error("create base schema", e))
        })
        .await?;

        tracing::info!("SQLite journal opened at {:?} (pool size {})", path, pool.size());
        Ok(Self {
            pool,
            known_tables: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

/// Creates `table` unless this process has already seen it.
fn ensure_table(conn: &Connection, known: &Mutex<HashSet<String>>, table: &str) -> Result<()> {
    if known.lock().contains(table) {
        return Ok(());
    }
    let ident = quote_identifier(table);
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {ident} (
            ordering       INTEGER PRIMARY KEY,
            persistence_id TEXT    NOT NULL,
            sequence_nr    INTEGER NOT NULL,
            payload        BLOB    NOT NULL,
            manifest       TEXT    NOT NULL,
            writer_id      TEXT    NOT NULL,
            tags           TEXT    NOT NULL,
            checksum       INTEGER NOT NULL,
            deleted        INTEGER NOT NULL DEFAULT 0,
            UNIQUE (persistence_id, sequence_nr)
        )"
    );
    conn.execute_batch(&ddl)
        .map_err(|e| map_sqlite_error(&format!("create table {}", table), e))?;
    known.lock().insert(table.to_string());
    Ok(())
}

/// True if `table` exists. Never creates it.
fn table_exists(conn: &Connection, known: &Mutex<HashSet<String>>, table: &str) -> Result<bool> {
    if known.lock().contains(table) {
        return Ok(true);
    }
    let context = format!("look up table {}", table);
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| map_sqlite_error(&context, e))?
        .is_some();
    if exists {
        known.lock().insert(table.to_string());
    }
    Ok(exists)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Classifies a driver error, keeping only its message.
fn map_sqlite_error(context: &str, err: rusqlite::Error) -> JournalError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen | ErrorCode::SystemIoFailure => {
                return JournalError::transient(context, err);
            }
            _ => {}
        }
    }
    JournalError::storage(context, err)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn commit_in_transaction(
    conn: &mut Connection,
    known: &Mutex<HashSet<String>>,
    write: &RoutedWrite,
) -> std::result::Result<Vec<OrderingOffset>, CommitFailure> {
    // DDL outside the write transaction so a conflict does not roll it back.
    for (target, _) in &write.groups {
        ensure_table(conn, known, &target.table).map_err(CommitFailure::Journal)?;
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(CommitFailure::Sqlite)?;
    let mut offsets = Vec::with_capacity(write.row_count());

    for (target, rows) in &write.groups {
        let insert_row = format!(
            "INSERT INTO {} (ordering, persistence_id, sequence_nr, payload, manifest, writer_id, tags, checksum, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            quote_identifier(&target.table)
        );
        let mut allocate = tx
            .prepare_cached("INSERT INTO journal_offsets (persistence_id, sequence_nr) VALUES (?1, ?2)")
            .map_err(CommitFailure::Sqlite)?;
        let mut insert = tx.prepare(&insert_row).map_err(CommitFailure::Sqlite)?;

        for row in rows {
            allocate
                .execute(params![row.persistence_id, row.sequence_nr])
                .map_err(CommitFailure::Sqlite)?;
            let ordering = tx.last_insert_rowid();
            insert
                .execute(params![
                    ordering,
                    row.persistence_id,
                    row.sequence_nr,
                    row.payload,
                    row.manifest,
                    row.writer_id,
                    row.tags,
                    row.checksum,
                    row.deleted,
                ])
                .map_err(CommitFailure::Sqlite)?;
            offsets.push(ordering);
        }
    }

    tx.execute(
        "INSERT INTO journal_metadata (persistence_id, max_sequence_nr) VALUES (?1, ?2)
         ON CONFLICT (persistence_id) DO UPDATE SET max_sequence_nr = MAX(max_sequence_nr, excluded.max_sequence_nr)",
        params![write.persistence_id, write.to_sequence_nr],
    )
    .map_err(CommitFailure::Sqlite)?;

    tx.commit().map_err(CommitFailure::Sqlite)?;
    Ok(offsets)
}

fn query_highest(conn: &Connection, persistence_id: &str, context: &str) -> Result<SequenceNr> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT max_sequence_nr FROM journal_metadata WHERE persistence_id = ?1",
            params![persistence_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| map_sqlite_error(context, e))?;
    Ok(found.unwrap_or(0))
}

enum CommitFailure {
    Sqlite(rusqlite::Error),
    Journal(JournalError),
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalRow> {
    Ok(JournalRow {
        ordering: row.get(0)?,
        persistence_id: row.get(1)?,
        sequence_nr: row.get(2)?,
        payload: row.get(3)?,
        manifest: row.get(4)?,
        writer_id: row.get(5)?,
        tags: row.get(6)?,
        checksum: row.get(7)?,
        deleted: row.get(8)?,
    })
}

#[async_trait]
impl PageSource for SqliteStorage {
    async fn fetch_page(&self, query: PageQuery) -> Result<Vec<JournalRow>> {
        let known = Arc::clone(&self.known_tables);
        let context = query.describe();
        self.pool
            .run(context.clone(), move |conn| {
                if !table_exists(conn, &known, &query.target.table)? {
                    return Ok(Vec::new());
                }
                let sql = format!(
                    "SELECT ordering, persistence_id, sequence_nr, payload, manifest, writer_id, tags, checksum, deleted
                     FROM {}
                     WHERE persistence_id = ?1 AND sequence_nr > ?2 AND sequence_nr <= ?3
                     ORDER BY sequence_nr ASC
                     LIMIT ?4",
                    quote_identifier(&query.target.table)
                );
                let mut stmt = conn.prepare_cached(&sql).map_err(|e| map_sqlite_error(&context, e))?;
                let rows = stmt
                    .query_map(
                        params![
                            query.persistence_id,
                            query.after_sequence_nr,
                            query.to_sequence_nr,
                            query.limit as i64
                        ],
                        read_row,
                    )
                    .map_err(|e| map_sqlite_error(&context, e))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| map_sqlite_error(&context, e))
            })
            .await
    }

    async fn stream_upper_bound(&self, persistence_id: &str) -> Result<Option<SequenceNr>> {
        let pid = persistence_id.to_string();
        let context = format!("replay bound of {}", pid);
        self.pool
            .run(context.clone(), move |conn| query_highest(conn, &pid, &context).map(Some))
            .await
    }
}

#[async_trait]
impl OrderingSource for SqliteStorage {
    async fn max_ordering(&self) -> Result<OrderingOffset> {
        self.pool
            .run("max ordering".to_string(), |conn| {
                conn.query_row("SELECT COALESCE(MAX(ordering), 0) FROM journal_offsets", [], |r| r.get(0))
                    .map_err(|e| map_sqlite_error("max ordering", e))
            })
            .await
    }

    async fn first_gap(&self, after: OrderingOffset, up_to: OrderingOffset) -> Result<Option<OrderingOffset>> {
        if up_to <= after {
            return Ok(None);
        }
        let context = format!("gap probe ({}..={}]", after, up_to);
        self.pool
            .run(context.clone(), move |conn| {
                // Either after + 1 itself is missing, or some committed offset
                // in range has no successor.
                conn.query_row(
                    "SELECT MIN(candidate) FROM (
                        SELECT ?1 + 1 AS candidate
                         WHERE NOT EXISTS (SELECT 1 FROM journal_offsets WHERE ordering = ?1 + 1)
                        UNION ALL
                        SELECT o.ordering + 1 AS candidate FROM journal_offsets o
                         WHERE o.ordering > ?1 AND o.ordering < ?2
                           AND NOT EXISTS (SELECT 1 FROM journal_offsets n WHERE n.ordering = o.ordering + 1)
                     ) WHERE candidate <= ?2",
                    params![after, up_to],
                    |r| r.get::<_, Option<i64>>(0),
                )
                .map_err(|e| map_sqlite_error(&context, e))
            })
            .await
    }
}

#[async_trait]
impl JournalStorage for SqliteStorage {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn commit_atomic(&self, write: RoutedWrite) -> Result<Vec<OrderingOffset>> {
        let known = Arc::clone(&self.known_tables);
        let context = write.describe();
        self.pool
            .run(context.clone(), move |conn| match commit_in_transaction(conn, &known, &write) {
                Ok(offsets) => Ok(offsets),
                Err(CommitFailure::Journal(e)) => Err(e),
                Err(CommitFailure::Sqlite(e)) if is_unique_violation(&e) => Err(JournalError::Conflict {
                    persistence_id: write.persistence_id.clone(),
                    from: write.from_sequence_nr,
                    to: write.to_sequence_nr,
                }),
                Err(CommitFailure::Sqlite(e)) => Err(map_sqlite_error(&context, e)),
            })
            .await
    }

    async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<SequenceNr> {
        let pid = persistence_id.to_string();
        let context = format!("highest sequence_nr of {}", pid);
        self.pool
            .run(context.clone(), move |conn| query_highest(conn, &pid, &context))
            .await
    }

    async fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: SequenceNr, targets: Vec<Target>) -> Result<u64> {
        let pid = persistence_id.to_string();
        let known = Arc::clone(&self.known_tables);
        let context = format!("delete {} up to {}", pid, to_sequence_nr);
        self.pool
            .run(context.clone(), move |conn| {
                for target in &targets {
                    ensure_table(conn, &known, &target.table)?;
                }
                let tx = conn.transaction().map_err(|e| map_sqlite_error(&context, e))?;
                let mut touched = 0u64;
                for target in &targets {
                    let sql = format!(
                        "UPDATE {} SET deleted = 1 WHERE persistence_id = ?1 AND sequence_nr <= ?2 AND deleted = 0",
                        quote_identifier(&target.table)
                    );
                    touched += tx
                        .execute(&sql, params![pid, to_sequence_nr])
                        .map_err(|e| map_sqlite_error(&context, e))? as u64;
                }
                tx.commit().map_err(|e| map_sqlite_error(&context, e))?;
                Ok(touched)
            })
            .await
    }
}
