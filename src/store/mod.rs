//! Deduplicated, append-oriented tables persisted as SQLite files.
//!
//! Each [`TabularStore`] owns one file holding one table. Rows are staged in
//! memory and merged into the persisted table on [`TabularStore::flush`];
//! persisted rows always win over staged rows with the same primary key.
//! Every write runs inside a single SQLite transaction, so a crash mid-write
//! leaves the previous table intact.

use rusqlite::types::ToSql;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// A row type that can live in a [`TabularStore`].
pub trait TableRow: Sized {
    const TABLE: &'static str;

    /// Column names, in the order `to_params` binds them.
    const COLUMNS: &'static [&'static str];

    /// Columns of the primary index, in the order `key_params` binds them.
    const KEY: &'static [&'static str];

    /// `CREATE TABLE IF NOT EXISTS` statement declaring `KEY` as primary key.
    const SCHEMA: &'static str;

    fn to_params(&self) -> Vec<&dyn ToSql>;

    fn key_params(&self) -> Vec<&dyn ToSql>;

    /// Build a row from a `SELECT` of `COLUMNS`, in order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub struct TabularStore<R: TableRow> {
    path: PathBuf,
    staged: Vec<R>,
}

impl<R: TableRow> TabularStore<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows waiting for the next flush.
    pub fn staged(&self) -> &[R] {
        &self.staged
    }

    /// Whether a table has ever been written to this store.
    pub fn exists(&self) -> Result<bool> {
        match self.open_existing()? {
            Some(conn) => table_exists(&conn, R::TABLE),
            None => Ok(false),
        }
    }

    /// The persisted table, or `None` if it has never been written.
    ///
    /// An existing but empty table loads as `Some(vec![])`.
    pub fn load(&self) -> Result<Option<Vec<R>>> {
        let Some(conn) = self.open_existing()? else {
            return Ok(None);
        };
        if !table_exists(&conn, R::TABLE)? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::KEY.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| R::from_row(row))?
            .collect::<rusqlite::Result<Vec<R>>>()?;
        Ok(Some(rows))
    }

    /// Buffer a row for the next flush. Duplicates are resolved at flush time.
    pub fn stage(&mut self, row: R) {
        self.staged.push(row);
    }

    pub fn stage_all(&mut self, rows: impl IntoIterator<Item = R>) {
        self.staged.extend(rows);
    }

    /// Merge staged rows into the persisted table.
    ///
    /// Staged rows whose key already exists are dropped, never overwritten;
    /// among staged duplicates the first one wins. Returns the number of rows
    /// actually added. On error nothing is written and the staged rows are
    /// kept for a retry.
    pub fn flush(&mut self) -> Result<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let mut conn = self.open_writable()?;
        let tx = conn.transaction()?;
        tx.execute_batch(R::SCHEMA)?;
        let inserted = insert_rows(&tx, &self.staged)?;
        tx.commit()?;

        debug!(
            table = R::TABLE,
            path = %self.path.display(),
            staged = self.staged.len(),
            inserted,
            "Flushed table"
        );
        self.staged.clear();
        Ok(inserted)
    }

    /// Replace the whole persisted table with `rows`, creating it if needed.
    ///
    /// Unlike [`flush`](Self::flush) this writes even when `rows` is empty.
    /// Staged rows are left alone.
    pub fn replace(&self, rows: &[R]) -> Result<usize> {
        let mut conn = self.open_writable()?;
        let tx = conn.transaction()?;
        tx.execute_batch(R::SCHEMA)?;
        tx.execute(&format!("DELETE FROM {}", R::TABLE), [])?;
        let inserted = insert_rows(&tx, rows)?;
        tx.commit()?;

        debug!(table = R::TABLE, path = %self.path.display(), rows = inserted, "Replaced table");
        Ok(inserted)
    }

    /// Drop every persisted row for which `keep` returns false.
    ///
    /// Returns the number of rows removed; a store that was never written
    /// has nothing to remove.
    pub fn apply_deletions<F>(&self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&R) -> bool,
    {
        let Some(rows) = self.load()? else {
            return Ok(0);
        };
        let doomed: Vec<&R> = rows.iter().filter(|row| !keep(row)).collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let predicate = R::KEY
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("DELETE FROM {} WHERE {}", R::TABLE, predicate);

        let mut conn = self.open_writable()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &doomed {
                removed += stmt.execute(row.key_params().as_slice())?;
            }
        }
        tx.commit()?;

        debug!(table = R::TABLE, path = %self.path.display(), removed, "Applied deletions");
        Ok(removed)
    }

    fn open_existing(&self) -> Result<Option<Connection>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Some(conn))
    }

    fn open_writable(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Connection::open(&self.path)?)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_rows<R: TableRow>(conn: &Connection, rows: &[R]) -> Result<usize> {
    let placeholders = (1..=R::COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut inserted = 0;
    for row in rows {
        inserted += stmt.execute(row.to_params().as_slice())?;
    }
    Ok(inserted)
}
