// src/store/sqlite.rs

use anyhow::{Context, Result};
use rusqlite::{params_from_iter, types::Value, Connection};
use std::path::Path;
use tracing::debug;

use super::Session;

/// `Session` over a single SQLite connection. The connection closes when the
/// session is dropped.
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    /// Open (or create) the database at `path` and run the `init` statements.
    pub fn open(path: impl AsRef<Path>, init: &[String]) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::with_init(conn, init)
    }

    pub fn open_in_memory(init: &[String]) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Self::with_init(conn, init)
    }

    fn with_init(conn: Connection, init: &[String]) -> Result<Self> {
        for stmt in init {
            conn.execute_batch(stmt)
                .with_context(|| format!("running init statement `{}`", stmt))?;
        }
        debug!(statements = init.len(), "database initialised");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close explicitly so a failing close is reported instead of ignored.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("closing database")
    }

    fn rollback(&mut self) {
        if !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!(error = %e, "rollback failed");
            }
        }
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

impl Session for SqliteSession {
    fn query_column(&mut self, sql: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("preparing `{}`", sql))?;
        let values = stmt
            .query_map([], |row| row.get::<_, Value>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("reading rows of `{}`", sql))?;
        Ok(values.into_iter().filter_map(value_to_text).collect())
    }

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<usize> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .with_context(|| format!("executing `{}`", sql))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<String>]) -> Result<usize> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN").context("starting transaction")?;
        }

        let inserted = (|| -> Result<usize> {
            let mut stmt = self
                .conn
                .prepare(sql)
                .with_context(|| format!("preparing `{}`", sql))?;
            let mut n = 0;
            for (i, row) in rows.iter().enumerate() {
                n += stmt
                    .execute(params_from_iter(row.iter()))
                    .with_context(|| format!("batch row {}", i))?;
            }
            Ok(n)
        })();

        if inserted.is_err() {
            self.rollback();
        }
        inserted
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").context("committing transaction")?;
        }
        Ok(())
    }
}
