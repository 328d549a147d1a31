// src/store/mod.rs

use anyhow::{Context, Result};

pub mod sqlite;

pub use sqlite::SqliteSession;

/// A handle on the relational store. One session is opened per run and
/// passed to every component that touches the database.
pub trait Session {
    /// Run a query and return its first column as text. NULLs are skipped.
    fn query_column(&mut self, sql: &str) -> Result<Vec<String>>;
    /// Run one statement with positional text parameters.
    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<usize>;
    /// Run one statement per row inside a pending transaction; see `commit`.
    fn execute_many(&mut self, sql: &str, rows: &[Vec<String>]) -> Result<usize>;
    fn commit(&mut self) -> Result<()>;
}

/// Lifecycle phase recorded in the process log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "Start",
            Phase::End => "End",
        }
    }
}

pub fn log_process<S: Session + ?Sized>(
    session: &mut S,
    sql: &str,
    source: &str,
    phase: Phase,
) -> Result<()> {
    session
        .execute(sql, &[source, phase.as_str()])
        .with_context(|| format!("writing {} row to the process log", phase.as_str()))?;
    session.commit()
}

/// Single quotes in the error text become double quotes before it is logged.
pub fn log_error<S: Session + ?Sized>(
    session: &mut S,
    sql: &str,
    error_text: &str,
    warning_text: &str,
    source: &str,
) -> Result<()> {
    let cleaned = error_text.replace('\'', "\"");
    session
        .execute(sql, &[&cleaned, warning_text, source])
        .context("writing to the error log")?;
    session.commit()
}
