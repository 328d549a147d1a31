// src/error.rs

use std::fmt;
use thiserror::Error;

/// Which part of the run a fatal condition came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Catalog,
    Parse,
    Persistence,
    Logging,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Catalog => "catalog",
            ErrorKind::Parse => "parse",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Logging => "logging",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal, run-aborting failure. The `Display` form is the description that
/// gets written to the error log and sent out as the alert body.
#[derive(Debug, Error)]
#[error("Error occurred when {stage}: {detail}")]
pub struct Error {
    pub kind: ErrorKind,
    pub stage: String,
    pub detail: String,
}

impl Error {
    pub fn new(kind: ErrorKind, stage: impl Into<String>, err: anyhow::Error) -> Self {
        Self {
            kind,
            stage: stage.into(),
            // `{:#}` flattens the whole context chain onto one line
            detail: format!("{:#}", err),
        }
    }
}

pub type RunResult<T> = std::result::Result<T, Error>;

/// Tags a component-level `anyhow` failure with the stage it happened in.
pub trait StageExt<T> {
    fn stage(self, kind: ErrorKind, stage: impl Into<String>) -> RunResult<T>;
}

impl<T> StageExt<T> for anyhow::Result<T> {
    fn stage(self, kind: ErrorKind, stage: impl Into<String>) -> RunResult<T> {
        self.map_err(|e| Error::new(kind, stage, e))
    }
}
