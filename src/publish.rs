// src/publish.rs

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::config::SqlConfig;
use crate::filter::FilteredRow;
use crate::store::Session;

/// Replace the staging contents with `rows` and promote them.
///
/// Truncate, insert, commit and promotion run strictly in that order; the
/// first failure stops the sequence. Returns the number of rows staged.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub fn publish<S: Session + ?Sized>(
    session: &mut S,
    sql: &SqlConfig,
    rows: &[FilteredRow],
) -> Result<usize> {
    session
        .execute(&sql.truncate_staging, &[])
        .context("deleting rows from staging table")?;

    let params: Vec<Vec<String>> = rows.iter().map(FilteredRow::to_params).collect();
    let staged = session
        .execute_many(&sql.insert_staging, &params)
        .context("inserting rows into staging table")?;
    session
        .commit()
        .context("committing staging table")?;

    session
        .execute(&sql.promote, &[])
        .context("calling promotion procedure")?;
    session.commit().context("committing promotion")?;

    info!(staged, "staging published");
    Ok(staged)
}
