// src/process/mod.rs
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::ExtractConfig;

pub mod date_parser;
pub mod raw_table;
pub mod utils;

pub use date_parser::EffectiveDate;
pub use raw_table::RawTable;

/// One base-rate row of the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRow {
    pub code: String,
    pub rate_value: String,
}

/// The extracted rate table of one archive.
#[derive(Debug)]
pub struct RateTable {
    pub member_name: String,
    pub effective_date: EffectiveDate,
    pub rows: Vec<RateRow>,
}

/// Open `zip_path`, find its single rate CSV, and return the base-rate rows
/// (no modifier) with the release's effective date.
#[tracing::instrument(level = "info", skip(zip_path, cfg), fields(path = %zip_path.as_ref().display()))]
pub fn load_rvu_zip<P: AsRef<Path>>(zip_path: P, cfg: &ExtractConfig) -> Result<RateTable> {
    let raw = read_rate_member(zip_path.as_ref(), cfg)?;

    let description = raw
        .cell(cfg.description_row, cfg.description_column)
        .with_context(|| {
            format!(
                "{} has no description cell at row {}, column {}",
                raw.member_name, cfg.description_row, cfg.description_column
            )
        })?;
    let effective_date = date_parser::infer_effective_date(description, &raw.member_name)
        .with_context(|| format!("inferring effective date of {}", raw.member_name))?;
    info!(member = %raw.member_name, %effective_date, "effective date");

    let rows = base_rate_rows(&raw, cfg)?;
    info!(member = %raw.member_name, rows = rows.len(), "extracted base rates");

    Ok(RateTable {
        member_name: raw.member_name,
        effective_date,
        rows,
    })
}

/// Read the one member matching the marker and extension into a `RawTable`.
fn read_rate_member(zip_path: &Path, cfg: &ExtractConfig) -> Result<RawTable> {
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open ZIP file: {:?}", zip_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {:?}", zip_path))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {:?}", i, zip_path))?;
        if entry.is_file() {
            names.push(entry.name().to_string());
        }
    }

    let member = select_member(&names, cfg)?;
    let mut buf = Vec::new();
    archive
        .by_name(&member)
        .with_context(|| format!("Failed to access {}", member))?
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {} into memory", member))?;
    // the release files are Windows-1252
    let text = utils::decode_windows_1252(&buf);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error in {} at record {}", member, idx))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    debug!(member = %member, records = rows.len(), "parsed member");

    Ok(RawTable {
        member_name: file_name(&member).to_string(),
        rows,
    })
}

/// Exactly one member may match; zero or several is an error.
fn select_member(names: &[String], cfg: &ExtractConfig) -> Result<String> {
    let marker = cfg.member_marker.to_uppercase();
    let suffix = format!(".{}", cfg.member_extension.to_lowercase());
    let candidates: Vec<&String> = names
        .iter()
        .filter(|n| {
            let base = file_name(n);
            base.to_uppercase().contains(&marker) && base.to_lowercase().ends_with(&suffix)
        })
        .collect();

    match candidates.as_slice() {
        [only] => Ok((*only).clone()),
        [] => bail!(
            "no `{}` member matching `{}` in archive (members: {:?})",
            suffix,
            cfg.member_marker,
            names
        ),
        many => {
            for name in many {
                warn!(member = %name, "candidate rate file");
            }
            bail!(
                "{} members match `{}` and `{}`, expected exactly one",
                many.len(),
                cfg.member_marker,
                suffix
            )
        }
    }
}

fn file_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

/// Column positions resolved from the header row.
struct Columns {
    code: usize,
    modifier: usize,
    /// First column carrying the rate label; later repeats are other components.
    rate: usize,
}

impl Columns {
    fn from_header(row: &[String], cfg: &ExtractConfig) -> Option<Self> {
        let position = |name: &str| row.iter().position(|c| c.trim() == name);
        Some(Self {
            code: position(&cfg.code_column)?,
            modifier: position(&cfg.modifier_column)?,
            rate: position(&cfg.rate_column)?,
        })
    }
}

/// The header is expected at `cfg.header_row`. When that row lacks the
/// required columns the first row that has them is used instead.
fn locate_header(raw: &RawTable, cfg: &ExtractConfig) -> Result<(usize, Columns)> {
    if let Some(cols) = raw
        .rows
        .get(cfg.header_row)
        .and_then(|row| Columns::from_header(row, cfg))
    {
        return Ok((cfg.header_row, cols));
    }

    let found = raw
        .rows
        .iter()
        .enumerate()
        .find_map(|(i, row)| Columns::from_header(row, cfg).map(|c| (i, c)));
    match found {
        Some((idx, cols)) => {
            warn!(
                member = %raw.member_name,
                expected = cfg.header_row,
                found = idx,
                "header row moved"
            );
            Ok((idx, cols))
        }
        None => bail!(
            "{} has no header row with columns `{}`, `{}` and `{}`",
            raw.member_name,
            cfg.code_column,
            cfg.modifier_column,
            cfg.rate_column
        ),
    }
}

fn base_rate_rows(raw: &RawTable, cfg: &ExtractConfig) -> Result<Vec<RateRow>> {
    let (header_idx, cols) = locate_header(raw, cfg)?;

    Ok(raw.rows[header_idx + 1..]
        .iter()
        .filter(|row| cell(row, cols.modifier).is_empty())
        .filter(|row| !cell(row, cols.code).is_empty())
        .map(|row| RateRow {
            code: cell(row, cols.code).to_string(),
            rate_value: cell(row, cols.rate).to_string(),
        })
        .collect())
}

/// Trimmed cell; short rows read as empty.
fn cell(row: &[String], i: usize) -> &str {
    row.get(i).map(|s| s.trim()).unwrap_or("")
}
