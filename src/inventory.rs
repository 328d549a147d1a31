// src/inventory.rs

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, info};

use crate::fetch::CatalogEntry;

/// Identifiers of the archives already in `dir`: every `*.{extension}` file
/// with everything from its first `.` stripped. Creates `dir` on first use.
pub fn local_archive_set(dir: &Path, extension: &str) -> Result<HashSet<String>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&dir.display().to_string()),
        extension
    );
    let mut set = HashSet::new();
    for entry in glob(&pattern).context("invalid glob pattern for local archives")? {
        let path = entry.context("reading local archive directory")?;
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let identifier = name.split('.').next().unwrap_or(name);
            set.insert(identifier.to_string());
        }
    }

    debug!(dir = %dir.display(), count = set.len(), "local archives");
    Ok(set)
}

/// Catalog entries missing locally, ascending by identifier.
///
/// The sort is what makes earlier releases load before later ones; catalog
/// order carries no meaning.
pub fn work_list(local: &HashSet<String>, catalog: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut todo: Vec<CatalogEntry> = catalog
        .into_iter()
        .filter(|e| !local.contains(&e.identifier))
        .collect();
    todo.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    info!(
        pending = todo.len(),
        identifiers = ?todo.iter().map(|e| e.identifier.as_str()).collect::<Vec<_>>(),
        "work list"
    );
    todo
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use url::Url;

    fn entry(id: &str) -> CatalogEntry {
        CatalogEntry {
            identifier: id.to_string(),
            location: Url::parse(&format!("https://www.cms.gov/pfs/{}", id)).unwrap(),
        }
    }

    #[test]
    fn local_set_counts_only_complete_archives() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("RVU19A.zip"), b"")?;
        fs::write(dir.path().join("RVU19B.zip.part"), b"")?;
        fs::write(dir.path().join("notes.txt"), b"")?;
        fs::create_dir(dir.path().join("old.zip"))?;

        let set = local_archive_set(dir.path(), "zip")?;
        assert_eq!(set, HashSet::from(["RVU19A".to_string()]));
        Ok(())
    }

    #[test]
    fn missing_directory_is_created_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = dir.path().join("zips");
        assert!(local_archive_set(&store, "zip")?.is_empty());
        assert!(store.is_dir());
        Ok(())
    }

    #[test]
    fn work_list_skips_local_and_sorts() {
        let local = HashSet::from(["RVU19A".to_string()]);
        let todo = work_list(
            &local,
            vec![entry("RVU20A"), entry("RVU19B"), entry("RVU19A"), entry("RVU19D")],
        );
        let ids: Vec<&str> = todo.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["RVU19B", "RVU19D", "RVU20A"]);
    }

    #[test]
    fn nothing_new_means_empty_work_list() {
        let local = HashSet::from(["RVU19A".to_string(), "RVU19B".to_string()]);
        assert!(work_list(&local, vec![entry("RVU19B"), entry("RVU19A")]).is_empty());
    }
}
