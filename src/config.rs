// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use url::Url;

/// Env var pointing at the YAML config file.
pub const CONFIG_ENV: &str = "RVUSCRAPER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "rvuscraper.yaml";

const DEFAULT_CATALOG_URL: &str = "https://www.cms.gov/Medicare/Medicare-Fee-for-Service-Payment/PhysicianFeeSched/PFS-Relative-Value-Files?items_per_page=50";

/// Run configuration. Every field has a default, so a partial YAML file (or
/// none at all) is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name written to the process and error logs.
    pub source_name: String,
    pub catalog_url: String,
    /// Directory holding every archive downloaded so far.
    pub local_store_path: PathBuf,
    pub db_path: PathBuf,
    pub error_recipient: String,
    /// Defaults to `"{source_name} Error"`.
    pub error_subject: Option<String>,
    /// Alerts are POSTed here when set; otherwise they only go to the log.
    pub notify_webhook_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
    pub catalog: CatalogConfig,
    pub extract: ExtractConfig,
    pub sql: SqlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Case-insensitive token a catalog link must contain.
    pub marker: String,
    /// The first number in a link's name must be strictly greater than this.
    pub min_release_number: f64,
    pub archive_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub member_marker: String,
    pub member_extension: String,
    /// Expected index of the column header row.
    pub header_row: usize,
    pub code_column: String,
    pub modifier_column: String,
    pub rate_column: String,
    pub description_row: usize,
    pub description_column: usize,
}

/// Statements run against the relational store. Positional parameters are
/// written as `?`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Run once when the session opens.
    pub init: Vec<String>,
    pub reference_codes: String,
    pub truncate_staging: String,
    /// Params: code, rate value, effective date, insert timestamp.
    pub insert_staging: String,
    pub promote: String,
    /// Params: source, phase.
    pub log_process: String,
    /// Params: error text, warning text, source.
    pub log_error: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_name: "CPT_RVU_CMS".into(),
            catalog_url: DEFAULT_CATALOG_URL.into(),
            local_store_path: PathBuf::from("zips"),
            db_path: PathBuf::from("rvuscraper.db"),
            error_recipient: String::new(),
            error_subject: None,
            notify_webhook_url: None,
            request_timeout_secs: None,
            user_agent: concat!("rvuscraper/", env!("CARGO_PKG_VERSION")).into(),
            catalog: CatalogConfig::default(),
            extract: ExtractConfig::default(),
            sql: SqlConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            marker: "RVU".into(),
            min_release_number: 15.0,
            archive_extension: "zip".into(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            member_marker: "RVU".into(),
            member_extension: "csv".into(),
            header_row: 9,
            code_column: "HCPCS".into(),
            modifier_column: "MOD".into(),
            rate_column: "RVU".into(),
            description_row: 0,
            description_column: 2,
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            init: vec![
                "CREATE TABLE IF NOT EXISTS charge_detail (CPT_HCPCS_Code TEXT, Accounting_Unit_Code TEXT)".into(),
                "CREATE TABLE IF NOT EXISTS ed_accounting_unit (au TEXT)".into(),
                "CREATE TABLE IF NOT EXISTS stg_cpt_rvu_cms (CPT_HCPCS_Code TEXT, RVU TEXT, Effective_Date TEXT, Insert_Dttm TEXT)".into(),
                "CREATE TABLE IF NOT EXISTS cpt_rvu_cms (CPT_HCPCS_Code TEXT, RVU TEXT, Effective_Date TEXT, Insert_Dttm TEXT)".into(),
                "CREATE TABLE IF NOT EXISTS process_log (source TEXT, phase TEXT, logged_at TEXT)".into(),
                "CREATE TABLE IF NOT EXISTS error_log (error_text TEXT, warning_text TEXT, source TEXT, logged_at TEXT)".into(),
            ],
            reference_codes: "SELECT DISTINCT scd.CPT_HCPCS_Code FROM charge_detail scd \
                              JOIN ed_accounting_unit au ON scd.Accounting_Unit_Code = au.au"
                .into(),
            truncate_staging: "DELETE FROM stg_cpt_rvu_cms".into(),
            insert_staging: "INSERT INTO stg_cpt_rvu_cms VALUES (?, ?, ?, ?)".into(),
            promote: "INSERT INTO cpt_rvu_cms SELECT s.* FROM stg_cpt_rvu_cms s \
                      WHERE NOT EXISTS (SELECT 1 FROM cpt_rvu_cms p \
                      WHERE p.CPT_HCPCS_Code = s.CPT_HCPCS_Code AND p.Effective_Date = s.Effective_Date)"
                .into(),
            log_process: "INSERT INTO process_log (source, phase, logged_at) VALUES (?, ?, datetime('now'))".into(),
            log_error: "INSERT INTO error_log (error_text, warning_text, source, logged_at) VALUES (?, ?, ?, datetime('now'))".into(),
        }
    }
}

impl Config {
    /// Load from `$RVUSCRAPER_CONFIG` (or `rvuscraper.yaml`), fall back to the
    /// defaults when the file is absent, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Overrides taken from `lookup` (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RVUSCRAPER_CATALOG_URL") {
            self.catalog_url = v;
        }
        if let Some(v) = lookup("RVUSCRAPER_LOCAL_STORE") {
            self.local_store_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RVUSCRAPER_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RVUSCRAPER_ERROR_RECIPIENT") {
            self.error_recipient = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.catalog_url)
            .with_context(|| format!("catalog_url `{}` is not a valid URL", self.catalog_url))?;
        if let Some(hook) = &self.notify_webhook_url {
            Url::parse(hook)
                .with_context(|| format!("notify_webhook_url `{}` is not a valid URL", hook))?;
        }
        if self.source_name.trim().is_empty() {
            bail!("source_name must not be empty");
        }
        if self.catalog.archive_extension.trim().is_empty() {
            bail!("catalog.archive_extension must not be empty");
        }
        if self.extract.member_extension.trim().is_empty() {
            bail!("extract.member_extension must not be empty");
        }
        Ok(())
    }

    pub fn error_subject(&self) -> String {
        self.error_subject
            .clone()
            .unwrap_or_else(|| format!("{} Error", self.source_name))
    }
}
