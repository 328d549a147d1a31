// src/pipeline.rs

use anyhow::Context;
use reqwest::Client;
use std::path::Path;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, ErrorKind, RunResult, StageExt};
use crate::fetch::{self, CatalogEntry};
use crate::filter::{self, ReferenceCodeSet};
use crate::inventory;
use crate::notify::Notifier;
use crate::process;
use crate::publish;
use crate::store::{self, Phase, Session};

/// What a successful run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifiers loaded this run, in load order.
    pub archives: Vec<String>,
    pub rows_staged: usize,
}

/// One run: start signal, inventory diff, then fetch → extract → filter →
/// publish for each new archive, then the end signal. The first failure
/// ends the run.
pub struct Pipeline<'a, S: Session> {
    config: &'a Config,
    client: &'a Client,
    session: &'a mut S,
}

impl<'a, S: Session> Pipeline<'a, S> {
    pub fn new(config: &'a Config, client: &'a Client, session: &'a mut S) -> Self {
        Self {
            config,
            client,
            session,
        }
    }

    pub fn notify_start(&mut self) -> RunResult<()> {
        store::log_process(
            &mut *self.session,
            &self.config.sql.log_process,
            &self.config.source_name,
            Phase::Start,
        )
        .stage(ErrorKind::Logging, "logging start")
    }

    pub fn notify_end(&mut self) -> RunResult<()> {
        store::log_process(
            &mut *self.session,
            &self.config.sql.log_process,
            &self.config.source_name,
            Phase::End,
        )
        .stage(ErrorKind::Logging, "logging end")
    }

    /// Error log row plus alert for a failed run.
    pub async fn on_error(&mut self, notifier: &Notifier, err: &Error) {
        report_failure(Some(&mut *self.session), notifier, self.config, err).await;
    }

    #[instrument(level = "info", skip_all, fields(source = %self.config.source_name))]
    pub async fn run(&mut self) -> RunResult<RunSummary> {
        self.notify_start()?;

        let cfg = self.config;
        let local = inventory::local_archive_set(
            &cfg.local_store_path,
            &cfg.catalog.archive_extension,
        )
        .stage(ErrorKind::Catalog, "getting a list of downloaded archives")?;
        info!(count = local.len(), "archives already downloaded");

        let catalog_url = Url::parse(&cfg.catalog_url)
            .with_context(|| format!("parsing catalog URL {}", cfg.catalog_url))
            .stage(ErrorKind::Config, "reading the catalog URL")?;
        let catalog = fetch::list_entries(self.client, &catalog_url, &cfg.catalog)
            .await
            .stage(
                ErrorKind::Catalog,
                "getting a list of archives available on the catalog",
            )?;
        let work = inventory::work_list(&local, catalog);

        let codes = ReferenceCodeSet::load(&mut *self.session, &cfg.sql.reference_codes)
            .stage(ErrorKind::Persistence, "generating the reference code set")?;

        let mut summary = RunSummary::default();
        for entry in &work {
            let staged = self.process_archive(entry, &codes).await?;
            summary.archives.push(entry.identifier.clone());
            summary.rows_staged += staged;
        }

        self.notify_end()?;
        info!(
            archives = summary.archives.len(),
            rows = summary.rows_staged,
            "run complete"
        );
        Ok(summary)
    }

    async fn process_archive(
        &mut self,
        entry: &CatalogEntry,
        codes: &ReferenceCodeSet,
    ) -> RunResult<usize> {
        let cfg = self.config;
        let path = fetch::fetch_archive(
            self.client,
            entry,
            &cfg.catalog.archive_extension,
            &cfg.local_store_path,
        )
        .await
        .stage(
            ErrorKind::Catalog,
            format!("downloading new archive {}", entry.identifier),
        )?;

        match self.load_archive(&path, entry, codes).await {
            Ok(staged) => Ok(staged),
            Err(err) => {
                discard_archive(&path);
                Err(err)
            }
        }
    }

    async fn load_archive(
        &mut self,
        path: &Path,
        entry: &CatalogEntry,
        codes: &ReferenceCodeSet,
    ) -> RunResult<usize> {
        let extract_cfg = self.config.extract.clone();
        let zip_path = path.to_path_buf();
        let table = tokio::task::spawn_blocking(move || process::load_rvu_zip(&zip_path, &extract_cfg))
            .await
            .context("extraction task failed")
            .and_then(|res| res)
            .stage(
                ErrorKind::Parse,
                format!("extracting the rate table from {}", entry.identifier),
            )?;

        let rows = filter::filter_now(&table, codes);

        let staged = publish::publish(&mut *self.session, &self.config.sql, &rows).stage(
            ErrorKind::Persistence,
            format!("publishing {} to staging", entry.identifier),
        )?;
        info!(identifier = %entry.identifier, staged, "archive loaded");
        Ok(staged)
    }
}

/// Drop an archive whose load failed so the next run picks it up again.
fn discard_archive(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "removed archive after failed load"),
        Err(e) => error!(path = %path.display(), error = %e, "could not remove archive after failed load"),
    }
}

/// Write the failure to the error log (when a session is available) and send
/// the alert. Failures of either step are logged and otherwise ignored, the
/// run is already failing.
pub async fn report_failure(
    session: Option<&mut dyn Session>,
    notifier: &Notifier,
    config: &Config,
    err: &Error,
) {
    let description = err.to_string();
    error!(kind = %err.kind, "{}", description);

    if let Some(session) = session {
        if let Err(e) = store::log_error(
            session,
            &config.sql.log_error,
            &description,
            "",
            &config.source_name,
        ) {
            error!(error = %format!("{:#}", e), "could not write the error log");
        }
    }

    if let Err(e) = notifier
        .notify_error(&config.error_recipient, &config.error_subject(), &description)
        .await
    {
        error!(error = %format!("{:#}", e), "could not send the alert");
    }
}
