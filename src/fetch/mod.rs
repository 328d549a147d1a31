// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;

/// Catalog listing and archive-link resolution
pub mod urls;
/// Archive download into the local store
pub mod zips;

pub use urls::{list_entries, resolve_direct_link, CatalogEntry};
pub use zips::{download_archive, fetch_archive};

pub fn build_client(cfg: &Config) -> Result<Client> {
    let mut builder = Client::builder().user_agent(cfg.user_agent.clone());
    if let Some(secs) = cfg.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("building HTTP client")
}

async fn get_text(client: &Client, url: &Url) -> Result<String> {
    debug!("Fetching text from {}", url);
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .await
        .with_context(|| format!("Reading text from {}", url))
}

async fn get_bytes(client: &Client, url: &Url) -> Result<Vec<u8>> {
    debug!("Fetching bytes from {}", url);
    let bytes = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .bytes()
        .await
        .with_context(|| format!("Reading body from {}", url))?;
    Ok(bytes.to_vec())
}
