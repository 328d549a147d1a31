// src/fetch/urls.rs
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use tracing::{debug, info, instrument, trace};
use url::Url;

use super::get_text;
use crate::config::CatalogConfig;
use crate::process::utils::first_number;

static ANCHORS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("CSS selector for links should be valid"));

/// One archive listed on the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Base name of the link without extension, e.g. `rvu19a`.
    pub identifier: String,
    /// The archive's detail page, not the archive itself.
    pub location: Url,
}

/// Fetch the catalog page and return every eligible entry, in no particular
/// order. An eligible-empty catalog is an error.
#[instrument(level = "info", skip(client, rule), fields(url = %catalog_url))]
pub async fn list_entries(
    client: &Client,
    catalog_url: &Url,
    rule: &CatalogConfig,
) -> Result<Vec<CatalogEntry>> {
    let html = get_text(client, catalog_url).await?;
    let entries = parse_catalog(&html, catalog_url, rule)?;
    if entries.is_empty() {
        bail!("no `{}` archives listed at {}", rule.marker, catalog_url);
    }
    info!(count = entries.len(), "catalog entries");
    Ok(entries)
}

/// Pull eligible entries out of a catalog document. Later links with the
/// same identifier replace earlier ones.
pub fn parse_catalog(html: &str, base: &Url, rule: &CatalogConfig) -> Result<Vec<CatalogEntry>> {
    let doc = Html::parse_document(html);
    let mut by_identifier: HashMap<String, CatalogEntry> = HashMap::new();

    for href in doc.select(&ANCHORS).filter_map(|e| e.value().attr("href")) {
        let Some(name) = base_name(href) else {
            continue;
        };
        if !is_eligible(href, name, rule) {
            continue;
        }
        let location = base
            .join(href)
            .with_context(|| format!("resolving catalog link {}", href))?;
        let identifier = strip_extension(name).to_string();
        trace!(%identifier, %location, "catalog entry");
        by_identifier.insert(
            identifier.clone(),
            CatalogEntry {
                identifier,
                location,
            },
        );
    }

    Ok(by_identifier.into_values().collect())
}

/// Marker anywhere in the link, and the first number of the base name above
/// the threshold.
fn is_eligible(href: &str, name: &str, rule: &CatalogConfig) -> bool {
    if !href
        .to_uppercase()
        .contains(&rule.marker.to_uppercase())
    {
        return false;
    }
    match first_number(name).and_then(|n| n.parse::<f64>().ok()) {
        Some(n) => n > rule.min_release_number,
        None => {
            debug!(href, "marker link without a release number");
            false
        }
    }
}

/// Last path segment of a link, ignoring query, fragment and trailing `/`.
fn base_name(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?.trim_end_matches('/');
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

fn strip_extension(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Follow a detail page and return the first link to a `.{extension}` file.
#[instrument(level = "info", skip(client), fields(url = %detail_url))]
pub async fn resolve_direct_link(client: &Client, detail_url: &Url, extension: &str) -> Result<Url> {
    let html = get_text(client, detail_url).await?;
    find_archive_link(&html, detail_url, extension)
}

pub fn find_archive_link(html: &str, base: &Url, extension: &str) -> Result<Url> {
    let marker = format!(".{}", extension);
    let doc = Html::parse_document(html);
    let href = doc
        .select(&ANCHORS)
        .filter_map(|e| e.value().attr("href"))
        .find(|href| href.contains(&marker))
        .with_context(|| format!("no `{}` link on {}", marker, base))?;
    base.join(href)
        .with_context(|| format!("resolving archive link {}", href))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const CATALOG: &str = r#"
<html><body>
  <a href="/about">About</a>
  <a href="/medicare/pfs/rvu15a">RVU15A</a>
  <a href="/medicare/pfs/rvu19b">RVU19B</a>
  <a href="/medicare/pfs/RVU19A?ref=list">RVU19A</a>
  <a href="/medicare/pfs/rvu-legacy">legacy</a>
  <a href="/medicare/pfs/gpci19">GPCI</a>
  <a>no href</a>
  <a href="/medicare/pfs/rvu19b">RVU19B again</a>
</body></html>"#;

    fn base() -> Url {
        Url::parse("https://www.cms.gov/pfs?items_per_page=50").unwrap()
    }

    #[test]
    fn catalog_keeps_marked_links_above_threshold() -> Result<()> {
        let mut entries = parse_catalog(CATALOG, &base(), &CatalogConfig::default())?;
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let ids: Vec<&str> = entries.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["RVU19A", "rvu19b"]);
        assert_eq!(
            entries[0].location.as_str(),
            "https://www.cms.gov/medicare/pfs/RVU19A?ref=list"
        );
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> Result<()> {
        let rule = CatalogConfig {
            min_release_number: 19.0,
            ..CatalogConfig::default()
        };
        assert!(parse_catalog(CATALOG, &base(), &rule)?.is_empty());
        Ok(())
    }

    #[test]
    fn base_name_strips_query_and_extension() {
        assert_eq!(base_name("/a/b/rvu20c.zip?x=1"), Some("rvu20c.zip"));
        assert_eq!(base_name("/a/b/rvu20c/"), Some("rvu20c"));
        assert_eq!(base_name("/"), None);
        assert_eq!(strip_extension("rvu20c.zip"), "rvu20c");
    }

    #[test]
    fn archive_link_is_first_zip_link() -> Result<()> {
        let html = r#"<a href="/files/readme.pdf">pdf</a>
                      <a href="/files/zip/rvu19a.zip">first</a>
                      <a href="/files/zip/rvu19a-updated.zip">second</a>"#;
        let detail = Url::parse("https://www.cms.gov/medicare/pfs/rvu19a").unwrap();
        let link = find_archive_link(html, &detail, "zip")?;
        assert_eq!(link.as_str(), "https://www.cms.gov/files/zip/rvu19a.zip");
        Ok(())
    }

    #[test]
    fn detail_page_without_archive_fails() {
        let detail = Url::parse("https://www.cms.gov/medicare/pfs/rvu19a").unwrap();
        assert!(find_archive_link("<a href=\"/x.pdf\">x</a>", &detail, "zip").is_err());
    }

    #[tokio::test]
    async fn list_entries_fails_on_empty_or_unreachable_catalog() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = Client::new();
        let rule = CatalogConfig::default();
        let empty = Url::parse(&format!("{}/empty", server.uri()))?;
        let down = Url::parse(&format!("{}/down", server.uri()))?;

        assert!(list_entries(&client, &empty, &rule).await.is_err());
        assert!(list_entries(&client, &down, &rule).await.is_err());
        Ok(())
    }
}
