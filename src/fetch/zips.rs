use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

use super::{get_bytes, urls::resolve_direct_link, CatalogEntry};

/// Resolve `entry`'s detail page to the archive link and download it into
/// `dest_dir` as `{identifier}.{extension}`.
#[instrument(level = "info", skip(client, entry, dest_dir), fields(identifier = %entry.identifier))]
pub async fn fetch_archive(
    client: &Client,
    entry: &CatalogEntry,
    extension: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let archive_url = resolve_direct_link(client, &entry.location, extension)
        .await
        .with_context(|| format!("resolving archive link for {}", entry.identifier))?;
    download_archive(client, &archive_url, dest_dir, &entry.identifier, extension).await
}

/// Download `url` to `dest_dir/{identifier}.{extension}`. The bytes land in a
/// `.part` file first and are renamed into place once fully written.
/// Returns the full path of the saved file.
pub async fn download_archive(
    client: &Client,
    url: &Url,
    dest_dir: impl AsRef<Path>,
    identifier: &str,
    extension: &str,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let dest_path = dest_dir.join(format!("{}.{}", identifier, extension));
    let part_path = dest_dir.join(format!("{}.{}.part", identifier, extension));

    let bytes = get_bytes(client, url).await?;
    fs::write(&part_path, &bytes)
        .await
        .with_context(|| format!("writing {}", part_path.display()))?;
    fs::rename(&part_path, &dest_path)
        .await
        .with_context(|| format!("moving {} into place", dest_path.display()))?;

    info!(path = %dest_path.display(), bytes = bytes.len(), "downloaded");
    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn fetch_archive_follows_detail_page() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pfs/rvu19a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="/files/zip/rvu19a.zip">RVU19A (ZIP)</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/zip/rvu19a.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let entry = CatalogEntry {
            identifier: "rvu19a".into(),
            location: Url::parse(&format!("{}/pfs/rvu19a", server.uri()))?,
        };

        let saved = fetch_archive(&Client::new(), &entry, "zip", dir.path()).await?;

        assert_eq!(saved, dir.path().join("rvu19a.zip"));
        assert_eq!(std::fs::read(&saved)?, b"PK-bytes");
        assert!(!dir.path().join("rvu19a.zip.part").exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_download_leaves_no_archive() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/zip/rvu19a.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let url = Url::parse(&format!("{}/files/zip/rvu19a.zip", server.uri()))?;
        let res = download_archive(&Client::new(), &url, dir.path(), "rvu19a", "zip").await;

        assert!(res.is_err());
        assert!(!dir.path().join("rvu19a.zip").exists());
        Ok(())
    }
}
