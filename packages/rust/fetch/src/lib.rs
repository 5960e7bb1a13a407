//! Release archive download and extraction.
//!
//! A release publishes its install fragments as `manifests.tar.gz`. We
//! download it in a single attempt under the caller's deadline and unpack
//! it so the destination has the same layout as a local checkout.

mod archive;

use std::path::Path;
use std::time::Duration;

use manifestgen_release::normalize_tag;
use manifestgen_shared::{ManifestGenError, Result};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};
use url::Url;

pub use archive::unpack_tar_gz;

/// Name of the release asset holding the install fragments.
pub const ARCHIVE_NAME: &str = "manifests.tar.gz";

/// Maximum archive size we accept (50 MB).
const MAX_ARCHIVE_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of redirects (release assets are served via a CDN redirect).
const MAX_REDIRECTS: usize = 10;

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("manifestgen/", env!("CARGO_PKG_VERSION"));

/// Download URL of the archive for `version` under the release root `base_url`.
///
/// `latest` (or an empty version) maps to the host's latest-release redirect.
pub fn archive_url(base_url: &Url, version: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    if version.is_empty() || version == "latest" {
        format!("{base}/latest/download/{ARCHIVE_NAME}")
    } else {
        format!("{base}/download/{}/{ARCHIVE_NAME}", normalize_tag(version))
    }
}

/// Download the release archive and unpack it into `dest`.
///
/// The download is bounded by `timeout`; expiry surfaces as
/// [`ManifestGenError::Timeout`]. Any other failure is a
/// [`ManifestGenError::Fetch`], and `dest` is left without partial content.
#[instrument(skip_all, fields(base_url = %base_url, version = %version, dest = %dest.display()))]
pub async fn fetch(base_url: &Url, version: &str, dest: &Path, timeout: Duration) -> Result<()> {
    let url = archive_url(base_url, version);
    info!(%url, "downloading release archive");

    let client = build_client(&url)?;
    let bytes = tokio::time::timeout(timeout, download(&client, &url))
        .await
        .map_err(|_| ManifestGenError::Timeout {
            operation: format!("download of {url}"),
            after: timeout,
        })??;

    debug!(size = bytes.len(), "archive downloaded, unpacking");

    let dest_owned = dest.to_path_buf();
    let files = tokio::task::spawn_blocking(move || unpack_tar_gz(&bytes, &dest_owned))
        .await
        .map_err(|e| ManifestGenError::fetch(&url, format!("extraction task failed: {e}")))?
        .map_err(|e| ManifestGenError::fetch(&url, format!("failed to extract archive: {e}")))?;

    info!(files, "release archive unpacked");
    Ok(())
}

/// Build a dedicated client for this download.
fn build_client(url: &str) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| ManifestGenError::fetch(url, format!("failed to build HTTP client: {e}")))
}

/// GET the archive and return its full body.
async fn download(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ManifestGenError::fetch(url, e.to_string()))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(ManifestGenError::fetch(url, format!("status: {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_ARCHIVE_SIZE {
            return Err(ManifestGenError::fetch(
                url,
                format!("archive too large ({len} bytes, max {MAX_ARCHIVE_SIZE})"),
            ));
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ManifestGenError::fetch(url, format!("failed to read body: {e}")))?;

    if body.len() as u64 > MAX_ARCHIVE_SIZE {
        return Err(ManifestGenError::fetch(
            url,
            format!("archive too large ({} bytes, max {MAX_ARCHIVE_SIZE})", body.len()),
        ));
    }

    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::tar_gz;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn releases_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/releases", server.uri())).unwrap()
    }

    #[test]
    fn test_archive_url() {
        let base = Url::parse("https://github.com/fluxcd/flux2/releases").unwrap();
        assert_eq!(
            archive_url(&base, "2.3.0"),
            "https://github.com/fluxcd/flux2/releases/download/v2.3.0/manifests.tar.gz"
        );
        assert_eq!(
            archive_url(&base, "latest"),
            "https://github.com/fluxcd/flux2/releases/latest/download/manifests.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_fetch_unpacks_archive() {
        let server = MockServer::start().await;
        let body = tar_gz(&[("source-controller.yaml", "kind: Deployment\n")]);

        Mock::given(method("GET"))
            .and(path("/releases/download/v1.0.0/manifests.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        fetch(&releases_url(&server), "v1.0.0", dir.path(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(dir.path().join("source-controller.yaml").is_file());
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/releases/download/v0.0.1/manifests.tar.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetch(&releases_url(&server), "0.0.1", dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ManifestGenError::Fetch { url, message } => {
                assert!(url.ends_with("/download/v0.0.1/manifests.tar.gz"));
                assert!(message.contains("404"));
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_bad_archive() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/releases/latest/download/manifests.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not an archive"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetch(&releases_url(&server), "latest", dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ManifestGenError::Fetch { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/releases/download/v1.0.0/manifests.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetch(
            &releases_url(&server),
            "v1.0.0",
            dir.path(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ManifestGenError::Timeout { .. }));
    }
}
