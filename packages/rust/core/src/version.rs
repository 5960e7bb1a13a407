//! Release version resolution before a remote install.

use tracing::info;

use manifestgen_release::{ReleaseClient, normalize_tag};
use manifestgen_shared::{ManifestGenError, Result};

/// Turn a requested version into a concrete, published release tag.
///
/// `latest` (or empty) is resolved through the release API; any other
/// version is normalized to a `v` tag and must exist.
pub async fn resolve_version(client: &ReleaseClient, requested: &str) -> Result<String> {
    if requested.is_empty() || requested == "latest" {
        let tag = client.latest_version().await?;
        info!(%tag, "using latest release");
        return Ok(tag);
    }

    let tag = normalize_tag(requested);
    if !client.version_exists(&tag).await? {
        return Err(ManifestGenError::validation(format!(
            "release {tag} does not exist"
        )));
    }
    Ok(tag)
}
