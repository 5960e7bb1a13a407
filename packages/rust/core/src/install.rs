//! End-to-end install generation: source → (fetch → overlay) → build → manifest.

use std::path::Path;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, info, instrument};

use manifestgen_shared::{
    Manifest, ManifestGenError, Options, Result, SourceLocator, logical_path, secure_join,
};

/// Progress callback for reporting generation phases.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the manifest has been produced.
    fn done(&self, manifest: &Manifest);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _manifest: &Manifest) {}
}

/// Generate the install manifest as a multi-document YAML stream.
///
/// A local source is built as-is. A remote source is downloaded into a
/// fresh temporary directory (removed before returning, on success or
/// failure) unless `manifests_base` already holds the release content;
/// either way an overlay for `options` is generated and built. The
/// options' timeout bounds the download only.
pub async fn generate(options: &Options, manifests_base: Option<&Path>) -> Result<Manifest> {
    generate_with_progress(options, manifests_base, &SilentProgress).await
}

/// [`generate`] with phase reporting.
pub async fn generate_with_progress(
    options: &Options,
    manifests_base: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<Manifest> {
    generate_in(options, manifests_base, &std::env::temp_dir(), progress).await
}

#[instrument(skip_all, fields(source = %options.source, namespace = %options.namespace))]
async fn generate_in(
    options: &Options,
    manifests_base: Option<&Path>,
    temp_root: &Path,
    progress: &dyn ProgressReporter,
) -> Result<Manifest> {
    let start = Instant::now();
    options.validate()?;

    let manifests_base = manifests_base.filter(|base| !base.as_os_str().is_empty());

    // Removed on drop, whichever way this function returns.
    let workdir = match (&options.source, manifests_base) {
        (SourceLocator::RemoteRelease { .. }, None) => {
            Some(create_workdir(temp_root, &options.namespace)?)
        }
        _ => None,
    };
    let base_dir = workdir
        .as_ref()
        .map(TempDir::path)
        .or(manifests_base)
        .unwrap_or(Path::new(""));

    let output = secure_join(base_dir, &options.manifest_file)?;

    match &options.source {
        SourceLocator::LocalPath(path) => {
            progress.phase("Building manifests");
            manifestgen_build::build(path, &output)?;
        }
        SourceLocator::RemoteRelease { base_url, version } => {
            match &workdir {
                Some(dir) => {
                    progress.phase("Downloading release");
                    manifestgen_fetch::fetch(base_url, version, dir.path(), options.timeout)
                        .await?;
                }
                None => debug!(base = %base_dir.display(), "using pre-fetched release content"),
            }

            progress.phase("Generating overlay");
            manifestgen_overlay::generate(base_dir, options)?;

            progress.phase("Building manifests");
            manifestgen_build::build(base_dir, &output)?;
        }
    }

    let content = tokio::fs::read_to_string(&output)
        .await
        .map_err(|e| ManifestGenError::Read {
            path: output.clone(),
            source: e,
        })?;

    let manifest = Manifest {
        path: logical_path(&[&options.target_path, &options.namespace, &options.manifest_file]),
        content,
    };

    progress.done(&manifest);
    info!(
        path = %manifest.path,
        bytes = manifest.content.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "install manifest generated"
    );

    Ok(manifest)
}

/// Fresh working directory under `temp_root`, named after the namespace.
fn create_workdir(temp_root: &Path, namespace: &str) -> Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("{namespace}-"))
        .tempdir_in(temp_root)
        .map_err(|e| ManifestGenError::io(temp_root, e))?;
    debug!(path = %dir.path().display(), "created working directory");
    Ok(dir)
}
