//! Flattening a kustomization directory into one multi-document stream.
//!
//! A directory holds a `kustomization.yaml` listing its resources (YAML
//! files or nested kustomization directories). Resources are loaded
//! depth-first, each level's transforms are applied to everything beneath
//! it, and the result is sorted and written as `---`-separated documents.

pub mod kustomization;
pub mod order;
pub mod resource;
pub mod transform;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use manifestgen_shared::{ManifestGenError, Result};

pub use kustomization::{ImageOverride, KUSTOMIZATION_FILES, Kustomization};
pub use resource::{Resource, ResourceId, parse_documents};

/// Separator between documents in the rendered stream.
pub const DOCUMENT_SEPARATOR: &str = "---\n";

/// Build `source_dir` and write the rendered stream to `output_file`.
///
/// Parent directories of `output_file` are created as needed. The write
/// is a plain overwrite.
#[instrument(skip_all, fields(source = %source_dir.display(), output = %output_file.display()))]
pub fn build(source_dir: &Path, output_file: &Path) -> Result<()> {
    let rendered = render(source_dir)?;

    if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ManifestGenError::io(parent, e))?;
    }
    std::fs::write(output_file, &rendered).map_err(|e| ManifestGenError::io(output_file, e))?;

    info!(bytes = rendered.len(), "build output written");
    Ok(())
}

/// Build `source_dir` and return the rendered stream.
pub fn render(source_dir: &Path) -> Result<String> {
    let mut visiting = Vec::new();
    let mut resources = load_dir(source_dir, &mut visiting)?;
    order::sort(&mut resources);

    let documents = resources
        .iter()
        .map(Resource::to_yaml)
        .collect::<Result<Vec<_>>>()?;

    debug!(documents = documents.len(), "rendered resources");
    Ok(documents.join(DOCUMENT_SEPARATOR))
}

/// Load one kustomization level: its resources, then its transforms.
fn load_dir(dir: &Path, visiting: &mut Vec<PathBuf>) -> Result<Vec<Resource>> {
    let canonical = dir.canonicalize().map_err(|e| {
        ManifestGenError::Build(format!("cannot access {}: {e}", dir.display()))
    })?;
    if visiting.contains(&canonical) {
        return Err(ManifestGenError::Build(format!(
            "cycle detected: {} is included by itself",
            dir.display()
        )));
    }
    visiting.push(canonical);

    let kustomization = Kustomization::load(dir)?;
    let mut resources = Vec::new();

    for entry in &kustomization.resources {
        if entry.contains("://") {
            return Err(ManifestGenError::Build(format!(
                "{}: remote resource '{entry}' is not supported",
                dir.display()
            )));
        }

        let path = dir.join(entry);
        if path.is_dir() {
            resources.extend(load_dir(&path, visiting)?);
        } else if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|e| ManifestGenError::io(&path, e))?;
            resources.extend(parse_documents(&text, &path)?);
        } else {
            return Err(ManifestGenError::Build(format!(
                "{}: resource '{entry}' does not exist",
                dir.display()
            )));
        }
    }

    check_unique(&resources, dir)?;
    transform::apply(&kustomization, &mut resources);
    check_unique(&resources, dir)?;

    visiting.pop();
    debug!(dir = %dir.display(), count = resources.len(), "kustomization loaded");
    Ok(resources)
}

fn check_unique(resources: &[Resource], dir: &Path) -> Result<()> {
    let mut seen = HashSet::new();
    for resource in resources {
        let id = resource.id();
        if !seen.insert(id.clone()) {
            return Err(ManifestGenError::Build(format!(
                "{}: duplicate resource {id}",
                dir.display()
            )));
        }
    }
    Ok(())
}
