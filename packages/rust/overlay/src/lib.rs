//! Overlay generation for fetched release content.
//!
//! Writes a root `kustomization.yaml` (plus the namespace document it
//! references) next to the release's component fragments, so the builder
//! renders exactly the requested components into the requested namespace.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument};

use manifestgen_build::{ImageOverride, Kustomization};
use manifestgen_release::normalize_tag;
use manifestgen_shared::{DEFAULT_REGISTRY, ManifestGenError, Options, Result};

/// Overlay declaration written at the root of the base directory.
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Generated namespace document.
pub const NAMESPACE_FILE: &str = "namespace.yaml";

/// Release fragment holding the network policies.
pub const POLICIES_FILE: &str = "policies.yaml";

const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
const VERSION_LABEL: &str = "app.kubernetes.io/version";

/// Write (or overwrite) the overlay declaration in `base_dir` for `options`.
///
/// Running it twice with the same options leaves identical files.
#[instrument(skip_all, fields(base = %base_dir.display(), namespace = %options.namespace))]
pub fn generate(base_dir: &Path, options: &Options) -> Result<()> {
    if !base_dir.is_dir() {
        return Err(ManifestGenError::Generation(format!(
            "base directory {} does not exist",
            base_dir.display()
        )));
    }

    let kustomization = overlay_for(base_dir, options)?;
    let yaml = kustomization
        .to_yaml()
        .map_err(|e| ManifestGenError::Generation(e.to_string()))?;

    write_file(&base_dir.join(NAMESPACE_FILE), &namespace_document(&options.namespace))?;
    write_file(&base_dir.join(KUSTOMIZATION_FILE), &yaml)?;

    info!(
        resources = kustomization.resources.len(),
        images = kustomization.images.len(),
        "overlay generated"
    );
    Ok(())
}

/// Compute the overlay declaration without writing anything.
pub fn overlay_for(base_dir: &Path, options: &Options) -> Result<Kustomization> {
    let mut resources = vec![NAMESPACE_FILE.to_string()];

    if options.network_policy {
        if !base_dir.join(POLICIES_FILE).is_file() {
            return Err(ManifestGenError::Generation(format!(
                "network policies requested but {POLICIES_FILE} is missing from {}",
                base_dir.display()
            )));
        }
        resources.push(POLICIES_FILE.to_string());
    }

    let components = options.all_components();
    for component in &components {
        resources.push(component_resource(base_dir, component)?);
    }

    let mut labels = BTreeMap::from([(INSTANCE_LABEL.to_string(), options.namespace.clone())]);
    if let Some(version) = options.source.version().filter(|v| !v.is_empty() && *v != "latest") {
        labels.insert(VERSION_LABEL.to_string(), normalize_tag(version));
    }

    Ok(Kustomization {
        namespace: Some(options.namespace.clone()),
        name_prefix: options.name_prefix.clone().filter(|p| !p.is_empty()),
        common_labels: labels,
        resources,
        images: image_overrides(&options.registry, &components),
        ..Kustomization::default()
    })
}

/// Resource entry for a component: `<name>.yaml` or a `<name>/` directory.
fn component_resource(base_dir: &Path, component: &str) -> Result<String> {
    if component.is_empty() || component.contains(['/', '\\']) || component.starts_with('.') {
        return Err(ManifestGenError::Generation(format!(
            "invalid component name '{component}'"
        )));
    }

    let file = format!("{component}.yaml");
    if base_dir.join(&file).is_file() {
        return Ok(file);
    }
    if base_dir.join(component).is_dir() {
        return Ok(component.to_string());
    }

    Err(ManifestGenError::Generation(format!(
        "component '{component}' not found in {} (expected {file} or {component}/)",
        base_dir.display()
    )))
}

/// Image rewrites moving every component to a custom registry.
fn image_overrides(registry: &str, components: &[String]) -> Vec<ImageOverride> {
    let registry = registry.trim_end_matches('/');
    if registry.is_empty() || registry == DEFAULT_REGISTRY {
        return Vec::new();
    }

    components
        .iter()
        .map(|c| ImageOverride {
            name: format!("{DEFAULT_REGISTRY}/{c}"),
            new_name: Some(format!("{registry}/{c}")),
            new_tag: None,
            digest: None,
        })
        .collect()
}

fn namespace_document(namespace: &str) -> String {
    format!(
        "apiVersion: v1\n\
         kind: Namespace\n\
         metadata:\n  \
           name: {namespace}\n  \
           labels:\n    \
             {INSTANCE_LABEL}: {namespace}\n"
    )
}

/// Write via a temp file and rename, so a reader never sees half a file.
fn write_file(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    let write_error = |target: &Path, e: std::io::Error| {
        ManifestGenError::Generation(format!("failed to write {}: {e}", target.display()))
    };
    std::fs::write(&temp, content).map_err(|e| write_error(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| write_error(path, e))?;

    debug!(path = %path.display(), "wrote overlay file");
    Ok(())
}
