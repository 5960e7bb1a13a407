//! Core domain types: the install request and its output.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ManifestGenError, Result};

/// Default namespace the components are installed into.
pub const DEFAULT_NAMESPACE: &str = "flux-system";

/// Default release download root.
pub const DEFAULT_BASE_URL: &str = "https://github.com/fluxcd/flux2/releases";

/// Default name of the rendered multi-doc YAML file.
pub const DEFAULT_MANIFEST_FILE: &str = "gotk-components.yaml";

/// Registry the upstream release images are published under.
pub const DEFAULT_REGISTRY: &str = "ghcr.io/fluxcd";

/// Components installed when none are requested explicitly.
pub const DEFAULT_COMPONENTS: &[&str] = &[
    "source-controller",
    "kustomize-controller",
    "helm-controller",
    "notification-controller",
];

static DNS1123_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

// ---------------------------------------------------------------------------
// SourceLocator
// ---------------------------------------------------------------------------

/// Where the raw configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A local kustomization directory, built as-is.
    LocalPath(PathBuf),
    /// A published release archive.
    RemoteRelease {
        /// Release root, e.g. `https://github.com/org/repo/releases`.
        base_url: Url,
        /// Release tag (`v1.2.3`) or `latest`.
        version: String,
    },
}

impl SourceLocator {
    /// Interpret a user-supplied locator string.
    ///
    /// Anything starting with `http` is a remote release root and must parse
    /// as a URL; everything else is a filesystem path.
    pub fn parse(locator: &str, version: &str) -> Result<Self> {
        if locator.starts_with("http") {
            let base_url = Url::parse(locator).map_err(|e| {
                ManifestGenError::validation(format!("invalid base URL '{locator}': {e}"))
            })?;
            Ok(Self::RemoteRelease {
                base_url,
                version: version.to_string(),
            })
        } else {
            Ok(Self::LocalPath(PathBuf::from(locator)))
        }
    }

    /// Whether this locator requires a network fetch.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRelease { .. })
    }

    /// Release version, if the source is remote.
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::RemoteRelease { version, .. } => Some(version),
            Self::LocalPath(_) => None,
        }
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalPath(path) => write!(f, "{}", path.display()),
            Self::RemoteRelease { base_url, version } => write!(f, "{base_url}@{version}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Immutable request descriptor for one install generation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Where the base configuration comes from.
    pub source: SourceLocator,
    /// Namespace applied to every namespaced resource.
    pub namespace: String,
    /// Path prefix of the logical manifest location.
    pub target_path: String,
    /// File name the rendered stream is written to.
    pub manifest_file: String,
    /// Deadline for the network-bound fetch step.
    pub timeout: Duration,
    /// Components included from the release.
    pub components: Vec<String>,
    /// Additional components on top of `components`.
    pub components_extra: Vec<String>,
    /// Container registry the images are pulled from.
    pub registry: String,
    /// Optional prefix added to every resource name.
    pub name_prefix: Option<String>,
    /// Include the release's network policies.
    pub network_policy: bool,
}

impl Options {
    /// Options for a source with every customization at its default.
    pub fn new(source: SourceLocator) -> Self {
        Self {
            source,
            namespace: DEFAULT_NAMESPACE.into(),
            target_path: String::new(),
            manifest_file: DEFAULT_MANIFEST_FILE.into(),
            timeout: Duration::from_secs(60),
            components: DEFAULT_COMPONENTS.iter().map(|c| (*c).to_string()).collect(),
            components_extra: Vec::new(),
            registry: DEFAULT_REGISTRY.into(),
            name_prefix: None,
            network_policy: true,
        }
    }

    /// All requested components, base list first, without duplicates.
    pub fn all_components(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for c in self.components.iter().chain(&self.components_extra) {
            if !all.contains(c) {
                all.push(c.clone());
            }
        }
        all
    }

    /// Check the request is well-formed before touching disk or network.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.len() > 63 || !DNS1123_LABEL.is_match(&self.namespace) {
            return Err(ManifestGenError::validation(format!(
                "namespace '{}' is not a valid DNS-1123 label",
                self.namespace
            )));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(ManifestGenError::validation("manifest file name is empty"));
        }
        if self.timeout.is_zero() {
            return Err(ManifestGenError::validation("timeout must be greater than zero"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The rendered install stream and where it is meant to live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Logical path: `target_path/namespace/manifest_file`.
    pub path: String,
    /// Full multi-document YAML content.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_http_prefix_is_remote() {
        let loc = SourceLocator::parse("https://github.com/org/repo/releases", "v1.0.0").unwrap();
        assert!(loc.is_remote());
        assert_eq!(loc.version(), Some("v1.0.0"));
    }

    #[test]
    fn locator_path_is_local() {
        let loc = SourceLocator::parse("./manifests/install", "v1.0.0").unwrap();
        assert_eq!(loc, SourceLocator::LocalPath(PathBuf::from("./manifests/install")));
        assert_eq!(loc.version(), None);
    }

    #[test]
    fn locator_rejects_bad_url() {
        assert!(SourceLocator::parse("http://", "latest").is_err());
    }

    #[test]
    fn options_namespace_validation() {
        let mut opts = Options::new(SourceLocator::LocalPath("x".into()));
        assert!(opts.validate().is_ok());

        opts.namespace = "Not_Valid".into();
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("DNS-1123"));

        opts.namespace = "a".repeat(64);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn options_all_components_dedupes() {
        let mut opts = Options::new(SourceLocator::LocalPath("x".into()));
        opts.components = vec!["a".into(), "b".into()];
        opts.components_extra = vec!["b".into(), "c".into()];
        assert_eq!(opts.all_components(), vec!["a", "b", "c"]);
    }

    #[test]
    fn manifest_serialization() {
        let manifest = Manifest {
            path: "clusters/flux-system/gotk-components.yaml".into(),
            content: "apiVersion: v1\nkind: Namespace\n".into(),
        };
        let json = serde_json::to_string(&manifest).expect("serialize");
        let parsed: Manifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, manifest);
    }
}
