//! The overlay declaration file (`kustomization.yaml`).
//!
//! Only the fields the builder knows how to apply are modeled; unknown
//! fields are ignored on read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use manifestgen_shared::{ManifestGenError, Result};

/// File names recognized as a kustomization, in lookup order.
pub const KUSTOMIZATION_FILES: &[&str] =
    &["kustomization.yaml", "kustomization.yml", "Kustomization"];

const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
const KIND: &str = "Kustomization";

/// A kustomization: resources to compose plus the transforms applied to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    /// Namespace set on every namespaced resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,

    /// Labels merged into `metadata.labels`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,

    /// Annotations merged into `metadata.annotations`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,

    /// Files or directories, relative to the kustomization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageOverride>,
}

/// Container image rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverride {
    /// Image name to match, without tag or digest.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

fn default_api_version() -> String {
    API_VERSION.into()
}
fn default_kind() -> String {
    KIND.into()
}

impl Default for Kustomization {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            namespace: None,
            name_prefix: None,
            name_suffix: None,
            common_labels: BTreeMap::new(),
            common_annotations: BTreeMap::new(),
            resources: Vec::new(),
            images: Vec::new(),
        }
    }
}

impl Kustomization {
    /// Locate the kustomization file inside `dir`, if any.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        KUSTOMIZATION_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Read and parse the kustomization in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::find(dir).ok_or_else(|| {
            ManifestGenError::Build(format!(
                "no kustomization file found in {}",
                dir.display()
            ))
        })?;

        let content = std::fs::read_to_string(&path).map_err(|e| ManifestGenError::io(&path, e))?;
        serde_yaml::from_str(&content).map_err(|e| {
            ManifestGenError::Build(format!("invalid kustomization {}: {e}", path.display()))
        })
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| {
                ManifestGenError::Build(format!("kustomization serialization failed: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_fields() {
        let yaml = r#"
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namespace: apps
namePrefix: dev-
commonLabels:
  team: platform
resources:
  - deployment.yaml
  - ../base
images:
  - name: nginx
    newTag: "1.25"
"#;
        let k: Kustomization = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(k.namespace.as_deref(), Some("apps"));
        assert_eq!(k.name_prefix.as_deref(), Some("dev-"));
        assert_eq!(k.common_labels["team"], "platform");
        assert_eq!(k.resources, vec!["deployment.yaml", "../base"]);
        assert_eq!(k.images[0].new_tag.as_deref(), Some("1.25"));
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let k: Kustomization = serde_yaml::from_str("resources: [a.yaml]\n").unwrap();
        assert_eq!(k.kind, "Kustomization");
        assert!(k.namespace.is_none());
    }

    #[test]
    fn serialization_omits_empty_fields() {
        let k = Kustomization {
            namespace: Some("ns".into()),
            resources: vec!["a.yaml".into()],
            ..Kustomization::default()
        };
        let yaml = k.to_yaml().unwrap();
        assert!(yaml.starts_with("apiVersion: kustomize.config.k8s.io/v1beta1\n"));
        assert!(yaml.contains("namespace: ns"));
        assert!(!yaml.contains("images"));
        assert!(!yaml.contains("namePrefix"));
    }

    #[test]
    fn load_missing_file_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Kustomization::load(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestGenError::Build(_)));
    }

    #[test]
    fn find_accepts_yml_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kustomization.yml"), "resources: []\n").unwrap();
        assert_eq!(
            Kustomization::find(dir.path()),
            Some(dir.path().join("kustomization.yml"))
        );
    }
}
