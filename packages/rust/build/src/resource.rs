//! Resource documents parsed from configuration fragments.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use manifestgen_shared::{ManifestGenError, Result};

/// Identity of a resource inside one build. Two resources with the same id
/// cannot coexist in the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)?;
        } else {
            write!(f, "{}.{}/{}", self.kind, self.group, self.name)?;
        }
        if !self.namespace.is_empty() {
            write!(f, " in {}", self.namespace)?;
        }
        Ok(())
    }
}

/// A single resource document (a YAML mapping with `kind` and `metadata.name`).
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    doc: Mapping,
}

impl Resource {
    /// Wrap a parsed document, validating it names a resource.
    pub fn from_mapping(doc: Mapping, origin: &Path) -> Result<Self> {
        let resource = Self { doc };
        if resource.kind().is_empty() {
            return Err(ManifestGenError::Build(format!(
                "{}: document is missing 'kind'",
                origin.display()
            )));
        }
        if resource.name().is_empty() {
            return Err(ManifestGenError::Build(format!(
                "{}: {} is missing 'metadata.name'",
                origin.display(),
                resource.kind()
            )));
        }
        Ok(resource)
    }

    pub fn api_version(&self) -> &str {
        str_at(&self.doc, "apiVersion").unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        str_at(&self.doc, "kind").unwrap_or_default()
    }

    /// API group (empty for the core group).
    pub fn group(&self) -> &str {
        self.api_version()
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| str_at(m, "name"))
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().and_then(|m| str_at(m, "namespace"))
    }

    pub fn id(&self) -> ResourceId {
        ResourceId {
            group: self.group().to_string(),
            kind: self.kind().to_string(),
            namespace: self.namespace().unwrap_or_default().to_string(),
            name: self.name().to_string(),
        }
    }

    fn metadata(&self) -> Option<&Mapping> {
        self.doc.get("metadata").and_then(Value::as_mapping)
    }

    pub fn set_name(&mut self, name: &str) {
        merge_into(&mut self.doc, "metadata", [(Value::from("name"), Value::from(name))]);
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        merge_into(
            &mut self.doc,
            "metadata",
            [(Value::from("namespace"), Value::from(namespace))],
        );
    }

    /// Merge `entries` into `metadata.<field>` (e.g. `labels`).
    pub fn merge_metadata(
        &mut self,
        field: &str,
        entries: impl IntoIterator<Item = (Value, Value)>,
    ) {
        if let Some(Value::Mapping(metadata)) = self.doc.get_mut("metadata") {
            merge_into(metadata, field, entries);
        }
    }

    pub(crate) fn doc_mut(&mut self) -> &mut Mapping {
        &mut self.doc
    }

    /// Render as a single YAML document (no separator).
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.doc).map_err(|e| {
            ManifestGenError::Build(format!("failed to serialize {}: {e}", self.id()))
        })
    }
}

/// Parse a multi-document YAML fragment into resources.
///
/// Empty documents are skipped; `kind: List` documents are expanded into
/// their `items`.
pub fn parse_documents(text: &str, origin: &Path) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document).map_err(|e| {
            ManifestGenError::Build(format!("{}: malformed YAML: {e}", origin.display()))
        })?;

        match value {
            Value::Null => continue,
            Value::Mapping(doc) if is_list(&doc) => {
                let items = doc
                    .get("items")
                    .and_then(Value::as_sequence)
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    resources.push(into_resource(item, origin)?);
                }
            }
            other => resources.push(into_resource(other, origin)?),
        }
    }

    Ok(resources)
}

fn is_list(doc: &Mapping) -> bool {
    str_at(doc, "kind").is_some_and(|kind| kind == "List") && doc.contains_key("items")
}

fn into_resource(value: Value, origin: &Path) -> Result<Resource> {
    match value {
        Value::Mapping(doc) => Resource::from_mapping(doc, origin),
        _ => Err(ManifestGenError::Build(format!(
            "{}: document is not a mapping",
            origin.display()
        ))),
    }
}

pub(crate) fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Merge `entries` into the child mapping at `key`, replacing any
/// non-mapping value there.
pub(crate) fn merge_into(
    map: &mut Mapping,
    key: &str,
    entries: impl IntoIterator<Item = (Value, Value)>,
) {
    match map.get_mut(key) {
        Some(Value::Mapping(child)) => child.extend(entries),
        Some(other) => *other = Value::Mapping(entries.into_iter().collect()),
        None => {
            map.insert(Value::from(key), Value::Mapping(entries.into_iter().collect()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "test.yaml";

    #[test]
    fn parses_multiple_documents() {
        let text = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: controller
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: controller
  namespace: default
";
        let resources = parse_documents(text, Path::new(ORIGIN)).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), "ServiceAccount");
        assert_eq!(resources[0].group(), "");
        assert_eq!(resources[1].group(), "apps");
        assert_eq!(resources[1].namespace(), Some("default"));
    }

    #[test]
    fn expands_lists() {
        let text = "\
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: a
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: b
";
        let resources = parse_documents(text, Path::new(ORIGIN)).unwrap();
        let names: Vec<_> = resources.iter().map(Resource::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rejects_missing_name() {
        let err = parse_documents("apiVersion: v1\nkind: ConfigMap\n", Path::new(ORIGIN))
            .unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = parse_documents("kind: [unclosed\n", Path::new(ORIGIN)).unwrap_err();
        assert!(matches!(err, ManifestGenError::Build(_)));
    }

    #[test]
    fn merge_metadata_replaces_scalar_field() {
        let mut resources = parse_documents(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n  labels: stale\n",
            Path::new(ORIGIN),
        )
        .unwrap();
        let resource = &mut resources[0];
        resource.merge_metadata("labels", [(Value::from("tier"), Value::from("web"))]);
        resource.merge_metadata("labels", [(Value::from("team"), Value::from("ops"))]);
        resource.set_namespace("prod");

        let yaml = resource.to_yaml().unwrap();
        assert!(yaml.contains("tier: web"));
        assert!(yaml.contains("team: ops"));
        assert!(!yaml.contains("stale"));
        assert_eq!(resource.namespace(), Some("prod"));
        assert_eq!(resource.name(), "a");
    }

    #[test]
    fn id_display() {
        let resources = parse_documents(
            "apiVersion: rbac.authorization.k8s.io/v1\n\
             kind: Role\n\
             metadata:\n  name: r\n  namespace: ns\n",
            Path::new(ORIGIN),
        )
        .unwrap();
        assert_eq!(resources[0].id().to_string(), "Role.rbac.authorization.k8s.io/r in ns");
    }
}
