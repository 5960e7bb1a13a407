//! Overlay transforms applied to the resources of one kustomization.

use std::collections::{BTreeMap, HashMap};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::kustomization::{ImageOverride, Kustomization};
use crate::resource::{Resource, str_at};

/// Kinds that are not namespaced.
const CLUSTER_SCOPED: &[&str] = &[
    "APIService",
    "ClusterIssuer",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

/// Kinds whose names are never prefixed or suffixed.
const NAME_PRESERVED: &[&str] = &["Namespace", "CustomResourceDefinition"];

/// Kinds embedding a pod template at `spec.template`.
const TEMPLATED_WORKLOADS: &[&str] =
    &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"];

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED.contains(&kind)
}

/// Apply every transform declared by `kustomization`, in a fixed order.
pub fn apply(kustomization: &Kustomization, resources: &mut [Resource]) {
    if let Some(namespace) = &kustomization.namespace {
        set_namespace(resources, namespace);
    }

    let prefix = kustomization.name_prefix.as_deref().unwrap_or_default();
    let suffix = kustomization.name_suffix.as_deref().unwrap_or_default();
    if !prefix.is_empty() || !suffix.is_empty() {
        rename(resources, prefix, suffix);
    }

    if !kustomization.common_labels.is_empty() {
        merge_metadata(resources, "labels", &kustomization.common_labels);
    }
    if !kustomization.common_annotations.is_empty() {
        merge_metadata(resources, "annotations", &kustomization.common_annotations);
    }

    if !kustomization.images.is_empty() {
        for resource in resources.iter_mut() {
            override_images(resource, &kustomization.images);
        }
    }
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

fn set_namespace(resources: &mut [Resource], namespace: &str) {
    for resource in resources.iter_mut() {
        if !is_cluster_scoped(resource.kind()) {
            resource.set_namespace(namespace);
        }

        if matches!(resource.kind(), "RoleBinding" | "ClusterRoleBinding") {
            for subject in subjects_mut(resource) {
                if str_at(subject, "kind") == Some("ServiceAccount") {
                    subject.insert("namespace".into(), namespace.into());
                }
            }
        }
    }
    debug!(%namespace, count = resources.len(), "namespace applied");
}

// ---------------------------------------------------------------------------
// Name prefix / suffix
// ---------------------------------------------------------------------------

fn rename(resources: &mut [Resource], prefix: &str, suffix: &str) {
    let mut renamed: HashMap<(String, String), String> = HashMap::new();

    for resource in resources.iter_mut() {
        if NAME_PRESERVED.contains(&resource.kind()) {
            continue;
        }
        let old = resource.name().to_string();
        let new = format!("{prefix}{old}{suffix}");
        renamed.insert((resource.kind().to_string(), old), new.clone());
        resource.set_name(&new);
    }

    // Keep references between renamed resources intact.
    let lookup = |kind: &str, name: &str| {
        renamed
            .get(&(kind.to_string(), name.to_string()))
            .cloned()
    };

    for resource in resources.iter_mut() {
        if matches!(resource.kind(), "RoleBinding" | "ClusterRoleBinding") {
            if let Some(Value::Mapping(role_ref)) = resource.doc_mut().get_mut("roleRef") {
                rewrite_ref(role_ref, &lookup);
            }
            for subject in subjects_mut(resource) {
                rewrite_ref(subject, &lookup);
            }
        }

        if let Some(pod_spec) = pod_spec_mut(resource) {
            let new_sa = str_at(pod_spec, "serviceAccountName")
                .and_then(|sa| lookup("ServiceAccount", sa));
            if let Some(new) = new_sa {
                pod_spec.insert("serviceAccountName".into(), new.into());
            }
        }
    }
}

fn rewrite_ref(reference: &mut Mapping, lookup: &impl Fn(&str, &str) -> Option<String>) {
    let (Some(kind), Some(name)) = (str_at(reference, "kind"), str_at(reference, "name")) else {
        return;
    };
    if let Some(new) = lookup(kind, name) {
        reference.insert("name".into(), new.into());
    }
}

// ---------------------------------------------------------------------------
// Labels / annotations
// ---------------------------------------------------------------------------

fn merge_metadata(resources: &mut [Resource], field: &str, pairs: &BTreeMap<String, String>) {
    for resource in resources.iter_mut() {
        resource.merge_metadata(
            field,
            pairs
                .iter()
                .map(|(key, value)| (Value::from(key.as_str()), Value::from(value.as_str()))),
        );
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn override_images(resource: &mut Resource, overrides: &[ImageOverride]) {
    let Some(pod_spec) = pod_spec_mut(resource) else {
        return;
    };

    for field in ["initContainers", "containers"] {
        let Some(Value::Sequence(containers)) = pod_spec.get_mut(field) else {
            continue;
        };
        for container in containers.iter_mut().filter_map(Value::as_mapping_mut) {
            let Some(image) = str_at(container, "image") else {
                continue;
            };
            if let Some(new) = rewrite_image(image, overrides) {
                container.insert("image".into(), new.into());
            }
        }
    }
}

/// Split an image reference into `(name, tag-or-digest suffix)`.
fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }
    let last_slash = image.rfind('/').map_or(0, |i| i + 1);
    match image[last_slash..].rfind(':') {
        Some(colon) => image.split_at(last_slash + colon),
        None => (image, ""),
    }
}

/// Apply the first matching override to `image`.
pub fn rewrite_image(image: &str, overrides: &[ImageOverride]) -> Option<String> {
    let (name, suffix) = split_image(image);
    let rule = overrides.iter().find(|o| o.name == name)?;

    let new_name = rule.new_name.as_deref().unwrap_or(name);
    let new_suffix = match (&rule.digest, &rule.new_tag) {
        (Some(digest), _) => format!("@{digest}"),
        (None, Some(tag)) => format!(":{tag}"),
        (None, None) => suffix.to_string(),
    };
    Some(format!("{new_name}{new_suffix}"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn subjects_mut(resource: &mut Resource) -> impl Iterator<Item = &mut Mapping> {
    resource
        .doc_mut()
        .get_mut("subjects")
        .and_then(Value::as_sequence_mut)
        .into_iter()
        .flat_map(|subjects| subjects.iter_mut().filter_map(Value::as_mapping_mut))
}

/// The pod spec embedded in a workload, if it has one.
fn pod_spec_mut(resource: &mut Resource) -> Option<&mut Mapping> {
    let path: &[&str] = match resource.kind() {
        "Pod" => &["spec"],
        "CronJob" => &["spec", "jobTemplate", "spec", "template", "spec"],
        kind if TEMPLATED_WORKLOADS.contains(&kind) => &["spec", "template", "spec"],
        _ => return None,
    };

    let mut current = resource.doc_mut();
    for key in path {
        current = current.get_mut(*key)?.as_mapping_mut()?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse_documents;
    use std::path::Path;

    fn resources(text: &str) -> Vec<Resource> {
        parse_documents(text, Path::new("test.yaml")).unwrap()
    }

    const RBAC: &str = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: controller
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: controller
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: cluster-admin
subjects:
  - kind: ServiceAccount
    name: controller
    namespace: default
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: controller
spec:
  template:
    spec:
      serviceAccountName: controller
      containers:
        - name: manager
          image: ghcr.io/fluxcd/source-controller:v1.0.0
";

    #[test]
    fn namespace_skips_cluster_scoped_but_fixes_subjects() {
        let mut res = resources(RBAC);
        let k = Kustomization {
            namespace: Some("flux".into()),
            ..Kustomization::default()
        };
        apply(&k, &mut res);

        assert_eq!(res[0].namespace(), Some("flux"));
        assert_eq!(res[1].namespace(), None);
        let yaml = res[1].to_yaml().unwrap();
        assert!(yaml.contains("namespace: flux"));
        assert_eq!(res[2].namespace(), Some("flux"));
    }

    #[test]
    fn prefix_updates_references() {
        let mut res = resources(RBAC);
        let k = Kustomization {
            name_prefix: Some("dev-".into()),
            ..Kustomization::default()
        };
        apply(&k, &mut res);

        assert_eq!(res[0].name(), "dev-controller");
        let binding = res[1].to_yaml().unwrap();
        // cluster-admin is not part of this build, so its reference is untouched
        assert!(binding.contains("name: cluster-admin"));
        assert!(binding.contains("name: dev-controller"));
        let deployment = res[2].to_yaml().unwrap();
        assert!(deployment.contains("serviceAccountName: dev-controller"));
    }

    #[test]
    fn labels_are_merged() {
        let mut res = resources(RBAC);
        let k = Kustomization {
            common_labels: BTreeMap::from([(
                "app.kubernetes.io/instance".to_string(),
                "flux".to_string(),
            )]),
            ..Kustomization::default()
        };
        apply(&k, &mut res);
        for r in &res {
            assert!(r.to_yaml().unwrap().contains("app.kubernetes.io/instance: flux"));
        }
    }

    #[test]
    fn images_are_rewritten() {
        let mut res = resources(RBAC);
        let k = Kustomization {
            images: vec![ImageOverride {
                name: "ghcr.io/fluxcd/source-controller".into(),
                new_name: Some("registry.local/fluxcd/source-controller".into()),
                new_tag: None,
                digest: None,
            }],
            ..Kustomization::default()
        };
        apply(&k, &mut res);
        let deployment = res[2].to_yaml().unwrap();
        assert!(deployment.contains("image: registry.local/fluxcd/source-controller:v1.0.0"));
    }

    #[test]
    fn rewrite_image_variants() {
        let rule = |tag: Option<&str>, digest: Option<&str>| ImageOverride {
            name: "localhost:5000/app".into(),
            new_name: None,
            new_tag: tag.map(String::from),
            digest: digest.map(String::from),
        };

        assert_eq!(
            rewrite_image("localhost:5000/app:1.0", &[rule(Some("2.0"), None)]),
            Some("localhost:5000/app:2.0".into())
        );
        assert_eq!(
            rewrite_image("localhost:5000/app", &[rule(None, Some("sha256:abc"))]),
            Some("localhost:5000/app@sha256:abc".into())
        );
        assert_eq!(rewrite_image("localhost:5000/other:1.0", &[rule(None, None)]), None);
    }
}
