//! Stable output ordering.
//!
//! Kinds other resources depend on come first (namespaces, CRDs, RBAC,
//! config), webhooks come last, everything else sits in between sorted by
//! group and kind. Ties break on namespace then name.

use crate::resource::Resource;

const ORDER_FIRST: &[&str] = &[
    "Namespace",
    "ResourceQuota",
    "StorageClass",
    "CustomResourceDefinition",
    "ServiceAccount",
    "PodSecurityPolicy",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "ConfigMap",
    "Secret",
    "Endpoints",
    "Service",
    "LimitRange",
    "PriorityClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "Deployment",
    "StatefulSet",
    "CronJob",
    "PodDisruptionBudget",
];

const ORDER_LAST: &[&str] = &["MutatingWebhookConfiguration", "ValidatingWebhookConfiguration"];

fn rank(kind: &str) -> (u8, usize) {
    if let Some(i) = ORDER_FIRST.iter().position(|k| *k == kind) {
        (0, i)
    } else if let Some(i) = ORDER_LAST.iter().position(|k| *k == kind) {
        (2, i)
    } else {
        (1, 0)
    }
}

/// Sort resources into their canonical output order.
pub fn sort(resources: &mut [Resource]) {
    resources.sort_by(|a, b| {
        rank(a.kind())
            .cmp(&rank(b.kind()))
            .then_with(|| a.group().cmp(b.group()))
            .then_with(|| a.kind().cmp(b.kind()))
            .then_with(|| a.api_version().cmp(b.api_version()))
            .then_with(|| a.namespace().cmp(&b.namespace()))
            .then_with(|| a.name().cmp(b.name()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse_documents;
    use std::path::Path;

    fn kinds(resources: &[Resource]) -> Vec<String> {
        resources
            .iter()
            .map(|r| format!("{}/{}", r.kind(), r.name()))
            .collect()
    }

    #[test]
    fn dependencies_first_webhooks_last() {
        let text = "\
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata: {name: hook}
---
apiVersion: source.toolkit.fluxcd.io/v1
kind: GitRepository
metadata: {name: repo}
---
apiVersion: apps/v1
kind: Deployment
metadata: {name: b}
---
apiVersion: apps/v1
kind: Deployment
metadata: {name: a}
---
apiVersion: v1
kind: Namespace
metadata: {name: ns}
";
        let mut res = parse_documents(text, Path::new("t.yaml")).unwrap();
        sort(&mut res);
        assert_eq!(
            kinds(&res),
            vec![
                "Namespace/ns",
                "Deployment/a",
                "Deployment/b",
                "GitRepository/repo",
                "ValidatingWebhookConfiguration/hook"
            ]
        );
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let a = "apiVersion: v1\nkind: ConfigMap\nmetadata: {name: a}\n";
        let b = "apiVersion: v1\nkind: ServiceAccount\nmetadata: {name: b}\n";

        let mut first = parse_documents(&format!("{a}---\n{b}"), Path::new("t.yaml")).unwrap();
        let mut second = parse_documents(&format!("{b}---\n{a}"), Path::new("t.yaml")).unwrap();
        sort(&mut first);
        sort(&mut second);
        assert_eq!(first, second);
    }
}
