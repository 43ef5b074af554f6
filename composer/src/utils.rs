/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::BTreeMap;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;

use crate::consts::{APP_LABEL, FIELD_MANAGER, MANAGED_BY_LABEL, PART_OF_LABEL, PART_OF_VALUE};

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap());

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([-A-Za-z0-9]{0,61}[A-Za-z0-9])?)*$")
        .unwrap()
});

// Returns true if the value is a valid RFC 1123 label, as required for object names.
pub fn is_dns_label(value: &str) -> bool {
    DNS_LABEL.is_match(value)
}

// Returns true if the value is a bare hostname (no scheme, port or path).
pub fn is_hostname(value: &str) -> bool {
    value.len() <= 253 && HOSTNAME.is_match(value)
}

// The selector of a workload. Pod template labels and Service selectors are both
// produced from this map so they cannot diverge.
pub fn selector_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), app.to_string());
    labels
}

// Metadata shared by every namespaced object of the stack.
pub fn object_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(common_labels()),
        ..Default::default()
    }
}

pub fn common_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(PART_OF_LABEL.to_string(), PART_OF_VALUE.to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());
    labels
}

// Number of non-empty segments in an ingress path; "/" has none.
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

// Returns true if `prefix` matches `path` under Prefix path matching, which
// compares whole path elements.
pub fn prefix_shadows(prefix: &str, path: &str) -> bool {
    let prefix: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    let path: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    prefix.len() <= path.len() && prefix.iter().zip(path.iter()).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_labels() {
        assert!(is_dns_label("node-exporter-service"));
        assert!(is_dns_label("a"));
        assert!(!is_dns_label("-leading"));
        assert!(!is_dns_label("trailing-"));
        assert!(!is_dns_label("Upper"));
        assert!(!is_dns_label("dotted.name"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn hostnames() {
        assert!(is_hostname("localhost"));
        assert!(is_hostname("monitor.example.com"));
        assert!(!is_hostname("https://localhost"));
        assert!(!is_hostname("localhost:8443"));
        assert!(!is_hostname("localhost/grafana"));
        assert!(!is_hostname(""));
    }

    #[test]
    fn prefix_matching_compares_elements() {
        assert!(prefix_shadows("/", "/grafana"));
        assert!(prefix_shadows("/grafana", "/grafana/api"));
        assert!(!prefix_shadows("/graf", "/grafana"));
        assert!(!prefix_shadows("/grafana", "/prometheus"));
        assert_eq!(path_depth("/"), 0);
        assert_eq!(path_depth("/grafana/"), 1);
    }
}
