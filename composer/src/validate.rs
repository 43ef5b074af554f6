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

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use crate::graph::StackGraph;
use crate::ingress::backends;
use crate::service::service_ports;
use crate::utils::prefix_shadows;
use crate::{Error, Result};

/// Checks that the graph is internally consistent before it is handed to a cluster:
/// selectors match pod templates and do not collide, every Service selects a workload
/// and exposes its container port, every ingress backend, TLS secret and scrape
/// target names an object of the graph on the right port, no two objects of one kind
/// share a name, and no prefix path hides a later one.
pub fn validate(graph: &StackGraph) -> Result<()> {
    check_namespaces(graph)?;
    check_unique_names(graph)?;
    check_selectors(graph)?;
    check_services(graph)?;
    check_routing(graph)?;
    check_path_order(graph)?;
    check_scrape_targets(graph)?;
    debug!(namespace = graph.namespace_name(), "stack graph is consistent");
    Ok(())
}

fn check_namespaces(graph: &StackGraph) -> Result<()> {
    let namespace = graph.namespace_name();
    let mut objects: Vec<(&str, &ObjectMeta)> = vec![
        ("Secret", &graph.credential.metadata),
        ("ConfigMap", &graph.scrape_config_map.metadata),
        ("Ingress", &graph.routing.metadata),
    ];
    objects.extend(graph.workloads.iter().map(|w| (w.kind(), w.metadata())));
    objects.extend(graph.services.iter().map(|s| ("Service", &s.metadata)));

    for (kind, meta) in objects {
        if meta.namespace.as_deref() != Some(namespace) {
            return Err(Error::DanglingReferenceError {
                kind: kind.to_string(),
                name: meta.name.clone().unwrap_or_default(),
                target: format!(
                    "namespace `{}`",
                    meta.namespace.as_deref().unwrap_or_default()
                ),
            });
        }
    }
    Ok(())
}

// Two objects of one kind with the same name would overwrite each other when applied.
fn check_unique_names(graph: &StackGraph) -> Result<()> {
    let services = graph
        .services
        .iter()
        .map(|s| ("Service", s.metadata.name.as_deref().unwrap_or_default()));
    let workloads = graph.workloads.iter().map(|w| (w.kind(), w.name()));

    let mut seen = BTreeSet::new();
    for (kind, name) in services.chain(workloads) {
        if !seen.insert((kind, name)) {
            return Err(Error::InvalidConfigError(format!(
                "{kind} `{name}` is declared more than once"
            )));
        }
    }
    Ok(())
}

fn check_selectors(graph: &StackGraph) -> Result<()> {
    for (i, workload) in graph.workloads.iter().enumerate() {
        let selector = workload.match_labels();
        if selector.map_or(true, BTreeMap::is_empty) || selector != workload.template_labels() {
            return Err(Error::SelectorMismatchError(workload.name().to_string()));
        }
        if let Some(other) = graph.workloads[i + 1..]
            .iter()
            .find(|other| other.match_labels() == selector)
        {
            return Err(Error::SelectorCollisionError(
                workload.name().to_string(),
                other.name().to_string(),
            ));
        }
    }
    Ok(())
}

fn check_services(graph: &StackGraph) -> Result<()> {
    for service in &graph.services {
        let name = service.metadata.name.clone().unwrap_or_default();
        let selector = service.spec.as_ref().and_then(|spec| spec.selector.as_ref());
        let workload = graph
            .workloads
            .iter()
            .find(|w| selector.is_some() && w.template_labels() == selector)
            .ok_or_else(|| Error::DanglingReferenceError {
                kind: "Service".to_string(),
                name: name.clone(),
                target: format!("a workload labelled `{}`", format_labels(selector)),
            })?;

        let (port, target_port) = service_ports(service).ok_or_else(|| Error::PortMismatchError {
            name: name.clone(),
            detail: "service declares no port".to_string(),
        })?;
        let container_port = workload.container_port();
        if Some(port) != target_port || target_port != container_port {
            return Err(Error::PortMismatchError {
                name,
                detail: format!(
                    "port {port}, target port {target_port:?} and {} container port {container_port:?} must be equal",
                    workload.name()
                ),
            });
        }
    }
    Ok(())
}

fn check_routing(graph: &StackGraph) -> Result<()> {
    let ingress = graph.routing.metadata.name.clone().unwrap_or_default();

    for (_, path, service_name, port) in backends(&graph.routing) {
        let service = graph
            .service(&service_name)
            .ok_or_else(|| Error::DanglingReferenceError {
                kind: "Ingress".to_string(),
                name: ingress.clone(),
                target: format!("service `{service_name}`"),
            })?;
        let service_port = service_ports(service).map(|(p, _)| p);
        if port.is_none() || port != service_port {
            return Err(Error::PortMismatchError {
                name: ingress,
                detail: format!(
                    "path `{path}` targets port {port:?} but service `{service_name}` exposes {service_port:?}"
                ),
            });
        }
    }

    let credential = graph.credential.metadata.name.as_deref();
    let tls = graph
        .routing
        .spec
        .as_ref()
        .and_then(|spec| spec.tls.as_ref())
        .into_iter()
        .flatten();
    for entry in tls {
        if entry.secret_name.as_deref() != credential {
            return Err(Error::DanglingReferenceError {
                kind: "Ingress".to_string(),
                name: ingress,
                target: format!(
                    "secret `{}`",
                    entry.secret_name.as_deref().unwrap_or_default()
                ),
            });
        }
    }
    Ok(())
}

// Under Prefix matching an earlier path must never be a prefix of a later one,
// otherwise the later entry is unreachable on controllers that match in order.
fn check_path_order(graph: &StackGraph) -> Result<()> {
    let rules = graph
        .routing
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .into_iter()
        .flatten();
    for rule in rules {
        let Some(http) = &rule.http else {
            continue;
        };
        for (i, earlier) in http.paths.iter().enumerate() {
            if earlier.path_type != "Prefix" {
                continue;
            }
            let earlier_path = earlier.path.as_deref().unwrap_or("/");
            for later in &http.paths[i + 1..] {
                let later_path = later.path.as_deref().unwrap_or("/");
                if prefix_shadows(earlier_path, later_path) {
                    return Err(Error::InvalidConfigError(format!(
                        "ingress path `{earlier_path}` shadows the later path `{later_path}`"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_scrape_targets(graph: &StackGraph) -> Result<()> {
    let config_map = graph
        .scrape_config_map
        .metadata
        .name
        .clone()
        .unwrap_or_default();

    for (job, target) in graph.scrape_config.targets() {
        let service = graph
            .service(&target.host)
            .ok_or_else(|| Error::DanglingReferenceError {
                kind: "ScrapeConfig".to_string(),
                name: format!("{config_map}/{job}"),
                target: format!("service `{}`", target.host),
            })?;
        let service_port = service_ports(service).map(|(p, _)| p);
        if service_port != Some(target.port) {
            return Err(Error::PortMismatchError {
                name: format!("{config_map}/{job}"),
                detail: format!(
                    "target `{target}` but service `{}` exposes {service_port:?}",
                    target.host
                ),
            });
        }
    }
    Ok(())
}

fn format_labels(labels: Option<&BTreeMap<String, String>>) -> String {
    labels
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::ScrapeTarget;
    use crate::{compose, StackConfig, Workload};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn graph() -> StackGraph {
        let mut config = StackConfig::default();
        config.tls.certificate = "cert".to_string();
        config.tls.private_key = "key".to_string();
        compose(&config).unwrap()
    }

    #[test]
    fn composed_graph_is_valid() {
        assert!(validate(&graph()).is_ok());
    }

    #[test]
    fn detects_template_label_drift() {
        let mut graph = graph();
        if let Workload::Deployment(d) = &mut graph.workloads[0] {
            let template = d.spec.as_mut().unwrap().template.metadata.as_mut().unwrap();
            template
                .labels
                .as_mut()
                .unwrap()
                .insert("app".to_string(), "drifted".to_string());
        }
        assert!(matches!(
            validate(&graph),
            Err(Error::SelectorMismatchError(name)) if name == "my-app-deployment"
        ));
    }

    #[test]
    fn detects_selector_collision() {
        let mut graph = graph();
        let first = graph.workloads[0].clone();
        let mut copy = first.clone();
        if let Workload::Deployment(d) = &mut copy {
            d.metadata.name = Some("copy-deployment".to_string());
        }
        graph.workloads.push(copy);
        assert!(matches!(
            validate(&graph),
            Err(Error::SelectorCollisionError(a, b)) if a == "my-app-deployment" && b == "copy-deployment"
        ));
    }

    #[test]
    fn detects_dangling_ingress_backend() {
        let mut graph = graph();
        graph
            .services
            .retain(|s| s.metadata.name.as_deref() != Some("grafana-service"));
        match validate(&graph) {
            Err(Error::DanglingReferenceError { kind, target, .. }) => {
                assert_eq!(kind, "Ingress");
                assert_eq!(target, "service `grafana-service`");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn detects_duplicate_service_name() {
        let mut graph = graph();
        let mut shadow = graph.services[1].clone();
        shadow.metadata.name = graph.services[0].metadata.name.clone();
        graph.services.push(shadow);
        match validate(&graph) {
            Err(Error::InvalidConfigError(msg)) => {
                assert_eq!(msg, "Service `my-app-service` is declared more than once");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn detects_dangling_scrape_target() {
        let mut graph = graph();
        graph.scrape_config.add_target(
            "app",
            ScrapeTarget {
                host: "missing-service".to_string(),
                port: 5000,
            },
        );
        assert!(matches!(
            validate(&graph),
            Err(Error::DanglingReferenceError { kind, .. }) if kind == "ScrapeConfig"
        ));
    }

    #[test]
    fn detects_scrape_port_mismatch() {
        let mut graph = graph();
        graph.scrape_config.add_target(
            "app",
            ScrapeTarget {
                host: "my-app-service".to_string(),
                port: 8080,
            },
        );
        assert!(matches!(
            validate(&graph),
            Err(Error::PortMismatchError { .. })
        ));
    }

    #[test]
    fn detects_target_port_drift() {
        let mut graph = graph();
        let service = graph
            .services
            .iter_mut()
            .find(|s| s.metadata.name.as_deref() == Some("prometheus-service"))
            .unwrap();
        service.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].target_port =
            Some(IntOrString::Int(9091));
        assert!(matches!(
            validate(&graph),
            Err(Error::PortMismatchError { name, .. }) if name == "prometheus-service"
        ));
    }

    #[test]
    fn detects_shadowed_prefix_path() {
        let mut graph = graph();
        let spec = graph.routing.spec.as_mut().unwrap();
        let paths = &mut spec.rules.as_mut().unwrap()[0].http.as_mut().unwrap().paths;
        paths.reverse();
        assert!(matches!(validate(&graph), Err(Error::InvalidConfigError(_))));
    }

    #[test]
    fn exact_paths_may_come_in_any_order() {
        let mut graph = graph();
        let spec = graph.routing.spec.as_mut().unwrap();
        let paths = &mut spec.rules.as_mut().unwrap()[0].http.as_mut().unwrap().paths;
        paths.reverse();
        for path in paths.iter_mut() {
            path.path_type = "Exact".to_string();
        }
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn detects_unknown_tls_secret() {
        let mut graph = graph();
        graph.credential.metadata.name = Some("other-secret".to_string());
        assert!(matches!(
            validate(&graph),
            Err(Error::DanglingReferenceError { target, .. }) if target == "secret `tls-secret`"
        ));
    }

    #[test]
    fn detects_foreign_namespace() {
        let mut graph = graph();
        graph.services[0].metadata.namespace = Some("default".to_string());
        assert!(matches!(
            validate(&graph),
            Err(Error::DanglingReferenceError { target, .. }) if target == "namespace `default`"
        ));
    }
}
