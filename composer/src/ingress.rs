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

use std::cmp::Reverse;
use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use tracing::debug;

use crate::config::StackConfig;
use crate::consts::SSL_REDIRECT_ANNOTATION;
use crate::utils::{object_meta, path_depth};
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Route<'a> {
    pub path: &'a str,
    pub service: &'a str,
    pub port: i32,
}

// Collects one route per workload that declares a path, most specific path first.
// Under Prefix matching a broad prefix such as "/" would otherwise shadow the
// paths after it on controllers that evaluate entries in order.
pub fn routes(config: &StackConfig) -> Result<Vec<Route<'_>>> {
    let mut routes: Vec<Route> = config
        .workloads()
        .into_iter()
        .filter_map(|(_, workload)| {
            workload.path.as_deref().map(|path| Route {
                path,
                service: workload.service_name.as_str(),
                port: workload.container_port(),
            })
        })
        .collect();

    if routes.is_empty() {
        return Err(Error::InvalidConfigError(
            "no workload declares an ingress path".to_string(),
        ));
    }

    for (i, route) in routes.iter().enumerate() {
        if let Some(other) = routes[i + 1..].iter().find(|r| r.path == route.path) {
            return Err(Error::InvalidConfigError(format!(
                "path `{}` is routed to both `{}` and `{}`",
                route.path, route.service, other.service
            )));
        }
    }

    routes.sort_by_key(|route| Reverse(path_depth(route.path)));
    Ok(routes)
}

pub fn routing_rule(config: &StackConfig) -> Result<Ingress> {
    let paths: Vec<HTTPIngressPath> = routes(config)?
        .into_iter()
        .map(|route| {
            debug!(path = route.path, service = route.service, port = route.port, "adding route");
            HTTPIngressPath {
                path: Some(route.path.to_string()),
                path_type: config.ingress.path_type.clone(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: route.service.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(route.port),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }
        })
        .collect();

    let mut metadata = object_meta(&config.ingress.name, &config.namespace);
    if config.ingress.ssl_redirect {
        let mut annotations = BTreeMap::new();
        annotations.insert(SSL_REDIRECT_ANNOTATION.to_string(), "true".to_string());
        metadata.annotations = Some(annotations);
    }

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress.class_name.clone(),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![config.domain.clone()]),
                secret_name: Some(config.tls.secret_name.clone()),
            }]),
            rules: Some(vec![IngressRule {
                host: Some(config.domain.clone()),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

// Flattens the rule host and each path's backend into (host, path, service, port).
pub fn backends(ingress: &Ingress) -> Vec<(String, String, String, Option<i32>)> {
    let mut out = vec![];
    let Some(rules) = ingress.spec.as_ref().and_then(|spec| spec.rules.as_ref()) else {
        return out;
    };
    for rule in rules {
        let host = rule.host.clone().unwrap_or_default();
        let Some(http) = &rule.http else {
            continue;
        };
        for path in &http.paths {
            if let Some(service) = &path.backend.service {
                out.push((
                    host.clone(),
                    path.path.clone().unwrap_or_else(|| "/".to_string()),
                    service.name.clone(),
                    service.port.as_ref().and_then(|p| p.number),
                ));
            }
        }
    }
    out
}

// URLs reachable once the ingress is served, keyed by backend service name.
pub fn urls(ingress: &Ingress) -> BTreeMap<String, String> {
    backends(ingress)
        .into_iter()
        .map(|(host, path, service, _)| (service, format!("https://{host}{path}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_put_specific_paths_first() {
        let config = StackConfig::default();
        let paths: Vec<&str> = routes(&config).unwrap().iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/grafana", "/prometheus", "/"]);
    }

    #[test]
    fn nested_paths_precede_their_parents() {
        let mut config = StackConfig::default();
        config.prometheus.path = Some("/grafana/prometheus".to_string());
        let paths: Vec<&str> = routes(&config).unwrap().iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/grafana/prometheus", "/grafana", "/"]);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut config = StackConfig::default();
        config.prometheus.path = Some("/grafana".to_string());
        assert!(matches!(routes(&config), Err(Error::InvalidConfigError(_))));
    }

    #[test]
    fn unrouted_stack_is_rejected() {
        let mut config = StackConfig::default();
        config.app.path = None;
        config.grafana.path = None;
        config.prometheus.path = None;
        assert!(matches!(routing_rule(&config), Err(Error::InvalidConfigError(_))));
    }

    #[test]
    fn routing_rule_binds_domain_and_secret() {
        let mut config = StackConfig::default();
        config.domain = "monitor.example.com".to_string();
        let ingress = routing_rule(&config).unwrap();
        let spec = ingress.spec.as_ref().unwrap();
        let tls = &spec.tls.as_ref().unwrap()[0];
        assert_eq!(tls.hosts, Some(vec!["monitor.example.com".to_string()]));
        assert_eq!(tls.secret_name.as_deref(), Some("tls-secret"));
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        assert_eq!(
            ingress
                .metadata
                .annotations
                .as_ref()
                .unwrap()
                .get(SSL_REDIRECT_ANNOTATION)
                .map(String::as_str),
            Some("true")
        );

        let backends = backends(&ingress);
        assert_eq!(backends.len(), 3);
        assert!(backends
            .iter()
            .all(|(host, _, _, _)| host == "monitor.example.com"));
        assert!(backends.contains(&(
            "monitor.example.com".to_string(),
            "/prometheus".to_string(),
            "prometheus-service".to_string(),
            Some(9090)
        )));
    }

    #[test]
    fn ssl_redirect_can_be_disabled() {
        let mut config = StackConfig::default();
        config.ingress.ssl_redirect = false;
        config.ingress.class_name = None;
        let ingress = routing_rule(&config).unwrap();
        assert!(ingress.metadata.annotations.is_none());
        assert!(ingress.spec.unwrap().ingress_class_name.is_none());
    }
}
