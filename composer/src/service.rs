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

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::config::WorkloadConfig;
use crate::utils::{object_meta, selector_labels};

// Creates the ClusterIP Service in front of a workload. The selector comes from the
// same label source as the workload's pod template and the port is exposed unchanged.
pub fn cluster_ip_service(config: &WorkloadConfig, namespace: &str) -> Service {
    debug!(service = %config.service_name, port = config.port, "building service");
    let port = config.container_port();
    Service {
        metadata: object_meta(&config.service_name, namespace),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&config.name)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

// Returns the (port, targetPort) pair of a Service built by `cluster_ip_service`.
// Named target ports resolve to None.
pub fn service_ports(service: &Service) -> Option<(i32, Option<i32>)> {
    let port = service.spec.as_ref()?.ports.as_ref()?.first()?;
    let target = match &port.target_port {
        Some(IntOrString::Int(p)) => Some(*p),
        Some(IntOrString::String(_)) => None,
        None => Some(port.port),
    };
    Some((port.port, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_exposes_container_port() {
        let config = WorkloadConfig::new("grafana", "grafana/grafana:latest", 3000);
        let service = cluster_ip_service(&config, "app-namespace");
        assert_eq!(service.metadata.name.as_deref(), Some("grafana-service"));
        assert_eq!(service.metadata.namespace.as_deref(), Some("app-namespace"));
        assert_eq!(service_ports(&service), Some((3000, Some(3000))));
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.selector, Some(selector_labels("grafana")));
    }

    #[test]
    fn missing_target_port_defaults_to_port() {
        let config = WorkloadConfig::new("grafana", "grafana/grafana:latest", 3000);
        let mut service = cluster_ip_service(&config, "ns");
        service.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].target_port = None;
        assert_eq!(service_ports(&service), Some((3000, Some(3000))));
    }
}
