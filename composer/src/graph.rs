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

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use crate::ingress::urls;
use crate::scrape::ScrapeConfig;
use crate::traits::HasPodTemplate;
use crate::{Error, Result};

/// A workload of the stack: one replica per Deployment, or one pod per node.
#[derive(Clone, Debug, PartialEq)]
pub enum Workload {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
}

impl Workload {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::DaemonSet(d) => &d.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Workload::Deployment(_) => "Deployment",
            Workload::DaemonSet(_) => "DaemonSet",
        }
    }

    fn template(&self) -> &dyn HasPodTemplate {
        match self {
            Workload::Deployment(d) => d,
            Workload::DaemonSet(d) => d,
        }
    }

    pub fn match_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.template().match_labels()
    }

    pub fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.template().template_labels()
    }

    /// Port of the first container's first declared port.
    pub fn container_port(&self) -> Option<i32> {
        let container = self.template().pod_spec()?.containers.first()?;
        Some(container.ports.as_ref()?.first()?.container_port)
    }

    pub fn image(&self) -> Option<&str> {
        self.template().pod_spec()?.containers.first()?.image.as_deref()
    }

    /// Value of an environment variable on the first container.
    pub fn env(&self, name: &str) -> Option<&str> {
        let container = self.template().pod_spec()?.containers.first()?;
        container
            .env
            .as_ref()?
            .iter()
            .find(|var| var.name == name)?
            .value
            .as_deref()
    }
}

impl Serialize for Workload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Workload::Deployment(d) => d.serialize(serializer),
            Workload::DaemonSet(d) => d.serialize(serializer),
        }
    }
}

/// Every object of the stack, cross-referenced by name and label.
#[derive(Clone, Debug, PartialEq)]
pub struct StackGraph {
    pub namespace: Namespace,
    pub credential: Secret,
    pub scrape_config: ScrapeConfig,
    pub scrape_config_map: ConfigMap,
    pub workloads: Vec<Workload>,
    pub services: Vec<Service>,
    pub routing: Ingress,
}

impl StackGraph {
    pub fn namespace_name(&self) -> &str {
        self.namespace.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|svc| svc.metadata.name.as_deref() == Some(name))
    }

    pub fn workload(&self, name: &str) -> Option<&Workload> {
        self.workloads.iter().find(|w| w.name() == name)
    }

    /// Renders the graph as a multi-document YAML stream in apply order: Namespace,
    /// Secret, ConfigMap, Services, Workloads, Ingress.
    pub fn to_yaml(&self) -> Result<String> {
        let mut docs = vec![
            to_doc(&self.namespace)?,
            to_doc(&self.credential)?,
            to_doc(&self.scrape_config_map)?,
        ];
        for service in &self.services {
            docs.push(to_doc(service)?);
        }
        for workload in &self.workloads {
            docs.push(to_doc(workload)?);
        }
        docs.push(to_doc(&self.routing)?);
        Ok(docs.join("---\n"))
    }

    /// URLs reachable once the stack is applied, keyed by backend service name.
    pub fn exports(&self) -> BTreeMap<String, String> {
        urls(&self.routing)
    }
}

fn to_doc<T: Serialize>(obj: &T) -> Result<String> {
    serde_yaml::to_string(obj).map_err(Error::SerializationError)
}
