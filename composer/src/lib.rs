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

//! Composes the desired state of a small monitoring stack (application, Grafana,
//! Prometheus, node-exporter and a TLS-terminating ingress) into Kubernetes objects.
//!
//! [`compose`] is a pure function from a [`StackConfig`] to a [`StackGraph`]. Rendering
//! and submitting the graph are separate steps, see [`StackGraph::to_yaml`] and [`apply`].

use std::fmt::{Display, Formatter};

use thiserror::Error;

pub use stack::{compose, exports};
pub use config::{IngressConfig, InitStep, StackConfig, TlsConfig, WorkloadConfig};
pub use graph::{StackGraph, Workload};
pub use scrape::{ScrapeConfig, ScrapeTarget};
pub use validate::validate;

pub mod apply;
pub mod config;
pub mod consts;
pub mod graph;
pub mod scrape;

mod ingress;
mod service;
mod stack;
mod traits;
mod utils;
mod validate;
mod workload;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[source] kube::Error),
    #[error("missing required configuration field: `{0}`")]
    MissingFieldError(String),
    #[error("invalid configuration: `{0}`")]
    InvalidConfigError(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParseError(#[source] serde_yaml::Error),
    #[error("failed to read `{0}`: {1}")]
    IoError(String, #[source] std::io::Error),
    #[error("{kind} `{name}` references {target} which is not part of the stack")]
    DanglingReferenceError {
        kind: String,
        name: String,
        target: String,
    },
    #[error("workload `{0}` selector does not match its pod template labels")]
    SelectorMismatchError(String),
    #[error("workloads `{0}` and `{1}` share the same selector")]
    SelectorCollisionError(String, String),
    #[error("port mismatch for `{name}`: {detail}")]
    PortMismatchError { name: String, detail: String },
    #[error("failed to serialize manifest: {0}")]
    SerializationError(#[source] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub struct NamespacedName {
    pub name: String,
    pub namespace: String,
}

impl Display for NamespacedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace.as_str())?;
        f.write_str("/")?;
        f.write_str(self.name.as_str())
    }
}
