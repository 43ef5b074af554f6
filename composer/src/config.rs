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

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::{is_dns_label, is_hostname};
use crate::{Error, Result};

const PATH_TYPES: [&str; 3] = ["Prefix", "Exact", "ImplementationSpecific"];

/// Configuration record driving [`compose`](crate::compose).
///
/// The record is built once (from defaults, a file, or both) and passed by reference;
/// nothing in the composer reads settings from anywhere else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub app: WorkloadConfig,
    #[serde(default)]
    pub grafana: WorkloadConfig,
    #[serde(default)]
    pub prometheus: WorkloadConfig,
    #[serde(default)]
    pub node_exporter: WorkloadConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,
}

/// One logical service: a workload plus the ClusterIP Service in front of it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Label value (`app=<name>`) and workload name prefix.
    pub name: String,
    pub image: String,
    /// Container port; also the Service port, target port and ingress backend port.
    pub port: u16,
    pub service_name: String,
    /// Ingress path. Workloads without one are not routed.
    pub path: Option<String>,
    /// Init containers, run in declaration order.
    pub init: Vec<InitStep>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitStep {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
}

/// PEM encoded certificate and private key stored in the TLS credential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    pub secret_name: String,
    pub certificate: String,
    pub private_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngressConfig {
    pub name: String,
    pub class_name: Option<String>,
    pub path_type: String,
    pub ssl_redirect: bool,
}

fn default_scrape_interval() -> String {
    "15s".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            namespace: "app-namespace".to_string(),
            domain: "localhost".to_string(),
            app: WorkloadConfig::new("my-app", "smenaria/monitor-app:v1", 5000)
                .with_service_name("my-app-service")
                .with_path("/"),
            grafana: WorkloadConfig::new("grafana", "grafana/grafana:latest", 3000)
                .with_path("/grafana"),
            prometheus: WorkloadConfig::new("prometheus", "prom/prometheus:latest", 9090)
                .with_path("/prometheus"),
            node_exporter: WorkloadConfig::new("node-exporter", "prom/node-exporter:latest", 9100),
            tls: TlsConfig::default(),
            ingress: IngressConfig::default(),
            scrape_interval: default_scrape_interval(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            secret_name: "tls-secret".to_string(),
            certificate: String::new(),
            private_key: String::new(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        IngressConfig {
            name: "app-ingress".to_string(),
            class_name: Some("nginx".to_string()),
            path_type: "Prefix".to_string(),
            ssl_redirect: true,
        }
    }
}

impl WorkloadConfig {
    /// Creates a workload config whose service is named `<name>-service`.
    pub fn new(name: &str, image: &str, port: u16) -> Self {
        WorkloadConfig {
            name: name.to_string(),
            image: image.to_string(),
            port,
            service_name: format!("{name}-service"),
            path: None,
            init: vec![],
        }
    }

    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_init_step(mut self, step: InitStep) -> Self {
        self.init.push(step);
        self
    }

    pub fn container_port(&self) -> i32 {
        i32::from(self.port)
    }

    fn validate(&self, component: &str) -> Result<()> {
        require(&format!("{component}.name"), &self.name)?;
        require(&format!("{component}.image"), &self.image)?;
        require(&format!("{component}.service_name"), &self.service_name)?;
        if self.port == 0 {
            return Err(Error::MissingFieldError(format!("{component}.port")));
        }
        check_name(&format!("{component}.name"), &self.name)?;
        check_name(&format!("{component}.service_name"), &self.service_name)?;

        if let Some(path) = &self.path {
            if !path.starts_with('/') {
                return Err(Error::InvalidConfigError(format!(
                    "{component}.path `{path}` must start with `/`"
                )));
            }
        }

        // Container names must be unique within a pod.
        let mut containers = BTreeSet::from([self.name.as_str()]);
        for (i, step) in self.init.iter().enumerate() {
            require(&format!("{component}.init[{i}].name"), &step.name)?;
            require(&format!("{component}.init[{i}].image"), &step.image)?;
            check_name(&format!("{component}.init[{i}].name"), &step.name)?;
            if !containers.insert(step.name.as_str()) {
                return Err(Error::InvalidConfigError(format!(
                    "{component}.init[{i}].name `{}` is already used by another container of {component}",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

impl StackConfig {
    /// Reads a configuration record from a YAML file.
    ///
    /// Fields absent from the file are left empty and rejected by [`StackConfig::validate`],
    /// so a partial file never silently falls back to built-in values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::IoError(path.display().to_string(), e))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(Error::ConfigParseError)
    }

    /// Loads the TLS certificate and private key from PEM files.
    pub fn with_tls_files<P: AsRef<Path>>(mut self, certificate: P, private_key: P) -> Result<Self> {
        self.tls.certificate = read_pem(certificate.as_ref())?;
        self.tls.private_key = read_pem(private_key.as_ref())?;
        Ok(self)
    }

    /// The four workloads of the stack, keyed by their configuration section.
    pub fn workloads(&self) -> [(&'static str, &WorkloadConfig); 4] {
        [
            ("app", &self.app),
            ("grafana", &self.grafana),
            ("prometheus", &self.prometheus),
            ("node_exporter", &self.node_exporter),
        ]
    }

    /// Checks that every required field is present and well formed.
    pub fn validate(&self) -> Result<()> {
        self.validate_layout()?;
        require("tls.certificate", &self.tls.certificate)?;
        require("tls.private_key", &self.tls.private_key)?;
        Ok(())
    }

    pub fn validate_namespace(&self) -> Result<()> {
        require("namespace", &self.namespace)?;
        check_name("namespace", &self.namespace)
    }

    /// Like [`StackConfig::validate`], but without requiring TLS material. Enough to
    /// derive the ingress and its URLs.
    pub fn validate_layout(&self) -> Result<()> {
        self.validate_namespace()?;
        require("domain", &self.domain)?;
        if !is_hostname(&self.domain) {
            return Err(Error::InvalidConfigError(format!(
                "domain `{}` must be a bare hostname",
                self.domain
            )));
        }

        let workloads = self.workloads();
        for (component, workload) in workloads {
            workload.validate(component)?;
        }
        for (i, (component, workload)) in workloads.iter().enumerate() {
            if let Some((other, _)) = workloads[i + 1..]
                .iter()
                .find(|(_, w)| w.service_name == workload.service_name)
            {
                return Err(Error::InvalidConfigError(format!(
                    "{component}.service_name and {other}.service_name are both `{}`",
                    workload.service_name
                )));
            }
        }

        require("tls.secret_name", &self.tls.secret_name)?;
        check_name("tls.secret_name", &self.tls.secret_name)?;

        require("ingress.name", &self.ingress.name)?;
        check_name("ingress.name", &self.ingress.name)?;
        if !PATH_TYPES.contains(&self.ingress.path_type.as_str()) {
            return Err(Error::InvalidConfigError(format!(
                "ingress.path_type `{}` must be one of {}",
                self.ingress.path_type,
                PATH_TYPES.join(", ")
            )));
        }

        require("scrape_interval", &self.scrape_interval)?;
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MissingFieldError(field.to_string()));
    }
    Ok(())
}

fn check_name(field: &str, value: &str) -> Result<()> {
    if !is_dns_label(value) {
        return Err(Error::InvalidConfigError(format!(
            "{field} `{value}` is not a valid RFC 1123 label"
        )));
    }
    Ok(())
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::IoError(path.display().to_string(), e))
}
