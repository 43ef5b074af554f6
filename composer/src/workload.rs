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

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    HostPathVolumeSource, PodSecurityContext, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tracing::debug;

use crate::config::{InitStep, WorkloadConfig};
use crate::consts::*;
use crate::utils::{object_meta, selector_labels};

// Pod-level description of one workload, independent of whether it runs as a
// Deployment or a DaemonSet.
pub struct WorkloadSpec<'a> {
    config: &'a WorkloadConfig,
    env: Vec<EnvVar>,
    args: Vec<String>,
    volumes: Vec<Volume>,
    volume_mounts: Vec<VolumeMount>,
    security_context: Option<PodSecurityContext>,
}

impl<'a> WorkloadSpec<'a> {
    pub fn new(config: &'a WorkloadConfig) -> Self {
        WorkloadSpec {
            config,
            env: vec![],
            args: vec![],
            volumes: vec![],
            volume_mounts: vec![],
            security_context: None,
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_arg(mut self, arg: String) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_volume(mut self, volume: Volume, mount_path: &str, read_only: bool) -> Self {
        self.volume_mounts.push(VolumeMount {
            name: volume.name.clone(),
            mount_path: mount_path.to_string(),
            read_only: read_only.then_some(true),
            ..Default::default()
        });
        self.volumes.push(volume);
        self
    }

    pub fn run_as(mut self, uid: i64) -> Self {
        self.security_context = Some(PodSecurityContext {
            run_as_user: Some(uid),
            run_as_group: Some(uid),
            fs_group: Some(uid),
            run_as_non_root: Some(true),
            ..Default::default()
        });
        self
    }

    fn container(&self) -> Container {
        Container {
            name: self.config.name.clone(),
            image: Some(self.config.image.clone()),
            ports: Some(vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: self.config.container_port(),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            args: non_empty(self.args.clone()),
            env: non_empty(self.env.clone()),
            volume_mounts: non_empty(self.volume_mounts.clone()),
            ..Default::default()
        }
    }

    fn pod_template(&self) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(selector_labels(&self.config.name)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![self.container()],
                init_containers: non_empty(self.config.init.iter().map(init_container).collect()),
                volumes: non_empty(self.volumes.clone()),
                security_context: self.security_context.clone(),
                ..Default::default()
            }),
        }
    }

    fn selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(selector_labels(&self.config.name)),
            ..Default::default()
        }
    }

    pub fn deployment(&self, namespace: &str) -> Deployment {
        let name = format!("{}-deployment", self.config.name);
        debug!(deployment = %name, image = %self.config.image, "building deployment");
        Deployment {
            metadata: object_meta(&name, namespace),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: self.selector(),
                template: self.pod_template(),
                ..Default::default()
            }),
            status: None,
        }
    }

    pub fn daemon_set(&self, namespace: &str) -> DaemonSet {
        let name = format!("{}-daemonset", self.config.name);
        debug!(daemonset = %name, image = %self.config.image, "building daemonset");
        DaemonSet {
            metadata: object_meta(&name, namespace),
            spec: Some(DaemonSetSpec {
                selector: self.selector(),
                template: self.pod_template(),
                ..Default::default()
            }),
            status: None,
        }
    }
}

fn init_container(step: &InitStep) -> Container {
    Container {
        name: step.name.clone(),
        image: Some(step.image.clone()),
        command: non_empty(step.command.clone()),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

// The root URL Grafana uses to generate links, served from `path` on `domain`.
pub fn grafana_root_url(domain: &str, path: Option<&str>) -> String {
    let path = path.unwrap_or("/").trim_end_matches('/');
    format!("https://{domain}{path}/")
}

pub fn app(config: &WorkloadConfig) -> WorkloadSpec<'_> {
    WorkloadSpec::new(config)
}

pub fn grafana<'a>(config: &'a WorkloadConfig, domain: &str) -> WorkloadSpec<'a> {
    WorkloadSpec::new(config)
        .with_env(
            GRAFANA_ROOT_URL_ENV,
            &grafana_root_url(domain, config.path.as_deref()),
        )
        .with_env(GRAFANA_SERVE_FROM_SUB_PATH_ENV, "true")
        .run_as(GRAFANA_UID)
}

pub fn prometheus<'a>(config: &'a WorkloadConfig, config_map: &str) -> WorkloadSpec<'a> {
    let mut spec = WorkloadSpec::new(config)
        .with_arg(format!(
            "--config.file={PROMETHEUS_CONFIG_DIR}/{PROMETHEUS_CONFIG_FILE}"
        ))
        .with_arg(format!("--storage.tsdb.path={PROMETHEUS_DATA_DIR}"))
        .with_volume(
            Volume {
                name: "config".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(config_map.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            PROMETHEUS_CONFIG_DIR,
            true,
        )
        .with_volume(
            Volume {
                name: "data".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            PROMETHEUS_DATA_DIR,
            false,
        )
        .run_as(NOBODY_UID);

    // Prometheus serves from the same prefix the ingress routes to it.
    if let Some(path) = config.path.as_deref().filter(|p| *p != "/") {
        spec = spec.with_arg(format!(
            "--web.route-prefix={}",
            path.trim_end_matches('/')
        ));
    }
    spec
}

pub fn node_exporter(config: &WorkloadConfig) -> WorkloadSpec<'_> {
    WorkloadSpec::new(config)
        .with_arg(format!("--path.procfs={NODE_EXPORTER_PROC_MOUNT}"))
        .with_arg(format!("--path.sysfs={NODE_EXPORTER_SYS_MOUNT}"))
        .with_volume(host_path("proc", HOST_PROC_PATH), NODE_EXPORTER_PROC_MOUNT, true)
        .with_volume(host_path("sys", HOST_SYS_PATH), NODE_EXPORTER_SYS_MOUNT, true)
        .run_as(NOBODY_UID)
}

fn host_path(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::HasPodTemplate;

    #[test]
    fn selector_and_template_labels_share_one_source() {
        let config = WorkloadConfig::new("my-app", "smenaria/monitor-app:v1", 5000);
        let deployment = app(&config).deployment("app-namespace");
        assert_eq!(deployment.metadata.name.as_deref(), Some("my-app-deployment"));
        assert_eq!(deployment.match_labels(), deployment.template_labels());
        assert_eq!(
            deployment.match_labels().unwrap().get(APP_LABEL).map(String::as_str),
            Some("my-app")
        );
    }

    #[test]
    fn grafana_root_url_uses_domain_and_path() {
        assert_eq!(
            grafana_root_url("localhost", Some("/grafana")),
            "https://localhost/grafana/"
        );
        assert_eq!(
            grafana_root_url("example.com", Some("/grafana/")),
            "https://example.com/grafana/"
        );
        assert_eq!(grafana_root_url("example.com", None), "https://example.com/");
    }

    #[test]
    fn prometheus_mounts_scrape_config() {
        let config = WorkloadConfig::new("prometheus", "prom/prometheus:latest", 9090)
            .with_path("/prometheus");
        let deployment = prometheus(&config, "prometheus-config").deployment("ns");
        let pod = deployment.pod_spec().unwrap();

        let volume = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .find(|v| v.name == "config")
            .unwrap();
        assert_eq!(
            volume.config_map.as_ref().unwrap().name.as_deref(),
            Some("prometheus-config")
        );

        let args = pod.containers[0].args.as_ref().unwrap();
        assert!(args.contains(&"--config.file=/etc/prometheus/prometheus.yml".to_string()));
        assert!(args.contains(&"--web.route-prefix=/prometheus".to_string()));
        assert_eq!(pod.security_context.as_ref().unwrap().run_as_user, Some(NOBODY_UID));
    }

    #[test]
    fn node_exporter_runs_as_daemonset_with_host_mounts() {
        let config = WorkloadConfig::new("node-exporter", "prom/node-exporter:latest", 9100);
        let daemon_set = node_exporter(&config).daemon_set("ns");
        assert_eq!(
            daemon_set.metadata.name.as_deref(),
            Some("node-exporter-daemonset")
        );
        let pod = daemon_set.pod_spec().unwrap();
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts
            .iter()
            .all(|m| m.read_only == Some(true) && m.mount_path.starts_with("/host/")));
        assert_eq!(
            pod.containers[0].ports.as_ref().unwrap()[0].container_port,
            9100
        );
    }

    #[test]
    fn init_steps_become_init_containers_in_order() {
        let config = WorkloadConfig::new("my-app", "smenaria/monitor-app:v1", 5000)
            .with_init_step(InitStep {
                name: "migrate".to_string(),
                image: "smenaria/monitor-app:v1".to_string(),
                command: vec!["flask".to_string(), "db".to_string(), "upgrade".to_string()],
            })
            .with_init_step(InitStep {
                name: "warmup".to_string(),
                image: "busybox:1.36".to_string(),
                command: vec![],
            });
        let deployment = app(&config).deployment("ns");
        let init = deployment.pod_spec().unwrap().init_containers.as_ref().unwrap();
        let names: Vec<&str> = init.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["migrate", "warmup"]);
        assert!(init[1].command.is_none());
    }
}
