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

//! Prometheus scrape configuration.
//!
//! Targets are held as typed `host:port` pairs per job and only turned into
//! `prometheus.yml` text by [`ScrapeConfig::render`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScrapeTarget {
    /// Cluster-internal service name.
    pub host: String,
    pub port: i32,
}

impl Display for ScrapeTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrapeConfig {
    pub scrape_interval: String,
    pub jobs: BTreeMap<String, Vec<ScrapeTarget>>,
}

#[derive(Serialize)]
struct PrometheusFile<'a> {
    global: GlobalSection<'a>,
    scrape_configs: Vec<JobSection<'a>>,
}

#[derive(Serialize)]
struct GlobalSection<'a> {
    scrape_interval: &'a str,
}

#[derive(Serialize)]
struct JobSection<'a> {
    job_name: &'a str,
    static_configs: Vec<StaticConfig>,
}

#[derive(Serialize)]
struct StaticConfig {
    targets: Vec<String>,
}

impl ScrapeConfig {
    pub fn new(scrape_interval: &str) -> Self {
        ScrapeConfig {
            scrape_interval: scrape_interval.to_string(),
            jobs: BTreeMap::new(),
        }
    }

    pub fn add_target(&mut self, job: &str, target: ScrapeTarget) {
        self.jobs.entry(job.to_string()).or_default().push(target);
    }

    pub fn targets(&self) -> impl Iterator<Item = (&str, &ScrapeTarget)> {
        self.jobs
            .iter()
            .flat_map(|(job, targets)| targets.iter().map(move |t| (job.as_str(), t)))
    }

    /// Formats the config as a `prometheus.yml` document. Jobs are emitted in name order.
    pub fn render(&self) -> Result<String> {
        let file = PrometheusFile {
            global: GlobalSection {
                scrape_interval: &self.scrape_interval,
            },
            scrape_configs: self
                .jobs
                .iter()
                .map(|(job, targets)| JobSection {
                    job_name: job,
                    static_configs: vec![StaticConfig {
                        targets: targets.iter().map(ToString::to_string).collect(),
                    }],
                })
                .collect(),
        };
        serde_yaml::to_string(&file).map_err(Error::SerializationError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_prometheus_yaml() {
        let mut config = ScrapeConfig::new("15s");
        config.add_target(
            "node-exporter",
            ScrapeTarget {
                host: "node-exporter-service".to_string(),
                port: 9100,
            },
        );
        let rendered: serde_yaml::Value = serde_yaml::from_str(&config.render().unwrap()).unwrap();
        assert_eq!(rendered["global"]["scrape_interval"], "15s");
        let job = &rendered["scrape_configs"][0];
        assert_eq!(job["job_name"], "node-exporter");
        assert_eq!(
            job["static_configs"][0]["targets"][0],
            "node-exporter-service:9100"
        );
    }

    #[test]
    fn jobs_render_in_name_order() {
        let mut config = ScrapeConfig::new("30s");
        config.add_target(
            "zeta",
            ScrapeTarget {
                host: "z".to_string(),
                port: 1,
            },
        );
        config.add_target(
            "alpha",
            ScrapeTarget {
                host: "a".to_string(),
                port: 2,
            },
        );
        let rendered = config.render().unwrap();
        let alpha = rendered.find("job_name: alpha").unwrap();
        let zeta = rendered.find("job_name: zeta").unwrap();
        assert!(alpha < zeta);

        let targets: Vec<String> = config.targets().map(|(_, t)| t.to_string()).collect();
        assert_eq!(targets, vec!["a:2", "z:1"]);
    }
}
