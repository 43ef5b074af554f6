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

// Field manager used for server-side apply.
pub const FIELD_MANAGER: &str = "stack-composer";

// Label key whose value identifies a workload; selectors are built from it alone.
pub const APP_LABEL: &str = "app";

// Label placed on every produced object's metadata (never on selectors).
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

// Value of the part-of label.
pub const PART_OF_VALUE: &str = "monitoring-stack";

// Label indicating which tool manages the produced objects.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

// Secret type of the TLS credential.
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

// Data keys of the TLS credential.
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

// Annotation asking the ingress controller to redirect plain HTTP to HTTPS.
pub const SSL_REDIRECT_ANNOTATION: &str = "nginx.ingress.kubernetes.io/ssl-redirect";

// Grafana settings for serving behind the ingress sub-path.
pub const GRAFANA_ROOT_URL_ENV: &str = "GF_SERVER_ROOT_URL";
pub const GRAFANA_SERVE_FROM_SUB_PATH_ENV: &str = "GF_SERVER_SERVE_FROM_SUB_PATH";
pub const GRAFANA_UID: i64 = 472;

// Unprivileged "nobody" user used by the Prometheus images.
pub const NOBODY_UID: i64 = 65534;

// Where the scrape config is mounted inside the Prometheus container.
pub const PROMETHEUS_CONFIG_DIR: &str = "/etc/prometheus";
pub const PROMETHEUS_CONFIG_FILE: &str = "prometheus.yml";
pub const PROMETHEUS_DATA_DIR: &str = "/prometheus";

// Name of the scrape job targeting node-exporter.
pub const NODE_EXPORTER_JOB: &str = "node-exporter";

// Host paths read by node-exporter and their mount points in the container.
pub const HOST_PROC_PATH: &str = "/proc";
pub const HOST_SYS_PATH: &str = "/sys";
pub const NODE_EXPORTER_PROC_MOUNT: &str = "/host/proc";
pub const NODE_EXPORTER_SYS_MOUNT: &str = "/host/sys";
