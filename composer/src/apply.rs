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

//! Submits a composed [`StackGraph`] to a cluster with server-side apply and tears it
//! down again. Reconciliation itself is left to the cluster.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::consts::FIELD_MANAGER;
use crate::graph::{StackGraph, Workload};
use crate::{Error, NamespacedName, Result};

/// Applies every object of the graph, namespace first and ingress last, so that
/// references only ever point at objects that were already submitted.
pub async fn apply(client: Client, graph: &StackGraph) -> Result<()> {
    let ns = graph.namespace_name();
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let namespace_api: Api<Namespace> = Api::all(client.clone());
    let name = graph.namespace.name_any();
    namespace_api
        .patch(&name, &params, &Patch::Apply(&graph.namespace))
        .await
        .map_err(Error::KubeError)?;
    info!("applied Namespace {name}");

    apply_namespaced(&client, ns, &params, &graph.credential).await?;
    apply_namespaced(&client, ns, &params, &graph.scrape_config_map).await?;
    for service in &graph.services {
        apply_namespaced(&client, ns, &params, service).await?;
    }
    for workload in &graph.workloads {
        match workload {
            Workload::Deployment(d) => apply_namespaced(&client, ns, &params, d).await?,
            Workload::DaemonSet(d) => apply_namespaced(&client, ns, &params, d).await?,
        }
    }
    apply_namespaced(&client, ns, &params, &graph.routing).await?;

    info!(namespace = ns, "stack applied");
    Ok(())
}

/// Deletes the stack by deleting its namespace. A namespace that is already gone is
/// not an error.
pub async fn destroy(client: Client, namespace: &str) -> Result<()> {
    let namespace_api: Api<Namespace> = Api::all(client);
    match namespace_api.delete(namespace, &DeleteParams::default()).await {
        Ok(_) => {
            info!("deleting Namespace {namespace}");
            Ok(())
        }
        Err(err) if is_not_found(&err) => {
            info!("Namespace {namespace} not found; nothing to delete");
            Ok(())
        }
        Err(err) => Err(Error::KubeError(err)),
    }
}

async fn apply_namespaced<K>(
    client: &Client,
    namespace: &str,
    params: &PatchParams,
    obj: &K,
) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize,
{
    let key = NamespacedName {
        name: obj.name_any(),
        namespace: namespace.to_string(),
    };
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.patch(&key.name, params, &Patch::Apply(obj))
        .await
        .map_err(Error::KubeError)?;
    info!("applied {} {key}", K::kind(&()));
    Ok(())
}

// Returns true if the provided error is a not found error.
fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "namespaces \"app-namespace\" not found".to_string(),
            reason: "NotFound".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_detected_by_code() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
    }
}
