//! Kubernetes implementation of the platform source

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_lib::collector::{PlatformSource, RawContainer, RawNamespaceSnapshot, RawPod};
use k8s_openapi::api::core::v1::{Container, Namespace, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ListParams;
use kube::config::KubeConfigOptions;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// Lists namespaces and pods through the Kubernetes API
pub struct KubeSource {
    client: Client,
    skip_prefixes: Vec<String>,
}

impl KubeSource {
    pub fn new(client: Client, skip_prefixes: Vec<String>) -> Self {
        Self {
            client,
            skip_prefixes,
        }
    }

    /// Connect with the named kubeconfig context, or infer the config
    /// (in-cluster first, then the local kubeconfig)
    pub async fn connect(context: Option<&str>, skip_prefixes: Vec<String>) -> Result<Self> {
        let config = match context {
            Some(context) => kube::Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context.to_string()),
                ..KubeConfigOptions::default()
            })
            .await
            .with_context(|| format!("loading kubeconfig context {}", context))?,
            None => kube::Config::infer()
                .await
                .context("inferring Kubernetes config")?,
        };

        let client = Client::try_from(config).context("building Kubernetes client")?;
        Ok(Self::new(client, skip_prefixes))
    }

    fn is_tracked(&self, namespace: &str) -> bool {
        is_tracked(namespace, &self.skip_prefixes)
    }
}

#[async_trait]
impl PlatformSource for KubeSource {
    async fn collect(&self) -> Result<Vec<RawNamespaceSnapshot>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace_list = namespaces
            .list(&ListParams::default())
            .await
            .context("listing namespaces")?;

        let mut snapshots = Vec::new();
        for namespace in namespace_list.items {
            let Some(name) = namespace.metadata.name else {
                continue;
            };
            if !self.is_tracked(&name) {
                debug!(namespace = %name, "Skipping system namespace");
                continue;
            }

            let pods: Api<Pod> = Api::namespaced(self.client.clone(), &name);
            let pod_list = pods
                .list(&ListParams::default())
                .await
                .with_context(|| format!("listing pods in {}", name))?;

            let timestamp = Utc::now();
            snapshots.push(RawNamespaceSnapshot {
                namespace: name,
                timestamp,
                pods: pod_list
                    .items
                    .into_iter()
                    .map(|pod| raw_pod(pod, timestamp))
                    .collect(),
            });
        }

        Ok(snapshots)
    }
}

/// Whether a namespace is collected
pub fn is_tracked(namespace: &str, skip_prefixes: &[String]) -> bool {
    !skip_prefixes
        .iter()
        .any(|prefix| namespace.starts_with(prefix.as_str()))
}

/// Convert a pod object to its raw record
pub fn raw_pod(pod: Pod, now: DateTime<Utc>) -> RawPod {
    let age_hours = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|created| (now - created.0).num_seconds() as f64 / 3600.0);

    let status = pod.status.as_ref().and_then(|s| s.phase.clone());
    let restart_count = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|c| u32::try_from(c.restart_count).unwrap_or(0))
                .sum()
        });

    let (containers, node_name) = match pod.spec {
        Some(spec) => (
            spec.containers.iter().map(raw_container).collect(),
            spec.node_name,
        ),
        None => (Vec::new(), None),
    };

    RawPod {
        name: pod.metadata.name,
        namespace: pod.metadata.namespace,
        status,
        restart_count,
        containers,
        age_hours,
        node_name,
    }
}

fn raw_container(container: &Container) -> RawContainer {
    let resources = container.resources.as_ref();
    let requests = resources.and_then(|r| r.requests.as_ref());
    let limits = resources.and_then(|r| r.limits.as_ref());

    RawContainer {
        cpu_request: quantity(requests, "cpu"),
        memory_request: quantity(requests, "memory"),
        cpu_limit: quantity(limits, "cpu"),
        memory_limit: quantity(limits, "memory"),
    }
}

fn quantity(values: Option<&BTreeMap<String, Quantity>>, key: &str) -> Option<String> {
    values.and_then(|v| v.get(key)).map(|q| q.0.clone())
}
