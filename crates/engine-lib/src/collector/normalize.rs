//! Raw snapshot normalization
//!
//! Turns platform-shaped records (quantity strings, optional fields) into the
//! canonical [`NamespaceSnapshot`] every analysis consumes.

use super::quantity::{parse_cpu, parse_memory};
use super::{RawNamespaceSnapshot, RawPod};
use crate::models::{NamespaceSnapshot, PodRecord, PodStatus};
use tracing::warn;

/// Normalize one namespace snapshot
pub fn normalize_snapshot(raw: RawNamespaceSnapshot) -> NamespaceSnapshot {
    let namespace = raw.namespace;
    let pods = raw
        .pods
        .into_iter()
        .map(|pod| normalize_pod(pod, &namespace))
        .collect();

    NamespaceSnapshot::from_pods(namespace, raw.timestamp, pods)
}

/// Normalize a pod, zero-filling anything the platform did not report
pub fn normalize_pod(raw: RawPod, namespace: &str) -> PodRecord {
    let name = raw.name.unwrap_or_else(|| {
        warn!(namespace = %namespace, "Pod record without a name");
        String::new()
    });

    let (mut cpu_request, mut memory_request, mut cpu_limit, mut memory_limit) =
        (0.0, 0.0, 0.0, 0.0);
    for container in &raw.containers {
        cpu_request += container.cpu_request.as_deref().map_or(0.0, parse_cpu);
        memory_request += container.memory_request.as_deref().map_or(0.0, parse_memory);
        cpu_limit += container.cpu_limit.as_deref().map_or(0.0, parse_cpu);
        memory_limit += container.memory_limit.as_deref().map_or(0.0, parse_memory);
    }

    let age_hours = raw
        .age_hours
        .filter(|h| h.is_finite())
        .map(|h| h.max(0.0))
        .unwrap_or(0.0);

    PodRecord {
        namespace: raw.namespace.unwrap_or_else(|| namespace.to_string()),
        status: raw
            .status
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown),
        restart_count: raw.restart_count.unwrap_or(0),
        cpu_request,
        memory_request,
        cpu_limit,
        memory_limit,
        age_hours,
        node_name: raw.node_name,
        name,
    }
}
