//! Proportional cost allocation across namespaces

use crate::snapshot::SnapshotSet;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

/// One namespace's share of the cluster's requested resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceCost {
    pub namespace: String,
    pub cpu_cores: f64,
    pub memory_gib: f64,
    pub pod_count: usize,
    pub cpu_pct: f64,
    pub memory_pct: f64,
    /// Mean of the CPU and memory shares
    pub cost_pct: f64,
}

/// Cluster totals and per-namespace shares, largest share first
///
/// An empty allocation serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelativeCost {
    pub cluster_total_cpu: f64,
    pub cluster_total_memory_gib: f64,
    pub namespaces: Vec<NamespaceCost>,
}

impl RelativeCost {
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl Serialize for RelativeCost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_empty() {
            return serializer.serialize_map(Some(0))?.end();
        }

        let mut state = serializer.serialize_struct("RelativeCost", 3)?;
        state.serialize_field("cluster_total_cpu", &self.cluster_total_cpu)?;
        state.serialize_field("cluster_total_memory_gib", &self.cluster_total_memory_gib)?;
        state.serialize_field("namespaces", &self.namespaces)?;
        state.end()
    }
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Allocate the cluster's requests across namespaces
pub fn calculate_relative_cost(set: &SnapshotSet) -> RelativeCost {
    if set.is_empty() {
        return RelativeCost::default();
    }

    let total_cpu = set.cluster_total_cpu();
    let total_memory = set.cluster_total_memory();

    let mut namespaces: Vec<NamespaceCost> = set
        .snapshots()
        .iter()
        .map(|s| {
            let cpu_pct = share(s.total_cpu, total_cpu);
            let memory_pct = share(s.total_memory, total_memory);
            NamespaceCost {
                namespace: s.namespace.clone(),
                cpu_cores: s.total_cpu,
                memory_gib: s.total_memory,
                pod_count: s.pod_count(),
                cpu_pct,
                memory_pct,
                cost_pct: (cpu_pct + memory_pct) / 2.0,
            }
        })
        .collect();

    // sort_by is stable, so equal shares keep snapshot order
    namespaces.sort_by(|a, b| b.cost_pct.total_cmp(&a.cost_pct));

    RelativeCost {
        cluster_total_cpu: total_cpu,
        cluster_total_memory_gib: total_memory,
        namespaces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::{pod, snapshot};

    #[test]
    fn test_shares_sorted_descending() {
        let set = SnapshotSet::new(vec![
            snapshot("small", vec![pod("small", "a", 1.0, 1.0)]),
            snapshot(
                "big",
                vec![pod("big", "b", 2.0, 2.0), pod("big", "c", 1.0, 1.0)],
            ),
        ]);

        let cost = calculate_relative_cost(&set);
        assert_eq!(cost.namespaces[0].namespace, "big");
        assert_eq!(cost.namespaces[0].pod_count, 2);
        assert!((cost.namespaces[0].cpu_pct - 75.0).abs() < 1e-9);
        assert!((cost.namespaces[1].cost_pct - 25.0).abs() < 1e-9);
        assert!((cost.cluster_total_cpu - 4.0).abs() < 1e-9);

        let cpu_sum: f64 = cost.namespaces.iter().map(|n| n.cpu_pct).sum();
        assert!(cpu_sum <= 100.0 + 1e-9);
    }

    #[test]
    fn test_zero_cluster_total_gives_zero_shares() {
        let set = SnapshotSet::new(vec![
            snapshot("a", vec![pod("a", "x", 0.0, 1.0)]),
            snapshot("b", vec![pod("b", "y", 0.0, 1.0)]),
        ]);

        let cost = calculate_relative_cost(&set);
        assert!(cost.namespaces.iter().all(|n| n.cpu_pct == 0.0));
        assert!(cost.namespaces.iter().all(|n| (n.cost_pct - 25.0).abs() < 1e-9));
        // Ties keep input order
        assert_eq!(cost.namespaces[0].namespace, "a");
    }

    #[test]
    fn test_empty_input_serializes_as_empty_object() {
        let cost = calculate_relative_cost(&SnapshotSet::default());
        assert!(cost.is_empty());
        assert_eq!(serde_json::to_string(&cost).unwrap(), "{}");

        let parsed: RelativeCost = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_non_empty_round_trips() {
        let set = SnapshotSet::new(vec![snapshot("web", vec![pod("web", "a", 1.0, 1.0)])]);
        let cost = calculate_relative_cost(&set);
        let json = serde_json::to_value(&cost).unwrap();
        assert_eq!(json["namespaces"][0]["cost_pct"], 100.0);

        let parsed: RelativeCost = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, cost);
    }
}
