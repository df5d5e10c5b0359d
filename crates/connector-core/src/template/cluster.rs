use serde_json::json;

use super::{entity_resource, manifest, ProgramSource, ProvisioningProgram, StackIdentity};
use crate::error::{CoreError, Result};
use crate::properties::ConfigSet;

/// A Civo Kubernetes cluster in its own network behind a default firewall.
///
/// Config keys: `size` (required to apply), `count`, `type`, `cni`. Size and
/// count are written back onto the entity so later actions can omit them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CivoCluster;

impl ProvisioningProgram for CivoCluster {
    fn name(&self) -> &str {
        "civo-kubernetes-cluster"
    }

    fn project_prefix(&self) -> &str {
        "civo_cluster"
    }

    fn render(&self, identity: &StackIdentity, config: &ConfigSet) -> Result<ProgramSource> {
        let size = config
            .non_empty("size")
            .ok_or_else(|| CoreError::InvalidProperty {
                key: "size".into(),
                reason: "node size is required".into(),
            })?;
        let count = node_count(config)?;
        Ok(cluster_program(identity, config, Some(size), count))
    }

    fn render_teardown(&self, identity: &StackIdentity, config: &ConfigSet) -> Result<ProgramSource> {
        let count = node_count(config).ok().flatten();
        Ok(cluster_program(identity, config, config.non_empty("size"), count))
    }
}

fn cluster_program(
    identity: &StackIdentity,
    config: &ConfigSet,
    size: Option<&str>,
    count: Option<u32>,
) -> ProgramSource {
    let mut pools = serde_json::Map::new();
    if let Some(size) = size {
        pools.insert("size".into(), json!(size));
    }
    if let Some(count) = count {
        pools.insert("nodeCount".into(), json!(count));
    }

    let mut cluster = serde_json::Map::new();
    cluster.insert("networkId".into(), json!("${civo-network.id}"));
    cluster.insert("firewallId".into(), json!("${civo-firewall.id}"));
    cluster.insert("pools".into(), json!(pools));
    if let Some(kind) = config.non_empty("type") {
        cluster.insert("clusterType".into(), json!(kind));
    }
    if let Some(cni) = config.non_empty("cni") {
        cluster.insert("cni".into(), json!(cni));
    }

    let entity = entity_resource(
        config,
        "Kubernetes Cluster ${civo-cluster.name}",
        &[
            ("cluster_name", json!("${civo-cluster.name}")),
            ("type", json!("${civo-cluster.clusterType}")),
            ("cni", json!("${civo-cluster.cni}")),
            ("kconfig", json!("${civo-cluster.kubeconfig}")),
            ("size", json!("${civo-cluster.pools.size}")),
            ("count", json!("${civo-cluster.pools.nodeCount}")),
        ],
    );

    let resources = json!({
        "civo-network": {
            "type": "civo:index:Network",
            "properties": {
                "label": format!("network-{}-{}", identity.project_name, identity.stack_name),
            },
        },
        "civo-firewall": {
            "type": "civo:index:Firewall",
            "properties": {
                "networkId": "${civo-network.id}",
                "createDefaultRules": true,
            },
        },
        "civo-cluster": {
            "type": "civo:index:KubernetesCluster",
            "properties": cluster,
        },
        "entity": entity,
    });
    ProgramSource {
        project: identity.project_name.clone(),
        manifest: manifest(identity, "Civo Kubernetes cluster managed by Port", resources),
    }
}

/// Absent means "provider default"; anything else must be a positive integer.
fn node_count(config: &ConfigSet) -> Result<Option<u32>> {
    let Some(raw) = config.non_empty("count") else {
        return Ok(None);
    };
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(CoreError::InvalidProperty {
            key: "count".into(),
            reason: format!("expected a positive node count, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ConfigSet {
        let mut c = ConfigSet::new();
        for (k, v) in pairs {
            c.insert(*k, *v);
        }
        c
    }

    fn identity() -> StackIdentity {
        StackIdentity::derive("civo_cluster", "e7")
    }

    #[test]
    fn renders_network_firewall_cluster_and_entity() {
        let c = config(&[("size", "g4s.kube.small"), ("count", "3"), ("cni", "cilium")]);
        let m = CivoCluster.render(&identity(), &c).unwrap().manifest;
        let r = &m["resources"];
        assert_eq!(
            r["civo-network"]["properties"]["label"],
            "network-civo_cluster_e7-e7"
        );
        assert_eq!(r["civo-firewall"]["properties"]["createDefaultRules"], true);
        let cluster = &r["civo-cluster"]["properties"];
        assert_eq!(cluster["pools"]["nodeCount"], 3);
        assert_eq!(cluster["pools"]["size"], "g4s.kube.small");
        assert_eq!(cluster["cni"], "cilium");
        assert!(cluster.get("clusterType").is_none());
        assert_eq!(r["entity"]["type"], "port:index:Entity");
    }

    #[test]
    fn missing_size_is_rejected() {
        let err = CivoCluster.render(&identity(), &config(&[])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidProperty { ref key, .. } if key == "size"));
    }

    #[test]
    fn teardown_renders_without_apply_inputs() {
        let c = config(&[("cluster_name", "k1"), ("kconfig", "apiVersion: v1"), ("count", "bogus")]);
        let m = CivoCluster.render_teardown(&identity(), &c).unwrap().manifest;
        let pools = &m["resources"]["civo-cluster"]["properties"]["pools"];
        assert!(pools.get("size").is_none());
        assert!(pools.get("nodeCount").is_none());
        assert_eq!(m["name"], "civo_cluster_e7");
    }

    #[test]
    fn entity_records_size_and_count() {
        let c = config(&[("size", "g4s.kube.small")]);
        let m = CivoCluster.render(&identity(), &c).unwrap().manifest;
        let names: Vec<_> = m["resources"]["entity"]["properties"]["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"size".to_string()));
        assert!(names.contains(&"count".to_string()));
    }

    #[test]
    fn count_must_be_positive_integer() {
        for bad in ["zero", "0", "-2", "1.5"] {
            let c = config(&[("size", "s"), ("count", bad)]);
            assert!(CivoCluster.render(&identity(), &c).is_err(), "{bad} accepted");
        }
        let c = config(&[("size", "s")]);
        let m = CivoCluster.render(&identity(), &c).unwrap().manifest;
        assert!(m["resources"]["civo-cluster"]["properties"]["pools"]
            .get("nodeCount")
            .is_none());
    }
}
