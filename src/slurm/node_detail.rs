// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-node details.
//!
//! Two schemas are understood, chosen at startup:
//! - `sinfo -R --json`: one JSON document, `state` either a legacy string
//!   plus `state_flags` or an array whose first element is the base state
//! - `scontrol show nodes --oneliner`: one line of `Key=Value` tokens per node

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::gpus::parse_allocated_gpus;
use super::node_state::{classify, split_compound};
use super::parse::{gres_gpus, nullable_string, number, Number, Tokens};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const JSON_COMMAND: &[&str] = &["sinfo", "-R", "--json"];
const JSON_FIXTURE: &str = "sinfo-reason-nodes.json";

const SCONTROL_COMMAND: &[&str] = &["scontrol", "show", "nodes", "--oneliner"];
const SCONTROL_FIXTURE: &str = "scontrol_nodes.txt";

const MIB: f64 = 1024.0 * 1024.0;

const INFO_LABELS: &[&str] = &[
    "name",
    "arch",
    "partition",
    "feature",
    "address",
    "version",
    "os",
    "weight",
    "state",
    "reason",
];
const NODE_LABEL: &[&str] = &["name"];

/// Which node listing to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NodeDetailFormat {
    /// `sinfo -R --json`
    #[default]
    Json,
    /// `scontrol show nodes --oneliner`
    Scontrol,
}

/// One node, normalized from either schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDetail {
    pub name: String,
    pub arch: String,
    pub partitions: Vec<String>,
    pub features: Vec<String>,
    pub address: String,
    pub version: String,
    pub os: String,
    pub weight: String,
    /// Classified state label
    pub state: String,
    /// Empty, or `<reason> by <user>`
    pub reason: String,
    /// Load average
    pub cpu_load: f64,
    pub cpus: f64,
    pub alloc_cpus: f64,
    pub memory_total_bytes: f64,
    pub memory_allocated_bytes: f64,
    pub memory_free_bytes: f64,
    pub gpu_total: f64,
    pub gpu_used: f64,
}

fn format_reason(reason: &str, user: &str) -> String {
    match (reason.trim(), user.trim()) {
        ("", _) => String::new(),
        (reason, "") => reason.to_string(),
        (reason, user) => format!("{} by {}", reason, user),
    }
}

fn split_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct NodesDocument {
    #[serde(default)]
    nodes: Vec<JsonNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonNode {
    #[serde(deserialize_with = "nullable_string")]
    name: String,
    #[serde(deserialize_with = "nullable_string")]
    architecture: String,
    #[serde(deserialize_with = "nullable_string")]
    address: String,
    #[serde(deserialize_with = "nullable_string")]
    slurmd_version: String,
    #[serde(deserialize_with = "nullable_string")]
    version: String,
    #[serde(deserialize_with = "nullable_string")]
    operating_system: String,
    active_features: Tokens,
    partitions: Tokens,
    state: Tokens,
    state_flags: Tokens,
    #[serde(deserialize_with = "nullable_string")]
    reason: String,
    #[serde(deserialize_with = "nullable_string")]
    reason_set_by_user: String,
    #[serde(deserialize_with = "nullable_string")]
    gres: String,
    #[serde(deserialize_with = "nullable_string")]
    gres_used: String,
    weight: Number,
    cpus: Number,
    alloc_cpus: Number,
    /// Load average multiplied by 100
    cpu_load: Number,
    real_memory: Number,
    alloc_memory: Number,
    free_memory: Number,
}

impl From<JsonNode> for NodeDetail {
    fn from(n: JsonNode) -> Self {
        let mut states = n.state.0.into_iter();
        let base = states.next().unwrap_or_default();
        let flags: Vec<String> = states.chain(n.state_flags.0).collect();
        let version = if n.slurmd_version.is_empty() { n.version } else { n.slurmd_version };

        NodeDetail {
            name: n.name,
            arch: n.architecture,
            partitions: split_list(&n.partitions.0),
            features: split_list(&n.active_features.0),
            address: n.address,
            version,
            os: n.operating_system,
            weight: n.weight.value().to_string(),
            state: classify(&base, &flags),
            reason: format_reason(&n.reason, &n.reason_set_by_user),
            cpu_load: n.cpu_load.value() / 100.0,
            cpus: n.cpus.value(),
            alloc_cpus: n.alloc_cpus.value(),
            memory_total_bytes: n.real_memory.value() * MIB,
            memory_allocated_bytes: n.alloc_memory.value() * MIB,
            memory_free_bytes: n.free_memory.value() * MIB,
            gpu_total: gres_gpus(&n.gres),
            gpu_used: gres_gpus(&n.gres_used),
        }
    }
}

/// Parse the `sinfo -R --json` document.
pub fn parse_json(data: &str) -> Result<Vec<NodeDetail>> {
    let doc: NodesDocument = serde_json::from_str(data).context("Failed to decode node JSON")?;
    Ok(doc.nodes.into_iter().map(NodeDetail::from).collect())
}

/// Split one oneliner into `(key, value)` pairs.
///
/// A token without `=` continues the previous value, so values such as
/// `Reason=Not responding [slurm@2026-01-01T00:00:00]` or `OS=Linux 5.14.0 #1 SMP`
/// survive whitespace splitting. Keys left with an empty value are dropped.
fn key_values(line: &str) -> Vec<(&str, String)> {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    for token in line.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() && !key.contains(['[', '(']) => {
                pairs.push((key, value.to_string()));
            }
            _ => {
                if let Some((_, value)) = pairs.last_mut() {
                    value.push(' ');
                    value.push_str(token);
                }
            }
        }
    }
    pairs.retain(|(_, value)| !value.is_empty());
    pairs
}

/// Split `Reason=text [user@time]` into text and user.
fn split_reason(reason: &str) -> (&str, &str) {
    let reason = reason.trim();
    if let Some(open) = reason.rfind('[') {
        if reason.ends_with(']') {
            let stamp = &reason[open + 1..reason.len() - 1];
            let user = stamp.split('@').next().unwrap_or("");
            return (reason[..open].trim_end(), user);
        }
    }
    (reason, "")
}

fn parse_scontrol_line(line: &str) -> Option<NodeDetail> {
    let pairs = key_values(line);
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    };

    let name = get("NodeName");
    if name.is_empty() {
        return None;
    }

    let (base, flags) = split_compound(get("State"));
    let (reason, user) = split_reason(get("Reason"));
    let gpu_used = match pairs.iter().find(|(k, _)| *k == "GresUsed") {
        Some((_, used)) => gres_gpus(used),
        None => parse_allocated_gpus(get("AllocTRES")),
    };
    let non_null = |v: &str| if v == "(null)" { String::new() } else { v.to_string() };

    Some(NodeDetail {
        name: name.to_string(),
        arch: non_null(get("Arch")),
        partitions: split_list(&[get("Partitions").to_string()]),
        features: split_list(&[non_null(get("ActiveFeatures"))]),
        address: get("NodeAddr").to_string(),
        version: get("Version").to_string(),
        os: get("OS").to_string(),
        weight: get("Weight").to_string(),
        state: classify(&base, &flags),
        reason: format_reason(reason, user),
        cpu_load: number(get("CPULoad")),
        cpus: number(get("CPUTot")),
        alloc_cpus: number(get("CPUAlloc")),
        memory_total_bytes: number(get("RealMemory")) * MIB,
        memory_allocated_bytes: number(get("AllocMem")) * MIB,
        memory_free_bytes: number(get("FreeMem")) * MIB,
        gpu_total: gres_gpus(get("Gres")),
        gpu_used,
    })
}

/// Parse `scontrol show nodes --oneliner` output, one node per line.
pub fn parse_scontrol(data: &str) -> Vec<NodeDetail> {
    data.lines().filter_map(parse_scontrol_line).collect()
}

pub struct NodeDetailAdapter {
    ctx: AdapterContext,
    format: NodeDetailFormat,
    address_suffix: String,
    source: Source,
}

impl NodeDetailAdapter {
    pub fn new(ctx: AdapterContext, format: NodeDetailFormat, address_suffix: String) -> Self {
        let source = match format {
            NodeDetailFormat::Json => ctx.source(JSON_COMMAND, JSON_FIXTURE),
            NodeDetailFormat::Scontrol => ctx.source(SCONTROL_COMMAND, SCONTROL_FIXTURE),
        };
        Self {
            ctx,
            format,
            address_suffix,
            source,
        }
    }

    fn descriptors() -> [MetricDescriptor; 9] {
        [
            MetricDescriptor::gauge("slurm_node_info", "Informations about nodes.", INFO_LABELS),
            MetricDescriptor::gauge("slurm_node_cpu_load", "CPU Load per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_cpu_tot", "CPU total available per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_cpu_allocated", "CPU Allocated per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_memory_total_bytes", "Total memory per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_memory_allocated_bytes", "Allocated memory per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_memory_free_bytes", "Free memory per node as reported by slurm CLI.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_gpu_tot", "Number of total GPU on the node.", NODE_LABEL),
            MetricDescriptor::gauge("slurm_node_gpu_free", "Number of free GPU on the node.", NODE_LABEL),
        ]
    }

    pub fn map(&self, nodes: &[NodeDetail]) -> Vec<Observation> {
        let [info, load, cpu_tot, cpu_alloc, mem_tot, mem_alloc, mem_free, gpu_tot, gpu_free] = Self::descriptors();
        let mut out = Vec::new();

        for node in nodes {
            let address = format!("{}{}", node.address, self.address_suffix);
            let no_feature = [String::new()];
            let features = if node.features.is_empty() { &no_feature[..] } else { &node.features[..] };

            for partition in &node.partitions {
                for feature in features {
                    out.push(info.observe(
                        &[
                            &node.name,
                            &node.arch,
                            partition,
                            feature,
                            &address,
                            &node.version,
                            &node.os,
                            &node.weight,
                            &node.state,
                            &node.reason,
                        ],
                        1.0,
                    ));
                }
            }

            let name = [&node.name];
            out.push(load.observe(&name, node.cpu_load));
            out.push(cpu_tot.observe(&name, node.cpus));
            out.push(cpu_alloc.observe(&name, node.alloc_cpus));
            out.push(mem_tot.observe(&name, node.memory_total_bytes));
            out.push(mem_alloc.observe(&name, node.memory_allocated_bytes));
            out.push(mem_free.observe(&name, node.memory_free_bytes));
            out.push(gpu_tot.observe(&name, node.gpu_total));
            out.push(gpu_free.observe(&name, node.gpu_total - node.gpu_used));
        }
        out
    }
}

#[async_trait]
impl Adapter for NodeDetailAdapter {
    fn name(&self) -> &str {
        "node_detail"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let nodes = match self.format {
            NodeDetailFormat::Json => parse_json(&data)?,
            NodeDetailFormat::Scontrol => parse_scontrol(&data),
        };
        Ok(self.map(&nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::render;
    use crate::metrics::ObservationSet;
    use crate::slurm::test_support::{fixture_context, fixture_context_with};
    use crate::telemetry::Telemetry;
    use std::sync::Arc;

    const LEGACY: &str = r#"{"nodes": [{
        "name": "c1", "architecture": "x86_64", "address": "c1", "slurmd_version": "21.08.8",
        "operating_system": "Linux 5.10", "partitions": ["main", "long"], "active_features": "ib,avx2",
        "state": "idle", "state_flags": ["DRAIN"], "reason": "bad dimm", "reason_set_by_user": "root",
        "weight": 10, "cpus": 64, "alloc_cpus": 0, "cpu_load": 250, "real_memory": 1024,
        "alloc_memory": 0, "free_memory": 512, "gres": "gpu:nvidia:3", "gres_used": "gpu:nvidia:1(IDX:0)"
    }]}"#;

    const CURRENT: &str = r#"{"nodes": [{
        "name": "c2", "architecture": "x86_64", "address": "c2", "version": "23.11.4",
        "partitions": ["gpu"], "active_features": ["a100"], "state": ["MIXED", "DRAIN"],
        "reason": "", "reason_set_by_user": null,
        "weight": 1, "cpus": 32, "alloc_cpus": 16,
        "cpu_load": {"set": true, "infinite": false, "number": 1600},
        "free_memory": {"set": false, "infinite": false, "number": 0},
        "gres": "gpu:a100:4(S:0-1)", "gres_used": "gpu:a100:4(IDX:0-3)"
    }]}"#;

    fn adapter(suffix: &str) -> NodeDetailAdapter {
        NodeDetailAdapter::new(fixture_context(), NodeDetailFormat::Json, suffix.to_string())
    }

    #[test]
    fn test_legacy_json() {
        let nodes = parse_json(LEGACY).unwrap();
        let n = &nodes[0];
        assert_eq!(n.state, "DRAINED");
        assert_eq!(n.reason, "bad dimm by root");
        assert_eq!(n.cpu_load, 2.5);
        assert_eq!(n.memory_total_bytes, 1024.0 * MIB);
        assert_eq!(n.memory_free_bytes, 512.0 * MIB);
        assert_eq!(n.gpu_total, 3.0);
        assert_eq!(n.gpu_used, 1.0);
        assert_eq!(n.version, "21.08.8");
        assert_eq!(n.weight, "10");
        assert_eq!(n.features, vec!["ib", "avx2"]);
    }

    #[test]
    fn test_current_json() {
        let nodes = parse_json(CURRENT).unwrap();
        let n = &nodes[0];
        assert_eq!(n.state, "DRAINING");
        assert_eq!(n.reason, "");
        assert_eq!(n.cpu_load, 16.0);
        assert_eq!(n.memory_free_bytes, 0.0);
        assert_eq!(n.version, "23.11.4");
        assert_eq!(n.gpu_total - n.gpu_used, 0.0);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(parse_json("{not json").is_err());
    }

    #[test]
    fn test_info_series_per_partition_and_feature() {
        let nodes = parse_json(LEGACY).unwrap();
        let set: ObservationSet = adapter(".cluster.local").map(&nodes).into_iter().collect();

        assert_eq!(set.named("slurm_node_info").count(), 4);
        assert_eq!(
            set.get(
                "slurm_node_info",
                &[("partition", "long"), ("feature", "avx2"), ("address", "c1.cluster.local")]
            ),
            Some(1.0)
        );
        assert_eq!(set.get("slurm_node_gpu_free", &[("name", "c1")]), Some(2.0));
        assert_eq!(set.get("slurm_node_cpu_load", &[("name", "c1")]), Some(2.5));
    }

    #[test]
    fn test_node_without_features_gets_empty_feature() {
        let mut nodes = parse_json(LEGACY).unwrap();
        nodes[0].features.clear();
        let set: ObservationSet = adapter("").map(&nodes).into_iter().collect();
        assert_eq!(set.named("slurm_node_info").count(), 2);
        assert_eq!(set.get("slurm_node_info", &[("feature", ""), ("partition", "main")]), Some(1.0));
    }

    #[test]
    fn test_key_values_absorb_spaces() {
        let pairs = key_values("NodeName=c1 OS=Linux 5.14.0 #1 SMP State=IDLE Reason=Not responding [slurm@2026-01-01T00:00:00]");
        assert_eq!(pairs[1], ("OS", "Linux 5.14.0 #1 SMP".to_string()));
        assert_eq!(pairs[2], ("State", "IDLE".to_string()));
        assert_eq!(pairs[3], ("Reason", "Not responding [slurm@2026-01-01T00:00:00]".to_string()));
    }

    #[test]
    fn test_empty_values_dropped() {
        let pairs = key_values("NodeName=c1 Comment= Gres= State=IDLE");
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["NodeName", "State"]);
    }

    #[test]
    fn test_split_reason() {
        assert_eq!(split_reason("Not responding [slurm@2026-01-01T00:00:00]"), ("Not responding", "slurm"));
        assert_eq!(split_reason("plain text"), ("plain text", ""));
    }

    #[test]
    fn test_scontrol_line() {
        let line = "NodeName=n7 Arch=x86_64 CPUAlloc=8 CPUTot=16 CPULoad=3.25 ActiveFeatures=(null) \
                    Gres=gpu:2 NodeAddr=n7 Version=23.02.7 OS=Linux 5.14 RealMemory=2048 AllocMem=1024 \
                    FreeMem=N/A State=DOWN* Weight=5 Partitions=main AllocTRES=cpu=8,gres/gpu=1 \
                    Reason=Not responding [slurm@2026-01-01T00:00:00]";
        let n = parse_scontrol_line(line).unwrap();
        assert_eq!(n.state, "DOWN");
        assert_eq!(n.reason, "Not responding by slurm");
        assert_eq!(n.cpu_load, 3.25);
        assert_eq!(n.memory_free_bytes, 0.0);
        assert_eq!(n.memory_allocated_bytes, 1024.0 * MIB);
        assert_eq!(n.gpu_total, 2.0);
        assert_eq!(n.gpu_used, 1.0);
        assert!(n.features.is_empty());
        assert_eq!(n.os, "Linux 5.14");
    }

    #[test]
    fn test_scontrol_skips_lines_without_name() {
        assert!(parse_scontrol("No nodes in the system\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_json_fixture_pipeline() {
        let set: ObservationSet = adapter("").collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_node_cpu_tot", &[("name", "gpu001")]), Some(64.0));
        assert_eq!(set.get("slurm_node_gpu_free", &[("name", "gpu001")]), Some(2.0));
        assert_eq!(set.get("slurm_node_info", &[("name", "gpu001"), ("state", "DRAINING")]), Some(1.0));
        assert_eq!(set.get("slurm_node_info", &[("name", "cpu017"), ("state", "IDLE")]), Some(1.0));
        assert_eq!(
            set.get("slurm_node_info", &[("name", "cpu018"), ("reason", "Kill task failed by root")]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_node_without_gres_renders_plain_zero() {
        let adapter = adapter("");
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_node_gpu_tot", &[("name", "cpu017")]), Some(0.0));

        let text = render(&adapter.describe(), &set, &Telemetry::new().unwrap()).unwrap();
        assert!(text.lines().any(|l| l == "slurm_node_gpu_tot{name=\"cpu017\"} 0"));
        assert!(!text.lines().any(|l| l.ends_with(" -0")));
    }

    #[tokio::test]
    async fn test_scontrol_fixture_pipeline() {
        let adapter = NodeDetailAdapter::new(fixture_context(), NodeDetailFormat::Scontrol, String::new());
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_node_cpu_allocated", &[("name", "node001")]), Some(32.0));
        assert_eq!(set.get("slurm_node_cpu_load", &[("name", "node001")]), Some(12.5));
        assert_eq!(set.get("slurm_node_info", &[("name", "node001"), ("state", "DRAINING")]), Some(1.0));
        assert_eq!(set.get("slurm_node_info", &[("name", "node002"), ("state", "DOWN")]), Some(1.0));
        assert_eq!(
            set.get("slurm_node_info", &[("name", "node002"), ("reason", "Not responding by slurm")]),
            Some(1.0)
        );
        assert_eq!(set.named("slurm_node_cpu_tot").count(), 3);
    }

    #[tokio::test]
    async fn test_broken_json_fails_the_adapter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(JSON_FIXTURE), "{\"nodes\": [").unwrap();

        let telemetry = Arc::new(Telemetry::new().unwrap());
        let base = fixture_context_with(telemetry);
        let ctx = AdapterContext::new(base.runner().clone(), Some(dir.path().to_path_buf()));
        let adapter = NodeDetailAdapter::new(ctx, NodeDetailFormat::Json, String::new());
        assert!(adapter.collect().await.is_err());
    }
}
