// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Node counts by state, from `sinfo -o %D,%T`.
//!
//! sinfo prints one line per (partition, state) group, so a node shared by
//! two partitions shows up twice. Identical lines are collapsed before
//! counting.

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{delimited_lines, field, number};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["sinfo", "-h", "-o", "%D,%T"];
const FIXTURE: &str = "sinfo.txt";

/// (state prefix, metric, help), matched top to bottom
const STATES: &[(&str, &str, &str)] = &[
    ("alloc", "slurm_nodes_alloc", "Allocated nodes"),
    ("comp", "slurm_nodes_comp", "Completing nodes"),
    ("down", "slurm_nodes_down", "Down nodes"),
    ("draining", "slurm_nodes_draining", "Draining nodes"),
    ("drained", "slurm_nodes_drained", "Drained nodes"),
    ("fail", "slurm_nodes_fail", "Fail nodes"),
    ("err", "slurm_nodes_err", "Error nodes"),
    ("idle", "slurm_nodes_idle", "Idle nodes"),
    ("maint", "slurm_nodes_maint", "Maint nodes"),
    ("mix", "slurm_nodes_mix", "Mix nodes"),
    ("res", "slurm_nodes_resv", "Reserved nodes"),
];

/// Node counts in the order of [`STATES`]
pub fn parse_nodes(data: &str) -> [f64; STATES.len()] {
    let mut lines: Vec<&str> = data.lines().collect();
    lines.sort_unstable();
    lines.dedup();

    let mut counts = [0.0; STATES.len()];
    for fields in delimited_lines(&lines.join("\n"), ',') {
        let count = number(field(&fields, 0));
        let state = field(&fields, 1).trim();
        if let Some(idx) = STATES.iter().position(|(prefix, _, _)| state.starts_with(prefix)) {
            counts[idx] += count;
        }
    }
    counts
}

pub struct NodesAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl NodesAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self { ctx, source }
    }
}

#[async_trait]
impl Adapter for NodesAdapter {
    fn name(&self) -> &str {
        "nodes"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        STATES
            .iter()
            .map(|(_, name, help)| MetricDescriptor::gauge(name, help, &[]))
            .collect()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let counts = parse_nodes(&data);
        Ok(self
            .describe()
            .iter()
            .zip(counts)
            .map(|(desc, count)| desc.value(count))
            .collect())
    }
}
