// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Cluster-wide job counts per state, from `squeue`.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{delimited_lines, field};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["squeue", "-a", "-r", "-h", "-o", "%A,%T,%r", "--states=all"];
const FIXTURE: &str = "squeue.txt";

/// (squeue state, metric, help)
const STATES: &[(&str, &str, &str)] = &[
    ("PENDING", "slurm_queue_pending", "Pending jobs in queue"),
    ("RUNNING", "slurm_queue_running", "Running jobs in the cluster"),
    ("SUSPENDED", "slurm_queue_suspended", "Suspended jobs in the cluster"),
    ("CANCELLED", "slurm_queue_cancelled", "Cancelled jobs in the cluster"),
    ("COMPLETING", "slurm_queue_completing", "Completing jobs in the cluster"),
    ("COMPLETED", "slurm_queue_completed", "Completed jobs in the cluster"),
    ("CONFIGURING", "slurm_queue_configuring", "Configuring jobs in the cluster"),
    ("FAILED", "slurm_queue_failed", "Number of failed jobs"),
    ("TIMEOUT", "slurm_queue_timeout", "Jobs stopped by timeout"),
    ("PREEMPTED", "slurm_queue_preempted", "Number of preempted jobs"),
    ("NODE_FAIL", "slurm_queue_node_fail", "Number of jobs stopped due to node fail"),
    ("OUT_OF_MEMORY", "slurm_queue_out_of_memory", "Number of jobs stopped by oomkiller"),
];

const PENDING_DEPENDENCY: &str = "slurm_queue_pending_dependency";

/// Job counts keyed by squeue state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueCounts {
    pub by_state: HashMap<String, f64>,
    /// Pending jobs whose reason is `Dependency`
    pub pending_dependency: f64,
}

/// Parse `%A,%T,%r` lines (job id, state, reason).
pub fn parse_queue(data: &str) -> QueueCounts {
    let mut counts = QueueCounts::default();
    for fields in delimited_lines(data, ',') {
        let state = field(&fields, 1).trim();
        if !STATES.iter().any(|(s, _, _)| *s == state) {
            continue;
        }
        *counts.by_state.entry(state.to_string()).or_insert(0.0) += 1.0;
        if state == "PENDING" && field(&fields, 2).trim() == "Dependency" {
            counts.pending_dependency += 1.0;
        }
    }
    counts
}

pub struct QueueAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl QueueAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self { ctx, source }
    }

    fn pending_dependency() -> MetricDescriptor {
        MetricDescriptor::gauge(PENDING_DEPENDENCY, "Pending jobs because of dependency in queue", &[])
    }

    fn descriptors() -> Vec<MetricDescriptor> {
        STATES
            .iter()
            .map(|(_, name, help)| MetricDescriptor::gauge(name, help, &[]))
            .chain(std::iter::once(Self::pending_dependency()))
            .collect()
    }

    /// Emit only the states that have jobs.
    pub fn map(counts: &QueueCounts) -> Vec<Observation> {
        let mut out: Vec<Observation> = STATES
            .iter()
            .filter_map(|(state, name, help)| {
                let value = counts.by_state.get(*state).copied().unwrap_or(0.0);
                (value > 0.0).then(|| MetricDescriptor::gauge(name, help, &[]).value(value))
            })
            .collect();
        if counts.pending_dependency > 0.0 {
            out.push(Self::pending_dependency().value(counts.pending_dependency));
        }
        out
    }
}

#[async_trait]
impl Adapter for QueueAdapter {
    fn name(&self) -> &str {
        "queue"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        Ok(Self::map(&parse_queue(&data)))
    }
}
