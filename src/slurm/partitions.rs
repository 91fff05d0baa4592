// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-partition CPU figures (`sinfo`) and job counts (`squeue`).

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{delimited_lines, field, CpuStates};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const LABELS: &[&str] = &["partition"];

const CPUS_COMMAND: &[&str] = &["sinfo", "-h", "-o", "%R,%C"];
const CPUS_FIXTURE: &str = "sinfo_partitions.txt";

const JOBS_COMMAND: &[&str] = &["squeue", "-a", "-r", "-h", "-o", "%P|%T", "--states=PENDING,RUNNING"];
const JOBS_FIXTURE: &str = "squeue_partitions.txt";

/// Parse `partition,a/i/o/t` lines.
pub fn parse_partition_cpus(data: &str) -> BTreeMap<String, CpuStates> {
    delimited_lines(data, ',')
        .map(|fields| (field(&fields, 0).trim().to_string(), CpuStates::parse(field(&fields, 1))))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartitionJobs {
    pub pending: f64,
    pub running: f64,
}

/// Parse `partitions|state` lines.
///
/// A pending job submitted to several partitions lists them comma-separated
/// and counts once in each.
pub fn parse_partition_jobs(data: &str) -> BTreeMap<String, PartitionJobs> {
    let mut partitions: BTreeMap<String, PartitionJobs> = BTreeMap::new();
    for fields in delimited_lines(data, '|') {
        let state = field(&fields, 1).trim();
        for name in field(&fields, 0).split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let jobs = partitions.entry(name.to_string()).or_default();
            match state {
                "PENDING" => jobs.pending += 1.0,
                "RUNNING" => jobs.running += 1.0,
                _ => {}
            }
        }
    }
    partitions
}

fn push_nonzero(out: &mut Vec<Observation>, desc: &MetricDescriptor, partition: &str, value: f64) {
    if value > 0.0 {
        out.push(desc.observe(&[partition], value));
    }
}

pub struct PartitionCpusAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl PartitionCpusAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(CPUS_COMMAND, CPUS_FIXTURE);
        Self { ctx, source }
    }

    fn descriptors() -> [MetricDescriptor; 4] {
        [
            MetricDescriptor::gauge("slurm_partition_cpus_allocated", "Allocated CPUs for partition", LABELS),
            MetricDescriptor::gauge("slurm_partition_cpus_idle", "Idle CPUs for partition", LABELS),
            MetricDescriptor::gauge("slurm_partition_cpus_other", "Other CPUs for partition", LABELS),
            MetricDescriptor::gauge("slurm_partition_cpus_total", "Total CPUs for partition", LABELS),
        ]
    }

    pub fn map(partitions: &BTreeMap<String, CpuStates>) -> Vec<Observation> {
        let [allocated, idle, other, total] = Self::descriptors();
        let mut out = Vec::new();
        for (name, cpus) in partitions {
            push_nonzero(&mut out, &allocated, name, cpus.allocated);
            push_nonzero(&mut out, &idle, name, cpus.idle);
            push_nonzero(&mut out, &other, name, cpus.other);
            push_nonzero(&mut out, &total, name, cpus.total);
        }
        out
    }
}

#[async_trait]
impl Adapter for PartitionCpusAdapter {
    fn name(&self) -> &str {
        "partition_cpus"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        Ok(Self::map(&parse_partition_cpus(&data)))
    }
}

pub struct PartitionJobsAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl PartitionJobsAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(JOBS_COMMAND, JOBS_FIXTURE);
        Self { ctx, source }
    }

    fn descriptors() -> [MetricDescriptor; 2] {
        [
            MetricDescriptor::gauge("slurm_partition_jobs_pending", "Pending jobs for partition", LABELS),
            MetricDescriptor::gauge("slurm_partition_jobs_running", "Running jobs for partition", LABELS),
        ]
    }

    pub fn map(partitions: &BTreeMap<String, PartitionJobs>) -> Vec<Observation> {
        let [pending, running] = Self::descriptors();
        let mut out = Vec::new();
        for (name, jobs) in partitions {
            push_nonzero(&mut out, &pending, name, jobs.pending);
            push_nonzero(&mut out, &running, name, jobs.running);
        }
        out
    }
}

#[async_trait]
impl Adapter for PartitionJobsAdapter {
    fn name(&self) -> &str {
        "partition_jobs"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        Ok(Self::map(&parse_partition_jobs(&data)))
    }
}
