// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! GPU capacity and allocation.
//!
//! Capacity comes from the GRES column of `sinfo`, allocation from the
//! TRES of running jobs in `sacct`. Idle and utilization need both, so this
//! adapter owns two commands.

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{gres_gpus, number};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const TOTAL_COMMAND: &[&str] = &["sinfo", "-h", "-o", "%n %G"];
const TOTAL_FIXTURE: &str = "sinfo_gres.txt";

const ALLOC_COMMAND: &[&str] = &[
    "sacct",
    "-a",
    "-X",
    "--format=AllocTRES",
    "--state=RUNNING",
    "--noheader",
    "--parsable2",
];
const ALLOC_FIXTURE: &str = "sacct_gpus.txt";

const TRES_GPU: &str = "gres/gpu=";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuUsage {
    pub alloc: f64,
    pub idle: f64,
    pub total: f64,
    pub utilization: f64,
}

impl GpuUsage {
    pub fn new(total: f64, alloc: f64) -> Self {
        let utilization = if total > 0.0 { alloc / total } else { 0.0 };
        Self {
            alloc,
            idle: total - alloc,
            total,
            utilization,
        }
    }
}

/// Sum GPUs over `node gres` lines.
pub fn parse_total_gpus(data: &str) -> f64 {
    data.lines()
        .map(|line| line.trim().trim_matches('"'))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(gres_gpus)
        .fold(0.0, |acc, n| acc + n)
}

/// Sum `gres/gpu=N` entries over AllocTRES lines.
pub fn parse_allocated_gpus(data: &str) -> f64 {
    data.lines()
        .map(|line| line.trim().trim_matches('"'))
        .flat_map(|line| line.split(','))
        .filter_map(|res| res.strip_prefix(TRES_GPU))
        .map(number)
        .fold(0.0, |acc, n| acc + n)
}

pub struct GpusAdapter {
    ctx: AdapterContext,
    total: Source,
    alloc: Source,
}

impl GpusAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let total = ctx.source(TOTAL_COMMAND, TOTAL_FIXTURE);
        let alloc = ctx.source(ALLOC_COMMAND, ALLOC_FIXTURE);
        Self { ctx, total, alloc }
    }

    fn descriptors() -> [MetricDescriptor; 4] {
        [
            MetricDescriptor::gauge("slurm_gpus_alloc", "Allocated GPUs", &[]),
            MetricDescriptor::gauge("slurm_gpus_idle", "Idle GPUs", &[]),
            MetricDescriptor::gauge("slurm_gpus_total", "Total GPUs", &[]),
            MetricDescriptor::gauge("slurm_gpus_utilization", "Total GPU utilization", &[]),
        ]
    }

    pub fn map(usage: &GpuUsage) -> Vec<Observation> {
        let [alloc, idle, total, utilization] = Self::descriptors();
        vec![
            alloc.value(usage.alloc),
            idle.value(usage.idle),
            total.value(usage.total),
            utilization.value(usage.utilization),
        ]
    }
}

#[async_trait]
impl Adapter for GpusAdapter {
    fn name(&self) -> &str {
        "gpus"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        // an empty sacct listing is a real answer (no GPU jobs); a failed one is not
        let (total, alloc) = tokio::join!(
            self.ctx.fetch_checked(&self.total),
            self.ctx.fetch_checked(&self.alloc)
        );
        let (Some(total), Some(alloc)) = (total, alloc) else {
            return Ok(Vec::new());
        };
        if total.trim().is_empty() {
            return Ok(Vec::new());
        }
        let usage = GpuUsage::new(parse_total_gpus(&total), parse_allocated_gpus(&alloc));
        Ok(Self::map(&usage))
    }
}
