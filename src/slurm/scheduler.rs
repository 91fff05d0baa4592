// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Controller statistics from `sdiag`.
//!
//! sdiag repeats keys such as `Last cycle` under the main scheduler and
//! the backfill scheduler, so lines are read with the current section in
//! mind.

use anyhow::Result;
use async_trait::async_trait;

use super::parse::number;
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["sdiag"];
const FIXTURE: &str = "sdiag.txt";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    pub threads: f64,
    pub queue_size: f64,
    pub dbd_queue_size: f64,
    pub last_cycle: f64,
    pub mean_cycle: f64,
    pub cycle_per_minute: f64,
    pub backfill_last_cycle: f64,
    pub backfill_mean_cycle: f64,
    pub backfill_depth_mean: f64,
    pub backfilled_since_start: f64,
    pub backfilled_since_cycle: f64,
    pub backfilled_heterogeneous: f64,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    General,
    Main,
    Backfill,
    Other,
}

/// Parse sdiag's `key: value` report.
pub fn parse_sdiag(data: &str) -> SchedulerStats {
    let mut stats = SchedulerStats::default();
    let mut section = Section::General;

    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Main schedule statistics") {
            section = Section::Main;
            continue;
        }
        if trimmed.starts_with("Backfilling stats") {
            section = Section::Backfill;
            continue;
        }
        // remaining unindented headers (RPC statistics, Remote Procedure Call ...)
        if !line.starts_with(char::is_whitespace) && !trimmed.contains(':') && !trimmed.is_empty() {
            section = Section::Other;
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = number(value.split_whitespace().next().unwrap_or(""));

        match (section, key.trim()) {
            (_, "Server thread count") => stats.threads = value,
            (_, "Agent queue size") => stats.queue_size = value,
            (_, "DBD Agent queue size") => stats.dbd_queue_size = value,
            (Section::Main, "Last cycle") => stats.last_cycle = value,
            (Section::Main, "Mean cycle") => stats.mean_cycle = value,
            (Section::Main, "Cycles per minute") => stats.cycle_per_minute = value,
            (Section::Backfill, "Last cycle") => stats.backfill_last_cycle = value,
            (Section::Backfill, "Mean cycle") => stats.backfill_mean_cycle = value,
            (Section::Backfill, "Depth Mean") => stats.backfill_depth_mean = value,
            (Section::Backfill, "Total backfilled jobs (since last slurm start)") => {
                stats.backfilled_since_start = value
            }
            (Section::Backfill, "Total backfilled jobs (since last stats cycle start)") => {
                stats.backfilled_since_cycle = value
            }
            (Section::Backfill, "Total backfilled heterogeneous job components") => {
                stats.backfilled_heterogeneous = value
            }
            _ => {}
        }
    }
    stats
}

pub struct SchedulerAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl SchedulerAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self { ctx, source }
    }

    fn descriptors() -> [MetricDescriptor; 12] {
        [
            MetricDescriptor::gauge("slurm_scheduler_threads", "Information provided by the Slurm sdiag command, number of scheduler threads", &[]),
            MetricDescriptor::gauge("slurm_scheduler_queue_size", "Information provided by the Slurm sdiag command, length of the scheduler queue", &[]),
            MetricDescriptor::gauge("slurm_scheduler_dbd_queue_size", "Information provided by the Slurm sdiag command, length of the DBD agent queue", &[]),
            MetricDescriptor::gauge("slurm_scheduler_last_cycle", "Information provided by the Slurm sdiag command, scheduler last cycle time in (microseconds)", &[]),
            MetricDescriptor::gauge("slurm_scheduler_mean_cycle", "Information provided by the Slurm sdiag command, scheduler mean cycle time in (microseconds)", &[]),
            MetricDescriptor::gauge("slurm_scheduler_cycle_per_minute", "Information provided by the Slurm sdiag command, number scheduler cycles per minute", &[]),
            MetricDescriptor::gauge("slurm_scheduler_backfill_last_cycle", "Information provided by the Slurm sdiag command, scheduler backfill last cycle time in (microseconds)", &[]),
            MetricDescriptor::gauge("slurm_scheduler_backfill_mean_cycle", "Information provided by the Slurm sdiag command, scheduler backfill mean cycle time in (microseconds)", &[]),
            MetricDescriptor::gauge("slurm_scheduler_backfill_depth_mean", "Information provided by the Slurm sdiag command, scheduler backfill mean depth", &[]),
            MetricDescriptor::counter("slurm_scheduler_backfilled_jobs_since_start_total", "Information provided by the Slurm sdiag command, number of jobs started thanks to backfilling since last slurm start", &[]),
            MetricDescriptor::counter("slurm_scheduler_backfilled_jobs_since_cycle_total", "Information provided by the Slurm sdiag command, number of jobs started thanks to backfilling since last time stats where reset", &[]),
            MetricDescriptor::counter("slurm_scheduler_backfilled_heterogeneous_total", "Information provided by the Slurm sdiag command, number of heterogeneous job components started thanks to backfilling since last Slurm start", &[]),
        ]
    }

    pub fn map(stats: &SchedulerStats) -> Vec<Observation> {
        let values = [
            stats.threads,
            stats.queue_size,
            stats.dbd_queue_size,
            stats.last_cycle,
            stats.mean_cycle,
            stats.cycle_per_minute,
            stats.backfill_last_cycle,
            stats.backfill_mean_cycle,
            stats.backfill_depth_mean,
            stats.backfilled_since_start,
            stats.backfilled_since_cycle,
            stats.backfilled_heterogeneous,
        ];
        Self::descriptors()
            .iter()
            .zip(values)
            .map(|(desc, value)| desc.value(value))
            .collect()
    }
}

#[async_trait]
impl Adapter for SchedulerAdapter {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(Self::map(&parse_sdiag(&data)))
    }
}
