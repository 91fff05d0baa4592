// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-job details from `squeue -a --json`.
//!
//! Every job yields one series per gauge, labelled by its identity. Jobs
//! that have started (or finished) also feed the scheduling and execution
//! duration histograms.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::parse::{nullable_string, Number, Tokens};
use super::AdapterContext;
use crate::directory::UserDirectory;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["squeue", "-a", "--json"];
const FIXTURE: &str = "jobs.json";

const JOB_LABELS: &[&str] = &["name", "job_id", "state", "state_reason", "partition", "user", "node"];

const MIB: f64 = 1024.0 * 1024.0;

/// 1 second
const MIN_BUCKET: f64 = 1.0;
/// 14 days
const MAX_BUCKET: f64 = 3600.0 * 24.0 * 14.0;
const BUCKET_COUNT: usize = 15;

/// Exponentially spaced bucket bounds from [`MIN_BUCKET`] to [`MAX_BUCKET`].
pub fn duration_buckets() -> Vec<f64> {
    let factor = (MAX_BUCKET / MIN_BUCKET).powf(1.0 / (BUCKET_COUNT - 1) as f64);
    (0..BUCKET_COUNT)
        .map(|i| MIN_BUCKET * factor.powi(i as i32))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct JobsDocument {
    #[serde(default)]
    jobs: Vec<JsonJob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonJob {
    #[serde(deserialize_with = "nullable_string")]
    name: String,
    job_id: Number,
    job_state: Tokens,
    #[serde(deserialize_with = "nullable_string")]
    state_reason: String,
    #[serde(deserialize_with = "nullable_string")]
    partition: String,
    #[serde(deserialize_with = "nullable_string")]
    user_name: String,
    user_id: Number,
    #[serde(deserialize_with = "nullable_string")]
    nodes: String,
    cpus: Number,
    node_count: Number,
    memory_per_cpu: Number,
    memory_per_node: Number,
    billable_tres: Number,
    restart_cnt: Number,
    submit_time: Number,
    start_time: Number,
    end_time: Number,
}

/// One job as reported by squeue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    pub name: String,
    pub job_id: String,
    pub state: String,
    pub state_reason: String,
    pub partition: String,
    pub user_name: String,
    pub user_id: String,
    pub nodes: String,
    pub cpus: f64,
    pub node_count: f64,
    /// MiB
    pub memory_per_cpu: f64,
    /// MiB
    pub memory_per_node: f64,
    pub billing: f64,
    pub restarts: f64,
    pub submit_time: f64,
    pub start_time: f64,
    pub end_time: f64,
}

impl From<JsonJob> for Job {
    fn from(j: JsonJob) -> Self {
        Job {
            name: j.name,
            job_id: (j.job_id.value() as u64).to_string(),
            state: j.job_state.0.into_iter().next().unwrap_or_default(),
            state_reason: j.state_reason,
            partition: j.partition,
            user_name: j.user_name,
            user_id: (j.user_id.value() as u64).to_string(),
            nodes: j.nodes,
            cpus: j.cpus.value(),
            node_count: j.node_count.value(),
            memory_per_cpu: j.memory_per_cpu.value(),
            memory_per_node: j.memory_per_node.value(),
            billing: j.billable_tres.value(),
            restarts: j.restart_cnt.value(),
            submit_time: j.submit_time.value(),
            start_time: j.start_time.value(),
            end_time: j.end_time.value(),
        }
    }
}

impl Job {
    /// Requested memory in bytes; per-CPU requests take precedence over per-node ones.
    pub fn requested_memory_bytes(&self) -> f64 {
        let mib = if self.memory_per_cpu > 0.0 {
            self.memory_per_cpu * self.cpus
        } else {
            self.memory_per_node * self.node_count
        };
        mib * MIB
    }

    /// Seconds between submission and start
    pub fn scheduling_duration(&self) -> Option<f64> {
        if !matches!(self.state.as_str(), "RUNNING" | "COMPLETING" | "COMPLETED") {
            return None;
        }
        interval(self.submit_time, self.start_time)
    }

    /// Seconds between start and end, for completed jobs only
    pub fn exec_duration(&self) -> Option<f64> {
        if self.state != "COMPLETED" {
            return None;
        }
        interval(self.start_time, self.end_time)
    }
}

fn interval(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || to == 0.0 || to < from {
        return None;
    }
    Some(to - from)
}

/// Parse the `squeue --json` document.
pub fn parse_jobs(data: &str) -> Result<Vec<Job>> {
    let doc: JobsDocument = serde_json::from_str(data).context("Failed to decode squeue JSON")?;
    Ok(doc.jobs.into_iter().map(Job::from).collect())
}

pub struct JobsAdapter {
    ctx: AdapterContext,
    directory: Arc<UserDirectory>,
    source: Source,
}

impl JobsAdapter {
    pub fn new(ctx: AdapterContext, directory: Arc<UserDirectory>) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self {
            ctx,
            directory,
            source,
        }
    }

    fn descriptors() -> [MetricDescriptor; 8] {
        [
            MetricDescriptor::gauge("slurm_job_info", "General informations about slurm jobs.", JOB_LABELS),
            MetricDescriptor::gauge("slurm_job_req_cpu", "Requested CPU per job.", JOB_LABELS),
            MetricDescriptor::gauge("slurm_job_req_memory_bytes", "Requested Memory per job.", JOB_LABELS),
            MetricDescriptor::gauge("slurm_job_req_billing", "Requested billing per job.", JOB_LABELS),
            MetricDescriptor::gauge("slurm_job_req_nodes", "Requested Nodes per job.", JOB_LABELS),
            MetricDescriptor::gauge("slurm_job_restart_count", "Requested Restart count per job.", JOB_LABELS),
            MetricDescriptor::histogram(
                "slurm_job_scheduling_duration",
                "Slurm job scheduling duration only for COMPLETED or RUNNING jobs.",
                JOB_LABELS,
                duration_buckets(),
            ),
            MetricDescriptor::histogram(
                "slurm_job_exec_duration",
                "Slurm job execution duration only for COMPLETED jobs.",
                JOB_LABELS,
                duration_buckets(),
            ),
        ]
    }

    fn user_label(&self, job: &Job) -> String {
        if job.user_name.is_empty() {
            self.directory.resolve(&job.user_id)
        } else {
            job.user_name.clone()
        }
    }

    pub fn map(&self, jobs: &[Job]) -> Vec<Observation> {
        let [info, cpu, memory, billing, nodes, restarts, scheduling, exec] = Self::descriptors();
        let mut out = Vec::with_capacity(jobs.len() * 6);

        for job in jobs {
            let labels = [
                job.name.clone(),
                job.job_id.clone(),
                job.state.clone(),
                job.state_reason.clone(),
                job.partition.clone(),
                self.user_label(job),
                job.nodes.clone(),
            ];
            out.push(info.observe(&labels, 1.0));
            out.push(cpu.observe(&labels, job.cpus));
            out.push(memory.observe(&labels, job.requested_memory_bytes()));
            out.push(billing.observe(&labels, job.billing));
            out.push(nodes.observe(&labels, job.node_count));
            out.push(restarts.observe(&labels, job.restarts));
            if let Some(secs) = job.scheduling_duration() {
                out.push(scheduling.observe(&labels, secs));
            }
            if let Some(secs) = job.exec_duration() {
                out.push(exec.observe(&labels, secs));
            }
        }
        out
    }
}

#[async_trait]
impl Adapter for JobsAdapter {
    fn name(&self) -> &str {
        "jobs"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.map(&parse_jobs(&data)?))
    }
}
