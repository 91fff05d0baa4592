// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Slurm adapters.
//!
//! Each adapter owns one Slurm command (GPUs own two), parses its text
//! output into a typed intermediate and maps that to observations:
//! - `queue`: job counts per state (`squeue`)
//! - `jobcounts`: job and CPU counts per account and per user (`squeue`)
//! - `partitions`: CPU and job counts per partition (`sinfo`, `squeue`)
//! - `fairshare`: fair-share factor per account (`sshare`)
//! - `nodes`, `node_detail`, `cpus`, `gpus`: cluster resources (`sinfo`, `scontrol`, `sacct`)
//! - `jobs`: per-job details (`squeue --json`)
//! - `scheduler`: controller statistics (`sdiag`)

pub mod cpus;
pub mod fairshare;
pub mod gpus;
pub mod jobcounts;
pub mod jobs;
pub mod node_detail;
pub mod node_state;
pub mod nodes;
pub mod parse;
pub mod partitions;
pub mod queue;
pub mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ExporterConfig;
use crate::directory::UserDirectory;
use crate::error::RegistryError;
use crate::registry::CollectorRegistry;
use crate::runner::{CommandLine, CommandRunner, Source};

/// What every adapter needs to obtain raw text.
#[derive(Clone)]
pub struct AdapterContext {
    runner: Arc<CommandRunner>,
    /// When set, adapters read `<dir>/<fixture>` instead of running commands
    fixtures: Option<PathBuf>,
}

impl AdapterContext {
    pub fn new(runner: Arc<CommandRunner>, fixtures: Option<PathBuf>) -> Self {
        Self { runner, fixtures }
    }

    /// Resolve the source for a command, honoring fixture mode.
    pub fn source(&self, argv: &[&str], fixture: &str) -> Source {
        match &self.fixtures {
            Some(dir) => Source::Fixture(dir.join(fixture)),
            None => Source::Command(CommandLine::from_argv(argv)),
        }
    }

    pub async fn fetch(&self, source: &Source) -> String {
        self.runner.fetch(source).await
    }

    /// `None` when the source failed; the failure is already recorded.
    pub async fn fetch_checked(&self, source: &Source) -> Option<String> {
        self.runner.fetch_checked(source).await
    }

    pub fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }
}

/// Build the registry with every adapter the configuration enables.
pub fn build_registry(
    config: &ExporterConfig,
    ctx: &AdapterContext,
    directory: Arc<UserDirectory>,
) -> Result<CollectorRegistry, RegistryError> {
    let mut registry = CollectorRegistry::new(Arc::new(ctx.runner().telemetry().clone()));

    registry.register(Arc::new(queue::QueueAdapter::new(ctx.clone())))?;
    registry.register(Arc::new(jobcounts::JobCountAdapter::new(ctx.clone(), jobcounts::GroupBy::Account)))?;
    registry.register(Arc::new(jobcounts::JobCountAdapter::new(ctx.clone(), jobcounts::GroupBy::User)))?;
    registry.register(Arc::new(partitions::PartitionCpusAdapter::new(ctx.clone())))?;
    registry.register(Arc::new(partitions::PartitionJobsAdapter::new(ctx.clone())))?;
    registry.register(Arc::new(fairshare::FairShareAdapter::new(ctx.clone())))?;
    registry.register(Arc::new(nodes::NodesAdapter::new(ctx.clone())))?;
    registry.register(Arc::new(node_detail::NodeDetailAdapter::new(
        ctx.clone(),
        config.node_detail_format,
        config.node_address_suffix.clone(),
    )))?;
    registry.register(Arc::new(cpus::CpusAdapter::new(ctx.clone())))?;
    if config.gpus_acct {
        registry.register(Arc::new(gpus::GpusAdapter::new(ctx.clone())))?;
    }
    registry.register(Arc::new(jobs::JobsAdapter::new(ctx.clone(), directory)))?;
    registry.register(Arc::new(scheduler::SchedulerAdapter::new(ctx.clone())))?;

    tracing::info!(adapters = ?registry.adapter_names(), "Adapters registered");
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::AdapterContext;
    use crate::runner::{CommandRunner, DEFAULT_TIMEOUT};
    use crate::telemetry::Telemetry;

    pub fn test_data_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_data")
    }

    /// Context reading from `test_data/` with its own telemetry
    pub fn fixture_context() -> AdapterContext {
        fixture_context_with(Arc::new(Telemetry::new().unwrap()))
    }

    pub fn fixture_context_with(telemetry: Arc<Telemetry>) -> AdapterContext {
        let runner = Arc::new(CommandRunner::new(DEFAULT_TIMEOUT, telemetry));
        AdapterContext::new(runner, Some(test_data_dir()))
    }
}
