// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Cluster-wide CPU summary, from `sinfo -o %C`.

use anyhow::Result;
use async_trait::async_trait;

use super::parse::CpuStates;
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["sinfo", "-h", "-o", "%C"];
const FIXTURE: &str = "sinfo_cpus.txt";

pub struct CpusAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl CpusAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self { ctx, source }
    }

    fn descriptors() -> [MetricDescriptor; 4] {
        [
            MetricDescriptor::gauge("slurm_cpus_alloc", "Allocated CPUs", &[]),
            MetricDescriptor::gauge("slurm_cpus_idle", "Idle CPUs", &[]),
            MetricDescriptor::gauge("slurm_cpus_other", "Mix CPUs", &[]),
            MetricDescriptor::gauge("slurm_cpus_total", "Total CPUs", &[]),
        ]
    }

    pub fn map(cpus: &CpuStates) -> Vec<Observation> {
        let [alloc, idle, other, total] = Self::descriptors();
        vec![
            alloc.value(cpus.allocated),
            idle.value(cpus.idle),
            other.value(cpus.other),
            total.value(cpus.total),
        ]
    }
}

#[async_trait]
impl Adapter for CpusAdapter {
    fn name(&self) -> &str {
        "cpus"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        Self::descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        // sinfo prints a single summary line
        let line = data.lines().find(|l| l.contains('/')).unwrap_or("");
        Ok(Self::map(&CpuStates::parse(line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ObservationSet;
    use crate::slurm::test_support::fixture_context;

    #[tokio::test]
    async fn test_fixture_pipeline() {
        let adapter = CpusAdapter::new(fixture_context());
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_cpus_alloc", &[]), Some(5725.0));
        assert_eq!(set.get("slurm_cpus_idle", &[]), Some(877.0));
        assert_eq!(set.get("slurm_cpus_other", &[]), Some(34.0));
        assert_eq!(set.get("slurm_cpus_total", &[]), Some(6636.0));
    }

    #[tokio::test]
    async fn test_missing_source_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AdapterContext::new(fixture_context().runner().clone(), Some(dir.path().to_path_buf()));
        assert!(CpusAdapter::new(ctx.clone()).collect().await.unwrap().is_empty());

        std::fs::write(dir.path().join(FIXTURE), "\n").unwrap();
        assert!(CpusAdapter::new(ctx).collect().await.unwrap().is_empty());
    }
}
