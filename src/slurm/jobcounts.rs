// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Job and CPU counts per account or per user.
//!
//! Both listings share one grammar (`jobid|key|state|cpus`) and differ only
//! in the second column and the metric prefix.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{delimited_lines, field, number};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

/// Which column the listing is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Account,
    User,
}

impl GroupBy {
    fn adapter_name(&self) -> &'static str {
        match self {
            GroupBy::Account => "accounts",
            GroupBy::User => "users",
        }
    }

    fn label(&self) -> &'static [&'static str] {
        match self {
            GroupBy::Account => &["account"],
            GroupBy::User => &["user"],
        }
    }

    fn command(&self) -> &'static [&'static str] {
        match self {
            GroupBy::Account => &["squeue", "-a", "-r", "-h", "-o", "%A|%a|%T|%C"],
            GroupBy::User => &["squeue", "-a", "-r", "-h", "-o", "%A|%u|%T|%C"],
        }
    }

    fn fixture(&self) -> &'static str {
        match self {
            GroupBy::Account => "squeue_accounts.txt",
            GroupBy::User => "squeue_users.txt",
        }
    }

    /// (pending, running, cpus running, suspended)
    fn descriptors(&self) -> [MetricDescriptor; 4] {
        let labels = self.label();
        match self {
            GroupBy::Account => [
                MetricDescriptor::gauge("slurm_account_jobs_pending", "Pending jobs for account", labels),
                MetricDescriptor::gauge("slurm_account_jobs_running", "Running jobs for account", labels),
                MetricDescriptor::gauge("slurm_account_cpus_running", "Running cpus for account", labels),
                MetricDescriptor::gauge("slurm_account_jobs_suspended", "Suspended jobs for account", labels),
            ],
            GroupBy::User => [
                MetricDescriptor::gauge("slurm_user_jobs_pending", "Pending jobs for user", labels),
                MetricDescriptor::gauge("slurm_user_jobs_running", "Running jobs for user", labels),
                MetricDescriptor::gauge("slurm_user_cpus_running", "Running cpus for user", labels),
                MetricDescriptor::gauge("slurm_user_jobs_suspended", "Suspended jobs for user", labels),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JobCounts {
    pub pending: f64,
    pub running: f64,
    pub running_cpus: f64,
    pub suspended: f64,
}

/// Parse `jobid|key|state|cpus` lines into counts per key.
///
/// Every key seen gets an entry, even when its jobs are in untracked states.
pub fn parse_job_counts(data: &str) -> BTreeMap<String, JobCounts> {
    let mut groups: BTreeMap<String, JobCounts> = BTreeMap::new();
    for fields in delimited_lines(data, '|') {
        let counts = groups.entry(field(&fields, 1).to_string()).or_default();
        let state = field(&fields, 2).to_lowercase();
        if state.starts_with("pending") {
            counts.pending += 1.0;
        } else if state.starts_with("running") {
            counts.running += 1.0;
            counts.running_cpus += number(field(&fields, 3));
        } else if state.starts_with("suspended") {
            counts.suspended += 1.0;
        }
    }
    groups
}

pub struct JobCountAdapter {
    ctx: AdapterContext,
    group_by: GroupBy,
    source: Source,
}

impl JobCountAdapter {
    pub fn new(ctx: AdapterContext, group_by: GroupBy) -> Self {
        let source = ctx.source(group_by.command(), group_by.fixture());
        Self { ctx, group_by, source }
    }

    pub fn map(&self, groups: &BTreeMap<String, JobCounts>) -> Vec<Observation> {
        let [pending, running, cpus, suspended] = self.group_by.descriptors();
        let mut out = Vec::new();
        for (key, counts) in groups {
            for (desc, value) in [
                (&pending, counts.pending),
                (&running, counts.running),
                (&cpus, counts.running_cpus),
                (&suspended, counts.suspended),
            ] {
                if value > 0.0 {
                    out.push(desc.observe(&[key], value));
                }
            }
        }
        out
    }
}

#[async_trait]
impl Adapter for JobCountAdapter {
    fn name(&self) -> &str {
        self.group_by.adapter_name()
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        self.group_by.descriptors().to_vec()
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        Ok(self.map(&parse_job_counts(&data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ObservationSet;
    use crate::slurm::test_support::fixture_context;

    #[test]
    fn test_parse_job_counts() {
        let data = "101|acctA|PENDING|4\n102|acctA|RUNNING|8\n103|acctB|RUNNING|2\n";
        let groups = parse_job_counts(data);
        assert_eq!(groups["acctA"].pending, 1.0);
        assert_eq!(groups["acctA"].running, 1.0);
        assert_eq!(groups["acctA"].running_cpus, 8.0);
        assert_eq!(groups["acctB"].running_cpus, 2.0);
    }

    #[test]
    fn test_state_prefix_is_case_insensitive() {
        let groups = parse_job_counts("1|u|Running|4\n2|u|suspended|1\n3|u|COMPLETING|1\n");
        assert_eq!(groups["u"].running, 1.0);
        assert_eq!(groups["u"].suspended, 1.0);
        assert_eq!(groups["u"].pending, 0.0);
    }

    #[test]
    fn test_account_observations() {
        let adapter = JobCountAdapter::new(fixture_context(), GroupBy::Account);
        let set: ObservationSet = adapter
            .map(&parse_job_counts("101|acctA|PENDING|4\n102|acctA|RUNNING|8\n"))
            .into_iter()
            .collect();
        assert_eq!(set.get("slurm_account_jobs_pending", &[("account", "acctA")]), Some(1.0));
        assert_eq!(set.get("slurm_account_jobs_running", &[("account", "acctA")]), Some(1.0));
        assert_eq!(set.get("slurm_account_cpus_running", &[("account", "acctA")]), Some(8.0));
        assert!(!set.contains("slurm_account_jobs_suspended"));
    }

    #[test]
    fn test_names_and_labels_follow_grouping() {
        let ctx = fixture_context();
        let users = JobCountAdapter::new(ctx.clone(), GroupBy::User);
        assert_eq!(users.name(), "users");
        assert!(users.describe().iter().all(|d| d.labels == ["user"]));
        assert!(users.describe().iter().all(|d| d.name.starts_with("slurm_user_")));

        let accounts = JobCountAdapter::new(ctx, GroupBy::Account);
        assert_eq!(accounts.name(), "accounts");
        assert!(accounts.describe().iter().all(|d| d.labels == ["account"]));
    }

    #[tokio::test]
    async fn test_user_fixture_pipeline() {
        let adapter = JobCountAdapter::new(fixture_context(), GroupBy::User);
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_user_jobs_running", &[("user", "alice")]), Some(2.0));
        assert_eq!(set.get("slurm_user_cpus_running", &[("user", "alice")]), Some(48.0));
        assert_eq!(set.get("slurm_user_jobs_pending", &[("user", "bob")]), Some(1.0));
        assert_eq!(set.get("slurm_user_jobs_suspended", &[("user", "carol")]), Some(1.0));
        assert!(set.get("slurm_user_jobs_pending", &[("user", "alice")]).is_none());
    }

    #[tokio::test]
    async fn test_account_fixture_pipeline() {
        let adapter = JobCountAdapter::new(fixture_context(), GroupBy::Account);
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_account_jobs_pending", &[("account", "physics")]), Some(2.0));
        assert_eq!(set.get("slurm_account_cpus_running", &[("account", "physics")]), Some(32.0));
        assert_eq!(set.get("slurm_account_jobs_running", &[("account", "chemistry")]), Some(1.0));
    }
}
