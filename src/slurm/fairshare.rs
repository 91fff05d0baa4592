// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Fair-share factor per account, from `sshare`.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use super::parse::{delimited_lines, field, number};
use super::AdapterContext;
use crate::metrics::{MetricDescriptor, Observation};
use crate::registry::Adapter;
use crate::runner::Source;

const COMMAND: &[&str] = &["sshare", "-n", "-P", "-o", "account,fairshare"];
const FIXTURE: &str = "sshare.txt";

/// Parse `account|fairshare` lines.
///
/// sshare indents user rows below their account with two spaces; those are
/// skipped so only account-level factors remain.
pub fn parse_fairshare(data: &str) -> BTreeMap<String, f64> {
    let accounts_only: String = data
        .lines()
        .filter(|line| !line.starts_with("  "))
        .collect::<Vec<_>>()
        .join("\n");
    delimited_lines(&accounts_only, '|')
        .map(|fields| (field(&fields, 0).trim().to_string(), number(field(&fields, 1))))
        .collect()
}

pub struct FairShareAdapter {
    ctx: AdapterContext,
    source: Source,
}

impl FairShareAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        let source = ctx.source(COMMAND, FIXTURE);
        Self { ctx, source }
    }

    fn descriptor() -> MetricDescriptor {
        MetricDescriptor::gauge("slurm_account_fairshare", "FairShare for account", &["account"])
    }
}

#[async_trait]
impl Adapter for FairShareAdapter {
    fn name(&self) -> &str {
        "fairshare"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        vec![Self::descriptor()]
    }

    async fn collect(&self) -> Result<Vec<Observation>> {
        let data = self.ctx.fetch(&self.source).await;
        let desc = Self::descriptor();
        Ok(parse_fairshare(&data)
            .iter()
            .map(|(account, factor)| desc.observe(&[account], *factor))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ObservationSet;
    use crate::slurm::test_support::fixture_context;

    #[test]
    fn test_indented_rows_skipped() {
        let data = "root|0.500000\n physics|0.250000\n  alice|0.900000\nchemistry|0.125000\n";
        let accounts = parse_fairshare(data);
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts["root"], 0.5);
        assert_eq!(accounts["physics"], 0.25);
        assert_eq!(accounts["chemistry"], 0.125);
        assert!(!accounts.contains_key("alice"));
    }

    #[test]
    fn test_unparsable_factor_is_zero() {
        let accounts = parse_fairshare("acct|\n");
        assert_eq!(accounts["acct"], 0.0);
    }

    #[tokio::test]
    async fn test_fixture_pipeline() {
        let adapter = FairShareAdapter::new(fixture_context());
        let set: ObservationSet = adapter.collect().await.unwrap().into_iter().collect();
        assert_eq!(set.get("slurm_account_fairshare", &[("account", "physics")]), Some(0.345679));
        assert!(set.get("slurm_account_fairshare", &[("account", "alice")]).is_none());
        assert_eq!(set.named("slurm_account_fairshare").count(), 4);
    }
}
