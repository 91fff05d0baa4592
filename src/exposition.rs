// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Prometheus text exposition of one scrape.
//!
//! A fresh `prometheus::Registry` is built per scrape, so series that were
//! not observed this time simply do not appear. Only telemetry (and the
//! process collector) carries state from one scrape to the next.

use std::collections::HashMap;

use anyhow::{Context, Result};
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

use crate::metrics::{MetricDescriptor, MetricKind, Observation, ObservationSet};
use crate::telemetry::Telemetry;

/// Content type of the text format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
    Histogram(HistogramVec),
}

impl Family {
    fn new(desc: &MetricDescriptor) -> prometheus::Result<Self> {
        Ok(match desc.kind {
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)?),
            MetricKind::Counter => Family::Counter(CounterVec::new(Opts::new(desc.name, desc.help), desc.labels)?),
            MetricKind::Histogram => Family::Histogram(HistogramVec::new(
                HistogramOpts::new(desc.name, desc.help).buckets(desc.buckets.clone()),
                desc.labels,
            )?),
        })
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        match self {
            Family::Gauge(v) => registry.register(Box::new(v.clone())),
            Family::Counter(v) => registry.register(Box::new(v.clone())),
            Family::Histogram(v) => registry.register(Box::new(v.clone())),
        }
    }

    fn record(&self, obs: &Observation) -> prometheus::Result<()> {
        let values: Vec<&str> = obs.labels.iter().map(|(_, v)| v.as_str()).collect();
        match self {
            Family::Gauge(v) => v.get_metric_with_label_values(&values)?.set(obs.value),
            Family::Counter(v) => {
                // inc_by rejects negative deltas
                if obs.value < 0.0 {
                    tracing::warn!(metric = obs.name, value = obs.value, "Dropping negative counter value");
                    return Ok(());
                }
                v.get_metric_with_label_values(&values)?.inc_by(obs.value)
            }
            Family::Histogram(v) => v.get_metric_with_label_values(&values)?.observe(obs.value),
        }
        Ok(())
    }
}

/// Render `set` (plus telemetry and process metrics) in the text format.
pub fn render(descriptors: &[MetricDescriptor], set: &ObservationSet, telemetry: &Telemetry) -> Result<String> {
    let registry = Registry::new();

    let mut families: HashMap<&str, Family> = HashMap::with_capacity(descriptors.len());
    for desc in descriptors {
        let family = Family::new(desc).with_context(|| format!("Invalid metric descriptor {}", desc.name))?;
        family
            .register(&registry)
            .with_context(|| format!("Failed to register {}", desc.name))?;
        families.insert(desc.name, family);
    }

    for obs in set.iter() {
        let Some(family) = families.get(obs.name) else {
            tracing::debug!(metric = obs.name, "No descriptor for observation");
            continue;
        };
        if let Err(e) = family.record(obs) {
            tracing::warn!(metric = obs.name, error = %e, "Failed to record observation");
        }
    }

    for collector in telemetry.collectors() {
        registry.register(collector).context("Failed to register telemetry")?;
    }

    #[cfg(target_os = "linux")]
    registry
        .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
        .context("Failed to register process collector")?;

    encode(&registry)
}

fn encode(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::with_capacity(8192);
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &[&str] = &["account"];

    fn telemetry() -> Telemetry {
        Telemetry::new().unwrap()
    }

    #[test]
    fn test_gauges_with_labels() {
        let desc = MetricDescriptor::gauge("slurm_account_jobs_pending", "Pending jobs for account", ACCOUNT);
        let set: ObservationSet = vec![desc.observe(&["acctA"], 1.0), desc.observe(&["acctB"], 3.0)]
            .into_iter()
            .collect();

        let text = render(&[desc], &set, &telemetry()).unwrap();
        assert!(text.contains("# HELP slurm_account_jobs_pending Pending jobs for account"));
        assert!(text.contains("# TYPE slurm_account_jobs_pending gauge"));
        assert!(text.contains("slurm_account_jobs_pending{account=\"acctA\"} 1"));
        assert!(text.contains("slurm_account_jobs_pending{account=\"acctB\"} 3"));
    }

    #[test]
    fn test_unobserved_metrics_are_absent() {
        let seen = MetricDescriptor::gauge("slurm_cpus_total", "Total CPUs", &[]);
        let unseen = MetricDescriptor::gauge("slurm_cpus_idle", "Idle CPUs", &[]);
        let set: ObservationSet = std::iter::once(seen.value(64.0)).collect();

        let text = render(&[seen, unseen], &set, &telemetry()).unwrap();
        assert!(text.contains("slurm_cpus_total 64"));
        assert!(!text.contains("slurm_cpus_idle"));
    }

    #[test]
    fn test_counter_and_histogram_types() {
        let counter = MetricDescriptor::counter("slurm_scheduler_backfilled_heterogeneous_total", "x", &[]);
        let histogram = MetricDescriptor::histogram("slurm_job_exec_duration", "y", &["job_id"], vec![60.0, 3600.0]);
        let set: ObservationSet = vec![counter.value(5.0), histogram.observe(&["7"], 240.0)]
            .into_iter()
            .collect();

        let text = render(&[counter, histogram], &set, &telemetry()).unwrap();
        assert!(text.contains("# TYPE slurm_scheduler_backfilled_heterogeneous_total counter"));
        assert!(text.contains("slurm_scheduler_backfilled_heterogeneous_total 5"));
        assert!(text.contains("# TYPE slurm_job_exec_duration histogram"));
        assert!(text.contains("slurm_job_exec_duration_bucket{job_id=\"7\",le=\"60\"} 0"));
        assert!(text.contains("slurm_job_exec_duration_bucket{job_id=\"7\",le=\"3600\"} 1"));
        assert!(text.contains("slurm_job_exec_duration_count{job_id=\"7\"} 1"));
        assert!(text.contains("slurm_job_exec_duration_sum{job_id=\"7\"} 240"));
    }

    #[test]
    fn test_negative_counter_dropped() {
        let counter = MetricDescriptor::counter("slurm_scheduler_backfilled_jobs_since_start_total", "x", &[]);
        let set: ObservationSet = std::iter::once(counter.value(-1.0)).collect();
        let text = render(&[counter], &set, &telemetry()).unwrap();
        assert!(!text.contains("slurm_scheduler_backfilled_jobs_since_start_total"));
    }

    #[test]
    fn test_telemetry_is_exposed() {
        let telemetry = telemetry();
        telemetry.record_error("sdiag", "timeout");
        telemetry.observe_duration("sdiag", 0.5);

        let text = render(&[], &ObservationSet::new(), &telemetry).unwrap();
        assert!(text.contains("slurm_exporter_errors_total{command=\"sdiag\",reason=\"timeout\"} 1"));
        assert!(text.contains("slurm_exporter_exec_duration_count{command=\"sdiag\"} 1"));
    }

    #[test]
    fn test_empty_scrape_renders() {
        let text = render(&[], &ObservationSet::new(), &telemetry()).unwrap();
        assert!(!text.contains("slurm_"));
    }

    #[test]
    fn test_repeated_renders_do_not_accumulate() {
        let counter = MetricDescriptor::counter("slurm_scheduler_backfilled_heterogeneous_total", "x", &[]);
        let set: ObservationSet = std::iter::once(counter.value(2.0)).collect();
        let telemetry = telemetry();

        let first = render(&[counter.clone()], &set, &telemetry).unwrap();
        let second = render(&[counter], &set, &telemetry).unwrap();
        assert!(first.contains("slurm_scheduler_backfilled_heterogeneous_total 2"));
        assert!(second.contains("slurm_scheduler_backfilled_heterogeneous_total 2"));
    }
}
