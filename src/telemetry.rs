// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Exporter self-telemetry: command latency and failure counters.
//!
//! These are the only values that survive across scrapes. One `Telemetry`
//! is created at startup and shared (`Arc`) with the runner and the
//! registry; tests build their own to stay isolated.

use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

pub const ERRORS_METRIC: &str = "slurm_exporter_errors_total";
pub const EXEC_DURATION_METRIC: &str = "slurm_exporter_exec_duration";

/// Metric names owned by telemetry. Adapters may not describe these.
pub const RESERVED_METRICS: [&str; 2] = [ERRORS_METRIC, EXEC_DURATION_METRIC];

#[derive(Clone)]
pub struct Telemetry {
    errors: IntCounterVec,
    exec_duration: HistogramVec,
}

impl Telemetry {
    pub fn new() -> prometheus::Result<Self> {
        let errors = IntCounterVec::new(
            Opts::new(ERRORS_METRIC, "Total number of Errors from the exporter."),
            &["command", "reason"],
        )?;
        let exec_duration = HistogramVec::new(
            HistogramOpts::new(EXEC_DURATION_METRIC, "Duration of exec commands."),
            &["command"],
        )?;
        Ok(Self {
            errors,
            exec_duration,
        })
    }

    /// Count one failure of `command` (a command line, fixture path or adapter name).
    pub fn record_error(&self, command: &str, reason: &str) {
        self.errors.with_label_values(&[command, reason]).inc();
    }

    /// Record the wall-clock duration of one invocation attempt.
    pub fn observe_duration(&self, command: &str, seconds: f64) {
        self.exec_duration.with_label_values(&[command]).observe(seconds);
    }

    #[cfg(test)]
    /// Failures recorded for (`command`, `reason`). Read-only: never creates a series.
    pub fn error_count(&self, command: &str, reason: &str) -> u64 {
        self.sum_errors(|labels| labels == [command, reason])
    }

    #[cfg(test)]
    /// Total failures recorded for `command`, over all reasons.
    pub fn errors_for(&self, command: &str) -> u64 {
        self.sum_errors(|labels| labels[0] == command)
    }

    #[cfg(test)]
    fn sum_errors(&self, matches: impl Fn(&[&str]) -> bool) -> u64 {
        self.errors
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric().iter())
            .filter(|m| {
                let labels: Vec<&str> = m.get_label().iter().map(|l| l.get_value()).collect();
                matches(&labels)
            })
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    #[cfg(test)]
    pub fn duration_samples(&self, command: &str) -> u64 {
        self.exec_duration
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric().iter())
            .filter(|m| m.get_label().iter().any(|l| l.get_value() == command))
            .map(|m| m.get_histogram().get_sample_count())
            .sum()
    }

    /// Boxed collectors sharing this telemetry's state, for a scrape registry.
    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.errors.clone()),
            Box::new(self.exec_duration.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_accumulates_per_label() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.record_error("sinfo -h -o %C", "timeout");
        telemetry.record_error("sinfo -h -o %C", "timeout");
        telemetry.record_error("sinfo -h -o %C", "exit status: 1");

        assert_eq!(telemetry.error_count("sinfo -h -o %C", "timeout"), 2);
        assert_eq!(telemetry.errors_for("sinfo -h -o %C"), 3);
        assert_eq!(telemetry.errors_for("sdiag"), 0);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = Telemetry::new().unwrap();
        let b = Telemetry::new().unwrap();
        a.record_error("sdiag", "timeout");
        assert_eq!(b.error_count("sdiag", "timeout"), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let telemetry = Telemetry::new().unwrap();
        let clone = telemetry.clone();
        clone.observe_duration("sdiag", 0.25);
        assert_eq!(telemetry.duration_samples("sdiag"), 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let telemetry = std::sync::Arc::new(Telemetry::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = telemetry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        t.record_error("squeue", "timeout");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(telemetry.error_count("squeue", "timeout"), 800);
    }
}
