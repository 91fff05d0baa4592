// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The set of active adapters and the scrape fan-out.
//!
//! Conflicting metric names are rejected when an adapter is registered.
//! During a scrape every adapter runs concurrently; an adapter that fails
//! (or panics) contributes nothing this cycle and is counted in telemetry.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;

use crate::error::RegistryError;
use crate::metrics::{MetricDescriptor, Observation, ObservationSet};
use crate::telemetry::{Telemetry, RESERVED_METRICS};

/// A unit binding one external source to the metrics it produces.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short identifier, used for logging and failure telemetry
    fn name(&self) -> &str;

    /// Every metric this adapter may emit
    fn describe(&self) -> Vec<MetricDescriptor>;

    /// Run invoke → parse → map once
    async fn collect(&self) -> Result<Vec<Observation>>;
}

/// Result of running one adapter during a scrape
#[derive(Debug)]
pub enum AdapterOutcome {
    Success(Vec<Observation>),
    Failure(String),
}

pub struct CollectorRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
    descriptors: Vec<MetricDescriptor>,
    /// metric name -> owning adapter
    owners: HashMap<&'static str, String>,
    telemetry: Arc<Telemetry>,
}

impl CollectorRegistry {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        let owners = RESERVED_METRICS
            .iter()
            .map(|name| (*name, "telemetry".to_string()))
            .collect();
        Self {
            adapters: Vec::new(),
            descriptors: Vec::new(),
            owners,
            telemetry,
        }
    }

    /// Add an adapter. Fails without side effects if any of its metric names
    /// is already claimed, or if an adapter with the same name exists.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) -> Result<(), RegistryError> {
        let name = adapter.name().to_string();
        if self.adapters.iter().any(|a| a.name() == name) {
            return Err(RegistryError::DuplicateAdapter(name));
        }

        let descriptors = adapter.describe();
        let mut claimed: HashSet<&'static str> = HashSet::new();
        for desc in &descriptors {
            if let Some(owner) = self.owners.get(desc.name) {
                return Err(RegistryError::DuplicateMetric {
                    metric: desc.name.to_string(),
                    first: owner.clone(),
                    second: name,
                });
            }
            if !claimed.insert(desc.name) {
                return Err(RegistryError::DuplicateMetric {
                    metric: desc.name.to_string(),
                    first: name.clone(),
                    second: name,
                });
            }
        }

        for desc in &descriptors {
            self.owners.insert(desc.name, name.clone());
        }
        tracing::debug!(adapter = %name, metrics = descriptors.len(), "Registered adapter");
        self.descriptors.extend(descriptors);
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Run every adapter once and merge their observations.
    pub async fn collect(&self) -> ObservationSet {
        let started = Instant::now();
        let outcomes = join_all(self.adapters.iter().map(|a| self.run_adapter(a.as_ref()))).await;

        let mut set = ObservationSet::new();
        let mut failed = 0usize;
        for (adapter, outcome) in self.adapters.iter().zip(outcomes) {
            match outcome {
                AdapterOutcome::Success(observations) => {
                    for obs in observations {
                        if self.owners.get(obs.name).map(String::as_str) != Some(adapter.name()) {
                            tracing::warn!(adapter = adapter.name(), metric = obs.name, "Dropping undescribed metric");
                            continue;
                        }
                        set.insert(obs);
                    }
                }
                AdapterOutcome::Failure(reason) => {
                    failed += 1;
                    self.telemetry.record_error(adapter.name(), &reason);
                }
            }
        }

        tracing::debug!(
            adapters = self.adapters.len(),
            failed,
            observations = set.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scrape finished"
        );
        set
    }

    async fn run_adapter(&self, adapter: &dyn Adapter) -> AdapterOutcome {
        match AssertUnwindSafe(adapter.collect()).catch_unwind().await {
            Ok(Ok(observations)) => AdapterOutcome::Success(observations),
            Ok(Err(e)) => {
                tracing::warn!(adapter = adapter.name(), error = %format!("{:#}", e), "Adapter failed");
                AdapterOutcome::Failure(e.to_string())
            }
            Err(_) => {
                tracing::error!(adapter = adapter.name(), "Adapter panicked");
                AdapterOutcome::Failure("panic".to_string())
            }
        }
    }
}
