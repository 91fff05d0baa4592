// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Metric data model shared by adapters, the registry and the exposition.
//!
//! An [`ObservationSet`] is built fresh for every scrape and keyed by
//! (metric name, label set): inserting the same series twice replaces the
//! earlier value instead of duplicating it.

pub mod types;

use std::collections::BTreeMap;

pub use types::{MetricDescriptor, MetricKind, Observation};

type SeriesKey = (&'static str, Vec<(&'static str, String)>);

/// The flat result of one scrape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSet {
    series: BTreeMap<SeriesKey, Observation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation, returning the one it replaced
    pub fn insert(&mut self, observation: Observation) -> Option<Observation> {
        let key = (observation.name, observation.labels.clone());
        self.series.insert(key, observation)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// All observations ordered by name, then labels
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.series.values()
    }

    #[cfg(test)]
    /// All observations of one metric
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Observation> + 'a {
        self.series.values().filter(move |o| o.name == name)
    }

    #[cfg(test)]
    /// Value of the series `name` whose labels include all of `labels`
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.named(name).find(|o| o.has_labels(labels)).map(|o| o.value)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.named(name).next().is_some()
    }
}

impl Extend<Observation> for ObservationSet {
    fn extend<T: IntoIterator<Item = Observation>>(&mut self, iter: T) {
        for observation in iter {
            self.insert(observation);
        }
    }
}

impl FromIterator<Observation> for ObservationSet {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
