// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

/// How a metric's value is to be interpreted by the exposition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Instantaneous value
    Gauge,
    /// Monotonically increasing value
    Counter,
    /// A duration sample fed into a histogram
    Histogram,
}

/// Static description of one metric an adapter may emit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    /// Label names, in the order label values are passed to [`observe`](Self::observe)
    pub labels: &'static [&'static str],
    /// Upper bucket bounds; only meaningful for histograms
    pub buckets: Vec<f64>,
}

impl MetricDescriptor {
    pub fn gauge(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            labels,
            buckets: Vec::new(),
        }
    }

    pub fn counter(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(name, help, labels)
        }
    }

    pub fn histogram(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            kind: MetricKind::Histogram,
            buckets,
            ..Self::gauge(name, help, labels)
        }
    }

    /// Build an observation of this metric.
    ///
    /// `values` pairs up positionally with [`labels`](Self::labels); missing
    /// values become empty strings and extra values are dropped.
    pub fn observe<S: AsRef<str>>(&self, values: &[S], value: f64) -> Observation {
        debug_assert_eq!(values.len(), self.labels.len(), "label arity for {}", self.name);
        let labels = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let v = values.get(i).map(|v| v.as_ref().to_string()).unwrap_or_default();
                (*name, v)
            })
            .collect();
        Observation {
            name: self.name,
            kind: self.kind,
            labels,
            value,
        }
    }

    /// Observation of an unlabelled metric
    pub fn value(&self, value: f64) -> Observation {
        self.observe::<&str>(&[], value)
    }
}

/// One emitted data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: &'static str,
    pub kind: MetricKind,
    /// Ordered (name, value) label pairs
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

impl Observation {
    #[cfg(test)]
    /// Value of the label `name`, if present
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    /// True when every `(name, value)` in `wanted` matches this observation's labels.
    pub fn has_labels(&self, wanted: &[(&str, &str)]) -> bool {
        wanted.iter().all(|(k, v)| self.label(k) == Some(*v))
    }
}
