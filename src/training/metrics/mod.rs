//! Running statistics for training reports
//!
//! A [`SummaryMap`] aggregates scalar metrics over one report interval. Each
//! metric keeps an incremental mean and a sample count; metrics never interact.
//! Rendering is ordered by metric name so report lines are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Incremental mean of one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStat {
    pub mean: f64,
    pub count: usize,
}

impl RunningStat {
    /// Fold one observation into the mean
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }
}

/// Metric name to running statistic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryMap {
    stats: BTreeMap<String, RunningStat>,
}

impl SummaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation of `name`
    pub fn update(&mut self, name: &str, value: f64) {
        self.stats.entry(name.to_string()).or_default().push(value);
    }

    /// Record several observations at once
    pub fn update_all<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, value) in values {
            self.update(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&RunningStat> {
        self.stats.get(name)
    }

    /// Current mean of `name`, if it has been observed since the last reset
    pub fn mean(&self, name: &str) -> Option<f64> {
        self.stats.get(name).map(|stat| stat.mean)
    }

    /// `name=mean` pairs sorted by name
    pub fn render(&self) -> String {
        self.stats
            .iter()
            .map(|(name, stat)| format!("{}={:.4}", name, stat.mean))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Drop every metric
    pub fn reset(&mut self) {
        self.stats.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }
}

impl std::fmt::Display for SummaryMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
