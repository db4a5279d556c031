//! Attributes live process load to autostart entries by name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::autostart::AutostartEntry;
use crate::sampler::ProcessSample;

/// How samples sharing a (lowercased) command name are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Every process with the name contributes its load.
    #[default]
    Sum,
    /// The last sample in iteration order replaces earlier ones.
    Overwrite,
}

/// An entry with its share of the load of all matched processes.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub entry: AutostartEntry,
    /// cpu% + mem% of the matching process(es).
    pub raw_score: f64,
    /// `raw_score` as a percentage of the whole sampled load, two decimals.
    pub percent: f64,
}

/// Rank `entries` by the load of the process whose command equals the
/// entry name, ignoring case. Pure: identical inputs give identical output.
///
/// The percentage denominator is the summed score of every sampled process
/// name, matched or not, floored to 1.0. Entries sharing a name each get the
/// full score of that name. Ties keep scan order.
pub fn correlate(
    entries: &[AutostartEntry],
    samples: &[ProcessSample],
    policy: CollisionPolicy,
) -> Vec<RankedEntry> {
    let usage = usage_by_name(samples, policy);

    let mut total: f64 = usage.values().sum();
    if total <= 0.0 {
        total = 1.0;
    }

    let keys: Vec<String> = entries.iter().map(|e| e.name.to_lowercase()).collect();

    let mut ranked: Vec<RankedEntry> = entries
        .iter()
        .zip(&keys)
        .map(|(entry, key)| {
            let raw_score = usage.get(key).copied().unwrap_or(0.0);
            RankedEntry {
                entry: entry.clone(),
                raw_score,
                percent: round2(raw_score / total * 100.0),
            }
        })
        .collect();

    // sort_by is stable, so equal scores stay in scan order.
    ranked.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
    ranked
}

fn usage_by_name(samples: &[ProcessSample], policy: CollisionPolicy) -> HashMap<String, f64> {
    let mut usage = HashMap::with_capacity(samples.len());
    for sample in samples {
        let slot = usage.entry(sample.command.to_lowercase()).or_insert(0.0);
        match policy {
            CollisionPolicy::Sum => *slot += sample.load(),
            CollisionPolicy::Overwrite => *slot = sample.load(),
        }
    }
    usage
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
