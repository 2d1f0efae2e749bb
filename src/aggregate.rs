use std::collections::HashMap;

use serde::Serialize;

use crate::classify::RiskTier;
use crate::sample::ScoredNode;

/// Cluster-wide rollup computed from one cycle's scored nodes.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkAggregate {
    pub node_count: u64,
    pub validator_count: u64,
    pub delinquent_count: u64,
    pub total_activated_stake: u64,
    pub average_reliability: f64,
    pub nakamoto_coefficient: u64,
    pub transactions_per_second: f64,
    pub epoch: u64,
    /// Percent of the current epoch already elapsed
    pub epoch_progress: f64,
    pub current_slot: u64,
    pub risk: RiskCounts,
    pub versions: Vec<DistributionEntry>,
    pub isps: Vec<DistributionEntry>,
}

/// Node counts per risk tier. Degraded nodes are reported under `warning`,
/// matching how operators read the dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RiskCounts {
    pub healthy: u64,
    pub warning: u64,
    pub critical: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionEntry {
    pub key: String,
    pub count: u64,
}

/// Smallest number of distinct stake holders that together control a third
/// of the total activated stake.
///
/// Walks stakes in descending order and accumulates until the running sum
/// reaches total/3, compared in integer arithmetic (3*cumulative >= total)
/// so no stake distribution falls on a rounding edge. The sort is stable,
/// so equal stakes keep their first-seen order and the result is
/// deterministic. An empty or zero-stake set reports 1: a cluster that
/// cannot be measured is maximally concentrated, not infinitely safe.
pub fn nakamoto_coefficient(nodes: &[ScoredNode]) -> u64 {
    let mut stakes: Vec<u64> = nodes
        .iter()
        .filter(|n| n.is_validator)
        .map(|n| n.activated_stake)
        .collect();
    stakes.sort_by(|a, b| b.cmp(a));

    let total: u128 = stakes.iter().map(|&s| s as u128).sum();
    if total == 0 {
        return 1;
    }

    let mut cumulative: u128 = 0;
    for (i, &stake) in stakes.iter().enumerate() {
        cumulative += stake as u128;
        if cumulative * 3 >= total {
            return (i + 1) as u64;
        }
    }
    stakes.len() as u64
}

fn risk_counts(nodes: &[ScoredNode]) -> RiskCounts {
    let mut counts = RiskCounts::default();
    for node in nodes {
        match node.risk {
            RiskTier::Healthy => counts.healthy += 1,
            RiskTier::Degraded => counts.warning += 1,
            RiskTier::Critical => counts.critical += 1,
        }
    }
    counts
}

/// Histogram of `key_of` values over the node set, keeping the `top_n`
/// largest buckets. Keys are counted in first-seen order and the sort is
/// stable, so ties resolve the same way every cycle.
fn distribution<F>(nodes: &[ScoredNode], top_n: usize, key_of: F) -> Vec<DistributionEntry>
where
    F: Fn(&ScoredNode) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for node in nodes {
        let key = key_of(node);
        let count = counts.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            0
        });
        *count += 1;
    }

    let mut entries: Vec<DistributionEntry> = order
        .into_iter()
        .map(|key| {
            let count = counts[&key];
            DistributionEntry { key, count }
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(top_n);
    entries
}

fn version_key(node: &ScoredNode) -> String {
    node.version
        .as_deref()
        .and_then(|v| v.split_whitespace().next())
        .filter(|v| !v.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

fn isp_key(node: &ScoredNode) -> String {
    node.geo
        .as_ref()
        .and_then(|g| g.isp.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Roll one cycle's scored nodes up into the network view.
pub fn aggregate(
    nodes: &[ScoredNode],
    transactions_per_second: f64,
    epoch: u64,
    epoch_progress: f64,
    current_slot: u64,
    top_n: usize,
) -> NetworkAggregate {
    let validator_count = nodes.iter().filter(|n| n.is_validator).count() as u64;
    let delinquent_count = nodes.iter().filter(|n| n.delinquent).count() as u64;
    let total_activated_stake = nodes.iter().map(|n| n.activated_stake).sum();

    let average_reliability = if nodes.is_empty() {
        0.0
    } else {
        nodes.iter().map(|n| n.reliability_index as f64).sum::<f64>() / nodes.len() as f64
    };

    NetworkAggregate {
        node_count: nodes.len() as u64,
        validator_count,
        delinquent_count,
        total_activated_stake,
        average_reliability,
        nakamoto_coefficient: nakamoto_coefficient(nodes),
        transactions_per_second,
        epoch,
        epoch_progress,
        current_slot,
        risk: risk_counts(nodes),
        versions: distribution(nodes, top_n, version_key),
        isps: distribution(nodes, top_n, isp_key),
    }
}
