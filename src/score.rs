use crate::sample::NodeSample;

/// Reliability Scoring Engine
///
/// Derives the bounded health index of one node from its cycle sample:
///
///   vote_lag   = max(0, current_slot - last_voted_slot)   (0 without a vote record)
///   skip_rate  = 100 * (leader_slots - produced) / leader_slots
///   efficiency = 100 * produced / leader_slots, or a lag-based fallback
///   index      = clamp(100 - 1.5*skip_rate - 0.5*vote_lag - gossip_penalty, 0, 100)
///                then floored to an integer
///
/// Skip rate is weighted three times per unit over vote lag: a missed leader
/// slot is hard evidence of failed duty, lag is only a liveness hint. Gossip
/// unreachability is a flat deduction since it is a binary fault. The score
/// is absolute, never normalized against peers, so values are comparable
/// across cycles.
///
/// Every function here is total: malformed counters are clamped into range,
/// absent records fall back to their documented defaults, nothing panics.

/// Penalty per percentage point of skip rate.
const SKIP_RATE_WEIGHT: f64 = 1.5;
/// Penalty per slot of vote lag.
const VOTE_LAG_WEIGHT: f64 = 0.5;
/// Flat penalty for not advertising a gossip address.
const GOSSIP_PENALTY: f64 = 20.0;
/// Without production data, a node lagging fewer slots than this is assumed healthy.
const LAG_FALLBACK_THRESHOLD: u64 = 5;

/// The computed metrics for one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeScore {
    pub vote_lag: u64,
    pub skip_rate: f64,
    pub efficiency: f64,
    pub reliability_index: u8,
}

/// Slots elapsed since the node's last recorded vote.
///
/// Zero without a vote record, and clamped to zero when the recorded vote is
/// ahead of the sampled slot height (clock skew between RPC calls).
pub fn vote_lag(sample: &NodeSample) -> u64 {
    match &sample.vote {
        Some(vote) if sample.current_slot > 0 => {
            sample.current_slot.saturating_sub(vote.last_voted_slot)
        }
        _ => 0,
    }
}

/// Percentage of assigned leader slots the node failed to produce in.
///
/// Zero when no production data exists; a produced count above the assigned
/// count is clamped rather than going negative.
pub fn skip_rate(sample: &NodeSample) -> f64 {
    match &sample.production {
        Some(p) if p.leader_slots > 0 => {
            let produced = p.blocks_produced.min(p.leader_slots);
            100.0 * (p.leader_slots - produced) as f64 / p.leader_slots as f64
        }
        _ => 0.0,
    }
}

/// Production success percentage.
///
/// With no production record the node is assumed healthy unless its vote lag
/// suggests otherwise.
pub fn efficiency(sample: &NodeSample, vote_lag: u64) -> f64 {
    match &sample.production {
        Some(p) if p.leader_slots > 0 => {
            let produced = p.blocks_produced.min(p.leader_slots);
            100.0 * produced as f64 / p.leader_slots as f64
        }
        _ if vote_lag < LAG_FALLBACK_THRESHOLD => 100.0,
        _ => 50.0,
    }
}

/// The composite [0, 100] reliability index.
pub fn reliability_index(skip_rate: f64, vote_lag: u64, has_gossip: bool) -> u8 {
    let mut index = 100.0 - SKIP_RATE_WEIGHT * skip_rate - VOTE_LAG_WEIGHT * vote_lag as f64;
    if !has_gossip {
        index -= GOSSIP_PENALTY;
    }
    index.clamp(0.0, 100.0).floor() as u8
}

/// Score one sample, computing the metrics in their defined order.
pub fn score(sample: &NodeSample) -> NodeScore {
    let vote_lag = vote_lag(sample);
    let skip_rate = skip_rate(sample);
    let efficiency = efficiency(sample, vote_lag);
    let reliability_index = reliability_index(skip_rate, vote_lag, sample.has_gossip);

    NodeScore {
        vote_lag,
        skip_rate,
        efficiency,
        reliability_index,
    }
}
