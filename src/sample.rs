use std::collections::HashMap;

use serde::Serialize;

use crate::chain::types::{ClusterBatch, ClusterNode, VoteAccount};
use crate::classify::{BadgeTier, RiskTier};
use crate::geo::GeoInfo;

/// Consensus-voting state of a node, present iff it runs a vote account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub last_voted_slot: u64,
    pub activated_stake: u64,
    pub commission: u8,
    pub delinquent: bool,
}

/// Block-production counters, present iff the node held leader slots this epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionRecord {
    pub leader_slots: u64,
    pub blocks_produced: u64,
}

/// Fixed-shape sample for one node in one polling cycle.
///
/// Samples are ephemeral: the next cycle rebuilds them from scratch, nothing
/// is merged across cycles.
#[derive(Debug, Clone)]
pub struct NodeSample {
    pub identity: String,
    pub has_gossip: bool,
    pub gossip_ip: Option<String>,
    pub version: Option<String>,
    pub vote: Option<VoteRecord>,
    pub production: Option<ProductionRecord>,
    /// Cluster slot height at sample time, shared by every node in the batch
    pub current_slot: u64,
}

/// Scored view of one node, as published to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub has_gossip: bool,
    pub is_validator: bool,
    pub delinquent: bool,
    pub activated_stake: u64,
    pub commission: Option<u8>,
    pub vote_lag: u64,
    pub skip_rate: f64,
    pub efficiency: f64,
    pub reliability_index: u8,
    pub risk: RiskTier,
    pub badge: BadgeTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
}

/// Normalize a whole fetched batch into per-node samples.
pub fn normalize_batch(batch: &ClusterBatch) -> Vec<NodeSample> {
    // Union of voting and delinquent sets; insert delinquent first so a
    // currently-voting entry wins if an identity somehow appears in both.
    let mut votes: HashMap<&str, (&VoteAccount, bool)> = HashMap::new();
    for account in &batch.vote_accounts.delinquent {
        votes.insert(account.node_pubkey.as_str(), (account, true));
    }
    for account in &batch.vote_accounts.current {
        votes.insert(account.node_pubkey.as_str(), (account, false));
    }

    batch
        .nodes
        .iter()
        .map(|node| normalize_node(node, &votes, &batch.production.by_identity, batch.current_slot))
        .collect()
}

/// Normalize one raw cluster-node descriptor.
///
/// Absent lookups simply leave the optional fields unset; that is the
/// expected case for non-validating gossip nodes, not an error.
pub fn normalize_node(
    node: &ClusterNode,
    votes: &HashMap<&str, (&VoteAccount, bool)>,
    production: &HashMap<String, (u64, u64)>,
    current_slot: u64,
) -> NodeSample {
    let vote = votes.get(node.pubkey.as_str()).map(|(account, delinquent)| VoteRecord {
        last_voted_slot: account.last_vote,
        activated_stake: account.activated_stake,
        commission: account.commission,
        delinquent: *delinquent,
    });

    let production = production
        .get(&node.pubkey)
        .map(|&(leader_slots, blocks_produced)| ProductionRecord {
            leader_slots,
            blocks_produced,
        });

    NodeSample {
        identity: node.pubkey.clone(),
        has_gossip: node.gossip.is_some(),
        gossip_ip: node.gossip_ip().map(str::to_string),
        version: node.version.clone(),
        vote,
        production,
        current_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{BlockProductionValue, VoteAccounts};

    fn node(pubkey: &str, gossip: Option<&str>) -> ClusterNode {
        ClusterNode {
            pubkey: pubkey.to_string(),
            gossip: gossip.map(str::to_string),
            version: Some("1.18.23".to_string()),
        }
    }

    fn vote_account(identity: &str, stake: u64, last_vote: u64) -> VoteAccount {
        VoteAccount {
            node_pubkey: identity.to_string(),
            activated_stake: stake,
            commission: 5,
            last_vote,
        }
    }

    fn batch() -> ClusterBatch {
        let mut by_identity = HashMap::new();
        by_identity.insert("val-1".to_string(), (100u64, 95u64));

        ClusterBatch {
            nodes: vec![
                node("val-1", Some("203.0.113.7:8001")),
                node("val-2", Some("203.0.113.8:8001")),
                node("rpc-1", None),
            ],
            vote_accounts: VoteAccounts {
                current: vec![vote_account("val-1", 5_000, 998)],
                delinquent: vec![vote_account("val-2", 1_000, 400)],
            },
            production: BlockProductionValue { by_identity },
            current_slot: 1_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_validator_gets_vote_and_production() {
        let samples = normalize_batch(&batch());
        let val = samples.iter().find(|s| s.identity == "val-1").unwrap();

        let vote = val.vote.as_ref().expect("vote record should be populated");
        assert_eq!(vote.last_voted_slot, 998);
        assert_eq!(vote.activated_stake, 5_000);
        assert!(!vote.delinquent);

        let production = val.production.as_ref().expect("production record should be populated");
        assert_eq!(production.leader_slots, 100);
        assert_eq!(production.blocks_produced, 95);
        assert_eq!(val.current_slot, 1_000);
    }

    #[test]
    fn test_delinquent_set_is_part_of_the_union() {
        let samples = normalize_batch(&batch());
        let val = samples.iter().find(|s| s.identity == "val-2").unwrap();

        let vote = val.vote.as_ref().unwrap();
        assert!(vote.delinquent);
        assert_eq!(vote.activated_stake, 1_000);
        // No leader slots assigned -> no production record
        assert!(val.production.is_none());
    }

    #[test]
    fn test_non_validator_has_no_optional_records() {
        let samples = normalize_batch(&batch());
        let rpc = samples.iter().find(|s| s.identity == "rpc-1").unwrap();

        assert!(rpc.vote.is_none());
        assert!(rpc.production.is_none());
        assert!(!rpc.has_gossip);
        assert!(rpc.gossip_ip.is_none());
    }

    #[test]
    fn test_current_set_wins_on_duplicate_identity() {
        let mut b = batch();
        // Same identity listed as both voting and delinquent
        b.vote_accounts.delinquent.push(vote_account("val-1", 9_999, 100));

        let samples = normalize_batch(&b);
        let val = samples.iter().find(|s| s.identity == "val-1").unwrap();
        let vote = val.vote.as_ref().unwrap();

        assert!(!vote.delinquent, "currently-voting entry should win the union");
        assert_eq!(vote.activated_stake, 5_000);
    }

    #[test]
    fn test_gossip_presence_carried_through() {
        let samples = normalize_batch(&batch());
        let val = samples.iter().find(|s| s.identity == "val-1").unwrap();

        assert!(val.has_gossip);
        assert_eq!(val.gossip_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(val.version.as_deref(), Some("1.18.23"));
    }
}
