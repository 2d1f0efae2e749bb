use std::collections::HashMap;

use serde::Deserialize;

/// One gossip-visible cluster node as reported by `getClusterNodes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    /// Node identity public key (base58 string)
    pub pubkey: String,
    /// Advertised gossip endpoint ("ip:port"), absent when unreachable
    pub gossip: Option<String>,
    pub version: Option<String>,
}

impl ClusterNode {
    /// IP portion of the gossip endpoint, if one is advertised. Handles
    /// both `ip:port` and bracketed `[ipv6]:port` forms.
    pub fn gossip_ip(&self) -> Option<&str> {
        let gossip = self.gossip.as_deref()?;
        let host = gossip.rsplit_once(':').map_or(gossip, |(host, _)| host);
        Some(host.trim_start_matches('[').trim_end_matches(']'))
    }
}

/// `getVoteAccounts` result: currently-voting and delinquent sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccount>,
    pub delinquent: Vec<VoteAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccount {
    /// Identity key of the node operating this vote account
    pub node_pubkey: String,
    /// Stake delegated to this account, in lamports
    pub activated_stake: u64,
    pub commission: u8,
    /// Most recent slot this account voted on
    pub last_vote: u64,
}

/// `getBlockProduction` result envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockProduction {
    pub value: BlockProductionValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProductionValue {
    /// identity -> (leader slots assigned, blocks produced) for this epoch
    pub by_identity: HashMap<String, (u64, u64)>,
}

/// `getEpochInfo` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
}

impl EpochInfo {
    /// How far through the current epoch the cluster is, in percent.
    pub fn progress_percent(&self) -> f64 {
        if self.slots_in_epoch == 0 {
            return 0.0;
        }
        100.0 * self.slot_index as f64 / self.slots_in_epoch as f64
    }
}

/// One entry of `getRecentPerformanceSamples`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub num_transactions: u64,
    pub sample_period_secs: u64,
}

/// Transaction throughput over a sampling window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThroughputSample {
    pub transaction_count: u64,
    pub period_seconds: u64,
}

impl ThroughputSample {
    /// Transactions per second, zero when the window is empty.
    pub fn tps(&self) -> f64 {
        if self.period_seconds == 0 {
            return 0.0;
        }
        self.transaction_count as f64 / self.period_seconds as f64
    }
}

/// Everything one collection cycle fetches from the chain data source.
///
/// The batch is assembled in full before any scoring happens; a cycle either
/// produces a complete batch or nothing at all.
#[derive(Debug, Clone, Default)]
pub struct ClusterBatch {
    pub nodes: Vec<ClusterNode>,
    pub vote_accounts: VoteAccounts,
    pub production: BlockProductionValue,
    pub current_slot: u64,
    pub epoch_info: EpochInfo,
    pub throughput: ThroughputSample,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_gossip(gossip: Option<&str>) -> ClusterNode {
        ClusterNode {
            pubkey: "abc".into(),
            gossip: gossip.map(str::to_string),
            version: None,
        }
    }

    #[test]
    fn test_gossip_ip_extraction() {
        assert_eq!(node_with_gossip(Some("203.0.113.7:8001")).gossip_ip(), Some("203.0.113.7"));
        assert_eq!(node_with_gossip(None).gossip_ip(), None);
    }

    #[test]
    fn test_gossip_ip_handles_bracketed_ipv6() {
        let node = node_with_gossip(Some("[2001:db8::1]:8001"));
        assert_eq!(node.gossip_ip(), Some("2001:db8::1"));
    }

    #[test]
    fn test_gossip_ip_without_port_is_whole_host() {
        assert_eq!(node_with_gossip(Some("203.0.113.7")).gossip_ip(), Some("203.0.113.7"));
    }

    #[test]
    fn test_epoch_progress_percent() {
        let info = EpochInfo { epoch: 512, slot_index: 108_000, slots_in_epoch: 432_000 };
        assert!((info.progress_percent() - 25.0).abs() < 1e-9);

        let empty = EpochInfo::default();
        assert_eq!(empty.progress_percent(), 0.0, "an empty epoch window must not divide by zero");
    }

    #[test]
    fn test_tps_guards_empty_window() {
        let sample = ThroughputSample { transaction_count: 6000, period_seconds: 60 };
        assert!((sample.tps() - 100.0).abs() < f64::EPSILON);

        let empty = ThroughputSample { transaction_count: 500, period_seconds: 0 };
        assert_eq!(empty.tps(), 0.0);
    }

    #[test]
    fn test_block_production_decodes_slot_pairs() {
        let raw = r#"{"value":{"byIdentity":{"idA":[40,38],"idB":[7,0]},"range":{"firstSlot":0,"lastSlot":100}}}"#;
        let parsed: BlockProduction = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.value.by_identity["idA"], (40, 38));
        assert_eq!(parsed.value.by_identity["idB"], (7, 0));
    }
}
