use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::aggregate::{self, NetworkAggregate};
use crate::chain::client::ChainClient;
use crate::chain::types::ClusterBatch;
use crate::classify::{badge_tier, risk_tier};
use crate::config::Config;
use crate::geo::GeoService;
use crate::history::{format_history, HistoryPoint};
use crate::identity::IdentityBook;
use crate::insight::{derive_insights, Insight};
use crate::metrics::MetricsCounters;
use crate::sample::{normalize_batch, NodeSample, ScoredNode};
use crate::score;
use crate::snapshot::{NetworkSnapshot, QueryOrder, SnapshotStore};

/// One polling cycle's complete published view. Replaced wholesale; readers
/// holding an `Arc` keep a consistent cycle for as long as they need it.
pub struct EngineState {
    pub cycle: u64,
    pub fetched_at: DateTime<Utc>,
    pub nodes: Vec<ScoredNode>,
    pub aggregate: NetworkAggregate,
    pub insights: Vec<Insight>,
}

/// Core monitor - owns the chain client, caches, counters and published state
pub struct MonitorEngine {
    pub config: Arc<Config>,
    pub chain: Arc<ChainClient>,
    pub geo: Arc<GeoService>,
    pub identity: IdentityBook,
    pub store: Arc<SnapshotStore>,
    pub metrics: MetricsCounters,
    state: RwLock<Option<Arc<EngineState>>>,
    cycle_in_flight: AtomicBool,
    cycle_counter: AtomicU64,
}

impl MonitorEngine {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let chain = Arc::new(ChainClient::new(&config.rpc)?);
        let geo = Arc::new(GeoService::new(&config.geo)?);
        let identity = IdentityBook::new(&config.identity);
        let store = Arc::new(SnapshotStore::open(&config.snapshot)?);

        if config.geo.enabled {
            info!("🌍 Geo enrichment enabled ({})", config.geo.endpoint);
        } else {
            info!("🌍 Geo enrichment disabled");
        }
        if identity.len() > 0 {
            info!("🏷️ Loaded {} identity label(s)", identity.len());
        }

        Ok(Self {
            config,
            chain,
            geo,
            identity,
            store,
            metrics: MetricsCounters::new(),
            state: RwLock::new(None),
            cycle_in_flight: AtomicBool::new(false),
            cycle_counter: AtomicU64::new(0),
        })
    }

    /// Latest published view, if any cycle has completed yet.
    pub fn state(&self) -> Option<Arc<EngineState>> {
        self.state.read().clone()
    }

    /// Polling loop - one scoring cycle per interval, first one immediately
    /// so the dashboard has data as soon as the source answers.
    pub async fn run_poll_loop(&self) {
        let interval = Duration::from_secs(self.config.poll.interval_secs);
        info!("📡 Poll loop started (interval: {:?})", interval);

        loop {
            self.poll_once().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// Run one polling cycle unless one is already in flight.
    pub async fn poll_once(&self) {
        if self
            .cycle_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.metrics.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            warn!("📡 Previous cycle still in flight, skipping this tick");
            return;
        }

        let started = Instant::now();
        match self.collect_cycle().await {
            Ok((cycle, node_count)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_cycle(elapsed_ms, node_count as u64);
                info!("📡 Cycle {}: scored {} nodes in {}ms", cycle, node_count, elapsed_ms);
            }
            Err(e) => {
                self.metrics.cycles_failed.fetch_add(1, Ordering::Relaxed);
                warn!("📡 Cycle abandoned, keeping previous view: {:#}", e);
            }
        }
        self.cycle_in_flight.store(false, Ordering::SeqCst);
    }

    /// Fetch, score and publish one cycle. Nothing is published unless the
    /// whole batch fetch succeeded, so readers never see a torn cycle.
    async fn collect_cycle(&self) -> anyhow::Result<(u64, usize)> {
        let batch = self.chain.fetch_batch().await?;
        let state = self.build_state(&batch).await;
        let cycle = state.cycle;
        let node_count = state.nodes.len();

        *self.state.write() = Some(Arc::new(state));
        Ok((cycle, node_count))
    }

    async fn build_state(&self, batch: &ClusterBatch) -> EngineState {
        let samples = normalize_batch(batch);

        let mut nodes: Vec<ScoredNode> = samples.iter().map(|s| self.score_node(s)).collect();
        self.enrich_geo(&mut nodes, &samples).await;

        // Publish stake-descending; the stable sort keeps listing order for ties
        nodes.sort_by(|a, b| b.activated_stake.cmp(&a.activated_stake));

        let aggregate = aggregate::aggregate(
            &nodes,
            batch.throughput.tps(),
            batch.epoch_info.epoch,
            batch.epoch_info.progress_percent(),
            batch.current_slot,
            self.config.display.top_n,
        );
        let insights = derive_insights(&aggregate, &self.config.insight);

        EngineState {
            cycle: self.cycle_counter.fetch_add(1, Ordering::Relaxed) + 1,
            fetched_at: Utc::now(),
            nodes,
            aggregate,
            insights,
        }
    }

    fn score_node(&self, sample: &NodeSample) -> ScoredNode {
        let score = score::score(sample);

        ScoredNode {
            identity: sample.identity.clone(),
            display_name: self.identity.resolve(&sample.identity).map(str::to_string),
            version: sample.version.clone(),
            has_gossip: sample.has_gossip,
            is_validator: sample.vote.is_some(),
            delinquent: sample.vote.as_ref().map(|v| v.delinquent).unwrap_or(false),
            activated_stake: sample.vote.as_ref().map(|v| v.activated_stake).unwrap_or(0),
            commission: sample.vote.as_ref().map(|v| v.commission),
            vote_lag: score.vote_lag,
            skip_rate: score.skip_rate,
            efficiency: score.efficiency,
            reliability_index: score.reliability_index,
            risk: risk_tier(score.reliability_index),
            badge: badge_tier(score.reliability_index),
            geo: None,
        }
    }

    /// Attach cached locations freely; fresh provider lookups are capped per
    /// cycle so a large cluster cannot trip the provider's rate limit.
    async fn enrich_geo(&self, nodes: &mut [ScoredNode], samples: &[NodeSample]) {
        if !self.config.geo.enabled {
            return;
        }

        let mut budget = self.config.geo.max_lookups_per_cycle;
        let mut starved = false;

        for (node, sample) in nodes.iter_mut().zip(samples) {
            if let Some(ip) = sample.gossip_ip.as_deref() {
                if self.geo.is_cached(ip) {
                    node.geo = self.geo.resolve(ip).await;
                } else if budget > 0 {
                    budget -= 1;
                    node.geo = self.geo.resolve(ip).await;
                } else {
                    starved = true;
                }
            }
        }

        if starved {
            self.metrics.geo_budget_exhausted.fetch_add(1, Ordering::Relaxed);
            debug!("🌍 Fresh lookup budget spent, remaining nodes stay unlocated this cycle");
        }
    }

    /// Snapshot loop - periodically persist the current aggregate view.
    pub async fn run_snapshot_loop(&self) {
        let interval = Duration::from_secs(self.config.snapshot.interval_secs);
        info!("📼 Snapshot loop started (interval: {:?})", interval);

        loop {
            tokio::time::sleep(interval).await;

            if let Some(state) = self.state() {
                let snapshot = NetworkSnapshot {
                    timestamp: Utc::now(),
                    total_activated_stake_lamports: state.aggregate.total_activated_stake,
                    transactions_per_second: state.aggregate.transactions_per_second,
                    active_node_count: state.aggregate.node_count,
                    epoch: state.aggregate.epoch,
                };

                match self.store.insert(snapshot) {
                    Ok(()) => {
                        self.metrics.snapshots_written_total.fetch_add(1, Ordering::Relaxed);
                        debug!("📼 Snapshot recorded ({} retained)", self.store.len());
                    }
                    Err(e) => {
                        self.metrics.snapshot_write_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("📼 Snapshot persistence failed: {:#}", e);
                    }
                }
            }
        }
    }

    /// Chart-ready history series for the API.
    pub fn history(&self, limit: usize) -> Vec<HistoryPoint> {
        let rows = self.store.query(limit, QueryOrder::NewestFirst);
        format_history(&rows)
    }

    /// Get stats for Web UI
    pub fn get_stats(&self) -> serde_json::Value {
        let state = self.state();

        serde_json::json!({
            "cycles": {
                "completed": self.metrics.cycles_total.load(Ordering::Relaxed),
                "failed": self.metrics.cycles_failed.load(Ordering::Relaxed),
                "skipped": self.metrics.cycles_skipped.load(Ordering::Relaxed),
                "last_duration_ms": self.metrics.last_cycle_ms.load(Ordering::Relaxed),
            },
            "rpc": self.chain.get_stats(),
            "geo": self.geo.get_stats(),
            "snapshots": self.store.get_stats(),
            "identity_labels": self.identity.len(),
            "current_cycle": state.as_ref().map(|s| s.cycle),
            "last_fetched_at": state.as_ref().map(|s| s.fetched_at.to_rfc3339()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{
        BlockProductionValue, ClusterNode, EpochInfo, ThroughputSample, VoteAccount, VoteAccounts,
    };
    use crate::classify::RiskTier;
    use crate::config::{
        DisplayConfig, GeoConfig, IdentityConfig, IdentityLabel, InsightConfig, PollConfig,
        RpcConfig, SnapshotConfig, WebConfig,
    };
    use crate::insight::Severity;
    use std::collections::HashMap;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            rpc: RpcConfig {
                // Port 1 refuses connections immediately, so failure paths
                // run fast without any server
                url: "http://127.0.0.1:1".to_string(),
                timeout_ms: 200,
            },
            poll: PollConfig { interval_secs: 30 },
            snapshot: SnapshotConfig { interval_secs: 60, max_entries: 100, path: None },
            geo: GeoConfig {
                enabled: false,
                endpoint: "http://ip-api.invalid/json".to_string(),
                timeout_ms: 100,
                max_lookups_per_cycle: 40,
            },
            web: WebConfig { enabled: false, address: "127.0.0.1".to_string(), port: 0 },
            insight: InsightConfig { tps_warning_threshold: 1_000.0, min_nakamoto_coefficient: 3 },
            display: DisplayConfig { top_n: 6 },
            identity: IdentityConfig {
                labels: vec![IdentityLabel {
                    prefix: "Fd7b".to_string(),
                    name: "ops fleet".to_string(),
                }],
            },
        })
    }

    fn test_batch() -> ClusterBatch {
        let mut by_identity = HashMap::new();
        by_identity.insert("validator-1".to_string(), (100u64, 95u64));

        ClusterBatch {
            nodes: vec![
                ClusterNode {
                    pubkey: "validator-1".to_string(),
                    gossip: Some("10.0.0.1:8001".to_string()),
                    version: Some("1.18.23".to_string()),
                },
                ClusterNode {
                    pubkey: "Fd7bQxlo3333".to_string(),
                    gossip: Some("10.0.0.2:8001".to_string()),
                    version: Some("1.18.23".to_string()),
                },
            ],
            vote_accounts: VoteAccounts {
                current: vec![VoteAccount {
                    node_pubkey: "validator-1".to_string(),
                    activated_stake: 5_000,
                    commission: 7,
                    last_vote: 900,
                }],
                delinquent: vec![],
            },
            production: BlockProductionValue { by_identity },
            current_slot: 1_000,
            epoch_info: EpochInfo {
                epoch: 512,
                slot_index: 108_000,
                slots_in_epoch: 432_000,
            },
            throughput: ThroughputSample { transaction_count: 90_000, period_seconds: 60 },
        }
    }

    #[tokio::test]
    async fn test_build_state_scores_labels_and_aggregates() {
        let engine = MonitorEngine::new(test_config()).unwrap();
        let state = engine.build_state(&test_batch()).await;

        assert_eq!(state.cycle, 1);
        assert_eq!(state.nodes.len(), 2);

        let validator = state.nodes.iter().find(|n| n.identity == "validator-1").unwrap();
        assert!(validator.is_validator);
        assert_eq!(validator.vote_lag, 100);
        assert_eq!(validator.reliability_index, 42);
        assert_eq!(validator.risk, RiskTier::Critical);
        assert_eq!(validator.commission, Some(7));

        let labeled = state.nodes.iter().find(|n| n.identity == "Fd7bQxlo3333").unwrap();
        assert_eq!(labeled.display_name.as_deref(), Some("ops fleet"));
        assert_eq!(labeled.reliability_index, 100);

        assert_eq!(state.aggregate.node_count, 2);
        assert_eq!(state.aggregate.validator_count, 1);
        assert_eq!(state.aggregate.epoch, 512);
        assert!((state.aggregate.epoch_progress - 25.0).abs() < 1e-9);
        assert!((state.aggregate.transactions_per_second - 1_500.0).abs() < 1e-9);

        // Healthy TPS, one-staker concentration, one critical node
        let severities: Vec<Severity> = state.insights.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Optimization, Severity::Warning, Severity::Critical]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_abandons_the_cycle() {
        let engine = MonitorEngine::new(test_config()).unwrap();

        engine.poll_once().await;
        assert!(engine.state().is_none(), "failed cycle must not publish state");
        assert_eq!(engine.metrics.cycles_failed.load(Ordering::Relaxed), 1);

        // The in-flight guard must have been released
        engine.poll_once().await;
        assert_eq!(engine.metrics.cycles_failed.load(Ordering::Relaxed), 2);
        assert_eq!(engine.metrics.cycles_skipped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_the_previous_view() {
        let engine = MonitorEngine::new(test_config()).unwrap();
        let first = engine.build_state(&test_batch()).await;
        *engine.state.write() = Some(Arc::new(first));

        // The unreachable source fails this cycle; readers must still see
        // the view the last good cycle published
        engine.poll_once().await;

        let view = engine.state().expect("stale view must survive a failed cycle");
        assert_eq!(view.cycle, 1);
        assert_eq!(view.nodes.len(), 2);
        assert_eq!(engine.metrics.cycles_failed.load(Ordering::Relaxed), 1);
        assert_eq!(engine.metrics.cycles_total.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_busy_engine_skips_the_tick() {
        let engine = MonitorEngine::new(test_config()).unwrap();
        engine.cycle_in_flight.store(true, Ordering::SeqCst);

        engine.poll_once().await;
        assert_eq!(engine.metrics.cycles_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(engine.metrics.cycles_failed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_history_reads_chronologically() {
        let engine = MonitorEngine::new(test_config()).unwrap();
        for epoch in 0..3 {
            engine
                .store
                .insert(NetworkSnapshot {
                    timestamp: Utc::now(),
                    total_activated_stake_lamports: 2_000_000_000,
                    transactions_per_second: 1_500.0,
                    active_node_count: 2,
                    epoch,
                })
                .unwrap();
        }

        let series = engine.history(2);
        assert_eq!(series.iter().map(|p| p.epoch).collect::<Vec<_>>(), vec![1, 2]);
        assert!((series[0].total_stake - 2.0).abs() < 1e-9);
    }
}
