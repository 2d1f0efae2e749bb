use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::RpcConfig;
use crate::chain::types::{
    BlockProduction, BlockProductionValue, ClusterBatch, ClusterNode, EpochInfo,
    PerformanceSample, ThroughputSample, VoteAccounts,
};

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for the chain data source.
///
/// This is the only module that talks to the RPC node; the scoring core
/// consumes the already-decoded `ClusterBatch` it returns.
pub struct ChainClient {
    http: reqwest::Client,
    url: String,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl ChainClient {
    pub fn new(config: &RpcConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build RPC http client: {}", e))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<T> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match self.call_inner(method, params).await {
            Ok(value) => {
                let elapsed = start.elapsed().as_millis() as u64;
                self.latency_sum_ms.fetch_add(elapsed, Ordering::Relaxed);
                self.latency_count.fetch_add(1, Ordering::Relaxed);
                debug!("rpc {} ok ({}ms)", method, elapsed);
                Ok(value)
            }
            Err(e) => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                Err(anyhow::anyhow!("rpc {} failed: {}", method, e))
            }
        }
    }

    async fn call_inner<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<T> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let envelope: RpcEnvelope<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = envelope.error {
            return Err(anyhow::anyhow!("server error {}: {}", err.code, err.message));
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("response carried neither result nor error"))
    }

    pub async fn list_cluster_nodes(&self) -> anyhow::Result<Vec<ClusterNode>> {
        self.call("getClusterNodes", serde_json::json!([])).await
    }

    pub async fn list_vote_accounts(&self) -> anyhow::Result<VoteAccounts> {
        self.call("getVoteAccounts", serde_json::json!([])).await
    }

    pub async fn block_production(&self) -> anyhow::Result<BlockProductionValue> {
        let production: BlockProduction =
            self.call("getBlockProduction", serde_json::json!([])).await?;
        Ok(production.value)
    }

    pub async fn current_slot(&self) -> anyhow::Result<u64> {
        self.call("getSlot", serde_json::json!([])).await
    }

    pub async fn epoch_info(&self) -> anyhow::Result<EpochInfo> {
        self.call("getEpochInfo", serde_json::json!([])).await
    }

    /// Most recent throughput sample; an empty sample list is not an error.
    pub async fn recent_throughput(&self) -> anyhow::Result<ThroughputSample> {
        let samples: Vec<PerformanceSample> = self
            .call("getRecentPerformanceSamples", serde_json::json!([1]))
            .await?;
        Ok(samples
            .first()
            .map(|s| ThroughputSample {
                transaction_count: s.num_transactions,
                period_seconds: s.sample_period_secs,
            })
            .unwrap_or_default())
    }

    /// Fetch everything one collection cycle needs, concurrently.
    ///
    /// Any single failure fails the whole batch; the caller abandons the
    /// cycle rather than scoring partial data.
    pub async fn fetch_batch(&self) -> anyhow::Result<ClusterBatch> {
        let (nodes, vote_accounts, production, current_slot, epoch_info, throughput) = tokio::try_join!(
            self.list_cluster_nodes(),
            self.list_vote_accounts(),
            self.block_production(),
            self.current_slot(),
            self.epoch_info(),
            self.recent_throughput(),
        )?;

        Ok(ClusterBatch {
            nodes,
            vote_accounts,
            production,
            current_slot,
            epoch_info,
            throughput,
        })
    }

    /// RPC source stats for the Web UI / metrics exporter.
    pub fn get_stats(&self) -> serde_json::Value {
        let count = self.latency_count.load(Ordering::Relaxed);
        let avg_latency = if count > 0 {
            self.latency_sum_ms.load(Ordering::Relaxed) as f64 / count as f64
        } else {
            0.0
        };

        serde_json::json!({
            "url": self.url,
            "total_requests": self.total_requests.load(Ordering::Relaxed),
            "total_failures": self.total_failures.load(Ordering::Relaxed),
            "avg_latency_ms": format!("{:.1}", avg_latency),
        })
    }
}
