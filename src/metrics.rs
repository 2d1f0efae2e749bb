//! Prometheus-compatible metrics exporter for stakepulse
//!
//! Counter names follow the usual exporter conventions so the endpoint can
//! be scraped into existing Prometheus/Grafana setups without relabeling.
//!
//! Endpoint: GET /metrics (on the web UI port, default 8080)

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::MonitorEngine;

/// Global counters, atomically updated from the polling and snapshot loops
pub struct MetricsCounters {
    /// Completed polling cycles
    pub cycles_total: AtomicU64,
    /// Cycles abandoned because the data source failed
    pub cycles_failed: AtomicU64,
    /// Cycles skipped because one was already in flight
    pub cycles_skipped: AtomicU64,
    /// Nodes scored across all cycles
    pub nodes_scored_total: AtomicU64,
    /// Snapshots handed to the store
    pub snapshots_written_total: AtomicU64,
    /// Snapshot inserts that reported a persistence error
    pub snapshot_write_failures: AtomicU64,
    /// Geo lookups skipped because the per-cycle budget ran out
    pub geo_budget_exhausted: AtomicU64,
    /// Duration of the most recent completed cycle
    pub last_cycle_ms: AtomicU64,
    /// Process start time
    pub start_time: Instant,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            nodes_scored_total: AtomicU64::new(0),
            snapshots_written_total: AtomicU64::new(0),
            snapshot_write_failures: AtomicU64::new(0),
            geo_budget_exhausted: AtomicU64::new(0),
            last_cycle_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_cycle(&self, duration_ms: u64, nodes_scored: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.nodes_scored_total.fetch_add(nodes_scored, Ordering::Relaxed);
        self.last_cycle_ms.store(duration_ms, Ordering::Relaxed);
    }
}

impl Default for MetricsCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate Prometheus-format metrics text
pub fn render_metrics(engine: &Arc<MonitorEngine>) -> String {
    let mut out = String::with_capacity(8192);
    let c = &engine.metrics;

    // ──────────────────────────────────────────────
    // Process info
    // ──────────────────────────────────────────────
    let uptime = c.start_time.elapsed().as_secs_f64();

    write_help_type(&mut out, "stakepulse_up", "Whether the monitor is up.", "gauge");
    writeln!(out, "stakepulse_up 1").ok();

    write_help_type(&mut out, "stakepulse_time_up_seconds_total", "Uptime since monitor start in seconds.", "counter");
    writeln!(out, "stakepulse_time_up_seconds_total {:.3}", uptime).ok();

    // ──────────────────────────────────────────────
    // Polling cycles
    // ──────────────────────────────────────────────
    let cycles = c.cycles_total.load(Ordering::Relaxed);
    let failed = c.cycles_failed.load(Ordering::Relaxed);
    let skipped = c.cycles_skipped.load(Ordering::Relaxed);

    write_help_type(&mut out, "stakepulse_cycles_total", "Total completed polling cycles.", "counter");
    writeln!(out, "stakepulse_cycles_total {}", cycles).ok();

    write_help_type(&mut out, "stakepulse_cycles_failed_total", "Total cycles abandoned on data-source failure.", "counter");
    writeln!(out, "stakepulse_cycles_failed_total {}", failed).ok();

    write_help_type(&mut out, "stakepulse_cycles_skipped_total", "Total cycles skipped while a previous one was in flight.", "counter");
    writeln!(out, "stakepulse_cycles_skipped_total {}", skipped).ok();

    let last_cycle = c.last_cycle_ms.load(Ordering::Relaxed);
    write_help_type(&mut out, "stakepulse_last_cycle_duration_seconds", "Duration of the most recent completed cycle.", "gauge");
    writeln!(out, "stakepulse_last_cycle_duration_seconds {:.3}", last_cycle as f64 / 1000.0).ok();

    let nodes_scored = c.nodes_scored_total.load(Ordering::Relaxed);
    write_help_type(&mut out, "stakepulse_nodes_scored_total", "Total node scores computed across all cycles.", "counter");
    writeln!(out, "stakepulse_nodes_scored_total {}", nodes_scored).ok();

    // ──────────────────────────────────────────────
    // RPC client
    // ──────────────────────────────────────────────
    let rpc_stats = engine.chain.get_stats();
    let rpc_requests = rpc_stats["total_requests"].as_u64().unwrap_or(0);
    let rpc_failures = rpc_stats["total_failures"].as_u64().unwrap_or(0);
    // get_stats renders the average pre-formatted for the UI
    let rpc_latency = rpc_stats["avg_latency_ms"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    write_help_type(&mut out, "stakepulse_rpc_requests_total", "Total JSON-RPC requests issued.", "counter");
    writeln!(out, "stakepulse_rpc_requests_total {}", rpc_requests).ok();

    write_help_type(&mut out, "stakepulse_rpc_failures_total", "Total JSON-RPC requests that failed.", "counter");
    writeln!(out, "stakepulse_rpc_failures_total {}", rpc_failures).ok();

    write_help_type(&mut out, "stakepulse_rpc_avg_latency_ms", "Average JSON-RPC round trip in milliseconds.", "gauge");
    writeln!(out, "stakepulse_rpc_avg_latency_ms {:.1}", rpc_latency).ok();

    // ──────────────────────────────────────────────
    // Current cluster view (absent until the first cycle lands)
    // ──────────────────────────────────────────────
    if let Some(state) = engine.state() {
        let agg = &state.aggregate;

        write_help_type(&mut out, "stakepulse_cluster_nodes", "Nodes observed in the last cycle.", "gauge");
        writeln!(out, "stakepulse_cluster_nodes {}", agg.node_count).ok();

        write_help_type(&mut out, "stakepulse_cluster_validators", "Nodes with a vote account in the last cycle.", "gauge");
        writeln!(out, "stakepulse_cluster_validators {}", agg.validator_count).ok();

        write_help_type(&mut out, "stakepulse_cluster_delinquent", "Delinquent voters in the last cycle.", "gauge");
        writeln!(out, "stakepulse_cluster_delinquent {}", agg.delinquent_count).ok();

        write_help_type(&mut out, "stakepulse_risk_nodes", "Nodes per risk tier in the last cycle.", "gauge");
        writeln!(out, "stakepulse_risk_nodes{{tier=\"healthy\"}} {}", agg.risk.healthy).ok();
        writeln!(out, "stakepulse_risk_nodes{{tier=\"warning\"}} {}", agg.risk.warning).ok();
        writeln!(out, "stakepulse_risk_nodes{{tier=\"critical\"}} {}", agg.risk.critical).ok();

        write_help_type(&mut out, "stakepulse_average_reliability", "Mean reliability index over all scored nodes.", "gauge");
        writeln!(out, "stakepulse_average_reliability {:.2}", agg.average_reliability).ok();

        write_help_type(&mut out, "stakepulse_nakamoto_coefficient", "Minimum stake holders controlling a third of all stake.", "gauge");
        writeln!(out, "stakepulse_nakamoto_coefficient {}", agg.nakamoto_coefficient).ok();

        write_help_type(&mut out, "stakepulse_transactions_per_second", "Cluster throughput from the latest performance sample.", "gauge");
        writeln!(out, "stakepulse_transactions_per_second {:.2}", agg.transactions_per_second).ok();

        write_help_type(&mut out, "stakepulse_total_activated_stake_lamports", "Total activated stake in lamports.", "gauge");
        writeln!(out, "stakepulse_total_activated_stake_lamports {}", agg.total_activated_stake).ok();

        write_help_type(&mut out, "stakepulse_epoch", "Epoch observed in the last cycle.", "gauge");
        writeln!(out, "stakepulse_epoch {}", agg.epoch).ok();

        write_help_type(&mut out, "stakepulse_epoch_progress", "Percent of the current epoch elapsed.", "gauge");
        writeln!(out, "stakepulse_epoch_progress {:.2}", agg.epoch_progress).ok();

        write_help_type(&mut out, "stakepulse_current_slot", "Slot height observed in the last cycle.", "gauge");
        writeln!(out, "stakepulse_current_slot {}", agg.current_slot).ok();

        write_help_type(&mut out, "stakepulse_insights", "Insights emitted by the last cycle.", "gauge");
        writeln!(out, "stakepulse_insights {}", state.insights.len()).ok();
    }

    // ──────────────────────────────────────────────
    // Geo cache
    // ──────────────────────────────────────────────
    let geo_stats = engine.geo.get_stats();
    let geo_cached = geo_stats["cached_ips"].as_u64().unwrap_or(0);
    let geo_lookups = geo_stats["lookups"].as_u64().unwrap_or(0);
    let geo_hits = geo_stats["cache_hits"].as_u64().unwrap_or(0);
    let geo_failures = geo_stats["failures"].as_u64().unwrap_or(0);

    write_help_type(&mut out, "stakepulse_geo_cached_ips", "IPs with a cached location.", "gauge");
    writeln!(out, "stakepulse_geo_cached_ips {}", geo_cached).ok();

    write_help_type(&mut out, "stakepulse_geo_lookups_total", "Total geo lookups sent to the provider.", "counter");
    writeln!(out, "stakepulse_geo_lookups_total {}", geo_lookups).ok();

    write_help_type(&mut out, "stakepulse_geo_cache_hits_total", "Total geo lookups answered from cache.", "counter");
    writeln!(out, "stakepulse_geo_cache_hits_total {}", geo_hits).ok();

    write_help_type(&mut out, "stakepulse_geo_failures_total", "Total geo lookups that failed.", "counter");
    writeln!(out, "stakepulse_geo_failures_total {}", geo_failures).ok();

    let budget_exhausted = c.geo_budget_exhausted.load(Ordering::Relaxed);
    write_help_type(&mut out, "stakepulse_geo_budget_exhausted_total", "Cycles that ran out of fresh geo lookups.", "counter");
    writeln!(out, "stakepulse_geo_budget_exhausted_total {}", budget_exhausted).ok();

    // ──────────────────────────────────────────────
    // Snapshot store
    // ──────────────────────────────────────────────
    let store_stats = engine.store.get_stats();
    let stored = store_stats["current_entries"].as_u64().unwrap_or(0);
    let store_cap = store_stats["max_entries"].as_u64().unwrap_or(0);

    write_help_type(&mut out, "stakepulse_snapshots_stored", "Snapshot rows currently retained.", "gauge");
    writeln!(out, "stakepulse_snapshots_stored {}", stored).ok();

    write_help_type(&mut out, "stakepulse_snapshots_max", "Snapshot retention cap.", "gauge");
    writeln!(out, "stakepulse_snapshots_max {}", store_cap).ok();

    let written = c.snapshots_written_total.load(Ordering::Relaxed);
    write_help_type(&mut out, "stakepulse_snapshots_written_total", "Total snapshots collected.", "counter");
    writeln!(out, "stakepulse_snapshots_written_total {}", written).ok();

    let write_failures = c.snapshot_write_failures.load(Ordering::Relaxed);
    write_help_type(&mut out, "stakepulse_snapshot_write_failures_total", "Total snapshot persistence failures.", "counter");
    writeln!(out, "stakepulse_snapshot_write_failures_total {}", write_failures).ok();

    // ──────────────────────────────────────────────
    // Build info
    // ──────────────────────────────────────────────
    write_help_type(&mut out, "stakepulse_build_info", "stakepulse build information.", "gauge");
    writeln!(out, "stakepulse_build_info{{version=\"{}\"}} 1", env!("CARGO_PKG_VERSION")).ok();

    out
}

// ── helpers ─────────────────────────────────────────

fn write_help_type(out: &mut String, name: &str, help: &str, metric_type: &str) {
    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();
}
