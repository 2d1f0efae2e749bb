use serde::Serialize;

use crate::snapshot::NetworkSnapshot;

/// Lamports per whole stake unit shown on charts.
const STAKE_DISPLAY_DIVISOR: f64 = 1_000_000_000.0;

/// One chart-ready history sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub time: String,
    pub total_stake: f64,
    pub tps: f64,
    pub node_count: u64,
    pub epoch: u64,
}

/// Turn newest-first snapshot rows into a chronological display series.
///
/// The series is the strict reversal of the input order, which is the
/// store's newest-first contract. Rows are never re-sorted by timestamp: an
/// out-of-order row in the store shows up out of order on the chart instead
/// of being silently reshuffled. Timestamps render as local time of day and
/// stake converts from lamports to whole units.
pub fn format_history(rows: &[NetworkSnapshot]) -> Vec<HistoryPoint> {
    rows.iter()
        .rev()
        .map(|row| HistoryPoint {
            time: row
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
            total_stake: row.total_activated_stake_lamports as f64 / STAKE_DISPLAY_DIVISOR,
            tps: row.transactions_per_second,
            node_count: row.active_node_count,
            epoch: row.epoch,
        })
        .collect()
}
