use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SnapshotConfig;

/// One persisted point of network-wide history. Per-node scores are
/// recomputed every cycle and never stored; only this rollup survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_activated_stake_lamports: u64,
    pub transactions_per_second: f64,
    pub active_node_count: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    NewestFirst,
    OldestFirst,
}

/// Bounded in-memory snapshot buffer with optional JSONL persistence.
///
/// Rows live in insertion (chronological) order and rotate from the front
/// once the retention cap is reached. When a path is configured every insert
/// also appends one JSON line to the file, and `open` replays the file so
/// history survives restarts. File trouble is reported to the caller but the
/// in-memory row is always kept.
pub struct SnapshotStore {
    config: SnapshotConfig,
    path: Option<PathBuf>,
    rows: RwLock<Vec<NetworkSnapshot>>,
    total_inserted: AtomicU64,
    write_failures: AtomicU64,
}

impl SnapshotStore {
    pub fn open(config: &SnapshotConfig) -> anyhow::Result<Self> {
        let path = config.path.as_ref().map(PathBuf::from);
        let mut rows = Vec::new();

        if let Some(path) = &path {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    for (line_no, line) in contents.lines().enumerate() {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<NetworkSnapshot>(line) {
                            Ok(row) => rows.push(row),
                            Err(e) => {
                                warn!("📼 Skipping malformed snapshot line {}: {}", line_no + 1, e)
                            }
                        }
                    }
                    // Keep only the newest rows within the cap
                    if rows.len() > config.max_entries {
                        let drain_count = rows.len() - config.max_entries;
                        rows.drain(..drain_count);
                    }
                    info!("📼 Loaded {} snapshot(s) from {}", rows.len(), path.display());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read snapshot file {}", path.display()))
                }
            }
        }

        Ok(Self {
            config: config.clone(),
            path,
            rows: RwLock::new(rows),
            total_inserted: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        })
    }

    /// Append one snapshot. The in-memory buffer is updated even when the
    /// file append fails; the error is for the caller's log.
    pub fn insert(&self, snapshot: NetworkSnapshot) -> anyhow::Result<()> {
        {
            let mut rows = self.rows.write();
            rows.push(snapshot.clone());
            if rows.len() > self.config.max_entries {
                let drain_count = rows.len() - self.config.max_entries;
                rows.drain(..drain_count);
            }
        }
        self.total_inserted.fetch_add(1, Ordering::Relaxed);

        if let Some(path) = &self.path {
            if let Err(e) = self.append_line(path, &snapshot) {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }
        Ok(())
    }

    fn append_line(&self, path: &Path, snapshot: &NetworkSnapshot) -> anyhow::Result<()> {
        let line = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open snapshot file {}", path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to snapshot file {}", path.display()))?;
        Ok(())
    }

    /// Most recent `limit` rows, in the requested order.
    pub fn query(&self, limit: usize, order: QueryOrder) -> Vec<NetworkSnapshot> {
        let rows = self.rows.read();
        let mut recent: Vec<NetworkSnapshot> = rows.iter().rev().take(limit).cloned().collect();
        if order == QueryOrder::OldestFirst {
            recent.reverse();
        }
        recent
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn get_stats(&self) -> serde_json::Value {
        let rows = self.rows.read();
        serde_json::json!({
            "current_entries": rows.len(),
            "max_entries": self.config.max_entries,
            "persisted": self.path.is_some(),
            "total_inserted": self.total_inserted.load(Ordering::Relaxed),
            "write_failures": self.write_failures.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_config(max_entries: usize, path: Option<PathBuf>) -> SnapshotConfig {
        SnapshotConfig {
            interval_secs: 60,
            max_entries,
            path: path.map(|p| p.to_string_lossy().into_owned()),
        }
    }

    fn snap(epoch: u64, offset_secs: i64) -> NetworkSnapshot {
        NetworkSnapshot {
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            total_activated_stake_lamports: 5_000_000_000,
            transactions_per_second: 1_800.0,
            active_node_count: 42,
            epoch,
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("stakepulse-{}-{}.jsonl", tag, std::process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_query_orders() {
        let store = SnapshotStore::open(&test_config(100, None)).unwrap();
        for i in 0..3 {
            store.insert(snap(i, i as i64)).unwrap();
        }

        let newest = store.query(10, QueryOrder::NewestFirst);
        assert_eq!(newest.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![2, 1, 0]);

        let oldest = store.query(10, QueryOrder::OldestFirst);
        assert_eq!(oldest.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_query_limit_keeps_most_recent_window() {
        let store = SnapshotStore::open(&test_config(100, None)).unwrap();
        for i in 0..5 {
            store.insert(snap(i, i as i64)).unwrap();
        }

        // Both orders must describe the same most-recent window
        let newest = store.query(2, QueryOrder::NewestFirst);
        assert_eq!(newest.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![4, 3]);

        let oldest = store.query(2, QueryOrder::OldestFirst);
        assert_eq!(oldest.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_rotation_drops_oldest_rows() {
        let store = SnapshotStore::open(&test_config(3, None)).unwrap();
        for i in 0..5 {
            store.insert(snap(i, i as i64)).unwrap();
        }

        assert_eq!(store.len(), 3);
        let rows = store.query(10, QueryOrder::OldestFirst);
        assert_eq!(rows.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_jsonl_survives_reopen() {
        let path = temp_path("reopen");
        {
            let store = SnapshotStore::open(&test_config(100, Some(path.clone()))).unwrap();
            store.insert(snap(7, 0)).unwrap();
            store.insert(snap(8, 1)).unwrap();
        }

        let reopened = SnapshotStore::open(&test_config(100, Some(path.clone()))).unwrap();
        let rows = reopened.query(10, QueryOrder::OldestFirst);
        assert_eq!(rows.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![7, 8]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_lines_are_skipped_on_load() {
        let path = temp_path("malformed");
        let good = serde_json::to_string(&snap(3, 0)).unwrap();
        fs::write(&path, format!("{}\nnot json at all\n\n", good)).unwrap();

        let store = SnapshotStore::open(&test_config(100, Some(path.clone()))).unwrap();
        assert_eq!(store.len(), 1, "only the well-formed line should load");
        assert_eq!(store.query(10, QueryOrder::NewestFirst)[0].epoch, 3);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_respects_retention_cap() {
        let path = temp_path("cap");
        let lines: Vec<String> = (0..5).map(|i| serde_json::to_string(&snap(i, i as i64)).unwrap()).collect();
        fs::write(&path, lines.join("\n")).unwrap();

        let store = SnapshotStore::open(&test_config(2, Some(path.clone()))).unwrap();
        let rows = store.query(10, QueryOrder::OldestFirst);
        assert_eq!(rows.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![3, 4]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let path = temp_path("fresh");
        let store = SnapshotStore::open(&test_config(100, Some(path.clone()))).unwrap();
        assert_eq!(store.len(), 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_failure_is_surfaced_and_row_kept() {
        // The parent directory never exists, so every append must fail
        let parent = std::env::temp_dir()
            .join(format!("stakepulse-noparent-{}", std::process::id()));
        let _ = fs::remove_dir_all(&parent);
        let path = parent.join("rows.jsonl");

        let store = SnapshotStore::open(&test_config(100, Some(path))).unwrap();
        let result = store.insert(snap(1, 0));

        assert!(result.is_err(), "a failed append must be reported to the caller");
        assert_eq!(store.len(), 1, "the in-memory row must survive the failed append");
        assert_eq!(store.write_failures.load(Ordering::Relaxed), 1);
        assert_eq!(store.total_inserted.load(Ordering::Relaxed), 1);
    }
}
