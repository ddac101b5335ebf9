use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunable parameters for code detection and field matching.
///
/// Every constant the detection pipeline relies on lives here so the
/// thresholds can be adjusted from a YAML file without touching the
/// pattern tables themselves. Defaults match the shipped extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    /// Seconds a detected code stays valid after detection.
    pub freshness_window_secs: u64,
    /// Maximum entries kept in the user-visible code history.
    pub history_cap: usize,
    /// Maximum entries kept in the duplicate-suppression window.
    pub dedup_cap: usize,
    /// Characters inspected before a context keyword during proximity search.
    pub proximity_before: usize,
    /// Characters inspected after a context keyword during proximity search.
    pub proximity_after: usize,
    /// Seconds to keep watching DOM mutations for a late-appearing field.
    pub watch_timeout_secs: u64,
    /// Minimum number of single-character inputs treated as a split-digit group.
    pub group_min: usize,
    /// Maximum number of single-character inputs treated as a split-digit group.
    pub group_max: usize,
    /// Shortest acceptable code.
    pub min_code_len: usize,
    /// Longest acceptable code.
    pub max_code_len: usize,
    /// Code length given priority during extraction and scoring.
    pub preferred_code_len: usize,
    /// Attempt to submit the surrounding form after a successful fill.
    pub auto_submit: bool,
}

impl Default for Heuristics {
    fn default() -> Self {
        Heuristics {
            freshness_window_secs: 600,
            history_cap: 10,
            dedup_cap: 50,
            proximity_before: 50,
            proximity_after: 100,
            watch_timeout_secs: 10,
            group_min: 4,
            group_max: 8,
            min_code_len: 4,
            max_code_len: 8,
            preferred_code_len: 6,
            auto_submit: false,
        }
    }
}

impl Heuristics {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let heuristics: Heuristics = serde_yaml::from_str(&content)?;
        heuristics.validate()?;
        Ok(heuristics)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_code_len == 0 || self.min_code_len > self.max_code_len {
            anyhow::bail!(
                "invalid code length bounds: min={} max={}",
                self.min_code_len,
                self.max_code_len
            );
        }
        if self.group_min < 2 || self.group_min > self.group_max {
            anyhow::bail!(
                "invalid split-group bounds: min={} max={}",
                self.group_min,
                self.group_max
            );
        }
        if self.freshness_window_secs == 0 {
            anyhow::bail!("freshness_window_secs must be positive");
        }
        Ok(())
    }

    /// Freshness window in epoch milliseconds, the unit timestamps are stored in.
    pub fn freshness_window_ms(&self) -> i64 {
        self.freshness_window_secs as i64 * 1000
    }
}
