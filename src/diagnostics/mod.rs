//! Diagnostics and statistics
//!
//! This module provides per-run counters and serialisable trace summaries.

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};

/// Counters for a single run of a trace
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Records created (first visit or discarded as stale)
    pub created: usize,
    /// Records reused without rescoring
    pub reused: usize,
    /// Records reused and rescored under new parameters
    pub reparameterized: usize,
    /// Records removed because the run did not reach them
    pub reclaimed: usize,
    /// Lookups that hit an address already visited in the same run
    pub revisits: usize,
    /// Factors added
    pub factors: usize,
}

impl RunStats {
    /// Number of choice-point lookups in the run
    pub fn lookups(&self) -> usize {
        self.created + self.reused + self.reparameterized
    }
}

/// Summary of one record, for reporting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Rendered address
    pub address: String,
    /// ERP name
    pub erp: String,
    /// Rendered value
    pub value: String,
    /// Log-density of the value
    pub log_density: f64,
    /// Whether the choice is structural
    pub structural: bool,
    /// Whether the value is observed
    pub conditioned: bool,
}

/// Snapshot of a trace's bookkeeping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Joint log-probability
    pub log_prob: f64,
    /// Log-probability of records created by the last run
    pub new_log_prob: f64,
    /// Log-probability of records reclaimed by the last run
    pub old_log_prob: f64,
    /// Whether all hard constraints held
    pub conditions_satisfied: bool,
    /// Number of structural free choices
    pub structural: usize,
    /// Number of non-structural free choices
    pub nonstructural: usize,
    /// Number of observed choices
    pub conditioned: usize,
    /// Counters of the last run
    pub last_run: RunStats,
    /// Records, ordered by address
    pub records: Vec<RecordSummary>,
}

impl TraceSummary {
    /// Total number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the trace holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> TraceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> TraceResult<Self> {
        serde_json::from_str(json).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    /// Human-readable one-paragraph summary
    pub fn summary(&self) -> String {
        format!(
            "records: {} ({} structural, {} non-structural, {} observed)\n\
             log prob: {:.4} (new {:.4}, old {:.4})\n\
             conditions satisfied: {}",
            self.len(),
            self.structural,
            self.nonstructural,
            self.conditioned,
            self.log_prob,
            self.new_log_prob,
            self.old_log_prob,
            self.conditions_satisfied
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> TraceSummary {
        TraceSummary {
            log_prob: -1.5,
            new_log_prob: -0.5,
            old_log_prob: 0.0,
            conditions_satisfied: true,
            structural: 1,
            nonstructural: 0,
            conditioned: 0,
            last_run: RunStats {
                created: 1,
                ..RunStats::default()
            },
            records: vec![RecordSummary {
                address: "root#0@'n'".to_string(),
                erp: "uniform_int".to_string(),
                value: "1".to_string(),
                log_density: -1.5,
                structural: true,
                conditioned: false,
            }],
        }
    }

    #[test]
    fn test_lookups_counts_all_resolutions() {
        let stats = RunStats {
            created: 2,
            reused: 3,
            reparameterized: 1,
            ..RunStats::default()
        };
        assert_eq!(stats.lookups(), 6);
    }

    #[test]
    fn test_json_roundtrip() {
        let original = summary();
        let json = original.to_json().unwrap();
        let restored = TraceSummary::from_json(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_bad_json_is_serialization_error() {
        let err = TraceSummary::from_json("{").unwrap_err();
        assert!(matches!(err, TraceError::Serialization(_)));
    }

    #[test]
    fn test_summary_text() {
        let text = summary().summary();
        assert!(text.contains("records: 1 (1 structural"));
        assert!(text.contains("conditions satisfied: true"));
    }
}
