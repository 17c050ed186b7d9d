//! Trace configuration

use serde::{Deserialize, Serialize};

/// Configuration for a random execution trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Run rejection initialisation on construction
    pub rejection_init: bool,
    /// Attempts allowed for rejection initialisation (`None` = unbounded)
    pub max_rejection_attempts: Option<usize>,
    /// Seed for the trace's random stream (`None` = from entropy)
    pub seed: Option<u64>,
    /// Fail a run that visits one address twice instead of warning
    pub strict_addressing: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            rejection_init: true,
            max_rejection_attempts: Some(10_000),
            seed: None,
            strict_addressing: false,
        }
    }
}

impl TraceConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable rejection initialisation
    pub fn with_rejection_init(mut self, enabled: bool) -> Self {
        self.rejection_init = enabled;
        self
    }

    /// Bound rejection initialisation to `attempts` runs
    pub fn with_max_rejection_attempts(mut self, attempts: usize) -> Self {
        self.max_rejection_attempts = Some(attempts);
        self
    }

    /// Let rejection initialisation run until it succeeds
    pub fn unbounded_rejection(mut self) -> Self {
        self.max_rejection_attempts = None;
        self
    }

    /// Seed the trace's random stream
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable or disable strict addressing
    pub fn with_strict_addressing(mut self, enabled: bool) -> Self {
        self.strict_addressing = enabled;
        self
    }
}
