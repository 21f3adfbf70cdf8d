//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for one model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default completion cap of the `generate` node.
pub const DEFAULT_GENERATE_MAX_TOKENS: usize = 512;

/// What a second caller gets while a turn on the same conversation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait for the running turn, then run on its result
    #[default]
    Queue,
    /// Fail immediately with `ConcurrentWriteConflict`
    Reject,
}

impl std::str::FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(BusyPolicy::Queue),
            "reject" => Ok(BusyPolicy::Reject),
            other => Err(format!("unknown busy policy '{}', expected queue or reject", other)),
        }
    }
}

/// Tunables shared by the turn executor and session manager.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_timeout: Duration,
    pub generate_max_tokens: Option<usize>,
    pub busy_policy: BusyPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            generate_max_tokens: Some(DEFAULT_GENERATE_MAX_TOKENS),
            busy_policy: BusyPolicy::Queue,
        }
    }
}

impl EngineConfig {
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_generate_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.generate_max_tokens = max_tokens;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }
}
