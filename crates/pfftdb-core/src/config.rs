//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::prefix::PrefixPolicy;
use crate::term::vocab;

/// Tunables shared by every graph in a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How long to wait for a graph lock before giving up.
    pub lock_timeout_ms: u64,
    /// Upper bound on fixpoint rounds for a single rule application.
    pub max_inference_iterations: usize,
    /// Optional cap on path length in edges.
    pub max_path_depth: Option<usize>,
    /// Deadline for a single query evaluation.
    pub query_timeout_ms: Option<u64>,
    pub prefix_policy: PrefixPolicy,
    /// Predicates closed by the transitive rule without an explicit
    /// `owl:TransitiveProperty` declaration.
    pub implicit_transitive: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            max_inference_iterations: 64,
            max_path_depth: None,
            query_timeout_ms: None,
            prefix_policy: PrefixPolicy::PassThrough,
            implicit_transitive: vec![
                vocab::RDFS_SUBCLASS_OF.to_string(),
                vocab::RDFS_SUBPROPERTY_OF.to_string(),
            ],
        }
    }
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// A fresh token carrying the query deadline, if one is configured.
    pub fn query_cancellation(&self) -> Cancellation {
        match self.query_timeout_ms {
            Some(ms) => Cancellation::with_timeout(Duration::from_millis(ms)),
            None => Cancellation::new(),
        }
    }
}
