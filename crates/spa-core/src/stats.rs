//! Engine counters
//!
//! The engine is single threaded, so these are plain integers owned by the
//! tracker and copied out on request.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub interactions_created: u64,
    pub interactions_emitted: u64,
    pub interactions_discarded: u64,
    pub interactions_resurrected: u64,

    /// Requests reported to the standalone buffer
    pub standalone_ajax: u64,

    /// Callbacks that ran with no node to attribute them to
    pub unattributed_callbacks: u64,

    /// Timers not attached because the frame's budget was spent
    pub timers_over_budget: u64,

    /// Children refused because the tree hit its node cap
    pub nodes_over_cap: u64,

    pub errors_captured: u64,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interactions that have neither been emitted nor discarded yet
    pub fn interactions_live(&self) -> u64 {
        self.interactions_created
            .saturating_sub(self.interactions_emitted + self.interactions_discarded)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "interactions": {
                "created": self.interactions_created,
                "emitted": self.interactions_emitted,
                "discarded": self.interactions_discarded,
                "resurrected": self.interactions_resurrected,
                "live": self.interactions_live(),
            },
            "standalone_ajax": self.standalone_ajax,
            "unattributed_callbacks": self.unattributed_callbacks,
            "timers_over_budget": self.timers_over_budget,
            "nodes_over_cap": self.nodes_over_cap,
            "errors_captured": self.errors_captured,
        })
    }
}

impl fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} interactions ({} emitted, {} discarded, {} resurrected), {} standalone ajax, {} errors",
            self.interactions_created,
            self.interactions_emitted,
            self.interactions_discarded,
            self.interactions_resurrected,
            self.standalone_ajax,
            self.errors_captured,
        )
    }
}
