//! Interaction state
//!
//! An interaction owns one root node in the arena plus the bookkeeping that
//! decides when it may finalize.

use crate::context_store::ContextStore;
use crate::node::NodeId;
use crate::record::{Category, ErrorRecord};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Engine-local interaction id. The fresh unique id used for cross-linking
/// is assigned at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(pub u64);

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Open,
    /// Ended, waiting out the resurrection window
    PendingFinalization,
    /// Identity assigned and handlers run; waiting for attached requests
    Finalized,
    Emitted,
    Discarded,
}

/// Callback run with the context store once the interaction finalizes
pub type EndHandler = Box<dyn FnOnce(&ContextStore)>;

pub struct Interaction {
    pub id: InteractionId,

    /// Fresh unique id, set at finalization
    pub browser_interaction_id: Option<String>,

    pub trigger: String,
    pub root: NodeId,
    pub state: InteractionState,

    /// Outstanding continuations
    pub remaining: u32,

    pub ignored: bool,
    pub save: bool,
    pub route_change: bool,

    /// A DOM update was seen after the URL changed
    pub in_progress: bool,

    pub initial_page_load: bool,

    /// Finished by the load event or an explicit end; never resurrected
    pub forced_end: bool,

    pub context_store: ContextStore,
    handlers: Vec<EndHandler>,

    pub old_url: Option<String>,
    pub new_url: Option<String>,
    pub old_route: Option<String>,
    pub new_route: Option<String>,

    pub action_text: Option<String>,
    pub dom_timestamp: Option<Timestamp>,

    /// Latest time any work of this interaction was seen finishing
    pub last_finish: Timestamp,

    /// End chosen by `finish`; copied to the root once finalized
    pub pending_end: Option<Timestamp>,

    pub node_count: usize,

    /// Attached requests that have not resolved yet
    pub inflight_requests: u32,

    pub first_paint: Option<Timestamp>,
    pub first_contentful_paint: Option<Timestamp>,

    /// Errors captured inside this interaction, linked at emission
    pub errors: Vec<ErrorRecord>,

    /// Set when the interaction entered the `Finalized` state
    pub finalized_at: Option<Timestamp>,
}

impl Interaction {
    pub fn new(
        id: InteractionId,
        root: NodeId,
        trigger: impl Into<String>,
        start: Timestamp,
    ) -> Self {
        Self {
            id,
            browser_interaction_id: None,
            trigger: trigger.into(),
            root,
            state: InteractionState::Open,
            remaining: 0,
            ignored: false,
            save: false,
            route_change: false,
            in_progress: false,
            initial_page_load: false,
            forced_end: false,
            context_store: ContextStore::new(),
            handlers: Vec::new(),
            old_url: None,
            new_url: None,
            old_route: None,
            new_route: None,
            action_text: None,
            dom_timestamp: None,
            last_finish: start,
            pending_end: None,
            node_count: 1,
            inflight_requests: 0,
            first_paint: None,
            first_contentful_paint: None,
            errors: Vec::new(),
            finalized_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == InteractionState::Open
    }

    /// Register one pending continuation
    pub fn arm(&mut self) {
        self.remaining += 1;
    }

    /// Resolve one pending continuation. The counter never goes below zero;
    /// an unmatched resolve is logged and ignored.
    pub fn resolve(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(n) => {
                self.remaining = n;
                true
            }
            None => {
                warn!(interaction = %self.id, "remaining counter underflow ignored");
                false
            }
        }
    }

    pub fn bump_finish(&mut self, ts: Timestamp) {
        if ts > self.last_finish {
            self.last_finish = ts;
        }
    }

    /// Ignored work is dropped unless it was saved or changed the route
    pub fn should_discard(&self) -> bool {
        self.ignored && !self.save && !self.route_change
    }

    pub fn category(&self) -> Category {
        if self.initial_page_load {
            Category::InitialPageLoad
        } else if self.route_change {
            Category::RouteChange
        } else {
            Category::Custom
        }
    }

    pub fn on_end(&mut self, handler: EndHandler) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run every registered handler once, in registration order
    pub fn run_handlers(&mut self) {
        let handlers = std::mem::take(&mut self.handlers);
        for handler in handlers {
            handler(&self.context_store);
        }
    }
}

impl fmt::Debug for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("root", &self.root)
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .field("ignored", &self.ignored)
            .field("save", &self.save)
            .field("route_change", &self.route_change)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
