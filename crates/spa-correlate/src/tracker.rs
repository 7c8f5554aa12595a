//! The interaction tracker
//!
//! One tracker exists per page. It owns the node arena, every live
//! interaction, the context pointer and the handle maps the adapters use to
//! find their way back to a node when async work resumes.

use spa_core::node::AjaxAttrs;
use spa_core::{
    Clock, ErrorRecord, EventId, HarvestSink, Interaction, InteractionId, InteractionState, Node,
    NodeArena, NodeId, NodeKind, RequestHandle, ScriptHandle, TimerId, Timestamp, TrackerConfig,
    TrackerStats,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A timer armed inside an interaction
#[derive(Debug, Clone)]
pub(crate) struct PendingTimer {
    pub interaction: InteractionId,
    /// Node the callback resumes
    pub resume: NodeId,
    /// Node created for the timer itself when timers are traced
    pub timer_node: Option<NodeId>,
}

/// An xhr or fetch request seen by the network adapter
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    /// Ajax node, when the request was attached
    pub node: Option<NodeId>,
    pub method: String,
    pub url: String,
    pub created: Timestamp,
    pub sent: Option<Timestamp>,
    /// Whether the request holds its interaction open
    pub armed: bool,
}

/// A fetch body read that holds an interaction open
#[derive(Debug, Clone)]
pub(crate) struct PendingBody {
    pub interaction: InteractionId,
    pub resume: NodeId,
}

/// An inserted JSONP script
#[derive(Debug, Clone)]
pub(crate) struct PendingScript {
    pub interaction: InteractionId,
    pub node: NodeId,
}

/// Correlates boundary events into interaction trees
pub struct InteractionTracker<S: HarvestSink> {
    pub(crate) config: TrackerConfig,
    pub(crate) sink: S,
    pub(crate) clock: Box<dyn Clock>,

    pub(crate) arena: NodeArena,
    pub(crate) interactions: BTreeMap<InteractionId, Interaction>,
    next_interaction: u64,

    /// The context pointer
    pub(crate) current: Option<NodeId>,
    /// Time spent in nested frames of the active frame
    pub(crate) child_time: f64,
    /// Timer budget left in the active frame
    pub(crate) budget: f64,

    /// True until the window load event
    pub(crate) loading: bool,
    pub(crate) initial: Option<InteractionId>,

    /// Last interaction to finish, candidate for resurrection
    pub(crate) prev_interaction: Option<InteractionId>,

    pub(crate) location: Option<String>,
    pub(crate) route_name: Option<String>,
    pub(crate) first_paint: Option<Timestamp>,
    pub(crate) first_contentful_paint: Option<Timestamp>,

    pub(crate) timers: HashMap<TimerId, PendingTimer>,
    pub(crate) requests: HashMap<RequestHandle, PendingRequest>,
    pub(crate) bodies: HashMap<RequestHandle, PendingBody>,
    pub(crate) scripts: HashMap<ScriptHandle, PendingScript>,
    pub(crate) ui_events: HashMap<EventId, NodeId>,

    pub(crate) stats: TrackerStats,
}

impl<S: HarvestSink> InteractionTracker<S> {
    /// Create a tracker. Unless disabled, the initial page load interaction
    /// is opened at the clock's current reading and stays open until
    /// `page_loaded`.
    pub fn new(config: TrackerConfig, sink: S, clock: Box<dyn Clock>) -> Self {
        let budget = config.timer_budget_ms;
        let mut tracker = Self {
            config,
            sink,
            clock,
            arena: NodeArena::new(),
            interactions: BTreeMap::new(),
            next_interaction: 0,
            current: None,
            child_time: 0.0,
            budget,
            loading: true,
            initial: None,
            prev_interaction: None,
            location: None,
            route_name: None,
            first_paint: None,
            first_contentful_paint: None,
            timers: HashMap::new(),
            requests: HashMap::new(),
            bodies: HashMap::new(),
            scripts: HashMap::new(),
            ui_events: HashMap::new(),
            stats: TrackerStats::new(),
        };

        if tracker.config.initial_page_load {
            let start = tracker.clock.now();
            let id = tracker.create_interaction("initialPageLoad", start);
            if let Some(ixn) = tracker.interactions.get_mut(&id) {
                ixn.initial_page_load = true;
                // Held open until the load event forces it to finish
                ixn.arm();
            }
            tracker.initial = Some(id);
        }

        tracker
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn initial_interaction(&self) -> Option<InteractionId> {
        self.initial
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn interaction_of(&self, node: NodeId) -> Option<InteractionId> {
        self.arena.interaction_of(node)
    }

    pub fn get_interaction(&self, id: InteractionId) -> Option<&Interaction> {
        self.interactions.get(&id)
    }

    /// State of a live interaction. Emitted and discarded interactions are
    /// reclaimed, so this returns `None` for them.
    pub fn interaction_state(&self, id: InteractionId) -> Option<InteractionState> {
        self.interactions.get(&id).map(|i| i.state)
    }

    /// Number of interactions not yet emitted or discarded
    pub fn live_interactions(&self) -> usize {
        self.interactions.len()
    }

    pub fn live_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Page URL used as the old URL of new interactions
    pub fn set_location(&mut self, url: impl Into<String>) {
        let url = url.into();
        if let Some(ixn) = self.initial.and_then(|id| self.interactions.get_mut(&id)) {
            if ixn.old_url.is_none() {
                ixn.old_url = Some(url.clone());
            }
        }
        self.location = Some(url);
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Route name captured as the old route of new interactions and the new
    /// route of finishing ones
    pub fn set_current_route_name(&mut self, name: impl Into<String>) {
        self.route_name = Some(name.into());
    }

    pub(crate) fn create_interaction(&mut self, trigger: &str, start: Timestamp) -> InteractionId {
        self.next_interaction += 1;
        let id = InteractionId(self.next_interaction);
        let root = self.arena.insert_root(id, NodeKind::Interaction, start);
        if let Some(node) = self.arena.get_mut(root) {
            node.attrs.trigger = Some(trigger.to_string());
        }

        let mut ixn = Interaction::new(id, root, trigger, start);
        ixn.old_url = self.location.clone();
        ixn.new_url = self.location.clone();
        ixn.old_route = self.route_name.clone();
        self.interactions.insert(id, ixn);
        self.stats.interactions_created += 1;

        debug!(interaction = %id, trigger, start, "interaction created");
        id
    }

    /// Interaction of a node, only while that interaction is still open
    pub(crate) fn open_interaction_of(&self, node: NodeId) -> Option<InteractionId> {
        let id = self.arena.interaction_of(node)?;
        self.interactions
            .get(&id)
            .filter(|i| i.is_open())
            .map(|i| i.id)
    }

    /// The context pointer, if it points into an open interaction
    pub(crate) fn active_node(&self) -> Option<NodeId> {
        self.current
            .filter(|node| self.open_interaction_of(*node).is_some())
    }

    pub(crate) fn pointer_inside(&self, id: InteractionId) -> bool {
        self.current.and_then(|n| self.arena.interaction_of(n)) == Some(id)
    }

    /// Attach a child node, honouring the per-interaction node cap
    pub(crate) fn attach(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        start: Timestamp,
    ) -> Option<NodeId> {
        let ixn_id = self.arena.interaction_of(parent)?;
        let ixn = self.interactions.get_mut(&ixn_id)?;
        if ixn.node_count >= self.config.max_nodes_per_interaction {
            self.stats.nodes_over_cap += 1;
            debug!(interaction = %ixn_id, ?kind, "node cap reached, work left unattributed");
            return None;
        }
        let id = self.arena.attach_child(parent, kind, start)?;
        ixn.node_count += 1;
        Some(id)
    }

    pub(crate) fn attach_ajax(
        &mut self,
        parent: NodeId,
        start: Timestamp,
        attrs: AjaxAttrs,
    ) -> Option<NodeId> {
        let id = self.attach(parent, NodeKind::Ajax, start)?;
        if let Some(node) = self.arena.get_mut(id) {
            node.attrs.ajax = Some(attrs);
        }
        Some(id)
    }

    /// Capture an error raised by host code running on behalf of `node`
    pub(crate) fn record_error(&mut self, node: Option<NodeId>, message: String, ts: Timestamp) {
        self.stats.errors_captured += 1;
        let record = ErrorRecord {
            interaction_id: None,
            node_id: node.map(|n| n.0),
            message,
            ts,
        };

        let owner = node
            .and_then(|n| self.arena.interaction_of(n))
            .and_then(|id| self.interactions.get_mut(&id));
        match owner {
            Some(ixn) => ixn.errors.push(record),
            None => self.sink.add_error(record),
        }
    }
}

impl<S: HarvestSink> std::fmt::Debug for InteractionTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionTracker")
            .field("current", &self.current)
            .field("loading", &self.loading)
            .field("interactions", &self.interactions.len())
            .field("nodes", &self.arena.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
