//! DOM events, history, mutations and page lifecycle

use crate::context::Frame;
use crate::tracker::InteractionTracker;
use spa_core::{HarvestSink, InteractionState, NodeId, PaintKind, Timestamp, UiEvent};
use tracing::{debug, trace};

impl<S: HarvestSink> InteractionTracker<S> {
    /// A listener for `event` is about to run. Returns the node it should
    /// resume: the root already opened for this event by an earlier
    /// listener, the active node, or the root of a new interaction when the
    /// event kind qualifies.
    pub fn ui_event_observed(&mut self, event: &UiEvent) -> Option<NodeId> {
        self.advance(event.ts);

        if let Some(root) = self.ui_events.get(&event.id).copied() {
            if self.open_interaction_of(root).is_some() {
                return Some(root);
            }
        }
        if let Some(node) = self.active_node() {
            return Some(node);
        }
        if !self.config.qualifies(&event.kind) {
            trace!(kind = %event.kind, "event kind does not open an interaction");
            return None;
        }

        let id = self.create_interaction(&event.kind, event.ts);
        let ixn = self.interactions.get_mut(&id)?;
        if event.kind == "click" {
            ixn.action_text = event.target_text.clone();
        }
        let root = ixn.root;
        self.ui_events.insert(event.id, root);
        Some(root)
    }

    /// A listener for `event` begins
    pub fn ui_event(&mut self, event: &UiEvent) -> Frame {
        let resume = self.ui_event_observed(event);
        self.callback_start(resume, event.ts)
    }

    /// The page URL changed (pushState, replaceState, popstate, hashchange)
    pub fn url_changed(&mut self, ts: Timestamp, url: impl Into<String>, hash_only: bool) {
        self.advance(ts);

        let url = url.into();
        self.location = Some(url.clone());
        if hash_only && !self.config.track_hash_changes {
            return;
        }

        let target = self
            .active_node()
            .and_then(|n| self.open_interaction_of(n))
            .or_else(|| {
                self.prev_interaction.filter(|id| {
                    self.interactions.get(id).map_or(false, |i| {
                        i.state == InteractionState::PendingFinalization && !i.ignored
                    })
                })
            });
        let Some(ixn) = target.and_then(|id| self.interactions.get_mut(&id)) else {
            return;
        };

        ixn.route_change = ixn.old_url.as_deref() != Some(url.as_str());
        ixn.new_url = Some(url);
        debug!(interaction = %ixn.id, route_change = ixn.route_change, "url changed");
    }

    /// A mutation observer callback saw DOM changes
    pub fn dom_mutation_observed(&mut self, ts: Timestamp) {
        self.advance(ts);

        let Some(ixn) = self
            .active_node()
            .and_then(|n| self.open_interaction_of(n))
            .and_then(|id| self.interactions.get_mut(&id))
        else {
            return;
        };
        ixn.dom_timestamp = Some(ts);
        if ixn.route_change {
            ixn.in_progress = true;
        }
    }

    /// The window load event: loading ends and the initial page load
    /// interaction finishes regardless of pending work
    pub fn page_loaded(&mut self, ts: Timestamp) {
        self.advance(ts);
        self.loading = false;

        let Some(id) = self.initial else {
            return;
        };
        if self.pointer_inside(id) {
            self.current = None;
        }
        if let Some(ixn) = self.interactions.get_mut(&id) {
            if ixn.is_open() {
                ixn.forced_end = true;
            }
        }
        debug!(interaction = %id, ts, "page loaded");
        self.finish(id, ts);
    }

    pub fn paint_observed(&mut self, kind: PaintKind, ts: Timestamp) {
        match kind {
            PaintKind::FirstPaint => self.first_paint = Some(ts),
            PaintKind::FirstContentfulPaint => self.first_contentful_paint = Some(ts),
        }
    }
}
