//! Finalization and emission

use crate::tracker::InteractionTracker;
use spa_core::{
    HarvestSink, InteractionId, InteractionRecord, InteractionState, NodeId, NodeRecord,
    Timestamp,
};
use tracing::{debug, warn};
use ulid::Ulid;

impl<S: HarvestSink> InteractionTracker<S> {
    /// Fix the end time, assign the unique id, run `onEnd` handlers and
    /// decide between emit and discard
    pub(crate) fn finalize(&mut self, id: InteractionId, now: Timestamp) {
        let first_paint = self.first_paint;
        let first_contentful_paint = self.first_contentful_paint;

        let Some(ixn) = self.interactions.get_mut(&id) else {
            return;
        };
        if ixn.state != InteractionState::PendingFinalization {
            return;
        }

        let end = ixn.pending_end.unwrap_or(ixn.last_finish);
        let root = ixn.root;
        ixn.state = InteractionState::Finalized;
        ixn.finalized_at = Some(now);
        ixn.browser_interaction_id = Some(Ulid::new().to_string());
        if ixn.initial_page_load {
            ixn.first_paint = first_paint;
            ixn.first_contentful_paint = first_contentful_paint;
        }
        ixn.run_handlers();

        let discard = ixn.should_discard();
        let inflight = ixn.inflight_requests;

        if !self.arena.end_node(root, end) {
            warn!(interaction = %id, "root end was already set");
        }
        if self.prev_interaction == Some(id) {
            self.prev_interaction = None;
        }

        if discard {
            self.discard(id);
        } else if inflight > 0 {
            debug!(interaction = %id, inflight, "finalized, waiting for requests to settle");
        } else {
            self.emit(id);
        }
    }

    /// Hand a finalized interaction to the harvest sink
    pub(crate) fn emit(&mut self, id: InteractionId) {
        let Some(mut ixn) = self.interactions.remove(&id) else {
            return;
        };
        let Some(root) = self.snapshot(ixn.root) else {
            warn!(interaction = %id, "root node missing at emission");
            return;
        };

        let unique_id = ixn
            .browser_interaction_id
            .clone()
            .unwrap_or_else(|| Ulid::new().to_string());
        let record = InteractionRecord {
            id: unique_id.clone(),
            category: ixn.category(),
            trigger: ixn.trigger.clone(),
            start: root.start,
            end: root.end.unwrap_or(ixn.last_finish),
            ignored: ixn.ignored,
            save: ixn.save,
            route_change: ixn.route_change,
            in_progress: ixn.in_progress,
            old_url: ixn.old_url.take(),
            new_url: ixn.new_url.take(),
            old_route: ixn.old_route.take(),
            new_route: ixn.new_route.take(),
            action_text: ixn.action_text.take(),
            dom_timestamp: ixn.dom_timestamp,
            first_paint: ixn.first_paint,
            first_contentful_paint: ixn.first_contentful_paint,
            root,
        };

        debug!(
            interaction = %id,
            unique_id = %record.id,
            category = ?record.category,
            nodes = record.root.size(),
            "interaction emitted"
        );
        self.sink.add_interaction(record);
        for mut error in ixn.errors.drain(..) {
            error.interaction_id = Some(unique_id.clone());
            self.sink.add_error(error);
        }

        ixn.state = InteractionState::Emitted;
        self.stats.interactions_emitted += 1;
        self.reclaim(id, ixn.root);
    }

    /// Drop an interaction silently. Its errors are still reported, unlinked.
    pub(crate) fn discard(&mut self, id: InteractionId) {
        let Some(mut ixn) = self.interactions.remove(&id) else {
            return;
        };
        for error in ixn.errors.drain(..) {
            self.sink.add_error(error);
        }
        ixn.state = InteractionState::Discarded;
        self.stats.interactions_discarded += 1;
        debug!(interaction = %id, trigger = %ixn.trigger, "interaction discarded");
        self.reclaim(id, ixn.root);
    }

    /// Free the interaction's nodes and every handle that pointed into them
    fn reclaim(&mut self, id: InteractionId, root: NodeId) {
        let freed = self.arena.remove_tree(root);
        self.ui_events
            .retain(|_, node| self.arena.contains(*node));
        self.timers.retain(|_, t| t.interaction != id);
        self.bodies.retain(|_, b| b.interaction != id);
        self.scripts.retain(|_, s| s.interaction != id);
        if self.initial == Some(id) {
            self.initial = None;
        }
        if self
            .current
            .map_or(false, |node| !self.arena.contains(node))
        {
            self.current = None;
        }
        debug!(interaction = %id, freed, "nodes reclaimed");
    }

    fn snapshot(&self, id: NodeId) -> Option<NodeRecord> {
        let node = self.arena.get(id)?;
        Some(NodeRecord {
            id: node.id.0,
            kind: node.kind,
            start: node.start,
            end: node.end,
            js_end: node.js_end,
            js_time: node.js_time,
            attrs: node.attrs.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.snapshot(*child))
                .collect(),
        })
    }
}
