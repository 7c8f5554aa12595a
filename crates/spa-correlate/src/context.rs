//! Context pointer protocol
//!
//! The browser has no call stack across async boundaries, so every
//! instrumented callback brackets itself with `callback_start` and
//! `callback_end`. Everything the outer frame needs back on exit lives in the
//! `Frame` token returned by `callback_start`, never in tracker fields, so a
//! synchronously nested instrumented call cannot corrupt the outer frame.

use crate::tracker::InteractionTracker;
use spa_core::{HarvestSink, NodeId, Timestamp};
use tracing::{trace, warn};

/// Per-invocation state of one instrumented callback
#[derive(Debug)]
#[must_use = "a frame must be closed with callback_end"]
pub struct Frame {
    prev: Option<NodeId>,
    node: Option<NodeId>,
    start: Timestamp,
    saved_child_time: f64,
    saved_budget: f64,
    /// Node closed when the frame exits (traced timers)
    pub(crate) end_node: Option<NodeId>,
}

impl Frame {
    /// Node the callback runs on behalf of, if any
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }
}

impl<S: HarvestSink> InteractionTracker<S> {
    pub fn current_node(&self) -> Option<NodeId> {
        self.current
    }

    /// Move the context pointer.
    ///
    /// With no node, the pointer falls back to the initial load root while
    /// the page is still loading. A node whose interaction is no longer open
    /// is not adopted. Leaving an interaction runs its finish check.
    pub fn set_current_node(&mut self, node: Option<NodeId>) {
        let target = node.or_else(|| self.loading_root());
        let adopted = target.filter(|n| self.open_interaction_of(*n).is_some());
        if target.is_some() && adopted.is_none() {
            trace!(node = ?target, "not adopting node of a closed interaction");
        }

        let left = self.current.and_then(|n| self.arena.interaction_of(n));
        self.current = adopted;
        let entered = adopted.and_then(|n| self.arena.interaction_of(n));

        if let Some(left) = left {
            if Some(left) != entered {
                self.check_finish(left);
            }
        }
    }

    fn loading_root(&self) -> Option<NodeId> {
        if !self.loading {
            return None;
        }
        self.initial
            .and_then(|id| self.interactions.get(&id))
            .map(|ixn| ixn.root)
    }

    /// Enter an instrumented callback that resumes `resume`
    pub fn callback_start(&mut self, resume: Option<NodeId>, ts: Timestamp) -> Frame {
        self.advance(ts);

        let prev = self.current;
        let saved_child_time = std::mem::replace(&mut self.child_time, 0.0);
        let saved_budget = std::mem::replace(&mut self.budget, self.config.timer_budget_ms);

        self.set_current_node(resume);
        if self.current.is_none() {
            self.stats.unattributed_callbacks += 1;
        }
        trace!(node = ?self.current, ts, "callback start");

        Frame {
            prev,
            node: self.current,
            start: ts,
            saved_child_time,
            saved_budget,
            end_node: None,
        }
    }

    /// Leave an instrumented callback.
    ///
    /// The frame's exclusive time (its wall time minus time spent in nested
    /// frames) is charged to the node it ran on behalf of, then the pointer
    /// is restored to where it was before entry.
    pub fn callback_end(&mut self, frame: Frame, ts: Timestamp) {
        let total = if ts >= frame.start {
            ts - frame.start
        } else {
            warn!(start = frame.start, end = ts, "callback ended before it started");
            0.0
        };
        let exclusive = (total - self.child_time).max(0.0);
        self.child_time = frame.saved_child_time + total;
        self.budget = frame.saved_budget;

        if let Some(node) = frame.node {
            self.charge(node, exclusive, ts);
        }
        if let Some(end_node) = frame.end_node {
            self.arena.end_node(end_node, ts);
        }

        trace!(node = ?frame.node, exclusive, ts, "callback end");
        self.set_current_node(frame.prev);
        self.advance(ts);
    }

    /// Run `f` as an instrumented callback on behalf of `node`, timed by the
    /// tracker's clock
    pub fn run_in<T>(&mut self, node: Option<NodeId>, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = self.clock.now();
        let frame = self.callback_start(node, start);
        let result = f(self);
        let end = self.clock.now();
        self.callback_end(frame, end);
        result
    }

    fn charge(&mut self, node: NodeId, exclusive: f64, ts: Timestamp) {
        let Some(ixn_id) = self.open_interaction_of(node) else {
            return;
        };
        if let Some(n) = self.arena.get_mut(node) {
            n.js_time += exclusive;
            n.js_end = Some(n.js_end.map_or(ts, |end| end.max(ts)));
        }
        if let Some(ixn) = self.interactions.get_mut(&ixn_id) {
            ixn.bump_finish(ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::InteractionTracker;
    use spa_core::{CollectingSink, ManualClock, TrackerConfig, UiEvent};

    fn tracker() -> InteractionTracker<CollectingSink> {
        let config = TrackerConfig {
            initial_page_load: false,
            ..Default::default()
        };
        InteractionTracker::new(config, CollectingSink::new(), Box::new(ManualClock::new(0.0)))
    }

    #[test]
    fn test_pointer_defaults_to_initial_root_while_loading() {
        let mut tracker = InteractionTracker::new(
            TrackerConfig::default(),
            CollectingSink::new(),
            Box::new(ManualClock::new(0.0)),
        );
        let initial = tracker.initial_interaction().unwrap();
        let root = tracker.get_interaction(initial).unwrap().root;

        tracker.set_current_node(None);
        assert_eq!(tracker.current_node(), Some(root));

        tracker.page_loaded(10.0);
        tracker.set_current_node(None);
        assert_eq!(tracker.current_node(), None);
    }

    #[test]
    fn test_exclusive_time_excludes_nested_frames() {
        let mut tracker = tracker();
        let outer = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let root = outer.node().unwrap();

        let req = spa_core::RequestHandle(1);
        tracker.new_xhr(req, 101.0);
        tracker.xhr_send(req, "GET", "/a", 101.0);
        let ajax = tracker.node(root).unwrap().children[0];

        // nested synchronous callback running on behalf of the ajax node
        let inner = tracker.request_callback(req, 102.0);
        tracker.callback_end(inner, 106.0);

        tracker.callback_end(outer, 110.0);

        assert_eq!(tracker.node(root).unwrap().js_time, 6.0);
        assert_eq!(tracker.node(ajax).unwrap().js_time, 4.0);
        assert_eq!(tracker.node(root).unwrap().js_end, Some(110.0));
    }

    #[test]
    fn test_nested_frames_restore_outer_pointer() {
        let mut tracker = tracker();
        let outer = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let root = outer.node();

        let inner = tracker.callback_start(None, 101.0);
        assert_eq!(tracker.current_node(), None);
        tracker.callback_end(inner, 102.0);

        assert_eq!(tracker.current_node(), root);
        tracker.callback_end(outer, 103.0);
        assert_eq!(tracker.current_node(), None);
    }

    #[test]
    fn test_unattributed_callback_counted() {
        let mut tracker = tracker();
        let frame = tracker.callback_start(None, 5.0);
        assert!(frame.node().is_none());
        tracker.callback_end(frame, 6.0);
        assert_eq!(tracker.stats().unattributed_callbacks, 1);
    }

    #[test]
    fn test_finalized_node_is_not_adopted() {
        let mut tracker = tracker();
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let root = frame.node().unwrap();
        tracker.callback_end(frame, 101.0);
        tracker.flush(101.0);

        tracker.set_current_node(Some(root));
        assert_eq!(tracker.current_node(), None);
    }
}
