//! Custom tracers
//!
//! A tracer holds its interaction open from creation until it is invoked.
//! Invoking it with a callback runs that callback as an instrumented frame on
//! behalf of the tracer's node; invoking it without one is a plain marker.

use crate::api::InteractionApi;
use crate::context::Frame;
use crate::tracker::InteractionTracker;
use spa_core::{HarvestSink, InteractionId, NodeId, NodeKind, Timestamp};
use std::fmt::Display;
use tracing::{debug, trace};

/// Handle returned by `create_tracer`
#[derive(Debug)]
pub struct Tracer {
    interaction: InteractionId,
    /// `customTracer` node, named tracers only
    node: Option<NodeId>,
    /// Node active when the tracer was created
    parent: NodeId,
    pending: bool,
}

impl Tracer {
    pub fn interaction(&self) -> InteractionId {
        self.interaction
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Whether the tracer still holds its interaction open
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

impl<'a, S: HarvestSink> InteractionApi<'a, S> {
    /// Create a tracer in this interaction. Named tracers get a timed
    /// `customTracer` child starting now.
    pub fn create_tracer(&mut self, name: Option<&str>) -> Tracer {
        let id = self.id();
        let ts = self.ts();
        self.tracker().create_tracer_in(id, name, ts)
    }
}

impl<S: HarvestSink> InteractionTracker<S> {
    /// Create a tracer in the interaction bound to the current context
    pub fn create_tracer(&mut self, name: Option<&str>, ts: Timestamp) -> Tracer {
        self.interaction(ts).create_tracer(name)
    }

    fn create_tracer_in(
        &mut self,
        interaction: InteractionId,
        name: Option<&str>,
        ts: Timestamp,
    ) -> Tracer {
        let root = self.interactions.get(&interaction).map(|i| i.root);
        let parent = self
            .active_node()
            .filter(|n| self.arena.interaction_of(*n) == Some(interaction))
            .or(root);

        let Some(parent) = parent else {
            return Tracer {
                interaction,
                node: None,
                parent: NodeId(0),
                pending: false,
            };
        };

        let node = match name {
            Some(name) => {
                let node = self.attach(parent, NodeKind::CustomTracer, ts);
                if let Some(n) = node.and_then(|n| self.arena.get_mut(n)) {
                    n.attrs.custom_name = Some(name.to_string());
                }
                node
            }
            None => None,
        };
        let pending = self.arm(interaction);
        debug!(interaction = %interaction, name = ?name, ?node, "tracer created");

        Tracer {
            interaction,
            node,
            parent,
            pending,
        }
    }

    /// The tracer's callback begins
    pub fn tracer_enter(&mut self, tracer: &Tracer, ts: Timestamp) -> Frame {
        let resume = tracer.node.unwrap_or(tracer.parent);
        self.callback_start(Some(resume), ts)
    }

    /// The tracer's callback returned, or failed with `error`. Timing is
    /// closed the same way in both cases.
    pub fn tracer_exit(
        &mut self,
        tracer: &mut Tracer,
        frame: Frame,
        ts: Timestamp,
        error: Option<String>,
    ) {
        if let Some(message) = error {
            let at = frame.node().or(tracer.node);
            self.record_error(at, message, ts);
        }
        self.settle_tracer(tracer, ts);
        self.callback_end(frame, ts);
    }

    /// Invoke a tracer created without a callback
    pub fn tracer_end(&mut self, tracer: &mut Tracer, ts: Timestamp) {
        self.advance(ts);
        self.settle_tracer(tracer, ts);
    }

    /// Run `f` as the tracer's callback, timed by the tracker's clock. An
    /// error is recorded against the tracer's node and returned as is.
    pub fn tracer_call<T, E, F>(&mut self, tracer: &mut Tracer, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let start = self.clock.now();
        let frame = self.tracer_enter(tracer, start);
        let result = f(self);
        let error = result.as_ref().err().map(ToString::to_string);
        let end = self.clock.now();
        self.tracer_exit(tracer, frame, end, error);
        result
    }

    fn settle_tracer(&mut self, tracer: &mut Tracer, ts: Timestamp) {
        if let Some(node) = tracer.node {
            self.arena.end_node(node, ts);
        }
        if !std::mem::replace(&mut tracer.pending, false) {
            trace!(interaction = %tracer.interaction, "tracer already settled");
            return;
        }
        self.resolve(tracer.interaction, ts);
    }
}

#[cfg(test)]
mod tests {
    use crate::InteractionTracker;
    use spa_core::{
        CollectingSink, InteractionState, ManualClock, NodeKind, TrackerConfig, UiEvent,
    };

    fn tracker(clock: ManualClock) -> InteractionTracker<CollectingSink> {
        let config = TrackerConfig {
            initial_page_load: false,
            ..Default::default()
        };
        InteractionTracker::new(config, CollectingSink::new(), Box::new(clock))
    }

    #[test]
    fn test_named_tracer_spans_creation_to_callback_end() {
        let mut tracker = tracker(ManualClock::new(0.0));
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let id = tracker.interaction_of(frame.node().unwrap()).unwrap();
        let mut tracer = tracker.create_tracer(Some("loadCart"), 101.0);
        tracker.callback_end(frame, 102.0);
        assert_eq!(tracker.interaction_state(id), Some(InteractionState::Open));

        let cb = tracker.tracer_enter(&tracer, 150.0);
        assert_eq!(cb.node(), tracer.node());
        tracker.tracer_exit(&mut tracer, cb, 158.0, None);
        assert!(!tracer.is_pending());

        tracker.flush(200.0);
        let record = &tracker.sink().interactions[0];
        assert_eq!(record.end, 158.0);
        let child = &record.children()[0];
        assert_eq!(child.kind, NodeKind::CustomTracer);
        assert_eq!(child.attrs.custom_name.as_deref(), Some("loadCart"));
        assert_eq!(child.start, 101.0);
        assert_eq!(child.end, Some(158.0));
        assert_eq!(child.js_time, 8.0);
    }

    #[test]
    fn test_tracer_call_returns_error_unchanged() {
        let clock = ManualClock::new(100.0);
        let mut tracker = tracker(clock.clone());
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let mut tracer = tracker.create_tracer(Some("submitOrder"), 100.0);
        let tracer_node = tracer.node().unwrap();
        tracker.callback_end(frame, 101.0);

        clock.set(120.0);
        let result: Result<(), String> = tracker.tracer_call(&mut tracer, |_| {
            clock.advance(5.0);
            Err("payment declined".to_string())
        });
        assert_eq!(result, Err("payment declined".to_string()));

        tracker.flush(200.0);
        let sink = tracker.sink();
        let record = &sink.interactions[0];
        assert_eq!(record.end, 125.0);
        assert_eq!(record.children()[0].js_time, 5.0);

        assert_eq!(sink.errors.len(), 1);
        let error = &sink.errors[0];
        assert_eq!(error.message, "payment declined");
        assert_eq!(error.node_id, Some(tracer_node.0));
        assert_eq!(error.interaction_id.as_deref(), Some(record.id.as_str()));
        assert_eq!(tracker.stats().errors_captured, 1);
    }

    #[test]
    fn test_tracer_call_passes_value_through() {
        let clock = ManualClock::new(10.0);
        let mut tracker = tracker(clock.clone());
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 10.0));
        let mut tracer = tracker.create_tracer(None, 10.0);
        tracker.callback_end(frame, 11.0);

        clock.set(20.0);
        let value: Result<u32, String> = tracker.tracer_call(&mut tracer, |t| {
            assert!(t.current_node().is_some());
            Ok(42)
        });
        assert_eq!(value, Ok(42));
        assert!(tracker.sink().errors.is_empty());
    }

    #[test]
    fn test_unnamed_tracer_marker() {
        let mut tracker = tracker(ManualClock::new(0.0));
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let id = tracker.interaction_of(frame.node().unwrap()).unwrap();
        let mut tracer = tracker.create_tracer(None, 100.0);
        assert!(tracer.node().is_none());
        tracker.callback_end(frame, 101.0);

        tracker.tracer_end(&mut tracer, 130.0);
        assert_eq!(
            tracker.interaction_state(id),
            Some(InteractionState::PendingFinalization)
        );
        // a second invocation has nothing left to resolve
        tracker.tracer_end(&mut tracer, 140.0);

        tracker.flush(200.0);
        let record = &tracker.sink().interactions[0];
        assert_eq!(record.end, 130.0);
        assert!(record.children().is_empty());
    }

    #[test]
    fn test_uninvoked_tracer_does_not_block_page_load() {
        let mut tracker = InteractionTracker::new(
            TrackerConfig::default(),
            CollectingSink::new(),
            Box::new(ManualClock::new(0.0)),
        );
        let frame = tracker.callback_start(None, 5.0);
        let tracer = tracker.create_tracer(None, 5.0);
        assert!(tracer.is_pending());
        assert_eq!(Some(tracer.interaction()), tracker.initial_interaction());
        tracker.callback_end(frame, 6.0);

        tracker.page_loaded(500.0);
        tracker.flush(500.0);

        let record = &tracker.sink().interactions[0];
        assert_eq!(record.start, 0.0);
        assert_eq!(record.end, 500.0);
        assert!(record.children().is_empty());
    }

    #[test]
    fn test_tracer_after_harvest_runs_unattributed() {
        let mut tracker = tracker(ManualClock::new(0.0));
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let mut tracer = tracker.create_tracer(Some("late"), 100.0);
        tracker.interaction(100.0).end();
        tracker.callback_end(frame, 101.0);
        tracker.flush(110.0);

        let cb = tracker.tracer_enter(&tracer, 200.0);
        assert!(cb.node().is_none());
        tracker.tracer_exit(&mut tracer, cb, 201.0, Some("too late".to_string()));

        let sink = tracker.sink();
        assert_eq!(sink.interactions.len(), 1);
        assert_eq!(sink.errors[0].interaction_id, None);
    }
}
