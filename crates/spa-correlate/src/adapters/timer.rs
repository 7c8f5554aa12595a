//! setTimeout / clearTimeout

use crate::context::Frame;
use crate::tracker::{InteractionTracker, PendingTimer};
use spa_core::{HarvestSink, NodeKind, TimerId, Timestamp};
use tracing::{debug, trace};

impl<S: HarvestSink> InteractionTracker<S> {
    /// A timer was armed. It holds the active interaction open unless the
    /// frame's timer budget cannot cover its delay.
    pub fn new_timer(&mut self, id: TimerId, delay: f64, ts: Timestamp) {
        self.advance(ts);

        let Some(node) = self.active_node() else {
            return;
        };
        let delay = delay.max(0.0);
        if delay > self.budget {
            self.stats.timers_over_budget += 1;
            debug!(timer = id.0, delay, budget = self.budget, "timer over budget, not attached");
            return;
        }
        let Some(interaction) = self.open_interaction_of(node) else {
            return;
        };

        self.budget -= delay;
        self.arm(interaction);

        let timer_node = if self.config.trace_timers {
            self.attach(node, NodeKind::Timer, ts)
        } else {
            None
        };
        trace!(timer = id.0, interaction = %interaction, budget = self.budget, "timer armed");

        self.timers.insert(
            id,
            PendingTimer {
                interaction,
                resume: node,
                timer_node,
            },
        );
    }

    pub fn timer_cleared(&mut self, id: TimerId, ts: Timestamp) {
        self.advance(ts);

        let Some(timer) = self.timers.remove(&id) else {
            return;
        };
        if let Some(node) = timer.timer_node {
            self.arena.end_node(node, ts);
        }
        trace!(timer = id.0, "timer cleared");
        self.resolve(timer.interaction, ts);
    }

    /// The timer's callback begins. Timers with no mapping run unattributed.
    pub fn timer_fired(&mut self, id: TimerId, ts: Timestamp) -> Frame {
        let Some(timer) = self.timers.remove(&id) else {
            return self.callback_start(None, ts);
        };

        let resume = timer.timer_node.unwrap_or(timer.resume);
        let mut frame = self.callback_start(Some(resume), ts);
        frame.end_node = timer.timer_node;
        self.resolve(timer.interaction, ts);
        frame
    }
}

#[cfg(test)]
mod tests {
    use crate::InteractionTracker;
    use spa_core::{
        CollectingSink, InteractionState, ManualClock, NodeKind, TimerId, TrackerConfig, UiEvent,
    };

    fn tracker(config: TrackerConfig) -> InteractionTracker<CollectingSink> {
        InteractionTracker::new(
            TrackerConfig {
                initial_page_load: false,
                ..config
            },
            CollectingSink::new(),
            Box::new(ManualClock::new(0.0)),
        )
    }

    #[test]
    fn test_timer_holds_interaction_open() {
        let mut tracker = tracker(TrackerConfig::default());
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let id = tracker.interaction_of(frame.node().unwrap()).unwrap();
        tracker.new_timer(TimerId(1), 100.0, 101.0);
        tracker.callback_end(frame, 102.0);
        assert_eq!(tracker.interaction_state(id), Some(InteractionState::Open));

        let timer = tracker.timer_fired(TimerId(1), 201.0);
        assert_eq!(tracker.interaction_of(timer.node().unwrap()), Some(id));
        tracker.callback_end(timer, 205.0);
        assert_eq!(
            tracker.interaction_state(id),
            Some(InteractionState::PendingFinalization)
        );

        tracker.flush(300.0);
        assert_eq!(tracker.sink().interactions[0].end, 205.0);
    }

    #[test]
    fn test_budget_resets_each_frame() {
        let mut tracker = tracker(TrackerConfig::default());
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        tracker.new_timer(TimerId(1), 600.0, 100.0);
        tracker.new_timer(TimerId(2), 600.0, 100.0);
        tracker.callback_end(frame, 101.0);
        assert_eq!(tracker.stats().timers_over_budget, 1);

        // the next frame starts with a full budget
        let timer = tracker.timer_fired(TimerId(1), 700.0);
        tracker.new_timer(TimerId(3), 900.0, 700.0);
        tracker.callback_end(timer, 701.0);
        assert_eq!(tracker.stats().timers_over_budget, 1);
    }

    #[test]
    fn test_nested_frame_does_not_spend_outer_budget() {
        let mut tracker = tracker(TrackerConfig::default());
        let outer = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        tracker.new_timer(TimerId(1), 500.0, 100.0);

        let inner = tracker.callback_start(outer.node(), 101.0);
        tracker.new_timer(TimerId(2), 900.0, 101.0);
        tracker.callback_end(inner, 102.0);

        // 499 left in the outer frame
        tracker.new_timer(TimerId(3), 499.0, 103.0);
        tracker.new_timer(TimerId(4), 1.0, 103.0);
        tracker.callback_end(outer, 104.0);

        assert_eq!(tracker.stats().timers_over_budget, 1);
    }

    #[test]
    fn test_clear_resolves() {
        let mut tracker = tracker(TrackerConfig::default());
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let id = tracker.interaction_of(frame.node().unwrap()).unwrap();
        tracker.new_timer(TimerId(9), 50.0, 100.0);
        tracker.callback_end(frame, 101.0);

        tracker.timer_cleared(TimerId(9), 120.0);
        assert_eq!(
            tracker.interaction_state(id),
            Some(InteractionState::PendingFinalization)
        );

        // firing a cleared timer is unrelated work
        let stale = tracker.timer_fired(TimerId(9), 150.0);
        assert!(stale.node().is_none());
        tracker.callback_end(stale, 151.0);
    }

    #[test]
    fn test_traced_timer_node_spans_arm_to_callback_end() {
        let mut tracker = tracker(TrackerConfig {
            trace_timers: true,
            ..Default::default()
        });
        let frame = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
        let root = frame.node().unwrap();
        tracker.new_timer(TimerId(1), 10.0, 100.0);
        tracker.callback_end(frame, 101.0);

        let timer_node = tracker.node(root).unwrap().children[0];
        assert_eq!(tracker.node(timer_node).unwrap().kind, NodeKind::Timer);

        let timer = tracker.timer_fired(TimerId(1), 110.0);
        assert_eq!(timer.node(), Some(timer_node));
        tracker.callback_end(timer, 113.0);

        tracker.flush(200.0);
        let child = &tracker.sink().interactions[0].children()[0];
        assert_eq!(child.start, 100.0);
        assert_eq!(child.end, Some(113.0));
        assert_eq!(child.js_time, 3.0);
    }
}
