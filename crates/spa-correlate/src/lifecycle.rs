//! Interaction lifecycle
//!
//! `Open -> PendingFinalization -> Finalized -> Emitted | Discarded`
//!
//! An interaction finishes once nothing is pending and the pointer is
//! outside it. With resurrection enabled it then waits out the resurrection
//! window in `PendingFinalization` before the end time is fixed.

use crate::tracker::InteractionTracker;
use spa_core::{HarvestSink, InteractionId, InteractionState, NodeId, Timestamp};
use tracing::{debug, trace};

impl<S: HarvestSink> InteractionTracker<S> {
    /// Register a pending continuation on an open interaction
    pub(crate) fn arm(&mut self, id: InteractionId) -> bool {
        match self.interactions.get_mut(&id) {
            Some(ixn) if ixn.is_open() => {
                ixn.arm();
                trace!(interaction = %id, remaining = ixn.remaining, "armed");
                true
            }
            _ => false,
        }
    }

    /// Resolve a pending continuation. Finishes the interaction right away
    /// when that was the last one and the pointer is elsewhere.
    pub(crate) fn resolve(&mut self, id: InteractionId, ts: Timestamp) {
        let Some(ixn) = self.interactions.get_mut(&id) else {
            return;
        };
        if !ixn.is_open() {
            trace!(interaction = %id, "late resolve against a closed interaction");
            return;
        }
        ixn.resolve();
        ixn.bump_finish(ts);
        trace!(interaction = %id, remaining = ixn.remaining, "resolved");

        if !self.pointer_inside(id) {
            self.check_finish(id);
        }
    }

    /// Finish the interaction if nothing is pending and the pointer is not
    /// inside it
    pub fn check_finish(&mut self, id: InteractionId) {
        let ready = match self.interactions.get(&id) {
            Some(ixn) => ixn.is_open() && ixn.remaining == 0,
            None => false,
        };
        if ready && !self.pointer_inside(id) {
            let end = self.interactions[&id].last_finish;
            self.finish(id, end);
        }
    }

    /// Fix the end of an open interaction at `ts` or the last work seen,
    /// whichever is later. Does nothing if it already finished.
    pub fn finish(&mut self, id: InteractionId, ts: Timestamp) {
        let route_name = self.route_name.clone();
        let Some(ixn) = self.interactions.get_mut(&id) else {
            return;
        };
        if !ixn.is_open() {
            return;
        }

        let end = ts.max(ixn.last_finish);
        ixn.pending_end = Some(end);
        ixn.new_route = route_name;
        ixn.state = InteractionState::PendingFinalization;
        debug!(interaction = %id, end, remaining = ixn.remaining, "interaction finished");

        if self.config.resurrection.enabled {
            self.prev_interaction = Some(id);
        } else {
            self.finalize(id, end);
        }
    }

    /// Reopen the interaction that just finished, for a request issued after
    /// its last callback returned. Returns the root to attach to.
    pub(crate) fn try_resurrect(&mut self, now: Timestamp) -> Option<NodeId> {
        let policy = &self.config.resurrection;
        if !policy.enabled {
            return None;
        }
        let window = policy.window_ms;
        let id = self.prev_interaction?;
        let ixn = self.interactions.get_mut(&id)?;
        if ixn.state != InteractionState::PendingFinalization || ixn.ignored || ixn.forced_end {
            return None;
        }
        let end = ixn.pending_end?;
        if now - end > window {
            return None;
        }

        ixn.state = InteractionState::Open;
        ixn.pending_end = None;
        self.stats.interactions_resurrected += 1;
        debug!(interaction = %id, now, "interaction resurrected");
        Some(ixn.root)
    }

    /// Finalize interactions whose resurrection window has passed and emit
    /// finalized ones that have settled. Called on every boundary event.
    pub fn advance(&mut self, now: Timestamp) {
        let window = self.config.resurrection.window_ms;
        let settle_timeout = self.config.settle_timeout_ms;

        let mut due_finalize = Vec::new();
        let mut due_emit = Vec::new();
        for (id, ixn) in &self.interactions {
            match ixn.state {
                InteractionState::PendingFinalization => {
                    if let Some(end) = ixn.pending_end {
                        if now - end > window {
                            due_finalize.push(*id);
                        }
                    }
                }
                InteractionState::Finalized => {
                    let waited = ixn.finalized_at.map_or(0.0, |at| now - at);
                    if ixn.inflight_requests == 0 || waited >= settle_timeout {
                        due_emit.push(*id);
                    }
                }
                _ => {}
            }
        }

        for id in due_finalize {
            self.finalize(id, now);
        }
        for id in due_emit {
            if self.interaction_state(id) == Some(InteractionState::Finalized) {
                self.emit(id);
            }
        }
    }

    /// Finalize and emit everything that has finished, without waiting for
    /// resurrection windows or in-flight requests
    pub fn flush(&mut self, now: Timestamp) {
        let pending: Vec<InteractionId> = self
            .interactions
            .values()
            .filter(|i| i.state == InteractionState::PendingFinalization)
            .map(|i| i.id)
            .collect();
        for id in pending {
            self.finalize(id, now);
        }

        let settling: Vec<InteractionId> = self
            .interactions
            .values()
            .filter(|i| i.state == InteractionState::Finalized)
            .map(|i| i.id)
            .collect();
        for id in settling {
            self.emit(id);
        }
    }
}
