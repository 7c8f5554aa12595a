//! Host API surface
//!
//! Host code reaches the interaction bound to the current execution context
//! through `InteractionTracker::interaction`. Every call is a no-op once that
//! interaction has been harvested.

use crate::tracker::InteractionTracker;
use serde_json::Value;
use spa_core::{ContextStore, HarvestSink, InteractionId, NodeKind, Timestamp};
use tracing::debug;

/// Handle on one interaction, returned by `InteractionTracker::interaction`
pub struct InteractionApi<'a, S: HarvestSink> {
    tracker: &'a mut InteractionTracker<S>,
    id: InteractionId,
    ts: Timestamp,
}

impl<S: HarvestSink> InteractionTracker<S> {
    /// The interaction bound to the active node. With none open, a new
    /// interaction triggered by `api` is created and the pointer moves to its
    /// root so work started by the caller attaches to it.
    pub fn interaction(&mut self, ts: Timestamp) -> InteractionApi<'_, S> {
        self.advance(ts);

        let bound = self.active_node().and_then(|n| self.open_interaction_of(n));
        let id = match bound {
            Some(id) => id,
            None => {
                let id = self.create_interaction("api", ts);
                self.current = self.interactions.get(&id).map(|i| i.root);
                id
            }
        };

        InteractionApi {
            tracker: self,
            id,
            ts,
        }
    }
}

impl<'a, S: HarvestSink> InteractionApi<'a, S> {
    pub fn id(&self) -> InteractionId {
        self.id
    }

    /// Timestamp the handle was obtained at, used by calls that record time
    pub fn ts(&self) -> Timestamp {
        self.ts
    }

    pub fn tracker(&mut self) -> &mut InteractionTracker<S> {
        self.tracker
    }

    fn with<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut spa_core::Interaction),
    {
        if let Some(ixn) = self.tracker.interactions.get_mut(&self.id) {
            f(ixn);
        }
        self
    }

    pub fn action_text(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        self.with(|ixn| ixn.action_text = Some(text))
    }

    /// Name the interaction, optionally replacing its trigger
    pub fn set_name(&mut self, name: impl Into<String>, trigger: Option<&str>) -> &mut Self {
        let name = name.into();
        let trigger = trigger.map(str::to_string);
        let root = match self.tracker.interactions.get_mut(&self.id) {
            Some(ixn) => {
                if let Some(trigger) = &trigger {
                    ixn.trigger = trigger.clone();
                }
                ixn.root
            }
            None => return self,
        };
        if let Some(node) = self.tracker.arena.get_mut(root) {
            node.attrs.custom_name = Some(name);
            if trigger.is_some() {
                node.attrs.trigger = trigger;
            }
        }
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        let root = match self.tracker.interactions.get(&self.id) {
            Some(ixn) => ixn.root,
            None => return self,
        };
        if let Some(node) = self.tracker.arena.get_mut(root) {
            node.attrs.custom.insert(key.into(), value);
        }
        self
    }

    /// Emit the interaction even if it ends up ignored
    pub fn save(&mut self) -> &mut Self {
        self.with(|ixn| ixn.save = true)
    }

    /// Drop the interaction unless it is saved or changes the route
    pub fn ignore(&mut self) -> &mut Self {
        self.with(|ixn| ixn.ignored = true)
    }

    /// Run `handler` with the context store once the interaction finalizes
    pub fn on_end(&mut self, handler: impl FnOnce(&ContextStore) + 'static) -> &mut Self {
        self.with(|ixn| ixn.on_end(Box::new(handler)))
    }

    /// Access the interaction's context store
    pub fn get_context<R>(&mut self, f: impl FnOnce(&mut ContextStore) -> R) -> Option<R> {
        self.tracker
            .interactions
            .get_mut(&self.id)
            .map(|ixn| f(&mut ixn.context_store))
    }

    /// End the interaction now, whatever is still pending. A `customEnd`
    /// child marks the point. Calling it again does nothing.
    pub fn end(&mut self) -> &mut Self {
        let ts = self.ts;
        let root = match self.tracker.interactions.get_mut(&self.id) {
            Some(ixn) if ixn.is_open() => {
                ixn.forced_end = true;
                ixn.root
            }
            _ => return self,
        };
        if let Some(marker) = self.tracker.attach(root, NodeKind::CustomEnd, ts) {
            self.tracker.arena.end_node(marker, ts);
        }
        debug!(interaction = %self.id, ts, "explicit end");
        self.tracker.finish(self.id, ts);
        self
    }
}
