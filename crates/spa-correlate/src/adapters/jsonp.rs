//! JSONP script insertion
//!
//! The callback runs fully detached from the frame that inserted the
//! script, so the insertion always holds the interaction open until the
//! script loads or fails.

use crate::context::Frame;
use crate::tracker::{InteractionTracker, PendingScript};
use spa_core::node::AjaxAttrs;
use spa_core::{HarvestSink, ScriptHandle, Timestamp};
use tracing::trace;

impl<S: HarvestSink> InteractionTracker<S> {
    pub fn new_jsonp(&mut self, handle: ScriptHandle, url: impl Into<String>, ts: Timestamp) {
        self.advance(ts);

        let Some(parent) = self.active_node() else {
            return;
        };
        let attrs = AjaxAttrs {
            method: "GET".to_string(),
            url: url.into(),
            jsonp: true,
            ..Default::default()
        };
        let Some(node) = self.attach_ajax(parent, ts, attrs) else {
            return;
        };
        let Some(interaction) = self.open_interaction_of(node) else {
            return;
        };
        if self.arm(interaction) {
            trace!(script = handle.0, "jsonp script inserted");
            self.scripts
                .insert(handle, PendingScript { interaction, node });
        }
    }

    /// The JSONP callback begins
    pub fn jsonp_cb_start(&mut self, handle: ScriptHandle, ts: Timestamp) -> Frame {
        let resume = self.scripts.get(&handle).map(|s| s.node);
        self.callback_start(resume, ts)
    }

    /// The script loaded
    pub fn jsonp_end(&mut self, handle: ScriptHandle, ts: Timestamp) {
        self.settle_script(handle, false, ts);
    }

    /// The script failed to load
    pub fn jsonp_error(&mut self, handle: ScriptHandle, ts: Timestamp) {
        self.settle_script(handle, true, ts);
    }

    fn settle_script(&mut self, handle: ScriptHandle, error: bool, ts: Timestamp) {
        self.advance(ts);

        let Some(script) = self.scripts.remove(&handle) else {
            return;
        };
        self.arena.end_node(script.node, ts);
        if let Some(ajax) = self
            .arena
            .get_mut(script.node)
            .and_then(|n| n.attrs.ajax.as_mut())
        {
            ajax.error = error;
        }
        self.resolve(script.interaction, ts);
    }
}
