//! XMLHttpRequest and fetch
//!
//! A request becomes an `ajax` child of the active node. With no active node
//! it may resurrect the interaction that just finished; otherwise it is
//! reported on its own when it resolves.

use crate::context::Frame;
use crate::tracker::{InteractionTracker, PendingBody, PendingRequest};
use spa_core::config::AjaxAttribution;
use spa_core::node::AjaxAttrs;
use spa_core::{AjaxRecord, HarvestSink, InteractionState, RequestHandle, Timestamp};
use tracing::{debug, trace};

impl<S: HarvestSink> InteractionTracker<S> {
    /// A request object was created
    pub fn new_xhr(&mut self, handle: RequestHandle, ts: Timestamp) {
        self.advance(ts);

        let parent = match self.active_node() {
            Some(node) => Some(node),
            None => self.try_resurrect(ts),
        };
        let node = parent.and_then(|p| self.attach_ajax(p, ts, AjaxAttrs::default()));
        if let Some(ixn) = node
            .and_then(|n| self.arena.interaction_of(n))
            .and_then(|id| self.interactions.get_mut(&id))
        {
            ixn.inflight_requests += 1;
        }
        trace!(request = handle.0, node = ?node, "request created");

        self.requests.insert(
            handle,
            PendingRequest {
                node,
                method: String::new(),
                url: String::new(),
                created: ts,
                sent: None,
                armed: false,
            },
        );
    }

    /// The request was sent. In continuation mode this holds the
    /// interaction open until the request resolves.
    pub fn xhr_send(
        &mut self,
        handle: RequestHandle,
        method: impl Into<String>,
        url: impl Into<String>,
        ts: Timestamp,
    ) {
        self.advance(ts);

        let Some(req) = self.requests.get_mut(&handle) else {
            trace!(request = handle.0, "send for an unknown request");
            return;
        };
        req.method = method.into();
        req.url = url.into();
        req.sent = Some(ts);

        let Some(node) = req.node else {
            return;
        };
        let already_armed = req.armed;
        if let Some(n) = self.arena.get_mut(node) {
            n.start = ts;
            if let Some(ajax) = n.attrs.ajax.as_mut() {
                ajax.method = req.method.clone();
                ajax.url = req.url.clone();
            }
        }

        if self.config.ajax_attribution != AjaxAttribution::Continuation || already_armed {
            return;
        }
        let armed = self
            .open_interaction_of(node)
            .map_or(false, |id| self.arm(id));
        if let Some(req) = self.requests.get_mut(&handle) {
            req.armed = armed;
        }
    }

    /// A callback registered on the request object begins
    pub fn request_callback(&mut self, handle: RequestHandle, ts: Timestamp) -> Frame {
        let resume = self.requests.get(&handle).and_then(|r| r.node);
        self.callback_start(resume, ts)
    }

    /// The request completed, failed or was aborted
    pub fn xhr_resolved(&mut self, handle: RequestHandle, status: Option<u16>, ts: Timestamp) {
        self.advance(ts);

        let Some(req) = self.requests.remove(&handle) else {
            trace!(request = handle.0, "resolution for an unknown request");
            return;
        };

        let Some(node) = req.node else {
            let record = AjaxRecord {
                method: req.method,
                url: req.url,
                status,
                start: req.sent.unwrap_or(req.created),
                end: ts,
            };
            debug!(url = %record.url, start = record.start, end = ts, "standalone request");
            self.stats.standalone_ajax += 1;
            self.sink.add_ajax(record);
            return;
        };

        let Some(id) = self.arena.interaction_of(node) else {
            debug!(request = handle.0, "request resolved after its interaction was harvested");
            return;
        };

        self.arena.end_node(node, ts);
        if let Some(ajax) = self
            .arena
            .get_mut(node)
            .and_then(|n| n.attrs.ajax.as_mut())
        {
            ajax.status = status;
            ajax.error = status.map_or(true, |s| s == 0 || s >= 400);
        }

        let state = match self.interactions.get_mut(&id) {
            Some(ixn) => {
                ixn.inflight_requests = ixn.inflight_requests.saturating_sub(1);
                ixn.state
            }
            None => return,
        };

        match state {
            InteractionState::Open => {
                if req.armed {
                    self.resolve(id, ts);
                } else if !self.pointer_inside(id) {
                    self.check_finish(id);
                }
            }
            InteractionState::Finalized => {
                let settled = self
                    .interactions
                    .get(&id)
                    .map_or(false, |i| i.inflight_requests == 0);
                if settled {
                    self.emit(id);
                }
            }
            _ => {}
        }
    }

    /// fetch() was called; equivalent to creating and sending a request
    pub fn fetch_start(
        &mut self,
        handle: RequestHandle,
        method: impl Into<String>,
        url: impl Into<String>,
        ts: Timestamp,
    ) {
        self.new_xhr(handle, ts);
        self.xhr_send(handle, method, url, ts);
    }

    /// The fetch promise settled and its continuation begins
    pub fn fetch_done(
        &mut self,
        handle: RequestHandle,
        status: Option<u16>,
        ts: Timestamp,
    ) -> Frame {
        let frame = self.request_callback(handle, ts);
        self.xhr_resolved(handle, status, ts);
        frame
    }

    /// A body read (`res.json()`, ...) started on the active node
    pub fn fetch_body_start(&mut self, handle: RequestHandle, ts: Timestamp) {
        self.advance(ts);

        let Some(node) = self.active_node() else {
            return;
        };
        let Some(interaction) = self.open_interaction_of(node) else {
            return;
        };
        if self.arm(interaction) {
            self.bodies.insert(
                handle,
                PendingBody {
                    interaction,
                    resume: node,
                },
            );
        }
    }

    /// The body read settled and its continuation begins
    pub fn fetch_body_end(&mut self, handle: RequestHandle, ts: Timestamp) -> Frame {
        let Some(body) = self.bodies.remove(&handle) else {
            return self.callback_start(None, ts);
        };
        let frame = self.callback_start(Some(body.resume), ts);
        self.resolve(body.interaction, ts);
        frame
    }
}
