//! Boundary-event vocabulary
//!
//! Instrumentation wrappers around timers, network APIs, script insertion,
//! history and DOM listeners report what they observe with these events. The
//! engine exposes one method per event; the serde form below is what recorded
//! scripts use, with `frame` numbers standing in for the per-call frame tokens.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Timer id as returned by `setTimeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

/// Identity of one xhr or fetch request object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHandle(pub u64);

/// Identity of one inserted JSONP script element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptHandle(pub u64);

/// Identity of one dispatched DOM event, shared by all its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// A DOM event seen by a wrapped listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    pub id: EventId,

    /// DOM event type (click, keydown, popstate, ...)
    pub kind: String,

    pub ts: Timestamp,

    /// Visible text of the event target, used as the action text of clicks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_text: Option<String>,
}

impl UiEvent {
    pub fn new(id: u64, kind: impl Into<String>, ts: Timestamp) -> Self {
        Self {
            id: EventId(id),
            kind: kind.into(),
            ts,
            target_text: None,
        }
    }

    pub fn with_target_text(mut self, text: impl Into<String>) -> Self {
        self.target_text = Some(text.into());
        self
    }
}

/// Paint timing entries snapshotted onto the initial page load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaintKind {
    FirstPaint,
    FirstContentfulPaint,
}

/// Node a generic callback frame resumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resume {
    /// Nothing to resume; the pointer falls back to its default
    #[default]
    None,
    /// A synchronously nested call that keeps the active node
    Current,
    /// A callback registered on a request object (xhr onload, ...)
    Request { handle: RequestHandle },
}

/// One boundary event as recorded in a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundaryEvent {
    /// A listener for a DOM event begins
    UiEvent { frame: u64, event: UiEvent },

    CallbackStart {
        frame: u64,
        ts: Timestamp,
        #[serde(default)]
        resume: Resume,
    },

    CallbackEnd { frame: u64, ts: Timestamp },

    NewTimer {
        ts: Timestamp,
        id: TimerId,
        #[serde(default)]
        delay: f64,
    },

    TimerCleared { ts: Timestamp, id: TimerId },

    /// The timer callback begins
    TimerFired { frame: u64, ts: Timestamp, id: TimerId },

    NewXhr { ts: Timestamp, handle: RequestHandle },

    XhrSend {
        ts: Timestamp,
        handle: RequestHandle,
        method: String,
        url: String,
    },

    XhrResolved {
        ts: Timestamp,
        handle: RequestHandle,
        #[serde(default)]
        status: Option<u16>,
    },

    FetchStart {
        ts: Timestamp,
        handle: RequestHandle,
        method: String,
        url: String,
    },

    FetchBodyStart { ts: Timestamp, handle: RequestHandle },

    /// The continuation of a body read begins
    FetchBodyEnd {
        frame: u64,
        ts: Timestamp,
        handle: RequestHandle,
    },

    /// The continuation of the fetch promise begins
    FetchDone {
        frame: u64,
        ts: Timestamp,
        handle: RequestHandle,
        #[serde(default)]
        status: Option<u16>,
    },

    NewJsonp {
        ts: Timestamp,
        handle: ScriptHandle,
        url: String,
    },

    /// The JSONP callback begins
    JsonpCbStart {
        frame: u64,
        ts: Timestamp,
        handle: ScriptHandle,
    },

    JsonpError { ts: Timestamp, handle: ScriptHandle },

    JsonpEnd { ts: Timestamp, handle: ScriptHandle },

    DomMutation { ts: Timestamp },

    UrlChanged {
        ts: Timestamp,
        url: String,
        #[serde(default)]
        hash_only: bool,
    },

    PageLoaded { ts: Timestamp },

    Paint { ts: Timestamp, name: PaintKind },
}

impl BoundaryEvent {
    /// Timestamp the event was observed at
    pub fn ts(&self) -> Timestamp {
        match self {
            BoundaryEvent::UiEvent { event, .. } => event.ts,
            BoundaryEvent::CallbackStart { ts, .. }
            | BoundaryEvent::CallbackEnd { ts, .. }
            | BoundaryEvent::NewTimer { ts, .. }
            | BoundaryEvent::TimerCleared { ts, .. }
            | BoundaryEvent::TimerFired { ts, .. }
            | BoundaryEvent::NewXhr { ts, .. }
            | BoundaryEvent::XhrSend { ts, .. }
            | BoundaryEvent::XhrResolved { ts, .. }
            | BoundaryEvent::FetchStart { ts, .. }
            | BoundaryEvent::FetchBodyStart { ts, .. }
            | BoundaryEvent::FetchBodyEnd { ts, .. }
            | BoundaryEvent::FetchDone { ts, .. }
            | BoundaryEvent::NewJsonp { ts, .. }
            | BoundaryEvent::JsonpCbStart { ts, .. }
            | BoundaryEvent::JsonpError { ts, .. }
            | BoundaryEvent::JsonpEnd { ts, .. }
            | BoundaryEvent::DomMutation { ts }
            | BoundaryEvent::UrlChanged { ts, .. }
            | BoundaryEvent::PageLoaded { ts }
            | BoundaryEvent::Paint { ts, .. } => *ts,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryEvent::UiEvent { .. } => "ui_event",
            BoundaryEvent::CallbackStart { .. } => "callback_start",
            BoundaryEvent::CallbackEnd { .. } => "callback_end",
            BoundaryEvent::NewTimer { .. } => "new_timer",
            BoundaryEvent::TimerCleared { .. } => "timer_cleared",
            BoundaryEvent::TimerFired { .. } => "timer_fired",
            BoundaryEvent::NewXhr { .. } => "new_xhr",
            BoundaryEvent::XhrSend { .. } => "xhr_send",
            BoundaryEvent::XhrResolved { .. } => "xhr_resolved",
            BoundaryEvent::FetchStart { .. } => "fetch_start",
            BoundaryEvent::FetchBodyStart { .. } => "fetch_body_start",
            BoundaryEvent::FetchBodyEnd { .. } => "fetch_body_end",
            BoundaryEvent::FetchDone { .. } => "fetch_done",
            BoundaryEvent::NewJsonp { .. } => "new_jsonp",
            BoundaryEvent::JsonpCbStart { .. } => "jsonp_cb_start",
            BoundaryEvent::JsonpError { .. } => "jsonp_error",
            BoundaryEvent::JsonpEnd { .. } => "jsonp_end",
            BoundaryEvent::DomMutation { .. } => "dom_mutation",
            BoundaryEvent::UrlChanged { .. } => "url_changed",
            BoundaryEvent::PageLoaded { .. } => "page_loaded",
            BoundaryEvent::Paint { .. } => "paint",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_start_defaults_resume() {
        let event: BoundaryEvent =
            serde_json::from_str(r#"{"type":"callback_start","frame":3,"ts":12.5}"#).unwrap();
        assert_eq!(
            event,
            BoundaryEvent::CallbackStart {
                frame: 3,
                ts: 12.5,
                resume: Resume::None,
            }
        );
        assert_eq!(event.ts(), 12.5);
    }

    #[test]
    fn test_parse_request_resume() {
        let event: BoundaryEvent = serde_json::from_str(
            r#"{"type":"callback_start","frame":1,"ts":5,"resume":{"kind":"request","handle":9}}"#,
        )
        .unwrap();
        match event {
            BoundaryEvent::CallbackStart { resume, .. } => {
                assert_eq!(
                    resume,
                    Resume::Request {
                        handle: RequestHandle(9)
                    }
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_ui_event_takes_timestamp_from_event() {
        let event = BoundaryEvent::UiEvent {
            frame: 1,
            event: UiEvent::new(7, "click", 100.0).with_target_text("Buy"),
        };
        assert_eq!(event.ts(), 100.0);
        assert_eq!(event.name(), "ui_event");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"ui_event""#));
        assert!(json.contains(r#""target_text":"Buy""#));
    }

    #[test]
    fn test_paint_kind_names() {
        let json = serde_json::to_string(&PaintKind::FirstContentfulPaint).unwrap();
        assert_eq!(json, r#""first-contentful-paint""#);
    }
}
