//! Script replay
//!
//! Drives a tracker from recorded boundary events and API calls. Frame and
//! tracer numbers in the script stand in for the tokens the engine hands
//! out, so they are mapped back here.

use spa_core::{
    ApiCall, BoundaryEvent, HarvestSink, ManualClock, Resume, ScriptStep, Timestamp,
    TrackerConfig, TrackerStats,
};
use spa_correlate::{Frame, InteractionTracker, Tracer};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of a replay
#[derive(Debug, Clone, Copy)]
pub struct ReplaySummary {
    pub steps: usize,
    /// Steps referring to a frame or tracer the script never opened
    pub unmatched: usize,
    /// Frames still open at the end of the script
    pub open_frames: usize,
    /// Interactions still open after the final flush, never emitted
    pub open_interactions: usize,
    pub stats: TrackerStats,
}

pub struct Replayer<S: HarvestSink> {
    tracker: InteractionTracker<S>,
    clock: ManualClock,
    frames: HashMap<u64, Frame>,
    tracers: HashMap<u64, Tracer>,
    steps: usize,
    unmatched: usize,
    last_ts: Timestamp,
}

impl<S: HarvestSink> Replayer<S> {
    /// Create a replayer whose tracker boots at `start`
    pub fn new(config: TrackerConfig, sink: S, start: Timestamp) -> Self {
        let clock = ManualClock::new(start);
        let tracker = InteractionTracker::new(config, sink, Box::new(clock.clone()));
        Self {
            tracker,
            clock,
            frames: HashMap::new(),
            tracers: HashMap::new(),
            steps: 0,
            unmatched: 0,
            last_ts: start,
        }
    }

    /// Page URL at the start of the script
    pub fn set_location(&mut self, url: &str) {
        self.tracker.set_location(url);
    }

    pub fn tracker(&self) -> &InteractionTracker<S> {
        &self.tracker
    }

    pub fn apply_all<'a>(&mut self, steps: impl IntoIterator<Item = &'a ScriptStep>) {
        for step in steps {
            self.apply(step);
        }
    }

    pub fn apply(&mut self, step: &ScriptStep) {
        let ts = step.ts();
        if ts < self.last_ts {
            warn!(ts, last = self.last_ts, "script step goes back in time");
        }
        self.last_ts = self.last_ts.max(ts);
        self.clock.set(ts);
        self.steps += 1;

        // a frame id reused while still open: close the old frame first so
        // the tracker's saved state unwinds in order
        if let Some(id) = opened_frame(step) {
            if let Some(stale) = self.frames.remove(&id) {
                self.tracker.callback_end(stale, ts);
                self.unmatched(format_args!("frame {} reopened before it was closed", id));
            }
        }

        match step {
            ScriptStep::Event(event) => self.apply_event(event),
            ScriptStep::Api(call) => self.apply_api(call),
        }
    }

    fn open(&mut self, id: u64, frame: Frame) {
        self.frames.insert(id, frame);
    }

    fn close(&mut self, id: u64, ts: Timestamp) {
        match self.frames.remove(&id) {
            Some(frame) => self.tracker.callback_end(frame, ts),
            None => self.unmatched(format_args!("callback end for unknown frame {}", id)),
        }
    }

    fn unmatched(&mut self, what: std::fmt::Arguments<'_>) {
        self.unmatched += 1;
        warn!("Unmatched script step: {}", what);
    }

    fn apply_event(&mut self, event: &BoundaryEvent) {
        let t = &mut self.tracker;
        match event {
            BoundaryEvent::UiEvent { frame, event } => {
                let f = t.ui_event(event);
                self.open(*frame, f);
            }
            BoundaryEvent::CallbackStart { frame, ts, resume } => {
                let f = match resume {
                    Resume::None => t.callback_start(None, *ts),
                    Resume::Current => {
                        let current = t.current_node();
                        t.callback_start(current, *ts)
                    }
                    Resume::Request { handle } => t.request_callback(*handle, *ts),
                };
                self.open(*frame, f);
            }
            BoundaryEvent::CallbackEnd { frame, ts } => self.close(*frame, *ts),
            BoundaryEvent::NewTimer { ts, id, delay } => t.new_timer(*id, *delay, *ts),
            BoundaryEvent::TimerCleared { ts, id } => t.timer_cleared(*id, *ts),
            BoundaryEvent::TimerFired { frame, ts, id } => {
                let f = t.timer_fired(*id, *ts);
                self.open(*frame, f);
            }
            BoundaryEvent::NewXhr { ts, handle } => t.new_xhr(*handle, *ts),
            BoundaryEvent::XhrSend {
                ts,
                handle,
                method,
                url,
            } => t.xhr_send(*handle, method.as_str(), url.as_str(), *ts),
            BoundaryEvent::XhrResolved { ts, handle, status } => {
                t.xhr_resolved(*handle, *status, *ts)
            }
            BoundaryEvent::FetchStart {
                ts,
                handle,
                method,
                url,
            } => t.fetch_start(*handle, method.as_str(), url.as_str(), *ts),
            BoundaryEvent::FetchBodyStart { ts, handle } => t.fetch_body_start(*handle, *ts),
            BoundaryEvent::FetchBodyEnd { frame, ts, handle } => {
                let f = t.fetch_body_end(*handle, *ts);
                self.open(*frame, f);
            }
            BoundaryEvent::FetchDone {
                frame,
                ts,
                handle,
                status,
            } => {
                let f = t.fetch_done(*handle, *status, *ts);
                self.open(*frame, f);
            }
            BoundaryEvent::NewJsonp { ts, handle, url } => t.new_jsonp(*handle, url.as_str(), *ts),
            BoundaryEvent::JsonpCbStart { frame, ts, handle } => {
                let f = t.jsonp_cb_start(*handle, *ts);
                self.open(*frame, f);
            }
            BoundaryEvent::JsonpError { ts, handle } => t.jsonp_error(*handle, *ts),
            BoundaryEvent::JsonpEnd { ts, handle } => t.jsonp_end(*handle, *ts),
            BoundaryEvent::DomMutation { ts } => t.dom_mutation_observed(*ts),
            BoundaryEvent::UrlChanged { ts, url, hash_only } => {
                t.url_changed(*ts, url.as_str(), *hash_only)
            }
            BoundaryEvent::PageLoaded { ts } => t.page_loaded(*ts),
            BoundaryEvent::Paint { ts, name } => t.paint_observed(*name, *ts),
        }
    }

    fn apply_api(&mut self, call: &ApiCall) {
        let t = &mut self.tracker;
        match call {
            ApiCall::Interaction { ts } => {
                let id = t.interaction(*ts).id();
                debug!(interaction = %id, "api interaction");
            }
            ApiCall::ActionText { ts, text } => {
                t.interaction(*ts).action_text(text.as_str());
            }
            ApiCall::SetName { ts, name, trigger } => {
                t.interaction(*ts)
                    .set_name(name.as_str(), trigger.as_deref());
            }
            ApiCall::SetAttribute { ts, key, value } => {
                t.interaction(*ts).set_attribute(key.as_str(), value.clone());
            }
            ApiCall::Save { ts } => {
                t.interaction(*ts).save();
            }
            ApiCall::Ignore { ts } => {
                t.interaction(*ts).ignore();
            }
            ApiCall::End { ts } => {
                t.interaction(*ts).end();
            }
            ApiCall::RouteName { name, .. } => t.set_current_route_name(name.as_str()),
            ApiCall::CreateTracer { ts, tracer, name } => {
                let handle = t.create_tracer(name.as_deref(), *ts);
                if self.tracers.insert(*tracer, handle).is_some() {
                    warn!(tracer, "tracer handle reused");
                }
            }
            ApiCall::TracerEnter { frame, ts, tracer } => {
                let Some(handle) = self.tracers.get(tracer) else {
                    self.unmatched(format_args!("enter of unknown tracer {}", tracer));
                    return;
                };
                let f = t.tracer_enter(handle, *ts);
                self.open(*frame, f);
            }
            ApiCall::TracerExit {
                frame,
                ts,
                tracer,
                error,
            } => {
                let Some(f) = self.frames.remove(frame) else {
                    self.unmatched(format_args!("tracer exit for unknown frame {}", frame));
                    return;
                };
                match self.tracers.get_mut(tracer) {
                    Some(handle) => t.tracer_exit(handle, f, *ts, error.clone()),
                    None => {
                        t.callback_end(f, *ts);
                        self.unmatched(format_args!("exit of unknown tracer {}", tracer));
                    }
                }
            }
            ApiCall::TracerEnd { ts, tracer } => match self.tracers.get_mut(tracer) {
                Some(handle) => t.tracer_end(handle, *ts),
                None => self.unmatched(format_args!("end of unknown tracer {}", tracer)),
            },
        }
    }

    /// Flush everything that has ended and hand back the sink
    pub fn finish(mut self) -> (S, ReplaySummary) {
        let open_frames = self.frames.len();
        if open_frames > 0 {
            warn!(open_frames, "script ended with open frames");
        }
        self.tracker.flush(self.last_ts);

        let open_interactions = self.tracker.live_interactions();
        if open_interactions > 0 {
            warn!(open_interactions, "script ended with interactions still open");
        }

        let summary = ReplaySummary {
            steps: self.steps,
            unmatched: self.unmatched,
            open_frames,
            open_interactions,
            stats: self.tracker.stats(),
        };
        (self.tracker.into_sink(), summary)
    }
}

/// Frame id a step opens, if any
fn opened_frame(step: &ScriptStep) -> Option<u64> {
    match step {
        ScriptStep::Event(event) => match event {
            BoundaryEvent::UiEvent { frame, .. }
            | BoundaryEvent::CallbackStart { frame, .. }
            | BoundaryEvent::TimerFired { frame, .. }
            | BoundaryEvent::FetchBodyEnd { frame, .. }
            | BoundaryEvent::FetchDone { frame, .. }
            | BoundaryEvent::JsonpCbStart { frame, .. } => Some(*frame),
            _ => None,
        },
        ScriptStep::Api(ApiCall::TracerEnter { frame, .. }) => Some(*frame),
        ScriptStep::Api(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spa_core::{CollectingSink, RequestHandle, TimerId, UiEvent};

    fn replayer() -> Replayer<CollectingSink> {
        let config = TrackerConfig {
            initial_page_load: false,
            ..Default::default()
        };
        Replayer::new(config, CollectingSink::new(), 0.0)
    }

    fn ev(event: BoundaryEvent) -> ScriptStep {
        ScriptStep::Event(event)
    }

    #[test]
    fn test_replay_click_with_request() {
        let steps = vec![
            ev(BoundaryEvent::UiEvent {
                frame: 1,
                event: UiEvent::new(1, "click", 10.0),
            }),
            ev(BoundaryEvent::FetchStart {
                ts: 11.0,
                handle: RequestHandle(1),
                method: "GET".to_string(),
                url: "/items".to_string(),
            }),
            ev(BoundaryEvent::CallbackEnd { frame: 1, ts: 12.0 }),
            ev(BoundaryEvent::FetchDone {
                frame: 2,
                ts: 40.0,
                handle: RequestHandle(1),
                status: Some(200),
            }),
            ev(BoundaryEvent::CallbackEnd { frame: 2, ts: 45.0 }),
        ];

        let mut replayer = replayer();
        replayer.apply_all(&steps);
        let (sink, summary) = replayer.finish();

        assert_eq!(summary.steps, 5);
        assert_eq!(summary.unmatched, 0);
        assert_eq!(sink.interactions.len(), 1);
        assert_eq!(sink.interactions[0].end, 45.0);
        assert_eq!(sink.interactions[0].children().len(), 1);
    }

    #[test]
    fn test_replay_api_and_tracer() {
        let steps = vec![
            ev(BoundaryEvent::UiEvent {
                frame: 1,
                event: UiEvent::new(1, "submit", 10.0),
            }),
            ScriptStep::Api(ApiCall::SetName {
                ts: 10.0,
                name: "checkout".to_string(),
                trigger: None,
            }),
            ScriptStep::Api(ApiCall::CreateTracer {
                ts: 10.0,
                tracer: 7,
                name: Some("validate".to_string()),
            }),
            ev(BoundaryEvent::NewTimer {
                ts: 10.0,
                id: TimerId(1),
                delay: 0.0,
            }),
            ev(BoundaryEvent::CallbackEnd { frame: 1, ts: 11.0 }),
            ev(BoundaryEvent::TimerFired {
                frame: 2,
                ts: 12.0,
                id: TimerId(1),
            }),
            ScriptStep::Api(ApiCall::TracerEnter {
                frame: 3,
                ts: 12.0,
                tracer: 7,
            }),
            ScriptStep::Api(ApiCall::TracerExit {
                frame: 3,
                ts: 15.0,
                tracer: 7,
                error: Some("invalid card".to_string()),
            }),
            ev(BoundaryEvent::CallbackEnd { frame: 2, ts: 16.0 }),
        ];

        let mut replayer = replayer();
        replayer.apply_all(&steps);
        let (sink, summary) = replayer.finish();

        assert_eq!(summary.unmatched, 0);
        let record = &sink.interactions[0];
        assert_eq!(record.custom_name(), Some("checkout"));
        assert_eq!(record.end, 16.0);
        assert_eq!(record.children()[0].js_time, 3.0);
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(sink.errors[0].interaction_id.as_deref(), Some(record.id.as_str()));
    }

    #[test]
    fn test_unknown_frame_is_counted() {
        let mut replayer = replayer();
        replayer.apply(&ev(BoundaryEvent::CallbackEnd { frame: 9, ts: 1.0 }));
        replayer.apply(&ScriptStep::Api(ApiCall::TracerEnd { ts: 2.0, tracer: 4 }));
        let (sink, summary) = replayer.finish();

        assert_eq!(summary.unmatched, 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_open_frames_reported() {
        let mut replayer = replayer();
        replayer.apply(&ev(BoundaryEvent::CallbackStart {
            frame: 1,
            ts: 1.0,
            resume: Resume::None,
        }));
        let (_, summary) = replayer.finish();
        assert_eq!(summary.open_frames, 1);
    }

    #[test]
    fn test_reused_frame_id_closes_older_frame() {
        let steps = vec![
            ev(BoundaryEvent::UiEvent {
                frame: 1,
                event: UiEvent::new(1, "click", 10.0),
            }),
            // frame 1 never closed before the id comes back
            ev(BoundaryEvent::CallbackStart {
                frame: 1,
                ts: 20.0,
                resume: Resume::None,
            }),
            ev(BoundaryEvent::CallbackEnd { frame: 1, ts: 25.0 }),
        ];

        let mut replayer = replayer();
        replayer.apply_all(&steps);
        assert!(replayer.tracker().current_node().is_none());
        let (sink, summary) = replayer.finish();

        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.open_frames, 0);
        assert_eq!(sink.interactions.len(), 1);
        assert_eq!(sink.interactions[0].end, 20.0);
    }

    #[test]
    fn test_open_interactions_reported() {
        let mut replayer = replayer();
        replayer.apply(&ScriptStep::Api(ApiCall::Interaction { ts: 5.0 }));
        let (sink, summary) = replayer.finish();

        assert_eq!(summary.open_interactions, 1);
        assert!(sink.interactions.is_empty());
    }
}
