//! End-to-end scenarios over the whole engine

use crate::InteractionTracker;
use spa_core::config::AjaxAttribution;
use spa_core::{
    Category, CollectingSink, InteractionRecord, ManualClock, RequestHandle, TimerId,
    TrackerConfig, UiEvent,
};

fn tracker(config: TrackerConfig) -> InteractionTracker<CollectingSink> {
    let mut tracker = InteractionTracker::new(
        TrackerConfig {
            initial_page_load: false,
            ..config
        },
        CollectingSink::new(),
        Box::new(ManualClock::new(0.0)),
    );
    tracker.set_location("https://shop.test/");
    tracker
}

fn assert_time_conserved(record: &InteractionRecord) {
    let js: f64 = record.root.js_time + record.root.descendant_js_time();
    assert!(
        record.duration() >= js,
        "duration {} < exclusive time {}",
        record.duration(),
        js
    );
}

/// A click whose handler keeps scheduling work through timers. The URL
/// changes, the DOM updates, two requests go out while the interaction is
/// open and a third one after it has ended.
#[test]
fn test_attribution_by_span() {
    let mut tracker = tracker(TrackerConfig {
        ajax_attribution: AjaxAttribution::Span,
        ..Default::default()
    });

    let click = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
    for (id, delay) in [(1, 50.0), (2, 75.0), (3, 100.0), (4, 150.0), (5, 190.0)] {
        tracker.new_timer(TimerId(id), delay, 100.0);
    }
    tracker.callback_end(click, 101.0);

    let t = tracker.timer_fired(TimerId(1), 150.0);
    tracker.url_changed(150.0, "https://shop.test/products", false);
    tracker.callback_end(t, 151.0);

    let a = RequestHandle(1);
    let t = tracker.timer_fired(TimerId(2), 175.0);
    tracker.new_xhr(a, 175.0);
    tracker.xhr_send(a, "GET", "/api/products", 175.0);
    tracker.callback_end(t, 176.0);

    let t = tracker.timer_fired(TimerId(3), 200.0);
    tracker.dom_mutation_observed(200.0);
    tracker.callback_end(t, 201.0);

    tracker.xhr_resolved(a, Some(200), 225.0);

    let b = RequestHandle(2);
    let t = tracker.timer_fired(TimerId(4), 250.0);
    tracker.new_xhr(b, 250.0);
    tracker.xhr_send(b, "GET", "/api/recommendations", 250.0);
    tracker.callback_end(t, 251.0);

    // trailing task
    let t = tracker.timer_fired(TimerId(5), 290.0);
    tracker.callback_end(t, 300.0);

    let c = RequestHandle(3);
    tracker.new_xhr(c, 325.0);
    tracker.xhr_send(c, "POST", "/api/beacon", 325.0);

    tracker.xhr_resolved(b, Some(200), 350.0);
    tracker.xhr_resolved(c, Some(204), 400.0);
    tracker.flush(500.0);

    let sink = tracker.sink();
    assert_eq!(sink.interactions.len(), 1);
    let record = &sink.interactions[0];
    assert_eq!(record.start, 100.0);
    assert_eq!(record.end, 300.0);
    assert!(record.route_change);
    assert!(record.in_progress);
    assert_eq!(record.category, Category::RouteChange);
    assert_eq!(record.dom_timestamp, Some(200.0));

    let children = record.children();
    assert_eq!(children.len(), 2);
    let a = children[0].ajax().unwrap();
    let b = children[1].ajax().unwrap();
    assert_eq!(a.url, "/api/products");
    assert_eq!((children[0].start, children[0].end), (175.0, Some(225.0)));
    assert_eq!(b.url, "/api/recommendations");
    assert_eq!((children[1].start, children[1].end), (250.0, Some(350.0)));

    assert_eq!(sink.ajax.len(), 1);
    assert_eq!(sink.ajax[0].url, "/api/beacon");
    assert_eq!(sink.ajax[0].start, 325.0);
    assert_eq!(sink.ajax[0].end, 400.0);

    assert_time_conserved(record);
    assert_eq!(tracker.live_nodes(), 0);
}

/// Timers beyond the frame's budget are not attached, so when they fire
/// later they cannot extend or reopen the interaction.
#[test]
fn test_timer_budget_bounds_interaction() {
    let mut tracker = tracker(TrackerConfig::default());

    let click = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
    tracker.new_timer(TimerId(1), 500.0, 100.0);
    tracker.new_timer(TimerId(2), 500.0, 100.0);
    tracker.callback_end(click, 101.0);
    assert_eq!(tracker.stats().timers_over_budget, 1);

    let t = tracker.timer_fired(TimerId(1), 600.0);
    tracker.callback_end(t, 602.0);

    // fires after the interaction finished; the next event boundary
    // finalizes it before the callback is attributed
    let excess = tracker.timer_fired(TimerId(2), 610.0);
    assert!(excess.node().is_none());
    assert_eq!(tracker.sink().interactions.len(), 1);
    tracker.callback_end(excess, 640.0);

    tracker.flush(1000.0);
    let sink = tracker.sink();
    assert_eq!(sink.interactions.len(), 1);
    assert_eq!(sink.interactions[0].end, 602.0);
    assert_eq!(tracker.stats().unattributed_callbacks, 1);
    assert_time_conserved(&sink.interactions[0]);
}

/// A self-rescheduling timer chain stops holding the interaction open once
/// a frame asks for more than its budget.
#[test]
fn test_polling_chain_is_cut_off() {
    let mut tracker = tracker(TrackerConfig::default());

    let click = tracker.ui_event(&UiEvent::new(1, "click", 0.0));
    tracker.new_timer(TimerId(1), 400.0, 0.0);
    tracker.callback_end(click, 1.0);

    let t = tracker.timer_fired(TimerId(1), 400.0);
    tracker.new_timer(TimerId(2), 1000.0, 400.0);
    tracker.callback_end(t, 401.0);

    tracker.flush(2000.0);
    assert_eq!(tracker.sink().interactions[0].end, 401.0);
}

/// Lazy-loaded code issues a request right after the click handler
/// returned, in the same tick.
#[test]
fn test_late_request_resurrects_interaction() {
    let mut tracker = tracker(TrackerConfig::default());

    let click = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
    tracker.callback_end(click, 110.0);

    let req = RequestHandle(1);
    tracker.new_xhr(req, 110.0);
    tracker.xhr_send(req, "GET", "/chunk.json", 110.0);
    let cb = tracker.request_callback(req, 180.0);
    tracker.callback_end(cb, 182.0);
    tracker.xhr_resolved(req, Some(200), 182.0);

    tracker.flush(300.0);
    let sink = tracker.sink();
    assert_eq!(sink.interactions.len(), 1);
    assert!(sink.ajax.is_empty());
    let record = &sink.interactions[0];
    assert_eq!(record.end, 182.0);
    assert_eq!(record.children().len(), 1);
    assert_eq!(tracker.stats().interactions_resurrected, 1);
    assert_time_conserved(record);
}

/// Initial page load: scripts run while loading, the load event forces the
/// interaction to finish and paint timings are attached.
#[test]
fn test_initial_page_load() {
    let mut tracker = InteractionTracker::new(
        TrackerConfig::default(),
        CollectingSink::new(),
        Box::new(ManualClock::new(0.0)),
    );
    tracker.set_location("https://shop.test/");

    let boot = tracker.callback_start(None, 20.0);
    let req = RequestHandle(1);
    tracker.fetch_start(req, "GET", "/api/session", 22.0);
    tracker.callback_end(boot, 40.0);

    tracker.paint_observed(spa_core::PaintKind::FirstPaint, 60.0);
    tracker.paint_observed(spa_core::PaintKind::FirstContentfulPaint, 75.0);

    let done = tracker.fetch_done(req, Some(200), 90.0);
    tracker.callback_end(done, 95.0);

    // a click while still loading joins the initial load
    let click = tracker.ui_event(&UiEvent::new(1, "click", 100.0));
    tracker.callback_end(click, 101.0);
    assert_eq!(tracker.stats().interactions_created, 1);

    tracker.page_loaded(400.0);
    tracker.flush(400.0);

    let record = &tracker.sink().interactions[0];
    assert_eq!(record.category, Category::InitialPageLoad);
    assert_eq!(record.start, 0.0);
    assert_eq!(record.end, 400.0);
    assert_eq!(record.first_paint, Some(60.0));
    assert_eq!(record.first_contentful_paint, Some(75.0));
    assert_eq!(record.children().len(), 1);
    assert_eq!(record.root.js_time, 21.0);
    assert_time_conserved(record);
}

/// Two clicks far apart produce two separate interactions and the arena is
/// empty once both are harvested.
#[test]
fn test_sequential_interactions_are_independent() {
    let mut tracker = tracker(TrackerConfig::default());

    for (event, ts) in [(1, 100.0), (2, 1000.0)] {
        let click = tracker.ui_event(&UiEvent::new(event, "click", ts));
        tracker.new_timer(TimerId(event), 10.0, ts);
        tracker.callback_end(click, ts + 1.0);
        let t = tracker.timer_fired(TimerId(event), ts + 10.0);
        tracker.callback_end(t, ts + 12.0);
    }
    tracker.flush(2000.0);

    let emitted = &tracker.sink().interactions;
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].end, 112.0);
    assert_eq!(emitted[1].start, 1000.0);
    assert_eq!(emitted[1].end, 1012.0);
    assert_eq!(tracker.live_interactions(), 0);
    assert_eq!(tracker.live_nodes(), 0);
}
