//! Demo script generator
//!
//! Produces a recorded session of a single-page app: a click that navigates
//! to a product list through a chain of timers, two requests made while the
//! navigation is in progress, and a beacon sent after it has finished.

use spa_core::config::AjaxAttribution;
use spa_core::{
    BoundaryEvent, PaintKind, RequestHandle, ScriptStep, TimerId, TrackerConfig, UiEvent,
};

pub const ORIGIN: &str = "https://shop.example/";
pub const PRODUCTS_URL: &str = "https://shop.example/products";

/// Tracker policy the demo session is meant to be replayed with
pub fn demo_config(base: &TrackerConfig) -> TrackerConfig {
    TrackerConfig {
        ajax_attribution: AjaxAttribution::Span,
        initial_page_load: false,
        ..base.clone()
    }
}

fn step(event: BoundaryEvent) -> ScriptStep {
    ScriptStep::Event(event)
}

fn timer_frame(frame: u64, id: u64, ts: f64) -> ScriptStep {
    step(BoundaryEvent::TimerFired {
        frame,
        ts,
        id: TimerId(id),
    })
}

fn end(frame: u64, ts: f64) -> ScriptStep {
    step(BoundaryEvent::CallbackEnd { frame, ts })
}

fn request(handle: u64, method: &str, url: &str, ts: f64) -> [ScriptStep; 2] {
    [
        step(BoundaryEvent::NewXhr {
            ts,
            handle: RequestHandle(handle),
        }),
        step(BoundaryEvent::XhrSend {
            ts,
            handle: RequestHandle(handle),
            method: method.to_string(),
            url: url.to_string(),
        }),
    ]
}

fn resolved(handle: u64, ts: f64) -> ScriptStep {
    step(BoundaryEvent::XhrResolved {
        ts,
        handle: RequestHandle(handle),
        status: Some(200),
    })
}

/// The route-change session
pub fn route_change_script() -> Vec<ScriptStep> {
    let mut steps = vec![
        step(BoundaryEvent::Paint {
            ts: 40.0,
            name: PaintKind::FirstPaint,
        }),
        step(BoundaryEvent::UiEvent {
            frame: 1,
            event: UiEvent::new(1, "click", 100.0).with_target_text("Products"),
        }),
    ];
    for (id, delay) in [(1, 50.0), (2, 75.0), (3, 100.0), (4, 150.0), (5, 190.0)] {
        steps.push(step(BoundaryEvent::NewTimer {
            ts: 100.0,
            id: TimerId(id),
            delay,
        }));
    }
    steps.push(end(1, 101.0));

    // router pushes the new URL
    steps.push(timer_frame(2, 1, 150.0));
    steps.push(step(BoundaryEvent::UrlChanged {
        ts: 150.0,
        url: PRODUCTS_URL.to_string(),
        hash_only: false,
    }));
    steps.push(end(2, 151.0));

    steps.push(timer_frame(3, 2, 175.0));
    steps.extend(request(1, "GET", "/api/products", 175.0));
    steps.push(end(3, 176.0));

    // view renders
    steps.push(timer_frame(4, 3, 200.0));
    steps.push(step(BoundaryEvent::DomMutation { ts: 200.0 }));
    steps.push(end(4, 201.0));

    steps.push(resolved(1, 225.0));

    steps.push(timer_frame(5, 4, 250.0));
    steps.extend(request(2, "GET", "/api/recommendations", 250.0));
    steps.push(end(5, 251.0));

    // trailing task
    steps.push(timer_frame(6, 5, 290.0));
    steps.push(end(6, 300.0));

    // analytics beacon after the navigation finished
    steps.extend(request(3, "POST", "/api/beacon", 325.0));
    steps.push(resolved(2, 350.0));
    steps.push(resolved(3, 400.0));

    steps
}
