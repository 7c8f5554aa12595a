//! Interaction correlation engine
//!
//! Correlates the boundary events reported by browser instrumentation into
//! interaction trees: which timers, requests, scripts and callbacks belong
//! to which user-perceived unit of work, and when that work is done.
//!
//! The engine is synchronous and single-threaded. Instrumentation calls the
//! adapter methods on `InteractionTracker` in the order the event loop runs
//! them; finished interactions are handed to a `HarvestSink`.

mod adapters;
pub mod api;
mod context;
mod finalize;
mod lifecycle;
pub mod tracer;
mod tracker;

#[cfg(test)]
mod scenarios;

pub use api::InteractionApi;
pub use context::Frame;
pub use tracer::Tracer;
pub use tracker::InteractionTracker;
