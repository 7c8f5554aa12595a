//! Async subsystem adapters
//!
//! Each adapter maps the boundary events of one async source onto the
//! context pointer protocol. Work is keyed by the source's handle (timer id,
//! request object, script element, DOM event) so that the node can be
//! resumed when the work comes back, detached from the frame that started it.

mod jsonp;
mod network;
mod timer;
mod ui;
