//! Harvest collaborator seam
//!
//! The engine never performs I/O. Everything it produces goes through this
//! trait to whatever buffers the host drains.

use crate::record::{AjaxRecord, ErrorRecord, InteractionRecord};

pub trait HarvestSink {
    fn add_interaction(&mut self, record: InteractionRecord);

    fn add_ajax(&mut self, record: AjaxRecord);

    fn add_error(&mut self, record: ErrorRecord);
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub interactions: Vec<InteractionRecord>,
    pub ajax: Vec<AjaxRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.ajax.is_empty() && self.errors.is_empty()
    }
}

impl HarvestSink for CollectingSink {
    fn add_interaction(&mut self, record: InteractionRecord) {
        self.interactions.push(record);
    }

    fn add_ajax(&mut self, record: AjaxRecord) {
        self.ajax.push(record);
    }

    fn add_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }
}

impl<S: HarvestSink + ?Sized> HarvestSink for Box<S> {
    fn add_interaction(&mut self, record: InteractionRecord) {
        (**self).add_interaction(record)
    }

    fn add_ajax(&mut self, record: AjaxRecord) {
        (**self).add_ajax(record)
    }

    fn add_error(&mut self, record: ErrorRecord) {
        (**self).add_error(record)
    }
}
