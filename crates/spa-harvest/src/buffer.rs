//! Harvest buffers
//!
//! The engine writes emitted records into bounded in-memory buffers; the
//! harvester drains them on its own schedule. When a buffer is full the
//! oldest records are dropped.

use crate::exporter::HarvestBatch;
use parking_lot::Mutex;
use spa_core::{AjaxRecord, ErrorRecord, HarvestSink, InteractionRecord};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Bounded FIFO of harvestable records
#[derive(Debug)]
pub struct EventBuffer<T> {
    items: VecDeque<T>,
    max_items: usize,
    dropped: u64,
}

impl<T> EventBuffer<T> {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_items: max_items.max(1),
            dropped: 0,
        }
    }

    /// Append a record, dropping the oldest one if the buffer is full
    pub fn add(&mut self, item: T) {
        if self.items.len() >= self.max_items {
            self.items.pop_front();
            self.dropped += 1;
            warn!(
                max_items = self.max_items,
                dropped = self.dropped,
                "Harvest buffer full, dropping oldest record"
            );
        }
        self.items.push_back(item);
    }

    /// Copy of the buffered records, oldest first
    pub fn get(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove and return everything buffered
    pub fn take(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Records lost to the size cap since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug)]
struct Buffers {
    interactions: EventBuffer<InteractionRecord>,
    ajax: EventBuffer<AjaxRecord>,
    errors: EventBuffer<ErrorRecord>,
}

/// Shared handle on the interaction, standalone ajax and error buffers.
///
/// The engine holds one clone as its sink while the harvester drains
/// another.
#[derive(Debug, Clone)]
pub struct HarvestBuffers {
    inner: Arc<Mutex<Buffers>>,
}

impl HarvestBuffers {
    pub fn new(max_items: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Buffers {
                interactions: EventBuffer::new(max_items),
                ajax: EventBuffer::new(max_items),
                errors: EventBuffer::new(max_items),
            })),
        }
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.inner.lock().interactions.get()
    }

    pub fn ajax(&self) -> Vec<AjaxRecord> {
        self.inner.lock().ajax.get()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.inner.lock().errors.get()
    }

    pub fn is_empty(&self) -> bool {
        let buffers = self.inner.lock();
        buffers.interactions.is_empty() && buffers.ajax.is_empty() && buffers.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        let buffers = self.inner.lock();
        buffers.interactions.len() + buffers.ajax.len() + buffers.errors.len()
    }

    pub fn clear(&self) {
        let mut buffers = self.inner.lock();
        buffers.interactions.clear();
        buffers.ajax.clear();
        buffers.errors.clear();
    }

    /// Drain every buffer into one batch
    pub fn take_batch(&self) -> HarvestBatch {
        let mut buffers = self.inner.lock();
        HarvestBatch {
            interactions: buffers.interactions.take(),
            ajax: buffers.ajax.take(),
            errors: buffers.errors.take(),
        }
    }

    /// Records dropped across all buffers
    pub fn dropped(&self) -> u64 {
        let buffers = self.inner.lock();
        buffers.interactions.dropped() + buffers.ajax.dropped() + buffers.errors.dropped()
    }
}

impl HarvestSink for HarvestBuffers {
    fn add_interaction(&mut self, record: InteractionRecord) {
        self.inner.lock().interactions.add(record);
    }

    fn add_ajax(&mut self, record: AjaxRecord) {
        self.inner.lock().ajax.add(record);
    }

    fn add_error(&mut self, record: ErrorRecord) {
        self.inner.lock().errors.add(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ajax(url: &str, start: f64) -> AjaxRecord {
        AjaxRecord {
            method: "GET".to_string(),
            url: url.to_string(),
            status: Some(200),
            start,
            end: start + 10.0,
        }
    }

    #[test]
    fn test_buffer_fifo_order() {
        let mut buffer = EventBuffer::new(10);
        buffer.add(1);
        buffer.add(2);
        buffer.add(3);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(), vec![1, 2, 3]);
        // get leaves the records in place
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take(), vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_drops_oldest_when_full() {
        let mut buffer = EventBuffer::new(2);
        buffer.add("a");
        buffer.add("b");
        buffer.add("c");

        assert_eq!(buffer.get(), vec!["b", "c"]);
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn test_buffer_clear() {
        let mut buffer = EventBuffer::new(4);
        buffer.add(1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_clones_share_buffers() {
        let buffers = HarvestBuffers::new(100);
        let mut sink = buffers.clone();
        sink.add_ajax(ajax("/a", 1.0));
        sink.add_ajax(ajax("/b", 2.0));
        sink.add_error(ErrorRecord {
            interaction_id: None,
            node_id: None,
            message: "boom".to_string(),
            ts: 3.0,
        });

        assert_eq!(buffers.len(), 3);
        assert_eq!(buffers.ajax()[1].url, "/b");

        let batch = buffers.take_batch();
        assert_eq!(batch.ajax.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert!(batch.interactions.is_empty());
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_dropped_counts_all_buffers() {
        let buffers = HarvestBuffers::new(1);
        let mut sink = buffers.clone();
        sink.add_ajax(ajax("/a", 1.0));
        sink.add_ajax(ajax("/b", 2.0));
        assert_eq!(buffers.dropped(), 1);
        assert_eq!(buffers.ajax()[0].url, "/b");
    }
}
