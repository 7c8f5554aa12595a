//! Timer-driven harvest loop

use crate::buffer::HarvestBuffers;
use crate::exporter::{Exporter, HarvestBatch};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Drains the harvest buffers into the registered exporters
pub struct Harvester {
    buffers: HarvestBuffers,
    exporters: Vec<Arc<dyn Exporter>>,
    interval: Duration,
    harvests: AtomicU64,
    export_failures: AtomicU64,
}

impl Harvester {
    /// Create a harvester draining `buffers` every `interval` (at least 1ms)
    pub fn new(buffers: HarvestBuffers, interval: Duration) -> Self {
        Self {
            buffers,
            exporters: Vec::new(),
            interval: interval.max(Duration::from_millis(1)),
            harvests: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
        }
    }

    pub fn add_exporter(&mut self, exporter: Arc<dyn Exporter>) {
        info!("Registered exporter: {}", exporter.name());
        self.exporters.push(exporter);
    }

    pub fn buffers(&self) -> &HarvestBuffers {
        &self.buffers
    }

    /// Harvests that found something to export
    pub fn harvests(&self) -> u64 {
        self.harvests.load(Ordering::Relaxed)
    }

    pub fn export_failures(&self) -> u64 {
        self.export_failures.load(Ordering::Relaxed)
    }

    /// Drain the buffers and hand the batch to every exporter. A failing
    /// exporter is logged and does not stop the others.
    pub async fn harvest_now(&self) -> HarvestBatch {
        let batch = self.buffers.take_batch();
        if batch.is_empty() {
            return batch;
        }
        self.harvests.fetch_add(1, Ordering::Relaxed);
        debug!(
            interactions = batch.interactions.len(),
            ajax = batch.ajax.len(),
            errors = batch.errors.len(),
            "harvesting"
        );

        for exporter in &self.exporters {
            if let Err(e) = exporter.export(&batch).await {
                self.export_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Exporter {} failed: {}", exporter.name(), e);
            }
        }
        batch
    }

    /// Harvest on every interval tick until `shutdown` fires, then harvest
    /// one last time and flush the exporters
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Harvester started with {}ms interval", self.interval.as_millis());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.harvest_now().await;
                }
                _ = shutdown.recv() => {
                    info!("Harvester shutdown signal received");
                    break;
                }
            }
        }

        self.harvest_now().await;
        for exporter in &self.exporters {
            if let Err(e) = exporter.flush().await {
                warn!("Failed to flush exporter {}: {}", exporter.name(), e);
            }
        }
    }
}
