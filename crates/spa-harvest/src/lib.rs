//! Harvest side of the correlation engine
//!
//! The engine pushes emitted interactions, standalone requests and errors
//! into `HarvestBuffers`. A `Harvester` drains them on a timer or on demand
//! and hands each batch to its exporters.

pub mod buffer;
pub mod exporter;
pub mod harvester;
pub mod jsonl;

pub use buffer::{EventBuffer, HarvestBuffers};
pub use exporter::{Exporter, HarvestBatch, HarvestError, HarvestResult};
pub use harvester::Harvester;
pub use jsonl::{JsonlExporter, JsonlExporterConfig};
