//! Exporter seam
//!
//! A harvest drains the buffers into a `HarvestBatch` and hands it to every
//! registered exporter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spa_core::{AjaxRecord, ErrorRecord, InteractionRecord};
use thiserror::Error;

/// Harvest errors
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exporter closed: {0}")]
    Closed(String),
}

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Everything drained from the buffers in one harvest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestBatch {
    pub interactions: Vec<InteractionRecord>,
    pub ajax: Vec<AjaxRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl HarvestBatch {
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.ajax.is_empty() && self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.interactions.len() + self.ajax.len() + self.errors.len()
    }
}

/// Destination for harvested records
#[async_trait]
pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    /// Export a batch, returning how many records were written
    async fn export(&self, batch: &HarvestBatch) -> HarvestResult<usize>;

    async fn flush(&self) -> HarvestResult<()>;
}
