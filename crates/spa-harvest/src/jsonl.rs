//! JSONL file exporter

use crate::exporter::{Exporter, HarvestBatch, HarvestError, HarvestResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// JSONL exporter configuration
#[derive(Debug, Clone)]
pub struct JsonlExporterConfig {
    /// Output file path
    pub path: PathBuf,

    /// Whether to append to existing file
    pub append: bool,

    /// Pretty print JSON (one record then spans several lines)
    pub pretty: bool,

    /// Flush after each batch
    pub flush_each: bool,
}

impl Default for JsonlExporterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("spa-harvest.jsonl"),
            append: true,
            pretty: false,
            flush_each: true,
        }
    }
}

impl From<&spa_core::HarvestSettings> for JsonlExporterConfig {
    fn from(settings: &spa_core::HarvestSettings) -> Self {
        Self {
            path: PathBuf::from(&settings.path),
            append: settings.append,
            pretty: settings.pretty,
            flush_each: true,
        }
    }
}

/// One output line
#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    kind: &'static str,
    harvested_at: DateTime<Utc>,
    #[serde(flatten)]
    record: &'a T,
}

/// Writes each harvested record as one JSON line tagged with its `kind`
pub struct JsonlExporter {
    config: JsonlExporterConfig,
    writer: Mutex<Option<BufWriter<File>>>,
    records_written: AtomicU64,
}

impl JsonlExporter {
    /// Open the output file
    pub fn open(config: JsonlExporterConfig) -> HarvestResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)?
        } else {
            File::create(&config.path)?
        };
        info!("JSONL exporter writing to: {:?}", config.path);

        Ok(Self {
            config,
            writer: Mutex::new(Some(BufWriter::new(file))),
            records_written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Flush and close the file. Later exports fail with `Closed`.
    pub fn close(&self) -> HarvestResult<()> {
        if let Some(mut w) = self.writer.lock().take() {
            w.flush()?;
        }
        Ok(())
    }

    fn write_line<T: Serialize>(
        &self,
        w: &mut BufWriter<File>,
        kind: &'static str,
        harvested_at: DateTime<Utc>,
        record: &T,
    ) -> HarvestResult<()> {
        let line = Line {
            kind,
            harvested_at,
            record,
        };
        let json = if self.config.pretty {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        writeln!(w, "{}", json)?;
        Ok(())
    }
}

#[async_trait]
impl Exporter for JsonlExporter {
    fn name(&self) -> &str {
        "jsonl-exporter"
    }

    async fn export(&self, batch: &HarvestBatch) -> HarvestResult<usize> {
        let mut guard = self.writer.lock();
        let w = guard
            .as_mut()
            .ok_or_else(|| HarvestError::Closed(self.config.path.display().to_string()))?;

        let harvested_at = Utc::now();
        for record in &batch.interactions {
            self.write_line(w, "interaction", harvested_at, record)?;
        }
        for record in &batch.ajax {
            self.write_line(w, "ajax", harvested_at, record)?;
        }
        for record in &batch.errors {
            self.write_line(w, "error", harvested_at, record)?;
        }
        if self.config.flush_each {
            w.flush()?;
        }

        let count = batch.len();
        self.records_written
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(count, "records written");
        Ok(count)
    }

    async fn flush(&self) -> HarvestResult<()> {
        if let Some(w) = self.writer.lock().as_mut() {
            w.flush()?;
        }
        Ok(())
    }
}
