//! Boundary-event scripts
//!
//! A script is a JSONL file of recorded boundary events and host API calls,
//! one per line. It lets the engine be driven offline, without a browser.

use crate::events::BoundaryEvent;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Script I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid script line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize script step: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// A host API call, made against the interaction bound to the active node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "api", rename_all = "snake_case")]
pub enum ApiCall {
    /// Bind to the current interaction, creating one if none is open
    Interaction { ts: Timestamp },

    ActionText { ts: Timestamp, text: String },

    SetName {
        ts: Timestamp,
        name: String,
        #[serde(default)]
        trigger: Option<String>,
    },

    SetAttribute {
        ts: Timestamp,
        key: String,
        value: Value,
    },

    Save { ts: Timestamp },

    Ignore { ts: Timestamp },

    End { ts: Timestamp },

    RouteName { ts: Timestamp, name: String },

    /// Arm a tracer; `tracer` is a script-local handle
    CreateTracer {
        ts: Timestamp,
        tracer: u64,
        #[serde(default)]
        name: Option<String>,
    },

    /// The tracer's callback begins
    TracerEnter {
        frame: u64,
        ts: Timestamp,
        tracer: u64,
    },

    /// The tracer's callback returns, or throws when `error` is set
    TracerExit {
        frame: u64,
        ts: Timestamp,
        tracer: u64,
        #[serde(default)]
        error: Option<String>,
    },

    /// A tracer used as a marker is resolved without a callback
    TracerEnd { ts: Timestamp, tracer: u64 },
}

impl ApiCall {
    pub fn ts(&self) -> Timestamp {
        match self {
            ApiCall::Interaction { ts }
            | ApiCall::ActionText { ts, .. }
            | ApiCall::SetName { ts, .. }
            | ApiCall::SetAttribute { ts, .. }
            | ApiCall::Save { ts }
            | ApiCall::Ignore { ts }
            | ApiCall::End { ts }
            | ApiCall::RouteName { ts, .. }
            | ApiCall::CreateTracer { ts, .. }
            | ApiCall::TracerEnter { ts, .. }
            | ApiCall::TracerExit { ts, .. }
            | ApiCall::TracerEnd { ts, .. } => *ts,
        }
    }
}

/// One line of a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Event(BoundaryEvent),
    Api(ApiCall),
}

impl ScriptStep {
    pub fn ts(&self) -> Timestamp {
        match self {
            ScriptStep::Event(event) => event.ts(),
            ScriptStep::Api(call) => call.ts(),
        }
    }
}

impl From<BoundaryEvent> for ScriptStep {
    fn from(event: BoundaryEvent) -> Self {
        ScriptStep::Event(event)
    }
}

impl From<ApiCall> for ScriptStep {
    fn from(call: ApiCall) -> Self {
        ScriptStep::Api(call)
    }
}

/// Parse one non-blank, non-comment line
fn parse_line(line: &str, line_number: u64) -> ScriptResult<ScriptStep> {
    serde_json::from_str(line).map_err(|source| ScriptError::Parse {
        line: line_number,
        source,
    })
}

/// Read a whole script. Blank lines and `#` comments are skipped; a line
/// that does not parse aborts the read.
pub async fn read_script(path: &Path) -> ScriptResult<Vec<ScriptStep>> {
    let file = tokio::fs::File::open(path).await?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut steps = Vec::new();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        steps.push(parse_line(line, line_number)?);
    }

    info!("Read {} script steps from {}", steps.len(), path.display());
    Ok(steps)
}

/// Read a script, skipping lines that do not parse
pub async fn read_script_lenient(path: &Path) -> ScriptResult<Vec<ScriptStep>> {
    let file = tokio::fs::File::open(path).await?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut steps = Vec::new();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line, line_number) {
            Ok(step) => steps.push(step),
            Err(err) => {
                warn!("Skipping script line: {}", err);
                debug!("Line content: {}", line);
            }
        }
    }

    Ok(steps)
}

/// Write a script, one JSON object per line, with an optional leading comment
pub async fn write_script(
    path: &Path,
    steps: &[ScriptStep],
    header: Option<&str>,
) -> ScriptResult<()> {
    let mut out = String::new();
    if let Some(header) = header {
        for line in header.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    for step in steps {
        out.push_str(&serde_json::to_string(step)?);
        out.push('\n');
    }

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(out.as_bytes()).await?;
    file.flush().await?;
    debug!("Wrote {} script steps to {}", steps.len(), path.display());
    Ok(())
}
