//! spa-core - Data model for the interaction correlation engine
//!
//! This crate provides the foundational types shared by the engine, the
//! harvest side and the agent binary:
//!
//! - **Nodes**: the arena of timed nodes and their owning interactions
//! - **Events**: the boundary-event vocabulary emitted by instrumentation
//! - **Records**: the serializable shape handed to the harvest collaborator
//! - **Config**: TOML configuration with environment overrides

pub mod clock;
pub mod config;
pub mod context_store;
pub mod events;
pub mod interaction;
pub mod node;
pub mod record;
pub mod script;
pub mod sink;
pub mod stats;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    AgentConfig, AjaxAttribution, ConfigError, ConfigLoader, ConfigResult, HarvestSettings,
    ResurrectionSettings, TrackerConfig,
};
pub use context_store::{ContextStore, DEFAULT_NAMESPACE};
pub use events::{
    BoundaryEvent, EventId, PaintKind, RequestHandle, Resume, ScriptHandle, TimerId, UiEvent,
};
pub use interaction::{EndHandler, Interaction, InteractionId, InteractionState};
pub use node::{AjaxAttrs, Node, NodeArena, NodeAttrs, NodeId, NodeKind};
pub use record::{AjaxRecord, Category, ErrorRecord, InteractionRecord, NodeRecord};
pub use script::{ApiCall, ScriptError, ScriptResult, ScriptStep};
pub use sink::{CollectingSink, HarvestSink};
pub use stats::TrackerStats;

/// Milliseconds on the page's high-resolution timeline, already corrected
/// by the caller.
pub type Timestamp = f64;

/// Agent version
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
