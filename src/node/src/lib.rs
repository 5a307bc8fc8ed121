//! Hgraph Node Library
//!
//! This crate assembles the intake subsystems into one pipeline per node:
//! signature validation, the intake counter, event linking and the reconnect
//! controller, together with configuration, metrics, tracing setup and the
//! dispatch of application callbacks.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod self_event;
pub mod stale;
pub mod telemetry;

pub use callbacks::CallbackDispatcher;
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use metrics::PipelineMetrics;
pub use pipeline::{IntakePipeline, SubmitOutcome};
pub use self_event::SelfEventBuilder;
pub use stale::StaleEventDetector;
pub use telemetry::init_tracing;
