//! # Hgraph Intake Module
//!
//! Admission stages that run before an event is linked.
//!
//! - **Intake Counter**: per-peer tally of events inside the pipeline, used
//!   by the gossip scheduler for backpressure
//! - **Signature Validator**: authenticates events against the roster that
//!   covers their birth round

pub mod counter;
pub mod error;
pub mod metrics;
pub mod validator;

pub use counter::{DefaultIntakeEventCounter, IntakeEventCounter, NoOpIntakeEventCounter};
pub use error::{IntakeError, Result};
pub use metrics::IntakeMetrics;
pub use validator::{SignatureValidator, ValidationFailure};
