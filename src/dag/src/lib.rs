//! # Hgraph DAG Module
//!
//! Links gossiped events into the local causal DAG.
//!
//! ## Features
//!
//! - **Event Linker**: parent resolution by descriptor over a bounded working set
//! - **Anomaly Policy**: keep, sever or reject on structural anomalies
//! - **Observers**: anomaly notifications with a metrics-counting decorator
//! - **Pruning**: round-indexed removal of ancient events on window advance
//!
//! ## Module Structure
//!
//! ```text
//! dag/
//! ├── linked_event/  - Linked event nodes and parent links
//! ├── linker/        - Event linker
//! ├── observer/      - Anomaly observer and metrics decorator
//! ├── policy/        - Anomaly policy
//! ├── pruning/       - Round index and pruning stats
//! └── metrics/       - Prometheus counters
//! ```

pub mod error;
pub mod linked_event;
pub mod linker;
pub mod metrics;
pub mod observer;
pub mod policy;
pub mod pruning;

pub use error::{DagError, Result};
pub use linked_event::{LinkedEvent, ParentLink};
pub use linker::EventLinker;
pub use metrics::LinkerMetrics;
pub use observer::{LinkerObserver, MetricsObserver, NoopObserver};
pub use policy::{Anomaly, AnomalyAction, AnomalyPolicy};
pub use pruning::{PruningStats, RoundIndex};
