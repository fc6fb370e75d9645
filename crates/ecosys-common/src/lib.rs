//! # Ecosys Common
//!
//! Shared types, errors, and collaborator ports for the Ecosys meta-controller.
//!
//! ## Core Types
//!
//! - [`Component`]: a managed unit (generator, evaluator, deployer, risk manager, data feeder)
//! - [`ComponentMetrics`]: rolling performance record over one evaluation window
//! - [`AllocationRecord`]: committed split of total capital across active components
//! - [`Generation`]: one evaluation epoch
//!
//! ## Ports
//!
//! - [`ports::store`]: opaque key/blob persistence
//! - [`ports::notify`]: best-effort alert sink
//! - [`ports::adapter`]: per-kind execution/data-feed adapters polled every tick

pub mod error;
pub mod ports;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{EcosysError, Result};
pub use ports::{
    adapter::{AdapterError, ComponentAdapter, ComponentFault},
    notify::{ChannelNotifier, LogNotifier, Notification, NotificationKind, NotificationSink},
    store::{EntityType, InMemoryStore, PersistentStore, StoreError},
};
pub use types::{
    allocation::{AllocationRecord, Allotment},
    component::{Component, ComponentId, ComponentKind, ComponentStatus, TransitionRecord},
    generation::Generation,
    metrics::{ComponentMetrics, TradeResult},
};

/// Ecosys version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum number of evaluated components needed to run a selection
pub const MIN_SELECTION_SAMPLE: usize = 2;

/// Tolerance used when checking allocation invariants on floating point fractions
pub const ALLOCATION_EPSILON: f64 = 1e-9;
