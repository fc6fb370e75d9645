//! # Ecosys Meta-Controller
//!
//! Generational orchestration of a population of trading-strategy components.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     MetaController                       │
//! │   events (mpsc) ─┐    ticker ─┐    CancellationToken     │
//! │                  ▼            ▼                          │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────┐  │
//! │  │  Registry  │  │  Metrics   │  │  Evolution Engine  │  │
//! │  │ (statuses) │  │ Collector  │  │ (rank, cull, seed) │  │
//! │  └─────┬──────┘  └─────┬──────┘  └─────────┬──────────┘  │
//! │        └───────────────┼───────────────────┘             │
//! │                 ┌──────┴───────┐                         │
//! │                 │   Capital    │──▶ Persister ──▶ Store  │
//! │                 │  Allocator   │                         │
//! │                 └──────────────┘                         │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod file_store;
pub mod logging;
pub mod persistence;
pub mod telemetry;

pub use config::{ControllerConfig, Environment};
pub use controller::{
    BootstrapReport, ControllerEvent, ControllerHandle, MetaController, ShutdownReport, TickReport,
};
pub use file_store::JsonFileStore;
pub use persistence::{PersistStats, Persister, RetryPolicy};
