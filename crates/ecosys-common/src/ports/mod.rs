//! Collaborator interfaces consumed by the controller
//!
//! - [`store`]: opaque persistence of component and allocation records
//! - [`notify`]: best-effort alerts
//! - [`adapter`]: per-kind execution/data-feed adapters

pub mod adapter;
pub mod notify;
pub mod store;
