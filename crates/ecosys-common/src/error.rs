//! Error types for the Ecosys meta-controller
//!
//! One unified error type carrying the controller's failure taxonomy. Most variants are
//! recoverable at the population level; only configuration failures abort startup.

use thiserror::Error;

use crate::types::component::{ComponentId, ComponentStatus};

/// Result type alias using EcosysError
pub type Result<T> = std::result::Result<T, EcosysError>;

/// Unified error type for Ecosys operations
#[derive(Debug, Error)]
pub enum EcosysError {
    // Lifecycle errors
    #[error("Invalid transition for component {id}: {from} -> {to}")]
    InvalidTransition {
        id: ComponentId,
        from: ComponentStatus,
        to: ComponentStatus,
    },

    #[error("Component not found: {0}")]
    ComponentNotFound(ComponentId),

    // Evolution errors
    #[error("Insufficient sample: {eligible} evaluated components, at least {required} required")]
    InsufficientSample { eligible: usize, required: usize },

    // Allocation errors
    #[error("Risk limit breach: drawdown exposure {exposure:.4} exceeds limit {limit:.4}")]
    RiskLimitBreach { exposure: f64, limit: f64 },

    #[error("Allocation is frozen")]
    AllocationFrozen,

    // Runtime errors
    #[error("Component {id} failed: {reason}")]
    ComponentFailure { id: ComponentId, reason: String },

    // Storage errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::ports::store::StoreError),

    // Configuration errors
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EcosysError {
    /// Whether the process can keep running after this error.
    ///
    /// `InvalidTransition` is fatal to the offending call only, so it counts as recoverable
    /// here; configuration failures are the one startup abort.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EcosysError::ConfigValidation(_))
    }
}

impl From<serde_json::Error> for EcosysError {
    fn from(err: serde_json::Error) -> Self {
        EcosysError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for EcosysError {
    fn from(err: anyhow::Error) -> Self {
        EcosysError::Internal(err.to_string())
    }
}
