//! Component adapter port
//!
//! One adapter per component kind bridges the controller to whatever actually runs the
//! component (exchange executor, data feed, evaluator process). Failures are explicit values
//! checked every tick.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{component::ComponentId, metrics::TradeResult};

/// Runtime fault reported by a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFault {
    pub reason: String,
}

impl ComponentFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ComponentFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Errors from adapter calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("Component unreachable: {0}")]
    Unreachable(String),

    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("Adapter error: {0}")]
    Other(String),
}

/// Trait for execution/data-feed adapters polled by the controller
#[async_trait]
pub trait ComponentAdapter: Send + Sync {
    /// Drain trades closed by the component since the previous poll
    async fn report_metrics(&self, id: ComponentId) -> Result<Vec<TradeResult>, AdapterError>;

    /// Current runtime fault, if any
    async fn report_failure(&self, id: ComponentId) -> Option<ComponentFault>;
}
