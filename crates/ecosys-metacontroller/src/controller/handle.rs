//! Cloneable handle given to component tasks and operators

use std::sync::Arc;

use ecosys_common::{
    AllocationRecord, Component, ComponentFault, ComponentId, EcosysError, Result, TradeResult,
};
use ecosys_darwinian::{CapitalAllocator, ComponentRegistry};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Inbound event drained by the controller loop
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A component closed a trade
    Trade {
        id: ComponentId,
        trade: TradeResult,
    },
    /// A component hit a runtime fault
    Failure {
        id: ComponentId,
        fault: ComponentFault,
    },
    /// Operator changed the total capital
    SetCapital(Decimal),
    Pause(ComponentId),
    Resume(ComponentId),
}

/// Sends events to the controller and reads its committed state.
///
/// Never mutates registry or allocation state directly.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerEvent>,
    cancel: CancellationToken,
    registry: Arc<ComponentRegistry>,
    allocator: Arc<CapitalAllocator>,
}

impl ControllerHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<ControllerEvent>,
        cancel: CancellationToken,
        registry: Arc<ComponentRegistry>,
        allocator: Arc<CapitalAllocator>,
    ) -> Self {
        Self {
            tx,
            cancel,
            registry,
            allocator,
        }
    }

    pub async fn report_trade(&self, id: ComponentId, trade: TradeResult) -> Result<()> {
        self.send(ControllerEvent::Trade { id, trade }).await
    }

    pub async fn report_failure(&self, id: ComponentId, reason: impl Into<String>) -> Result<()> {
        self.send(ControllerEvent::Failure {
            id,
            fault: ComponentFault::new(reason),
        })
        .await
    }

    /// Rebalance against a new total on the next tick
    pub async fn set_total_capital(&self, total: Decimal) -> Result<()> {
        self.send(ControllerEvent::SetCapital(total)).await
    }

    pub async fn pause(&self, id: ComponentId) -> Result<()> {
        self.send(ControllerEvent::Pause(id)).await
    }

    pub async fn resume(&self, id: ComponentId) -> Result<()> {
        self.send(ControllerEvent::Resume(id)).await
    }

    /// Ask the loop to shut down
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Last committed allocation
    pub fn allocation(&self) -> Arc<AllocationRecord> {
        self.allocator.current()
    }

    pub fn component(&self, id: &ComponentId) -> Option<Component> {
        self.registry.get(id)
    }

    async fn send(&self, event: ControllerEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EcosysError::Internal("controller is shutting down".to_string()));
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| EcosysError::Internal("controller stopped".to_string()))
    }
}
