//! Component - a managed unit of the trading ecosystem
//!
//! Five kinds exist:
//! - Generator: produces candidate strategies (capital bearing)
//! - Deployer: runs a strategy against an exchange (capital bearing)
//! - Evaluator, RiskManager, DataFeeder: infrastructure, never ranked or funded
//!
//! Status moves through a closed state machine; see [`ComponentStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique component identifier (time-ordered UUIDv7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ComponentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Component kind classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Generator,
    Evaluator,
    Deployer,
    RiskManager,
    DataFeeder,
}

impl ComponentKind {
    /// Every kind, in bootstrap order
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::DataFeeder,
        ComponentKind::RiskManager,
        ComponentKind::Evaluator,
        ComponentKind::Generator,
        ComponentKind::Deployer,
    ];

    /// Strategy kinds own a strategy id, are ranked by the evolution engine and receive capital
    pub fn is_strategy(self) -> bool {
        match self {
            ComponentKind::Generator | ComponentKind::Deployer => true,
            ComponentKind::Evaluator | ComponentKind::RiskManager | ComponentKind::DataFeeder => {
                false
            }
        }
    }

    /// Kind registered in place of a failed or culled component of this kind
    pub fn replacement(self) -> ComponentKind {
        if self.is_strategy() {
            ComponentKind::Generator
        } else {
            self
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKind::Generator => write!(f, "strategy_generator"),
            ComponentKind::Evaluator => write!(f, "strategy_evaluator"),
            ComponentKind::Deployer => write!(f, "strategy_deployer"),
            ComponentKind::RiskManager => write!(f, "risk_manager"),
            ComponentKind::DataFeeder => write!(f, "data_feeder"),
        }
    }
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Initializing,
    Active,
    Paused,
    Evolving,
    Failed,
    Terminated,
}

impl ComponentStatus {
    /// Whether `next` is reachable from `self` in one step.
    ///
    /// Main paths: Initializing -> Active, Active <-> Paused, Active -> Evolving -> Active or
    /// Terminated, Failed -> Terminated. Any live status may fail or be terminated.
    /// Terminated is absorbing.
    pub fn can_transition_to(self, next: ComponentStatus) -> bool {
        use ComponentStatus::*;

        match (self, next) {
            (Terminated, _) => false,
            (from, to) if from == to => false,
            (Initializing, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            (Active, Evolving) => true,
            (Evolving, Active) => true,
            (_, Failed) => self != Failed,
            (_, Terminated) => true,
            _ => false,
        }
    }

    /// Terminated components are kept for audit but never touched again
    pub fn is_terminal(self) -> bool {
        self == ComponentStatus::Terminated
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Initializing => write!(f, "initializing"),
            ComponentStatus::Active => write!(f, "active"),
            ComponentStatus::Paused => write!(f, "paused"),
            ComponentStatus::Evolving => write!(f, "evolving"),
            ComponentStatus::Failed => write!(f, "failed"),
            ComponentStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// A managed component instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique identifier
    pub id: ComponentId,

    /// Kind
    pub kind: ComponentKind,

    /// Current lifecycle status
    pub status: ComponentStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Generation in which the component was created or last re-evaluated
    pub generation: u64,

    /// Owning strategy (generator/deployer kinds only)
    pub strategy_id: Option<String>,

    /// Timestamp of the last status change
    pub status_changed_at: DateTime<Utc>,
}

impl Component {
    /// Create a new component in `Initializing` status
    pub fn new(kind: ComponentKind, generation: u64) -> Self {
        let id = ComponentId::new();
        let now = Utc::now();
        let strategy_id = kind
            .is_strategy()
            .then(|| format!("strat-g{}-{}", generation, id.0.simple()));

        Self {
            id,
            kind,
            status: ComponentStatus::Initializing,
            created_at: now,
            generation,
            strategy_id,
            status_changed_at: now,
        }
    }

    /// Set an explicit strategy id
    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    /// Set the creation timestamp (restores, tests)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.status_changed_at = created_at;
        self
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ComponentStatus::Active
    }
}

/// Audit entry written for every status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub component_id: ComponentId,
    pub kind: ComponentKind,
    pub from: ComponentStatus,
    pub to: ComponentStatus,
    pub at: DateTime<Utc>,
}
