//! Component Registry
//!
//! Source of truth for every managed component. Provides:
//! - Registration of new components in `Initializing` status
//! - Validated status transitions, serialized per component id
//! - Filtered listing by kind and status
//! - A bounded audit trail of every transition

use std::collections::VecDeque;

use chrono::Utc;
use dashmap::DashMap;
use ecosys_common::{
    Component, ComponentId, ComponentKind, ComponentStatus, EcosysError, Result, TransitionRecord,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Default number of transitions kept in the audit trail
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentFilter {
    pub kind: Option<ComponentKind>,
    pub status: Option<ComponentStatus>,
    /// Only generator/deployer kinds
    pub strategies_only: bool,
}

impl ComponentFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ComponentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(mut self, status: ComponentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn strategies(mut self) -> Self {
        self.strategies_only = true;
        self
    }

    fn matches(&self, component: &Component) -> bool {
        self.kind.map_or(true, |k| component.kind == k)
            && self.status.map_or(true, |s| component.status == s)
            && (!self.strategies_only || component.kind.is_strategy())
    }
}

/// Component counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub initializing: usize,
    pub active: usize,
    pub paused: usize,
    pub evolving: usize,
    pub failed: usize,
    pub terminated: usize,
}

impl PopulationCounts {
    /// Components that are not terminated
    pub fn live(&self) -> usize {
        self.initializing + self.active + self.paused + self.evolving + self.failed
    }
}

/// Concurrent component registry
pub struct ComponentRegistry {
    /// All components by id; the entry lock serializes transitions on one id
    components: DashMap<ComponentId, Component>,
    /// Most recent transitions, oldest first
    audit: Mutex<VecDeque<TransitionRecord>>,
    audit_capacity: usize,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl ComponentRegistry {
    /// Create a registry keeping at most `audit_capacity` transitions
    pub fn new(audit_capacity: usize) -> Self {
        Self {
            components: DashMap::new(),
            audit: Mutex::new(VecDeque::with_capacity(audit_capacity.min(1024))),
            audit_capacity: audit_capacity.max(1),
        }
    }

    /// Register a new component in `Initializing` status
    #[instrument(skip(self))]
    pub fn register(&self, kind: ComponentKind, generation: u64) -> ComponentId {
        let component = Component::new(kind, generation);
        let id = component.id;
        self.components.insert(id, component);
        info!(component_id = %id, %kind, generation, "Registered component");
        id
    }

    /// Re-insert a persisted component as-is
    pub fn restore(&self, component: Component) {
        debug!(component_id = %component.id, status = %component.status, "Restored component");
        self.components.insert(component.id, component);
    }

    /// Move a component to `to`, failing with `InvalidTransition` when unreachable
    pub fn transition(&self, id: ComponentId, to: ComponentStatus) -> Result<TransitionRecord> {
        let mut component = self
            .components
            .get_mut(&id)
            .ok_or(EcosysError::ComponentNotFound(id))?;

        let from = component.status;
        if !from.can_transition_to(to) {
            return Err(EcosysError::InvalidTransition { id, from, to });
        }

        let now = Utc::now();
        component.status = to;
        component.status_changed_at = now;

        let record = TransitionRecord {
            component_id: id,
            kind: component.kind,
            from,
            to,
            at: now,
        };

        // Appended while the entry is held so the trail keeps per-id order
        self.push_audit(record.clone());
        drop(component);

        info!(component_id = %id, %from, %to, at = %now, "Component transition");
        Ok(record)
    }

    /// Stamp a surviving component with the generation it was re-evaluated in
    pub fn mark_evaluated(&self, id: ComponentId, generation: u64) -> Result<()> {
        let mut component = self
            .components
            .get_mut(&id)
            .ok_or(EcosysError::ComponentNotFound(id))?;
        component.generation = generation;
        Ok(())
    }

    /// Get a component by id
    pub fn get(&self, id: &ComponentId) -> Option<Component> {
        self.components.get(id).map(|c| c.clone())
    }

    /// Components matching the filter, oldest first
    pub fn list(&self, filter: &ComponentFilter) -> Vec<Component> {
        let mut components: Vec<Component> = self
            .components
            .iter()
            .filter(|c| filter.matches(c.value()))
            .map(|c| c.value().clone())
            .collect();
        components.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        components
    }

    /// Ids of ACTIVE components
    pub fn active_ids(&self) -> Vec<ComponentId> {
        self.list(&ComponentFilter::any().status(ComponentStatus::Active))
            .into_iter()
            .map(|c| c.id)
            .collect()
    }

    /// Transitions recorded for one component, oldest first
    pub fn audit_trail(&self, id: &ComponentId) -> Vec<TransitionRecord> {
        self.audit
            .lock()
            .iter()
            .filter(|r| r.component_id == *id)
            .cloned()
            .collect()
    }

    /// The latest `n` transitions across all components, oldest first
    pub fn recent_transitions(&self, n: usize) -> Vec<TransitionRecord> {
        let audit = self.audit.lock();
        audit.iter().skip(audit.len().saturating_sub(n)).cloned().collect()
    }

    /// Counts per status
    pub fn population(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for entry in self.components.iter() {
            match entry.status {
                ComponentStatus::Initializing => counts.initializing += 1,
                ComponentStatus::Active => counts.active += 1,
                ComponentStatus::Paused => counts.paused += 1,
                ComponentStatus::Evolving => counts.evolving += 1,
                ComponentStatus::Failed => counts.failed += 1,
                ComponentStatus::Terminated => counts.terminated += 1,
            }
        }
        counts
    }

    /// Total number of components, terminated included
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn push_audit(&self, record: TransitionRecord) {
        let mut audit = self.audit.lock();
        if audit.len() >= self.audit_capacity {
            audit.pop_front();
        }
        audit.push_back(record);
    }
}
