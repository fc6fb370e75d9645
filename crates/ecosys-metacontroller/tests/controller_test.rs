//! Integration tests for the meta-controller loop
//!
//! - Bootstrap and restart recovery
//! - Generation selection, culling and replacement
//! - Failure handling and emergency replacement
//! - Allocation on population and capital changes
//! - Shutdown persistence and store outages

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ecosys_common::{
    AdapterError, AllocationRecord, ChannelNotifier, Component, ComponentAdapter, ComponentFault,
    ComponentId, ComponentKind, ComponentStatus, EntityType, InMemoryStore, LogNotifier,
    Notification, NotificationKind, PersistentStore, StoreError, TradeResult,
};
use ecosys_darwinian::ComponentFilter;
use ecosys_metacontroller::{ControllerConfig, MetaController};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

/// Adapter whose faults and trades are scripted by the test
#[derive(Default)]
struct ScriptedAdapter {
    faults: Mutex<HashMap<ComponentId, String>>,
    trades: Mutex<HashMap<ComponentId, Vec<TradeResult>>>,
}

impl ScriptedAdapter {
    fn fail(&self, id: ComponentId, reason: &str) {
        self.faults.lock().insert(id, reason.to_string());
    }

    fn queue_trades(&self, id: ComponentId, returns: &[f64]) {
        self.trades
            .lock()
            .entry(id)
            .or_default()
            .extend(returns.iter().map(|r| TradeResult::new(*r)));
    }
}

#[async_trait]
impl ComponentAdapter for ScriptedAdapter {
    async fn report_metrics(&self, id: ComponentId) -> Result<Vec<TradeResult>, AdapterError> {
        Ok(self.trades.lock().remove(&id).unwrap_or_default())
    }

    async fn report_failure(&self, id: ComponentId) -> Option<ComponentFault> {
        self.faults.lock().get(&id).cloned().map(ComponentFault::new)
    }
}

/// Store whose writes hang for an hour
struct StalledStore;

#[async_trait]
impl PersistentStore for StalledStore {
    async fn save(
        &self,
        _entity: EntityType,
        _id: &str,
        _blob: Vec<u8>,
    ) -> Result<(), StoreError> {
        tokio::time::sleep(StdDuration::from_secs(3_600)).await;
        Err(StoreError::Unavailable("stalled".into()))
    }

    async fn load(&self, _entity: EntityType, _id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    async fn list(&self, _entity: EntityType) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(Vec::new())
    }
}

fn test_config(initial_generators: usize) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.evolution.initial_generators = initial_generators;
    config.runtime.tick_interval_ms = 10;
    config.persistence.base_backoff_ms = 1;
    config
}

fn controller(config: ControllerConfig, store: Arc<InMemoryStore>) -> MetaController {
    MetaController::new(config, store, Arc::new(LogNotifier)).unwrap()
}

fn strategies(controller: &MetaController, status: ComponentStatus) -> Vec<Component> {
    controller
        .registry()
        .list(&ComponentFilter::any().strategies().status(status))
}

fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut received = Vec::new();
    while let Ok(n) = rx.try_recv() {
        received.push(n);
    }
    received
}

#[tokio::test]
async fn test_bootstrap_brings_up_every_kind() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(5), store);

    let report = controller.bootstrap().await.unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.created, 9);
    assert_eq!(report.generation, 0);

    for kind in ComponentKind::ALL {
        let active = controller
            .registry()
            .list(&ComponentFilter::any().kind(kind).status(ComponentStatus::Active));
        assert!(!active.is_empty(), "no active {kind}");
    }

    // 5 generators + 1 deployer, each capped at 10%
    let allocation = controller.allocation();
    assert_eq!(allocation.len(), 6);
    for allotment in allocation.allotments.values() {
        assert_eq!(allotment.amount, dec!(10000));
        assert!(!allotment.risk_constrained);
    }

    for generator in controller
        .registry()
        .list(&ComponentFilter::any().kind(ComponentKind::Generator))
    {
        assert!(generator.strategy_id.is_some());
    }
}

#[tokio::test]
async fn test_generation_keeps_top_fifth_and_replaces_the_rest() {
    let store = Arc::new(InMemoryStore::new());
    // 9 generators plus the bootstrap deployer
    let mut controller = controller(test_config(9), store);
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    let population = strategies(&controller, ComponentStatus::Active);
    assert_eq!(population.len(), 10);

    // Same spread for everyone, so the score rises with the base return
    for (i, component) in population.iter().enumerate() {
        let base = 0.001 * (i as f64 + 1.0);
        handle
            .report_trade(component.id, TradeResult::new(base))
            .await
            .unwrap();
        handle
            .report_trade(component.id, TradeResult::new(base + 0.01))
            .await
            .unwrap();
    }

    let report = controller
        .tick(Utc::now() + Duration::minutes(61))
        .await
        .unwrap();
    let plan = report.generation.expect("generation should run");

    assert_eq!(plan.ranked.len(), 10);
    assert_eq!(plan.survivors, vec![population[9].id, population[8].id]);
    assert_eq!(plan.culled.len(), 8);
    assert_eq!(controller.generation().number, 1);

    for id in &plan.culled {
        let culled = controller.registry().get(id).unwrap();
        assert_eq!(culled.status, ComponentStatus::Terminated);
        let path: Vec<_> = controller
            .registry()
            .audit_trail(id)
            .iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(
            path,
            vec![
                ComponentStatus::Active,
                ComponentStatus::Evolving,
                ComponentStatus::Terminated
            ]
        );
    }

    let active = strategies(&controller, ComponentStatus::Active);
    assert_eq!(active.len(), 10);
    let replacements: Vec<_> = active
        .iter()
        .filter(|c| !plan.survivors.contains(&c.id))
        .collect();
    assert_eq!(replacements.len(), 8);
    for replacement in replacements {
        assert_eq!(replacement.kind, ComponentKind::Generator);
        assert_eq!(replacement.generation, 1);
    }
    for id in &plan.survivors {
        assert_eq!(controller.registry().get(id).unwrap().generation, 1);
    }

    // Allocation follows the new membership
    let allocation = controller.allocation();
    assert_eq!(allocation.len(), 10);
    for id in &plan.culled {
        assert!(!allocation.contains(id));
    }
    assert!(report.rebalance.is_some());
    assert_eq!(controller.metrics().generations_total.get(), 1);
    assert_eq!(controller.metrics().components_culled.get(), 8);
}

#[tokio::test]
async fn test_replacements_are_ranked_at_the_next_generation() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(9), store);
    controller.bootstrap().await.unwrap();

    let first = controller
        .run_generation(Utc::now())
        .unwrap()
        .expect("first generation should run");
    assert_eq!(first.ranked.len(), 10);
    assert_eq!(first.culled.len(), 8);

    // Every member of the new population existed when generation 1 opened
    let opened = controller.generation();
    assert_eq!(opened.number, 1);
    for component in strategies(&controller, ComponentStatus::Active) {
        assert!(component.created_at <= opened.started_at);
    }

    let second = controller
        .run_generation(Utc::now())
        .unwrap()
        .expect("second generation should run");
    assert_eq!(second.generation, 1);
    assert_eq!(second.ranked.len(), 10);
    assert_eq!(second.survivors.len(), 2);
    assert_eq!(second.culled.len(), 8);
    assert_eq!(controller.generation().number, 2);
}

#[tokio::test]
async fn test_elapsed_evaluation_period_triggers_generation() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config(5);
    // Interval far beyond the period, so only the period can trigger
    config.evolution.generation_interval_minutes = 525_600;
    config.evolution.evaluation_period_days = 1;
    let mut controller = controller(config, store);
    controller.bootstrap().await.unwrap();
    let start = Utc::now();

    let report = controller.tick(start + Duration::hours(12)).await.unwrap();
    assert!(report.generation.is_none());
    assert_eq!(controller.metrics().generations_skipped.get(), 0);

    let report = controller
        .tick(start + Duration::days(1) + Duration::minutes(1))
        .await
        .unwrap();
    let plan = report.generation.expect("period end should run a generation");
    assert_eq!(plan.ranked.len(), 6);
    assert_eq!(controller.generation().number, 1);

    // The next period starts with the new generation
    let report = controller
        .tick(start + Duration::days(1) + Duration::minutes(2))
        .await
        .unwrap();
    assert!(report.generation.is_none());
    assert_eq!(controller.generation().number, 1);
}

#[tokio::test]
async fn test_zero_survival_rate_keeps_the_best() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config(9);
    config.evolution.survival_rate = 0.0;
    let mut controller = controller(config, store);
    controller.bootstrap().await.unwrap();

    let plan = controller
        .run_generation(Utc::now())
        .unwrap()
        .expect("generation should run");
    assert_eq!(plan.survivors.len(), 1);
    assert_eq!(plan.culled.len(), 9);
    assert_eq!(strategies(&controller, ComponentStatus::Active).len(), 10);
}

#[tokio::test]
async fn test_insufficient_sample_skips_without_advancing() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(1), store);
    controller.bootstrap().await.unwrap();

    // Generator + deployer; pausing one leaves a single eligible component
    let generator = controller
        .registry()
        .list(&ComponentFilter::any().kind(ComponentKind::Generator))[0]
        .id;
    controller.pause(generator).unwrap();

    let report = controller
        .tick(Utc::now() + Duration::minutes(61))
        .await
        .unwrap();
    assert!(report.generation.is_none());
    assert_eq!(controller.generation().number, 0);
    assert_eq!(controller.metrics().generations_skipped.get(), 1);
    assert_eq!(strategies(&controller, ComponentStatus::Active).len(), 1);
}

#[tokio::test]
async fn test_failed_component_is_excluded_within_one_tick() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::default());
    let (notifier, mut alerts) = ChannelNotifier::new(64);
    let mut controller = MetaController::new(test_config(5), store, Arc::new(notifier))
        .unwrap()
        .with_adapter(ComponentKind::Generator, adapter.clone());
    controller.bootstrap().await.unwrap();
    drain(&mut alerts);

    let victim = controller
        .registry()
        .list(&ComponentFilter::any().kind(ComponentKind::Generator))[0]
        .id;
    assert!(controller.allocation().contains(&victim));

    adapter.fail(victim, "exchange connection lost");
    let report = controller.tick(Utc::now()).await.unwrap();

    assert_eq!(report.failed, vec![victim]);
    let statuses: Vec<_> = controller
        .registry()
        .audit_trail(&victim)
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ComponentStatus::Active,
            ComponentStatus::Failed,
            ComponentStatus::Terminated
        ]
    );

    let allocation = controller.allocation();
    assert!(!allocation.contains(&victim));
    assert_eq!(allocation.len(), 6);
    assert_eq!(strategies(&controller, ComponentStatus::Active).len(), 6);
    assert_eq!(controller.metrics().emergency_replacements.get(), 1);

    let failures: Vec<_> = drain(&mut alerts)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::ComponentFailure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].payload["reason"], "exchange connection lost");

    // Reporting again is a no-op once retired
    let report = controller.tick(Utc::now()).await.unwrap();
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_infrastructure_failure_replaced_with_same_kind() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(2), store);
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    let feeder = controller
        .registry()
        .list(&ComponentFilter::any().kind(ComponentKind::DataFeeder))[0]
        .id;
    handle.report_failure(feeder, "feed stalled").await.unwrap();
    controller.tick(Utc::now()).await.unwrap();

    assert_eq!(
        controller.registry().get(&feeder).unwrap().status,
        ComponentStatus::Terminated
    );
    let feeders = controller.registry().list(
        &ComponentFilter::any()
            .kind(ComponentKind::DataFeeder)
            .status(ComponentStatus::Active),
    );
    assert_eq!(feeders.len(), 1);
    assert_ne!(feeders[0].id, feeder);
}

#[tokio::test]
async fn test_pause_and_resume_rebalance() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(3), store);
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    let target = strategies(&controller, ComponentStatus::Active)[0].id;

    handle.pause(target).await.unwrap();
    let report = controller.tick(Utc::now()).await.unwrap();
    assert!(report.rebalance.is_some());
    assert!(!controller.allocation().contains(&target));
    assert_eq!(
        handle.component(&target).unwrap().status,
        ComponentStatus::Paused
    );

    handle.resume(target).await.unwrap();
    controller.tick(Utc::now()).await.unwrap();
    assert!(controller.allocation().contains(&target));

    // Pausing a paused component is rejected
    controller.pause(target).unwrap();
    assert!(controller.pause(target).is_err());
}

#[tokio::test]
async fn test_capital_change_rescales_amounts() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(5), store);
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    handle.set_total_capital(dec!(200000)).await.unwrap();
    let report = controller.tick(Utc::now()).await.unwrap();

    assert!(report.rebalance.unwrap().changed);
    let allocation = handle.allocation();
    assert_eq!(allocation.total_capital, dec!(200000));
    for allotment in allocation.allotments.values() {
        assert_eq!(allotment.amount, dec!(20000));
    }

    // Non-positive capital is ignored
    handle.set_total_capital(dec!(0)).await.unwrap();
    let report = controller.tick(Utc::now()).await.unwrap();
    assert!(report.rebalance.is_none());
    assert_eq!(controller.total_capital(), dec!(200000));
}

#[tokio::test]
async fn test_drawdown_breach_is_reported_not_fatal() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config(5);
    config.trading.max_drawdown_limit = 0.05;
    let (notifier, mut alerts) = ChannelNotifier::new(64);
    let mut controller = MetaController::new(config, store, Arc::new(notifier)).unwrap();
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    for component in strategies(&controller, ComponentStatus::Active) {
        handle
            .report_trade(component.id, TradeResult::new(-0.5))
            .await
            .unwrap();
    }
    // Capital change forces a rebalance with the new drawdowns
    handle.set_total_capital(dec!(100001)).await.unwrap();
    let report = controller.tick(Utc::now()).await.unwrap();

    let breach = report.rebalance.unwrap().breach.expect("breach expected");
    // 6 × 0.1 × 0.5 = 0.3 against a 0.05 limit
    assert!((breach.exposure - 0.3).abs() < 1e-9);
    assert_eq!(breach.constrained.len(), 6);

    let allocation = controller.allocation();
    assert!(allocation.drawdown_exposure <= 0.05 + 1e-9);
    assert_eq!(allocation.risk_constrained().count(), 6);
    assert_eq!(strategies(&controller, ComponentStatus::Active).len(), 6);
    assert!(drain(&mut alerts)
        .iter()
        .any(|n| n.kind == NotificationKind::RiskLimitBreach));
}

#[tokio::test]
async fn test_shutdown_terminates_all_and_persists_record() {
    let store = Arc::new(InMemoryStore::new());
    let mut controller = controller(test_config(5), store.clone());
    controller.bootstrap().await.unwrap();
    controller.tick(Utc::now()).await.unwrap();

    let before = controller.allocation();
    let handle = controller.handle();
    let report = controller.shutdown().await.unwrap();

    assert_eq!(report.terminated, 9);
    assert_eq!(*report.allocation, *before);
    assert_eq!(report.persisted.failed, 0);
    assert!(handle.is_shutting_down());
    assert!(handle.report_trade(ComponentId::new(), TradeResult::new(0.1)).await.is_err());

    let blob = store
        .load(EntityType::Allocation, "current")
        .await
        .unwrap()
        .expect("allocation persisted");
    let persisted: AllocationRecord = serde_json::from_slice(&blob).unwrap();
    assert_eq!(persisted, *before);

    let components = store.list(EntityType::Component).await.unwrap();
    assert_eq!(components.len(), 9);
    for (_, blob) in components {
        let component: Component = serde_json::from_slice(&blob).unwrap();
        assert_eq!(component.status, ComponentStatus::Terminated);
    }
}

#[tokio::test]
async fn test_failure_during_shutdown_is_not_replaced() {
    let store = Arc::new(InMemoryStore::new());
    let (notifier, mut alerts) = ChannelNotifier::new(64);
    let mut controller =
        MetaController::new(test_config(5), store.clone(), Arc::new(notifier)).unwrap();
    controller.bootstrap().await.unwrap();
    let handle = controller.handle();

    let victim = strategies(&controller, ComponentStatus::Active)[0].id;
    drain(&mut alerts);
    handle.report_failure(victim, "lost on the way down").await.unwrap();

    let report = controller.shutdown().await.unwrap();
    assert_eq!(report.terminated, 8);

    // No replacement was registered or persisted
    let components = store.list(EntityType::Component).await.unwrap();
    assert_eq!(components.len(), 9);
    for (_, blob) in components {
        let component: Component = serde_json::from_slice(&blob).unwrap();
        assert_eq!(component.status, ComponentStatus::Terminated);
    }

    let failures: Vec<_> = drain(&mut alerts)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::ComponentFailure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].payload["replacement"].is_null());
}

#[tokio::test]
async fn test_store_outage_does_not_stall_the_loop() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let (notifier, mut alerts) = ChannelNotifier::new(256);
    let mut config = test_config(5);
    config.persistence.queue_capacity = 4;
    config.persistence.max_attempts = 1;
    config.persistence.shutdown_grace_ms = 50;
    let mut controller = MetaController::new(config, Arc::new(StalledStore), Arc::new(notifier))
        .unwrap()
        .with_adapter(ComponentKind::Generator, adapter.clone());

    let limit = StdDuration::from_secs(2);
    tokio::time::timeout(limit, controller.bootstrap())
        .await
        .expect("bootstrap waited on the store")
        .unwrap();

    let victim = controller
        .registry()
        .list(&ComponentFilter::any().kind(ComponentKind::Generator))[0]
        .id;
    adapter.fail(victim, "venue unreachable");
    let report = tokio::time::timeout(limit, controller.tick(Utc::now()))
        .await
        .expect("tick waited on the store")
        .unwrap();

    // In-memory state stays authoritative
    assert_eq!(report.failed, vec![victim]);
    assert!(!controller.allocation().contains(&victim));
    assert_eq!(strategies(&controller, ComponentStatus::Active).len(), 6);

    let report = tokio::time::timeout(limit, controller.shutdown())
        .await
        .expect("shutdown waited past its grace period")
        .unwrap();
    assert_eq!(report.terminated, 9);
    assert_eq!(report.persisted.written, 0);
    assert!(report.persisted.failed > 0);
    assert!(drain(&mut alerts)
        .iter()
        .any(|n| n.kind == NotificationKind::PersistenceFailure));
}

#[tokio::test]
async fn test_bootstrap_restores_persisted_state() {
    let store = Arc::new(InMemoryStore::new());

    let mut survivor = Component::new(ComponentKind::Generator, 3);
    survivor.status = ComponentStatus::Active;
    let mut interrupted = Component::new(ComponentKind::Generator, 3);
    interrupted.status = ComponentStatus::Evolving;
    let mut retired = Component::new(ComponentKind::Deployer, 2);
    retired.status = ComponentStatus::Terminated;

    for component in [&survivor, &interrupted, &retired] {
        store
            .save(
                EntityType::Component,
                &component.id.to_string(),
                serde_json::to_vec(component).unwrap(),
            )
            .await
            .unwrap();
    }
    store
        .save(
            EntityType::Allocation,
            "current",
            serde_json::to_vec(&AllocationRecord::empty(dec!(250000))).unwrap(),
        )
        .await
        .unwrap();
    store
        .save(EntityType::Component, "garbage", b"not json".to_vec())
        .await
        .unwrap();

    let mut controller = controller(test_config(2), store);
    let report = controller.bootstrap().await.unwrap();

    assert_eq!(report.restored, 1);
    assert_eq!(report.retired, 1);
    assert_eq!(report.generation, 3);
    assert_eq!(controller.generation().number, 3);
    assert_eq!(controller.total_capital(), dec!(250000));

    assert_eq!(
        controller.registry().get(&survivor.id).unwrap().status,
        ComponentStatus::Active
    );
    assert_eq!(
        controller.registry().get(&interrupted.id).unwrap().status,
        ComponentStatus::Terminated
    );
    assert!(controller.registry().get(&retired.id).is_none());

    // One generator restored, one more created to reach two; a fresh deployer
    let generators = controller.registry().list(
        &ComponentFilter::any()
            .kind(ComponentKind::Generator)
            .status(ComponentStatus::Active),
    );
    assert_eq!(generators.len(), 2);
    assert!(controller.allocation().contains(&survivor.id));
    assert_eq!(controller.allocation().total_capital, dec!(250000));
}

#[tokio::test]
async fn test_run_until_cancelled() {
    let store = Arc::new(InMemoryStore::new());
    let adapter = Arc::new(ScriptedAdapter::default());
    let controller = controller(test_config(3), store.clone())
        .with_adapter(ComponentKind::Generator, adapter.clone())
        .with_adapter(ComponentKind::Deployer, adapter.clone());
    let handle = controller.handle();

    let task = tokio::spawn(controller.run());

    // Wait for bootstrap to publish the first allocation
    for _ in 0..100 {
        if !handle.allocation().is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    let first = handle.allocation();
    assert_eq!(first.len(), 4);

    let id = *first.allotments.keys().next().unwrap();
    adapter.queue_trades(id, &[0.01, -0.02, 0.03]);
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    handle.shutdown();
    let report = task.await.unwrap().unwrap();

    assert_eq!(report.terminated, 7);
    assert_eq!(*report.allocation, *first);
    assert!(store
        .load(EntityType::Allocation, "current")
        .await
        .unwrap()
        .is_some());
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let mut config = ControllerConfig::default();
    config.evolution.survival_rate = -0.1;

    let err = MetaController::new(config, Arc::new(InMemoryStore::new()), Arc::new(LogNotifier))
        .err()
        .expect("construction should fail");
    assert!(!err.is_recoverable());
}
