//! Metrics Collector
//!
//! Streams trade results into one running window per component:
//! - Running mean/variance (Welford) for the risk-adjusted score
//! - Compounded equity with running peak for return and drawdown
//! - No raw trade retention, so memory stays flat as the population grows

mod window;

pub use window::WindowAccumulator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ecosys_common::{ComponentId, ComponentMetrics, TradeResult};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

/// Per-component metric windows
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Current window per component
    windows: DashMap<ComponentId, WindowAccumulator>,
    /// Largest drawdown seen across all windows, never reset by generations
    historical_drawdown: DashMap<ComponentId, f64>,
    /// Generation the current windows belong to
    generation: AtomicU64,
    /// Writers share it; window rotation takes it exclusively so no report straddles a boundary
    epoch: RwLock<()>,
    /// Trades accepted since start
    trades_recorded: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trade to the component's running window
    pub fn record(&self, id: ComponentId, trade: TradeResult) {
        if !trade.return_pct.is_finite() {
            warn!(component_id = %id, return_pct = trade.return_pct, "Ignoring non-finite trade");
            return;
        }

        let _epoch = self.epoch.read();
        let drawdown = {
            let mut window = self.windows.entry(id).or_default();
            window.push(&trade);
            window.max_drawdown()
        };

        self.historical_drawdown
            .entry(id)
            .and_modify(|d| *d = d.max(drawdown))
            .or_insert(drawdown);
        self.trades_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Current aggregate for one component
    pub fn snapshot(&self, id: &ComponentId) -> ComponentMetrics {
        let generation = self.generation();
        match self.windows.get(id) {
            Some(window) => window.to_metrics(*id, generation),
            None => ComponentMetrics::empty(*id, generation),
        }
    }

    /// Snapshot every window and open fresh ones for `next_generation`, atomically with respect
    /// to concurrent `record` calls
    #[instrument(skip(self))]
    pub fn rotate_window(&self, next_generation: u64) -> HashMap<ComponentId, ComponentMetrics> {
        let _epoch = self.epoch.write();
        let generation = self.generation();

        let sealed: HashMap<ComponentId, ComponentMetrics> = self
            .windows
            .iter()
            .map(|w| (*w.key(), w.value().to_metrics(*w.key(), generation)))
            .collect();

        self.windows.clear();
        self.generation.store(next_generation, Ordering::SeqCst);

        info!(
            sealed = sealed.len(),
            from = generation,
            to = next_generation,
            "Rotated metric windows"
        );
        sealed
    }

    /// Clear every window at a generation boundary
    pub fn reset_window(&self, generation: u64) {
        let _epoch = self.epoch.write();
        self.windows.clear();
        self.generation.store(generation, Ordering::SeqCst);
        debug!(generation, "Reset metric windows");
    }

    /// Drop everything known about a component
    pub fn forget(&self, id: &ComponentId) {
        self.windows.remove(id);
        self.historical_drawdown.remove(id);
    }

    /// Largest drawdown observed for a component across all windows
    pub fn historical_drawdown(&self, id: &ComponentId) -> f64 {
        self.historical_drawdown.get(id).map(|d| *d).unwrap_or(0.0)
    }

    /// Generation of the current windows
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Components with an open window
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Trades accepted since start
    pub fn trades_recorded(&self) -> u64 {
        self.trades_recorded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_snapshot() {
        let collector = MetricsCollector::new();
        let id = ComponentId::new();

        collector.record(id, TradeResult::new(0.10));
        collector.record(id, TradeResult::new(-0.05));

        let metrics = collector.snapshot(&id);
        assert_eq!(metrics.trade_count, 2);
        assert!((metrics.realized_return - (1.10 * 0.95 - 1.0)).abs() < 1e-12);
        assert!((metrics.max_drawdown - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_component_snapshot_is_empty() {
        let collector = MetricsCollector::new();
        let metrics = collector.snapshot(&ComponentId::new());
        assert_eq!(metrics.trade_count, 0);
        assert_eq!(metrics.realized_return, 0.0);
    }

    #[test]
    fn test_reset_window_clears_but_keeps_history() {
        let collector = MetricsCollector::new();
        let id = ComponentId::new();
        collector.record(id, TradeResult::new(0.2));
        collector.record(id, TradeResult::new(-0.5));

        collector.reset_window(1);

        assert_eq!(collector.snapshot(&id).trade_count, 0);
        assert_eq!(collector.generation(), 1);
        assert!((collector.historical_drawdown(&id) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rotate_returns_sealed_window() {
        let collector = MetricsCollector::new();
        let id = ComponentId::new();
        collector.record(id, TradeResult::new(0.01));

        let sealed = collector.rotate_window(1);
        assert_eq!(sealed[&id].trade_count, 1);
        assert_eq!(sealed[&id].window_generation, 0);

        collector.record(id, TradeResult::new(0.02));
        let next = collector.snapshot(&id);
        assert_eq!(next.trade_count, 1);
        assert_eq!(next.window_generation, 1);
    }

    #[test]
    fn test_forget_drops_history() {
        let collector = MetricsCollector::new();
        let id = ComponentId::new();
        collector.record(id, TradeResult::new(-0.3));
        collector.forget(&id);

        assert_eq!(collector.historical_drawdown(&id), 0.0);
        assert_eq!(collector.tracked(), 0);
    }

    #[test]
    fn test_non_finite_trades_are_ignored() {
        let collector = MetricsCollector::new();
        let id = ComponentId::new();
        collector.record(id, TradeResult::new(f64::NAN));
        assert_eq!(collector.trades_recorded(), 0);
    }

    #[test]
    fn test_concurrent_writers() {
        let collector = Arc::new(MetricsCollector::new());
        let id = ComponentId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        collector.record(id, TradeResult::new(0.001));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.snapshot(&id).trade_count, 800);
    }
}
