//! Periodic metrics log
//!
//! The binary has no scrape endpoint; registered collectors are gathered on an interval and
//! written as one structured log line.

use std::time::Duration;

use prometheus::proto::MetricType;
use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Current value of every gauge and counter in `registry`, sorted by name
pub fn snapshot(registry: &Registry) -> Vec<(String, f64)> {
    let mut values = Vec::new();
    for family in registry.gather() {
        for metric in family.get_metric() {
            let value = match family.get_field_type() {
                MetricType::GAUGE => metric.get_gauge().get_value(),
                MetricType::COUNTER => metric.get_counter().get_value(),
                _ => continue,
            };
            values.push((family.get_name().to_string(), value));
        }
    }
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

/// `name=value` pairs separated by spaces
pub fn render(values: &[(String, f64)]) -> String {
    values
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a snapshot every `every` until `cancel` fires
pub fn spawn_reporter(
    registry: Registry,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let values = snapshot(&registry);
                    info!(target: "ecosys::metrics", metrics = %render(&values), "Metrics");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosys_darwinian::EvolutionMetrics;

    #[test]
    fn test_snapshot_reads_registered_metrics() {
        let registry = Registry::new();
        let metrics = EvolutionMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        metrics.generations_total.inc_by(3);
        metrics.population_active.set(7);

        let values = snapshot(&registry);
        let lookup = |name: &str| {
            values
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .unwrap()
        };
        assert_eq!(lookup("ecosys_generations_total"), 3.0);
        assert_eq!(lookup("ecosys_population_active"), 7.0);

        let line = render(&values);
        assert!(line.contains("ecosys_generations_total=3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = spawn_reporter(Registry::new(), Duration::from_secs(1), cancel.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
