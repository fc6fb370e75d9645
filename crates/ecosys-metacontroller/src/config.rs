//! Meta-controller configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML file
//! (`ECOSYS_CONFIG` or `ecosys.toml`), then `ECOSYS_` environment variables with `__` between
//! sections, e.g. `ECOSYS_EVOLUTION__SURVIVAL_RATE=0.3`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use config::{Config, Environment as EnvSource, File};
use ecosys_common::EcosysError;
use ecosys_darwinian::{
    DarwinianConfig, EqualWeight, FitnessScorer, ReturnOverDrawdown, RiskAdjusted, ScoreWeighted,
    WeightingPolicy,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ECOSYS";

/// Variable naming an explicit config file
pub const CONFIG_PATH_VAR: &str = "ECOSYS_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "ecosys.toml";

/// Upper bounds that keep duration arithmetic in range
const MAX_INTERVAL_MINUTES: u64 = 525_600;
const MAX_PERIOD_DAYS: u64 = 3_650;

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Top-level controller configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub environment: Environment,
    pub trading: TradingSettings,
    pub evolution: EvolutionSettings,
    pub runtime: RuntimeSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Capital and risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub initial_capital: Decimal,
    /// Cap on Σ fraction × historical max drawdown
    pub max_drawdown_limit: f64,
    /// Per-component capital fraction cap
    pub max_position_size: f64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(100_000, 0),
            max_drawdown_limit: 0.2,
            max_position_size: 0.1,
        }
    }
}

/// Fitness formula used for ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    #[default]
    RiskAdjusted,
    ReturnOverDrawdown,
}

impl ScoringMethod {
    pub fn scorer(&self) -> Box<dyn FitnessScorer> {
        match self {
            ScoringMethod::RiskAdjusted => Box::new(RiskAdjusted),
            ScoringMethod::ReturnOverDrawdown => Box::new(ReturnOverDrawdown),
        }
    }
}

/// Base weights before capping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    #[default]
    Equal,
    Score,
}

impl WeightingMethod {
    pub fn policy(&self) -> Box<dyn WeightingPolicy> {
        match self {
            WeightingMethod::Equal => Box::new(EqualWeight),
            WeightingMethod::Score => Box::new(ScoreWeighted::default()),
        }
    }
}

/// Generation schedule and selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    pub generation_interval_minutes: u64,
    pub evaluation_period_days: u64,
    pub survival_rate: f64,
    /// Generators created at bootstrap on an empty registry
    pub initial_generators: usize,
    pub scoring: ScoringMethod,
    pub weighting: WeightingMethod,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            generation_interval_minutes: 60,
            evaluation_period_days: 30,
            survival_rate: 0.2,
            initial_generators: 5,
            scoring: ScoringMethod::default(),
            weighting: WeightingMethod::default(),
        }
    }
}

/// Loop timing and buffers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub tick_interval_ms: u64,
    /// Per-adapter poll timeout
    pub poll_timeout_ms: u64,
    /// Inbound event channel capacity
    pub event_buffer: usize,
    pub audit_capacity: usize,
    /// Seconds between metrics log lines; 0 disables
    pub metrics_log_interval_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            poll_timeout_ms: 500,
            event_buffer: 1_024,
            audit_capacity: ecosys_darwinian::registry::DEFAULT_AUDIT_CAPACITY,
            metrics_log_interval_secs: 60,
        }
    }
}

/// Persistence worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub data_directory: PathBuf,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    /// Pending records above which a backlog warning is logged
    pub queue_capacity: usize,
    /// How long shutdown waits for the worker to drain
    pub shutdown_grace_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data/"),
            max_attempts: 5,
            base_backoff_ms: 200,
            queue_capacity: 256,
            shutdown_grace_ms: 10_000,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Daily-rolling JSON files are written here when set
    pub log_dir: Option<PathBuf>,
    /// JSON instead of compact output on stderr
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            json: false,
        }
    }
}

impl ControllerConfig {
    /// Load `.env`, then defaults, file and environment; validate the result
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(Some(&path), ENV_PREFIX)
    }

    /// Layer an optional file and a prefixed environment over the defaults
    pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let defaults =
            Config::try_from(&ControllerConfig::default()).context("Failed to encode defaults")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            EnvSource::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ControllerConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express; every problem is reported at once
    pub fn validate(&self) -> ecosys_common::Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let trading = &self.trading;
        if trading.initial_capital <= Decimal::ZERO {
            errors.push(format!(
                "trading.initial_capital: must be positive, got {}",
                trading.initial_capital
            ));
        }
        check_fraction("trading.max_drawdown_limit", trading.max_drawdown_limit, &mut errors);
        check_fraction("trading.max_position_size", trading.max_position_size, &mut errors);

        let evolution = &self.evolution;
        check_fraction("evolution.survival_rate", evolution.survival_rate, &mut errors);
        if evolution.generation_interval_minutes == 0
            || evolution.generation_interval_minutes > MAX_INTERVAL_MINUTES
        {
            errors.push(format!(
                "evolution.generation_interval_minutes: must be in 1..={}, got {}",
                MAX_INTERVAL_MINUTES, evolution.generation_interval_minutes
            ));
        }
        if evolution.evaluation_period_days == 0
            || evolution.evaluation_period_days > MAX_PERIOD_DAYS
        {
            errors.push(format!(
                "evolution.evaluation_period_days: must be in 1..={}, got {}",
                MAX_PERIOD_DAYS, evolution.evaluation_period_days
            ));
        }

        let runtime = &self.runtime;
        if runtime.tick_interval_ms == 0 {
            errors.push("runtime.tick_interval_ms: must be positive".into());
        }
        if runtime.poll_timeout_ms == 0 {
            errors.push("runtime.poll_timeout_ms: must be positive".into());
        }
        if runtime.event_buffer == 0 {
            errors.push("runtime.event_buffer: must be positive".into());
        }

        let persistence = &self.persistence;
        if persistence.max_attempts == 0 {
            errors.push("persistence.max_attempts: must be at least 1".into());
        }
        if persistence.queue_capacity == 0 {
            errors.push("persistence.queue_capacity: must be positive".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EcosysError::ConfigValidation(format!(
                "{} error{}:\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            )))
        }
    }

    /// Evolution and allocation parameters
    pub fn darwinian(&self) -> DarwinianConfig {
        DarwinianConfig {
            survival_rate: self.evolution.survival_rate,
            generation_interval: Duration::minutes(self.evolution.generation_interval_minutes as i64),
            evaluation_period: Duration::days(self.evolution.evaluation_period_days as i64),
            max_position_size: self.trading.max_position_size,
            max_drawdown_limit: self.trading.max_drawdown_limit,
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.runtime.tick_interval_ms)
    }

    pub fn poll_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.runtime.poll_timeout_ms)
    }

    pub fn base_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persistence.base_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persistence.shutdown_grace_ms)
    }

    /// `None` when periodic metrics logging is off
    pub fn metrics_log_interval(&self) -> Option<std::time::Duration> {
        match self.runtime.metrics_log_interval_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}

fn check_fraction(name: &str, value: f64, errors: &mut Vec<String>) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        errors.push(format!("{name}: must be in [0, 1], got {value}"));
    }
}
