// Layered configuration: default.toml, local.toml, then APP__ env overrides

use crate::cadence::SweepCadence;
use crate::engine::EngineConfig;
use crate::features::FeatureConfig;
use crate::model::TrainerConfig;
use crate::policy::PolicyConfig;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub engine: EngineSettings,
    pub policy: PolicySettings,
    pub sweep: SweepConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the JSON store snapshot
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path where trained model snapshots are persisted
    pub path: String,
    pub rolling_window: usize,
    pub min_category_history: usize,
    pub epochs: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub default_confidence_threshold: f64,
    pub window_days: i64,
    pub slot_step_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    pub performance_threshold: f64,
    pub auto_reschedule_enabled: bool,
    pub max_posts_per_sweep: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Cron expression for the performance sweep
    pub performance_cron: String,
    /// Cron expression for model training
    pub training_cron: String,
    /// IANA timezone the cron expressions are evaluated in
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                path: "data/metrics-store.json".to_string(),
            },
            model: ModelConfig {
                path: "data/model.json".to_string(),
                rolling_window: crate::features::DEFAULT_ROLLING_WINDOW,
                min_category_history: crate::features::DEFAULT_MIN_HISTORY,
                epochs: 64,
                seed: 17,
            },
            engine: EngineSettings {
                default_confidence_threshold: 0.6,
                window_days: 7,
                slot_step_hours: 1,
            },
            policy: PolicySettings {
                performance_threshold: 0.3,
                auto_reschedule_enabled: true,
                max_posts_per_sweep: 0,
            },
            sweep: SweepConfig {
                performance_cron: "0 0 * * * *".to_string(),
                training_cron: "0 0 3 * * *".to_string(),
                timezone: "UTC".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults, file, env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides, not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.store.path.is_empty() {
            return Err("Store path cannot be empty".to_string());
        }
        if self.model.path.is_empty() {
            return Err("Model path cannot be empty".to_string());
        }
        if self.model.rolling_window == 0 {
            return Err("Model rolling_window must be greater than 0".to_string());
        }
        if self.model.epochs == 0 {
            return Err("Model epochs must be greater than 0".to_string());
        }

        if !(0.0..1.0).contains(&self.engine.default_confidence_threshold)
            || self.engine.default_confidence_threshold == 0.0
        {
            return Err("Engine default_confidence_threshold must be in (0, 1)".to_string());
        }
        if self.engine.window_days <= 0 {
            return Err("Engine window_days must be greater than 0".to_string());
        }
        if self.engine.slot_step_hours == 0 {
            return Err("Engine slot_step_hours must be greater than 0".to_string());
        }

        if !(0.0..1.0).contains(&self.policy.performance_threshold)
            || self.policy.performance_threshold == 0.0
        {
            return Err("Policy performance_threshold must be in (0, 1)".to_string());
        }

        let timezone = self.timezone()?;
        for expression in [&self.sweep.performance_cron, &self.sweep.training_cron] {
            let cadence = SweepCadence::Cron {
                expression: expression.clone(),
                timezone,
            };
            cadence
                .validate()
                .map_err(|e| format!("Invalid sweep cadence: {e}"))?;
        }

        if self.observability.metrics_port == 0 {
            return Err("Metrics port must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, String> {
        Tz::from_str(&self.sweep.timezone)
            .map_err(|_| format!("Invalid timezone: {}", self.sweep.timezone))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            confidence_threshold: self.engine.default_confidence_threshold,
            window_days: self.engine.window_days,
            slot_step_hours: self.engine.slot_step_hours,
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            performance_threshold: self.policy.performance_threshold,
            auto_reschedule_enabled: self.policy.auto_reschedule_enabled,
            max_posts_per_sweep: self.policy.max_posts_per_sweep,
        }
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            rolling_window: self.model.rolling_window,
            min_history: self.model.min_category_history,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            epochs: self.model.epochs,
            seed: self.model.seed,
            rolling_window: self.model.rolling_window,
            ..TrainerConfig::default()
        }
    }

    /// The performance-sweep and training cadences, in the configured timezone
    pub fn cadences(&self) -> Result<(SweepCadence, SweepCadence), String> {
        let timezone = self.timezone()?;
        Ok((
            SweepCadence::Cron {
                expression: self.sweep.performance_cron.clone(),
                timezone,
            },
            SweepCadence::Cron {
                expression: self.sweep.training_cron.clone(),
                timezone,
            },
        ))
    }
}
