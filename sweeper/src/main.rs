// Sweeper binary: runs the hourly performance sweep and nightly model
// training against the JSON-backed metrics store.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use common::cadence::SweepCadence;
use common::config::Settings;
use common::engine::SchedulingEngine;
use common::features::FeatureExtractor;
use common::lock::PostLockRegistry;
use common::model::{ModelRegistry, ModelState, Trainer};
use common::policy::ReschedulePolicy;
use common::retry::{ExponentialBackoff, RetryStrategy};
use common::service::SchedulerService;
use common::store::{JsonFileStore, MetricsStore};
use common::telemetry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    telemetry::init_metrics(settings.observability.metrics_port)?;
    info!("Starting publish-time sweeper");

    let store: Arc<dyn MetricsStore> = Arc::new(
        JsonFileStore::open(&settings.store.path)
            .await
            .context("Failed to open metrics store")?,
    );

    let registry = Arc::new(ModelRegistry::new());
    let model_path = PathBuf::from(&settings.model.path);
    if Path::new(&model_path).exists() {
        match ModelState::load(&model_path) {
            Ok(state) => {
                info!(version = state.version(), "Loaded persisted model snapshot");
                registry.install(Arc::new(state));
            }
            Err(e) => warn!(error = %e, "Could not load model snapshot, starting untrained"),
        }
    } else {
        info!("No persisted model found, starting untrained");
    }

    let extractor = FeatureExtractor::new(settings.feature_config());
    let engine = SchedulingEngine::new(settings.engine_config());
    let locks = Arc::new(PostLockRegistry::new());

    let policy = Arc::new(ReschedulePolicy::new(
        store.clone(),
        registry.clone(),
        engine.clone(),
        extractor.clone(),
        locks.clone(),
        settings.policy_config(),
    ));
    // Same lock registry as the sweep: one in-flight decision per post
    let service = Arc::new(SchedulerService::new(
        store,
        registry,
        extractor,
        engine,
        Trainer::new(settings.trainer_config()),
        locks,
    ));

    let (performance_cadence, training_cadence) = settings
        .cadences()
        .map_err(|e| anyhow!("Invalid sweep cadence: {e}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C, initiating graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    let sweep_task = tokio::spawn(sweep_loop(
        policy,
        performance_cadence,
        shutdown_rx.clone(),
    ));
    let training_task = tokio::spawn(training_loop(
        service,
        training_cadence,
        model_path,
        shutdown_rx,
    ));

    let (sweep_result, training_result) = tokio::join!(sweep_task, training_task);
    sweep_result.context("Sweep task panicked")?;
    training_result.context("Training task panicked")?;

    info!("Sweeper stopped");
    Ok(())
}

/// Periodic performance sweep; retries with backoff when the store is down
async fn sweep_loop(
    policy: Arc<ReschedulePolicy>,
    cadence: SweepCadence,
    mut shutdown: watch::Receiver<bool>,
) {
    let backoff = ExponentialBackoff::default();
    let mut last_run = None;

    loop {
        if !wait_for_next_run(&cadence, last_run, &mut shutdown).await {
            break;
        }
        last_run = Some(Utc::now());

        let mut attempt = 0;
        loop {
            match policy.run_sweep(&shutdown).await {
                Ok(summary) => {
                    if summary.cancelled {
                        return;
                    }
                    break;
                }
                Err(e) => {
                    let Some(delay) = backoff.next_delay(attempt) else {
                        error!(error = %e, "Sweep retries exhausted, waiting for next cycle");
                        break;
                    };
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Sweep failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
    info!("Sweep loop stopped");
}

/// Nightly retraining; persists each new snapshot next to the store
async fn training_loop(
    service: Arc<SchedulerService>,
    cadence: SweepCadence,
    model_path: PathBuf,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_run = None;

    loop {
        if !wait_for_next_run(&cadence, last_run, &mut shutdown).await {
            break;
        }
        last_run = Some(Utc::now());

        match service.retrain_model().await {
            Ok(state) => {
                if let Err(e) = state.save(&model_path) {
                    error!(error = %e, "Failed to persist model snapshot");
                }
            }
            Err(e) => error!(error = %e, "Model training failed"),
        }
    }
    info!("Training loop stopped");
}

/// Sleep until the cadence's next tick. Returns false on shutdown or when
/// the cadence cannot produce a next run.
async fn wait_for_next_run(
    cadence: &SweepCadence,
    last_run: Option<chrono::DateTime<Utc>>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    let next = match cadence.next_run(last_run) {
        Ok(next) => next,
        Err(e) => {
            error!(error = %e, "Cadence has no next run, stopping loop");
            return false;
        }
    };
    let delay = (next - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO);

    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => !*shutdown.borrow(),
    }
}
