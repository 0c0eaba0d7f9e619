// Rescheduling policy: the periodic sweep over monitored posts

use crate::engine::SchedulingEngine;
use crate::errors::{StoreError, SweepError};
use crate::features::{FeatureExtractor, PostFeatures};
use crate::lock::PostLockRegistry;
use crate::model::{HeuristicModel, ModelRegistry, ScoringModel};
use crate::models::{PerformanceSample, PostId, ReasonCode, ScheduleDecision};
use crate::retry::{FixedDelay, RetryStrategy};
use crate::store::MetricsStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Policy configuration
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Posts scoring below this are candidates for rescheduling
    pub performance_threshold: f64,
    /// When false, moves are reported but never persisted
    pub auto_reschedule_enabled: bool,
    /// Cap on posts examined per sweep, 0 means unlimited
    pub max_posts_per_sweep: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            performance_threshold: 0.3,
            auto_reschedule_enabled: true,
            max_posts_per_sweep: 0,
        }
    }
}

/// What the sweep did for one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SweepOutcome {
    Rescheduled {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        confidence: f64,
    },
    Unchanged(ReasonCode),
    Skipped(SkipReason),
}

/// Why a post was skipped without a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another decision for this post was already in flight
    LockHeld,
    /// Post has no schedule record
    NotScheduled,
    /// Scheduled time is still in the future
    NotYetPublished,
    /// No performance sample collected yet
    NoPerformanceData,
}

/// A per-post failure captured without aborting the sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostFailure {
    pub post_id: PostId,
    pub error: String,
}

/// Summary of one completed (or cancelled) sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub checked: usize,
    pub rescheduled: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<PostFailure>,
    pub cancelled: bool,
}

/// Sweeps monitored posts, rescheduling underperformers.
///
/// Per-post errors are isolated into the summary; only a store outage while
/// listing posts aborts the whole sweep.
pub struct ReschedulePolicy {
    store: Arc<dyn MetricsStore>,
    registry: Arc<ModelRegistry>,
    engine: SchedulingEngine,
    extractor: FeatureExtractor,
    locks: Arc<PostLockRegistry>,
    config: PolicyConfig,
}

impl ReschedulePolicy {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        registry: Arc<ModelRegistry>,
        engine: SchedulingEngine,
        extractor: FeatureExtractor,
        locks: Arc<PostLockRegistry>,
        config: PolicyConfig,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            extractor,
            locks,
            config,
        }
    }

    /// Run one sweep over every monitored post.
    ///
    /// Checks `shutdown` between posts so an in-flight post always finishes
    /// before the sweep stops.
    #[instrument(skip(self, shutdown), fields(sweep_id = tracing::field::Empty))]
    pub async fn run_sweep(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SweepSummary, SweepError> {
        let sweep_id = Uuid::new_v4();
        tracing::Span::current().record("sweep_id", tracing::field::display(sweep_id));
        let started_at = Utc::now();

        let mut posts = self
            .store
            .monitored_posts()
            .await
            .map_err(|e| SweepError::StoreUnavailable(e.to_string()))?;
        if self.config.max_posts_per_sweep > 0 {
            posts.truncate(self.config.max_posts_per_sweep);
        }
        info!(posts = posts.len(), "Sweep started");
        metrics::gauge!("monitored_posts").set(posts.len() as f64);

        let mut summary = SweepSummary {
            sweep_id,
            started_at,
            completed_at: started_at,
            checked: 0,
            rescheduled: 0,
            unchanged: 0,
            skipped: 0,
            failures: Vec::new(),
            cancelled: false,
        };

        for post_id in posts {
            if *shutdown.borrow() {
                warn!(%sweep_id, "Shutdown requested, stopping sweep early");
                summary.cancelled = true;
                break;
            }

            summary.checked += 1;
            match self.sweep_post(post_id).await {
                Ok(outcome) => self.tally(&mut summary, post_id, outcome),
                Err(e) => {
                    warn!(post_id, error = %e, "Post sweep failed, continuing");
                    metrics::counter!("sweep_post_failures_total").increment(1);
                    summary.failures.push(PostFailure {
                        post_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.completed_at = Utc::now();
        info!(
            %sweep_id,
            checked = summary.checked,
            rescheduled = summary.rescheduled,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failures = summary.failures.len(),
            cancelled = summary.cancelled,
            "Sweep finished"
        );
        Ok(summary)
    }

    fn tally(&self, summary: &mut SweepSummary, post_id: PostId, outcome: SweepOutcome) {
        match outcome {
            SweepOutcome::Rescheduled { from, to, .. } => {
                info!(post_id, %from, %to, "Post rescheduled");
                metrics::counter!("sweep_rescheduled_total").increment(1);
                summary.rescheduled += 1;
            }
            SweepOutcome::Unchanged(reason) => {
                debug!(post_id, reason = %reason, "Post left unchanged");
                metrics::counter!("sweep_unchanged_total").increment(1);
                summary.unchanged += 1;
            }
            SweepOutcome::Skipped(reason) => {
                debug!(post_id, ?reason, "Post skipped");
                summary.skipped += 1;
            }
        }
    }

    /// Evaluate a single post end to end
    #[instrument(skip(self))]
    pub async fn sweep_post(&self, post_id: PostId) -> Result<SweepOutcome, StoreError> {
        let Some(_guard) = self.locks.try_acquire(post_id) else {
            return Ok(SweepOutcome::Skipped(SkipReason::LockHeld));
        };

        let record = match self.store.get_schedule(post_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Ok(SweepOutcome::Skipped(SkipReason::NotScheduled));
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        if record.scheduled_time > now {
            return Ok(SweepOutcome::Skipped(SkipReason::NotYetPublished));
        }

        let sample = match self.fetch_performance(post_id).await {
            Ok(sample) => sample,
            Err(StoreError::NotFound(_)) => {
                return Ok(SweepOutcome::Skipped(SkipReason::NoPerformanceData));
            }
            Err(e) => return Err(e),
        };

        let score = sample.compute_score();
        self.store.update_performance_score(post_id, score).await?;

        if self
            .store
            .active_assignment_for_post(post_id)
            .await?
            .is_some()
        {
            return Ok(SweepOutcome::Unchanged(ReasonCode::AbTestHold));
        }

        if score >= self.config.performance_threshold {
            return Ok(SweepOutcome::Unchanged(ReasonCode::PerformanceAcceptable));
        }

        debug!(
            post_id,
            score,
            threshold = self.config.performance_threshold,
            "Post underperforming, evaluating reschedule"
        );

        let features = self.features_for(post_id, &sample).await?;
        let model = self.model_for(&features).await?;
        let window = self.engine.default_window(now);
        let decision = self
            .engine
            .decide(model.as_ref(), &features, &record, &window);

        match decision {
            ScheduleDecision::Move {
                slot, confidence, ..
            } => {
                if !self.config.auto_reschedule_enabled {
                    info!(
                        post_id,
                        proposed = %slot.publish_at,
                        confidence,
                        "Auto-reschedule disabled, proposal not persisted"
                    );
                    return Ok(SweepOutcome::Unchanged(ReasonCode::AutoRescheduleDisabled));
                }

                let updated =
                    record.rescheduled_to(slot.publish_at, confidence, ReasonCode::LowEngagement);
                self.store.record_schedule(updated).await?;
                Ok(SweepOutcome::Rescheduled {
                    from: record.scheduled_time,
                    to: slot.publish_at,
                    confidence,
                })
            }
            ScheduleDecision::Unchanged { reason, .. } => Ok(SweepOutcome::Unchanged(reason)),
        }
    }

    /// Fetch the performance sample, retrying transient store failures
    async fn fetch_performance(&self, post_id: PostId) -> Result<PerformanceSample, StoreError> {
        let strategy = FixedDelay::with_max_retries(Duration::from_millis(200), 3);
        let mut attempt = 0;
        loop {
            match self.store.get_performance(post_id).await {
                Ok(sample) => return Ok(sample),
                Err(e) if e.is_transient() => {
                    let Some(delay) = strategy.next_delay(attempt) else {
                        return Err(e);
                    };
                    warn!(post_id, attempt, error = %e, "Transient store error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Per-post features, falling back to category then global defaults
    async fn features_for(
        &self,
        post_id: PostId,
        sample: &PerformanceSample,
    ) -> Result<PostFeatures, StoreError> {
        let history = self.store.get_post_history(post_id).await?;
        if let Ok(features) = self.extractor.extract(&history, Some(sample)) {
            return Ok(features);
        }

        match history.last() {
            Some(latest) => {
                let category = latest.category.clone();
                let category_history = self.store.get_category_history(&category).await?;
                Ok(self.extractor.category_features(&category, &category_history))
            }
            None => Ok(self.extractor.global_default()),
        }
    }

    /// Latest trained model, or a heuristic built from whatever history exists
    async fn model_for(
        &self,
        features: &PostFeatures,
    ) -> Result<Arc<dyn ScoringModel>, StoreError> {
        if let Ok(model) = self.registry.latest() {
            return Ok(model);
        }

        let history = if features.category.is_empty() {
            self.store.get_all_history().await?
        } else {
            let category = self.store.get_category_history(&features.category).await?;
            if category.is_empty() {
                self.store.get_all_history().await?
            } else {
                category
            }
        };
        debug!(
            examples = history.len(),
            "No trained model, using heuristic fallback"
        );
        Ok(Arc::new(HeuristicModel::from_history(&history)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::models::{ScheduleRecord, Slot};
    use crate::store::InMemoryMetricsStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    /// Fixed-score stub so outcomes are fully determined by configuration
    struct FixedScore(f64);

    impl ScoringModel for FixedScore {
        fn score(&self, _slot: &Slot, _features: &PostFeatures) -> f64 {
            self.0
        }

        fn version(&self) -> u32 {
            1
        }
    }

    fn policy_with(
        store: Arc<dyn MetricsStore>,
        model_score: Option<f64>,
        config: PolicyConfig,
    ) -> ReschedulePolicy {
        let registry = Arc::new(ModelRegistry::new());
        if let Some(score) = model_score {
            registry.install(Arc::new(FixedScore(score)));
        }
        ReschedulePolicy::new(
            store,
            registry,
            SchedulingEngine::new(EngineConfig::default()),
            FeatureExtractor::default(),
            Arc::new(PostLockRegistry::new()),
            config,
        )
    }

    fn published_monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn sample(post_id: PostId, engagement: f64) -> PerformanceSample {
        PerformanceSample {
            post_id,
            views: 50,
            engagement,
            social_shares: 1,
            avg_time_on_page_secs: 20.0,
            performance_score: None,
            last_updated: Utc::now(),
        }
    }

    async fn seed_post(store: &InMemoryMetricsStore, post_id: PostId, engagement: f64) {
        store
            .record_schedule(ScheduleRecord::initial(post_id, published_monday(), 0.5))
            .await
            .unwrap();
        store
            .upsert_performance(sample(post_id, engagement))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_underperformer_is_rescheduled() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 7, 0.05).await;
        let policy = policy_with(store.clone(), Some(0.8), PolicyConfig::default());

        let outcome = policy.sweep_post(7).await.unwrap();
        assert!(matches!(outcome, SweepOutcome::Rescheduled { .. }));

        let latest = store.get_schedule(7).await.unwrap();
        assert!(latest.is_rescheduled);
        assert_eq!(latest.original_time, Some(published_monday()));
        assert_eq!(latest.reason, ReasonCode::LowEngagement);
    }

    #[tokio::test]
    async fn test_acceptable_performance_is_left_alone() {
        let store = Arc::new(InMemoryMetricsStore::new());
        let post_id = 8;
        store
            .record_schedule(ScheduleRecord::initial(post_id, published_monday(), 0.5))
            .await
            .unwrap();
        store
            .upsert_performance(PerformanceSample {
                post_id,
                views: 10_000,
                engagement: 0.8,
                social_shares: 300,
                avg_time_on_page_secs: 200.0,
                performance_score: None,
                last_updated: Utc::now(),
            })
            .await
            .unwrap();
        let policy = policy_with(store.clone(), Some(0.9), PolicyConfig::default());

        let outcome = policy.sweep_post(post_id).await.unwrap();
        assert_eq!(
            outcome,
            SweepOutcome::Unchanged(ReasonCode::PerformanceAcceptable)
        );
        // Score write-back happens even when nothing moves
        let stored = store.get_performance(post_id).await.unwrap();
        assert!(stored.performance_score.is_some());
    }

    #[tokio::test]
    async fn test_low_confidence_keeps_schedule() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 9, 0.05).await;
        let policy = policy_with(store.clone(), Some(0.4), PolicyConfig::default());

        let outcome = policy.sweep_post(9).await.unwrap();
        assert_eq!(outcome, SweepOutcome::Unchanged(ReasonCode::BelowThreshold));
        assert!(!store.get_schedule(9).await.unwrap().is_rescheduled);
    }

    #[tokio::test]
    async fn test_future_post_is_skipped() {
        let store = Arc::new(InMemoryMetricsStore::new());
        store
            .record_schedule(ScheduleRecord::initial(
                3,
                Utc::now() + ChronoDuration::days(2),
                0.5,
            ))
            .await
            .unwrap();
        let policy = policy_with(store, Some(0.9), PolicyConfig::default());

        let outcome = policy.sweep_post(3).await.unwrap();
        assert_eq!(outcome, SweepOutcome::Skipped(SkipReason::NotYetPublished));
    }

    #[tokio::test]
    async fn test_missing_performance_sample_is_skipped() {
        let store = Arc::new(InMemoryMetricsStore::new());
        store
            .record_schedule(ScheduleRecord::initial(4, published_monday(), 0.5))
            .await
            .unwrap();
        let policy = policy_with(store, Some(0.9), PolicyConfig::default());

        let outcome = policy.sweep_post(4).await.unwrap();
        assert_eq!(
            outcome,
            SweepOutcome::Skipped(SkipReason::NoPerformanceData)
        );
    }

    #[tokio::test]
    async fn test_ab_test_holds_schedule() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 5, 0.05).await;
        store
            .record_assignment(crate::models::AbTestAssignment::new("slots", 5, "b"))
            .await
            .unwrap();
        let policy = policy_with(store.clone(), Some(0.9), PolicyConfig::default());

        let outcome = policy.sweep_post(5).await.unwrap();
        assert_eq!(outcome, SweepOutcome::Unchanged(ReasonCode::AbTestHold));
        assert!(!store.get_schedule(5).await.unwrap().is_rescheduled);
    }

    #[tokio::test]
    async fn test_disabled_auto_reschedule_only_proposes() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 6, 0.05).await;
        let config = PolicyConfig {
            auto_reschedule_enabled: false,
            ..PolicyConfig::default()
        };
        let policy = policy_with(store.clone(), Some(0.9), config);

        let outcome = policy.sweep_post(6).await.unwrap();
        assert_eq!(
            outcome,
            SweepOutcome::Unchanged(ReasonCode::AutoRescheduleDisabled)
        );
        assert!(!store.get_schedule(6).await.unwrap().is_rescheduled);
    }

    #[tokio::test]
    async fn test_locked_post_is_skipped() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 11, 0.05).await;
        let locks = Arc::new(PostLockRegistry::new());
        let registry = Arc::new(ModelRegistry::new());
        registry.install(Arc::new(FixedScore(0.9)));
        let policy = ReschedulePolicy::new(
            store,
            registry,
            SchedulingEngine::default(),
            FeatureExtractor::default(),
            locks.clone(),
            PolicyConfig::default(),
        );

        let _held = locks.try_acquire(11).unwrap();
        let outcome = policy.sweep_post(11).await.unwrap();
        assert_eq!(outcome, SweepOutcome::Skipped(SkipReason::LockHeld));
    }

    #[tokio::test]
    async fn test_sweep_summary_counts() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 1, 0.05).await; // rescheduled
        seed_post(&store, 2, 0.9).await; // unchanged (high engagement score)
        store
            .record_schedule(ScheduleRecord::initial(
                3,
                Utc::now() + ChronoDuration::days(1),
                0.5,
            ))
            .await
            .unwrap(); // skipped
        let policy = policy_with(store, Some(0.9), PolicyConfig::default());

        let (_tx, rx) = watch::channel(false);
        let summary = policy.run_sweep(&rx).await.unwrap();
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.rescheduled, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failures.is_empty());
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweep_between_posts() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 1, 0.05).await;
        seed_post(&store, 2, 0.05).await;
        let policy = policy_with(store, Some(0.9), PolicyConfig::default());

        let (tx, rx) = watch::channel(true);
        let summary = policy.run_sweep(&rx).await.unwrap();
        drop(tx);
        assert!(summary.cancelled);
        assert_eq!(summary.checked, 0);
    }

    #[tokio::test]
    async fn test_max_posts_cap() {
        let store = Arc::new(InMemoryMetricsStore::new());
        for id in 1..=5 {
            seed_post(&store, id, 0.9).await;
        }
        let config = PolicyConfig {
            max_posts_per_sweep: 2,
            ..PolicyConfig::default()
        };
        let policy = policy_with(store, Some(0.9), config);

        let (_tx, rx) = watch::channel(false);
        let summary = policy.run_sweep(&rx).await.unwrap();
        assert_eq!(summary.checked, 2);
    }

    #[tokio::test]
    async fn test_untrained_registry_falls_back_to_heuristic() {
        let store = Arc::new(InMemoryMetricsStore::new());
        seed_post(&store, 12, 0.05).await;
        // No model installed; heuristic from an empty corpus scores 0.5,
        // below the 0.6 confidence threshold
        let policy = policy_with(store.clone(), None, PolicyConfig::default());

        let outcome = policy.sweep_post(12).await.unwrap();
        assert_eq!(outcome, SweepOutcome::Unchanged(ReasonCode::BelowThreshold));
    }
}
