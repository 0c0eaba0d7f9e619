// Service facade: the operations collaborators call into

use crate::engine::SchedulingEngine;
use crate::errors::{ServiceError, StoreError};
use crate::features::{FeatureExtractor, PostFeatures};
use crate::lock::PostLockRegistry;
use crate::model::{HeuristicModel, ModelRegistry, ModelState, ScoringModel, Trainer};
use crate::models::{
    ContentAnalysis, PostId, RankedSlot, ScheduleDecision, ScheduleRecord,
};
use crate::store::MetricsStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Ties the store, model registry, extractor, and engine together behind the
/// operations a CMS integration calls.
pub struct SchedulerService {
    store: Arc<dyn MetricsStore>,
    registry: Arc<ModelRegistry>,
    extractor: FeatureExtractor,
    engine: SchedulingEngine,
    trainer: Trainer,
    locks: Arc<PostLockRegistry>,
}

impl SchedulerService {
    /// `locks` must be the same registry the sweep uses, so ad-hoc scheduling
    /// and sweeps never decide for one post at the same time.
    pub fn new(
        store: Arc<dyn MetricsStore>,
        registry: Arc<ModelRegistry>,
        extractor: FeatureExtractor,
        engine: SchedulingEngine,
        trainer: Trainer,
        locks: Arc<PostLockRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            extractor,
            engine,
            trainer,
            locks,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Summarize the best publish windows for a post.
    ///
    /// Works even without a trained model or post history thanks to the
    /// category and heuristic fallbacks.
    #[instrument(skip(self))]
    pub async fn analyze_content(&self, post_id: PostId) -> Result<ContentAnalysis, ServiceError> {
        let features = self.features_for(post_id).await?;
        let model = self.model_for(&features).await?;

        let window = self.engine.default_window(Utc::now());
        let ranked = self.engine.recommend(model.as_ref(), &features, &window);
        let top = ranked.first().ok_or(ServiceError::NoCandidates)?;

        let recommended_days = top_day_names(&ranked, 3);
        let optimal_hour_start = top.slot.hour_of_day();
        let optimal_hour_end = (optimal_hour_start + 2) % 24;
        // Lift relative to the neutral 0.5 confidence floor
        let estimated_reach_lift_pct = (((top.confidence / 0.5) - 1.0) * 100.0).max(0.0);

        Ok(ContentAnalysis {
            post_id,
            recommended_days,
            optimal_hour_start,
            optimal_hour_end,
            estimated_reach_lift_pct,
            confidence: top.confidence,
        })
    }

    /// Decide the best slot for a post and persist the initial schedule record
    /// when the post has none yet. Posts that already have a record get a
    /// decision but no persisted change; the sweep owns reschedules.
    #[instrument(skip(self))]
    pub async fn schedule_with_ai(&self, post_id: PostId) -> Result<ScheduleDecision, ServiceError> {
        // Held until return: the read-decide-record sequence below must not
        // interleave with a sweep or another call for the same post
        let Some(_guard) = self.locks.try_acquire(post_id) else {
            debug!(post_id, "Post lock held, refusing concurrent decision");
            return Err(ServiceError::DecisionInFlight(post_id));
        };

        let features = self.features_for(post_id).await?;
        let model = self.model_for(&features).await?;
        let window = self.engine.default_window(Utc::now());

        match self.store.get_schedule(post_id).await {
            Ok(existing) => {
                Ok(self
                    .engine
                    .decide(model.as_ref(), &features, &existing, &window))
            }
            Err(StoreError::NotFound(_)) => {
                let ranked = self.engine.recommend(model.as_ref(), &features, &window);
                let top = ranked.first().ok_or(ServiceError::NoCandidates)?;

                let record = ScheduleRecord::initial(post_id, top.slot.publish_at, top.confidence);
                self.store.record_schedule(record).await?;
                info!(
                    post_id,
                    publish_at = %top.slot.publish_at,
                    confidence = top.confidence,
                    "Initial schedule recorded"
                );
                Ok(ScheduleDecision::Move {
                    post_id,
                    slot: top.slot,
                    confidence: top.confidence,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Retrain from the full corpus and install the new snapshot.
    /// Returns the state so the caller can persist it.
    #[instrument(skip(self))]
    pub async fn retrain_model(&self) -> Result<ModelState, ServiceError> {
        let corpus = self.store.get_all_history().await?;
        let next_version = self.registry.version().unwrap_or(0) + 1;
        let started = std::time::Instant::now();

        let state = self.trainer.train(&corpus, next_version);
        metrics::histogram!("training_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            version = state.version(),
            examples = state.example_count(),
            trivial = state.is_trivial(),
            "Model retrained"
        );

        self.registry.install(Arc::new(state.clone()));
        Ok(state)
    }

    /// Drop the current model, reverting scoring to the heuristic fallback
    pub fn reset_model(&self) {
        self.registry.reset();
    }

    async fn features_for(&self, post_id: PostId) -> Result<PostFeatures, ServiceError> {
        let history = self.store.get_post_history(post_id).await?;
        let sample = match self.store.get_performance(post_id).await {
            Ok(sample) => Some(sample),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        if let Ok(features) = self.extractor.extract(&history, sample.as_ref()) {
            return Ok(features);
        }

        match history.last() {
            Some(latest) => {
                let category = latest.category.clone();
                let category_history = self.store.get_category_history(&category).await?;
                debug!(post_id, category, "Using category-level feature fallback");
                Ok(self.extractor.category_features(&category, &category_history))
            }
            None => Ok(self.extractor.global_default()),
        }
    }

    async fn model_for(
        &self,
        features: &PostFeatures,
    ) -> Result<Arc<dyn ScoringModel>, ServiceError> {
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
        Ok(Arc::new(HeuristicModel::from_history(&history)))
    }
}

/// Distinct day names of the strongest slots, strongest first
fn top_day_names(ranked: &[RankedSlot], limit: usize) -> Vec<String> {
    let mut days = Vec::with_capacity(limit);
    for candidate in ranked {
        let name = candidate.slot.day_name().to_string();
        if !days.contains(&name) {
            days.push(name);
            if days.len() == limit {
                break;
            }
        }
    }
    days
}
