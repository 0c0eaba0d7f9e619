// Scheduling engine: pure slot ranking and threshold-gated decisions

use crate::features::PostFeatures;
use crate::model::ScoringModel;
use crate::models::{CandidateWindow, RankedSlot, ReasonCode, ScheduleDecision, ScheduleRecord};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Configuration for the scheduling engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum confidence before a move is recommended
    pub confidence_threshold: f64,
    /// Length of the default candidate window in days
    pub window_days: i64,
    /// Spacing between candidate slots in hours
    pub slot_step_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            window_days: 7,
            slot_step_hours: 1,
        }
    }
}

/// Ranks candidate publish slots and decides whether a post should move.
///
/// Decisions are a pure function of (features, model, threshold): the engine
/// performs no I/O and persists nothing; callers own the side effects.
#[derive(Debug, Clone, Default)]
pub struct SchedulingEngine {
    config: EngineConfig,
}

impl SchedulingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Default candidate window starting at `from`
    pub fn default_window(&self, from: DateTime<Utc>) -> CandidateWindow {
        CandidateWindow::new(
            from,
            from + chrono::Duration::days(self.config.window_days),
            self.config.slot_step_hours,
        )
    }

    /// Rank every slot in the window by descending confidence,
    /// ties broken by earliest time. Never returns a slot outside the window.
    pub fn recommend(
        &self,
        model: &dyn ScoringModel,
        features: &PostFeatures,
        window: &CandidateWindow,
    ) -> Vec<RankedSlot> {
        let mut ranked: Vec<RankedSlot> = window
            .slots()
            .into_iter()
            .map(|slot| RankedSlot {
                slot,
                confidence: model.score(&slot, features),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.slot.publish_at.cmp(&b.slot.publish_at))
        });
        ranked
    }

    /// Pick the top slot when its confidence clears the threshold; otherwise
    /// keep the existing time with reason `BELOW_THRESHOLD`.
    pub fn decide(
        &self,
        model: &dyn ScoringModel,
        features: &PostFeatures,
        existing: &ScheduleRecord,
        window: &CandidateWindow,
    ) -> ScheduleDecision {
        let ranked = self.recommend(model, features, window);
        let Some(top) = ranked.first() else {
            return ScheduleDecision::Unchanged {
                post_id: existing.post_id,
                scheduled_time: existing.scheduled_time,
                reason: ReasonCode::NoCandidates,
            };
        };

        debug!(
            post_id = existing.post_id,
            top_slot = %top.slot.publish_at,
            confidence = top.confidence,
            threshold = self.config.confidence_threshold,
            "Top candidate evaluated"
        );

        if top.confidence <= self.config.confidence_threshold {
            return ScheduleDecision::Unchanged {
                post_id: existing.post_id,
                scheduled_time: existing.scheduled_time,
                reason: ReasonCode::BelowThreshold,
            };
        }

        if top.slot.publish_at == existing.scheduled_time {
            return ScheduleDecision::Unchanged {
                post_id: existing.post_id,
                scheduled_time: existing.scheduled_time,
                reason: ReasonCode::AlreadyOptimal,
            };
        }

        ScheduleDecision::Move {
            post_id: existing.post_id,
            slot: top.slot,
            confidence: top.confidence,
        }
    }
}
