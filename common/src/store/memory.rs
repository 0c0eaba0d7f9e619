// In-memory metrics store: test backbone and base for the file-backed store

use super::MetricsStore;
use crate::errors::StoreError;
use crate::models::{
    AbTestAssignment, PerformanceSample, PostId, ScheduleRecord, TrainingExample,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Serializable snapshot of everything the store holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub samples: HashMap<PostId, PerformanceSample>,
    pub examples: Vec<TrainingExample>,
    pub schedules: HashMap<PostId, Vec<ScheduleRecord>>,
    pub assignments: Vec<AbTestAssignment>,
}

/// Thread-safe in-memory implementation of [`MetricsStore`]
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    inner: RwLock<StoreState>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoreState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    /// Snapshot the current state, used by the file-backed store to persist
    pub async fn export(&self) -> StoreState {
        self.inner.read().await.clone()
    }

    pub async fn import(&self, state: StoreState) {
        *self.inner.write().await = state;
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn get_performance(&self, post_id: PostId) -> Result<PerformanceSample, StoreError> {
        self.inner
            .read()
            .await
            .samples
            .get(&post_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("performance sample for post {post_id}")))
    }

    async fn upsert_performance(&self, sample: PerformanceSample) -> Result<(), StoreError> {
        self.inner.write().await.samples.insert(sample.post_id, sample);
        Ok(())
    }

    async fn update_performance_score(
        &self,
        post_id: PostId,
        score: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let sample = state
            .samples
            .get_mut(&post_id)
            .ok_or_else(|| StoreError::NotFound(format!("performance sample for post {post_id}")))?;
        // last_updated is the collection timestamp and belongs to whoever
        // feeds the samples in; the derived score does not refresh it
        sample.performance_score = Some(score);
        Ok(())
    }

    async fn get_post_history(&self, post_id: PostId) -> Result<Vec<TrainingExample>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .examples
            .iter()
            .filter(|e| e.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn get_category_history(
        &self,
        category: &str,
    ) -> Result<Vec<TrainingExample>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .examples
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect())
    }

    async fn get_all_history(&self) -> Result<Vec<TrainingExample>, StoreError> {
        Ok(self.inner.read().await.examples.clone())
    }

    async fn record_example(&self, example: TrainingExample) -> Result<(), StoreError> {
        self.inner.write().await.examples.push(example);
        Ok(())
    }

    async fn record_schedule(&self, record: ScheduleRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .schedules
            .entry(record.post_id)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn get_schedule(&self, post_id: PostId) -> Result<ScheduleRecord, StoreError> {
        self.inner
            .read()
            .await
            .schedules
            .get(&post_id)
            .and_then(|log| log.last())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("schedule record for post {post_id}")))
    }

    async fn schedule_log(&self, post_id: PostId) -> Result<Vec<ScheduleRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .schedules
            .get(&post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn monitored_posts(&self) -> Result<Vec<PostId>, StoreError> {
        let mut posts: Vec<PostId> = self.inner.read().await.schedules.keys().copied().collect();
        posts.sort_unstable();
        Ok(posts)
    }

    async fn record_assignment(&self, assignment: AbTestAssignment) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let now = Utc::now();
        // At most one active assignment per (test_name, post_id)
        for existing in state.assignments.iter_mut() {
            if existing.is_active
                && existing.test_name == assignment.test_name
                && existing.post_id == assignment.post_id
            {
                existing.is_active = false;
                existing.end_time = Some(now);
            }
        }
        state.assignments.push(assignment);
        Ok(())
    }

    async fn active_assignment_for_post(
        &self,
        post_id: PostId,
    ) -> Result<Option<AbTestAssignment>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .assignments
            .iter()
            .find(|a| a.is_active && a.post_id == post_id)
            .cloned())
    }
}
