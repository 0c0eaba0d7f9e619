// JSON-file metrics store: a single-snapshot persistence layer so the
// sweeper binary can run standalone

use super::{InMemoryMetricsStore, MetricsStore, StoreState};
use crate::errors::StoreError;
use crate::models::{
    AbTestAssignment, PerformanceSample, PostId, ScheduleRecord, TrainingExample,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// [`MetricsStore`] backed by a JSON snapshot on disk.
///
/// Every mutation rewrites the snapshot via tmp-write + rename, so a crash
/// mid-write never leaves a torn file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    mem: InMemoryMetricsStore,
    path: PathBuf,
}

impl JsonFileStore {
    /// Open or create the store at `path`
    #[instrument(skip(path))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: StoreState = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    posts = state.schedules.len(),
                    examples = state.examples.len(),
                    "Metrics store loaded"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No store snapshot found, starting empty");
                StoreState::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            mem: InMemoryMetricsStore::with_state(state),
            path,
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let state = self.mem.export().await;
        let json = serde_json::to_vec_pretty(&state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Store snapshot persisted");
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for JsonFileStore {
    async fn get_performance(&self, post_id: PostId) -> Result<PerformanceSample, StoreError> {
        self.mem.get_performance(post_id).await
    }

    async fn upsert_performance(&self, sample: PerformanceSample) -> Result<(), StoreError> {
        self.mem.upsert_performance(sample).await?;
        self.persist().await
    }

    async fn update_performance_score(
        &self,
        post_id: PostId,
        score: f64,
    ) -> Result<(), StoreError> {
        self.mem.update_performance_score(post_id, score).await?;
        self.persist().await
    }

    async fn get_post_history(&self, post_id: PostId) -> Result<Vec<TrainingExample>, StoreError> {
        self.mem.get_post_history(post_id).await
    }

    async fn get_category_history(
        &self,
        category: &str,
    ) -> Result<Vec<TrainingExample>, StoreError> {
        self.mem.get_category_history(category).await
    }

    async fn get_all_history(&self) -> Result<Vec<TrainingExample>, StoreError> {
        self.mem.get_all_history().await
    }

    async fn record_example(&self, example: TrainingExample) -> Result<(), StoreError> {
        self.mem.record_example(example).await?;
        self.persist().await
    }

    async fn record_schedule(&self, record: ScheduleRecord) -> Result<(), StoreError> {
        self.mem.record_schedule(record).await?;
        self.persist().await
    }

    async fn get_schedule(&self, post_id: PostId) -> Result<ScheduleRecord, StoreError> {
        self.mem.get_schedule(post_id).await
    }

    async fn schedule_log(&self, post_id: PostId) -> Result<Vec<ScheduleRecord>, StoreError> {
        self.mem.schedule_log(post_id).await
    }

    async fn monitored_posts(&self) -> Result<Vec<PostId>, StoreError> {
        self.mem.monitored_posts().await
    }

    async fn record_assignment(&self, assignment: AbTestAssignment) -> Result<(), StoreError> {
        self.mem.record_assignment(assignment).await?;
        self.persist().await
    }

    async fn active_assignment_for_post(
        &self,
        post_id: PostId,
    ) -> Result<Option<AbTestAssignment>, StoreError> {
        self.mem.active_assignment_for_post(post_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json")).await.unwrap();
        assert!(store.monitored_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let scheduled = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store
                .record_schedule(ScheduleRecord::initial(11, scheduled, 0.7))
                .await
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let record = reopened.get_schedule(11).await.unwrap();
        assert_eq!(record.scheduled_time, scheduled);
        assert!(!record.is_rescheduled);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = JsonFileStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
