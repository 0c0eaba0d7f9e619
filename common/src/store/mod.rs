// Metrics store interface: the decision core's only persistence seam

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::{InMemoryMetricsStore, StoreState};

use crate::errors::StoreError;
use crate::models::{
    AbTestAssignment, PerformanceSample, PostId, ScheduleRecord, TrainingExample,
};
use async_trait::async_trait;

/// Narrow interface to performance samples, schedule records, the training
/// corpus, and A/B assignments.
///
/// The core never performs network I/O itself; collaborators feed this store
/// and it is injected wherever decisions are made, so tests can substitute
/// in-memory or failing implementations.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Latest performance reading for a post
    async fn get_performance(&self, post_id: PostId) -> Result<PerformanceSample, StoreError>;

    /// Overwrite a post's performance sample (one logical row per post)
    async fn upsert_performance(&self, sample: PerformanceSample) -> Result<(), StoreError>;

    /// Write back the derived performance score
    async fn update_performance_score(
        &self,
        post_id: PostId,
        score: f64,
    ) -> Result<(), StoreError>;

    /// Training history for one post
    async fn get_post_history(&self, post_id: PostId) -> Result<Vec<TrainingExample>, StoreError>;

    /// Training history for a category
    async fn get_category_history(
        &self,
        category: &str,
    ) -> Result<Vec<TrainingExample>, StoreError>;

    /// The entire training corpus
    async fn get_all_history(&self) -> Result<Vec<TrainingExample>, StoreError>;

    /// Append an immutable training example
    async fn record_example(&self, example: TrainingExample) -> Result<(), StoreError>;

    /// Append a schedule record to the post's audit log
    async fn record_schedule(&self, record: ScheduleRecord) -> Result<(), StoreError>;

    /// Latest schedule record for a post
    async fn get_schedule(&self, post_id: PostId) -> Result<ScheduleRecord, StoreError>;

    /// Full append-style audit log for a post, oldest first
    async fn schedule_log(&self, post_id: PostId) -> Result<Vec<ScheduleRecord>, StoreError>;

    /// Posts that have a schedule record and are therefore swept
    async fn monitored_posts(&self) -> Result<Vec<PostId>, StoreError>;

    /// Record an assignment, deactivating any active assignment for the same
    /// `(test_name, post_id)` pair first
    async fn record_assignment(&self, assignment: AbTestAssignment) -> Result<(), StoreError>;

    /// Any active assignment for the post, across all tests
    async fn active_assignment_for_post(
        &self,
        post_id: PostId,
    ) -> Result<Option<AbTestAssignment>, StoreError>;
}
