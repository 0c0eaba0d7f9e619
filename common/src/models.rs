use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// CMS-style numeric post identifier
pub type PostId = i64;

/// Weekday names indexed by day-of-week (0 = Monday .. 6 = Sunday)
pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// ============================================================================
// Slots and candidate windows
// ============================================================================

/// A candidate publish time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub publish_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(publish_at: DateTime<Utc>) -> Self {
        Self { publish_at }
    }

    /// Day of week, 0 = Monday .. 6 = Sunday
    pub fn day_of_week(&self) -> u32 {
        self.publish_at.weekday().num_days_from_monday()
    }

    pub fn hour_of_day(&self) -> u32 {
        self.publish_at.hour()
    }

    pub fn day_name(&self) -> &'static str {
        DAY_NAMES[self.day_of_week() as usize]
    }
}

/// Half-open time window `[start, end)` of candidate slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step_hours: u32,
}

impl CandidateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step_hours: u32) -> Self {
        Self {
            start,
            end,
            step_hours: step_hours.max(1),
        }
    }

    /// Window covering the next `days` days from `from`, hourly steps
    pub fn next_days(from: DateTime<Utc>, days: i64) -> Self {
        Self::new(from, from + Duration::days(days.max(1)), 1)
    }

    pub fn contains(&self, slot: &Slot) -> bool {
        slot.publish_at >= self.start && slot.publish_at < self.end
    }

    /// Enumerate the candidate slots in this window
    pub fn slots(&self) -> Vec<Slot> {
        let step = Duration::hours(i64::from(self.step_hours));
        let mut slots = Vec::new();
        let mut current = self.start;
        while current < self.end {
            slots.push(Slot::new(current));
            current += step;
        }
        slots
    }
}

/// A candidate slot with its model confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedSlot {
    pub slot: Slot,
    pub confidence: f64,
}

// ============================================================================
// Decisions and reason codes
// ============================================================================

/// Short diagnostic codes recorded with every scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    InitialSchedule,
    LowEngagement,
    BelowThreshold,
    PerformanceAcceptable,
    AlreadyOptimal,
    NoCandidates,
    AbTestHold,
    AutoRescheduleDisabled,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InitialSchedule => "INITIAL_SCHEDULE",
            ReasonCode::LowEngagement => "LOW_ENGAGEMENT",
            ReasonCode::BelowThreshold => "BELOW_THRESHOLD",
            ReasonCode::PerformanceAcceptable => "PERFORMANCE_ACCEPTABLE",
            ReasonCode::AlreadyOptimal => "ALREADY_OPTIMAL",
            ReasonCode::NoCandidates => "NO_CANDIDATES",
            ReasonCode::AbTestHold => "AB_TEST_HOLD",
            ReasonCode::AutoRescheduleDisabled => "AUTO_RESCHEDULE_DISABLED",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a scheduling decision; `Unchanged` is a valid result, not an error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ScheduleDecision {
    Move {
        post_id: PostId,
        slot: Slot,
        confidence: f64,
    },
    Unchanged {
        post_id: PostId,
        scheduled_time: DateTime<Utc>,
        reason: ReasonCode,
    },
}

impl ScheduleDecision {
    pub fn is_move(&self) -> bool {
        matches!(self, ScheduleDecision::Move { .. })
    }

    pub fn post_id(&self) -> PostId {
        match self {
            ScheduleDecision::Move { post_id, .. } => *post_id,
            ScheduleDecision::Unchanged { post_id, .. } => *post_id,
        }
    }
}

// ============================================================================
// Schedule records (append-style audit log, keyed by post)
// ============================================================================

/// One entry in a post's schedule audit log.
///
/// Invariant: `original_time` is set iff `is_rescheduled` is true, and always
/// carries the first-ever scheduled time for the post. Construct records only
/// through [`ScheduleRecord::initial`] and [`ScheduleRecord::rescheduled_to`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub post_id: PostId,
    pub scheduled_time: DateTime<Utc>,
    pub is_rescheduled: bool,
    pub original_time: Option<DateTime<Utc>>,
    pub ai_confidence: f64,
    pub reason: ReasonCode,
    pub created_at: DateTime<Utc>,
}

impl ScheduleRecord {
    /// Record created when a post is first scheduled
    pub fn initial(post_id: PostId, scheduled_time: DateTime<Utc>, ai_confidence: f64) -> Self {
        Self {
            post_id,
            scheduled_time,
            is_rescheduled: false,
            original_time: None,
            ai_confidence,
            reason: ReasonCode::InitialSchedule,
            created_at: Utc::now(),
        }
    }

    /// Follow-up record moving the post to a new slot.
    ///
    /// `original_time` is pinned to the first-ever scheduled time, not the
    /// most recent one, so it stays stable across repeated reschedules.
    pub fn rescheduled_to(
        &self,
        new_time: DateTime<Utc>,
        ai_confidence: f64,
        reason: ReasonCode,
    ) -> Self {
        Self {
            post_id: self.post_id,
            scheduled_time: new_time,
            is_rescheduled: true,
            original_time: Some(self.first_scheduled_time()),
            ai_confidence,
            reason,
            created_at: Utc::now(),
        }
    }

    /// The first-ever scheduled time for this post
    pub fn first_scheduled_time(&self) -> DateTime<Utc> {
        self.original_time.unwrap_or(self.scheduled_time)
    }
}

// ============================================================================
// Performance samples
// ============================================================================

/// Weights of the derived performance score blend
const SCORE_WEIGHT_ENGAGEMENT: f64 = 0.4;
const SCORE_WEIGHT_VIEWS: f64 = 0.3;
const SCORE_WEIGHT_SHARES: f64 = 0.2;
const SCORE_WEIGHT_DWELL: f64 = 0.1;

/// Latest performance reading for a post; one logical row per post,
/// overwritten on each collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub post_id: PostId,
    pub views: u64,
    /// Engagement rate in [0, 1]
    pub engagement: f64,
    pub social_shares: u64,
    pub avg_time_on_page_secs: f64,
    /// Derived blend, written back by the rescheduling sweep
    pub performance_score: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceSample {
    /// Derive the performance score from the raw fields.
    ///
    /// Counts are squashed with saturating ratios so a handful of viral posts
    /// cannot dominate the blend; the result is always in [0, 1].
    pub fn compute_score(&self) -> f64 {
        let views = self.views as f64;
        let shares = self.social_shares as f64;
        let views_norm = views / (views + 500.0);
        let shares_norm = shares / (shares + 50.0);
        let dwell_norm = self.avg_time_on_page_secs / (self.avg_time_on_page_secs + 180.0);

        let score = SCORE_WEIGHT_ENGAGEMENT * self.engagement.clamp(0.0, 1.0)
            + SCORE_WEIGHT_VIEWS * views_norm
            + SCORE_WEIGHT_SHARES * shares_norm
            + SCORE_WEIGHT_DWELL * dwell_norm;
        score.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Training examples
// ============================================================================

/// Content type of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Video,
    Gallery,
    Audio,
    Other,
}

impl ContentType {
    pub const COUNT: usize = 5;

    /// Index into a one-hot encoding of width [`ContentType::COUNT`]
    pub fn one_hot_index(&self) -> usize {
        match self {
            ContentType::Article => 0,
            ContentType::Video => 1,
            ContentType::Gallery => 2,
            ContentType::Audio => 3,
            ContentType::Other => 4,
        }
    }
}

/// Immutable historical outcome; the scoring model's training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub post_id: PostId,
    pub publish_time: DateTime<Utc>,
    /// 0 = Monday .. 6 = Sunday, derived from `publish_time`
    pub day_of_week: u32,
    /// 0..=23, derived from `publish_time`
    pub hour_of_day: u32,
    pub content_length: u32,
    pub content_type: ContentType,
    pub category: String,
    pub tags: BTreeSet<String>,
    /// Observed engagement outcome in [0, 1]
    pub engagement_score: f64,
}

impl TrainingExample {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        post_id: PostId,
        publish_time: DateTime<Utc>,
        content_length: u32,
        content_type: ContentType,
        category: impl Into<String>,
        tags: BTreeSet<String>,
        engagement_score: f64,
    ) -> Self {
        let slot = Slot::new(publish_time);
        Self {
            post_id,
            publish_time,
            day_of_week: slot.day_of_week(),
            hour_of_day: slot.hour_of_day(),
            content_length,
            content_type,
            category: category.into(),
            tags,
            engagement_score,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.publish_time)
    }
}

// ============================================================================
// A/B test assignments
// ============================================================================

/// Variant assignment for a running schedule experiment.
///
/// Invariant: at most one active assignment per `(test_name, post_id)`;
/// the store enforces this on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestAssignment {
    pub test_name: String,
    pub post_id: PostId,
    pub variant: String,
    pub start_time: DateTime<Utc>,
    /// None while the test is still running
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl AbTestAssignment {
    pub fn new(test_name: impl Into<String>, post_id: PostId, variant: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            post_id,
            variant: variant.into(),
            start_time: Utc::now(),
            end_time: None,
            is_active: true,
        }
    }

    pub fn ended(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self.is_active = false;
        self
    }
}

// ============================================================================
// Analysis output
// ============================================================================

/// Summary returned by `analyze_content` for a single post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub post_id: PostId,
    /// Best weekdays to publish, strongest first
    pub recommended_days: Vec<String>,
    /// Start of the optimal publish window, hour of day
    pub optimal_hour_start: u32,
    /// End of the optimal publish window, hour of day
    pub optimal_hour_end: u32,
    /// Estimated reach lift versus baseline, percent
    pub estimated_reach_lift_pct: f64,
    pub confidence: f64,
}
