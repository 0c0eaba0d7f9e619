// Feature extraction: raw post history into fixed-width normalized vectors

use crate::errors::FeatureError;
use crate::models::{ContentType, PerformanceSample, Slot, TrainingExample};
use std::f64::consts::TAU;
use std::hash::{Hash, Hasher};

/// Rolling engagement window, number of most recent examples
pub const DEFAULT_ROLLING_WINDOW: usize = 20;

/// Minimum per-category history before per-post features are meaningful
pub const DEFAULT_MIN_HISTORY: usize = 5;

/// Hash buckets for the category encoding
pub const CATEGORY_BUCKETS: usize = 8;

/// Fixed feature vector width:
/// cyclical day (2) + cyclical hour (2) + length bucket (1)
/// + content-type one-hot + category buckets + rolling mean/std (2)
pub const FEATURE_WIDTH: usize = 4 + 1 + ContentType::COUNT + CATEGORY_BUCKETS + 2;

pub type FeatureVector = [f64; FEATURE_WIDTH];

/// Extraction configuration
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub rolling_window: usize,
    pub min_history: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_window: DEFAULT_ROLLING_WINDOW,
            min_history: DEFAULT_MIN_HISTORY,
        }
    }
}

/// Slot-independent features of a post; combined with a candidate slot by
/// [`encode`] to form the full vector
#[derive(Debug, Clone, PartialEq)]
pub struct PostFeatures {
    pub category: String,
    pub category_bucket: usize,
    pub content_type: ContentType,
    /// Normalized content length in [0, 1]
    pub length_bucket: f64,
    pub engagement_mean: f64,
    pub engagement_std: f64,
}

/// Turns training history and the current performance sample into features
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Per-post features from the post's own history.
    ///
    /// Fails with `InsufficientData` below the configured minimum so callers
    /// fall back to category-level or global features instead of acting on a
    /// degenerate vector.
    pub fn extract(
        &self,
        history: &[TrainingExample],
        sample: Option<&PerformanceSample>,
    ) -> Result<PostFeatures, FeatureError> {
        if history.len() < self.config.min_history {
            let category = history
                .last()
                .map(|e| e.category.clone())
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(FeatureError::InsufficientData {
                category,
                found: history.len(),
                required: self.config.min_history,
            });
        }

        let mut ordered: Vec<&TrainingExample> = history.iter().collect();
        ordered.sort_by_key(|e| e.publish_time);
        let latest = ordered[ordered.len() - 1];

        let mut engagement: Vec<f64> = ordered.iter().map(|e| e.engagement_score).collect();
        if let Some(sample) = sample {
            // Treat the live reading as the most recent observation
            engagement.push(sample.engagement.clamp(0.0, 1.0));
        }
        let (mean, std) = rolling_stats(&engagement, self.config.rolling_window);

        Ok(PostFeatures {
            category: latest.category.clone(),
            category_bucket: category_bucket(&latest.category),
            content_type: latest.content_type,
            length_bucket: length_bucket(latest.content_length),
            engagement_mean: mean,
            engagement_std: std,
        })
    }

    /// Category-level fallback when a post has too little history of its own.
    /// Aggregates whatever category history exists, without a minimum gate.
    pub fn category_features(
        &self,
        category: &str,
        history: &[TrainingExample],
    ) -> PostFeatures {
        if history.is_empty() {
            let mut features = self.global_default();
            features.category = category.to_string();
            features.category_bucket = category_bucket(category);
            return features;
        }

        let mut ordered: Vec<&TrainingExample> = history.iter().collect();
        ordered.sort_by_key(|e| e.publish_time);
        let latest = ordered[ordered.len() - 1];

        let engagement: Vec<f64> = ordered.iter().map(|e| e.engagement_score).collect();
        let (mean, std) = rolling_stats(&engagement, self.config.rolling_window);
        let avg_length =
            ordered.iter().map(|e| f64::from(e.content_length)).sum::<f64>() / ordered.len() as f64;

        PostFeatures {
            category: category.to_string(),
            category_bucket: category_bucket(category),
            content_type: latest.content_type,
            length_bucket: length_bucket(avg_length.round() as u32),
            engagement_mean: mean,
            engagement_std: std,
        }
    }

    /// Neutral feature set used when no history exists anywhere
    pub fn global_default(&self) -> PostFeatures {
        PostFeatures {
            category: String::new(),
            category_bucket: 0,
            content_type: ContentType::Other,
            length_bucket: 0.5,
            engagement_mean: 0.5,
            engagement_std: 0.0,
        }
    }
}

/// Combine a candidate slot with post features into the full vector
pub fn encode(slot: &Slot, features: &PostFeatures) -> FeatureVector {
    let mut vector = [0.0; FEATURE_WIDTH];

    // Cyclical encodings avoid false ordinal distance across week/day wrap
    let (day_sin, day_cos) = cyclical(f64::from(slot.day_of_week()), 7.0);
    let (hour_sin, hour_cos) = cyclical(f64::from(slot.hour_of_day()), 24.0);
    vector[0] = day_sin;
    vector[1] = day_cos;
    vector[2] = hour_sin;
    vector[3] = hour_cos;
    vector[4] = features.length_bucket;

    let one_hot_base = 5;
    vector[one_hot_base + features.content_type.one_hot_index()] = 1.0;

    let category_base = one_hot_base + ContentType::COUNT;
    vector[category_base + features.category_bucket % CATEGORY_BUCKETS] = 1.0;

    let stats_base = category_base + CATEGORY_BUCKETS;
    vector[stats_base] = features.engagement_mean;
    vector[stats_base + 1] = features.engagement_std;

    vector
}

/// Mean and standard deviation over the last `window` values
pub fn rolling_stats(values: &[f64], window: usize) -> (f64, f64) {
    let window = window.max(1);
    let tail: &[f64] = if values.len() > window {
        &values[values.len() - window..]
    } else {
        values
    };
    if tail.is_empty() {
        return (0.5, 0.0);
    }

    let n = tail.len() as f64;
    let mean = tail.iter().sum::<f64>() / n;
    let variance = tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Stable hash bucket for a category name.
/// `DefaultHasher::new()` uses fixed keys, so buckets are stable across runs.
pub fn category_bucket(category: &str) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    category.hash(&mut hasher);
    (hasher.finish() as usize) % CATEGORY_BUCKETS
}

/// Normalized content-length bucket
pub fn length_bucket(length: u32) -> f64 {
    let bucket = match length {
        0..=299 => 0,
        300..=799 => 1,
        800..=1499 => 2,
        1500..=2999 => 3,
        _ => 4,
    };
    f64::from(bucket) / 4.0
}

fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = TAU * value / period;
    (angle.sin(), angle.cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn example(days_ago: i64, engagement: f64) -> TrainingExample {
        let publish = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() - Duration::days(days_ago);
        TrainingExample::new(
            1,
            publish,
            1200,
            ContentType::Article,
            "tech",
            BTreeSet::new(),
            engagement,
        )
    }

    #[test]
    fn test_insufficient_data_below_minimum() {
        let extractor = FeatureExtractor::default();
        let history = vec![example(1, 0.5), example(2, 0.6)];
        let result = extractor.extract(&history, None);
        assert!(matches!(
            result,
            Err(FeatureError::InsufficientData {
                found: 2,
                required: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_insufficient_data_on_empty_history() {
        let extractor = FeatureExtractor::default();
        let result = extractor.extract(&[], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_with_enough_history() {
        let extractor = FeatureExtractor::default();
        let history: Vec<TrainingExample> = (0..6).map(|i| example(i, 0.6)).collect();
        let features = extractor.extract(&history, None).unwrap();
        assert_eq!(features.category, "tech");
        assert!((features.engagement_mean - 0.6).abs() < 1e-9);
        assert!(features.engagement_std.abs() < 1e-9);
    }

    #[test]
    fn test_sample_engagement_enters_rolling_window() {
        let extractor = FeatureExtractor::default();
        let history: Vec<TrainingExample> = (0..6).map(|i| example(i, 0.0)).collect();
        let sample = PerformanceSample {
            post_id: 1,
            views: 10,
            engagement: 1.0,
            social_shares: 0,
            avg_time_on_page_secs: 30.0,
            performance_score: None,
            last_updated: Utc::now(),
        };
        let features = extractor.extract(&history, Some(&sample)).unwrap();
        assert!(features.engagement_mean > 0.0);
    }

    #[test]
    fn test_encode_width_and_bounds() {
        let extractor = FeatureExtractor::default();
        let history: Vec<TrainingExample> = (0..6).map(|i| example(i, 0.7)).collect();
        let features = extractor.extract(&history, None).unwrap();
        let vector = encode(&Slot::new(Utc::now()), &features);

        assert_eq!(vector.len(), FEATURE_WIDTH);
        for value in vector {
            assert!((-1.0..=1.0).contains(&value), "out of bounds: {value}");
        }
    }

    #[test]
    fn test_cyclical_encoding_wraps() {
        // Sunday (6) and Monday (0) should be close in encoded space,
        // unlike their ordinal distance
        let (sun_sin, sun_cos) = cyclical(6.0, 7.0);
        let (mon_sin, mon_cos) = cyclical(0.0, 7.0);
        let (thu_sin, thu_cos) = cyclical(3.0, 7.0);

        let wrap_dist = ((sun_sin - mon_sin).powi(2) + (sun_cos - mon_cos).powi(2)).sqrt();
        let far_dist = ((thu_sin - mon_sin).powi(2) + (thu_cos - mon_cos).powi(2)).sqrt();
        assert!(wrap_dist < far_dist);
    }

    #[test]
    fn test_rolling_stats_respects_window() {
        let values = vec![0.0, 0.0, 0.0, 1.0, 1.0];
        let (mean, _) = rolling_stats(&values, 2);
        assert!((mean - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_stats_empty_defaults_to_neutral() {
        let (mean, std) = rolling_stats(&[], 20);
        assert_eq!(mean, 0.5);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_category_bucket_stable_and_in_range() {
        let a = category_bucket("tech");
        let b = category_bucket("tech");
        assert_eq!(a, b);
        assert!(a < CATEGORY_BUCKETS);
    }

    #[test]
    fn test_length_buckets_monotonic() {
        assert_eq!(length_bucket(100), 0.0);
        assert_eq!(length_bucket(500), 0.25);
        assert_eq!(length_bucket(1000), 0.5);
        assert_eq!(length_bucket(2000), 0.75);
        assert_eq!(length_bucket(5000), 1.0);
    }

    #[test]
    fn test_category_fallback_without_history() {
        let extractor = FeatureExtractor::default();
        let features = extractor.category_features("lifestyle", &[]);
        assert_eq!(features.category, "lifestyle");
        assert_eq!(features.engagement_mean, 0.5);
    }

    #[test]
    fn test_category_fallback_aggregates() {
        let extractor = FeatureExtractor::default();
        let history = vec![example(1, 0.2), example(2, 0.4)];
        let features = extractor.category_features("tech", &history);
        assert!((features.engagement_mean - 0.3).abs() < 1e-9);
    }
}
