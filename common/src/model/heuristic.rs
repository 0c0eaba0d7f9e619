// Static day/hour-median heuristic used before any model has been trained

use super::{confidence_from, ScoringModel};
use crate::features::PostFeatures;
use crate::models::{Slot, TrainingExample};

/// Fallback scorer built from historical day-of-week and hour-of-day medians.
///
/// Carries no trained parameters; version is always 0.
#[derive(Debug, Clone)]
pub struct HeuristicModel {
    day_medians: [f64; 7],
    hour_medians: [f64; 24],
    baseline: f64,
}

impl HeuristicModel {
    pub fn from_history(examples: &[TrainingExample]) -> Self {
        let mut by_day: [Vec<f64>; 7] = Default::default();
        let mut by_hour: Vec<Vec<f64>> = vec![Vec::new(); 24];
        let mut all = Vec::with_capacity(examples.len());

        for example in examples {
            let day = (example.day_of_week as usize) % 7;
            let hour = (example.hour_of_day as usize) % 24;
            by_day[day].push(example.engagement_score);
            by_hour[hour].push(example.engagement_score);
            all.push(example.engagement_score);
        }

        let baseline = median(&mut all).unwrap_or(0.5);
        let mut day_medians = [baseline; 7];
        for (day, values) in by_day.iter_mut().enumerate() {
            if let Some(m) = median(values) {
                day_medians[day] = m;
            }
        }
        let mut hour_medians = [baseline; 24];
        for (hour, values) in by_hour.iter_mut().enumerate() {
            if let Some(m) = median(values) {
                hour_medians[hour] = m;
            }
        }

        Self {
            day_medians,
            hour_medians,
            baseline,
        }
    }
}

impl ScoringModel for HeuristicModel {
    fn score(&self, slot: &Slot, _features: &PostFeatures) -> f64 {
        let day = self.day_medians[(slot.day_of_week() as usize) % 7];
        let hour = self.hour_medians[(slot.hour_of_day() as usize) % 24];
        confidence_from(0.5 * day + 0.5 * hour, self.baseline)
    }

    fn version(&self) -> u32 {
        0
    }
}

fn median(values: &mut Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn neutral_features() -> PostFeatures {
        PostFeatures {
            category: "news".to_string(),
            category_bucket: 0,
            content_type: ContentType::Article,
            length_bucket: 0.5,
            engagement_mean: 0.5,
            engagement_std: 0.0,
        }
    }

    #[test]
    fn test_empty_history_scores_neutral() {
        let model = HeuristicModel::from_history(&[]);
        let slot = Slot::new(Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap());
        let confidence = model.score(&slot, &neutral_features());
        assert!((confidence - 0.5).abs() < 1e-9);
        assert_eq!(ScoringModel::version(&model), 0);
    }

    #[test]
    fn test_strong_day_scores_above_weak_day() {
        // Mondays at 9 perform well, Saturdays at 9 poorly
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap();
        let mut examples = Vec::new();
        for week in 0..8 {
            let offset = chrono::Duration::weeks(week);
            examples.push(TrainingExample::new(
                1,
                monday + offset,
                800,
                ContentType::Article,
                "news",
                BTreeSet::new(),
                0.9,
            ));
            examples.push(TrainingExample::new(
                2,
                saturday + offset,
                800,
                ContentType::Article,
                "news",
                BTreeSet::new(),
                0.1,
            ));
        }

        let model = HeuristicModel::from_history(&examples);
        let features = neutral_features();
        let good = model.score(&Slot::new(monday), &features);
        let bad = model.score(&Slot::new(saturday), &features);
        assert!(good > bad);
    }
}
