// Scoring model: slot confidence estimation behind a swappable trait

mod heuristic;
mod registry;
mod regressor;

pub use heuristic::HeuristicModel;
pub use registry::ModelRegistry;
pub use regressor::{ModelState, Trainer, TrainerConfig};

use crate::features::PostFeatures;
use crate::models::Slot;

/// Steepness of the logistic squash mapping prediction deltas to confidence
pub const CONFIDENCE_STEEPNESS: f64 = 6.0;

/// Confidence estimator for candidate publish slots.
///
/// Implementations must be deterministic: the same state and inputs yield the
/// same confidence on every call.
pub trait ScoringModel: Send + Sync {
    /// Confidence in [0, 1] that publishing at `slot` outperforms the
    /// post's category baseline
    fn score(&self, slot: &Slot, features: &PostFeatures) -> f64;

    /// Monotonically increasing model version; 0 for heuristic fallbacks
    fn version(&self) -> u32;
}

/// Normalize a raw engagement prediction against a baseline.
/// A prediction equal to the baseline maps to 0.5.
pub fn confidence_from(prediction: f64, baseline: f64) -> f64 {
    logistic(CONFIDENCE_STEEPNESS * (prediction - baseline))
}

fn logistic(x: f64) -> f64 {
    (1.0 / (1.0 + (-x).exp())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_at_baseline_is_half() {
        assert!((confidence_from(0.5, 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_monotonic_in_prediction() {
        let low = confidence_from(0.2, 0.5);
        let mid = confidence_from(0.5, 0.5);
        let high = confidence_from(0.9, 0.5);
        assert!(low < mid && mid < high);
    }

    #[test]
    fn test_confidence_bounded() {
        assert!(confidence_from(100.0, 0.0) <= 1.0);
        assert!(confidence_from(-100.0, 0.0) >= 0.0);
    }
}
