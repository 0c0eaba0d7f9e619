// Linear regressor over engineered features, fit by seeded SGD

use super::{confidence_from, ScoringModel};
use crate::errors::ModelError;
use crate::features::{self, FeatureVector, PostFeatures, FEATURE_WIDTH};
use crate::models::{Slot, TrainingExample};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Baseline used when a category has no history at all
const NEUTRAL_BASELINE: f64 = 0.5;

/// Immutable, versioned snapshot of trained scoring parameters.
///
/// Retraining produces a new state; existing references stay valid for
/// in-flight scoring, so there is no shared-mutable-model hazard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    version: u32,
    trained_at: DateTime<Utc>,
    example_count: usize,
    weights: Vec<f64>,
    bias: f64,
    category_baselines: HashMap<String, f64>,
    global_baseline: f64,
}

impl ModelState {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn example_count(&self) -> usize {
        self.example_count
    }

    /// True for the state produced by training on an empty corpus
    pub fn is_trivial(&self) -> bool {
        self.example_count == 0
    }

    pub fn baseline_for(&self, category: &str) -> f64 {
        self.category_baselines
            .get(category)
            .copied()
            .unwrap_or(self.global_baseline)
    }

    /// Raw engagement prediction for an encoded feature vector
    pub fn predict(&self, vector: &FeatureVector) -> f64 {
        let dot: f64 = self
            .weights
            .iter()
            .zip(vector.iter())
            .map(|(w, x)| w * x)
            .sum();
        self.bias + dot
    }

    /// Load a previously persisted snapshot
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        let state = serde_json::from_slice(&bytes)?;
        Ok(state)
    }

    /// Persist the snapshot as JSON, tmp-write then rename
    #[instrument(skip(self, path), fields(version = self.version))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Model state persisted");
        Ok(())
    }
}

impl ScoringModel for ModelState {
    fn score(&self, slot: &Slot, features: &PostFeatures) -> f64 {
        let vector = features::encode(slot, features);
        let prediction = self.predict(&vector);
        confidence_from(prediction, self.baseline_for(&features.category))
    }

    fn version(&self) -> u32 {
        self.version
    }
}

/// Training hyperparameters; the fixed seed keeps training reproducible
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub seed: u64,
    pub rolling_window: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 64,
            learning_rate: 0.05,
            l2: 1e-4,
            seed: 17,
            rolling_window: features::DEFAULT_ROLLING_WINDOW,
        }
    }
}

/// Batch trainer producing [`ModelState`] snapshots
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Fit a new model state from the training corpus.
    ///
    /// An empty corpus is not an error: it yields a trivial state that
    /// predicts the neutral baseline everywhere.
    #[instrument(skip(self, examples), fields(examples = examples.len()))]
    pub fn train(&self, examples: &[TrainingExample], next_version: u32) -> ModelState {
        let (category_baselines, global_baseline) = baselines(examples);

        if examples.is_empty() {
            info!(version = next_version, "Training corpus empty, producing trivial model state");
            return ModelState {
                version: next_version,
                trained_at: Utc::now(),
                example_count: 0,
                weights: vec![0.0; FEATURE_WIDTH],
                bias: NEUTRAL_BASELINE,
                category_baselines,
                global_baseline,
            };
        }

        let rows = self.build_rows(examples);
        let (weights, bias) = self.fit(&rows, global_baseline);

        info!(
            version = next_version,
            examples = examples.len(),
            categories = category_baselines.len(),
            "Model training completed"
        );

        ModelState {
            version: next_version,
            trained_at: Utc::now(),
            example_count: examples.len(),
            weights,
            bias,
            category_baselines,
            global_baseline,
        }
    }

    /// Encode examples into (vector, target) rows. Rolling engagement stats
    /// use only the examples published before each row, per category, so the
    /// features match what extraction would have seen at publish time.
    fn build_rows(&self, examples: &[TrainingExample]) -> Vec<(FeatureVector, f64)> {
        let mut ordered: Vec<&TrainingExample> = examples.iter().collect();
        ordered.sort_by_key(|e| e.publish_time);

        let mut per_category: HashMap<&str, Vec<f64>> = HashMap::new();
        let mut rows = Vec::with_capacity(ordered.len());

        for example in ordered {
            let prior = per_category.entry(example.category.as_str()).or_default();
            let (mean, std) = features::rolling_stats(prior, self.config.rolling_window);

            let post_features = PostFeatures {
                category: example.category.clone(),
                category_bucket: features::category_bucket(&example.category),
                content_type: example.content_type,
                length_bucket: features::length_bucket(example.content_length),
                engagement_mean: mean,
                engagement_std: std,
            };

            let vector = features::encode(&example.slot(), &post_features);
            rows.push((vector, example.engagement_score.clamp(0.0, 1.0)));
            prior.push(example.engagement_score.clamp(0.0, 1.0));
        }

        rows
    }

    fn fit(&self, rows: &[(FeatureVector, f64)], initial_bias: f64) -> (Vec<f64>, f64) {
        let mut weights = vec![0.0; FEATURE_WIDTH];
        let mut bias = initial_bias;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..rows.len()).collect();

        for _ in 0..self.config.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let (ref x, y) = rows[i];
                let prediction: f64 =
                    bias + weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>();
                let error = prediction - y;
                for (w, v) in weights.iter_mut().zip(x.iter()) {
                    *w -= self.config.learning_rate * (error * v + self.config.l2 * *w);
                }
                bias -= self.config.learning_rate * error;
            }
        }

        (weights, bias)
    }
}

/// Mean engagement per category plus the global mean
fn baselines(examples: &[TrainingExample]) -> (HashMap<String, f64>, f64) {
    if examples.is_empty() {
        return (HashMap::new(), NEUTRAL_BASELINE);
    }

    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    let mut total = 0.0;
    for example in examples {
        let entry = sums.entry(example.category.clone()).or_insert((0.0, 0));
        entry.0 += example.engagement_score;
        entry.1 += 1;
        total += example.engagement_score;
    }

    let baselines = sums
        .into_iter()
        .map(|(category, (sum, count))| (category, sum / count as f64))
        .collect();
    (baselines, total / examples.len() as f64)
}
