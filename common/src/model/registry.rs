// Atomically swapped reference to the latest trained model snapshot

use super::ScoringModel;
use crate::errors::ModelError;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Holds the current scoring model behind an atomically swapped pointer.
///
/// Installing a new snapshot never invalidates readers: callers that already
/// cloned the `Arc` keep scoring against the snapshot they started with, so
/// training can run concurrently with scoring.
#[derive(Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<dyn ScoringModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest installed model, or `Untrained` when none exists yet.
    /// Callers fall back to [`super::HeuristicModel`] on `Untrained`.
    pub fn latest(&self) -> Result<Arc<dyn ScoringModel>, ModelError> {
        self.read().clone().ok_or(ModelError::Untrained)
    }

    pub fn is_trained(&self) -> bool {
        self.read().is_some()
    }

    pub fn version(&self) -> Option<u32> {
        self.read().as_ref().map(|m| m.version())
    }

    /// Swap in a new snapshot
    pub fn install(&self, model: Arc<dyn ScoringModel>) {
        let version = model.version();
        *self.write() = Some(model);
        info!(version, "Model snapshot installed");
    }

    /// Discard the current model, reverting callers to the heuristic fallback
    pub fn reset(&self) {
        *self.write() = None;
        info!("Model registry reset");
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<dyn ScoringModel>>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn ScoringModel>>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trainer;

    #[test]
    fn test_untrained_registry_errors() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_trained());
        assert!(matches!(registry.latest(), Err(ModelError::Untrained)));
    }

    #[test]
    fn test_install_and_reset() {
        let registry = ModelRegistry::new();
        let state = Trainer::default().train(&[], 1);
        registry.install(Arc::new(state));

        assert!(registry.is_trained());
        assert_eq!(registry.version(), Some(1));

        registry.reset();
        assert!(!registry.is_trained());
    }

    #[test]
    fn test_readers_keep_old_snapshot_across_install() {
        let registry = ModelRegistry::new();
        registry.install(Arc::new(Trainer::default().train(&[], 1)));

        let in_flight = registry.latest().unwrap();
        registry.install(Arc::new(Trainer::default().train(&[], 2)));

        // The reference taken before the swap still points at version 1
        assert_eq!(in_flight.version(), 1);
        assert_eq!(registry.version(), Some(2));
    }
}
