//! Named registry of scaling algorithms
//!
//! The registry is read-heavy: every reconciliation pass looks an algorithm
//! up, while registration happens once at startup (built-ins plus any
//! plugins). Reads take a shared lock; registration takes the write lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;

use super::{AverageRatio, MaxRatio, ScalingAlgorithm, WeightedRatio};
use crate::DEFAULT_TOLERANCE;

/// Errors from registry operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The requested algorithm is not registered
    #[error("algorithm not found: name={0:?}")]
    NotFound(String),

    /// An algorithm with the same name is already registered
    #[error("algorithm already registered: name={0:?}")]
    Duplicate(String),

    /// The algorithm's name is empty after trimming
    #[error("algorithm name must be non-empty")]
    InvalidName,
}

/// Thread-safe mapping from algorithm name to implementation
///
/// Names are case-sensitive and trimmed of surrounding whitespace at
/// registration time.
#[derive(Default)]
pub struct Registry {
    algorithms: RwLock<HashMap<String, Arc<dyn ScalingAlgorithm>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an algorithm to the registry
    ///
    /// Fails with [`RegistryError::InvalidName`] when the trimmed name is
    /// empty and [`RegistryError::Duplicate`] when the name is taken.
    pub fn register(&self, algorithm: Arc<dyn ScalingAlgorithm>) -> Result<(), RegistryError> {
        let name = algorithm.name().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }

        let mut algorithms = self.algorithms.write().expect("registry lock poisoned");
        if algorithms.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        algorithms.insert(name, algorithm);
        Ok(())
    }

    /// Add an algorithm to the registry, panicking on error
    ///
    /// For startup-time seeding where a failure is a programming error.
    pub fn must_register(&self, algorithm: Arc<dyn ScalingAlgorithm>) {
        if let Err(e) = self.register(algorithm) {
            panic!("failed to register algorithm: {e}");
        }
    }

    /// Retrieve an algorithm by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ScalingAlgorithm>, RegistryError> {
        self.algorithms
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All registered algorithm names, sorted lexicographically
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .algorithms
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Whether an algorithm with the given name is registered
    pub fn has(&self, name: &str) -> bool {
        self.algorithms
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| {
    let registry = Registry::new();
    registry.must_register(Arc::new(MaxRatio::new(DEFAULT_TOLERANCE)));
    registry.must_register(Arc::new(AverageRatio::new(DEFAULT_TOLERANCE)));
    registry.must_register(Arc::new(WeightedRatio::new(DEFAULT_TOLERANCE, Vec::new())));
    Arc::new(registry)
});

/// The process-wide algorithm registry
///
/// Seeded with the three built-ins on first use. Plugins discovered at
/// startup register here before the controller starts reconciling.
pub fn default_registry() -> Arc<Registry> {
    DEFAULT_REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::{ScalingInput, ScalingResult};
    use async_trait::async_trait;

    /// Minimal algorithm for registry tests
    struct NamedAlgorithm(&'static str);

    #[async_trait]
    impl ScalingAlgorithm for NamedAlgorithm {
        fn name(&self) -> &str {
            self.0
        }

        async fn compute_scale(&self, input: &ScalingInput) -> crate::Result<ScalingResult> {
            Ok(ScalingResult::new(input.current_replicas, "held"))
        }
    }

    // =========================================================================
    // Registration Stories
    // =========================================================================

    /// Story: Registering and resolving an algorithm round-trips
    #[test]
    fn story_register_then_get() {
        let registry = Registry::new();
        registry
            .register(Arc::new(NamedAlgorithm("Custom")))
            .unwrap();

        assert!(registry.has("Custom"));
        assert_eq!(registry.get("Custom").unwrap().name(), "Custom");
    }

    /// Story: A name can be claimed only once
    ///
    /// Re-registering the same name fails with Duplicate, even for the same
    /// instance - callers must not silently shadow an existing algorithm.
    #[test]
    fn story_duplicate_names_are_rejected() {
        let registry = Registry::new();
        let algorithm = Arc::new(NamedAlgorithm("Custom"));

        registry.register(algorithm.clone()).unwrap();
        let result = registry.register(algorithm);

        assert!(matches!(result, Err(RegistryError::Duplicate(name)) if name == "Custom"));
    }

    /// Story: Empty names are rejected before they can poison lookups
    #[test]
    fn story_blank_names_are_rejected() {
        let registry = Registry::new();
        let result = registry.register(Arc::new(NamedAlgorithm("   ")));
        assert!(matches!(result, Err(RegistryError::InvalidName)));
    }

    /// Story: Names are case-sensitive
    #[test]
    fn story_lookup_is_case_sensitive() {
        let registry = Registry::new();
        registry
            .register(Arc::new(NamedAlgorithm("MaxRatio")))
            .unwrap();

        assert!(registry.has("MaxRatio"));
        assert!(!registry.has("maxratio"));
        assert!(matches!(
            registry.get("maxratio"),
            Err(RegistryError::NotFound(_))
        ));
    }

    /// Story: list() is deterministic for operators and events
    ///
    /// The UnknownAlgorithm event includes the available names; sorting keeps
    /// repeated events byte-identical.
    #[test]
    fn story_list_is_lexicographically_sorted() {
        let registry = Registry::new();
        for name in ["Zeta", "Alpha", "Mid"] {
            registry.register(Arc::new(NamedAlgorithm(name))).unwrap();
        }

        assert_eq!(registry.list(), vec!["Alpha", "Mid", "Zeta"]);
    }

    // =========================================================================
    // Default Registry Stories
    // =========================================================================

    /// Story: The process-wide registry comes pre-seeded with the built-ins
    #[test]
    fn story_default_registry_has_builtins() {
        let registry = default_registry();
        assert!(registry.has("MaxRatio"));
        assert!(registry.has("AverageRatio"));
        assert!(registry.has("WeightedRatio"));

        let names = registry.list();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted, "list() must stay sorted");
    }

    /// Story: Concurrent lookups share the read lock
    #[test]
    fn story_concurrent_reads_do_not_block_each_other() {
        let registry = Arc::new(Registry::new());
        registry
            .register(Arc::new(NamedAlgorithm("Shared")))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.has("Shared"));
                        assert!(registry.get("Shared").is_ok());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
