// ============================================================
// API REGISTRY
// ============================================================
// Process-wide map from dataset slug to the descriptor needed to
// serve its generated CRUD surface

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::domain::dataset::DatasetColumn;

/// Everything the generic CRUD executor needs to serve one dataset:
/// structural metadata only, never cached result sets.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub slug: String,
    pub table_name: String,
    pub columns: Vec<DatasetColumn>,
}

/// Shared registry of generated APIs, keyed by slug.
///
/// Reads happen from any number of request-handling tasks; writes go through
/// the pipeline and dataset deletion only. The HTTP layer resolves slugs
/// through `lookup` at request time, so unregistration takes effect on the
/// next request without a process restart.
#[derive(Debug, Default)]
pub struct ApiRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset's descriptor. Re-registering an existing slug is a
    /// warning no-op: startup reload and upload can race on the same slug.
    pub fn register(&self, slug: &str, table_name: &str, columns: Vec<DatasetColumn>) {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(slug) {
            warn!(slug, "dataset already registered, skipping");
            return;
        }

        entries.insert(
            slug.to_string(),
            Arc::new(RegistryEntry {
                slug: slug.to_string(),
                table_name: table_name.to_string(),
                columns,
            }),
        );
        info!(slug, "registered dataset API");
    }

    pub fn lookup(&self, slug: &str) -> Option<Arc<RegistryEntry>> {
        self.entries.read().unwrap().get(slug).cloned()
    }

    pub fn unregister(&self, slug: &str) {
        let removed = self.entries.write().unwrap().remove(slug);
        if removed.is_some() {
            info!(slug, "unregistered dataset API");
        }
    }

    pub fn is_registered(&self, slug: &str) -> bool {
        self.entries.read().unwrap().contains_key(slug)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::DataType;

    fn column(field: &str) -> DatasetColumn {
        DatasetColumn {
            name: field.to_string(),
            field_name: field.to_string(),
            data_type: DataType::Text,
            nullable: true,
            unique: false,
            max_length: None,
            sample_values: Vec::new(),
            position: 0,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ApiRegistry::new();
        registry.register("sales", "dataset_abc123", vec![column("amount")]);

        let entry = registry.lookup("sales").expect("entry registered");
        assert_eq!(entry.table_name, "dataset_abc123");
        assert_eq!(entry.columns.len(), 1);
        assert!(registry.lookup("other").is_none());
    }

    #[test]
    fn test_double_registration_keeps_first_entry() {
        let registry = ApiRegistry::new();
        registry.register("sales", "dataset_one", vec![]);
        registry.register("sales", "dataset_two", vec![]);

        assert_eq!(registry.lookup("sales").unwrap().table_name, "dataset_one");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_makes_slug_unresolvable() {
        let registry = ApiRegistry::new();
        registry.register("sales", "dataset_abc123", vec![]);
        registry.unregister("sales");

        assert!(registry.lookup("sales").is_none());
        assert!(!registry.is_registered("sales"));
        // Unregistering twice is harmless.
        registry.unregister("sales");
    }

    #[test]
    fn test_concurrent_readers() {
        let registry = Arc::new(ApiRegistry::new());
        registry.register("sales", "dataset_abc123", vec![]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.lookup("sales").is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
