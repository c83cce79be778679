//! Comparator selection per collection
//!
//! Reads the `collections.<name>.comparator` setting and hands out the
//! matching [`Comparator`] for each collection. Unknown names are logged
//! and replaced with `updated_at`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cadence_core::config::Config;
use cadence_core::domain::{Collection, Syncable};

use crate::comparator::{Comparator, MaxProgressComparator, UpdatedAtComparator};
use crate::error::ConflictError;

/// Built-in comparators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorKind {
    #[default]
    UpdatedAt,
    MaxProgress,
}

impl ComparatorKind {
    /// Parse a configured comparator name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "updated_at" => Some(ComparatorKind::UpdatedAt),
            "max_progress" => Some(ComparatorKind::MaxProgress),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorKind::UpdatedAt => "updated_at",
            ComparatorKind::MaxProgress => "max_progress",
        }
    }
}

impl fmt::Display for ComparatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparator choice for every collection
#[derive(Debug, Clone, Default)]
pub struct ComparatorPolicy {
    kinds: HashMap<Collection, ComparatorKind>,
}

impl ComparatorPolicy {
    /// Build the policy from configuration
    ///
    /// Invalid comparator names are logged and fall back to `updated_at`.
    pub fn from_config(config: &Config) -> Self {
        let mut kinds = HashMap::new();
        for collection in Collection::ALL {
            let name = config.collection(collection).comparator;
            let kind = match ComparatorKind::parse(&name) {
                Some(kind) => kind,
                None => {
                    warn!(
                        collection = %collection,
                        comparator = %name,
                        "Unknown comparator, using updated_at"
                    );
                    ComparatorKind::UpdatedAt
                }
            };
            kinds.insert(collection, kind);
        }

        debug!(
            overrides = kinds.values().filter(|k| **k != ComparatorKind::UpdatedAt).count(),
            "ComparatorPolicy initialized"
        );

        Self { kinds }
    }

    /// Check every configured comparator name
    pub fn validate(config: &Config) -> Result<(), ConflictError> {
        for (collection, overrides) in &config.collections {
            if ComparatorKind::parse(&overrides.comparator).is_none() {
                return Err(ConflictError::InvalidComparator {
                    collection: collection.clone(),
                    name: overrides.comparator.clone(),
                });
            }
        }
        Ok(())
    }

    /// Override the comparator for one collection
    pub fn with_kind(mut self, collection: Collection, kind: ComparatorKind) -> Self {
        self.kinds.insert(collection, kind);
        self
    }

    pub fn kind(&self, collection: Collection) -> ComparatorKind {
        self.kinds.get(&collection).copied().unwrap_or_default()
    }

    /// Comparator for the record type `T`
    pub fn comparator_for<T: Syncable>(&self) -> Arc<dyn Comparator<T>> {
        match self.kind(T::COLLECTION) {
            ComparatorKind::UpdatedAt => Arc::new(UpdatedAtComparator),
            ComparatorKind::MaxProgress => Arc::new(MaxProgressComparator),
        }
    }
}
