//! Store registry
//!
//! Builds one [`SyncStore`] per enabled collection from configuration and
//! hands out typed [`Repository`] views over the local snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use cadence_conflict::ComparatorPolicy;
use cadence_core::config::Config;
use cadence_core::domain::{
    Collection, ContentLike, ContentProgress, Note, Practice, Syncable, UserAwardProgress,
};
use cadence_core::ports::{ILocalStore, ISyncProtocol};

use crate::backoff::BackoffPolicy;
use crate::context::SyncContext;
use crate::repository::Repository;
use crate::store::{ManagedStore, SyncStore, SyncStoreConfig};

/// All stores of one session, keyed by collection
pub struct StoreRegistry {
    local: Arc<dyn ILocalStore>,
    stores: BTreeMap<Collection, Arc<dyn ManagedStore>>,
}

impl StoreRegistry {
    /// Registry with no stores; add them with [`StoreRegistry::register`]
    pub fn new(local: Arc<dyn ILocalStore>) -> Self {
        Self {
            local,
            stores: BTreeMap::new(),
        }
    }

    /// One store per enabled collection, configured from `config`
    pub fn from_config(
        config: &Config,
        context: Arc<SyncContext>,
        protocol: Arc<dyn ISyncProtocol>,
        local: Arc<dyn ILocalStore>,
    ) -> Self {
        let policy = ComparatorPolicy::from_config(config);
        let backoff = BackoffPolicy::from(&config.backoff);
        let mut registry = Self::new(Arc::clone(&local));

        for collection in config.enabled_collections() {
            let builder = StoreBuilder {
                config,
                policy: &policy,
                backoff,
                context: &context,
                protocol: &protocol,
                local: &local,
            };
            let store = match collection {
                Collection::ContentLikes => builder.build::<ContentLike>(),
                Collection::ContentProgress => builder.build::<ContentProgress>(),
                Collection::Practices => builder.build::<Practice>(),
                Collection::Notes => builder.build::<Note>(),
                Collection::AwardProgress => builder.build::<UserAwardProgress>(),
            };
            registry.register(store);
        }
        registry
    }

    /// Add or replace the store of its collection
    pub fn register(&mut self, store: Arc<dyn ManagedStore>) {
        self.stores.insert(store.collection(), store);
    }

    pub fn store(&self, collection: Collection) -> Option<Arc<dyn ManagedStore>> {
        self.stores.get(&collection).cloned()
    }

    /// Stores in collection order
    pub fn stores(&self) -> Vec<Arc<dyn ManagedStore>> {
        self.stores.values().cloned().collect()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.stores.keys().copied().collect()
    }

    pub fn local(&self) -> &Arc<dyn ILocalStore> {
        &self.local
    }

    /// Typed read and mutation facade for the collection of `T`
    pub fn repository<T: Syncable>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.local))
    }
}

struct StoreBuilder<'a> {
    config: &'a Config,
    policy: &'a ComparatorPolicy,
    backoff: BackoffPolicy,
    context: &'a Arc<SyncContext>,
    protocol: &'a Arc<dyn ISyncProtocol>,
    local: &'a Arc<dyn ILocalStore>,
}

impl StoreBuilder<'_> {
    fn build<T: Syncable>(&self) -> Arc<dyn ManagedStore> {
        let overrides = self.config.collection(T::COLLECTION);
        let comparator = self.policy.comparator_for::<T>();
        debug!(
            collection = %T::COLLECTION,
            comparator = comparator.name(),
            purge_grace_secs = ?overrides.purge_grace_secs,
            "Registering sync store"
        );

        let config = SyncStoreConfig::new(Arc::clone(self.protocol), Arc::clone(self.local))
            .with_comparator(comparator)
            .with_purge_grace_period(overrides.purge_grace_period())
            .with_backoff(self.backoff);
        Arc::new(SyncStore::<T>::new(config, Arc::clone(self.context)))
    }
}
