//! Registry construction and repository access

use std::sync::Arc;

use cadence_core::config::ConfigBuilder;
use cadence_core::domain::{Collection, Note, RecordStatus};
use cadence_core::ports::ILocalStore;
use cadence_sync::{ExecutorState, StoreRegistry};

use crate::common::*;

#[tokio::test]
async fn test_from_config_builds_enabled_collections() {
    let config = ConfigBuilder::new()
        .enabled_collections(&[Collection::Notes, Collection::ContentLikes])
        .comparator(Collection::Notes, "updated_at")
        .purge_grace_secs(Collection::Notes, 60)
        .build();
    let local: Arc<dyn ILocalStore> = memory_store().await;

    let registry =
        StoreRegistry::from_config(&config, context(), ScriptedProtocol::new(), local);

    assert_eq!(
        registry.collections(),
        vec![Collection::ContentLikes, Collection::Notes]
    );
    let notes = registry.store(Collection::Notes).unwrap();
    assert_eq!(notes.collection(), Collection::Notes);
    assert_eq!(notes.executor_state(), ExecutorState::Idle);
    assert!(registry.store(Collection::Practices).is_none());
}

#[tokio::test]
async fn test_registry_stores_sync_through_protocol() {
    let config = ConfigBuilder::new()
        .enabled_collections(&[Collection::Notes, Collection::Practices])
        .build();
    let protocol = ScriptedProtocol::new();
    let local: Arc<dyn ILocalStore> = memory_store().await;
    let registry = StoreRegistry::from_config(&config, context(), protocol.clone(), local);

    for store in registry.stores() {
        let outcome = store
            .request_sync("manual", &tokio_util::sync::CancellationToken::new())
            .await;
        assert!(outcome.is_completed(), "{}", outcome.label());
    }

    let mut pulled = protocol.pulled_collections();
    pulled.sort();
    assert_eq!(pulled, vec![Collection::Practices, Collection::Notes]);
}

#[tokio::test]
async fn test_repository_save_and_read() {
    let local: Arc<dyn ILocalStore> = memory_store().await;
    let registry = StoreRegistry::new(local);
    let notes = registry.repository::<Note>();

    let saved = notes
        .save(&Note {
            content_id: 7,
            value: "first".into(),
        })
        .await
        .unwrap();
    assert_eq!(saved.status, RecordStatus::Created);

    notes
        .save(&Note {
            content_id: 8,
            value: "second".into(),
        })
        .await
        .unwrap();

    let one = notes.get_one_by(&id(7)).await.unwrap().unwrap();
    assert_eq!(one.record.value, "first");

    let many = notes.get_many_by(&[id(7), id(8), id(9)]).await.unwrap();
    assert_eq!(many.len(), 2);

    let filtered = notes.get_all(|n| n.value.starts_with('s')).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, id(8));
}

#[tokio::test]
async fn test_repository_edit_of_synced_record_is_update() {
    let local = memory_store().await;
    seed_synced(local.as_ref(), Collection::Notes, 3, "server").await;
    let registry = StoreRegistry::new(local.clone());
    let notes = registry.repository::<Note>();

    let saved = notes
        .save(&Note {
            content_id: 3,
            value: "edited".into(),
        })
        .await
        .unwrap();

    assert_eq!(saved.status, RecordStatus::Updated);
    assert_eq!(saved.revision, 2);
}

#[tokio::test]
async fn test_repository_hides_pending_delete_until_undone() {
    let local = memory_store().await;
    seed_synced(local.as_ref(), Collection::Notes, 4, "keep me").await;
    let registry = StoreRegistry::new(local.clone());
    let notes = registry.repository::<Note>();

    assert!(notes.delete(&id(4)).await.unwrap());
    assert!(notes.get_one_by(&id(4)).await.unwrap().is_none());
    assert!(notes.get_all(|_| true).await.unwrap().is_empty());
    assert_eq!(
        status_of(local.as_ref(), Collection::Notes, 4).await,
        Some(RecordStatus::Deleted)
    );

    // Already hidden: a second delete finds nothing.
    assert!(!notes.delete(&id(4)).await.unwrap());

    assert!(notes.undo_delete(&id(4)).await.unwrap());
    let revived = notes.get_one_by(&id(4)).await.unwrap().unwrap();
    assert_eq!(revived.status, RecordStatus::Updated);
    assert_eq!(revived.record.value, "keep me");
}

#[tokio::test]
async fn test_repository_delete_of_unsent_record_removes_it() {
    let local = memory_store().await;
    let registry = StoreRegistry::new(local.clone());
    let notes = registry.repository::<Note>();
    notes
        .save(&Note {
            content_id: 5,
            value: "draft".into(),
        })
        .await
        .unwrap();

    assert!(notes.delete(&id(5)).await.unwrap());

    assert!(row(local.as_ref(), Collection::Notes, 5).await.is_none());
    assert!(!notes.undo_delete(&id(5)).await.unwrap());
}
