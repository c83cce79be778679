//! Orchestrator and strategy wiring tests

use std::sync::Arc;
use std::time::Duration;

use cadence_core::domain::{Collection, Note, Practice};
use cadence_core::ports::{ILocalStore, MessageBus, SyncSignal};
use cadence_sync::environment::{ConnectivitySource, LocalMessageBus};
use cadence_sync::{
    BroadcastStrategy, ConnectivityStrategy, DropReason, ExecutionOutcome, ExecutorState,
    InitialStrategy, ManagedStore, SyncContext, SyncGroup, SyncOrchestrator, SyncStore,
    SyncStoreConfig,
};

use crate::common::*;

fn stores(
    protocol: &Arc<ScriptedProtocol>,
    local: &Arc<dyn ILocalStore>,
    context: &Arc<SyncContext>,
) -> Vec<Arc<dyn ManagedStore>> {
    vec![
        Arc::new(SyncStore::<Note>::new(
            SyncStoreConfig::new(protocol.clone(), local.clone()).with_backoff(fast_backoff(2)),
            context.clone(),
        )),
        Arc::new(SyncStore::<Practice>::new(
            SyncStoreConfig::new(protocol.clone(), local.clone()).with_backoff(fast_backoff(2)),
            context.clone(),
        )),
    ]
}

async fn fixture(context: Arc<SyncContext>) -> (Arc<ScriptedProtocol>, Vec<Arc<dyn ManagedStore>>) {
    let protocol = ScriptedProtocol::new();
    let local: Arc<dyn ILocalStore> = memory_store().await;
    let stores = stores(&protocol, &local, &context);
    (protocol, stores)
}

#[tokio::test]
async fn test_initial_strategy_syncs_every_store() {
    let context = context();
    let (protocol, stores) = fixture(context.clone()).await;
    let orchestrator =
        SyncOrchestrator::new(context, vec![SyncGroup::new(stores).with_strategy(InitialStrategy)]);

    orchestrator.start();
    assert!(orchestrator.is_running());

    assert!(eventually(|| protocol.pull_calls().len() == 2).await);
    let mut pulled = protocol.pulled_collections();
    pulled.sort();
    assert_eq!(pulled, vec![Collection::Practices, Collection::Notes]);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let context = context();
    let (protocol, stores) = fixture(context.clone()).await;
    let orchestrator =
        SyncOrchestrator::new(context, vec![SyncGroup::new(stores).with_strategy(InitialStrategy)]);

    orchestrator.start();
    orchestrator.start();

    assert!(eventually(|| protocol.pull_calls().len() >= 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(protocol.pull_calls().len(), 2);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_request_sync_reports_per_collection() {
    let context = context();
    let (_protocol, stores) = fixture(context.clone()).await;
    let orchestrator = SyncOrchestrator::new(context, vec![SyncGroup::new(stores)]);

    let outcomes = orchestrator.request_sync("manual").await;

    assert_eq!(outcomes.len(), 2);
    for (_, outcome) in &outcomes {
        assert!(outcome.is_completed(), "outcome {}", outcome.label());
    }

    let single = orchestrator
        .request_collection_sync(Collection::Notes, "manual")
        .await
        .unwrap();
    assert!(single.is_completed());
    assert!(orchestrator
        .request_collection_sync(Collection::AwardProgress, "manual")
        .await
        .is_none());
}

#[tokio::test]
async fn test_concurrent_request_is_dropped_while_in_flight() {
    let context = context();
    let protocol = ScriptedProtocol::new();
    let local: Arc<dyn ILocalStore> = memory_store().await;
    local
        .save_local(Collection::Notes, &id(1), note(1, "draft"), at(50))
        .await
        .unwrap();
    let orchestrator = Arc::new(SyncOrchestrator::new(
        context.clone(),
        vec![SyncGroup::new(stores(&protocol, &local, &context))],
    ));
    let (entered, release) = protocol.hold_pulls();

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .request_collection_sync(Collection::Notes, "first")
                .await
        })
    };
    entered.notified().await;

    let second = orchestrator
        .request_collection_sync(Collection::Notes, "second")
        .await
        .unwrap();
    assert!(matches!(second, ExecutionOutcome::Dropped(DropReason::InFlight)));

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(first.is_completed());
    assert_eq!(protocol.pull_calls().len(), 1);
    assert_eq!(protocol.push_calls().len(), 1);
}

#[tokio::test]
async fn test_stalled_store_does_not_hold_back_its_group() {
    let bus = Arc::new(LocalMessageBus::new());
    let context = Arc::new(SyncContext::builder().bus(bus.clone()).build());
    let (protocol, stores) = fixture(context.clone()).await;
    let practices = Arc::clone(&stores[1]);
    let (entered, release) = protocol.hold_pulls_of(Collection::Notes);
    let orchestrator = SyncOrchestrator::new(
        context,
        vec![SyncGroup::new(stores).with_strategy(BroadcastStrategy)],
    );
    orchestrator.start();

    for round in 1..=4 {
        bus.publish(SyncSignal::SyncRequested { collection: None });
        assert!(
            eventually(|| {
                protocol.pulls_of(Collection::Practices) == round
                    && practices.executor_state() == ExecutorState::Idle
            })
            .await,
            "practices sync {round} did not run"
        );
        if round == 1 {
            entered.notified().await;
        }
    }
    assert_eq!(protocol.pulls_of(Collection::Notes), 1);

    // Requests made while notes was busy were dropped, not replayed.
    release.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(protocol.pulls_of(Collection::Notes), 1);
    assert_eq!(protocol.pulls_of(Collection::Practices), 4);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_stop_interrupts_stalled_pull() {
    let context = context();
    let (protocol, stores) = fixture(context.clone()).await;
    let (entered, _release) = protocol.hold_pulls();
    let orchestrator =
        SyncOrchestrator::new(context, vec![SyncGroup::new(stores).with_strategy(InitialStrategy)]);
    orchestrator.start();
    entered.notified().await;

    let stopped = tokio::time::timeout(Duration::from_secs(2), orchestrator.stop()).await;

    assert!(stopped.is_ok(), "stop() waited on the stalled pull");
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_stop_cancels_and_prevents_restart() {
    let context = context();
    let (protocol, stores) = fixture(context.clone()).await;
    let orchestrator = SyncOrchestrator::new(context, vec![SyncGroup::new(stores)]);

    orchestrator.start();
    orchestrator.stop().await;
    assert!(!orchestrator.is_running());

    let outcomes = orchestrator.request_sync("manual").await;
    assert!(outcomes
        .iter()
        .all(|(_, o)| matches!(o, ExecutionOutcome::Cancelled)));

    orchestrator.start();
    assert!(!orchestrator.is_running());
    assert!(protocol.pull_calls().is_empty());
}

#[tokio::test]
async fn test_broadcast_syncs_requested_collection_only() {
    let bus = Arc::new(LocalMessageBus::new());
    let context = Arc::new(SyncContext::builder().bus(bus.clone()).build());
    let (protocol, stores) = fixture(context.clone()).await;
    let orchestrator = SyncOrchestrator::new(
        context,
        vec![SyncGroup::new(stores).with_strategy(BroadcastStrategy)],
    );
    orchestrator.start();

    bus.publish(SyncSignal::SyncRequested {
        collection: Some(Collection::Practices),
    });

    assert!(eventually(|| !protocol.pull_calls().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(protocol.pulled_collections(), vec![Collection::Practices]);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_reconnect_triggers_sync() {
    let connectivity = Arc::new(ConnectivitySource::new(true));
    let context = Arc::new(
        SyncContext::builder()
            .connectivity(connectivity.clone())
            .build(),
    );
    let (protocol, stores) = fixture(context.clone()).await;
    let orchestrator = SyncOrchestrator::new(
        context,
        vec![SyncGroup::new(stores)
            .with_strategy(InitialStrategy)
            .with_strategy(ConnectivityStrategy)],
    );
    orchestrator.start();

    // Offline: the initial trigger reaches the executors but nothing is sent.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(protocol.pull_calls().is_empty());

    connectivity.set_offline(false);
    assert!(eventually(|| protocol.pull_calls().len() == 2).await);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_groups_dispatch_independently() {
    let context = context();
    let protocol = ScriptedProtocol::new();
    let local: Arc<dyn ILocalStore> = memory_store().await;
    let mut all = stores(&protocol, &local, &context);
    let practices = all.pop().unwrap();
    let notes = all.pop().unwrap();

    let orchestrator = SyncOrchestrator::new(
        context,
        vec![
            SyncGroup::new(vec![notes]).with_strategy(InitialStrategy),
            SyncGroup::new(vec![practices]),
        ],
    );
    orchestrator.start();

    assert!(eventually(|| !protocol.pull_calls().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(protocol.pulled_collections(), vec![Collection::Notes]);

    orchestrator.stop().await;
}
