//! Sync orchestrator
//!
//! Groups stores with the strategies that trigger them. Each group gets one
//! dispatcher task that receives triggers and starts a request on every
//! matching store without waiting for the previous ones. Explicit requests
//! bypass the strategies and go straight to the stores' executors.
//!
//! ```text
//! strategies ──→ mpsc::UnboundedReceiver<Trigger> ──→ dispatcher ──→ stores
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::domain::Collection;
use cadence_core::ports::Subscription;

use crate::context::SyncContext;
use crate::executor::ExecutionOutcome;
use crate::store::{ManagedStore, SyncReport};
use crate::strategy::{StrategyHandle, SyncStrategy, Trigger};

/// Stores that share one set of triggers
pub struct SyncGroup {
    pub stores: Vec<Arc<dyn ManagedStore>>,
    pub strategies: Vec<Box<dyn SyncStrategy>>,
}

impl SyncGroup {
    pub fn new(stores: Vec<Arc<dyn ManagedStore>>) -> Self {
        Self {
            stores,
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl SyncStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }
}

enum RunState {
    Idle,
    Running {
        tasks: Vec<JoinHandle<()>>,
        subscriptions: Vec<Subscription>,
    },
    Stopped,
}

/// Lifecycle owner of every store and strategy in a session
pub struct SyncOrchestrator {
    context: Arc<SyncContext>,
    groups: Vec<SyncGroup>,
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

pub type CollectionOutcome = (Collection, ExecutionOutcome<SyncReport>);

impl SyncOrchestrator {
    pub fn new(context: Arc<SyncContext>, groups: Vec<SyncGroup>) -> Self {
        Self {
            context,
            groups,
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// Every store of every group
    pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn ManagedStore>> {
        self.groups.iter().flat_map(|group| group.stores.iter())
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), RunState::Running { .. })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start every strategy and dispatcher
    ///
    /// Calling it again while running does nothing. A stopped orchestrator
    /// cannot be restarted.
    pub fn start(&self) {
        let mut state = self.lock_state();
        match *state {
            RunState::Running { .. } => {
                debug!("Orchestrator already running");
                return;
            }
            RunState::Stopped => {
                warn!("Orchestrator was stopped and cannot be restarted");
                return;
            }
            RunState::Idle => {}
        }

        let mut tasks = Vec::new();
        let mut subscriptions = Vec::new();

        for (index, group) in self.groups.iter().enumerate() {
            let (tx, rx) = mpsc::unbounded_channel();
            for strategy in &group.strategies {
                debug!(group = index, strategy = strategy.name(), "Starting strategy");
                match strategy.start(&self.context, tx.clone(), self.cancel.child_token()) {
                    StrategyHandle::Done => {}
                    StrategyHandle::Task(task) => tasks.push(task),
                    StrategyHandle::Subscription(sub) => subscriptions.push(sub),
                }
            }
            drop(tx);

            let stores = group.stores.clone();
            let cancel = self.cancel.clone();
            tasks.push(tokio::spawn(dispatch(index, stores, rx, cancel)));
        }

        info!(groups = self.groups.len(), "Sync orchestrator started");
        *state = RunState::Running {
            tasks,
            subscriptions,
        };
    }

    /// Sync every store now
    pub async fn request_sync(&self, reason: &str) -> Vec<CollectionOutcome> {
        let stores: Vec<_> = self.stores().cloned().collect();
        fan_out(&stores, reason, &self.cancel).await
    }

    /// Sync one collection now; `None` when no store handles it
    pub async fn request_collection_sync(
        &self,
        collection: Collection,
        reason: &str,
    ) -> Option<ExecutionOutcome<SyncReport>> {
        let store = self.stores().find(|s| s.collection() == collection)?;
        Some(store.request_sync(reason, &self.cancel).await)
    }

    /// Cancel in-flight work and wait for every task to end
    pub async fn stop(&self) {
        self.cancel.cancel();
        let previous = std::mem::replace(&mut *self.lock_state(), RunState::Stopped);

        if let RunState::Running {
            tasks,
            subscriptions,
        } = previous
        {
            drop(subscriptions);
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Sync task ended abnormally");
                }
            }
            info!("Sync orchestrator stopped");
        }
    }
}

async fn fan_out(
    stores: &[Arc<dyn ManagedStore>],
    reason: &str,
    cancel: &CancellationToken,
) -> Vec<CollectionOutcome> {
    join_all(stores.iter().map(|store| async move {
        let outcome = store.request_sync(reason, cancel).await;
        (store.collection(), outcome)
    }))
    .await
}

/// Receives triggers for one group until cancelled or every sender is gone
///
/// Each trigger starts one request per matching store and never waits for
/// it, so a slow store does not hold back the others. A store that is
/// still busy drops the request at its executor instead of queueing it.
async fn dispatch(
    group: usize,
    stores: Vec<Arc<dyn ManagedStore>>,
    mut rx: mpsc::UnboundedReceiver<Trigger>,
    cancel: CancellationToken,
) {
    let mut running: JoinSet<CollectionOutcome> = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(finished) = running.join_next(), if !running.is_empty() => {
                log_finished(group, finished);
            }
            trigger = rx.recv() => {
                let Some(trigger) = trigger else {
                    debug!(group, "All strategies finished, dispatcher exiting");
                    break;
                };
                let targets = stores
                    .iter()
                    .filter(|s| trigger.collection.map_or(true, |c| s.collection() == c));

                let mut started = 0;
                for store in targets {
                    let store = Arc::clone(store);
                    let cancel = cancel.clone();
                    let reason = trigger.reason;
                    running.spawn(async move {
                        let outcome = store.request_sync(reason, &cancel).await;
                        (store.collection(), outcome)
                    });
                    started += 1;
                }
                if started > 0 {
                    debug!(group, reason = trigger.reason, stores = started, "Dispatched trigger");
                }
            }
        }
    }

    while let Some(finished) = running.join_next().await {
        log_finished(group, finished);
    }
}

fn log_finished(group: usize, finished: Result<CollectionOutcome, JoinError>) {
    match finished {
        Ok((collection, outcome)) => {
            debug!(group, %collection, outcome = outcome.label(), "Triggered sync finished");
        }
        Err(e) => warn!(group, error = %e, "Triggered sync ended abnormally"),
    }
}
