//! # Ledger Gateway
//!
//! Both directions of the ledger hand-off.
//!
//! Outbound: submit the transaction a phase produced.
//! Inbound: route each transaction by its `reference` tag to a worker task
//! owned by that reference. Workers run transitions one at a time, so one
//! order's phases never interleave while different orders proceed in
//! parallel. A worker retires once its order reaches `SecretReleased`, once
//! a transaction leaves the reference untracked on this node, or after its
//! queue has been idle for the configured timeout.
//!
//! Delivery is at-most-once: handler errors are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_bus::Subscription;
use shared_types::{LedgerTransaction, OrderReference};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::CustodyError;
use crate::machine::OrderStateMachine;
use crate::ports::Ledger;

type WorkerQueue = mpsc::Sender<LedgerTransaction>;

/// Dispatches outbound transactions and routes inbound ones.
pub struct LedgerGateway {
    ledger: Arc<dyn Ledger>,
    machine: Arc<OrderStateMachine>,
    workers: Mutex<HashMap<OrderReference, WorkerQueue>>,
    queue_depth: usize,
    idle_timeout: Duration,
}

impl LedgerGateway {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        machine: Arc<OrderStateMachine>,
        queue_depth: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            machine,
            workers: Mutex::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            idle_timeout,
        }
    }

    /// Submit an outbound transaction.
    pub async fn submit(&self, tx: LedgerTransaction) -> Result<String, CustodyError> {
        let processor = tx.processor;
        let recipients = tx.recipient_ids.len();
        let id = self.ledger.submit(tx).await?;
        debug!(
            tx_id = %id,
            processor = %processor,
            recipients,
            "[ledger] Submitted transaction"
        );
        Ok(id)
    }

    /// Apply one inbound transaction and submit whatever it produces.
    pub async fn process(&self, tx: &LedgerTransaction) -> Result<Option<String>, CustodyError> {
        match self.machine.handle(tx).await? {
            Some(outbound) => Ok(Some(self.submit(outbound).await?)),
            None => Ok(None),
        }
    }

    /// Consume `subscription` until it closes or `shutdown` flips.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(node = %self.machine.node_id(), "[ledger] Gateway listening");
        loop {
            tokio::select! {
                entry = subscription.recv() => match entry {
                    Some(entry) => self.dispatch(entry.transaction),
                    None => {
                        warn!("[ledger] Subscription closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("[ledger] Gateway shutting down");
                    break;
                }
            }
        }
    }

    /// Queue `tx` on its reference's worker, spawning one if needed.
    pub fn dispatch(self: &Arc<Self>, tx: LedgerTransaction) {
        let reference = match tx.reference() {
            Ok(reference) => reference,
            Err(e) => {
                warn!(processor = %tx.processor, sender = %tx.sender_id, error = %e, "[ledger] Dropping untagged transaction");
                return;
            }
        };

        // Sends happen under the map lock so a retiring worker sees every
        // message queued before it unregistered.
        let mut workers = self.workers.lock();
        let queue = workers
            .entry(reference)
            .or_insert_with(|| self.spawn_worker(reference));
        match queue.try_send(tx) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(tx)) => {
                warn!(reference = %reference, processor = %tx.processor, "[ledger] Worker queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(tx)) => {
                let queue = self.spawn_worker(reference);
                if queue.try_send(tx).is_err() {
                    warn!(reference = %reference, "[ledger] Fresh worker rejected transaction");
                }
                workers.insert(reference, queue);
            }
        }
    }

    /// Number of live per-reference workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    fn spawn_worker(self: &Arc<Self>, reference: OrderReference) -> WorkerQueue {
        let (queue, mut inbox) = mpsc::channel(self.queue_depth);
        let gateway = Arc::clone(self);
        let registered = queue.clone();

        tokio::spawn(async move {
            debug!(reference = %reference, "[ledger] Worker started");
            loop {
                let tx = match tokio::time::timeout(gateway.idle_timeout, inbox.recv()).await {
                    Ok(Some(tx)) => tx,
                    Ok(None) => break,
                    Err(_) => {
                        debug!(reference = %reference, "[ledger] Worker idle");
                        gateway.retire(reference, &registered, &mut inbox).await;
                        break;
                    }
                };
                gateway.apply(&tx).await;

                if gateway.should_retire(&reference) {
                    gateway.retire(reference, &registered, &mut inbox).await;
                    break;
                }
            }
            debug!(reference = %reference, "[ledger] Worker retired");
        });
        queue
    }

    /// Unregister the worker owning `registered`, then apply anything
    /// queued before it left the map.
    async fn retire(
        &self,
        reference: OrderReference,
        registered: &WorkerQueue,
        inbox: &mut mpsc::Receiver<LedgerTransaction>,
    ) {
        {
            let mut workers = self.workers.lock();
            if workers
                .get(&reference)
                .is_some_and(|q| q.same_channel(registered))
            {
                workers.remove(&reference);
            }
        }
        inbox.close();
        while let Ok(tx) = inbox.try_recv() {
            self.apply(&tx).await;
        }
    }

    async fn apply(&self, tx: &LedgerTransaction) {
        if let Err(e) = self.process(tx).await {
            warn!(
                processor = %tx.processor,
                sender = %tx.sender_id,
                reference = ?tx.reference_tag(),
                error = %e,
                "[ledger] Transition failed"
            );
        }
    }

    /// Settled, untracked, or unreadable references need no worker.
    fn should_retire(&self, reference: &OrderReference) -> bool {
        match self.machine.state_of(reference) {
            Ok(Some(state)) => state.is_terminal(),
            Ok(None) | Err(_) => true,
        }
    }
}
