//! Simulated terminal confirmations.
//!
//! When a rider collects a card payment on a POS terminal, the terminal provider eventually confirms the payment. Until
//! that integration is live, collection schedules a delayed `paid` notification for the order, which goes through the
//! reconciler like any other notification. A rider can cancel a collection that has not been confirmed yet.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::*;
use market_payment_engine::{
    db_types::{OrderReference, PaymentStatus},
    mpe_api::payment_objects::{NotificationSource, PaymentChannel, PaymentEvent},
    OrderReconciler,
    OrderStore,
};
use serde_json::json;
use tokio::task::JoinHandle;

type PendingConfirmations = HashMap<OrderReference, JoinHandle<()>>;

#[derive(Clone, Default)]
pub struct ConfirmationScheduler {
    delay: Duration,
    pending: Arc<Mutex<PendingConfirmations>>,
}

impl ConfirmationScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules a terminal confirmation for `reference`. Returns false if one is already pending for the order.
    ///
    /// The confirmation runs on the current actix worker, so this must be called from within an actix runtime.
    pub fn schedule<B>(
        &self,
        reconciler: OrderReconciler<B>,
        reference: OrderReference,
        terminal_id: Option<String>,
    ) -> bool
    where
        B: OrderStore + 'static,
    {
        let mut pending = lock(&self.pending);
        if pending.get(&reference).is_some_and(|h| !h.is_finished()) {
            debug!("🕰️ A terminal confirmation for {reference} is already pending");
            return false;
        }
        let delay = self.delay;
        let registry = Arc::clone(&self.pending);
        let key = reference.clone();
        let handle = actix_web::rt::spawn(async move {
            actix_web::rt::time::sleep(delay).await;
            let event = PaymentEvent::new(NotificationSource::Rider, PaymentChannel::Terminal, PaymentStatus::Paid)
                .with_order_reference(key.clone())
                .with_raw(json!({ "terminal_id": terminal_id }));
            let outcome = reconciler.reconcile(event).await;
            if outcome.is_resolved() {
                info!("🕰️ Terminal confirmation for {key}: {outcome}");
            } else {
                warn!("🕰️ Terminal confirmation for {key} was not applied. {outcome}");
            }
            lock(&registry).remove(&key);
        });
        info!("🕰️ Terminal confirmation for {reference} scheduled in {}ms", delay.as_millis());
        pending.insert(reference, handle);
        true
    }

    /// Cancels the pending confirmation for `reference`. Returns false if there was nothing to cancel.
    pub fn cancel(&self, reference: &OrderReference) -> bool {
        match lock(&self.pending).remove(reference) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("🕰️ Terminal confirmation for {reference} cancelled");
                true
            },
            _ => false,
        }
    }

    pub fn is_pending(&self, reference: &OrderReference) -> bool {
        lock(&self.pending).get(reference).is_some_and(|h| !h.is_finished())
    }
}

fn lock(pending: &Mutex<PendingConfirmations>) -> MutexGuard<'_, PendingConfirmations> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
