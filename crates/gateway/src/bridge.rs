//! Rendezvous between blocked checkout requests and finishing sagas.
//!
//! A checkout request installs a wait keyed by its order id, starts the
//! saga and blocks until the orchestrator releases that order id or the
//! timeout expires. Each wait is a capacity-1 channel with one sender in
//! the map and one receiver held by the request. The releaser only ever
//! sends; the request alone removes its entry, whether it was released,
//! timed out or was dropped mid-wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use saga::{CheckoutInitiator, CompletionNotifier, SagaOutcome};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::BridgeError;

struct Wait {
    ticket: u64,
    sender: mpsc::Sender<u16>,
}

#[derive(Default)]
struct Waits {
    entries: HashMap<String, Wait>,
    closed: bool,
}

/// Blocks checkout requests until their saga reports an outcome.
pub struct GatewayBridge {
    waits: Mutex<Waits>,
    next_ticket: AtomicU64,
    timeout: Duration,
}

impl GatewayBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            waits: Mutex::new(Waits::default()),
            next_ticket: AtomicU64::new(0),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, Waits> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the wait for `order_id`. At most one wait per order id
    /// exists at any time.
    pub fn create_wait(&self, order_id: &str) -> Result<PendingCheckout<'_>, BridgeError> {
        let (sender, receiver) = mpsc::channel(1);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let mut waits = self.lock();
        if waits.closed {
            return Err(BridgeError::Closed);
        }
        if waits.entries.contains_key(order_id) {
            return Err(BridgeError::AlreadyInProgress(order_id.to_string()));
        }
        waits
            .entries
            .insert(order_id.to_string(), Wait { ticket, sender });
        metrics::gauge!("checkout_pending").increment(1.0);

        Ok(PendingCheckout {
            bridge: self,
            order_id: order_id.to_string(),
            ticket,
            receiver,
        })
    }

    /// Starts the checkout of `order_id` and waits for its outcome.
    ///
    /// Returns the released HTTP status; a failed trigger or a timeout
    /// yields the failure status.
    #[tracing::instrument(skip(self, initiator))]
    pub async fn await_completion<I>(&self, order_id: &str, initiator: &I) -> Result<u16, BridgeError>
    where
        I: CheckoutInitiator + ?Sized,
    {
        let pending = self.create_wait(order_id)?;

        if let Err(e) = initiator.start_checkout(order_id).await {
            tracing::warn!(error = %e, "checkout could not be started");
            metrics::counter!("checkout_requests_total", "result" => "rejected").increment(1);
            return Ok(SagaOutcome::Failure.status_code());
        }

        let status = pending.wait(self.timeout).await;
        Ok(status)
    }

    /// Delivers `status` to the request waiting on `order_id`.
    ///
    /// Returns whether a waiting request was found. Late and duplicate
    /// releases are logged and otherwise ignored.
    pub fn release_status(&self, order_id: &str, status: u16) -> bool {
        let sender = match self.lock().entries.get(order_id) {
            Some(wait) => wait.sender.clone(),
            None => {
                tracing::warn!(%order_id, status, "release for an order nobody is waiting on");
                return false;
            }
        };

        match sender.try_send(status) {
            Ok(()) => {
                tracing::debug!(%order_id, status, "checkout released");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%order_id, status, "checkout already released");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(%order_id, status, "checkout stopped waiting");
                false
            }
        }
    }

    /// Rejects new waits and releases every outstanding one with failure.
    pub fn close(&self) {
        let mut waits = self.lock();
        waits.closed = true;
        let failure = SagaOutcome::Failure.status_code();
        for wait in waits.entries.values() {
            let _ = wait.sender.try_send(failure);
        }
        tracing::info!(released = waits.entries.len(), "checkout gateway closed");
    }

    /// Number of checkouts currently waiting.
    pub fn pending(&self) -> usize {
        self.lock().entries.len()
    }

    fn remove(&self, order_id: &str, ticket: u64) {
        let mut waits = self.lock();
        if waits
            .entries
            .get(order_id)
            .is_some_and(|wait| wait.ticket == ticket)
        {
            waits.entries.remove(order_id);
            metrics::gauge!("checkout_pending").decrement(1.0);
        }
    }
}

#[async_trait]
impl CompletionNotifier for GatewayBridge {
    async fn release(&self, order_id: &str, outcome: SagaOutcome) -> saga::Result<()> {
        self.release_status(order_id, outcome.status_code());
        Ok(())
    }
}

/// A checkout request's wait. Dropping it removes the wait.
pub struct PendingCheckout<'a> {
    bridge: &'a GatewayBridge,
    order_id: String,
    ticket: u64,
    receiver: mpsc::Receiver<u16>,
}

impl PendingCheckout<'_> {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Waits up to `timeout` for the release. A timeout counts as failure.
    pub async fn wait(mut self, timeout: Duration) -> u16 {
        let failure = SagaOutcome::Failure.status_code();
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(status)) => {
                let result = SagaOutcome::from_status(status).as_str();
                metrics::counter!("checkout_requests_total", "result" => result).increment(1);
                status
            }
            Ok(None) => failure,
            Err(_) => {
                tracing::warn!(order_id = %self.order_id, ?timeout, "checkout timed out");
                metrics::counter!("checkout_requests_total", "result" => "timeout").increment(1);
                failure
            }
        }
    }
}

impl Drop for PendingCheckout<'_> {
    fn drop(&mut self) {
        self.bridge.remove(&self.order_id, self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    struct Accepting;

    #[async_trait]
    impl CheckoutInitiator for Accepting {
        async fn start_checkout(&self, _order_id: &str) -> saga::Result<()> {
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl CheckoutInitiator for Rejecting {
        async fn start_checkout(&self, order_id: &str) -> saga::Result<()> {
            Err(saga::ParticipantError::MalformedId(order_id.to_string()).into())
        }
    }

    /// Releases the order as soon as its checkout starts.
    struct Immediate {
        bridge: Arc<GatewayBridge>,
        status: u16,
    }

    #[async_trait]
    impl CheckoutInitiator for Immediate {
        async fn start_checkout(&self, order_id: &str) -> saga::Result<()> {
            assert!(self.bridge.release_status(order_id, self.status));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_wait_for_same_order_is_rejected() {
        let bridge = GatewayBridge::new(Duration::from_secs(1));
        let first = bridge.create_wait("o1").unwrap();

        assert_eq!(
            bridge.create_wait("o1").err(),
            Some(BridgeError::AlreadyInProgress("o1".into()))
        );
        assert!(bridge.create_wait("o2").is_ok());

        drop(first);
        assert!(bridge.create_wait("o1").is_ok());
    }

    #[tokio::test]
    async fn test_release_delivers_status_and_waiter_cleans_up() {
        let bridge = Arc::new(GatewayBridge::new(Duration::from_secs(5)));
        let initiator = Immediate {
            bridge: bridge.clone(),
            status: 200,
        };

        let status = bridge.await_completion("o1", &initiator).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(bridge.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_and_removes_wait() {
        let bridge = GatewayBridge::new(Duration::from_secs(30));

        let status = bridge.await_completion("o1", &Accepting).await.unwrap();
        assert_eq!(status, 400);
        assert_eq!(bridge.pending(), 0);
        assert!(!bridge.release_status("o1", 200));
    }

    #[tokio::test]
    async fn test_failed_trigger_fails_without_waiting() {
        let bridge = GatewayBridge::new(Duration::from_secs(3600));

        let status = bridge.await_completion("o1", &Rejecting).await.unwrap();
        assert_eq!(status, 400);
        assert_eq!(bridge.pending(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_release_is_ignored() {
        let bridge = GatewayBridge::new(Duration::from_secs(1));
        let pending = bridge.create_wait("o1").unwrap();

        assert!(bridge.release_status("o1", 200));
        assert!(!bridge.release_status("o1", 400));
        assert_eq!(pending.wait(Duration::from_secs(1)).await, 200);
        assert!(!bridge.release_status("o1", 200));
    }

    #[tokio::test]
    async fn test_stale_waiter_does_not_remove_newer_wait() {
        let bridge = GatewayBridge::new(Duration::from_secs(1));
        let first = bridge.create_wait("o1").unwrap();
        let ticket = first.ticket;
        drop(first);

        let _second = bridge.create_wait("o1").unwrap();
        bridge.remove("o1", ticket);
        assert_eq!(bridge.pending(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_waiters_and_rejects_new_ones() {
        let bridge = Arc::new(GatewayBridge::new(Duration::from_secs(3600)));
        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.await_completion("o1", &Accepting).await })
        };
        while bridge.pending() == 0 {
            tokio::task::yield_now().await;
        }

        bridge.close();
        assert_eq!(waiter.await.unwrap(), Ok(400));
        assert_eq!(bridge.create_wait("o2").err(), Some(BridgeError::Closed));
    }

    #[tokio::test]
    async fn test_notifier_maps_outcome_to_status() {
        let bridge = GatewayBridge::new(Duration::from_secs(1));
        let pending = bridge.create_wait("o1").unwrap();

        bridge.release("o1", SagaOutcome::Success).await.unwrap();
        assert_eq!(pending.wait(Duration::from_secs(1)).await, 200);
    }
}
