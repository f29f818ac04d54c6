// Messaging Gateway Port
// Delivery transport is an external capability; the engine only calls it

use crate::domain::Destination;
use async_trait::async_trait;
use thiserror::Error;

/// Per-pair delivery failure (counted, never retried by the engine)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Destination rejected message: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Image could not be attached: {0}")]
    Image(String),
}

/// Messaging Gateway trait
///
/// Implementations:
/// - HttpMessagingGateway: posts to a webhook-style gateway service
/// - DryRunGateway: logs and succeeds
///
/// The engine enforces no timeout on `send`; a hung call stalls the run at that pair.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver one message (optionally with an image) to one destination
    async fn send(
        &self,
        destination: &Destination,
        message: &str,
        image_ref: Option<&str>,
    ) -> Result<(), DeliveryError>;

    /// Whether the gateway can accept sends right now
    async fn check_ready(&self) -> bool;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// One recorded gateway call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMessage {
        pub destination_id: String,
        pub message: String,
        pub image_ref: Option<String>,
    }

    /// Mock gateway recording every call
    pub struct MockGateway {
        ready: Mutex<bool>,
        failing_destinations: Mutex<HashSet<String>>,
        calls: Arc<Mutex<Vec<SentMessage>>>,
        sent_notify: Arc<Notify>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                ready: Mutex::new(true),
                failing_destinations: Mutex::new(HashSet::new()),
                calls: Arc::new(Mutex::new(Vec::new())),
                sent_notify: Arc::new(Notify::new()),
            }
        }

        pub fn new_unavailable() -> Self {
            let gateway = Self::new();
            gateway.set_ready(false);
            gateway
        }

        pub fn set_ready(&self, ready: bool) {
            *self.ready.lock().unwrap() = ready;
        }

        /// Every send to this destination fails from now on
        pub fn fail_destination(&self, destination_id: impl Into<String>) {
            self.failing_destinations
                .lock()
                .unwrap()
                .insert(destination_id.into());
        }

        pub fn calls(&self) -> Vec<SentMessage> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// (message, destination) pairs in call order
        pub fn sent_pairs(&self) -> Vec<(String, String)> {
            self.calls()
                .into_iter()
                .map(|c| (c.message, c.destination_id))
                .collect()
        }

        /// Resolves once at least `n` calls were made
        pub async fn wait_for_calls(&self, n: usize) {
            loop {
                let notified = self.sent_notify.notified();
                if self.call_count() >= n {
                    return;
                }
                notified.await;
            }
        }
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl MessagingGateway for MockGateway {
        async fn send(
            &self,
            destination: &Destination,
            message: &str,
            image_ref: Option<&str>,
        ) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(SentMessage {
                destination_id: destination.id.clone(),
                message: message.to_string(),
                image_ref: image_ref.map(str::to_string),
            });
            self.sent_notify.notify_waiters();

            if self
                .failing_destinations
                .lock()
                .unwrap()
                .contains(&destination.id)
            {
                return Err(DeliveryError::Rejected(format!(
                    "{} refused the message",
                    destination.name
                )));
            }
            Ok(())
        }

        async fn check_ready(&self) -> bool {
            *self.ready.lock().unwrap()
        }
    }
}
