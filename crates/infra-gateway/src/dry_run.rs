// Dry-run gateway: logs every send and reports success

use async_trait::async_trait;
use sendflow_core::domain::Destination;
use sendflow_core::port::{DeliveryError, MessagingGateway};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Used when no gateway URL is configured
#[derive(Default)]
pub struct DryRunGateway {
    sent: AtomicU64,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessagingGateway for DryRunGateway {
    async fn send(
        &self,
        destination: &Destination,
        message: &str,
        image_ref: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(
            destination_id = %destination.id,
            address = %destination.address,
            image = image_ref.unwrap_or("-"),
            chars = message.chars().count(),
            "[dry-run] message not delivered"
        );
        Ok(())
    }

    async fn check_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let gateway = DryRunGateway::new();
        let destination = Destination::new("g1", "Group 1", "chat:1");

        assert!(gateway.check_ready().await);
        assert_ok!(gateway.send(&destination, "hello", None).await);
        assert_ok!(gateway.send(&destination, "hello", Some("img/a.png")).await);
        assert_eq!(gateway.sent_count(), 2);
    }
}
