//! Fire and forget delivery of user facing events.
//!
//! State transitions queue events on an unbounded channel and a background
//! worker hands them to the configured [`NotificationSink`]. Delivery
//! failures are logged and never propagate back into the operation that
//! produced the event.

use {
    anyhow::Result,
    bigdecimal::BigDecimal,
    model::{AuctionId, UserId, auction::AuctionStatus},
    serde::Serialize,
    std::sync::Arc,
    tokio::sync::mpsc,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    NewBid {
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: BigDecimal,
    },
    #[serde(rename_all = "camelCase")]
    Outbid {
        auction_id: AuctionId,
        amount: BigDecimal,
    },
    #[serde(rename_all = "camelCase")]
    AuctionWon {
        auction_id: AuctionId,
        amount: BigDecimal,
    },
    #[serde(rename_all = "camelCase")]
    AuctionLost { auction_id: AuctionId },
    #[serde(rename_all = "camelCase")]
    AuctionEnded {
        auction_id: AuctionId,
        status: AuctionStatus,
    },
    #[serde(rename_all = "camelCase")]
    AuctionCancelled {
        auction_id: AuctionId,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DepositPaid {
        auction_id: AuctionId,
        amount: BigDecimal,
    },
    #[serde(rename_all = "camelCase")]
    DepositRefunded { auction_id: AuctionId },
    #[serde(rename_all = "camelCase")]
    DepositForfeited {
        auction_id: AuctionId,
        reason: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: UserId,
    #[serde(flatten)]
    pub event: Event,
}

/// Outbound channel for notifications. Implementations deliver to email,
/// push, websockets or whatever the deployment wires up.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Sink that only logs. Default until a real channel is configured.
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = notification.recipient,
            event = ?notification.event,
            "notification"
        );
        Ok(())
    }
}

/// Cheap handle for queueing notifications from anywhere in the service.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Starts the background delivery worker and returns the handle feeding
    /// it.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(receiver, sink));
        Self { sender }
    }

    pub fn notify(&self, recipient: UserId, event: Event) {
        let notification = Notification { recipient, event };
        if self.sender.send(notification).is_err() {
            tracing::warn!("notification worker is gone, dropping event");
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Notification>,
    sink: Arc<dyn NotificationSink>,
) {
    while let Some(notification) = receiver.recv().await {
        if let Err(err) = sink.deliver(&notification).await {
            tracing::warn!(
                ?err,
                recipient = notification.recipient,
                "failed to deliver notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CapturingSink(mpsc::UnboundedSender<Notification>);

    #[async_trait::async_trait]
    impl NotificationSink for CapturingSink {
        async fn deliver(&self, notification: &Notification) -> Result<()> {
            self.0.send(notification.clone()).unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (sender, mut received) = mpsc::unbounded_channel();
        let notifier = Notifier::spawn(Arc::new(CapturingSink(sender)));

        notifier.notify(7, Event::AuctionLost { auction_id: 1 });
        notifier.notify(
            9,
            Event::Outbid {
                auction_id: 1,
                amount: BigDecimal::from(150),
            },
        );

        let first = received.recv().await.unwrap();
        assert_eq!(first.recipient, 7);
        let second = received.recv().await.unwrap();
        assert_eq!(second.recipient, 9);
        assert_eq!(
            second.event,
            Event::Outbid {
                auction_id: 1,
                amount: BigDecimal::from(150),
            }
        );
    }

    #[tokio::test]
    async fn sink_failure_does_not_propagate() {
        struct FailingSink;

        #[async_trait::async_trait]
        impl NotificationSink for FailingSink {
            async fn deliver(&self, _: &Notification) -> Result<()> {
                anyhow::bail!("channel down")
            }
        }

        let notifier = Notifier::spawn(Arc::new(FailingSink));
        // Queueing must not fail even when every delivery does.
        notifier.notify(1, Event::AuctionLost { auction_id: 1 });
        tokio::task::yield_now().await;
    }
}
