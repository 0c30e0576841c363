use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};

use crate::error::CoinTrackerError;

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub alarm_id: u64,
    pub owner: String,
    pub message: String,
    pub generated_at: i64,
}

/// Outbound side of the chat layer. The engine never parses inbound
/// messages; alarm management arrives as calls on the store.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, owner: &str, message: &str) -> Result<(), CoinTrackerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Sent on the second attempt.
    Retried,
    Dropped,
    Duplicate,
}

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    send_timeout: Duration,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        send_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            send_timeout,
            retry_backoff,
        }
    }

    /// Deliver a cycle's worth of events. Duplicate alarm ids within the
    /// batch are suppressed, and one recipient's failure never blocks the
    /// rest: a failed send is retried once, then dropped with a log record.
    pub async fn dispatch(&self, events: Vec<NotificationEvent>) -> Vec<Delivery> {
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            if !seen.insert(event.alarm_id) {
                warn!("duplicate notification for alarm {} suppressed", event.alarm_id);
                results.push(Delivery::Duplicate);
                continue;
            }
            results.push(self.deliver(&event).await);
        }
        results
    }

    async fn deliver(&self, event: &NotificationEvent) -> Delivery {
        match self.try_send(event).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!("delivery to {} failed, retrying once: {}", event.owner, e);
                tokio::time::sleep(self.retry_backoff).await;
                match self.try_send(event).await {
                    Ok(()) => Delivery::Retried,
                    Err(e) => {
                        error!(
                            "dropping notification for alarm {} to {}: {}",
                            event.alarm_id, event.owner, e
                        );
                        Delivery::Dropped
                    }
                }
            }
        }
    }

    async fn try_send(&self, event: &NotificationEvent) -> Result<(), CoinTrackerError> {
        match tokio::time::timeout(
            self.send_timeout,
            self.transport.send(&event.owner, &event.message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CoinTrackerError::Delivery(format!(
                "send to {} timed out",
                event.owner
            ))),
        }
    }
}
