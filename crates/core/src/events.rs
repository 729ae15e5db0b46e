use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable fact that a token's trading venue changed, as delivered by the
/// external migration detector. Delivery is at-least-once; duplicates are
/// expected and absorbed by the staleness filter and the dispatch locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub token_mint: String,
    pub pool_address: String,
    pub creator_address: Option<String>,
    pub token_created_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub initial_liquidity_sol: Decimal,
}

impl MigrationEvent {
    /// Seconds the token took to migrate from creation to detection.
    #[must_use]
    pub fn migration_secs(&self) -> i64 {
        (self.detected_at - self.token_created_at).num_seconds()
    }
}

/// Best-effort, per-user notification events emitted along the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    DispatchMatched {
        sniper_id: Uuid,
        user_id: Uuid,
        token_mint: String,
    },
    SnipeSucceeded {
        sniper_id: Uuid,
        user_id: Uuid,
        token_mint: String,
        position_id: Uuid,
        signature: String,
        sol_spent: Decimal,
    },
    SnipeFailed {
        sniper_id: Uuid,
        user_id: Uuid,
        token_mint: String,
        reason: String,
    },
    /// Action required: the sniper stopped itself and will not trade again
    /// until the user re-activates it.
    SniperDeactivated {
        sniper_id: Uuid,
        user_id: Uuid,
        reason: String,
    },
    SellTriggered {
        position_id: Uuid,
        token_mint: String,
        trigger: String,
    },
    PositionClosed {
        position_id: Uuid,
        token_mint: String,
        exit_price: Decimal,
        sol_received: Decimal,
    },
    SellFailed {
        position_id: Uuid,
        token_mint: String,
        reason: String,
    },
}

/// Fan-out over a tokio broadcast channel. Sends never block and never
/// fail the caller; a send with no subscribers is simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: tokio::sync::broadcast::Sender<NotificationEvent>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

impl crate::traits::Notifier for BroadcastNotifier {
    fn notify(&self, event: NotificationEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Notifier;
    use rust_decimal_macros::dec;

    #[test]
    fn migration_secs_spans_creation_to_detection() {
        let created = Utc::now();
        let event = MigrationEvent {
            token_mint: "MintA".to_string(),
            pool_address: "PoolA".to_string(),
            creator_address: None,
            token_created_at: created,
            detected_at: created + chrono::Duration::seconds(90),
            initial_liquidity_sol: dec!(40),
        };

        assert_eq!(event.migration_secs(), 90);
    }

    #[tokio::test]
    async fn broadcast_notifier_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.notify(NotificationEvent::SellFailed {
            position_id: Uuid::new_v4(),
            token_mint: "MintA".to_string(),
            reason: "slippage".to_string(),
        });

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, NotificationEvent::SellFailed { .. }));
    }

    #[test]
    fn broadcast_notifier_send_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(16);
        notifier.notify(NotificationEvent::SellFailed {
            position_id: Uuid::new_v4(),
            token_mint: "MintA".to_string(),
            reason: "slippage".to_string(),
        });
    }
}
