//! Push notifications from the rate table.

use async_trait::async_trait;
use ratefeed_fx::{ChangeEvent, ChangeSubscription};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::schema::check_channel;

/// Channel the store trigger notifies on.
pub const DEFAULT_NOTIFY_CHANNEL: &str = "exchange_rates_changed";

/// `LISTEN`s on the rate table's notification channel.
///
/// Dropping the listener closes its connection, which unsubscribes.
pub struct PgChangeListener {
    listener: PgListener,
    channel: String,
}

impl PgChangeListener {
    pub async fn connect(pool: &PgPool, channel: &str) -> Result<Self, StoreError> {
        check_channel(channel)?;

        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        info!(channel = %channel, "Listening for rate table changes");

        Ok(Self {
            listener,
            channel: channel.to_string(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl ChangeSubscription for PgChangeListener {
    async fn next_change(&mut self) -> Option<ChangeEvent> {
        match self.listener.try_recv().await {
            Ok(Some(notification)) => {
                let payload = notification.payload();
                Some(ChangeEvent {
                    detail: (!payload.is_empty()).then(|| payload.to_string()),
                })
            }
            // Connection dropped; the next call reconnects and re-listens.
            // Notifications sent meanwhile are lost, so report a change.
            Ok(None) => {
                warn!(channel = %self.channel, "Notification connection lost, reconnecting");
                Some(ChangeEvent {
                    detail: Some("reconnect".to_string()),
                })
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Notification listener failed");
                None
            }
        }
    }
}
