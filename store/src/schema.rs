//! Table and notification trigger for the rate store.

use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS exchange_rates (
    currency_code    TEXT NOT NULL,
    forex_buying     NUMERIC,
    forex_selling    NUMERIC,
    banknote_buying  NUMERIC,
    banknote_selling NUMERIC,
    cross_rate       NUMERIC,
    update_date      DATE NOT NULL,
    PRIMARY KEY (currency_code, update_date)
)";

const DROP_TRIGGER: &str = "DROP TRIGGER IF EXISTS exchange_rates_notify ON exchange_rates";

const CREATE_TRIGGER: &str = "CREATE TRIGGER exchange_rates_notify \
     AFTER INSERT OR UPDATE ON exchange_rates \
     FOR EACH STATEMENT EXECUTE FUNCTION exchange_rates_notify()";

/// Channel names are spliced into SQL, so only plain identifiers pass.
pub(crate) fn check_channel(channel: &str) -> Result<(), StoreError> {
    let mut chars = channel.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && channel.len() <= 63;

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidChannel(channel.to_string()))
    }
}

fn notify_function(channel: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION exchange_rates_notify() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('{channel}', TG_OP);
    RETURN NULL;
END;
$$ LANGUAGE plpgsql"
    )
}

/// Create the rate table and its change trigger if they are missing.
pub async fn ensure_schema(pool: &PgPool, channel: &str) -> Result<(), StoreError> {
    check_channel(channel)?;

    sqlx::query(CREATE_TABLE).execute(pool).await?;
    sqlx::query(&notify_function(channel)).execute(pool).await?;
    sqlx::query(DROP_TRIGGER).execute(pool).await?;
    sqlx::query(CREATE_TRIGGER).execute(pool).await?;

    info!(channel = %channel, "Rate store schema ready");
    Ok(())
}
