//! Read side of the `exchange_rates` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ratefeed_common::{CurrencyCode, ExchangeRate};
use ratefeed_fx::{RateStore, SourceResult};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::StoreError;

const LATEST_DATE_QUERY: &str = "SELECT MAX(update_date) FROM exchange_rates";

const RATES_FOR_DATE_QUERY: &str = "SELECT currency_code, forex_buying, forex_selling, \
     banknote_buying, banknote_selling, cross_rate, update_date \
     FROM exchange_rates WHERE update_date = $1 ORDER BY currency_code";

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    currency_code: String,
    forex_buying: Option<Decimal>,
    forex_selling: Option<Decimal>,
    banknote_buying: Option<Decimal>,
    banknote_selling: Option<Decimal>,
    cross_rate: Option<Decimal>,
    update_date: NaiveDate,
}

impl TryFrom<RateRow> for ExchangeRate {
    type Error = StoreError;

    fn try_from(row: RateRow) -> Result<Self, Self::Error> {
        let currency_code: CurrencyCode = row
            .currency_code
            .parse()
            .map_err(|_| StoreError::InvalidRow(format!("currency_code {:?}", row.currency_code)))?;

        Ok(ExchangeRate {
            currency_code,
            forex_buying: row.forex_buying,
            forex_selling: row.forex_selling,
            banknote_buying: row.banknote_buying,
            banknote_selling: row.banknote_selling,
            cross_rate: row.cross_rate,
            update_date: row.update_date,
        })
    }
}

/// Rows that fail validation are skipped, not fatal.
fn into_rates(rows: Vec<RateRow>) -> Vec<ExchangeRate> {
    rows.into_iter()
        .filter_map(|row| match ExchangeRate::try_from(row) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable stored rate");
                None
            }
        })
        .collect()
}

/// Persisted rate store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a small pool against `database_url`.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = Self::pool_options(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Like [`connect`](Self::connect), but connections are opened on first
    /// use. A store that is down then fails per query instead of at startup.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = Self::pool_options(acquire_timeout).connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    fn pool_options(acquire_timeout: Duration) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn latest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let latest = sqlx::query_scalar::<_, Option<NaiveDate>>(LATEST_DATE_QUERY)
            .fetch_one(&self.pool)
            .await?;
        Ok(latest)
    }

    async fn rows_for(&self, date: NaiveDate) -> Result<Vec<RateRow>, StoreError> {
        let rows = sqlx::query_as::<_, RateRow>(RATES_FOR_DATE_QUERY)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn latest_update_date(&self) -> SourceResult<Option<NaiveDate>> {
        Ok(self.latest_date().await?)
    }

    async fn rates_for_date(&self, date: NaiveDate) -> SourceResult<Vec<ExchangeRate>> {
        let rows = self.rows_for(date).await?;
        let fetched = rows.len();
        let rates = into_rates(rows);
        debug!(snapshot_date = %date, fetched, kept = rates.len(), "Loaded stored rates");
        Ok(rates)
    }
}
