//! Exchange rate records and rate tables.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;
use tracing::{debug, warn};

use crate::currency::CurrencyCode;
use crate::error::{RateError, Result};
use crate::rates_map::RatesMap;
use crate::time::{now, Timestamp};

/// Rates for one currency against the pivot currency, as of one snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// ISO 4217 code of the quoted currency.
    pub currency_code: CurrencyCode,
    /// Wire-transfer rate at which the bank buys the currency.
    #[serde(default)]
    pub forex_buying: Option<Decimal>,
    /// Wire-transfer rate at which the bank sells the currency.
    #[serde(default)]
    pub forex_selling: Option<Decimal>,
    /// Cash rate at which the bank buys the currency.
    #[serde(default)]
    pub banknote_buying: Option<Decimal>,
    /// Cash rate at which the bank sells the currency.
    #[serde(default)]
    pub banknote_selling: Option<Decimal>,
    /// Cross rate against USD, as published by the bank.
    #[serde(default)]
    pub cross_rate: Option<Decimal>,
    /// Snapshot date the rates belong to.
    pub update_date: NaiveDate,
}

impl ExchangeRate {
    /// Create a rate row with only the forex side populated.
    pub fn new(
        currency_code: CurrencyCode,
        forex_buying: Decimal,
        forex_selling: Decimal,
        update_date: NaiveDate,
    ) -> Self {
        Self {
            currency_code,
            forex_buying: Some(forex_buying),
            forex_selling: Some(forex_selling),
            banknote_buying: None,
            banknote_selling: None,
            cross_rate: None,
            update_date,
        }
    }

    /// The synthesized row for the pivot currency: every side is 1, no cross rate.
    pub fn pivot(currency_code: CurrencyCode, update_date: NaiveDate) -> Self {
        Self {
            currency_code,
            forex_buying: Some(Decimal::ONE),
            forex_selling: Some(Decimal::ONE),
            banknote_buying: Some(Decimal::ONE),
            banknote_selling: Some(Decimal::ONE),
            cross_rate: None,
            update_date,
        }
    }

}

/// Where a rate table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Latest snapshot read back from the persisted store.
    Cache,
    /// Live central-bank feed.
    DirectFeed,
    /// Remote aggregation service.
    Aggregator,
    /// Built-in constant rates.
    StaticFallback,
}

impl SourceKind {
    /// Stable name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cache => "cache",
            SourceKind::DirectFeed => "direct_feed",
            SourceKind::Aggregator => "aggregator",
            SourceKind::StaticFallback => "static_fallback",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete per-currency rate data for one snapshot date.
///
/// Built only through [`RateTable::from_rates`], which enforces one row per
/// currency, a single snapshot date, and a canonical pivot row. Tables are
/// immutable once built; the cache swaps whole tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    snapshot_date: NaiveDate,
    pivot: CurrencyCode,
    rates: BTreeMap<CurrencyCode, ExchangeRate>,
    source: SourceKind,
    fetched_at: Timestamp,
}

impl RateTable {
    /// Assemble a table from adapter output.
    ///
    /// The snapshot date is the newest `update_date` present; rows dated
    /// otherwise are dropped. A currency listed more than once keeps its
    /// first row; this is the only place repeated rows are resolved. The pivot
    /// row is always replaced by the canonical one. Fails if no non-pivot
    /// rate survives.
    pub fn from_rates(
        rates: Vec<ExchangeRate>,
        pivot: &CurrencyCode,
        source: SourceKind,
    ) -> Result<Self> {
        let snapshot_date = rates
            .iter()
            .map(|r| r.update_date)
            .max()
            .ok_or(RateError::EmptySnapshot)?;

        let mut table = BTreeMap::new();
        let mut dropped = 0usize;
        for rate in rates {
            if rate.update_date != snapshot_date {
                dropped += 1;
                continue;
            }
            if &rate.currency_code == pivot {
                continue;
            }
            match table.entry(rate.currency_code.clone()) {
                Entry::Occupied(_) => warn!(
                    source = %source,
                    currency = %rate.currency_code,
                    "Duplicate currency in snapshot, keeping first row"
                ),
                Entry::Vacant(slot) => {
                    slot.insert(rate);
                }
            }
        }

        if dropped > 0 {
            debug!(
                source = %source,
                snapshot_date = %snapshot_date,
                dropped,
                "Dropped rows from older snapshots"
            );
        }

        if table.is_empty() {
            return Err(RateError::EmptySnapshot);
        }

        table.insert(
            pivot.clone(),
            ExchangeRate::pivot(pivot.clone(), snapshot_date),
        );

        Ok(Self {
            snapshot_date,
            pivot: pivot.clone(),
            rates: table,
            source,
            fetched_at: now(),
        })
    }

    /// A table holding nothing but the pivot row.
    pub fn pivot_only(pivot: CurrencyCode, snapshot_date: NaiveDate, source: SourceKind) -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(
            pivot.clone(),
            ExchangeRate::pivot(pivot.clone(), snapshot_date),
        );
        Self {
            snapshot_date,
            pivot,
            rates,
            source,
            fetched_at: now(),
        }
    }

    /// Snapshot date of every row in the table.
    pub fn snapshot_date(&self) -> NaiveDate {
        self.snapshot_date
    }

    /// The pivot currency.
    pub fn pivot(&self) -> &CurrencyCode {
        &self.pivot
    }

    /// Which source produced this table.
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// When the table was assembled.
    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    /// Whether this table is the built-in fallback rather than live data.
    pub fn is_degraded(&self) -> bool {
        self.source == SourceKind::StaticFallback
    }

    /// Look up one currency.
    pub fn get(&self, code: &CurrencyCode) -> Option<&ExchangeRate> {
        self.rates.get(code)
    }

    /// Whether a currency is present.
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.rates.contains_key(code)
    }

    /// Number of currencies, pivot included.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false for a built table; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over rows in currency-code order.
    pub fn iter(&self) -> impl Iterator<Item = &ExchangeRate> {
        self.rates.values()
    }

    /// Derive the buying-rate lookup used for conversion.
    pub fn rates_map(&self) -> RatesMap {
        RatesMap::from_table(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn usd(day: u32, buying: Decimal) -> ExchangeRate {
        ExchangeRate::new(CurrencyCode::usd(), buying, buying + dec!(0.1), date(day))
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let result = RateTable::from_rates(vec![], &CurrencyCode::try_lira(), SourceKind::Cache);
        assert_eq!(result, Err(RateError::EmptySnapshot));
    }

    #[test]
    fn test_pivot_only_is_rejected() {
        let rows = vec![ExchangeRate::pivot(CurrencyCode::try_lira(), date(15))];
        let result = RateTable::from_rates(rows, &CurrencyCode::try_lira(), SourceKind::Cache);
        assert_eq!(result, Err(RateError::EmptySnapshot));
    }

    #[test]
    fn test_pivot_is_synthesized() {
        let table = RateTable::from_rates(
            vec![usd(15, dec!(32.50))],
            &CurrencyCode::try_lira(),
            SourceKind::DirectFeed,
        )
        .unwrap();

        let pivot = table.get(&CurrencyCode::try_lira()).unwrap();
        assert_eq!(pivot.forex_buying, Some(Decimal::ONE));
        assert_eq!(pivot.forex_selling, Some(Decimal::ONE));
        assert_eq!(pivot.cross_rate, None);
        assert_eq!(pivot.update_date, date(15));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_bogus_pivot_row_is_overwritten() {
        let mut bogus = ExchangeRate::new(CurrencyCode::try_lira(), dec!(3), dec!(4), date(15));
        bogus.cross_rate = Some(dec!(9));
        let table = RateTable::from_rates(
            vec![bogus, usd(15, dec!(32.50))],
            &CurrencyCode::try_lira(),
            SourceKind::Aggregator,
        )
        .unwrap();

        let pivot = table.get(&CurrencyCode::try_lira()).unwrap();
        assert_eq!(pivot.forex_buying, Some(Decimal::ONE));
        assert_eq!(pivot.cross_rate, None);
    }

    #[test]
    fn test_older_rows_are_dropped() {
        let eur = ExchangeRate::new(CurrencyCode::eur(), dec!(35), dec!(35.2), date(14));
        let table = RateTable::from_rates(
            vec![eur, usd(15, dec!(32.50))],
            &CurrencyCode::try_lira(),
            SourceKind::Cache,
        )
        .unwrap();

        assert_eq!(table.snapshot_date(), date(15));
        assert!(!table.contains(&CurrencyCode::eur()));
        assert!(table.contains(&CurrencyCode::usd()));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let table = RateTable::from_rates(
            vec![usd(15, dec!(30)), usd(15, dec!(31))],
            &CurrencyCode::try_lira(),
            SourceKind::Cache,
        )
        .unwrap();

        assert_eq!(
            table.get(&CurrencyCode::usd()).unwrap().forex_buying,
            Some(dec!(30))
        );
    }

    #[test]
    fn test_degraded_flag() {
        let table = RateTable::from_rates(
            vec![usd(15, dec!(32.50))],
            &CurrencyCode::try_lira(),
            SourceKind::StaticFallback,
        )
        .unwrap();
        assert!(table.is_degraded());
    }

    #[test]
    fn test_exchange_rate_json_shape() {
        let json = r#"{
            "currency_code": "USD",
            "forex_buying": 32.5,
            "forex_selling": "32.6",
            "update_date": "2024-01-15"
        }"#;
        let rate: ExchangeRate = serde_json::from_str(json).unwrap();
        assert_eq!(rate.currency_code, CurrencyCode::usd());
        assert_eq!(rate.forex_buying, Some(dec!(32.5)));
        assert_eq!(rate.forex_selling, Some(dec!(32.6)));
        assert_eq!(rate.banknote_buying, None);
        assert_eq!(rate.update_date, date(15));
    }
}
