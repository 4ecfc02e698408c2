//! Built-in rates used when every live source fails.

use chrono::NaiveDate;
use ratefeed_common::{CurrencyCode, ExchangeRate, RateError, RateTable, SourceKind};
use rust_decimal::Decimal;

/// Immutable fallback rate set, injected into the orchestrator.
///
/// The built-in as-of date predates any live snapshot, so the fallback never
/// displaces real data already in the cache.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    pivot: CurrencyCode,
    as_of: NaiveDate,
    rates: Vec<ExchangeRate>,
}

impl StaticFallback {
    /// Create a fallback from explicit rows. Every row is re-dated to `as_of`.
    pub fn new(
        pivot: CurrencyCode,
        as_of: NaiveDate,
        rates: Vec<ExchangeRate>,
    ) -> Result<Self, RateError> {
        let rates: Vec<ExchangeRate> = rates
            .into_iter()
            .map(|mut r| {
                r.update_date = as_of;
                r
            })
            .collect();

        // Reject sets that would not form a table.
        RateTable::from_rates(rates.clone(), &pivot, SourceKind::StaticFallback)?;

        Ok(Self {
            pivot,
            as_of,
            rates,
        })
    }

    /// The built-in six-currency set.
    pub fn builtin() -> Self {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default();
        let row = |code: CurrencyCode, buying: i64, selling: i64, scale: u32| {
            ExchangeRate::new(
                code,
                Decimal::new(buying, scale),
                Decimal::new(selling, scale),
                as_of,
            )
        };

        Self {
            pivot: CurrencyCode::try_lira(),
            as_of,
            rates: vec![
                ExchangeRate::pivot(CurrencyCode::try_lira(), as_of),
                row(CurrencyCode::usd(), 2970, 2975, 2),
                row(CurrencyCode::eur(), 3280, 3286, 2),
                row(CurrencyCode::gbp(), 3775, 3795, 2),
                row(CurrencyCode::chf(), 3510, 3530, 2),
                // Per 100 yen, as the bank quotes it.
                row(CurrencyCode::jpy(), 2090, 2105, 2),
            ],
        }
    }

    /// Build the fallback table. Never fails.
    pub fn table(&self) -> RateTable {
        RateTable::from_rates(self.rates.clone(), &self.pivot, SourceKind::StaticFallback)
            .unwrap_or_else(|_| {
                RateTable::pivot_only(self.pivot.clone(), self.as_of, SourceKind::StaticFallback)
            })
    }
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::builtin()
    }
}
