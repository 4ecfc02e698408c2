//! Simplified currency → buying-rate lookup used for conversion.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::currency::CurrencyCode;
use crate::error::{RateError, Result};
use crate::rate::RateTable;

/// Buying rate of each currency against the pivot.
///
/// Currencies without a usable buying rate map to 1, and so do codes the map
/// has never seen, so conversions never divide by zero. The only failure is
/// an amount too large for `Decimal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatesMap {
    pivot: CurrencyCode,
    rates: BTreeMap<CurrencyCode, Decimal>,
}

impl RatesMap {
    /// Derive from a rate table, substituting 1 for missing buying rates.
    pub fn from_table(table: &RateTable) -> Self {
        let mut rates: BTreeMap<CurrencyCode, Decimal> = table
            .iter()
            .map(|r| {
                let rate = r
                    .forex_buying
                    .filter(|v| !v.is_zero())
                    .unwrap_or(Decimal::ONE);
                (r.currency_code.clone(), rate)
            })
            .collect();
        rates.insert(table.pivot().clone(), Decimal::ONE);

        Self {
            pivot: table.pivot().clone(),
            rates,
        }
    }

    /// The pivot currency.
    pub fn pivot(&self) -> &CurrencyCode {
        &self.pivot
    }

    /// Rate for a currency, if the map has one.
    pub fn get(&self, code: &CurrencyCode) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    /// Rate for a currency, 1 when unknown.
    pub fn rate_or_default(&self, code: &CurrencyCode) -> Decimal {
        self.get(code).unwrap_or(Decimal::ONE)
    }

    /// Number of currencies, pivot included.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over `(code, rate)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, &Decimal)> {
        self.rates.iter()
    }

    /// Convert an amount between two currencies through the pivot.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal> {
        if from == to {
            return Ok(amount);
        }

        let overflow = || RateError::ConversionOverflow {
            amount,
            from: from.clone(),
            to: to.clone(),
        };

        let in_pivot = if from == &self.pivot {
            amount
        } else {
            amount
                .checked_mul(self.rate_or_default(from))
                .ok_or_else(overflow)?
        };

        if to == &self.pivot {
            Ok(in_pivot)
        } else {
            in_pivot
                .checked_div(self.rate_or_default(to))
                .ok_or_else(overflow)
        }
    }
}
