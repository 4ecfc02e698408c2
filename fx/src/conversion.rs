//! Conversion engine over the rate cache.

use std::sync::Arc;

use ratefeed_common::{CurrencyCode, RateError, RatesMap};
use rust_decimal::Decimal;
use tracing::warn;

use crate::cache::RateCache;
use crate::format::{format_money, Locale};

/// Converts and formats amounts using whatever table the cache holds now.
#[derive(Clone)]
pub struct ConversionEngine {
    cache: Arc<RateCache>,
    locale: Locale,
}

impl ConversionEngine {
    pub fn new(cache: Arc<RateCache>, locale: Locale) -> Self {
        Self { cache, locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Buying rate of every cached currency against the pivot.
    pub fn rates_map(&self) -> RatesMap {
        self.cache.current().rates_map().clone()
    }

    /// Convert `amount` from one currency to another. Unknown codes rate as 1.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal, RateError> {
        self.cache
            .current()
            .rates_map()
            .convert(amount, from, to)
            .map_err(|e| {
                warn!(
                    error_code = e.error_code(),
                    from = %from,
                    to = %to,
                    "Conversion failed"
                );
                e
            })
    }

    /// Format an amount in the engine's locale.
    pub fn format(&self, amount: Decimal, code: &CurrencyCode) -> String {
        format_money(amount, code, self.locale)
    }

    /// Convert, then format in the target currency.
    pub fn convert_and_format(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<String, RateError> {
        Ok(self.format(self.convert(amount, from, to)?, to))
    }
}
