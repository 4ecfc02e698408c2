//! Display formatting for monetary amounts.

use std::fmt;
use std::str::FromStr;

use ratefeed_common::CurrencyCode;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Display conventions for amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    /// `₺1.234,56`
    #[default]
    TrTr,
    /// `$1,234.56`
    EnUs,
    /// `1.234,56 €`
    DeDe,
}

impl Locale {
    fn grouping(&self) -> char {
        match self {
            Locale::TrTr | Locale::DeDe => '.',
            Locale::EnUs => ',',
        }
    }

    fn decimal(&self) -> char {
        match self {
            Locale::TrTr | Locale::DeDe => ',',
            Locale::EnUs => '.',
        }
    }

    fn symbol_after(&self) -> bool {
        matches!(self, Locale::DeDe)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Locale::TrTr => "tr-TR",
            Locale::EnUs => "en-US",
            Locale::DeDe => "de-DE",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('_', "-").to_ascii_lowercase().as_str() {
            "tr" | "tr-tr" => Ok(Locale::TrTr),
            "en" | "en-us" => Ok(Locale::EnUs),
            "de" | "de-de" => Ok(Locale::DeDe),
            other => Err(format!("Unsupported locale: {}", other)),
        }
    }
}

fn symbol(code: &CurrencyCode) -> Option<&'static str> {
    match code.as_str() {
        "TRY" => Some("₺"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

/// Format `amount` of `code` for display in `locale`.
///
/// Rounds half away from zero to the currency's minor units.
pub fn format_money(amount: Decimal, code: &CurrencyCode, locale: Locale) -> String {
    let scale = code.minor_units();
    let mut value = amount
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
        .abs();
    value.rescale(scale);
    let negative = amount.is_sign_negative() && !value.is_zero();

    let digits = value.to_string();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits.as_str(), None),
    };

    let mut number = group(whole, locale.grouping());
    if let Some(fraction) = fraction {
        number.push(locale.decimal());
        number.push_str(fraction);
    }

    let sign = if negative { "-" } else { "" };
    match (symbol(code), locale.symbol_after()) {
        (Some(symbol), false) => format!("{sign}{symbol}{number}"),
        (Some(symbol), true) => format!("{sign}{number} {symbol}"),
        (None, false) => format!("{sign}{code} {number}"),
        (None, true) => format!("{sign}{number} {code}"),
    }
}

fn group(whole: &str, separator: char) -> String {
    let len = whole.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}
