//! Central-bank XML feed parser.
//!
//! The feed is a single document whose root element carries the snapshot
//! date in a `Date` attribute, followed by one `Currency` element per quoted
//! currency:
//!
//! ```xml
//! <Tarih_Date Tarih="15.01.2024" Date="01/15/2024">
//!   <Currency Kod="USD" CurrencyCode="USD">
//!     <Unit>1</Unit>
//!     <ForexBuying>32,50</ForexBuying>
//!     <ForexSelling>32,60</ForexSelling>
//!     <BanknoteBuying>32,45</BanknoteBuying>
//!     <BanknoteSelling>32,70</BanknoteSelling>
//!     <CrossRateUSD></CrossRateUSD>
//!   </Currency>
//! </Tarih_Date>
//! ```
//!
//! Rates are kept as published, per the element's `Unit` (JPY is quoted per
//! 100). The aggregation service stores the same quotes, so every source
//! agrees on the scale.

use std::str::FromStr;

use ratefeed_common::{parse_snapshot_date, CurrencyCode, ExchangeRate};
use roxmltree::Node;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{SourceError, SourceResult};

/// Currencies taken from the feed. Anything else is skipped.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "CHF", "JPY", "CAD", "AUD", "DKK", "SEK", "NOK", "SAR", "KWD", "CNY",
    "RUB", "AED",
];

/// Check whether a currency is taken from the feed.
pub fn is_supported(code: &CurrencyCode) -> bool {
    SUPPORTED_CURRENCIES.contains(&code.as_str())
}

/// Feed-specific number and currency conventions.
#[derive(Debug, Clone)]
pub struct FeedFormat {
    /// Decimal separator used by numeric nodes.
    pub decimal_separator: char,
    /// Currency every rate is quoted against.
    pub pivot: CurrencyCode,
}

impl Default for FeedFormat {
    fn default() -> Self {
        Self {
            decimal_separator: ',',
            pivot: CurrencyCode::try_lira(),
        }
    }
}

/// Turns a feed payload into normalized rate rows.
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    format: FeedFormat,
}

impl FeedParser {
    /// Create a parser for the given feed conventions.
    pub fn new(format: FeedFormat) -> Self {
        Self { format }
    }

    /// The conventions this parser applies.
    pub fn format(&self) -> &FeedFormat {
        &self.format
    }

    /// Parse a feed payload.
    ///
    /// The pivot row always comes first. Fails only if the payload is not
    /// XML or the root date is missing or unreadable; individual unreadable
    /// numbers become `None`. Repeated currencies are returned as they appear
    /// and resolved by [`RateTable::from_rates`](ratefeed_common::RateTable::from_rates).
    pub fn parse(&self, payload: &[u8]) -> SourceResult<Vec<ExchangeRate>> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| SourceError::Parse(format!("feed is not UTF-8: {e}")))?;
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();

        let raw_date = root.attribute("Date").ok_or_else(|| {
            SourceError::Parse(format!(
                "root element <{}> has no Date attribute",
                root.tag_name().name()
            ))
        })?;
        let update_date = parse_snapshot_date(raw_date)?;

        let pivot = &self.format.pivot;
        let mut rates = vec![ExchangeRate::pivot(pivot.clone(), update_date)];
        let mut skipped = 0usize;

        for node in root.children().filter(|n| n.has_tag_name("Currency")) {
            let Some(raw_code) = node
                .attribute("CurrencyCode")
                .or_else(|| node.attribute("Kod"))
            else {
                skipped += 1;
                continue;
            };
            let code = CurrencyCode::new(raw_code);

            if &code == pivot || !is_supported(&code) {
                skipped += 1;
                continue;
            }

            rates.push(ExchangeRate {
                forex_buying: self.number(node, &code, "ForexBuying"),
                forex_selling: self.number(node, &code, "ForexSelling"),
                banknote_buying: self.number(node, &code, "BanknoteBuying"),
                banknote_selling: self.number(node, &code, "BanknoteSelling"),
                cross_rate: self.number(node, &code, "CrossRateUSD"),
                currency_code: code,
                update_date,
            });
        }

        debug!(
            snapshot_date = %update_date,
            currencies = rates.len() - 1,
            skipped,
            "Parsed central-bank feed"
        );

        Ok(rates)
    }

    fn number(&self, node: Node<'_, '_>, code: &CurrencyCode, child: &str) -> Option<Decimal> {
        let text = node
            .children()
            .find(|c| c.has_tag_name(child))
            .and_then(|c| c.text())?
            .trim();
        if text.is_empty() {
            return None;
        }

        let normalized = text.replace(self.format.decimal_separator, ".");
        match Decimal::from_str(&normalized) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(currency = %code, field = child, raw = text, error = %e, "Unreadable number in feed");
                None
            }
        }
    }
}

/// Parse a payload with the default feed conventions.
pub fn parse(payload: &[u8]) -> SourceResult<Vec<ExchangeRate>> {
    FeedParser::default().parse(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratefeed_common::{RateTable, SourceKind};
    use rust_decimal_macros::dec;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Tarih_Date Tarih="15.01.2024" Date="2024-01-15" Bulten_No="2024/10">
  <Currency CrossOrder="0" Kod="USD" CurrencyCode="USD">
    <Unit>1</Unit>
    <CurrencyName>US DOLLAR</CurrencyName>
    <ForexBuying>32,50</ForexBuying>
    <ForexSelling>32,56</ForexSelling>
    <BanknoteBuying>32,47</BanknoteBuying>
    <BanknoteSelling>32,61</BanknoteSelling>
    <CrossRateUSD/>
  </Currency>
  <Currency CrossOrder="1" Kod="EUR" CurrencyCode="EUR">
    <Unit>1</Unit>
    <ForexBuying>35,58</ForexBuying>
    <ForexSelling>35,64</ForexSelling>
    <CrossRateUSD>1,0948</CrossRateUSD>
  </Currency>
  <Currency CrossOrder="9" Kod="JPY" CurrencyCode="JPY">
    <Unit>100</Unit>
    <ForexBuying>22,10</ForexBuying>
    <ForexSelling>22,24</ForexSelling>
    <CrossRateUSD>146,22</CrossRateUSD>
  </Currency>
  <Currency CrossOrder="12" Kod="XDR" CurrencyCode="XDR">
    <Unit>1</Unit>
    <ForexBuying>43,30</ForexBuying>
  </Currency>
</Tarih_Date>"#;

    fn find<'a>(rates: &'a [ExchangeRate], code: &str) -> Option<&'a ExchangeRate> {
        rates.iter().find(|r| r.currency_code.as_str() == code)
    }

    #[test]
    fn test_parse_fixture() {
        let rates = parse(FIXTURE.as_bytes()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let usd = find(&rates, "USD").unwrap();
        assert_eq!(usd.forex_buying, Some(dec!(32.50)));
        assert_eq!(usd.forex_selling, Some(dec!(32.56)));
        assert_eq!(usd.banknote_buying, Some(dec!(32.47)));
        assert_eq!(usd.banknote_selling, Some(dec!(32.61)));
        assert_eq!(usd.cross_rate, None);
        assert_eq!(usd.update_date, date);

        let lira = find(&rates, "TRY").unwrap();
        assert_eq!(lira.forex_buying, Some(Decimal::ONE));
        assert_eq!(lira.forex_selling, Some(Decimal::ONE));
        assert_eq!(lira.cross_rate, None);
        assert_eq!(rates[0].currency_code, CurrencyCode::try_lira());
    }

    #[test]
    fn test_missing_nodes_are_none() {
        let rates = parse(FIXTURE.as_bytes()).unwrap();
        let eur = find(&rates, "EUR").unwrap();
        assert_eq!(eur.banknote_buying, None);
        assert_eq!(eur.banknote_selling, None);
        assert_eq!(eur.cross_rate, Some(dec!(1.0948)));
    }

    #[test]
    fn test_unsupported_codes_skipped() {
        let rates = parse(FIXTURE.as_bytes()).unwrap();
        assert!(find(&rates, "XDR").is_none());
        assert_eq!(rates.len(), 4);
    }

    #[test]
    fn test_multi_unit_quotes_kept_as_published() {
        let rates = parse(FIXTURE.as_bytes()).unwrap();
        let jpy = find(&rates, "JPY").unwrap();
        assert_eq!(jpy.forex_buying, Some(dec!(22.10)));
        assert_eq!(jpy.forex_selling, Some(dec!(22.24)));
        assert_eq!(jpy.cross_rate, Some(dec!(146.22)));
    }

    #[test]
    fn test_repeated_currency_resolved_by_table() {
        let xml = r#"<Tarih_Date Date="2024-01-15">
            <Currency CurrencyCode="USD"><ForexBuying>32,50</ForexBuying></Currency>
            <Currency CurrencyCode="USD"><ForexBuying>99,00</ForexBuying></Currency>
        </Tarih_Date>"#;
        let rates = parse(xml.as_bytes()).unwrap();
        assert_eq!(rates.len(), 3);

        let table =
            RateTable::from_rates(rates, &CurrencyCode::try_lira(), SourceKind::DirectFeed)
                .unwrap();
        assert_eq!(
            table.get(&CurrencyCode::usd()).unwrap().forex_buying,
            Some(dec!(32.50))
        );
    }

    #[test]
    fn test_bank_date_spelling() {
        let xml = r#"<Tarih_Date Date="01/15/2024"><Currency CurrencyCode="USD"><ForexBuying>32,5</ForexBuying></Currency></Tarih_Date>"#;
        let rates = parse(xml.as_bytes()).unwrap();
        assert_eq!(
            rates[0].update_date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_missing_date_is_parse_error() {
        let xml = r#"<Tarih_Date Tarih="15.01.2024"><Currency CurrencyCode="USD"/></Tarih_Date>"#;
        assert!(matches!(parse(xml.as_bytes()), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_bad_date_is_parse_error() {
        let xml = r#"<Tarih_Date Date="someday"/>"#;
        assert!(matches!(parse(xml.as_bytes()), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        assert!(matches!(
            parse(b"<Tarih_Date Date=\"2024-01-15\"><Currency>"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(parse(&[0xff, 0xfe, 0x00]), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_unreadable_number_is_none() {
        let xml = r#"<Tarih_Date Date="2024-01-15"><Currency CurrencyCode="USD"><ForexBuying>n/a</ForexBuying><ForexSelling>32,6</ForexSelling></Currency></Tarih_Date>"#;
        let rates = parse(xml.as_bytes()).unwrap();
        let usd = find(&rates, "USD").unwrap();
        assert_eq!(usd.forex_buying, None);
        assert_eq!(usd.forex_selling, Some(dec!(32.6)));
    }

    #[test]
    fn test_dot_separator_format() {
        let parser = FeedParser::new(FeedFormat {
            decimal_separator: '.',
            ..Default::default()
        });
        let xml = r#"<Tarih_Date Date="2024-01-15"><Currency CurrencyCode="USD"><ForexBuying>32.50</ForexBuying></Currency></Tarih_Date>"#;
        let rates = parser.parse(xml.as_bytes()).unwrap();
        assert_eq!(find(&rates, "USD").unwrap().forex_buying, Some(dec!(32.50)));
    }

    #[test]
    fn test_feed_pivot_row_is_ignored() {
        let xml = r#"<Tarih_Date Date="2024-01-15"><Currency CurrencyCode="TRY"><ForexBuying>7</ForexBuying></Currency></Tarih_Date>"#;
        let rates = parse(xml.as_bytes()).unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].forex_buying, Some(Decimal::ONE));
    }
}
