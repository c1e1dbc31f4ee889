//! Money and currency formatting using decimal arithmetic.
//!
//! The commerce platform usually sends pre-formatted price strings next to
//! the raw amounts. [`format_currency`] is the fallback used when it does not,
//! and produces `en-US` style output (`$1,234.50`, `€9.00`, `CHF 12.00`).

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing money values from API payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),
}

/// ISO 4217 currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a three-letter currency code.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::InvalidCurrency` unless the code is exactly three
    /// ASCII letters.
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let trimmed = code.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(MoneyError::InvalidCurrency(code.to_string()))
        }
    }

    /// The upper-case ISO code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix symbol for currencies with a well-known one.
    #[must_use]
    pub fn symbol(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "USD" => Some("$"),
            "CAD" => Some("CA$"),
            "AUD" => Some("A$"),
            "NZD" => Some("NZ$"),
            "EUR" => Some("€"),
            "GBP" => Some("£"),
            "JPY" => Some("¥"),
            "CNY" => Some("CN¥"),
            "INR" => Some("₹"),
            "ILS" => Some("₪"),
            "KRW" => Some("₩"),
            "BRL" => Some("R$"),
            "MXN" => Some("MX$"),
            _ => None,
        }
    }

    /// Number of minor-unit digits shown for this currency.
    #[must_use]
    pub fn minor_digits(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "CLP" | "ISK" | "VND" => 0,
            _ => 2,
        }
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self("USD".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// An amount in a currency's standard unit (dollars, not cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl Money {
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Parse a decimal string amount (as sent by the platform) and a code.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if either the amount or the code is malformed.
    pub fn parse(amount: &str, currency: &str) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(amount.trim())
            .map_err(|_| MoneyError::InvalidAmount(amount.to_string()))?;
        Ok(Self::new(amount, CurrencyCode::parse(currency)?))
    }

    /// Format for display, e.g. `$19.99`.
    #[must_use]
    pub fn display(&self) -> String {
        format_currency(self.amount, &self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Format an amount in `en-US` style for the given currency.
///
/// Rounds half away from zero to the currency's minor digits and groups the
/// integer part in thousands. Currencies without a known symbol are prefixed
/// with their ISO code and a space.
#[must_use]
pub fn format_currency(amount: Decimal, currency: &CurrencyCode) -> String {
    let digits = currency.minor_digits();
    let mut rounded = amount.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(digits);

    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = text
        .split_once('.')
        .map_or((text.as_str(), None), |(i, f)| (i, Some(f)));

    let mut body = group_thousands(int_part);
    if let Some(frac) = frac_part {
        body.push('.');
        body.push_str(frac);
    }

    let sign = if negative { "-" } else { "" };
    currency.symbol().map_or_else(
        || format!("{sign}{currency} {body}"),
        |symbol| format!("{sign}{symbol}{body}"),
    )
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
