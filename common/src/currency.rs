//! Currency codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an ISO 4217 alphabetic code.
pub const CURRENCY_CODE_LEN: usize = 3;

/// Error returned when a string is not a usable currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code {0:?}: expected {CURRENCY_CODE_LEN} ASCII letters")]
pub struct CurrencyCodeError(pub String);

/// ISO 4217 alphabetic currency code, always uppercase.
///
/// A code is exactly three ASCII letters. The store uses the code as a column
/// name, so nothing outside `[A-Z]` can ever reach a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and normalise a currency code.
    pub fn parse(code: &str) -> Result<Self, CurrencyCodeError> {
        let trimmed = code.trim();
        if trimmed.len() != CURRENCY_CODE_LEN || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CurrencyCodeError(code.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_case() {
        let code = CurrencyCode::parse("usd").unwrap();
        assert_eq!(code.as_str(), "USD");
        assert_eq!(code.to_string(), "USD");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(CurrencyCode::parse(" gbp ").unwrap().as_str(), "GBP");
    }

    #[test]
    fn test_rejects_bad_codes() {
        for bad in ["", "US", "USDX", "U$D", "12A", "US D", "\"; DROP"] {
            assert!(CurrencyCode::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_serde_validates() {
        let code: CurrencyCode = serde_json::from_str("\"jpy\"").unwrap();
        assert_eq!(code.as_str(), "JPY");
        assert!(serde_json::from_str::<CurrencyCode>("\"yen!\"").is_err());
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"JPY\"");
    }

    #[test]
    fn test_ordering_is_alphabetical() {
        let mut codes: Vec<CurrencyCode> = ["USD", "AUD", "JPY"]
            .iter()
            .map(|c| c.parse().unwrap())
            .collect();
        codes.sort();
        let sorted: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
        assert_eq!(sorted, vec!["AUD", "JPY", "USD"]);
    }
}
