//! Currency code
//!
//! ISO 4217 style three-letter code. Conversion between currencies is not
//! supported; legs of one operation must share a currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency of wallets created without an explicit one
pub const DEFAULT_CURRENCY: &str = "ETB";

/// Validated, upper-cased three-letter currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid currency code: {0:?}")]
pub struct CurrencyError(pub String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, CurrencyError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self(DEFAULT_CURRENCY.to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalized() {
        let currency: Currency = "etb".parse().unwrap();
        assert_eq!(currency.as_str(), "ETB");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("US1").is_err());
        assert!(Currency::new("EURO").is_err());
    }

    #[test]
    fn test_default_currency() {
        assert_eq!(Currency::default().as_str(), DEFAULT_CURRENCY);
    }
}
