//! Amount type
//!
//! Domain primitives for monetary values with business rule validation.
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount or balance (1 trillion)
const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Maximum decimal places (minor units of fiat currencies)
const MAX_SCALE: u32 = 2;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use ledger_engine::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(4000, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(40, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // Trailing zeros beyond the minor unit are harmless ("40.000")
        let value = value.normalize();
        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > Decimal::from(MAX_AMOUNT) {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

/// Balance represents a wallet balance (zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }

        if value > Decimal::from(MAX_AMOUNT) {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if balance covers a debit of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 + amount.value())
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.value())
    }
}

impl TryFrom<Decimal> for Balance {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}
