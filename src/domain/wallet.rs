//! Wallet
//!
//! The single balance-holding record of one account. Store backends persist
//! wallets; the balance rules live here so every backend applies them the same
//! way while it holds the row lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Balance, Currency, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: Uuid,
    pub balance: Balance,
    pub currency: Currency,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// One leg of a money movement against a single wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDelta {
    Credit(Amount),
    Debit(Amount),
}

impl BalanceDelta {
    pub fn amount(&self) -> Amount {
        match self {
            BalanceDelta::Credit(amount) | BalanceDelta::Debit(amount) => *amount,
        }
    }
}

impl Wallet {
    /// A fresh, unlocked, zero-balance wallet
    pub fn new(account_id: Uuid, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            balance: Balance::zero(),
            currency,
            locked: false,
            created_at: now,
            last_updated: now,
        }
    }

    /// Compute the wallet state after applying `delta`.
    ///
    /// Rejects with `WalletLocked` when the lock flag is set,
    /// `CurrencyMismatch` when the leg is in another currency, and
    /// `InsufficientFunds` when a debit would leave the balance negative.
    pub fn apply(
        &self,
        currency: &Currency,
        delta: BalanceDelta,
        now: DateTime<Utc>,
    ) -> Result<Wallet, LedgerError> {
        if self.locked {
            return Err(LedgerError::WalletLocked(self.account_id));
        }

        if &self.currency != currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency.clone(),
                found: currency.clone(),
            });
        }

        let balance = match delta {
            BalanceDelta::Credit(amount) => self.balance.credit(&amount)?,
            BalanceDelta::Debit(amount) => {
                if !self.balance.is_sufficient_for(&amount) {
                    return Err(LedgerError::insufficient_funds(
                        amount.value(),
                        self.balance.value(),
                    ));
                }
                self.balance.debit(&amount)?
            }
        };

        Ok(Wallet {
            balance,
            last_updated: now,
            ..self.clone()
        })
    }

    pub fn with_locked(&self, locked: bool, now: DateTime<Utc>) -> Wallet {
        Wallet {
            locked,
            last_updated: now,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn etb() -> Currency {
        Currency::new("ETB").unwrap()
    }

    fn funded(balance: rust_decimal::Decimal) -> Wallet {
        let mut wallet = Wallet::new(Uuid::new_v4(), etb(), Utc::now());
        wallet.balance = Balance::new(balance).unwrap();
        wallet
    }

    #[test]
    fn test_credit_and_debit() {
        let wallet = funded(dec!(100));
        let amount = Amount::new(dec!(40)).unwrap();

        let debited = wallet.apply(&etb(), BalanceDelta::Debit(amount), Utc::now()).unwrap();
        assert_eq!(debited.balance.value(), dec!(60));

        let credited = debited.apply(&etb(), BalanceDelta::Credit(amount), Utc::now()).unwrap();
        assert_eq!(credited.balance.value(), dec!(100));
    }

    #[test]
    fn test_debit_exact_balance_reaches_zero() {
        let wallet = funded(dec!(25));
        let amount = Amount::new(dec!(25)).unwrap();

        let debited = wallet.apply(&etb(), BalanceDelta::Debit(amount), Utc::now()).unwrap();
        assert_eq!(debited.balance, Balance::zero());
    }

    #[test]
    fn test_insufficient_funds() {
        let wallet = funded(dec!(10));
        let amount = Amount::new(dec!(25)).unwrap();

        let result = wallet.apply(&etb(), BalanceDelta::Debit(amount), Utc::now());
        match result {
            Err(LedgerError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, dec!(25));
                assert_eq!(available, dec!(10));
            }
            other => panic!("Expected InsufficientFunds, got: {:?}", other),
        }
    }

    #[test]
    fn test_locked_wallet_rejects_credit_and_debit() {
        let wallet = funded(dec!(100)).with_locked(true, Utc::now());
        let amount = Amount::new(dec!(1)).unwrap();

        assert!(matches!(
            wallet.apply(&etb(), BalanceDelta::Credit(amount), Utc::now()),
            Err(LedgerError::WalletLocked(_))
        ));
        assert!(matches!(
            wallet.apply(&etb(), BalanceDelta::Debit(amount), Utc::now()),
            Err(LedgerError::WalletLocked(_))
        ));
    }

    #[test]
    fn test_currency_mismatch() {
        let wallet = funded(dec!(100));
        let usd = Currency::new("USD").unwrap();
        let amount = Amount::new(dec!(1)).unwrap();

        assert!(matches!(
            wallet.apply(&usd, BalanceDelta::Credit(amount), Utc::now()),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }
}
