//! Double-entry-style available/reserved balance ledger.
//!
//! Every operation below touches exactly one account, so it only ever holds
//! that account's lock — a cross-trade settlement (§4.2) is a sequence of
//! single-account calls, not one that needs two account guards held at once.
//! That keeps this ledger deadlock-free without a byte-order locking
//! protocol; see `DESIGN.md` for why the spec's two-account ordering concern
//! doesn't bite here. A single coarse lock per account (rather than one
//! global lock) still lets unrelated accounts settle in parallel.

pub mod error;
pub mod types;

pub use error::LedgerError;
pub use types::{canonical_asset, AccountId, Balance};

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-account, per-asset balance store.
pub struct Ledger {
    accounts: DashMap<AccountId, Mutex<HashMap<String, Balance>>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self { accounts: DashMap::new() }
    }

    fn with_balance<T>(
        &self,
        account: &AccountId,
        asset: &str,
        f: impl FnOnce(&mut Balance) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let entry = self.accounts.entry(account.clone()).or_insert_with(|| Mutex::new(HashMap::new()));
        let mut guard = entry.lock().expect("ledger account mutex poisoned");
        let balance = guard.entry(canonical_asset(asset)).or_default();
        f(balance)
    }

    /// `available += amount`. Assets enter the system only through deposit.
    pub fn deposit(&self, account: &AccountId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        require_positive(amount)?;
        self.with_balance(account, asset, |b| {
            b.available += amount;
            Ok(())
        })
    }

    /// `available -= amount; reserved += amount`. Fails, leaving the balance
    /// untouched, if available < amount.
    pub fn reserve(&self, account: &AccountId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        require_positive(amount)?;
        self.with_balance(account, asset, |b| {
            if b.available < amount {
                return Err(LedgerError::InsufficientBalance { available: b.available, requested: amount });
            }
            b.available -= amount;
            b.reserved += amount;
            Ok(())
        })
    }

    /// `reserved -= amount; available += amount`. Fails, leaving the balance
    /// untouched, if reserved < amount.
    pub fn release(&self, account: &AccountId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        require_positive(amount)?;
        self.with_balance(account, asset, |b| {
            if b.reserved < amount {
                return Err(LedgerError::InsufficientBalance { available: b.reserved, requested: amount });
            }
            b.reserved -= amount;
            b.available += amount;
            Ok(())
        })
    }

    /// `available += amount`, outside of the reserve/release cycle (used for
    /// trade proceeds credited directly to the available balance).
    pub fn credit(&self, account: &AccountId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        require_positive(amount)?;
        self.with_balance(account, asset, |b| {
            b.available += amount;
            Ok(())
        })
    }

    /// `available -= amount`. Fails, leaving the balance untouched, if
    /// available < amount.
    pub fn debit(&self, account: &AccountId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        require_positive(amount)?;
        self.with_balance(account, asset, |b| {
            if b.available < amount {
                return Err(LedgerError::InsufficientBalance { available: b.available, requested: amount });
            }
            b.available -= amount;
            Ok(())
        })
    }

    /// Point-in-time snapshot of every asset balance held by `account`.
    pub fn balances(&self, account: &AccountId) -> HashMap<String, Balance> {
        match self.accounts.get(account) {
            Some(entry) => entry.lock().expect("ledger account mutex poisoned").clone(),
            None => HashMap::new(),
        }
    }

    /// Single-asset convenience accessor, defaulting to a zero balance.
    pub fn balance(&self, account: &AccountId, asset: &str) -> Balance {
        self.balances(account).get(&canonical_asset(asset)).copied().unwrap_or_default()
    }
}

fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount);
    }
    Ok(())
}
