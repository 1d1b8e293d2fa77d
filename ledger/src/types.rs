use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque account identifier (the exchange client id). `Ord` so callers that
/// do need to hold two accounts' guards at once can order acquisition
/// deterministically; see [`crate::Ledger`] docs for why this ledger's own
/// operations never need to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Available/reserved balance for one (account, asset) pair. Both fields are
/// non-negative at every observable instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub reserved: Decimal,
}

/// Canonicalizes an asset code for case-insensitive lookup (`"usd"` and
/// `"USD"` refer to the same balance).
pub fn canonical_asset(asset: &str) -> String {
    asset.to_ascii_uppercase()
}
