//! Core types - Strong typing for safety

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Token amount in the smallest unit. Never floating point.
pub type Amount = u64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Authenticated participant identity (farmer, bank, trader, engine account)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId::new(s)
    }
}

/// Option id, assigned monotonically by the registry starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(u64);

impl OptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Listing id, assigned monotonically by the market starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(u64);

impl ListingId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Option status. Only Active → Exercised and Active → Cancelled exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionStatus {
    Active,
    Exercised,
    Cancelled,
}

impl OptionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptionStatus::Active)
    }
}

impl std::fmt::Display for OptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionStatus::Active => write!(f, "ACTIVE"),
            OptionStatus::Exercised => write!(f, "EXERCISED"),
            OptionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Issuance request. The issuer is passed separately as the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOptionParams {
    /// Bank that pays the premium now and funds the strike at exercise
    pub counterparty: AccountId,
    /// Per-unit strike price
    pub strike_price: Amount,
    pub premium: Amount,
    pub expiry: Timestamp,
    pub quantity: u64,
    /// Crop type / asset tag
    pub underlying: String,
}

/// The option instrument. Never deleted; terminal records stay for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    pub id: OptionId,
    pub issuer: AccountId,
    pub holder: AccountId,
    pub counterparty: AccountId,
    pub strike_price: Amount,
    pub premium: Amount,
    pub expiry: Timestamp,
    pub quantity: u64,
    pub underlying: String,
    pub status: OptionStatus,
    pub created_at: Timestamp,
}

impl OptionContract {
    pub fn is_active(&self) -> bool {
        self.status == OptionStatus::Active
    }

    /// Exercise is still allowed at exactly `expiry`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expiry
    }

    /// Rights have moved away from the issuer.
    pub fn has_changed_hands(&self) -> bool {
        self.holder != self.issuer
    }

    /// Total strike settlement: `strike_price * quantity`, overflow-checked.
    pub fn strike_total(&self) -> Result<Amount> {
        self.strike_price
            .checked_mul(self.quantity)
            .ok_or(Error::AmountOverflow)
    }
}

/// Standing offer to sell an option's rights on the secondary market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub option_id: OptionId,
    pub seller: AccountId,
    pub ask_price: Amount,
    pub active: bool,
    pub created_at: Timestamp,
}

/// Render a raw amount with the token's decimals, e.g. `10000000` at 6 → `10.000000`.
pub fn format_units(amount: Amount, decimals: u32) -> String {
    match Decimal::try_from_i128_with_scale(amount as i128, decimals) {
        Ok(d) => d.to_string(),
        Err(_) => amount.to_string(),
    }
}
