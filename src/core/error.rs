//! Error handling - one taxonomy for every engine operation

use thiserror::Error;

use crate::core::types::{AccountId, Amount, ListingId, OptionId, Timestamp};

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before anything is touched
    Validation,
    /// Caller lacks the right to act, or the entity does not exist
    Authorization,
    /// The entity's current state forbids the transition
    StateConflict,
    /// Propagated from the escrow / token layer
    Funds,
    /// Configuration loading
    Config,
}

/// Exproduce error hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("expiry {expiry} is not after current time {now}")]
    InvalidExpiry { expiry: Timestamp, now: Timestamp },

    #[error("quantity must be greater than zero")]
    InvalidQuantity,

    #[error("strike price must be greater than zero")]
    InvalidStrikePrice,

    #[error("{0} cannot deal with itself")]
    SelfDealing(AccountId),

    // ─────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────
    #[error("{caller} is not the holder of option {option_id}")]
    NotHolder { caller: AccountId, option_id: OptionId },

    #[error("{caller} is not the issuer of option {option_id}")]
    NotIssuer { caller: AccountId, option_id: OptionId },

    #[error("{caller} is not the seller of listing {listing_id}")]
    NotSeller { caller: AccountId, listing_id: ListingId },

    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("{0} not found")]
    NotFound(String),

    // ─────────────────────────────────────────────────────────────
    // State conflicts
    // ─────────────────────────────────────────────────────────────
    #[error("option {0} is already resolved")]
    AlreadyResolved(OptionId),

    #[error("option {option_id} expired at {expiry} (now {now})")]
    OptionExpired { option_id: OptionId, expiry: Timestamp, now: Timestamp },

    #[error("listing {0} refers to an option that can no longer be traded")]
    StaleListing(ListingId),

    #[error("listing {0} is no longer active")]
    ListingInactive(ListingId),

    #[error("option {option_id} already has active listing {listing_id}")]
    DuplicateActiveListing { option_id: OptionId, listing_id: ListingId },

    #[error("option {0} has changed hands and has not expired yet")]
    OptionStillTradedAndLive(OptionId),

    // ─────────────────────────────────────────────────────────────
    // Funds
    // ─────────────────────────────────────────────────────────────
    #[error("insufficient funds for {account}: available {available}, required {required}")]
    InsufficientFunds { account: AccountId, available: Amount, required: Amount },

    #[error("custody holds {available}, cannot pay out {required}")]
    InsufficientCustody { available: Amount, required: Amount },

    #[error("amount overflow")]
    AmountOverflow,

    // ─────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAmount
            | Error::InvalidExpiry { .. }
            | Error::InvalidQuantity
            | Error::InvalidStrikePrice
            | Error::SelfDealing(_) => ErrorKind::Validation,

            Error::NotHolder { .. }
            | Error::NotIssuer { .. }
            | Error::NotSeller { .. }
            | Error::Unauthorized { .. }
            | Error::NotFound(_) => ErrorKind::Authorization,

            Error::AlreadyResolved(_)
            | Error::OptionExpired { .. }
            | Error::StaleListing(_)
            | Error::ListingInactive(_)
            | Error::DuplicateActiveListing { .. }
            | Error::OptionStillTradedAndLive(_) => ErrorKind::StateConflict,

            Error::InsufficientFunds { .. }
            | Error::InsufficientCustody { .. }
            | Error::AmountOverflow => ErrorKind::Funds,

            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Invariant breaches. The operation is aborted; these never occur in a
    /// correctly accounted system.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InsufficientCustody { .. } | Error::AmountOverflow)
    }
}
