//! Core traits - the seams to external collaborators

use crate::core::{Result, types::*};
use crate::events::Event;

/// Funds-transfer collaborator: a fungible token with balances and allowances.
///
/// Implementations must apply each call atomically: a failed transfer
/// leaves every balance and allowance untouched.
pub trait TokenLedger: Send + Sync {
    /// Token symbol (e.g. "USDC")
    fn symbol(&self) -> &str;

    /// Current balance of an account
    fn balance_of(&self, account: &AccountId) -> Amount;

    /// Amount `spender` may still pull from `owner`
    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Pull `amount` from `from` into `to`, consuming `spender`'s allowance
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    /// Push `amount` from `from` to `to`; `from` is the caller
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Add `amount` to what `spender` may pull from `owner`
    fn increase_allowance(&self, owner: &AccountId, spender: &AccountId, amount: Amount)
    -> Result<()>;
}

/// Clock collaborator. Must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Event/notification surface consumed by indexers and UIs
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}
