//! In-memory fungible token with ERC20-style allowances.
//!
//! Stands in for the settlement stablecoin in tests, simulations and the
//! demo binary.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::core::{AccountId, Amount, Error, Result, TokenLedger};

#[derive(Default)]
struct TokenState {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    total_supply: Amount,
}

impl TokenState {
    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Validates both sides before writing either.
    fn move_funds(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(Error::InsufficientFunds {
                account: from.clone(),
                available: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let to_balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or(Error::AmountOverflow)?;

        self.balances.insert(from.clone(), from_balance - amount);
        self.balances.insert(to.clone(), to_balance);
        Ok(())
    }
}

/// Mintable token. One lock over all balances keeps each call atomic.
pub struct InMemoryToken {
    symbol: String,
    decimals: u32,
    state: RwLock<TokenState>,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            state: RwLock::new(TokenState::default()),
        }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    /// Create new tokens for `to`
    pub fn mint(&self, to: &AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state.write();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(Error::AmountOverflow)?;
        let balance = state
            .balance(to)
            .checked_add(amount)
            .ok_or(Error::AmountOverflow)?;

        state.total_supply = supply;
        state.balances.insert(to.clone(), balance);
        debug!("Minted {} {} to {}", amount, self.symbol, to);
        Ok(())
    }

    /// Set the amount `spender` may pull from `owner` (replaces, not adds)
    pub fn approve(&self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.state
            .write()
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
        debug!("{} approved {} to spend {} {}", owner, spender, amount, self.symbol);
    }
}

impl TokenLedger for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.state.read().balance(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state.read().allowance(owner, spender)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let mut state = self.state.write();

        let allowed = state.allowance(from, spender);
        if allowed < amount {
            return Err(Error::InsufficientFunds {
                account: from.clone(),
                available: allowed.min(state.balance(from)),
                required: amount,
            });
        }

        state.move_funds(from, to, amount)?;
        state
            .allowances
            .insert((from.clone(), spender.clone()), allowed - amount);
        Ok(())
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.state.write().move_funds(from, to, amount)
    }

    fn increase_allowance(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let mut state = self.state.write();
        let allowed = state
            .allowance(owner, spender)
            .checked_add(amount)
            .ok_or(Error::AmountOverflow)?;
        state
            .allowances
            .insert((owner.clone(), spender.clone()), allowed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let token = InMemoryToken::new("USDC", 6);
        token.mint(&acct("bank"), 1_000).unwrap();
        token.approve(&acct("bank"), &acct("escrow"), 600);

        token
            .transfer_from(&acct("escrow"), &acct("bank"), &acct("escrow"), 400)
            .unwrap();

        assert_eq!(token.balance_of(&acct("bank")), 600);
        assert_eq!(token.balance_of(&acct("escrow")), 400);
        assert_eq!(token.allowance(&acct("bank"), &acct("escrow")), 200);
    }

    #[test]
    fn test_allowance_limits_pull() {
        let token = InMemoryToken::new("USDC", 6);
        token.mint(&acct("bank"), 1_000).unwrap();
        token.approve(&acct("bank"), &acct("escrow"), 100);

        let err = token
            .transfer_from(&acct("escrow"), &acct("bank"), &acct("escrow"), 101)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientFunds {
                account: acct("bank"),
                available: 100,
                required: 101,
            }
        );
        assert_eq!(token.balance_of(&acct("bank")), 1_000);
        assert_eq!(token.allowance(&acct("bank"), &acct("escrow")), 100);
    }

    #[test]
    fn test_balance_limits_pull() {
        let token = InMemoryToken::new("USDC", 6);
        token.mint(&acct("bank"), 50).unwrap();
        token.approve(&acct("bank"), &acct("escrow"), 1_000);

        let err = token
            .transfer_from(&acct("escrow"), &acct("bank"), &acct("escrow"), 60)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { available: 50, .. }));
        assert_eq!(token.allowance(&acct("bank"), &acct("escrow")), 1_000);
    }

    #[test]
    fn test_increase_allowance_adds() {
        let token = InMemoryToken::new("USDC", 6);
        token.approve(&acct("bank"), &acct("escrow"), 100);
        token
            .increase_allowance(&acct("bank"), &acct("escrow"), 50)
            .unwrap();
        assert_eq!(token.allowance(&acct("bank"), &acct("escrow")), 150);

        assert_eq!(
            token.increase_allowance(&acct("bank"), &acct("escrow"), u64::MAX),
            Err(Error::AmountOverflow)
        );
        assert_eq!(token.allowance(&acct("bank"), &acct("escrow")), 150);
    }

    #[test]
    fn test_overflow_fails_closed() {
        let token = InMemoryToken::new("USDC", 6);
        token.mint(&acct("whale"), u64::MAX).unwrap();
        assert_eq!(token.mint(&acct("minnow"), 1), Err(Error::AmountOverflow));
        assert_eq!(token.balance_of(&acct("minnow")), 0);
        assert_eq!(token.total_supply(), u64::MAX);
    }

    #[test]
    fn test_transfer_to_self_is_noop() {
        let token = InMemoryToken::new("USDC", 6);
        token.mint(&acct("farmer"), 10).unwrap();
        token.transfer(&acct("farmer"), &acct("farmer"), 10).unwrap();
        assert_eq!(token.balance_of(&acct("farmer")), 10);
    }
}
