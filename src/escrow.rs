//! Escrow Ledger - custody of in-transit funds
//!
//! Pure accounting: pulls funds from participants into the engine's custody
//! account and pushes them out again. No business rules live here.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

use crate::core::{AccountId, Amount, Error, Result, TokenLedger};

/// Running custody totals. `balance == received - paid_out` at all times.
#[derive(Debug, Default, Clone, Copy)]
struct CustodyBook {
    balance: Amount,
    received: Amount,
    paid_out: Amount,
}

pub struct EscrowLedger {
    token: Arc<dyn TokenLedger>,
    custody_account: AccountId,
    /// Single global lock: every custody mutation is serialized.
    book: Mutex<CustodyBook>,
}

impl EscrowLedger {
    pub fn new(token: Arc<dyn TokenLedger>, custody_account: AccountId) -> Self {
        Self {
            token,
            custody_account,
            book: Mutex::new(CustodyBook::default()),
        }
    }

    /// Account participants must approve before any pull
    pub fn custody_account(&self) -> &AccountId {
        &self.custody_account
    }

    pub fn token(&self) -> &Arc<dyn TokenLedger> {
        &self.token
    }

    pub fn custody_balance(&self) -> Amount {
        self.book.lock().balance
    }

    /// Lifetime total pulled into custody
    pub fn total_received(&self) -> Amount {
        self.book.lock().received
    }

    /// Lifetime total pushed out of custody
    pub fn total_paid_out(&self) -> Amount {
        self.book.lock().paid_out
    }

    /// Pull `amount` from `payer` into custody.
    pub fn transfer_in(&self, payer: &AccountId, amount: Amount) -> Result<()> {
        validate_amount(amount)?;
        let mut book = self.book.lock();
        self.pull(&mut book, payer, amount)
    }

    /// Push `amount` from custody to `payee`.
    pub fn transfer_out(&self, payee: &AccountId, amount: Amount) -> Result<()> {
        validate_amount(amount)?;
        let mut book = self.book.lock();
        self.push(&mut book, payee, amount)
    }

    /// Move `amount` from `payer` to `payee` through custody. Both legs or neither.
    pub fn settle(&self, payer: &AccountId, payee: &AccountId, amount: Amount) -> Result<()> {
        validate_amount(amount)?;
        let mut book = self.book.lock();
        let before = *book;

        self.pull(&mut book, payer, amount)?;

        if let Err(e) = self.push(&mut book, payee, amount) {
            // Return the pulled leg and the allowance it consumed; custody holds
            // the funds, so this only fails on a broken backend.
            let refund = self
                .token
                .transfer(&self.custody_account, payer, amount)
                .and_then(|()| {
                    self.token
                        .increase_allowance(payer, &self.custody_account, amount)
                });
            if let Err(refund) = refund {
                error!(
                    "Settlement refund to {} failed after outbound leg error ({}): {}",
                    payer, e, refund
                );
                return Err(refund);
            }
            *book = before;
            return Err(e);
        }

        debug!("Settled {} {} from {} to {}", amount, self.token.symbol(), payer, payee);
        Ok(())
    }

    fn pull(&self, book: &mut CustodyBook, payer: &AccountId, amount: Amount) -> Result<()> {
        let balance = book.balance.checked_add(amount).ok_or_else(overflow)?;
        let received = book.received.checked_add(amount).ok_or_else(overflow)?;

        self.token
            .transfer_from(&self.custody_account, payer, &self.custody_account, amount)?;

        book.balance = balance;
        book.received = received;
        debug!("Pulled {} {} from {} into custody", amount, self.token.symbol(), payer);
        Ok(())
    }

    fn push(&self, book: &mut CustodyBook, payee: &AccountId, amount: Amount) -> Result<()> {
        if book.balance < amount {
            error!(
                "Custody underflow: holding {}, asked to pay {} to {}",
                book.balance, amount, payee
            );
            return Err(Error::InsufficientCustody {
                available: book.balance,
                required: amount,
            });
        }
        let paid_out = book.paid_out.checked_add(amount).ok_or_else(overflow)?;

        self.token.transfer(&self.custody_account, payee, amount)?;

        book.balance -= amount;
        book.paid_out = paid_out;
        debug!("Pushed {} {} from custody to {}", amount, self.token.symbol(), payee);
        Ok(())
    }
}

fn validate_amount(amount: Amount) -> Result<()> {
    if amount == 0 {
        return Err(Error::InvalidAmount);
    }
    Ok(())
}

fn overflow() -> Error {
    error!("Custody accounting overflow");
    Error::AmountOverflow
}
