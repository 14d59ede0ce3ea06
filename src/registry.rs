//! Options Registry - issuance and resolution of harvest options
//!
//! Sole owner of every option's `holder` and `status`. The market never
//! touches an option directly; it goes through [`OptionsRegistry::reassign_holder`]
//! or the settlement-bound variant used for purchases.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::core::{
    AccountId, Clock, CreateOptionParams, Error, EventSink, OptionContract, OptionId,
    OptionStatus, Result, Timestamp,
};
use crate::escrow::EscrowLedger;
use crate::events::Event;

pub struct OptionsRegistry {
    escrow: Arc<EscrowLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    /// Deployer; the only principal allowed to authorize a market
    owner: AccountId,
    market: RwLock<Option<AccountId>>,
    /// Each option sits behind its own lock for read-modify-write
    options: RwLock<HashMap<OptionId, Arc<Mutex<OptionContract>>>>,
    next_id: AtomicU64,
}

impl OptionsRegistry {
    pub fn new(
        escrow: Arc<EscrowLedger>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        owner: AccountId,
    ) -> Self {
        Self {
            escrow,
            clock,
            events,
            owner,
            market: RwLock::new(None),
            options: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Market principal currently allowed to reassign holders
    pub fn market(&self) -> Option<AccountId> {
        self.market.read().clone()
    }

    /// Authorize the market principal. Owner only; a later call replaces the previous market.
    pub fn set_market(&self, caller: &AccountId, market: AccountId) -> Result<()> {
        if caller != &self.owner {
            return Err(Error::Unauthorized {
                caller: caller.clone(),
                action: "set the options market",
            });
        }
        info!("Options market set to {}", market);
        *self.market.write() = Some(market);
        Ok(())
    }

    /// Issue a new option. The counterparty pays `premium` to the issuer now.
    pub fn create_option(
        &self,
        issuer: &AccountId,
        params: CreateOptionParams,
    ) -> Result<OptionContract> {
        let now = self.clock.now();

        if params.expiry <= now {
            return Err(Error::InvalidExpiry { expiry: params.expiry, now });
        }
        if params.strike_price == 0 {
            return Err(Error::InvalidStrikePrice);
        }
        if params.quantity == 0 {
            return Err(Error::InvalidQuantity);
        }
        if &params.counterparty == issuer {
            return Err(Error::SelfDealing(issuer.clone()));
        }
        // Exercise must always be able to compute its settlement amount
        params
            .strike_price
            .checked_mul(params.quantity)
            .ok_or(Error::AmountOverflow)?;

        if params.premium > 0 {
            self.escrow
                .settle(&params.counterparty, issuer, params.premium)
                .inspect_err(|e| {
                    warn!("Premium settlement from {} failed: {}", params.counterparty, e)
                })?;
        }

        let id = OptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let option = OptionContract {
            id,
            issuer: issuer.clone(),
            holder: issuer.clone(),
            counterparty: params.counterparty,
            strike_price: params.strike_price,
            premium: params.premium,
            expiry: params.expiry,
            quantity: params.quantity,
            underlying: params.underlying,
            status: OptionStatus::Active,
            created_at: now,
        };

        self.options
            .write()
            .insert(id, Arc::new(Mutex::new(option.clone())));

        info!(
            "Option {} created: {} x {} @ {} (premium {}) by {} against {}, expires {}",
            id,
            option.quantity,
            option.underlying,
            option.strike_price,
            option.premium,
            option.issuer,
            option.counterparty,
            option.expiry
        );
        self.events.emit(Event::OptionCreated {
            id,
            issuer: option.issuer.clone(),
            counterparty: option.counterparty.clone(),
            strike_price: option.strike_price,
            premium: option.premium,
            expiry: option.expiry,
            quantity: option.quantity,
            underlying: option.underlying.clone(),
        });

        Ok(option)
    }

    /// Holder exercises: the counterparty pays `strike_price * quantity` to the holder.
    ///
    /// If the counterparty cannot pay, the option stays Active and the call
    /// may be retried before expiry.
    pub fn exercise_option(&self, caller: &AccountId, option_id: OptionId) -> Result<OptionContract> {
        let entry = self.entry(option_id)?;
        let mut option = entry.lock();
        let now = self.clock.now();

        if option.status.is_terminal() {
            return Err(Error::AlreadyResolved(option_id));
        }
        if caller != &option.holder {
            return Err(Error::NotHolder {
                caller: caller.clone(),
                option_id,
            });
        }
        if option.is_expired_at(now) {
            return Err(Error::OptionExpired {
                option_id,
                expiry: option.expiry,
                now,
            });
        }

        let amount = option.strike_total()?;
        self.escrow
            .settle(&option.counterparty, &option.holder, amount)
            .inspect_err(|e| warn!("Exercise of option {} not settled: {}", option_id, e))?;

        option.status = OptionStatus::Exercised;

        info!(
            "Option {} exercised by {}: {} paid {}",
            option_id, option.holder, option.counterparty, amount
        );
        self.events.emit(Event::OptionExercised {
            id: option_id,
            holder: option.holder.clone(),
            counterparty: option.counterparty.clone(),
            amount,
        });

        Ok(option.clone())
    }

    /// Issuer cancels: allowed while the issuer still holds the rights, or
    /// at any time after expiry. The premium is not refunded.
    pub fn cancel_option(&self, caller: &AccountId, option_id: OptionId) -> Result<OptionContract> {
        let entry = self.entry(option_id)?;
        let mut option = entry.lock();
        let now = self.clock.now();

        if option.status.is_terminal() {
            return Err(Error::AlreadyResolved(option_id));
        }
        if caller != &option.issuer {
            return Err(Error::NotIssuer {
                caller: caller.clone(),
                option_id,
            });
        }
        if option.has_changed_hands() && !option.is_expired_at(now) {
            return Err(Error::OptionStillTradedAndLive(option_id));
        }

        option.status = OptionStatus::Cancelled;

        info!("Option {} cancelled by {}", option_id, caller);
        self.events.emit(Event::OptionCancelled {
            id: option_id,
            issuer: option.issuer.clone(),
        });

        Ok(option.clone())
    }

    pub fn get_option(&self, option_id: OptionId) -> Result<OptionContract> {
        Ok(self.entry(option_id)?.lock().clone())
    }

    /// Run `f` with the option locked, so its holder and status hold still for the call.
    pub(crate) fn with_option<F, R>(&self, option_id: OptionId, f: F) -> Result<R>
    where
        F: FnOnce(&OptionContract, Timestamp) -> Result<R>,
    {
        let entry = self.entry(option_id)?;
        let option = entry.lock();
        f(&*option, self.clock.now())
    }

    /// Move the rights to `new_holder`. Only the authorized market may call this.
    pub fn reassign_holder(
        &self,
        caller: &AccountId,
        option_id: OptionId,
        new_holder: AccountId,
    ) -> Result<OptionContract> {
        self.transfer_rights(caller, option_id, None, new_holder, |_, _| Ok(()))
    }

    /// Reassign the holder with a funds leg bound to the same critical section.
    ///
    /// With the option locked: checks the caller is the market, the option is
    /// live and (if given) still held by `expected_holder`; runs `settle`; and
    /// only then writes the new holder. If `settle` fails nothing changes.
    pub(crate) fn transfer_rights<F>(
        &self,
        caller: &AccountId,
        option_id: OptionId,
        expected_holder: Option<&AccountId>,
        new_holder: AccountId,
        settle: F,
    ) -> Result<OptionContract>
    where
        F: FnOnce(&OptionContract, Timestamp) -> Result<()>,
    {
        if !matches!(&*self.market.read(), Some(market) if market == caller) {
            return Err(Error::Unauthorized {
                caller: caller.clone(),
                action: "reassign option holders",
            });
        }

        let entry = self.entry(option_id)?;
        let mut option = entry.lock();
        let now = self.clock.now();

        if option.status.is_terminal() {
            return Err(Error::AlreadyResolved(option_id));
        }
        if option.is_expired_at(now) {
            return Err(Error::OptionExpired {
                option_id,
                expiry: option.expiry,
                now,
            });
        }
        if let Some(expected) = expected_holder {
            if &option.holder != expected {
                return Err(Error::NotHolder {
                    caller: expected.clone(),
                    option_id,
                });
            }
        }

        settle(&*option, now)?;

        let previous = std::mem::replace(&mut option.holder, new_holder);
        info!("Option {} holder {} -> {}", option_id, previous, option.holder);

        Ok(option.clone())
    }

    /// Options issued by a farmer, by id
    pub fn options_by_issuer(&self, issuer: &AccountId) -> Vec<OptionContract> {
        self.collect(|o| &o.issuer == issuer)
    }

    /// Options a bank is obligated on, by id
    pub fn options_by_counterparty(&self, counterparty: &AccountId) -> Vec<OptionContract> {
        self.collect(|o| &o.counterparty == counterparty)
    }

    /// Options whose rights `holder` currently owns, by id
    pub fn options_held_by(&self, holder: &AccountId) -> Vec<OptionContract> {
        self.collect(|o| &o.holder == holder)
    }

    pub fn len(&self) -> usize {
        self.options.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.read().is_empty()
    }

    fn entry(&self, option_id: OptionId) -> Result<Arc<Mutex<OptionContract>>> {
        self.options
            .read()
            .get(&option_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("option {}", option_id)))
    }

    fn collect(&self, pred: impl Fn(&OptionContract) -> bool) -> Vec<OptionContract> {
        let entries: Vec<_> = self.options.read().values().cloned().collect();
        let mut out: Vec<OptionContract> = entries
            .iter()
            .map(|e| e.lock().clone())
            .filter(|o| pred(o))
            .collect();
        out.sort_by_key(|o| o.id);
        out
    }
}
