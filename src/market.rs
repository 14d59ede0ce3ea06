//! Options Market - secondary trading of live options
//!
//! Listings reference options by id only. Ownership moves through the
//! registry, with the buyer's payment settled inside the registry's
//! critical section so money and rights change hands together.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::core::{
    AccountId, Amount, Clock, Error, EventSink, Listing, ListingId, OptionContract, OptionId,
    Result, Timestamp,
};
use crate::escrow::EscrowLedger;
use crate::events::Event;
use crate::registry::OptionsRegistry;

pub struct Market {
    /// Principal the registry knows this market by
    account: AccountId,
    registry: Arc<OptionsRegistry>,
    escrow: Arc<EscrowLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    listings: RwLock<HashMap<ListingId, Arc<Mutex<Listing>>>>,
    /// option → its most recent listing; taken before any listing lock, never after
    active_by_option: Mutex<HashMap<OptionId, ListingId>>,
    next_id: AtomicU64,
}

impl Market {
    pub fn new(
        account: AccountId,
        registry: Arc<OptionsRegistry>,
        escrow: Arc<EscrowLedger>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            account,
            registry,
            escrow,
            clock,
            events,
            listings: RwLock::new(HashMap::new()),
            active_by_option: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Offer an option's rights for `ask_price`. The seller must hold a live option.
    pub fn list_option(
        &self,
        seller: &AccountId,
        option_id: OptionId,
        ask_price: Amount,
    ) -> Result<Listing> {
        let option = self.registry.get_option(option_id)?;
        check_listable(&option, seller, self.clock.now())?;

        let mut index = self.active_by_option.lock();

        if let Some(existing_id) = index.get(&option_id).copied() {
            let existing = self.entry(existing_id)?;
            let mut existing = existing.lock();
            if existing.active {
                if &existing.seller == seller {
                    return Err(Error::DuplicateActiveListing {
                        option_id,
                        listing_id: existing_id,
                    });
                }
                // Rights moved on without this listing being consumed
                existing.active = false;
                warn!(
                    "Listing {} dropped: {} no longer holds option {}",
                    existing_id, existing.seller, option_id
                );
                self.events.emit(Event::ListingWithdrawn {
                    listing_id: existing_id,
                    option_id,
                });
            }
        }

        // A purchase may have moved the rights while we waited on the index
        let listing = self.registry.with_option(option_id, |option, now| {
            check_listable(option, seller, now)?;

            let listing = Listing {
                id: ListingId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
                option_id,
                seller: seller.clone(),
                ask_price,
                active: true,
                created_at: now,
            };
            self.listings
                .write()
                .insert(listing.id, Arc::new(Mutex::new(listing.clone())));
            Ok(listing)
        })?;
        let id = listing.id;
        index.insert(option_id, id);
        drop(index);

        info!("Listing {} opened: option {} by {} for {}", id, option_id, seller, ask_price);
        self.events.emit(Event::OptionListed {
            listing_id: id,
            option_id,
            seller: seller.clone(),
            ask_price,
        });

        Ok(listing)
    }

    /// Buy a listed option: the buyer pays the seller and becomes the holder.
    ///
    /// A listing whose option has expired, been resolved, or changed hands
    /// is closed and `StaleListing` returned; no funds move. A funds failure
    /// leaves the listing open.
    pub fn buy_option(&self, buyer: &AccountId, listing_id: ListingId) -> Result<OptionContract> {
        let entry = self.entry(listing_id)?;
        let mut listing = entry.lock();

        if !listing.active {
            return Err(Error::ListingInactive(listing_id));
        }
        if buyer == &listing.seller {
            return Err(Error::SelfDealing(buyer.clone()));
        }

        let option_id = listing.option_id;
        let seller = listing.seller.clone();
        let price = listing.ask_price;

        let result = self.registry.transfer_rights(
            &self.account,
            option_id,
            Some(&seller),
            buyer.clone(),
            |option, now| {
                if now >= option.expiry {
                    return Err(Error::StaleListing(listing_id));
                }
                if price > 0 {
                    self.escrow.settle(buyer, &seller, price)?;
                }
                Ok(())
            },
        );

        match result {
            Ok(option) => {
                listing.active = false;
                drop(listing);
                self.release(option_id, listing_id);

                info!("Listing {} filled: option {} {} -> {} for {}", listing_id, option_id, seller, buyer, price);
                self.events.emit(Event::OptionSold {
                    listing_id,
                    option_id,
                    seller,
                    new_holder: buyer.clone(),
                    price,
                });
                Ok(option)
            }
            Err(
                Error::AlreadyResolved(_)
                | Error::OptionExpired { .. }
                | Error::NotHolder { .. }
                | Error::NotFound(_)
                | Error::StaleListing(_),
            ) => {
                listing.active = false;
                drop(listing);
                self.release(option_id, listing_id);

                warn!("Listing {} is stale, closing it (option {})", listing_id, option_id);
                self.events.emit(Event::ListingWithdrawn {
                    listing_id,
                    option_id,
                });
                Err(Error::StaleListing(listing_id))
            }
            Err(e) => {
                warn!("Purchase of listing {} by {} failed: {}", listing_id, buyer, e);
                Err(e)
            }
        }
    }

    /// Seller takes a listing down. No funds move.
    pub fn withdraw_listing(&self, caller: &AccountId, listing_id: ListingId) -> Result<Listing> {
        let entry = self.entry(listing_id)?;
        let mut listing = entry.lock();

        if caller != &listing.seller {
            return Err(Error::NotSeller {
                caller: caller.clone(),
                listing_id,
            });
        }
        if !listing.active {
            return Err(Error::ListingInactive(listing_id));
        }

        listing.active = false;
        let withdrawn = listing.clone();
        drop(listing);
        self.release(withdrawn.option_id, listing_id);

        info!("Listing {} withdrawn by {}", listing_id, caller);
        self.events.emit(Event::ListingWithdrawn {
            listing_id,
            option_id: withdrawn.option_id,
        });

        Ok(withdrawn)
    }

    /// Look up a listing. Callers must check `active`: consumed listings are still returned.
    pub fn get_active_listing(&self, listing_id: ListingId) -> Result<Listing> {
        Ok(self.entry(listing_id)?.lock().clone())
    }

    /// The open listing for an option, if any
    pub fn active_listing_for(&self, option_id: OptionId) -> Option<Listing> {
        let listing_id = self.active_by_option.lock().get(&option_id).copied()?;
        let listing = self.entry(listing_id).ok()?.lock().clone();
        listing.active.then_some(listing)
    }

    /// All open listings, by id
    pub fn active_listings(&self) -> Vec<Listing> {
        let entries: Vec<_> = self.listings.read().values().cloned().collect();
        let mut out: Vec<Listing> = entries
            .iter()
            .map(|e| e.lock().clone())
            .filter(|l| l.active)
            .collect();
        out.sort_by_key(|l| l.id);
        out
    }

    fn entry(&self, listing_id: ListingId) -> Result<Arc<Mutex<Listing>>> {
        self.listings
            .read()
            .get(&listing_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("listing {}", listing_id)))
    }

    /// Drop the index slot if it still points at this listing
    fn release(&self, option_id: OptionId, listing_id: ListingId) {
        let mut index = self.active_by_option.lock();
        if index.get(&option_id) == Some(&listing_id) {
            index.remove(&option_id);
        }
    }
}

/// A seller may list only a live option they hold, strictly before expiry.
fn check_listable(option: &OptionContract, seller: &AccountId, now: Timestamp) -> Result<()> {
    if option.status.is_terminal() {
        return Err(Error::AlreadyResolved(option.id));
    }
    if &option.holder != seller {
        return Err(Error::NotHolder {
            caller: seller.clone(),
            option_id: option.id,
        });
    }
    if now >= option.expiry {
        return Err(Error::OptionExpired {
            option_id: option.id,
            expiry: option.expiry,
            now,
        });
    }
    Ok(())
}
