//! End-to-end option lifecycles through the wired engine

use std::sync::Arc;
use std::thread;

use exproduce::clock::ManualClock;
use exproduce::core::{
    AccountId, Amount, Config, CreateOptionParams, OptionId, OptionStatus, Timestamp, TokenLedger,
};
use exproduce::token::InMemoryToken;
use exproduce::{Engine, Error, Event, EventLog};

const START: Timestamp = 1_700_000_000;
const DAY: i64 = 86_400;
const FUNDING: Amount = 1_000_000;

struct Harness {
    engine: Engine,
    token: Arc<InMemoryToken>,
    clock: Arc<ManualClock>,
    events: Arc<EventLog>,
}

fn acct(s: &str) -> AccountId {
    AccountId::new(s)
}

fn harness() -> Harness {
    let token = Arc::new(InMemoryToken::new("USDC", 6));
    let clock = Arc::new(ManualClock::new(START));
    let events = Arc::new(EventLog::new());
    let engine = Engine::new(&Config::default(), token.clone(), clock.clone(), events.clone())
        .expect("default config is valid");

    for who in ["farmer", "bank", "trader", "trader2"] {
        token.mint(&acct(who), FUNDING).unwrap();
        token.approve(&acct(who), engine.custody_account(), FUNDING);
    }

    Harness {
        engine,
        token,
        clock,
        events,
    }
}

impl Harness {
    fn balance(&self, who: &str) -> Amount {
        self.token.balance_of(&acct(who))
    }

    /// Scenario A option: strike 10000, premium 1000, quantity 5, 30 days
    fn issue(&self) -> OptionId {
        self.engine
            .registry
            .create_option(
                &acct("farmer"),
                CreateOptionParams {
                    counterparty: acct("bank"),
                    strike_price: 10_000,
                    premium: 1_000,
                    expiry: START + 30 * DAY,
                    quantity: 5,
                    underlying: "Wheat".to_string(),
                },
            )
            .unwrap()
            .id
    }

    fn assert_conserved(&self) {
        let total: Amount = ["farmer", "bank", "trader", "trader2"]
            .iter()
            .map(|w| self.balance(w))
            .sum::<Amount>()
            + self.token.balance_of(self.engine.custody_account());
        assert_eq!(total, 4 * FUNDING);
        assert_eq!(self.token.total_supply(), 4 * FUNDING);

        let escrow = &self.engine.escrow;
        assert_eq!(escrow.custody_balance(), escrow.total_received() - escrow.total_paid_out());
        assert_eq!(escrow.custody_balance(), self.token.balance_of(escrow.custody_account()));
    }
}

#[test]
fn scenario_a_issue_pays_premium() {
    let h = harness();
    let id = h.issue();

    assert_eq!(h.balance("farmer"), FUNDING + 1_000);
    assert_eq!(h.balance("bank"), FUNDING - 1_000);

    let option = h.engine.registry.get_option(id).unwrap();
    assert_eq!(option.status, OptionStatus::Active);
    assert_eq!(option.holder, acct("farmer"));
    assert_eq!(
        h.events.events(),
        vec![Event::OptionCreated {
            id,
            issuer: acct("farmer"),
            counterparty: acct("bank"),
            strike_price: 10_000,
            premium: 1_000,
            expiry: START + 30 * DAY,
            quantity: 5,
            underlying: "Wheat".to_string(),
        }]
    );
    h.assert_conserved();
}

#[test]
fn scenario_b_resale_moves_rights_and_payment() {
    let h = harness();
    let id = h.issue();

    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();
    h.engine.market.buy_option(&acct("trader"), listing.id).unwrap();

    assert_eq!(h.balance("farmer"), FUNDING + 1_000 + 1_500);
    assert_eq!(h.balance("trader"), FUNDING - 1_500);
    assert_eq!(h.engine.registry.get_option(id).unwrap().holder, acct("trader"));
    assert!(!h.engine.market.get_active_listing(listing.id).unwrap().active);

    let names: Vec<_> = h.events.events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["OptionCreated", "OptionListed", "OptionSold"]);
    h.assert_conserved();
}

#[test]
fn scenario_c_new_holder_exercises_once() {
    let h = harness();
    let id = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();
    h.engine.market.buy_option(&acct("trader"), listing.id).unwrap();

    // The issuer sold the rights and can no longer exercise
    assert!(matches!(
        h.engine.registry.exercise_option(&acct("farmer"), id),
        Err(Error::NotHolder { .. })
    ));

    let option = h.engine.registry.exercise_option(&acct("trader"), id).unwrap();
    assert_eq!(option.status, OptionStatus::Exercised);
    assert_eq!(h.balance("bank"), FUNDING - 1_000 - 50_000);
    assert_eq!(h.balance("trader"), FUNDING - 1_500 + 50_000);

    assert_eq!(
        h.engine.registry.exercise_option(&acct("trader"), id),
        Err(Error::AlreadyResolved(id))
    );
    assert_eq!(h.balance("trader"), FUNDING - 1_500 + 50_000);
    h.assert_conserved();
}

#[test]
fn scenario_d_issuer_cancels_after_expiry() {
    let h = harness();
    let id = h.issue();
    let before = (h.balance("farmer"), h.balance("bank"));

    h.clock.set(START + 31 * DAY);
    let option = h.engine.registry.cancel_option(&acct("farmer"), id).unwrap();

    assert_eq!(option.status, OptionStatus::Cancelled);
    assert_eq!((h.balance("farmer"), h.balance("bank")), before);
    assert_eq!(
        h.events.events().last(),
        Some(&Event::OptionCancelled {
            id,
            issuer: acct("farmer"),
        })
    );
    h.assert_conserved();
}

#[test]
fn scenario_e_expired_listing_is_stale() {
    let h = harness();
    let id = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();

    h.clock.set(START + 30 * DAY + 1);
    assert_eq!(
        h.engine.market.buy_option(&acct("trader"), listing.id),
        Err(Error::StaleListing(listing.id))
    );

    assert!(!h.engine.market.get_active_listing(listing.id).unwrap().active);
    assert_eq!(h.balance("trader"), FUNDING);
    assert_eq!(h.engine.registry.get_option(id).unwrap().holder, acct("farmer"));
    h.assert_conserved();
}

#[test]
fn exercise_expiry_boundary_is_inclusive() {
    let h = harness();
    let on_time = h.issue();
    let late = h.issue();

    h.clock.set(START + 30 * DAY);
    h.engine.registry.exercise_option(&acct("farmer"), on_time).unwrap();

    h.clock.set(START + 30 * DAY + 1);
    assert!(matches!(
        h.engine.registry.exercise_option(&acct("farmer"), late),
        Err(Error::OptionExpired { .. })
    ));
    assert_eq!(
        h.engine.registry.get_option(late).unwrap().status,
        OptionStatus::Active
    );
}

#[test]
fn live_traded_option_cannot_be_cancelled() {
    let h = harness();
    let id = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();
    h.engine.market.buy_option(&acct("trader"), listing.id).unwrap();

    assert_eq!(
        h.engine.registry.cancel_option(&acct("farmer"), id),
        Err(Error::OptionStillTradedAndLive(id))
    );
}

#[test]
fn failed_purchase_changes_nothing() {
    let h = harness();
    let id = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();
    h.token.approve(&acct("trader"), h.engine.custody_account(), 1_499);
    let events_before = h.events.len();

    let err = h.engine.market.buy_option(&acct("trader"), listing.id).unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));

    assert!(h.engine.market.get_active_listing(listing.id).unwrap().active);
    assert_eq!(h.engine.registry.get_option(id).unwrap().holder, acct("farmer"));
    assert_eq!(h.balance("trader"), FUNDING);
    assert_eq!(h.balance("farmer"), FUNDING + 1_000);
    assert_eq!(h.events.len(), events_before);
    h.assert_conserved();
}

#[test]
fn rejecting_second_listing_for_same_option() {
    let h = harness();
    let id = h.issue();
    let first = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();

    assert_eq!(
        h.engine.market.list_option(&acct("farmer"), id, 2_000),
        Err(Error::DuplicateActiveListing {
            option_id: id,
            listing_id: first.id,
        })
    );
    assert_eq!(h.engine.market.active_listings().len(), 1);
}

#[test]
fn terminal_options_reject_every_mutation() {
    let h = harness();
    let id = h.issue();
    h.engine.registry.cancel_option(&acct("farmer"), id).unwrap();
    let market_account = h.engine.market.account().clone();

    assert_eq!(
        h.engine.registry.exercise_option(&acct("farmer"), id),
        Err(Error::AlreadyResolved(id))
    );
    assert_eq!(
        h.engine.registry.cancel_option(&acct("farmer"), id),
        Err(Error::AlreadyResolved(id))
    );
    assert_eq!(
        h.engine.registry.reassign_holder(&market_account, id, acct("trader")),
        Err(Error::AlreadyResolved(id))
    );
    assert_eq!(
        h.engine.market.list_option(&acct("farmer"), id, 1),
        Err(Error::AlreadyResolved(id))
    );
}

#[test]
fn concurrent_exercise_settles_exactly_once() {
    let h = Arc::new(harness());
    let id = h.issue();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            thread::spawn(move || h.engine.registry.exercise_option(&acct("farmer"), id))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == Error::AlreadyResolved(id)));

    assert_eq!(h.balance("bank"), FUNDING - 1_000 - 50_000);
    h.assert_conserved();
}

#[test]
fn concurrent_buyers_one_wins() {
    let h = Arc::new(harness());
    let id = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), id, 1_500).unwrap();

    let handles: Vec<_> = ["trader", "trader2"]
        .into_iter()
        .map(|buyer| {
            let h = h.clone();
            thread::spawn(move || h.engine.market.buy_option(&acct(buyer), listing.id))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == Error::ListingInactive(listing.id)));

    assert_eq!(h.balance("farmer"), FUNDING + 1_000 + 1_500);
    assert_eq!(h.balance("trader") + h.balance("trader2"), 2 * FUNDING - 1_500);
    h.assert_conserved();
}

#[test]
fn seller_cannot_relist_while_own_sale_completes() {
    let h = Arc::new(harness());

    for _ in 0..50 {
        let id = h.issue();
        let listing = h.engine.market.list_option(&acct("farmer"), id, 10).unwrap();

        let buyer = {
            let h = h.clone();
            thread::spawn(move || h.engine.market.buy_option(&acct("trader"), listing.id))
        };
        let relist = {
            let h = h.clone();
            thread::spawn(move || h.engine.market.list_option(&acct("farmer"), id, 20))
        };

        buyer.join().unwrap().unwrap();
        match relist.join().unwrap() {
            Err(Error::DuplicateActiveListing { .. } | Error::NotHolder { .. }) => {}
            other => panic!("farmer relisted a sold option: {:?}", other),
        }
        assert!(h.engine.market.active_listing_for(id).is_none());
    }

    assert!(h.engine.market.active_listings().is_empty());
    h.assert_conserved();
}

#[test]
fn lookups_by_participant() {
    let h = harness();
    let a = h.issue();
    let b = h.issue();
    let listing = h.engine.market.list_option(&acct("farmer"), b, 100).unwrap();
    h.engine.market.buy_option(&acct("trader"), listing.id).unwrap();

    let issued: Vec<_> = h
        .engine
        .registry
        .options_by_issuer(&acct("farmer"))
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(issued, vec![a, b]);
    assert_eq!(h.engine.registry.options_by_counterparty(&acct("bank")).len(), 2);
    assert_eq!(h.engine.registry.options_held_by(&acct("trader"))[0].id, b);
    assert!(h.engine.market.active_listing_for(b).is_none());
}
