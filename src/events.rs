//! Engine events - one per successful mutating operation
//!
//! Each event carries enough fields for an indexer to rebuild state without
//! querying the registry or market.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{AccountId, Amount, EventSink, ListingId, OptionId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum Event {
    OptionCreated {
        id: OptionId,
        issuer: AccountId,
        counterparty: AccountId,
        strike_price: Amount,
        premium: Amount,
        expiry: Timestamp,
        quantity: u64,
        underlying: String,
    },
    OptionExercised {
        id: OptionId,
        holder: AccountId,
        counterparty: AccountId,
        amount: Amount,
    },
    OptionCancelled {
        id: OptionId,
        issuer: AccountId,
    },
    OptionListed {
        listing_id: ListingId,
        option_id: OptionId,
        seller: AccountId,
        ask_price: Amount,
    },
    OptionSold {
        listing_id: ListingId,
        option_id: OptionId,
        seller: AccountId,
        new_holder: AccountId,
        price: Amount,
    },
    ListingWithdrawn {
        listing_id: ListingId,
        option_id: OptionId,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OptionCreated { .. } => "OptionCreated",
            Event::OptionExercised { .. } => "OptionExercised",
            Event::OptionCancelled { .. } => "OptionCancelled",
            Event::OptionListed { .. } => "OptionListed",
            Event::OptionSold { .. } => "OptionSold",
            Event::ListingWithdrawn { .. } => "ListingWithdrawn",
        }
    }

    /// JSON line for log shipping
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// In-memory event log
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Take all events, leaving the log empty
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Streams events to a consumer; a dropped receiver never fails the engine.
impl EventSink for flume::Sender<Event> {
    fn emit(&self, event: Event) {
        if let Err(e) = self.send(event) {
            warn!("Event receiver disconnected, dropping {}", e.into_inner().name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled(id: u64) -> Event {
        Event::OptionCancelled {
            id: OptionId::new(id),
            issuer: AccountId::new("farmer"),
        }
    }

    #[test]
    fn test_log_drain() {
        let log = EventLog::new();
        log.emit(cancelled(1));
        log.emit(cancelled(2));
        assert_eq!(log.len(), 2);

        let drained = log.drain();
        assert_eq!(drained, vec![cancelled(1), cancelled(2)]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_flume_sink() {
        let (tx, rx) = flume::unbounded();
        tx.emit(cancelled(7));
        assert_eq!(rx.try_recv().unwrap(), cancelled(7));

        drop(rx);
        // Must not panic once the indexer is gone
        tx.emit(cancelled(8));
    }

    #[test]
    fn test_json_is_tagged() {
        let json = Event::OptionListed {
            listing_id: ListingId::new(1),
            option_id: OptionId::new(4),
            seller: AccountId::new("farmer"),
            ask_price: 1_500,
        }
        .to_json()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "OptionListed");
        assert_eq!(value["option_id"], 4);
        assert_eq!(value["seller"], "farmer");
    }
}
