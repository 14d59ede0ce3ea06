//! Engine - wires escrow, registry and market from a config
//!
//! No globals: hosts construct one `Engine` and pass it (or its parts) to
//! whatever handles each call.

use std::sync::Arc;
use tracing::info;

use crate::core::{AccountId, Clock, Config, EventSink, Result, TokenLedger};
use crate::escrow::EscrowLedger;
use crate::market::Market;
use crate::registry::OptionsRegistry;

pub struct Engine {
    pub escrow: Arc<EscrowLedger>,
    pub registry: Arc<OptionsRegistry>,
    pub market: Arc<Market>,
}

impl Engine {
    /// Build all components and authorize the market against the registry.
    pub fn new(
        config: &Config,
        token: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let owner = AccountId::new(config.registry.owner.as_str());
        let market_account = AccountId::new(config.market.account.as_str());

        let escrow = Arc::new(EscrowLedger::new(
            token,
            AccountId::new(config.escrow.custody_account.as_str()),
        ));
        let registry = Arc::new(OptionsRegistry::new(
            escrow.clone(),
            clock.clone(),
            events.clone(),
            owner.clone(),
        ));
        registry.set_market(&owner, market_account.clone())?;

        let market = Arc::new(Market::new(
            market_account,
            registry.clone(),
            escrow.clone(),
            clock,
            events,
        ));

        info!(
            "Engine ready: custody {}, market {}, token {}",
            escrow.custody_account(),
            market.account(),
            escrow.token().symbol()
        );

        Ok(Self {
            escrow,
            registry,
            market,
        })
    }

    /// Account participants approve before the engine can pull their funds
    pub fn custody_account(&self) -> &AccountId {
        self.escrow.custody_account()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::core::Error;
    use crate::events::EventLog;
    use crate::token::InMemoryToken;

    #[test]
    fn test_engine_authorizes_market() {
        let config = Config::default();
        let engine = Engine::new(
            &config,
            Arc::new(InMemoryToken::new("USDC", 6)),
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::new()),
        )
        .unwrap();

        assert_eq!(engine.registry.market(), Some(engine.market.account().clone()));
        assert_eq!(engine.custody_account().as_str(), "exproduce:escrow");
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = Config::default();
        config.market.account = String::new();

        let result = Engine::new(
            &config,
            Arc::new(InMemoryToken::new("USDC", 6)),
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
