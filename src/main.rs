//! Exproduce - walkthrough of one option's life on an in-memory token
//!
//! Farmer issues to a bank, lists on the market, a trader buys, the trader
//! exercises. Events stream to stdout as JSON lines.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use exproduce::Engine;
use exproduce::clock::SystemClock;
use exproduce::core::{AccountId, Clock, Config, CreateOptionParams, TokenLedger, format_units};
use exproduce::events::Event;
use exproduce::token::InMemoryToken;

const DAY: i64 = 86_400;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Config picks the log level, so it loads before the subscriber exists
    let (config, source) = match std::env::var("EXPRODUCE_CONFIG") {
        Ok(path) => {
            let config = Config::load(&PathBuf::from(&path))
                .with_context(|| format!("loading config from {}", path))?;
            (config, Some(path))
        }
        Err(_) => match Config::discover() {
            Some((config, path)) => (config, Some(path.to_string())),
            None => (Config::default(), None),
        },
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},exproduce=debug", config.app.log_level)));
    fmt().with_env_filter(filter).with_target(true).init();

    match source {
        Some(path) => tracing::info!("Loaded config from {}", path),
        None => tracing::warn!("No config.toml found, using defaults"),
    }

    tracing::info!("Exproduce starting (token {})", config.token.symbol);

    let decimals = config.token.decimals;
    let units = |whole: u64| -> anyhow::Result<u64> {
        10u64
            .checked_pow(decimals)
            .and_then(|unit| unit.checked_mul(whole))
            .context("token decimals too large for demo amounts")
    };
    let token = Arc::new(InMemoryToken::new(config.token.symbol.clone(), decimals));
    let clock = Arc::new(SystemClock::new());

    let (tx, rx) = flume::unbounded::<Event>();
    let printer = std::thread::spawn(move || {
        for event in rx.iter() {
            match event.to_json() {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to encode {}: {}", event.name(), e),
            }
        }
    });

    let engine = Engine::new(&config, token.clone(), clock.clone(), Arc::new(tx))?;
    let custody = engine.custody_account().clone();

    let farmer = AccountId::new("farmer");
    let bank = AccountId::new("bank");
    let trader = AccountId::new("trader");

    for who in [&farmer, &bank, &trader] {
        token.mint(who, units(10_000)?)?;
        token.approve(who, &custody, units(10_000)?);
    }

    let option = engine.registry.create_option(
        &farmer,
        CreateOptionParams {
            counterparty: bank.clone(),
            strike_price: units(100)?,
            premium: units(10)?,
            expiry: clock.now() + 30 * DAY,
            quantity: 10,
            underlying: "Corn".to_string(),
        },
    )?;

    let listing = engine.market.list_option(&farmer, option.id, units(15)?)?;
    engine.market.buy_option(&trader, listing.id)?;
    let settled = engine.registry.exercise_option(&trader, option.id)?;

    tracing::info!(
        "Option {} is {} (holder {})",
        settled.id,
        settled.status,
        settled.holder
    );
    for who in [&farmer, &bank, &trader] {
        tracing::info!(
            "{:>8}: {} {}",
            who,
            format_units(token.balance_of(who), decimals),
            token.symbol()
        );
    }
    tracing::info!(
        "Custody: {} (in {}, out {})",
        engine.escrow.custody_balance(),
        engine.escrow.total_received(),
        engine.escrow.total_paid_out()
    );

    // Dropping the engine closes the event channel
    drop(engine);
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("event printer panicked"))?;

    Ok(())
}
