//! Exproduce - Core Library
//! Harvest options: issuance, secondary resale and escrow settlement

// Public modules
pub mod core;
pub mod clock;
pub mod engine;
pub mod escrow;
pub mod events;
pub mod market;
pub mod registry;
pub mod token;

// Re-exports
pub use self::core::{Config, Error, ErrorKind, Result};
pub use engine::Engine;
pub use escrow::EscrowLedger;
pub use events::{Event, EventLog};
pub use market::Market;
pub use registry::OptionsRegistry;
