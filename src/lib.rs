/// Duel Prediction Market
/// Two-party topics, cross-product composite markets and the funds ledger
/// behind them, plus the HTTP service exposing them.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod market_resolve;
pub mod models;
pub mod registry;
pub mod routes;
pub mod storage;

pub use app_state::{AppState, Committed, CreatorMarkets, Session, SharedState, WalletInfo};
pub use config::{ConfigError, MarketConfig};
pub use error::{ErrorKind, MarketError, MarketResult};
pub use events::{EventBus, MarketAction, MarketEvent};
pub use ledger::{Balance, Ledger, LedgerStats, Transaction, TxType};
pub use market_resolve::{
    combination_count, combination_index, combination_outcomes, combine_options, MarketBook,
    MarketPolicy, DEFAULT_MAX_COMBINATIONS, MAX_REFERENCED_TOPICS, MIN_REFERENCED_TOPICS,
};
pub use models::{
    CompositeBet, CompositeTopic, MarketKey, OptionBetInfo, Topic, TopicStatus,
};
pub use registry::{Record, Registry};
pub use routes::build_router;
pub use storage::{ChangeSet, MarketPersistence, MarketStore};
