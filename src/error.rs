//! Error types for the prediction market engines

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::MarketKey;

/// Coarse classification of a failure, stable enough for callers to branch on
/// (retry, user-facing message, bug report).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidArgument,
    StateConflict,
    InsufficientFunds,
    AlreadyClaimed,
    /// A ledger or engine invariant would have been broken
    Internal,
    /// The durable store rejected the write; safe to retry
    Unavailable,
}

/// Errors returned by market commands and queries
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MarketError {
    // === Lookup ===
    #[error("Market {0} not found")]
    NotFound(MarketKey),

    // === Simple market arguments ===
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid title: must not be blank")]
    InvalidTitle,

    #[error("Bet amount must be greater than 0")]
    InvalidStake,

    #[error("Invalid choice {choice}: market has {options} options")]
    InvalidChoice { choice: usize, options: usize },

    #[error("Invalid winning option {option}: market has {options} options")]
    InvalidOption { option: usize, options: usize },

    #[error("No player picked option {0}")]
    NoPlayerForOption(usize),

    // === Lifecycle ===
    #[error("Market {0} is not waiting for a second player")]
    NotJoinable(MarketKey),

    #[error("Market {0} is not active")]
    NotActive(MarketKey),

    #[error("Market {0} is not resolved")]
    NotResolved(MarketKey),

    #[error("Referenced topics not resolved yet: {0:?}")]
    ReferencedTopicsUnresolved(Vec<u64>),

    // === Authorization ===
    #[error("Creator cannot join own topic")]
    SelfJoinForbidden,

    #[error("{caller} is not allowed to {action} market {market}")]
    Unauthorized {
        caller: String,
        action: &'static str,
        market: MarketKey,
    },

    // === Composite market arguments ===
    #[error("At least {minimum} topics required, got {count}")]
    TooFewTopics { count: usize, minimum: usize },

    #[error("At most {maximum} topics can be combined, got {count}")]
    TooManyTopics { count: usize, maximum: usize },

    #[error("Topic {0} cannot be referenced by a composite market")]
    InvalidReference(u64),

    #[error("Minimum bet amount must be greater than 0")]
    InvalidMinBet,

    #[error("Too many combinations ({count}), maximum allowed: {cap}")]
    TooManyCombinations { count: usize, cap: usize },

    #[error("Bet {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    // === Claims ===
    #[error("{0} has no stake on the winning option")]
    NoWinningStake(String),

    #[error("{caller} already claimed from market {market}")]
    AlreadyClaimed { caller: String, market: MarketKey },

    // === Funds ===
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("Amount must be greater than 0")]
    InvalidAmount,

    #[error("Wallet address must not be blank")]
    InvalidAddress,

    #[error("Escrow of market {market} holds {held}, cannot release {requested}")]
    EscrowShortfall {
        market: MarketKey,
        held: Decimal,
        requested: Decimal,
    },

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    // === Infrastructure ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        use MarketError::*;
        match self {
            NotFound(_) => ErrorKind::NotFound,
            SelfJoinForbidden | Unauthorized { .. } => ErrorKind::Unauthorized,
            InvalidOptions(_)
            | InvalidTitle
            | InvalidStake
            | InvalidChoice { .. }
            | InvalidOption { .. }
            | NoPlayerForOption(_)
            | TooFewTopics { .. }
            | TooManyTopics { .. }
            | InvalidReference(_)
            | InvalidMinBet
            | TooManyCombinations { .. }
            | BelowMinimum { .. }
            | NoWinningStake(_)
            | InvalidAmount
            | InvalidAddress => ErrorKind::InvalidArgument,
            NotJoinable(_) | NotActive(_) | NotResolved(_) | ReferencedTopicsUnresolved(_) => {
                ErrorKind::StateConflict
            }
            InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            EscrowShortfall { .. } | ArithmeticOverflow => ErrorKind::Internal,
            Storage(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl From<sled::Error> for MarketError {
    fn from(err: sled::Error) -> Self {
        MarketError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Storage(format!("corrupt record: {}", err))
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        let key = MarketKey::Simple(1);
        assert_eq!(MarketError::NotFound(key).kind(), ErrorKind::NotFound);
        assert_eq!(MarketError::SelfJoinForbidden.kind(), ErrorKind::Unauthorized);
        assert_eq!(MarketError::NotResolved(key).kind(), ErrorKind::StateConflict);
        assert_eq!(
            MarketError::ReferencedTopicsUnresolved(vec![2]).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            MarketError::InvalidOptions("one option".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            MarketError::AlreadyClaimed { caller: "BOB".into(), market: key }.kind(),
            ErrorKind::AlreadyClaimed
        );
    }

    #[test]
    fn test_only_storage_is_transient() {
        assert!(MarketError::Storage("disk full".into()).is_transient());
        assert!(!MarketError::InvalidStake.is_transient());
    }
}
