// Data models for the duel prediction market

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Minimum number of options on a simple topic
pub const MIN_OPTIONS: usize = 2;

/// Number of player slots on a simple topic (creator + one joiner)
pub const PLAYER_SLOTS: usize = 2;

// ============================================================================
// MARKET KEY
// ============================================================================

/// Identifies a market across both numbering spaces.
///
/// Simple topics and composite markets each count ids from 1, so an id alone
/// is ambiguous; every lookup, escrow account and event carries the kind too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MarketKey {
    Simple(u64),
    Composite(u64),
}

impl MarketKey {
    pub fn id(&self) -> u64 {
        match self {
            MarketKey::Simple(id) | MarketKey::Composite(id) => *id,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKey::Simple(id) => write!(f, "topic-{}", id),
            MarketKey::Composite(id) => write!(f, "composite-{}", id),
        }
    }
}

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle of a market. Ordered, so `status >= Resolved` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicStatus {
    WaitingForSecondPlayer,
    Active,
    Resolved,
    Claimed,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::WaitingForSecondPlayer => "WAITING_FOR_SECOND_PLAYER",
            TopicStatus::Active => "ACTIVE",
            TopicStatus::Resolved => "RESOLVED",
            TopicStatus::Claimed => "CLAIMED",
        }
    }

    pub fn is_settled(&self) -> bool {
        *self >= TopicStatus::Resolved
    }
}

// ============================================================================
// SIMPLE MARKET (TOPIC)
// ============================================================================

/// Two-party market: the creator and one joiner stake the same amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: u64,
    pub creator: String,
    pub title: String,
    pub options: Vec<String>,
    pub bet_amount: Decimal,
    pub players: [Option<String>; PLAYER_SLOTS],
    pub player_choices: [Option<usize>; PLAYER_SLOTS],
    pub total_pool: Decimal,
    pub status: TopicStatus,
    pub winning_option: Option<usize>,
    pub winner: Option<String>,
    /// Amount paid out on claim; the pool itself is zeroed
    #[serde(default)]
    pub claimed_amount: Option<Decimal>,
    pub created_at: u64,
}

impl Topic {
    pub fn new(
        id: u64,
        creator: String,
        title: String,
        options: Vec<String>,
        bet_amount: Decimal,
        creator_choice: usize,
    ) -> Self {
        Self {
            id,
            players: [Some(creator.clone()), None],
            player_choices: [Some(creator_choice), None],
            creator,
            title,
            options,
            bet_amount,
            total_pool: bet_amount,
            status: TopicStatus::WaitingForSecondPlayer,
            winning_option: None,
            winner: None,
            claimed_amount: None,
            created_at: now(),
        }
    }

    pub fn key(&self) -> MarketKey {
        MarketKey::Simple(self.id)
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_some()).count()
    }

    /// Both seats filled with the same pick
    pub fn is_push(&self) -> bool {
        match self.player_choices {
            [Some(a), Some(b)] => a == b,
            _ => false,
        }
    }

    /// The player whose recorded choice equals `option`, if any.
    pub fn player_with_choice(&self, option: usize) -> Option<&str> {
        self.players
            .iter()
            .zip(self.player_choices.iter())
            .find(|(_, choice)| **choice == Some(option))
            .and_then(|(player, _)| player.as_deref())
    }

    /// Non-composite, still open, and at least two options.
    pub fn is_eligible_for_composite(&self) -> bool {
        matches!(
            self.status,
            TopicStatus::WaitingForSecondPlayer | TopicStatus::Active
        ) && self.options.len() >= MIN_OPTIONS
    }
}

// ============================================================================
// COMPOSITE MARKET
// ============================================================================

/// A single bet on one combined option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeBet {
    pub bettor: String,
    pub amount: Decimal,
    pub option_index: usize,
    pub timestamp: u64,
}

/// Market over the cross-product of several topics' outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeTopic {
    pub id: u64,
    pub creator: String,
    pub title: String,
    pub referenced_topic_ids: Vec<u64>,
    pub combined_options: Vec<String>,
    pub min_bet_amount: Decimal,
    pub total_pool: Decimal,
    pub status: TopicStatus,
    pub winning_option: Option<usize>,
    pub created_at: u64,
    pub total_bets: Vec<Decimal>,
    /// bettor -> stake per option index
    pub user_bets: BTreeMap<String, Vec<Decimal>>,
    pub bets: Vec<CompositeBet>,
    pub claimed: BTreeSet<String>,
    pub paid_out: Decimal,
}

impl CompositeTopic {
    pub fn new(
        id: u64,
        creator: String,
        title: String,
        referenced_topic_ids: Vec<u64>,
        combined_options: Vec<String>,
        min_bet_amount: Decimal,
    ) -> Self {
        let option_count = combined_options.len();
        Self {
            id,
            creator,
            title,
            referenced_topic_ids,
            combined_options,
            min_bet_amount,
            total_pool: Decimal::ZERO,
            status: TopicStatus::Active,
            winning_option: None,
            created_at: now(),
            total_bets: vec![Decimal::ZERO; option_count],
            user_bets: BTreeMap::new(),
            bets: Vec::new(),
            claimed: BTreeSet::new(),
            paid_out: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> MarketKey {
        MarketKey::Composite(self.id)
    }

    pub fn user_bet(&self, bettor: &str, option_index: usize) -> Decimal {
        self.user_bets
            .get(bettor)
            .and_then(|stakes| stakes.get(option_index))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn option_total(&self, option_index: usize) -> Decimal {
        self.total_bets
            .get(option_index)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub(crate) fn record_bet(&mut self, bettor: &str, option_index: usize, amount: Decimal) {
        let option_count = self.combined_options.len();
        let stakes = self
            .user_bets
            .entry(bettor.to_string())
            .or_insert_with(|| vec![Decimal::ZERO; option_count]);
        stakes[option_index] += amount;
        self.total_bets[option_index] += amount;
        self.total_pool += amount;
        self.bets.push(CompositeBet {
            bettor: bettor.to_string(),
            amount,
            option_index,
            timestamp: now(),
        });
    }

    /// Aggregates for every option, with `viewer`'s own stake filled in.
    pub fn option_bet_info(&self, viewer: Option<&str>) -> Vec<OptionBetInfo> {
        self.combined_options
            .iter()
            .enumerate()
            .map(|(option_index, text)| {
                let total_bets = self.option_total(option_index);
                let percentage = if self.total_pool > Decimal::ZERO {
                    (total_bets * Decimal::ONE_HUNDRED / self.total_pool).round_dp(2)
                } else {
                    Decimal::ZERO
                };
                OptionBetInfo {
                    option_index,
                    option_text: text.clone(),
                    total_bets,
                    user_bets: viewer
                        .map(|v| self.user_bet(v, option_index))
                        .unwrap_or(Decimal::ZERO),
                    percentage,
                }
            })
            .collect()
    }
}

/// Per-option aggregate for a composite market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionBetInfo {
    pub option_index: usize,
    pub option_text: String,
    pub total_bets: Decimal,
    pub user_bets: Decimal,
    pub percentage: Decimal,
}

// ============================================================================
// REQUEST STRUCTS
// ============================================================================

/// POST /topics request body
///
/// ```json
/// { "title": "Who walks in first?", "options": ["Man", "Woman"], "bet_amount": "1.0", "choice": 0 }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub title: String,
    pub options: Vec<String>,
    pub bet_amount: Decimal,
    pub choice: usize,
}

#[derive(Debug, Deserialize)]
pub struct JoinTopicRequest {
    pub choice: usize,
}

#[derive(Debug, Deserialize)]
pub struct ResolveTopicRequest {
    pub winning_option: usize,
}

/// POST /composites request body
#[derive(Debug, Deserialize)]
pub struct CreateCompositeRequest {
    pub title: String,
    pub referenced_topic_ids: Vec<u64>,
    pub min_bet_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CompositeBetRequest {
    pub option_index: usize,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: Decimal,
}

pub(crate) fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
