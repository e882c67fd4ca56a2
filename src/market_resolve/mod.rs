// ============================================================================
// Market Resolve Module - Core Market & Settlement Logic
// ============================================================================
//
// This module contains the market state machines:
//   - markets: two-party topics (create, join, resolve, claim)
//   - composite: cross-product markets (create, bet, resolve, claim)
//   - combinations: cross-product option generation and indexing
//
// Both engines are implemented on `MarketBook`, which owns the two registries
// and the shared funds ledger. Every command validates all of its
// preconditions before the first mutation, and the ledger movement is the
// only fallible step after validation, so a failed command leaves the book
// untouched.
//
// ============================================================================

pub mod combinations;
pub mod composite;
pub mod markets;

pub use combinations::*;
pub use composite::*;

use rust_decimal::Decimal;

use crate::ledger::{Balance, Ledger};
use crate::models::{CompositeTopic, MarketKey, Topic, TopicStatus};
use crate::registry::Registry;

/// Default cap on combined options per composite market
pub const DEFAULT_MAX_COMBINATIONS: usize = 16;

/// Engine-facing policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketPolicy {
    pub max_combinations: usize,
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            max_combinations: DEFAULT_MAX_COMBINATIONS,
        }
    }
}

/// Registries plus the shared ledger: the complete market state.
#[derive(Debug, Clone, Default)]
pub struct MarketBook {
    pub(crate) topics: Registry<Topic>,
    pub(crate) composites: Registry<CompositeTopic>,
    pub(crate) ledger: Ledger,
    pub(crate) policy: MarketPolicy,
    /// Ordering token of the last committed command
    pub(crate) sequence: u64,
}

impl MarketBook {
    pub fn new(policy: MarketPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(
        topics: Registry<Topic>,
        composites: Registry<CompositeTopic>,
        ledger: Ledger,
        policy: MarketPolicy,
        sequence: u64,
    ) -> Self {
        Self {
            topics,
            composites,
            ledger,
            policy,
            sequence,
        }
    }

    pub fn policy(&self) -> MarketPolicy {
        self.policy
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn topics(&self) -> &Registry<Topic> {
        &self.topics
    }

    pub fn composites(&self) -> &Registry<CompositeTopic> {
        &self.composites
    }

    /// Simple topics that may be referenced by a new composite market
    pub fn topics_eligible_for_composite(&self) -> Vec<&Topic> {
        self.topics
            .list_all()
            .filter(|t| t.is_eligible_for_composite())
            .collect()
    }

    /// Escrow each market should still hold: the pool minus what was paid.
    pub(crate) fn expected_escrow(&self, market: MarketKey) -> Decimal {
        match market {
            MarketKey::Simple(id) => self
                .topics
                .get(id)
                .map(|t| match t.status {
                    TopicStatus::Claimed => Decimal::ZERO,
                    _ => t.total_pool,
                })
                .unwrap_or(Decimal::ZERO),
            MarketKey::Composite(id) => self
                .composites
                .get(id)
                .map(|c| c.total_pool - c.paid_out)
                .unwrap_or(Decimal::ZERO),
        }
    }

    /// Total escrow equals the sum of every pool not yet paid out.
    pub(crate) fn escrow_is_balanced(&self) -> bool {
        let markets = self
            .topics
            .list_all()
            .map(|t| t.key())
            .chain(self.composites.list_all().map(|c| c.key()));

        let mut expected_total = Decimal::ZERO;
        for market in markets {
            let expected = self.expected_escrow(market);
            if self.ledger.escrowed(market) != expected {
                return false;
            }
            expected_total += expected;
        }
        self.ledger.total_escrowed() == expected_total
    }

    /// Capture what a command touching `market` and `accounts` may change.
    pub(crate) fn checkpoint(&self, market: Option<MarketKey>, accounts: &[&str]) -> Checkpoint {
        Checkpoint {
            sequence: self.sequence,
            next_topic_id: self.topics.next_id(),
            next_composite_id: self.composites.next_id(),
            topic: match market {
                Some(MarketKey::Simple(id)) => self.topics.get(id).ok().cloned(),
                _ => None,
            },
            composite: match market {
                Some(MarketKey::Composite(id)) => self.composites.get(id).ok().cloned(),
                _ => None,
            },
            escrow: market.map(|m| (m, self.ledger.escrow_entry(m))),
            accounts: accounts
                .iter()
                .map(|a| (a.to_string(), self.ledger.balance_info(a).cloned()))
                .collect(),
            journal_len: self.ledger.journal_len(),
        }
    }

    /// Undo everything since `checkpoint`. `created` names a market the
    /// command created, whose escrow did not exist at checkpoint time.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint, created: Option<MarketKey>) {
        self.sequence = checkpoint.sequence;
        self.topics.rollback_to(checkpoint.next_topic_id);
        self.composites.rollback_to(checkpoint.next_composite_id);
        if let Some(topic) = checkpoint.topic {
            self.topics.replace(topic);
        }
        if let Some(composite) = checkpoint.composite {
            self.composites.replace(composite);
        }
        if let Some((market, held)) = checkpoint.escrow {
            self.ledger.restore_escrow(market, held);
        }
        if let Some(market) = created {
            self.ledger.restore_escrow(market, None);
        }
        for (account, balance) in checkpoint.accounts {
            self.ledger.restore_account(&account, balance);
        }
        self.ledger.truncate_journal(checkpoint.journal_len);
    }
}

/// Pre-command copy of everything one command can touch
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    sequence: u64,
    next_topic_id: u64,
    next_composite_id: u64,
    topic: Option<Topic>,
    composite: Option<CompositeTopic>,
    escrow: Option<(MarketKey, Option<Decimal>)>,
    accounts: Vec<(String, Option<Balance>)>,
    journal_len: usize,
}
