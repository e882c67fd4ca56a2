// ============================================================================
// Composite Markets - cross-product betting
// ============================================================================
//
// A composite market references 2..=5 simple topics. Its options are the
// cross-product of their outcomes; anyone may bet any amount (at least the
// minimum) on any combined option, any number of times.
//
// Resolution is derived: once every referenced topic is resolved, the
// winning combined option is the one matching their winning options.
//
// Payout is parimutuel:
//   share = caller's stake on the winning option
//           / total stake on the winning option
//           * total pool
// rounded down to AMOUNT_SCALE decimal places. Rounding dust stays in escrow.
//
// ============================================================================

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;

use super::combinations::{combination_count, combination_index, combine_options};
use super::MarketBook;
use crate::error::{MarketError, MarketResult};
use crate::models::{CompositeTopic, Topic, TopicStatus, MIN_OPTIONS};

/// Fewest topics a composite market may reference
pub const MIN_REFERENCED_TOPICS: usize = 2;

/// Most topics a composite market may reference
pub const MAX_REFERENCED_TOPICS: usize = 5;

/// Decimal places kept on computed payouts
pub const AMOUNT_SCALE: u32 = 18;

impl MarketBook {
    /// Create a composite market over `referenced_ids`
    pub fn create_composite(
        &mut self,
        creator: &str,
        title: &str,
        referenced_ids: Vec<u64>,
        min_bet: Decimal,
    ) -> MarketResult<&CompositeTopic> {
        if title.trim().is_empty() {
            return Err(MarketError::InvalidTitle);
        }
        if referenced_ids.len() < MIN_REFERENCED_TOPICS {
            return Err(MarketError::TooFewTopics {
                count: referenced_ids.len(),
                minimum: MIN_REFERENCED_TOPICS,
            });
        }
        if referenced_ids.len() > MAX_REFERENCED_TOPICS {
            return Err(MarketError::TooManyTopics {
                count: referenced_ids.len(),
                maximum: MAX_REFERENCED_TOPICS,
            });
        }

        let mut seen = HashSet::new();
        let mut referenced: Vec<&Topic> = Vec::with_capacity(referenced_ids.len());
        for id in &referenced_ids {
            let topic = self
                .topics
                .get(*id)
                .map_err(|_| MarketError::InvalidReference(*id))?;
            if !seen.insert(*id) || topic.options.len() < MIN_OPTIONS {
                return Err(MarketError::InvalidReference(*id));
            }
            referenced.push(topic);
        }

        if min_bet <= Decimal::ZERO {
            return Err(MarketError::InvalidMinBet);
        }

        let counts: Vec<usize> = referenced.iter().map(|t| t.options.len()).collect();
        let cap = self.policy.max_combinations;
        let count = combination_count(&counts).unwrap_or(usize::MAX);
        if count > cap {
            return Err(MarketError::TooManyCombinations { count, cap });
        }

        let combined_options = combine_options(&referenced);
        let id = self.composites.allocate();
        self.composites.insert(CompositeTopic::new(
            id,
            creator.to_string(),
            title.trim().to_string(),
            referenced_ids,
            combined_options,
            min_bet,
        ));
        self.composites.get(id)
    }

    /// Stake `amount` on one combined option
    pub fn bet_on_option(
        &mut self,
        bettor: &str,
        id: u64,
        option_index: usize,
        amount: Decimal,
    ) -> MarketResult<&CompositeTopic> {
        let market = self.composites.get_mut(id)?;
        if market.status != TopicStatus::Active {
            return Err(MarketError::NotActive(market.key()));
        }
        if option_index >= market.combined_options.len() {
            return Err(MarketError::InvalidOption {
                option: option_index,
                options: market.combined_options.len(),
            });
        }
        if amount < market.min_bet_amount {
            return Err(MarketError::BelowMinimum {
                amount,
                minimum: market.min_bet_amount,
            });
        }

        self.ledger.debit(bettor, market.key(), amount)?;
        market.record_bet(bettor, option_index, amount);
        Ok(&*market)
    }

    /// Derive the winning option from the referenced topics' outcomes
    pub fn resolve_composite(&mut self, resolver: &str, id: u64) -> MarketResult<&CompositeTopic> {
        let market = self.composites.get(id)?;
        if market.creator != resolver {
            return Err(MarketError::Unauthorized {
                caller: resolver.to_string(),
                action: "resolve",
                market: market.key(),
            });
        }
        if market.status != TopicStatus::Active {
            return Err(MarketError::NotActive(market.key()));
        }

        let mut counts = Vec::with_capacity(market.referenced_topic_ids.len());
        let mut outcomes = Vec::with_capacity(market.referenced_topic_ids.len());
        let mut unresolved = Vec::new();
        for topic_id in &market.referenced_topic_ids {
            let topic = self.topics.get(*topic_id)?;
            match (topic.status.is_settled(), topic.winning_option) {
                (true, Some(winning)) => {
                    counts.push(topic.options.len());
                    outcomes.push(winning);
                }
                _ => unresolved.push(*topic_id),
            }
        }
        if !unresolved.is_empty() {
            return Err(MarketError::ReferencedTopicsUnresolved(unresolved));
        }

        let winning =
            combination_index(&counts, &outcomes).ok_or(MarketError::ArithmeticOverflow)?;
        let market = self.composites.get_mut(id)?;
        market.winning_option = Some(winning);
        market.status = TopicStatus::Resolved;
        Ok(&*market)
    }

    /// Pay the caller's share of the pool. Each bettor claims at most once.
    pub fn claim_composite_reward(&mut self, claimant: &str, id: u64) -> MarketResult<Decimal> {
        let market = self.composites.get_mut(id)?;
        let winning = match (market.status, market.winning_option) {
            (TopicStatus::Resolved, Some(winning)) => winning,
            _ => return Err(MarketError::NotResolved(market.key())),
        };

        let stake = market.user_bet(claimant, winning);
        if stake.is_zero() {
            return Err(MarketError::NoWinningStake(claimant.to_string()));
        }
        if market.claimed.contains(claimant) {
            return Err(MarketError::AlreadyClaimed {
                caller: claimant.to_string(),
                market: market.key(),
            });
        }

        let payout = composite_share(stake, market.option_total(winning), market.total_pool)?;
        self.ledger.credit(claimant, market.key(), payout)?;
        market.claimed.insert(claimant.to_string());
        market.paid_out += payout;
        Ok(payout)
    }

    /// What `claimant` would receive if they claimed now (zero if nothing).
    pub fn claimable_composite_reward(&self, claimant: &str, id: u64) -> MarketResult<Decimal> {
        let market = self.composites.get(id)?;
        match (market.status, market.winning_option) {
            (TopicStatus::Resolved, Some(winning)) if !market.claimed.contains(claimant) => {
                let stake = market.user_bet(claimant, winning);
                if stake.is_zero() {
                    return Ok(Decimal::ZERO);
                }
                composite_share(stake, market.option_total(winning), market.total_pool)
            }
            _ => Ok(Decimal::ZERO),
        }
    }
}

/// `stake / option_total * pool`, rounded toward zero.
pub fn composite_share(stake: Decimal, option_total: Decimal, pool: Decimal) -> MarketResult<Decimal> {
    if option_total.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let share = stake
        .checked_mul(pool)
        .and_then(|v| v.checked_div(option_total))
        .ok_or(MarketError::ArithmeticOverflow)?;
    Ok(share.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero))
}
