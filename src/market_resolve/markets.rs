//! Two-party topic lifecycle
//!
//! WAITING_FOR_SECOND_PLAYER -> ACTIVE -> RESOLVED -> CLAIMED, strictly forward.

use rust_decimal::Decimal;

use super::MarketBook;
use crate::error::{MarketError, MarketResult};
use crate::models::{MarketKey, Topic, TopicStatus, MIN_OPTIONS};

impl MarketBook {
    /// Create a topic and stake the creator's side of it
    pub fn create_topic(
        &mut self,
        creator: &str,
        title: &str,
        options: Vec<String>,
        stake: Decimal,
        creator_choice: usize,
    ) -> MarketResult<&Topic> {
        if title.trim().is_empty() {
            return Err(MarketError::InvalidTitle);
        }
        if options.len() < MIN_OPTIONS {
            return Err(MarketError::InvalidOptions(format!(
                "at least {} options required, got {}",
                MIN_OPTIONS,
                options.len()
            )));
        }
        if let Some(blank) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(MarketError::InvalidOptions(format!("option {} is blank", blank)));
        }
        if stake <= Decimal::ZERO {
            return Err(MarketError::InvalidStake);
        }
        if creator_choice >= options.len() {
            return Err(MarketError::InvalidChoice {
                choice: creator_choice,
                options: options.len(),
            });
        }
        self.ledger.ensure_funds(creator, stake)?;

        let id = self.topics.allocate();
        self.ledger.debit(creator, MarketKey::Simple(id), stake)?;
        self.topics.insert(Topic::new(
            id,
            creator.to_string(),
            title.trim().to_string(),
            options,
            stake,
            creator_choice,
        ));
        self.topics.get(id)
    }

    /// Take the second seat. The joiner may back any option, including the
    /// creator's.
    pub fn join_topic(&mut self, player: &str, id: u64, choice: usize) -> MarketResult<&Topic> {
        let topic = self.topics.get_mut(id)?;
        if topic.status != TopicStatus::WaitingForSecondPlayer {
            return Err(MarketError::NotJoinable(topic.key()));
        }
        if topic.creator == player {
            return Err(MarketError::SelfJoinForbidden);
        }
        if choice >= topic.options.len() {
            return Err(MarketError::InvalidChoice {
                choice,
                options: topic.options.len(),
            });
        }

        self.ledger.debit(player, topic.key(), topic.bet_amount)?;
        topic.players[1] = Some(player.to_string());
        topic.player_choices[1] = Some(choice);
        topic.total_pool += topic.bet_amount;
        topic.status = TopicStatus::Active;
        Ok(&*topic)
    }

    /// Declare the winning option. Only the creator may resolve, and only an
    /// option one of the players actually picked. If both players picked it
    /// the topic resolves as a push with no single winner.
    pub fn resolve_topic(
        &mut self,
        resolver: &str,
        id: u64,
        winning_option: usize,
    ) -> MarketResult<&Topic> {
        let topic = self.topics.get_mut(id)?;
        if topic.status != TopicStatus::Active {
            return Err(MarketError::NotActive(topic.key()));
        }
        if topic.creator != resolver {
            return Err(MarketError::Unauthorized {
                caller: resolver.to_string(),
                action: "resolve",
                market: topic.key(),
            });
        }
        if winning_option >= topic.options.len() {
            return Err(MarketError::InvalidOption {
                option: winning_option,
                options: topic.options.len(),
            });
        }
        let winner = topic
            .player_with_choice(winning_option)
            .map(str::to_string)
            .ok_or(MarketError::NoPlayerForOption(winning_option))?;

        topic.winning_option = Some(winning_option);
        topic.winner = if topic.is_push() { None } else { Some(winner) };
        topic.status = TopicStatus::Resolved;
        Ok(&*topic)
    }

    /// Pay the whole pool to the winner. On a push either player may claim,
    /// which refunds both stakes. Returns the amount paid to the claimant.
    pub fn claim_reward(&mut self, claimant: &str, id: u64) -> MarketResult<Decimal> {
        let topic = self.topics.get_mut(id)?;
        if topic.status != TopicStatus::Resolved {
            return Err(MarketError::NotResolved(topic.key()));
        }
        let push = topic.is_push();
        let eligible = if push {
            topic.players.iter().any(|p| p.as_deref() == Some(claimant))
        } else {
            topic.winner.as_deref() == Some(claimant)
        };
        if !eligible {
            return Err(MarketError::Unauthorized {
                caller: claimant.to_string(),
                action: "claim",
                market: topic.key(),
            });
        }

        let pool = topic.total_pool;
        let held = self.ledger.escrowed(topic.key());
        if held < pool {
            return Err(MarketError::EscrowShortfall {
                market: topic.key(),
                held,
                requested: pool,
            });
        }
        let paid = if push {
            for player in topic.players.iter().flatten() {
                self.ledger.credit(player, topic.key(), topic.bet_amount)?;
            }
            topic.bet_amount
        } else {
            self.ledger.credit(claimant, topic.key(), pool)?;
            pool
        };
        topic.total_pool = Decimal::ZERO;
        topic.claimed_amount = Some(pool);
        topic.status = TopicStatus::Claimed;
        Ok(paid)
    }
}
