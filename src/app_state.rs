// Application state management

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::events::{EventBus, MarketAction, MarketEvent};
use crate::ledger::{Balance, LedgerStats, Transaction};
use crate::market_resolve::{MarketBook, MarketPolicy};
use crate::models::{CompositeBet, CompositeTopic, MarketKey, OptionBetInfo, Topic};
use crate::storage::{ChangeSet, MarketPersistence, MarketStore};

pub type SharedState = Arc<AppState>;

/// Result of a committed command plus its ordering token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Committed<T> {
    pub value: T,
    pub sequence: u64,
}

/// Wallet as seen by `connect_wallet`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: Decimal,
    /// True if this call opened the account
    pub created: bool,
}

/// Markets created by one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorMarkets {
    pub topics: Vec<Topic>,
    pub composites: Vec<CompositeTopic>,
}

pub struct AppState {
    book: Mutex<MarketBook>,
    events: EventBus,
    store: Option<Box<dyn MarketPersistence>>,
    config: MarketConfig,
}

impl AppState {
    /// Open (or create) the configured store and load the book from it.
    pub fn new(config: MarketConfig) -> MarketResult<Self> {
        match config.data_dir.clone() {
            Some(dir) => {
                let store = MarketStore::open(&dir)?;
                let book = store.load(config.policy)?;
                Ok(Self::with_store(config, Box::new(store), book))
            }
            None => {
                info!("no data directory configured, markets are kept in memory");
                let book = MarketBook::new(config.policy);
                Ok(Self::assemble(config, None, book))
            }
        }
    }

    pub fn in_memory(policy: MarketPolicy) -> Self {
        Self::assemble(MarketConfig::in_memory(policy), None, MarketBook::new(policy))
    }

    pub fn with_store(config: MarketConfig, store: Box<dyn MarketPersistence>, book: MarketBook) -> Self {
        Self::assemble(config, Some(store), book)
    }

    fn assemble(
        config: MarketConfig,
        store: Option<Box<dyn MarketPersistence>>,
        book: MarketBook,
    ) -> Self {
        info!(
            topics = book.topics().len(),
            composites = book.composites().len(),
            sequence = book.sequence(),
            max_combinations = book.policy().max_combinations,
            "market state initialized"
        );
        Self {
            events: EventBus::new(book.sequence()),
            book: Mutex::new(book),
            store,
            config,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Command handle bound to `caller`
    pub fn session(&self, caller: &str) -> Session<'_> {
        Session {
            state: self,
            caller: caller.to_string(),
        }
    }

    // ===== COMMAND PIPELINE =====

    fn lock(&self) -> MutexGuard<'_, MarketBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // A command that failed validation never mutated the book, so only a
    // failed durable write needs the checkpoint.
    fn execute<R, F>(
        &self,
        action: MarketAction,
        actor: &str,
        target: Option<MarketKey>,
        accounts: &[&str],
        command: F,
    ) -> MarketResult<Committed<R>>
    where
        F: FnOnce(&mut MarketBook) -> MarketResult<(MarketKey, R)>,
    {
        let mut book = self.lock();
        let checkpoint = book.checkpoint(target, accounts);
        let journal_from = book.ledger().journal_len();

        let (market, value) = match command(&mut *book) {
            Ok(done) => done,
            Err(err) => {
                warn!(
                    action = action.as_str(),
                    actor,
                    kind = ?err.kind(),
                    error = %err,
                    "command rejected"
                );
                return Err(err);
            }
        };

        book.sequence += 1;
        let changes = ChangeSet {
            market: Some(market),
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            journal_from,
        };
        if let Err(err) = self.persist(&book, &changes) {
            let created = target.is_none().then_some(market);
            book.restore(checkpoint, created);
            error!(action = action.as_str(), %market, error = %err, "command rolled back");
            return Err(err);
        }

        let sequence = book.sequence();
        let event = MarketEvent::new(action, market, actor, sequence);
        info!(sequence, "{}", event);
        // published under the lock so subscribers observe commit order
        self.events.publish(event);
        Ok(Committed { value, sequence })
    }

    /// Ledger-only change (no market, no sequence)
    fn execute_ledger<R, F>(&self, accounts: &[&str], command: F) -> MarketResult<R>
    where
        F: FnOnce(&mut MarketBook) -> MarketResult<R>,
    {
        let mut book = self.lock();
        let checkpoint = book.checkpoint(None, accounts);
        let journal_from = book.ledger().journal_len();

        let value = command(&mut *book).map_err(|err| {
            warn!(kind = ?err.kind(), error = %err, "ledger command rejected");
            err
        })?;

        let changes = ChangeSet {
            market: None,
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            journal_from,
        };
        if let Err(err) = self.persist(&book, &changes) {
            book.restore(checkpoint, None);
            error!(error = %err, "ledger command rolled back");
            return Err(err);
        }
        Ok(value)
    }

    fn persist(&self, book: &MarketBook, changes: &ChangeSet) -> MarketResult<()> {
        match &self.store {
            Some(store) => store.persist(book, changes),
            None => Ok(()),
        }
    }

    /// Flush the durable store, if any
    pub fn flush(&self) -> MarketResult<()> {
        match &self.store {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    // ===== WALLETS =====

    /// Open `address` and credit the faucet amount, once per address.
    pub fn connect_wallet(&self, address: &str) -> MarketResult<WalletInfo> {
        if address.trim().is_empty() {
            return Err(MarketError::InvalidAddress);
        }
        let faucet = self.config.faucet_amount;
        self.execute_ledger(&[address], |book| {
            let ledger = book.ledger_mut();
            let created = !ledger.is_registered(address);
            if created {
                ledger.register(address);
                if faucet > Decimal::ZERO {
                    ledger.deposit(address, faucet)?;
                }
                info!(address, %faucet, "wallet connected and funded");
            }
            Ok(WalletInfo {
                address: address.to_string(),
                balance: ledger.balance(address),
                created,
            })
        })
    }

    // ===== QUERIES =====

    fn read<R>(&self, query: impl FnOnce(&MarketBook) -> R) -> R {
        query(&*self.lock())
    }

    pub fn balance(&self, account: &str) -> Decimal {
        self.read(|book| book.ledger().balance(account))
    }

    pub fn balance_info(&self, account: &str) -> Option<Balance> {
        self.read(|book| book.ledger().balance_info(account).cloned())
    }

    pub fn transactions_for(&self, account: &str) -> Vec<Transaction> {
        self.read(|book| book.ledger().transactions_for(account).into_iter().cloned().collect())
    }

    pub fn recent_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.read(|book| book.ledger().recent_transactions(limit).into_iter().cloned().collect())
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        self.read(|book| book.ledger().stats())
    }

    pub fn journal_is_intact(&self) -> bool {
        self.read(|book| book.ledger().verify_journal())
    }

    pub fn get_topic(&self, id: u64) -> MarketResult<Topic> {
        self.read(|book| book.topics().get(id).cloned())
    }

    pub fn list_topics(&self) -> Vec<Topic> {
        self.read(|book| book.topics().list_all().cloned().collect())
    }

    pub fn topic_ids(&self) -> Vec<u64> {
        self.read(|book| book.topics().ids())
    }

    pub fn topic_count(&self) -> usize {
        self.read(|book| book.topics().len())
    }

    pub fn eligible_topics(&self) -> Vec<Topic> {
        self.read(|book| {
            book.topics_eligible_for_composite()
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn get_composite(&self, id: u64) -> MarketResult<CompositeTopic> {
        self.read(|book| book.composites().get(id).cloned())
    }

    pub fn list_composites(&self) -> Vec<CompositeTopic> {
        self.read(|book| book.composites().list_all().cloned().collect())
    }

    pub fn composite_options(&self, id: u64, viewer: Option<&str>) -> MarketResult<Vec<OptionBetInfo>> {
        self.read(|book| book.composites().get(id).map(|c| c.option_bet_info(viewer)))
    }

    pub fn composite_bets(&self, id: u64) -> MarketResult<Vec<CompositeBet>> {
        self.read(|book| book.composites().get(id).map(|c| c.bets.clone()))
    }

    pub fn user_bet(&self, id: u64, account: &str, option_index: usize) -> MarketResult<Decimal> {
        self.read(|book| book.composites().get(id).map(|c| c.user_bet(account, option_index)))
    }

    pub fn claimable(&self, id: u64, account: &str) -> MarketResult<Decimal> {
        self.read(|book| book.claimable_composite_reward(account, id))
    }

    pub fn markets_by_creator(&self, account: &str) -> CreatorMarkets {
        self.read(|book| CreatorMarkets {
            topics: book.topics().list_by_creator(account).into_iter().cloned().collect(),
            composites: book
                .composites()
                .list_by_creator(account)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    // ===== EVENTS =====

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }

    pub fn events_since(&self, after: u64) -> Vec<MarketEvent> {
        self.events.events_since(after)
    }

    pub fn confirmed_sequence(&self) -> u64 {
        self.events.confirmed()
    }

    /// Wait until `sequence` is committed, at most the configured timeout.
    pub async fn wait_for_sequence(&self, sequence: u64, timeout: Option<Duration>) -> Option<u64> {
        let limit = self.config.confirmation_timeout;
        let timeout = timeout.map_or(limit, |t| t.min(limit));
        self.events.wait_for_sequence(sequence, timeout).await
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Commands issued on behalf of one caller
pub struct Session<'a> {
    state: &'a AppState,
    caller: String,
}

impl Session<'_> {
    pub fn caller_identity(&self) -> &str {
        &self.caller
    }

    pub fn caller_balance(&self) -> Decimal {
        self.state.balance(&self.caller)
    }

    pub fn transfer(&self, to: &str, amount: Decimal) -> MarketResult<Transaction> {
        let from = self.caller.as_str();
        self.state
            .execute_ledger(&[from, to], |book| book.ledger_mut().transfer(from, to, amount))
    }

    // ----- simple markets -----

    pub fn create_topic(
        &self,
        title: &str,
        options: Vec<String>,
        stake: Decimal,
        choice: usize,
    ) -> MarketResult<Committed<Topic>> {
        let caller = self.caller.as_str();
        self.state
            .execute(MarketAction::Create, caller, None, &[caller], |book| {
                let topic = book.create_topic(caller, title, options, stake, choice)?;
                Ok((topic.key(), topic.clone()))
            })
    }

    pub fn join_topic(&self, id: u64, choice: usize) -> MarketResult<Committed<Topic>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Simple(id);
        self.state
            .execute(MarketAction::Join, caller, Some(market), &[caller], |book| {
                let topic = book.join_topic(caller, id, choice)?;
                Ok((market, topic.clone()))
            })
    }

    pub fn resolve_topic(&self, id: u64, winning_option: usize) -> MarketResult<Committed<Topic>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Simple(id);
        self.state
            .execute(MarketAction::Resolve, caller, Some(market), &[], |book| {
                let topic = book.resolve_topic(caller, id, winning_option)?;
                Ok((market, topic.clone()))
            })
    }

    pub fn claim_reward(&self, id: u64) -> MarketResult<Committed<Decimal>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Simple(id);
        // a push refunds both seats; seats are fixed once the topic is active
        let players: Vec<String> = self
            .state
            .get_topic(id)
            .map(|topic| topic.players.iter().flatten().cloned().collect())
            .unwrap_or_default();
        let mut accounts: Vec<&str> = players.iter().map(String::as_str).collect();
        if !accounts.contains(&caller) {
            accounts.push(caller);
        }
        self.state
            .execute(MarketAction::Claim, caller, Some(market), &accounts, |book| {
                Ok((market, book.claim_reward(caller, id)?))
            })
    }

    // ----- composite markets -----

    pub fn create_composite(
        &self,
        title: &str,
        referenced_topic_ids: Vec<u64>,
        min_bet: Decimal,
    ) -> MarketResult<Committed<CompositeTopic>> {
        let caller = self.caller.as_str();
        self.state
            .execute(MarketAction::CreateComposite, caller, None, &[], |book| {
                let market = book.create_composite(caller, title, referenced_topic_ids, min_bet)?;
                Ok((market.key(), market.clone()))
            })
    }

    pub fn bet_on_option(
        &self,
        id: u64,
        option_index: usize,
        amount: Decimal,
    ) -> MarketResult<Committed<CompositeTopic>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Composite(id);
        self.state
            .execute(MarketAction::BetComposite, caller, Some(market), &[caller], |book| {
                let composite = book.bet_on_option(caller, id, option_index, amount)?;
                Ok((market, composite.clone()))
            })
    }

    pub fn resolve_composite(&self, id: u64) -> MarketResult<Committed<CompositeTopic>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Composite(id);
        self.state
            .execute(MarketAction::ResolveComposite, caller, Some(market), &[], |book| {
                let composite = book.resolve_composite(caller, id)?;
                Ok((market, composite.clone()))
            })
    }

    pub fn claim_composite_reward(&self, id: u64) -> MarketResult<Committed<Decimal>> {
        let caller = self.caller.as_str();
        let market = MarketKey::Composite(id);
        self.state
            .execute(MarketAction::ClaimComposite, caller, Some(market), &[caller], |book| {
                Ok((market, book.claim_composite_reward(caller, id)?))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store that can be told to reject writes
    #[derive(Default)]
    struct FlakyStore {
        failing: Arc<AtomicBool>,
    }

    impl MarketPersistence for FlakyStore {
        fn persist(&self, _book: &MarketBook, _changes: &ChangeSet) -> MarketResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(MarketError::Storage("disk unavailable".into()));
            }
            Ok(())
        }

        fn flush(&self) -> MarketResult<()> {
            Ok(())
        }
    }

    fn funded_state() -> AppState {
        let state = AppState::in_memory(MarketPolicy::default());
        for wallet in ["ALICE", "BOB"] {
            state.connect_wallet(wallet).unwrap();
        }
        state
    }

    fn yes_no() -> Vec<String> {
        vec!["Yes".into(), "No".into()]
    }

    #[test]
    fn test_connect_wallet_funds_once() {
        let state = AppState::in_memory(MarketPolicy::default());
        let first = state.connect_wallet("ALICE").unwrap();
        assert!(first.created);
        assert_eq!(first.balance, dec!(100));

        let again = state.connect_wallet("ALICE").unwrap();
        assert!(!again.created);
        assert_eq!(again.balance, dec!(100));
        assert!(state.connect_wallet("  ").is_err());
    }

    #[test]
    fn test_commands_bump_sequence_and_publish() {
        let state = funded_state();
        let alice = state.session("ALICE");
        let bob = state.session("BOB");

        let created = alice.create_topic("Rain?", yes_no(), dec!(5), 0).unwrap();
        assert_eq!(created.sequence, 1);
        let joined = bob.join_topic(created.value.id, 1).unwrap();
        assert_eq!(joined.sequence, 2);

        // rejected commands do not consume a sequence number
        assert!(bob.join_topic(created.value.id, 1).is_err());
        assert_eq!(state.confirmed_sequence(), 2);

        let events = state.events_since(0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, MarketAction::Create);
        assert_eq!(events[1].actor, "BOB");
        assert_eq!(state.events_since(1).len(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back_everything() {
        let failing = Arc::new(AtomicBool::new(false));
        let store = FlakyStore { failing: failing.clone() };
        let book = MarketBook::new(MarketPolicy::default());
        let state = AppState::with_store(
            MarketConfig::in_memory(MarketPolicy::default()),
            Box::new(store),
            book,
        );
        state.connect_wallet("ALICE").unwrap();
        state.connect_wallet("BOB").unwrap();
        let alice = state.session("ALICE");
        let bob = state.session("BOB");

        failing.store(true, Ordering::SeqCst);
        let err = alice.create_topic("Rain?", yes_no(), dec!(5), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_transient());
        assert_eq!(state.topic_count(), 0);
        assert_eq!(alice.caller_balance(), dec!(100));

        failing.store(false, Ordering::SeqCst);
        let id = alice.create_topic("Rain?", yes_no(), dec!(5), 0).unwrap().value.id;
        assert_eq!(id, 1);

        failing.store(true, Ordering::SeqCst);
        assert!(bob.join_topic(id, 1).is_err());
        let topic = state.get_topic(id).unwrap();
        assert_eq!(topic.players[1], None);
        assert_eq!(topic.total_pool, dec!(5));
        assert_eq!(bob.caller_balance(), dec!(100));
        assert_eq!(state.confirmed_sequence(), 1);
        assert!(state.journal_is_intact());
        assert!(state.read(|book| book.escrow_is_balanced()));

        assert!(bob.transfer("ALICE", dec!(1)).is_err());
        assert_eq!(bob.caller_balance(), dec!(100));
    }

    #[test]
    fn test_transfer_through_session() {
        let state = funded_state();
        let bob = state.session("BOB");
        bob.transfer("CAROL", dec!(40)).unwrap();
        assert_eq!(bob.caller_balance(), dec!(60));
        assert_eq!(state.balance("CAROL"), dec!(40));
        assert_eq!(
            bob.transfer("CAROL", dec!(0)).unwrap_err(),
            MarketError::InvalidAmount
        );
    }

    #[test]
    fn test_markets_by_creator() {
        let state = funded_state();
        let alice = state.session("ALICE");
        let a = alice.create_topic("A", yes_no(), dec!(1), 0).unwrap().value.id;
        let b = alice.create_topic("B", yes_no(), dec!(1), 0).unwrap().value.id;
        state.session("BOB").create_composite("A+B", vec![a, b], dec!(1)).unwrap();

        let mine = state.markets_by_creator("ALICE");
        assert_eq!(mine.topics.len(), 2);
        assert!(mine.composites.is_empty());
        assert_eq!(state.markets_by_creator("BOB").composites.len(), 1);
        assert_eq!(state.topic_ids(), vec![1, 2]);
        assert_eq!(state.eligible_topics().len(), 2);
    }
}
