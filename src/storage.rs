// ============================================================================
// Durable Storage - sled-backed market book
// ============================================================================
//
// One sled tree, prefixed keys, JSON values:
//   topic/{id:020}        Topic
//   composite/{id:020}    CompositeTopic
//   account/{address}     (address, Balance)
//   escrow/{market}       (MarketKey, Decimal)
//   tx/{index:020}        Transaction
//   meta/sequence         u64
//
// A command's changes are written as one atomic batch and flushed before the
// command is reported as committed.
//
// ============================================================================

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::MarketResult;
use crate::ledger::{Balance, Ledger, Transaction};
use crate::market_resolve::{MarketBook, MarketPolicy};
use crate::models::{CompositeTopic, MarketKey, Topic};
use crate::registry::Registry;

const TOPIC_PREFIX: &str = "topic/";
const COMPOSITE_PREFIX: &str = "composite/";
const ACCOUNT_PREFIX: &str = "account/";
const ESCROW_PREFIX: &str = "escrow/";
const TX_PREFIX: &str = "tx/";
const SEQUENCE_KEY: &str = "meta/sequence";

/// What one command touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub market: Option<MarketKey>,
    pub accounts: Vec<String>,
    /// Journal entries from this index on are new
    pub journal_from: usize,
}

/// Durable sink for committed commands
pub trait MarketPersistence: Send + Sync {
    /// Write `changes` (read from `book`) atomically.
    fn persist(&self, book: &MarketBook, changes: &ChangeSet) -> MarketResult<()>;

    fn flush(&self) -> MarketResult<()>;
}

pub struct MarketStore {
    db: sled::Db,
}

impl MarketStore {
    pub fn open(path: impl AsRef<Path>) -> MarketResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "market store opened");
        Ok(Self { db })
    }

    /// Store that disappears when dropped
    pub fn temporary() -> MarketResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Rebuild the whole book from disk
    pub fn load(&self, policy: MarketPolicy) -> MarketResult<MarketBook> {
        let topics: Vec<Topic> = self.scan(TOPIC_PREFIX)?;
        let composites: Vec<CompositeTopic> = self.scan(COMPOSITE_PREFIX)?;
        let balances: HashMap<String, Balance> =
            self.scan::<(String, Balance)>(ACCOUNT_PREFIX)?.into_iter().collect();
        let escrow: HashMap<MarketKey, Decimal> =
            self.scan::<(MarketKey, Decimal)>(ESCROW_PREFIX)?.into_iter().collect();
        // zero-padded keys scan in append order
        let transactions: Vec<Transaction> = self.scan(TX_PREFIX)?;
        let sequence = match self.db.get(SEQUENCE_KEY)? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => 0,
        };

        info!(
            topics = topics.len(),
            composites = composites.len(),
            accounts = balances.len(),
            transactions = transactions.len(),
            sequence,
            "market book loaded"
        );

        Ok(MarketBook::from_parts(
            Registry::from_records(topics),
            Registry::from_records(composites),
            Ledger::from_parts(balances, escrow, transactions),
            policy,
            sequence,
        ))
    }

    /// Write every record of `book`. Used to seed a fresh store.
    pub fn persist_all(&self, book: &MarketBook) -> MarketResult<()> {
        let mut batch = sled::Batch::default();
        for topic in book.topics().list_all() {
            batch.insert(market_key(topic.key()).as_bytes(), to_json(topic)?);
        }
        for composite in book.composites().list_all() {
            batch.insert(market_key(composite.key()).as_bytes(), to_json(composite)?);
        }
        for (account, balance) in book.ledger().accounts() {
            batch.insert(account_key(account).as_bytes(), to_json(&(account, balance))?);
        }
        let markets = book
            .topics()
            .list_all()
            .map(|t| t.key())
            .chain(book.composites().list_all().map(|c| c.key()));
        for market in markets {
            if let Some(held) = book.ledger().escrow_entry(market) {
                batch.insert(escrow_key(market).as_bytes(), to_json(&(market, held))?);
            }
        }
        for (index, tx) in book.ledger().transactions().iter().enumerate() {
            batch.insert(tx_key(index).as_bytes(), to_json(tx)?);
        }
        batch.insert(SEQUENCE_KEY, to_json(&book.sequence())?);

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> MarketResult<Vec<T>> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}

impl MarketPersistence for MarketStore {
    fn persist(&self, book: &MarketBook, changes: &ChangeSet) -> MarketResult<()> {
        let mut batch = sled::Batch::default();

        if let Some(market) = changes.market {
            let record = match market {
                MarketKey::Simple(id) => book.topics().get(id).ok().map(to_json).transpose()?,
                MarketKey::Composite(id) => {
                    book.composites().get(id).ok().map(to_json).transpose()?
                }
            };
            if let Some(record) = record {
                batch.insert(market_key(market).as_bytes(), record);
            }
            match book.ledger().escrow_entry(market) {
                Some(held) => batch.insert(escrow_key(market).as_bytes(), to_json(&(market, held))?),
                None => batch.remove(escrow_key(market).as_bytes()),
            }
        }

        for account in &changes.accounts {
            match book.ledger().balance_info(account) {
                Some(balance) => {
                    batch.insert(account_key(account).as_bytes(), to_json(&(account, balance))?)
                }
                None => batch.remove(account_key(account).as_bytes()),
            }
        }

        let journal = book.ledger().transactions();
        for (index, tx) in journal.iter().enumerate().skip(changes.journal_from) {
            batch.insert(tx_key(index).as_bytes(), to_json(tx)?);
        }
        batch.insert(SEQUENCE_KEY, to_json(&book.sequence())?);

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        debug!(
            market = ?changes.market,
            accounts = changes.accounts.len(),
            sequence = book.sequence(),
            "changes persisted"
        );
        Ok(())
    }

    fn flush(&self) -> MarketResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> MarketResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn market_key(market: MarketKey) -> String {
    match market {
        MarketKey::Simple(id) => format!("{}{:020}", TOPIC_PREFIX, id),
        MarketKey::Composite(id) => format!("{}{:020}", COMPOSITE_PREFIX, id),
    }
}

fn escrow_key(market: MarketKey) -> String {
    format!("{}{}", ESCROW_PREFIX, market)
}

fn account_key(account: &str) -> String {
    format!("{}{}", ACCOUNT_PREFIX, account)
}

fn tx_key(index: usize) -> String {
    format!("{}{:020}", TX_PREFIX, index)
}
