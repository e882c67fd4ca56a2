/// Funds Ledger for the duel prediction market
///
/// Tracks spendable balances per account and the escrow held for each market:
/// - stakes move from an account into the market's escrow (debit)
/// - payouts move from the market's escrow to the winner (credit)
/// - every movement is journaled with a SHA-256 hash chain
///
/// KEY INVARIANT: the escrow of a market equals its pool minus what was already
/// paid out. Escrow is only reachable through the engines (crate-private).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{MarketError, MarketResult};
use crate::models::{now, MarketKey};

/// Hash that precedes the first journal entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================================================
// CORE TYPES
// ============================================================================

/// Account balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable now
    pub available: Decimal,
    /// Lifetime amount moved into market escrow
    pub staked: Decimal,
    /// Lifetime amount received from market escrow
    pub won: Decimal,
    pub last_activity: u64,
}

impl Balance {
    pub fn new(amount: Decimal) -> Self {
        Self {
            available: amount,
            staked: Decimal::ZERO,
            won: Decimal::ZERO,
            last_activity: now(),
        }
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

/// Transaction types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxType {
    Deposit,
    Transfer,
    Stake,
    Payout,
}

/// A single journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub tx_type: TxType,
    pub from: String,
    pub to: Option<String>,
    pub amount: Decimal,
    pub market: Option<MarketKey>,
    pub timestamp: u64,
    /// SHA-256 over the previous entry's hash and this entry's fields
    pub hash: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Transaction {
    fn new(tx_type: TxType, from: &str, amount: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tx_type,
            from: from.to_string(),
            to: None,
            amount,
            market: None,
            timestamp: now(),
            hash: String::new(),
            description: None,
        }
    }

    fn deposit(to: &str, amount: Decimal) -> Self {
        let mut tx = Self::new(TxType::Deposit, "EXTERNAL", amount);
        tx.to = Some(to.to_string());
        tx.description = Some(format!("Deposit {}", amount));
        tx
    }

    fn transfer(from: &str, to: &str, amount: Decimal) -> Self {
        let mut tx = Self::new(TxType::Transfer, from, amount);
        tx.to = Some(to.to_string());
        tx.description = Some(format!("Transfer {}", amount));
        tx
    }

    fn stake(from: &str, market: MarketKey, amount: Decimal) -> Self {
        let mut tx = Self::new(TxType::Stake, from, amount);
        tx.market = Some(market);
        tx.description = Some(format!("Stake {} into {}", amount, market));
        tx
    }

    fn payout(to: &str, market: MarketKey, amount: Decimal) -> Self {
        let mut tx = Self::new(TxType::Payout, "ESCROW", amount);
        tx.to = Some(to.to_string());
        tx.market = Some(market);
        tx.description = Some(format!("Payout {} from {}", amount, market));
        tx
    }

    fn digest(&self, previous: &str) -> String {
        let market = self.market.map(|m| m.to_string()).unwrap_or_default();
        hash(&format!(
            "{}|{}|{:?}|{}|{}|{}|{}|{}",
            previous,
            self.id,
            self.tx_type,
            self.from,
            self.to.as_deref().unwrap_or(""),
            self.amount,
            market,
            self.timestamp
        ))
    }

    pub fn involves(&self, account: &str) -> bool {
        self.from == account || self.to.as_deref() == Some(account)
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// The ledger tracking all accounts, market escrow and the journal
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: HashMap<String, Balance>,
    escrow: HashMap<MarketKey, Decimal>,
    transactions: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. The journal must be in append order.
    pub(crate) fn from_parts(
        balances: HashMap<String, Balance>,
        escrow: HashMap<MarketKey, Decimal>,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            balances,
            escrow,
            transactions,
        }
    }

    /// Open an account with a zero balance. Returns false if it already existed.
    pub fn register(&mut self, account: &str) -> bool {
        if self.balances.contains_key(account) {
            return false;
        }
        self.balances.insert(account.to_string(), Balance::default());
        debug!(account, "account registered");
        true
    }

    pub fn is_registered(&self, account: &str) -> bool {
        self.balances.contains_key(account)
    }

    /// Credit external funds to an account, opening it if needed
    pub fn deposit(&mut self, account: &str, amount: Decimal) -> MarketResult<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount);
        }
        let bal = self.balances.entry(account.to_string()).or_default();
        bal.available += amount;
        bal.last_activity = now();

        debug!(account, %amount, "deposit");
        Ok(self.record(Transaction::deposit(account, amount)))
    }

    /// Spendable balance (zero for unknown accounts)
    pub fn balance(&self, account: &str) -> Decimal {
        self.balances
            .get(account)
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn balance_info(&self, account: &str) -> Option<&Balance> {
        self.balances.get(account)
    }

    pub fn ensure_funds(&self, account: &str, amount: Decimal) -> MarketResult<()> {
        let available = self.balance(account);
        if available < amount {
            return Err(MarketError::InsufficientFunds {
                available,
                required: amount,
            });
        }
        Ok(())
    }

    /// Move `amount` from `account` into the escrow of `market`
    pub(crate) fn debit(
        &mut self,
        account: &str,
        market: MarketKey,
        amount: Decimal,
    ) -> MarketResult<Transaction> {
        self.ensure_funds(account, amount)?;

        // ensure_funds guarantees the account exists when amount > 0
        let bal = self.balances.entry(account.to_string()).or_default();
        bal.available -= amount;
        bal.staked += amount;
        bal.last_activity = now();
        *self.escrow.entry(market).or_insert(Decimal::ZERO) += amount;

        debug!(account, %market, %amount, "stake locked in escrow");
        Ok(self.record(Transaction::stake(account, market, amount)))
    }

    /// Release `amount` from the escrow of `market` to `account`
    pub(crate) fn credit(
        &mut self,
        account: &str,
        market: MarketKey,
        amount: Decimal,
    ) -> MarketResult<Transaction> {
        let held = self.escrowed(market);
        if held < amount {
            return Err(MarketError::EscrowShortfall {
                market,
                held,
                requested: amount,
            });
        }

        self.escrow.insert(market, held - amount);
        let bal = self.balances.entry(account.to_string()).or_default();
        bal.available += amount;
        bal.won += amount;
        bal.last_activity = now();

        debug!(account, %market, %amount, "payout released from escrow");
        Ok(self.record(Transaction::payout(account, market, amount)))
    }

    /// Transfer between accounts
    pub fn transfer(&mut self, from: &str, to: &str, amount: Decimal) -> MarketResult<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount);
        }
        self.ensure_funds(from, amount)?;

        if let Some(bal) = self.balances.get_mut(from) {
            bal.available -= amount;
            bal.last_activity = now();
        }
        let to_bal = self.balances.entry(to.to_string()).or_default();
        to_bal.available += amount;
        to_bal.last_activity = now();

        debug!(from, to, %amount, "transfer");
        Ok(self.record(Transaction::transfer(from, to, amount)))
    }

    pub(crate) fn escrowed(&self, market: MarketKey) -> Decimal {
        self.escrow.get(&market).copied().unwrap_or(Decimal::ZERO)
    }

    pub(crate) fn total_escrowed(&self) -> Decimal {
        self.escrow.values().copied().sum()
    }

    pub(crate) fn escrow_entry(&self, market: MarketKey) -> Option<Decimal> {
        self.escrow.get(&market).copied()
    }

    pub(crate) fn accounts(&self) -> impl Iterator<Item = (&String, &Balance)> {
        self.balances.iter()
    }

    fn record(&mut self, mut tx: Transaction) -> Transaction {
        let previous = self.last_hash();
        tx.hash = tx.digest(previous);
        self.transactions.push(tx.clone());
        tx
    }

    pub fn last_hash(&self) -> &str {
        self.transactions
            .last()
            .map(|tx| tx.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Recompute the hash chain over the whole journal
    pub fn verify_journal(&self) -> bool {
        let mut previous = GENESIS_HASH.to_string();
        for tx in &self.transactions {
            if tx.digest(&previous) != tx.hash {
                return false;
            }
            previous = tx.hash.clone();
        }
        true
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Get transactions for an account
    pub fn transactions_for(&self, account: &str) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.involves(account))
            .collect()
    }

    /// Get recent transactions, newest first
    pub fn recent_transactions(&self, limit: usize) -> Vec<&Transaction> {
        self.transactions.iter().rev().take(limit).collect()
    }

    pub fn stats(&self) -> LedgerStats {
        let volume_of = |kind: TxType| -> Decimal {
            self.transactions
                .iter()
                .filter(|t| t.tx_type == kind)
                .map(|t| t.amount)
                .sum()
        };

        LedgerStats {
            accounts: self.balances.len(),
            transactions: self.transactions.len(),
            total_staked: volume_of(TxType::Stake),
            total_paid_out: volume_of(TxType::Payout),
            total_escrowed: self.total_escrowed(),
            markets_with_escrow: self.escrow.values().filter(|v| !v.is_zero()).count(),
        }
    }

    // ---- checkpoint support ------------------------------------------------

    pub(crate) fn journal_len(&self) -> usize {
        self.transactions.len()
    }

    pub(crate) fn restore_account(&mut self, account: &str, balance: Option<Balance>) {
        match balance {
            Some(balance) => {
                self.balances.insert(account.to_string(), balance);
            }
            None => {
                self.balances.remove(account);
            }
        }
    }

    pub(crate) fn restore_escrow(&mut self, market: MarketKey, held: Option<Decimal>) {
        match held {
            Some(held) => {
                self.escrow.insert(market, held);
            }
            None => {
                self.escrow.remove(&market);
            }
        }
    }

    pub(crate) fn truncate_journal(&mut self, len: usize) {
        self.transactions.truncate(len);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub accounts: usize,
    pub transactions: usize,
    pub total_staked: Decimal,
    pub total_paid_out: Decimal,
    pub total_escrowed: Decimal,
    pub markets_with_escrow: usize,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Compute SHA256 hash
pub fn hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MARKET: MarketKey = MarketKey::Simple(1);

    #[test]
    fn test_deposit_and_balance() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(1000)).unwrap();
        assert_eq!(ledger.balance("ALICE"), dec!(1000));
        assert_eq!(ledger.balance("NOBODY"), Decimal::ZERO);
        assert_eq!(ledger.deposit("ALICE", dec!(0)), Err(MarketError::InvalidAmount));
    }

    #[test]
    fn test_ledger_stake_and_payout() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(1000)).unwrap();

        let tx = ledger.debit("ALICE", MARKET, dec!(100)).unwrap();
        assert_eq!(tx.tx_type, TxType::Stake);
        assert_eq!(ledger.balance("ALICE"), dec!(900));
        assert_eq!(ledger.escrowed(MARKET), dec!(100));

        ledger.credit("BOB", MARKET, dec!(100)).unwrap();
        assert_eq!(ledger.balance("BOB"), dec!(100));
        assert_eq!(ledger.escrowed(MARKET), Decimal::ZERO);
        assert_eq!(ledger.balance_info("BOB").unwrap().won, dec!(100));
    }

    #[test]
    fn test_debit_rejects_overdraft_without_side_effects() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(5)).unwrap();
        let before = ledger.transactions().len();

        let err = ledger.debit("ALICE", MARKET, dec!(10)).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientFunds { available: dec!(5), required: dec!(10) }
        );
        assert_eq!(ledger.balance("ALICE"), dec!(5));
        assert_eq!(ledger.escrowed(MARKET), Decimal::ZERO);
        assert_eq!(ledger.transactions().len(), before);
    }

    #[test]
    fn test_credit_cannot_exceed_escrow() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(5)).unwrap();
        ledger.debit("ALICE", MARKET, dec!(5)).unwrap();

        let err = ledger.credit("ALICE", MARKET, dec!(6)).unwrap_err();
        assert!(matches!(err, MarketError::EscrowShortfall { .. }));
        assert_eq!(ledger.escrowed(MARKET), dec!(5));
    }

    #[test]
    fn test_transfer() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(10)).unwrap();
        ledger.transfer("ALICE", "BOB", dec!(4)).unwrap();
        assert_eq!(ledger.balance("ALICE"), dec!(6));
        assert_eq!(ledger.balance("BOB"), dec!(4));
        assert_eq!(ledger.transactions_for("BOB").len(), 1);
        assert!(ledger.transfer("BOB", "ALICE", dec!(5)).is_err());
    }

    #[test]
    fn test_journal_hash_chain() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(10)).unwrap();
        ledger.debit("ALICE", MARKET, dec!(3)).unwrap();
        ledger.credit("ALICE", MARKET, dec!(3)).unwrap();
        assert!(ledger.verify_journal());

        ledger.transactions[1].amount = dec!(300);
        assert!(!ledger.verify_journal());
    }

    #[test]
    fn test_stats() {
        let mut ledger = Ledger::new();
        ledger.deposit("ALICE", dec!(10)).unwrap();
        ledger.debit("ALICE", MARKET, dec!(4)).unwrap();
        ledger.debit("ALICE", MarketKey::Composite(1), dec!(2)).unwrap();
        ledger.credit("ALICE", MARKET, dec!(4)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_staked, dec!(6));
        assert_eq!(stats.total_paid_out, dec!(4));
        assert_eq!(stats.total_escrowed, dec!(2));
        assert_eq!(stats.markets_with_escrow, 1);
    }
}
