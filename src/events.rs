// ============================================================================
// Market Events - committed-command notifications
// ============================================================================
//
// Every committed command gets the next sequence number and produces one
// MarketEvent. Events fan out three ways:
//   - broadcast channel for live subscribers (lagging receivers drop events)
//   - watch channel carrying the latest committed sequence, which is what
//     read-after-write confirmation waits on
//   - bounded activity history, oldest entries evicted first
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::models::MarketKey;

/// Entries kept in the activity history
pub const HISTORY_LIMIT: usize = 1000;

/// Buffer of the live broadcast channel
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarketAction {
    Create,
    Join,
    Resolve,
    Claim,
    CreateComposite,
    BetComposite,
    ResolveComposite,
    ClaimComposite,
}

impl MarketAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketAction::Create => "create",
            MarketAction::Join => "join",
            MarketAction::Resolve => "resolve",
            MarketAction::Claim => "claim",
            MarketAction::CreateComposite => "createComposite",
            MarketAction::BetComposite => "betComposite",
            MarketAction::ResolveComposite => "resolveComposite",
            MarketAction::ClaimComposite => "claimComposite",
        }
    }

    fn emoji(&self) -> &'static str {
        match self {
            MarketAction::Create | MarketAction::CreateComposite => "📊",
            MarketAction::Join | MarketAction::BetComposite => "🎯",
            MarketAction::Resolve | MarketAction::ResolveComposite => "✅",
            MarketAction::Claim | MarketAction::ClaimComposite => "💸",
        }
    }
}

/// One committed command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub action: MarketAction,
    pub market: MarketKey,
    /// Account that issued the command
    pub actor: String,
    /// Ordering token; strictly increasing across all markets
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl MarketEvent {
    pub fn new(action: MarketAction, market: MarketKey, actor: &str, sequence: u64) -> Self {
        Self {
            action,
            market,
            actor: actor.to_string(),
            sequence,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for MarketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} | {} by {} (#{})",
            self.timestamp.format("%H:%M:%S"),
            self.action.emoji(),
            self.action.as_str().to_uppercase(),
            self.market,
            self.actor,
            self.sequence
        )
    }
}

/// Fan-out point for committed events
pub struct EventBus {
    sender: broadcast::Sender<MarketEvent>,
    confirmed: watch::Sender<u64>,
    history: Mutex<VecDeque<MarketEvent>>,
}

impl EventBus {
    /// `confirmed` is the sequence already committed before this bus existed.
    pub fn new(confirmed: u64) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (confirmed, _) = watch::channel(confirmed);
        Self {
            sender,
            confirmed,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    /// Publish a committed event. Must be called in sequence order.
    pub fn publish(&self, event: MarketEvent) {
        let sequence = event.sequence;
        if let Ok(mut history) = self.history.lock() {
            history.push_back(event.clone());
            if history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
        // no subscribers is fine
        let _ = self.sender.send(event);
        self.confirmed.send_replace(sequence);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    /// Latest committed sequence
    pub fn confirmed(&self) -> u64 {
        *self.confirmed.borrow()
    }

    /// Retained events with a sequence greater than `after`, oldest first.
    pub fn events_since(&self, after: u64) -> Vec<MarketEvent> {
        self.history
            .lock()
            .map(|history| {
                history
                    .iter()
                    .filter(|e| e.sequence > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wait until `sequence` is committed. Returns the latest committed
    /// sequence, or `None` if `timeout` elapsed first.
    pub async fn wait_for_sequence(&self, sequence: u64, timeout: Duration) -> Option<u64> {
        let mut rx = self.confirmed.subscribe();
        let confirmed = match tokio::time::timeout(timeout, rx.wait_for(|latest| *latest >= sequence)).await {
            Ok(Ok(latest)) => Some(*latest),
            _ => None,
        };
        confirmed
    }
}
