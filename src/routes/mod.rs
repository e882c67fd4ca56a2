// Routes module - organizes all HTTP endpoints
// Each sub-module handles a specific domain

pub mod auth;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::SharedState;
use crate::handlers::*;

// Re-export route handlers for convenience
pub use auth::*;

/// Every endpoint of the service, with CORS and state applied
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // ===== HEALTH CHECK =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // ===== WALLET & LEDGER ENDPOINTS =====
        .route("/auth/connect", post(connect_wallet))
        .route("/balance/:account", get(get_wallet_balance))
        .route("/transfer", post(transfer))
        .route("/ledger", get(get_ledger_activity))
        .route("/accounts/:account/transactions", get(get_account_transactions))
        .route("/accounts/:account/markets", get(get_account_markets))
        // ===== SIMPLE MARKET ENDPOINTS =====
        .route("/topics", get(list_topics).post(create_topic))
        .route("/topics/eligible", get(list_eligible_topics))
        .route("/topics/:id", get(get_topic))
        .route("/topics/:id/join", post(join_topic))
        .route("/topics/:id/resolve", post(resolve_topic))
        .route("/topics/:id/claim", post(claim_reward))
        // ===== COMPOSITE MARKET ENDPOINTS =====
        .route("/composites", get(list_composites).post(create_composite))
        .route("/composites/:id", get(get_composite))
        .route("/composites/:id/options", get(get_composite_options))
        .route("/composites/:id/bets", get(get_composite_bets))
        .route("/composites/:id/bet", post(bet_composite))
        .route("/composites/:id/resolve", post(resolve_composite))
        .route("/composites/:id/claim", post(claim_composite))
        // ===== EVENTS =====
        .route("/events", get(get_events))
        .route("/events/wait/:sequence", get(wait_for_sequence))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
