// HTTP request handlers for the prediction market API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::app_state::{AppState, SharedState};
use crate::auth::Caller;
use crate::error::{ErrorKind, MarketError, MarketResult};
use crate::models::*;

// ===== ERRORS =====

/// Failure response: `{ "success": false, "kind": ..., "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn missing_caller() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: ErrorKind::Unauthorized,
            message: "missing x-wallet-address header".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::StateConflict | ErrorKind::AlreadyClaimed => StatusCode::CONFLICT,
        ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            kind,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "kind": self.kind,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

pub type ApiResult = Result<Json<Value>, ApiError>;

/// Run a command on the blocking pool. Commands hold the book lock across
/// the durable write.
pub async fn run_command<T, F>(state: &SharedState, command: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> MarketResult<T> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || command(&state))
        .await
        .map_err(|err| ApiError::internal(format!("command task failed: {}", err)))?
        .map_err(ApiError::from)
}

// ===== HEALTH =====

pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "duel-prediction-market",
        "sequence": state.confirmed_sequence(),
        "topics": state.topic_count(),
    }))
}

// ===== LEDGER ENDPOINTS =====

pub async fn transfer(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(request): Json<TransferRequest>,
) -> ApiResult {
    let (tx, balance) = run_command(&state, move |state| {
        let session = state.session(&caller);
        let tx = session.transfer(&request.to, request.amount)?;
        Ok((tx, session.caller_balance()))
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "transaction": tx,
        "balance": balance,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<usize>,
}

/// GET /ledger - recent journal entries and totals
pub async fn get_ledger_activity(
    State(state): State<SharedState>,
    Query(query): Query<LedgerQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(50).min(1000);
    Json(json!({
        "transactions": state.recent_transactions(limit),
        "stats": state.ledger_stats(),
        "journal_intact": state.journal_is_intact(),
    }))
}

pub async fn get_account_transactions(
    State(state): State<SharedState>,
    Path(account): Path<String>,
) -> Json<Value> {
    let transactions = state.transactions_for(&account);
    Json(json!({
        "account": account,
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

pub async fn get_account_markets(
    State(state): State<SharedState>,
    Path(account): Path<String>,
) -> Json<Value> {
    let markets = state.markets_by_creator(&account);
    Json(json!({
        "account": account,
        "topics": markets.topics,
        "composites": markets.composites,
    }))
}

// ===== SIMPLE MARKET ENDPOINTS =====

pub async fn list_topics(State(state): State<SharedState>) -> Json<Value> {
    let topics = state.list_topics();
    Json(json!({ "count": topics.len(), "topics": topics }))
}

pub async fn list_eligible_topics(State(state): State<SharedState>) -> Json<Value> {
    let topics = state.eligible_topics();
    Json(json!({ "count": topics.len(), "topics": topics }))
}

pub async fn get_topic(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult {
    let topic = state.get_topic(id)?;
    Ok(Json(json!({ "topic": topic })))
}

pub async fn create_topic(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(request): Json<CreateTopicRequest>,
) -> ApiResult {
    let committed = run_command(&state, move |state| {
        state.session(&caller).create_topic(
            &request.title,
            request.options,
            request.bet_amount,
            request.choice,
        )
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "topic": committed.value,
    })))
}

pub async fn join_topic(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(request): Json<JoinTopicRequest>,
) -> ApiResult {
    let committed = run_command(&state, move |state| {
        state.session(&caller).join_topic(id, request.choice)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "topic": committed.value,
    })))
}

pub async fn resolve_topic(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(request): Json<ResolveTopicRequest>,
) -> ApiResult {
    let committed = run_command(&state, move |state| {
        state.session(&caller).resolve_topic(id, request.winning_option)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "topic": committed.value,
    })))
}

pub async fn claim_reward(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> ApiResult {
    let (committed, balance) = run_command(&state, move |state| {
        let session = state.session(&caller);
        let committed = session.claim_reward(id)?;
        Ok((committed, session.caller_balance()))
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "amount": committed.value,
        "balance": balance,
    })))
}

// ===== COMPOSITE MARKET ENDPOINTS =====

pub async fn list_composites(State(state): State<SharedState>) -> Json<Value> {
    let composites = state.list_composites();
    Json(json!({ "count": composites.len(), "composites": composites }))
}

pub async fn get_composite(State(state): State<SharedState>, Path(id): Path<u64>) -> ApiResult {
    let composite = state.get_composite(id)?;
    Ok(Json(json!({ "composite": composite })))
}

/// GET /composites/:id/options - per-option totals, with the caller's own
/// stakes when the caller header is present
pub async fn get_composite_options(
    State(state): State<SharedState>,
    viewer: Option<Caller>,
    Path(id): Path<u64>,
) -> ApiResult {
    let viewer = viewer.as_ref().map(Caller::address);
    let options = state.composite_options(id, viewer)?;
    let claimable = match viewer {
        Some(account) => Some(state.claimable(id, account)?),
        None => None,
    };
    Ok(Json(json!({
        "composite_id": id,
        "options": options,
        "claimable": claimable,
    })))
}

pub async fn get_composite_bets(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult {
    let bets = state.composite_bets(id)?;
    Ok(Json(json!({ "composite_id": id, "count": bets.len(), "bets": bets })))
}

pub async fn create_composite(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Json(request): Json<CreateCompositeRequest>,
) -> ApiResult {
    let committed = run_command(&state, move |state| {
        state.session(&caller).create_composite(
            &request.title,
            request.referenced_topic_ids,
            request.min_bet_amount,
        )
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "composite": committed.value,
    })))
}

pub async fn bet_composite(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(request): Json<CompositeBetRequest>,
) -> ApiResult {
    let (committed, balance) = run_command(&state, move |state| {
        let session = state.session(&caller);
        let committed = session.bet_on_option(id, request.option_index, request.amount)?;
        Ok((committed, session.caller_balance()))
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "composite": committed.value,
        "balance": balance,
    })))
}

pub async fn resolve_composite(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> ApiResult {
    let committed = run_command(&state, move |state| state.session(&caller).resolve_composite(id)).await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "composite": committed.value,
    })))
}

pub async fn claim_composite(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> ApiResult {
    let (committed, balance) = run_command(&state, move |state| {
        let session = state.session(&caller);
        let committed = session.claim_composite_reward(id)?;
        Ok((committed, session.caller_balance()))
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sequence": committed.sequence,
        "amount": committed.value,
        "balance": balance,
    })))
}

// ===== EVENTS =====

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub after: Option<u64>,
}

pub async fn get_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let events = state.events_since(query.after.unwrap_or(0));
    Json(json!({
        "confirmed": state.confirmed_sequence(),
        "events": events,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    pub timeout_ms: Option<u64>,
}

/// GET /events/wait/:sequence - resolves once `sequence` is committed
pub async fn wait_for_sequence(
    State(state): State<SharedState>,
    Path(sequence): Path<u64>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let timeout = query.timeout_ms.map(Duration::from_millis);
    match state.wait_for_sequence(sequence, timeout).await {
        Some(confirmed) => Ok(Json(json!({
            "success": true,
            "sequence": sequence,
            "confirmed": confirmed,
        }))),
        None => Err((
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "success": false,
                "sequence": sequence,
                "confirmed": state.confirmed_sequence(),
                "error": "sequence not confirmed before timeout",
            })),
        )),
    }
}
