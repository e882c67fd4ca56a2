/// HTTP API tests, driving the router in-process

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use duel_prediction_market::{build_router, AppState, MarketPolicy, SharedState};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

const ALICE_ADDRESS: &str = "PM_ALICE0000000001";
const BOB_ADDRESS: &str = "PM_BOB000000000001";

fn app() -> (Router, SharedState) {
    let state: SharedState = Arc::new(AppState::in_memory(MarketPolicy::default()));
    (build_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, caller: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("x-wallet-address", caller);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn connect(app: &Router, address: &str) {
    let (status, body) = send(app, "POST", "/auth/connect", None, Some(json!({ "wallet_address": address }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// ============================================================================
// WALLET TESTS
// ============================================================================

#[tokio::test]
async fn test_wallet_connect_funds_new_wallets_once() {
    let (app, _) = app();
    let payload = json!({ "wallet_address": ALICE_ADDRESS });

    let (status, body) = send(&app, "POST", "/auth/connect", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_new_account"], true);
    assert_eq!(body["balance"], "100");

    let (_, body) = send(&app, "POST", "/auth/connect", None, Some(payload)).await;
    assert_eq!(body["is_new_account"], false);

    let (status, body) = send(&app, "GET", &format!("/balance/{}", ALICE_ADDRESS), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "100");
    assert_eq!(body["registered"], true);
}

#[tokio::test]
async fn test_wallet_connect_generates_address() {
    let (app, _) = app();
    let (status, body) = send(&app, "POST", "/auth/connect", None, Some(json!({ "username": "alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["wallet_address"].as_str().unwrap().starts_with("PM_"));
}

#[tokio::test]
async fn test_transfer_requires_caller_and_funds() {
    let (app, state) = app();
    connect(&app, ALICE_ADDRESS).await;
    let payload = json!({ "to": BOB_ADDRESS, "amount": "30" });

    let (status, _) = send(&app, "POST", "/transfer", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "POST", "/transfer", Some(ALICE_ADDRESS), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "70");
    assert_eq!(state.balance(BOB_ADDRESS).to_string(), "30");

    let too_much = json!({ "to": BOB_ADDRESS, "amount": "500" });
    let (status, body) = send(&app, "POST", "/transfer", Some(ALICE_ADDRESS), Some(too_much)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["kind"], "insufficient_funds");
}

// ============================================================================
// MARKET TESTS
// ============================================================================

#[tokio::test]
async fn test_topic_lifecycle_over_http() {
    let (app, _) = app();
    connect(&app, ALICE_ADDRESS).await;
    connect(&app, BOB_ADDRESS).await;

    let create = json!({ "title": "Rain tomorrow?", "options": ["Yes", "No"], "bet_amount": "1.0", "choice": 0 });
    let (status, body) = send(&app, "POST", "/topics", Some(ALICE_ADDRESS), Some(create)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sequence"], 1);
    assert_eq!(body["topic"]["status"], "WAITING_FOR_SECOND_PLAYER");
    let id = body["topic"]["id"].as_u64().unwrap();

    let (status, body) = send(&app, "POST", &format!("/topics/{}/join", id), Some(ALICE_ADDRESS), Some(json!({ "choice": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, "POST", &format!("/topics/{}/join", id), Some(BOB_ADDRESS), Some(json!({ "choice": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"]["status"], "ACTIVE");

    let (status, _) = send(&app, "POST", &format!("/topics/{}/resolve", id), Some(ALICE_ADDRESS), Some(json!({ "winning_option": 1 }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &format!("/topics/{}/claim", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], "2.0");
    assert_eq!(body["balance"], "101.0");

    let (status, body) = send(&app, "POST", &format!("/topics/{}/claim", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    let (status, body) = send(&app, "GET", &format!("/topics/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"]["status"], "CLAIMED");
}

#[tokio::test]
async fn test_joiner_may_share_creator_pick() {
    let (app, state) = app();
    connect(&app, ALICE_ADDRESS).await;
    connect(&app, BOB_ADDRESS).await;

    let create = json!({ "title": "Coin flip", "options": ["Heads", "Tails"], "bet_amount": "3", "choice": 1 });
    let (_, body) = send(&app, "POST", "/topics", Some(ALICE_ADDRESS), Some(create)).await;
    let id = body["topic"]["id"].as_u64().unwrap();

    let (status, body) = send(&app, "POST", &format!("/topics/{}/join", id), Some(BOB_ADDRESS), Some(json!({ "choice": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"]["status"], "ACTIVE");

    let (status, body) = send(&app, "POST", &format!("/topics/{}/resolve", id), Some(ALICE_ADDRESS), Some(json!({ "winning_option": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"]["winner"], Value::Null);

    let (status, body) = send(&app, "POST", &format!("/topics/{}/claim", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], "3");
    assert_eq!(body["balance"], "100");
    assert_eq!(state.balance(ALICE_ADDRESS).to_string(), "100");
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, _) = app();
    connect(&app, ALICE_ADDRESS).await;

    let (status, body) = send(&app, "GET", "/topics/42", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let one_option = json!({ "title": "t", "options": ["Only"], "bet_amount": "1", "choice": 0 });
    let (status, body) = send(&app, "POST", "/topics", Some(ALICE_ADDRESS), Some(one_option)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_argument");
}

#[tokio::test]
async fn test_composite_flow_over_http() {
    let (app, _) = app();
    connect(&app, ALICE_ADDRESS).await;
    connect(&app, BOB_ADDRESS).await;

    let mut ids = Vec::new();
    for (title, options) in [("Rain", json!(["Yes", "No"])), ("Match", json!(["Home", "Away", "Draw"]))] {
        let create = json!({ "title": title, "options": options, "bet_amount": "1", "choice": 0 });
        let (_, body) = send(&app, "POST", "/topics", Some(ALICE_ADDRESS), Some(create)).await;
        let id = body["topic"]["id"].as_u64().unwrap();
        send(&app, "POST", &format!("/topics/{}/join", id), Some(BOB_ADDRESS), Some(json!({ "choice": 1 }))).await;
        ids.push(id);
    }

    let (_, body) = send(&app, "GET", "/topics/eligible", None, None).await;
    assert_eq!(body["count"], 2);

    let create = json!({ "title": "Rain & Match", "referenced_topic_ids": ids, "min_bet_amount": "0.5" });
    let (status, body) = send(&app, "POST", "/composites", Some(BOB_ADDRESS), Some(create)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["composite"]["combined_options"].as_array().unwrap().len(), 6);
    let id = body["composite"]["id"].as_u64().unwrap();

    let (status, _) = send(&app, "POST", &format!("/composites/{}/bet", id), Some(BOB_ADDRESS), Some(json!({ "option_index": 4, "amount": "2" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &format!("/composites/{}/resolve", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    send(&app, "POST", &format!("/topics/{}/resolve", ids[0]), Some(ALICE_ADDRESS), Some(json!({ "winning_option": 1 }))).await;
    send(&app, "POST", &format!("/topics/{}/resolve", ids[1]), Some(ALICE_ADDRESS), Some(json!({ "winning_option": 1 }))).await;

    let (status, body) = send(&app, "POST", &format!("/composites/{}/resolve", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["composite"]["winning_option"], 4);

    let (_, body) = send(&app, "GET", &format!("/composites/{}/options", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(body["options"][4]["user_bets"], "2");
    assert_eq!(body["claimable"], "2");

    let (status, body) = send(&app, "POST", &format!("/composites/{}/claim", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], "2");

    let (status, body) = send(&app, "POST", &format!("/composites/{}/claim", id), Some(BOB_ADDRESS), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_claimed");

    let (_, body) = send(&app, "GET", &format!("/accounts/{}/markets", BOB_ADDRESS), None, None).await;
    assert_eq!(body["composites"].as_array().unwrap().len(), 1);
}

// ============================================================================
// EVENT TESTS
// ============================================================================

#[tokio::test]
async fn test_events_and_confirmation() {
    let (app, _) = app();
    connect(&app, ALICE_ADDRESS).await;
    let create = json!({ "title": "t", "options": ["a", "b"], "bet_amount": "1", "choice": 0 });
    send(&app, "POST", "/topics", Some(ALICE_ADDRESS), Some(create)).await;

    let (status, body) = send(&app, "GET", "/events?after=0", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], 1);
    assert_eq!(body["events"][0]["action"], "create");
    assert_eq!(body["events"][0]["market"], json!({ "kind": "simple", "id": 1 }));

    let (status, body) = send(&app, "GET", "/events/wait/1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], 1);

    let (status, _) = send(&app, "GET", "/events/wait/2?timeout_ms=20", None, None).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_health_and_ledger() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    connect(&app, ALICE_ADDRESS).await;
    let (_, body) = send(&app, "GET", "/ledger", None, None).await;
    assert_eq!(body["journal_intact"], true);
    assert_eq!(body["stats"]["accounts"], 1);
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
}
