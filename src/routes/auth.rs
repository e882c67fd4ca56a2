// Wallet routes: connect (creates and funds new wallets) and balance lookup

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app_state::SharedState;
use crate::auth::generate_wallet_address;
use crate::handlers::{run_command, ApiResult};

// ===== REQUEST/RESPONSE TYPES =====

#[derive(Debug, Default, Deserialize)]
pub struct ConnectWalletRequest {
    /// Existing wallet address; a new one is generated when absent
    pub wallet_address: Option<String>,
    /// Optional display name, only used to seed a generated address
    pub username: Option<String>,
}

// ===== ROUTE HANDLERS =====

/// POST /auth/connect
/// Creates and funds the wallet if new, returns its balance either way
pub async fn connect_wallet(
    State(state): State<SharedState>,
    Json(payload): Json<ConnectWalletRequest>,
) -> ApiResult {
    let address = match payload.wallet_address {
        Some(address) => address.trim().to_string(),
        None => generate_wallet_address(payload.username.as_deref().unwrap_or("anonymous")),
    };

    let wallet = run_command(&state, move |state| state.connect_wallet(&address)).await?;
    info!(
        address = %wallet.address,
        created = wallet.created,
        balance = %wallet.balance,
        "wallet connect"
    );

    Ok(Json(json!({
        "success": true,
        "wallet_address": wallet.address,
        "balance": wallet.balance,
        "is_new_account": wallet.created,
    })))
}

/// GET /balance/:wallet
pub async fn get_wallet_balance(
    State(state): State<SharedState>,
    Path(wallet): Path<String>,
) -> Json<Value> {
    let info = state.balance_info(&wallet);
    Json(json!({
        "wallet_address": wallet,
        "balance": state.balance(&wallet),
        "staked": info.as_ref().map(|b| b.staked),
        "won": info.as_ref().map(|b| b.won),
        "registered": info.is_some(),
    }))
}
