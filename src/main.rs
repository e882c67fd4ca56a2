// Duel Prediction Market - Main Entry Point

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use duel_prediction_market::{build_router, AppState, MarketConfig, SharedState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🎲 Duel Prediction Market");
    println!("═══════════════════════════════════════════════\n");

    let config = MarketConfig::from_env()?;
    let addr = config.bind_addr;
    let state: SharedState = Arc::new(AppState::new(config)?);
    let shutdown_state = state.clone();

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "server running");
    println!("📋 Available Endpoints:");
    println!("   POST /auth/connect                - Connect wallet (creates & funds if new)");
    println!("   GET  /balance/:account            - Account balance");
    println!("   POST /transfer                    - Transfer funds");
    println!("   GET  /ledger                      - Recent ledger activity");
    println!("   GET  /topics  POST /topics        - List / create two-party topics");
    println!("   POST /topics/:id/join|resolve|claim");
    println!("   GET  /composites  POST /composites - List / create composite markets");
    println!("   GET  /composites/:id/options|bets");
    println!("   POST /composites/:id/bet|resolve|claim");
    println!("   GET  /events?after=N              - Committed market events");
    println!("   GET  /events/wait/:sequence       - Wait for a commit");
    println!("\n📡 Caller identity via the x-wallet-address header\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, flushing market store");
    if let Err(e) = shutdown_state.flush() {
        error!(error = %e, "failed to flush market store");
    }
    println!("👋 Goodbye!\n");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
}
