// =============================================================================
// Quorum Engine — Main Entry Point
// =============================================================================
//
// One shared decision pipeline, many isolated user contexts.  The engine
// starts with paper execution unless QUORUM_LIVE=1; market data arrives from
// the collaborator layer (or a replay file for local runs).
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod aggregator;
mod app_state;
mod audit;
mod config;
mod credentials;
mod engine;
mod exchange;
mod executor;
mod health;
mod lifecycle;
mod market;
mod risk;
mod shadow;
mod state_machine;
mod types;
mod weights;
mod witness;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::EngineState;
use crate::audit::AuditLog;
use crate::config::EngineConfig;
use crate::credentials::CredentialCipher;
use crate::exchange::{ExchangeClient, PaperClient, SignedRestClient};
use crate::executor::UserContext;
use crate::market::{Bar, BarKey};
use crate::state_machine::SystemState;

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║            Quorum Engine — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        EngineConfig::default()
    });

    let live_execution = std::env::var("QUORUM_LIVE").map(|v| v == "1").unwrap_or(false);
    info!(
        symbol = %config.symbol,
        interval = %config.interval,
        users = config.users.len(),
        live_execution,
        "engine configuration resolved"
    );

    // ── 2. Build the component graph ─────────────────────────────────────
    let audit = AuditLog::spawn(config.audit_dir.clone());
    let state = EngineState::new(config, audit);
    engine::register_builtin_panel(&state);

    // ── 3. Activate users ────────────────────────────────────────────────
    let mut paper_clients: Vec<Arc<PaperClient>> = Vec::new();
    {
        let profiles = state.config.read().users.clone();
        if !profiles.is_empty() {
            let cipher = CredentialCipher::from_env()
                .context("user profiles configured but the credential key is unavailable")?;

            for profile in profiles {
                let creds = match cipher.decrypt(&profile.encrypted_credentials) {
                    Ok(creds) => creds,
                    Err(e) => {
                        error!(user = %profile.user_id, error = %e, "credential decryption failed; user skipped");
                        continue;
                    }
                };

                let client: Arc<dyn ExchangeClient> = if live_execution {
                    let base_url = std::env::var("QUORUM_EXCHANGE_URL")
                        .unwrap_or_else(|_| "https://api.binance.com".to_string());
                    Arc::new(SignedRestClient::new(base_url, creds.clone()))
                } else {
                    let paper = Arc::new(PaperClient::new(0.0));
                    paper_clients.push(Arc::clone(&paper));
                    paper
                };

                state.executor.activate(UserContext::new(
                    profile.user_id,
                    creds,
                    client,
                    profile.leverage,
                    profile.max_position_pct,
                    profile.subscription,
                    profile.equity,
                ));
            }
        }
    }
    info!(active = state.executor.user_ids().len(), "user contexts activated");

    // ── 4. Seed market data (replay file, if configured) ─────────────────
    if let Ok(path) = std::env::var("QUORUM_BARS_FILE") {
        match load_bar_replay(&path) {
            Ok(bars) => {
                let key = {
                    let cfg = state.config.read();
                    BarKey::new(&cfg.symbol, &cfg.interval)
                };
                let count = bars.len();
                for bar in bars {
                    state.bars.push(key.clone(), bar);
                }
                info!(path, count, "bar replay loaded");
            }
            Err(e) => warn!(path, error = %e, "bar replay failed to load"),
        }
    }

    // ── 5. Boot the state machine ────────────────────────────────────────
    state
        .machine
        .transition(SystemState::Observing, "init complete", "main", "boot")
        .context("state machine failed to leave SYSTEM_INIT")?;

    // ── 6. Decision loop ─────────────────────────────────────────────────
    let loop_state = Arc::clone(&state);
    tokio::spawn(async move {
        let interval_secs = loop_state.config.read().loop_interval_secs;
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let outcome = engine::run_once(&loop_state).await;
            tracing::debug!(?outcome, "decision loop pass");
        }
    });

    // ── 7. Shadow evaluation loop ────────────────────────────────────────
    let shadow_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            engine::shadow_tick(&shadow_state);
        }
    });

    // ── 8. Lifecycle sweep ───────────────────────────────────────────────
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let events = sweep_state.lifecycle.sweep(types::now_ms());
            if !events.is_empty() {
                info!(count = events.len(), "lifecycle sweep applied transitions");
            }
        }
    });

    // ── 9. Paper mark-price sync ─────────────────────────────────────────
    if !paper_clients.is_empty() {
        let price_state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let key = {
                    let cfg = price_state.config.read();
                    BarKey::new(&cfg.symbol, &cfg.interval)
                };
                if let Some(price) = price_state.bars.last_price(&key) {
                    for client in &paper_clients {
                        client.set_mark_price(price);
                    }
                }
            }
        });
    }

    info!("all subsystems running; press Ctrl+C to stop");

    // ── 10. Graceful shutdown ────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if let Err(e) = state.config.read().save(CONFIG_PATH) {
        error!(error = %e, "failed to save engine config on shutdown");
    }

    info!("Quorum Engine shut down complete.");
    Ok(())
}

/// Load a JSONL bar replay file (one `Bar` per line).
fn load_bar_replay(path: &str) -> anyhow::Result<Vec<Bar>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bar replay from {path}"))?;

    let mut bars = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let bar: Bar = serde_json::from_str(line)
            .with_context(|| format!("bad bar on line {} of {path}", i + 1))?;
        bars.push(bar);
    }
    bars.sort_by_key(|b| b.open_time);
    Ok(bars)
}
