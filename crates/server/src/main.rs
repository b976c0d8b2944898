//! depsweep backend entry point.
//!
//! Wires the HTTP clients, the state-owning actor, the periodic registry
//! poll, and the operator websocket console together, then serves until
//! killed.

use anyhow::{Context, Result};
use depsweep_hosting::HttpHosting;
use depsweep_registry::HttpRegistry;
use depsweep_server::actor::{Backend, Msg};
use depsweep_server::config::Config;
use depsweep_server::console;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// Registry publications are infrequent; a slow steady poll keeps the bot
// current without hammering the index endpoint.
const POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("configuration")?;

    let http = reqwest::Client::builder()
        .build()
        .context("build HTTP client")?;
    let registry = Arc::new(HttpRegistry::new(http.clone()));
    let hosting = Arc::new(HttpHosting::new(http, config.github_token.clone()));

    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Backend::new(registry, hosting, config.backend_settings(), tx.clone());
    tokio::spawn(backend.run(rx));

    // Initial poll plus a steady re-poll; the actor recomputes the cursor
    // from its cache size each time.
    tx.send(Msg::PollRegistry).ok();
    let poll_tx = tx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            if poll_tx.send(Msg::PollRegistry).is_err() {
                break;
            }
        }
    });

    let listener = TcpListener::bind(&config.console_addr)
        .await
        .with_context(|| format!("bind console listener on {}", config.console_addr))?;
    log::info!("operator console listening on {}", config.console_addr);

    console::run_console(listener, tx).await
}
