// Declare the modules
pub mod accounts;
pub mod api;
pub mod commands;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod gallery;
pub mod host;
pub mod issuer;
pub mod models;
pub mod session;
pub mod state;
pub mod storage;

use anyhow::Context;
use config::AppConfig;
use state::AppState;

pub fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let config = AppConfig::from_env()?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    runtime.block_on(async {
        let app_state = AppState::initialize(&config).await?;
        host::run_terminal(app_state).await
    })
}
