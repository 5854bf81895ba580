// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use oxidity_rebalancer::app::config::GlobalSettings;
use oxidity_rebalancer::app::logging::setup_logging;
use oxidity_rebalancer::domain::error::AppError;
use oxidity_rebalancer::infrastructure::network::provider::ConnectionFactory;
use oxidity_rebalancer::infrastructure::network::reasoning::{OpenAiReasoner, Reasoner};
use oxidity_rebalancer::infrastructure::network::vault::VaultClient;
use oxidity_rebalancer::services::agent::decision::DecisionEngine;
use oxidity_rebalancer::services::agent::executor::TransactionExecutor;
use oxidity_rebalancer::services::agent::rates::SimulatedRateFeed;
use oxidity_rebalancer::services::agent::scheduler::{AgentStats, CycleScheduler};
use oxidity_rebalancer::services::metrics::spawn_metrics_server;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "oxidity rebalancer")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Do not submit transactions, only decide and log
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Poll interval in milliseconds (overrides config/env)
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let provider = ConnectionFactory::http(&settings.http_provider)?;

    // Auto-detect chain if not explicitly configured
    let chain_id = if settings.chain_id == 0 {
        let detected = provider
            .get_chain_id()
            .await
            .map_err(|e| AppError::Connection(format!("chain_id detect failed: {e}")))?;
        tracing::info!(target: "config", detected_chain = detected, rpc = %settings.http_provider, "Auto-detected chain_id from RPC");
        detected
    } else {
        settings.chain_id
    };

    let signer = match settings.wallet_key_value() {
        Some(raw) => match PrivateKeySigner::from_str(raw) {
            Ok(signer) => Some(signer),
            Err(e) => {
                tracing::error!(
                    target: "config",
                    error = %e,
                    "WALLET_KEY is invalid; transaction submission disabled"
                );
                None
            }
        },
        None => {
            tracing::warn!(target: "config", "No WALLET_KEY configured; running observation-only");
            None
        }
    };
    if settings.vault_address.is_none() {
        tracing::warn!(target: "config", "VAULT_ADDRESS not set; on-chain actions disabled");
    }

    let vault = Arc::new(VaultClient::new(
        provider.clone(),
        settings.vault_address,
        chain_id,
        signer,
        settings.receipt_poll_ms_value(),
        settings.receipt_timeout_ms_value(),
    ));

    let rates = Arc::new(SimulatedRateFeed::from_settings(&settings));

    let reasoner: Option<Arc<dyn Reasoner>> = match settings.openai_api_key_value() {
        Some(key) => Some(Arc::new(OpenAiReasoner::new(
            key,
            settings.openai_model.clone(),
            settings.openai_base_url.clone(),
            settings.reasoning_timeout(),
        )?)),
        None => {
            tracing::warn!(target: "config", "No reasoning credential; decisions use the threshold rule only");
            None
        }
    };
    let decision = DecisionEngine::new(reasoner, settings.rebalance_threshold_bps);

    let executor = Arc::new(TransactionExecutor::new(vault.clone(), cli.dry_run));

    let stats = Arc::new(AgentStats::default());
    let metrics_port = cli.metrics_port.unwrap_or(settings.metrics_port);
    let _metrics_addr = spawn_metrics_server(metrics_port, stats.clone()).await;

    let poll_interval = cli
        .poll_interval_ms
        .map(|ms| Duration::from_millis(ms.max(500)))
        .unwrap_or_else(|| settings.poll_interval());

    tracing::info!(
        target: "scheduler",
        chain_id,
        poll_ms = poll_interval.as_millis() as u64,
        threshold_bps = settings.rebalance_threshold_bps,
        vault = %settings
            .vault_address
            .map(|a| format!("{:#x}", a))
            .unwrap_or_else(|| "NOT DEPLOYED".to_string()),
        tracked = settings.tracked_accounts.len(),
        dry_run = cli.dry_run,
        "Rebalancing agent starting"
    );

    let scheduler = CycleScheduler::new(
        vault,
        rates,
        decision,
        executor,
        settings.tracked_accounts.clone(),
        poll_interval,
        stats,
    );
    scheduler.run().await
}
