// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::types::YieldQuote;
use crate::infrastructure::network::vault::Ledger;
use crate::services::agent::decision::DecisionEngine;
use crate::services::agent::executor::RebalanceExecutor;
use crate::services::agent::rates::RateFeed;
use alloy::primitives::{Address, B256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-process agent counters, served by the metrics listener.
#[derive(Debug, Default)]
pub struct AgentStats {
    pub cycles: AtomicU64,
    pub processed: AtomicU64,
    pub held: AtomicU64,
    pub rebalanced: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

/// What one account's pass through the cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountOutcome {
    Skipped(&'static str),
    Held,
    Rebalanced(B256),
}

/// The control loop. Block-height state lives on the instance, not in
/// process globals, so schedulers in tests run independently.
pub struct CycleScheduler {
    ledger: Arc<dyn Ledger>,
    rates: Arc<dyn RateFeed>,
    decision: DecisionEngine,
    executor: Arc<dyn RebalanceExecutor>,
    accounts: Vec<Address>,
    poll_interval: Duration,
    last_height: u64,
    cycles: u64,
    stats: Arc<AgentStats>,
}

impl CycleScheduler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        rates: Arc<dyn RateFeed>,
        decision: DecisionEngine,
        executor: Arc<dyn RebalanceExecutor>,
        accounts: Vec<Address>,
        poll_interval: Duration,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            ledger,
            rates,
            decision,
            executor,
            accounts,
            poll_interval,
            last_height: 0,
            cycles: 0,
            stats,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn last_height(&self) -> u64 {
        self.last_height
    }

    /// Run forever. The first tick fires immediately; afterwards the loop
    /// follows the fixed poll interval. No tick error unwinds past here.
    pub async fn run(mut self) -> Result<(), AppError> {
        tracing::info!(
            target: "scheduler",
            accounts = self.accounts.len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Scheduler starting"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::warn!(target: "scheduler", error = %e, "Cycle aborted; retrying next tick");
            }
        }
    }

    /// One tick. A height at or below the last processed one is a no-op;
    /// a new height runs a full cycle over all tracked accounts.
    pub async fn tick(&mut self) -> Result<(), AppError> {
        let height = self.ledger.block_height().await?;
        if height <= self.last_height {
            tracing::trace!(target: "scheduler", height, "No new block");
            return Ok(());
        }

        let quotes = self.rates.fetch_quotes().await?;
        // Commit the height only after quotes arrive, so an aborted cycle
        // is retried at the same height on the next tick.
        self.last_height = height;
        self.cycles += 1;
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            target: "scheduler",
            cycle = self.cycles,
            height,
            quotes = quotes.len(),
            "Cycle started"
        );
        for q in &quotes {
            tracing::debug!(target: "scheduler", source = %q.name, apy = %format!("{:.2}", q.apy), "Quote");
        }

        if !self.ledger.is_configured() {
            tracing::info!(target: "scheduler", "Vault not deployed; skipping on-chain checks");
            return Ok(());
        }

        for &account in &self.accounts {
            match self.process_account(account, &quotes).await {
                Ok(AccountOutcome::Skipped(reason)) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(target: "scheduler", account = %account, reason, "Account skipped");
                }
                Ok(AccountOutcome::Held) => {
                    self.stats.held.fetch_add(1, Ordering::Relaxed);
                }
                Ok(AccountOutcome::Rebalanced(hash)) => {
                    self.stats.rebalanced.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        target: "scheduler",
                        account = %account,
                        hash = %format!("{:#x}", hash),
                        "Account rebalanced"
                    );
                }
                // Malformed on-chain state is a no-action outcome, not a
                // cycle failure.
                Err(AppError::Validation { field, message }) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target: "scheduler",
                        account = %account,
                        field = %field,
                        message = %message,
                        "Malformed account state; no action"
                    );
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(target: "scheduler", account = %account, error = %e, "Account processing failed");
                }
            }
        }
        Ok(())
    }

    async fn process_account(
        &self,
        account: Address,
        quotes: &[YieldQuote],
    ) -> Result<AccountOutcome, AppError> {
        let state = self.ledger.account_state(account).await?;
        if !state.is_active || state.balance.is_zero() {
            return Ok(AccountOutcome::Skipped("inactive or zero balance"));
        }
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let decision = self.decision.decide(account, &state, quotes).await;
        tracing::info!(
            target: "scheduler",
            account = %account,
            rebalance = decision.should_rebalance,
            expected_apy = %format!("{:.2}", decision.expected_apy),
            reasoning = %decision.reasoning,
            "Decision"
        );

        if decision.should_rebalance && !decision.new_allocation.is_empty() {
            let hash = self
                .executor
                .execute(account, &decision.new_allocation, &decision.reasoning)
                .await?;
            return Ok(AccountOutcome::Rebalanced(hash));
        }
        Ok(AccountOutcome::Held)
    }
}
