// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::types::Allocation;
use crate::infrastructure::network::vault::VaultClient;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use std::sync::Arc;

/// Write side of a rebalance decision. Exactly one submission per decision;
/// retry policy lives with the cycle, not here.
#[async_trait]
pub trait RebalanceExecutor: Send + Sync {
    async fn execute(
        &self,
        account: Address,
        allocation: &Allocation,
        rationale: &str,
    ) -> Result<B256, AppError>;
}

/// Submits the rebalance transaction and blocks until it is confirmed, so
/// callers observe consistent on-chain state afterwards.
pub struct TransactionExecutor {
    vault: Arc<VaultClient>,
    dry_run: bool,
}

impl TransactionExecutor {
    pub fn new(vault: Arc<VaultClient>, dry_run: bool) -> Self {
        Self { vault, dry_run }
    }
}

#[async_trait]
impl RebalanceExecutor for TransactionExecutor {
    async fn execute(
        &self,
        account: Address,
        allocation: &Allocation,
        rationale: &str,
    ) -> Result<B256, AppError> {
        if allocation.is_empty() {
            return Err(AppError::Validation {
                field: "allocation".into(),
                message: "refusing to submit an empty target allocation".into(),
            });
        }

        if self.dry_run {
            tracing::info!(
                target: "executor",
                account = %account,
                entries = allocation.entries.len(),
                rationale = %rationale,
                "Dry-run: would submit rebalance"
            );
            return Ok(B256::ZERO);
        }

        let hash = self
            .vault
            .submit_rebalance(account, allocation, rationale)
            .await?;
        let block = self.vault.wait_for_confirmation(hash).await?;
        tracing::info!(
            target: "executor",
            account = %account,
            hash = %format!("{:#x}", hash),
            block,
            "Rebalance confirmed"
        );
        Ok(hash)
    }
}
