// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Tracks the agent wallet's transaction count locally so sequential
/// submissions within one process never reuse a sequence number.
#[derive(Clone)]
pub struct NonceManager {
    provider: HttpProvider,
    address: Address,
    local_nonce: Arc<Mutex<Option<u64>>>,
}

impl NonceManager {
    pub fn new(provider: HttpProvider, address: Address) -> Self {
        Self {
            provider,
            address,
            local_nonce: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get_next_nonce(&self) -> Result<u64, AppError> {
        let mut nonce_guard = self.local_nonce.lock().await;

        if let Some(nonce) = *nonce_guard {
            *nonce_guard = Some(nonce + 1);
            return Ok(nonce);
        }

        let nonce = self.fetch_onchain().await?;
        *nonce_guard = Some(nonce + 1);
        Ok(nonce)
    }

    /// Drop the local counter and re-read the on-chain count. Called after
    /// a failed or timed-out submission, where the local view may be stale.
    pub async fn resync(&self) -> Result<(), AppError> {
        let mut nonce_guard = self.local_nonce.lock().await;
        let nonce = self.fetch_onchain().await?;
        *nonce_guard = Some(nonce);
        tracing::info!(target: "executor", nonce, "Nonce resynced");
        Ok(())
    }

    async fn fetch_onchain(&self) -> Result<u64, AppError> {
        let provider = self.provider.clone();
        let address = self.address;
        retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch nonce: {}", e)))
    }
}
