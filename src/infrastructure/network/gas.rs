// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;

const DEFAULT_BASE_FEE_WEI: u128 = 1_500_000_000; // 1.5 gwei
const DEFAULT_PRIORITY_FEE_WEI: u128 = 2_000_000_000; // 2 gwei

#[derive(Debug, Clone)]
pub struct GasFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Clone)]
pub struct GasOracle {
    provider: HttpProvider,
}

impl GasOracle {
    pub fn new(provider: HttpProvider) -> Self {
        Self { provider }
    }

    /// EIP-1559 fee estimate from the latest block's base fee plus the
    /// node's suggested priority fee, with conservative defaults for nodes
    /// that expose neither.
    pub async fn estimate_eip1559_fees(&self) -> Result<GasFees, AppError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| AppError::Connection(format!("Latest block fetch failed: {}", e)))?;

        let base: u128 = block
            .as_ref()
            .and_then(|b| b.header.base_fee_per_gas)
            .map(|v| v as u128)
            .unwrap_or(DEFAULT_BASE_FEE_WEI);

        let priority: u128 = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(DEFAULT_PRIORITY_FEE_WEI);

        let next_base = bump_base_fee(base);
        Ok(GasFees {
            max_fee_per_gas: next_base + priority,
            max_priority_fee_per_gas: priority,
        })
    }
}

/// Worst-case next base fee: current base fee plus one full 12.5% step.
fn bump_base_fee(base: u128) -> u128 {
    base.saturating_mul(1_125) / 1_000
}
