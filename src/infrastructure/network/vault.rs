// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::types::{AccountState, Allocation, HeldAllocation, HeldEntry, RiskPolicy};
use crate::infrastructure::network::gas::GasOracle;
use crate::infrastructure::network::nonce::NonceManager;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxEip1559};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, TxKind, U256};
use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Writing an allocation across several protocol adapters; sized for the
/// largest eligible source set rather than estimated per call.
const REBALANCE_GAS_LIMIT: u64 = 450_000;

sol! {
    #[derive(Debug)]
    #[sol(rpc)]
    contract PortfolioVault {
        struct AllocationView {
            address protocol;
            uint256 basisPoints;
            string protocolName;
        }

        function getPortfolioState(address user) external view returns (
            uint256 balance,
            uint8 riskProfile,
            uint256 depositTimestamp,
            uint256 lastRebalanceTimestamp,
            uint256 totalYieldEarned,
            bool isActive
        );

        function getAllocations(address user) external view returns (AllocationView[] memory);

        function rebalance(
            address user,
            address[] calldata protocols,
            uint256[] calldata basisPoints,
            string[] calldata protocolNames,
            string calldata reasoning
        ) external;
    }
}

/// Read side of the ledger, as the scheduler sees it.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// False when the vault address is unset and account reads would be
    /// `NotConfigured`; block height still works.
    fn is_configured(&self) -> bool {
        true
    }

    async fn block_height(&self) -> Result<u64, AppError>;

    async fn account_state(&self, account: Address) -> Result<AccountState, AppError>;
}

struct SigningContext {
    signer: PrivateKeySigner,
    nonce_manager: NonceManager,
}

/// Typed client for the portfolio vault contract. Raw positional tuples
/// never leave this module; everything downstream sees `AccountState`.
pub struct VaultClient {
    provider: HttpProvider,
    vault: Option<Address>,
    chain_id: u64,
    signing: Option<SigningContext>,
    gas_oracle: GasOracle,
    receipt_poll: Duration,
    receipt_timeout: Duration,
}

impl VaultClient {
    pub fn new(
        provider: HttpProvider,
        vault: Option<Address>,
        chain_id: u64,
        signer: Option<PrivateKeySigner>,
        receipt_poll_ms: u64,
        receipt_timeout_ms: u64,
    ) -> Self {
        let gas_oracle = GasOracle::new(provider.clone());
        let signing = signer.map(|signer| {
            let nonce_manager = NonceManager::new(provider.clone(), signer.address());
            SigningContext {
                signer,
                nonce_manager,
            }
        });
        Self {
            provider,
            vault,
            chain_id,
            signing,
            gas_oracle,
            receipt_poll: Duration::from_millis(receipt_poll_ms),
            receipt_timeout: Duration::from_millis(receipt_timeout_ms),
        }
    }

    pub fn can_sign(&self) -> bool {
        self.signing.is_some()
    }

    /// Submit one rebalance transaction. No internal retry; callers own the
    /// retry policy across cycles.
    pub async fn submit_rebalance(
        &self,
        account: Address,
        allocation: &Allocation,
        rationale: &str,
    ) -> Result<B256, AppError> {
        let vault = self
            .vault
            .ok_or_else(|| AppError::NotConfigured("vault address unset".to_string()))?;
        let signing = self
            .signing
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("signing key unset".to_string()))?;

        // Positionally aligned arrays, one slot per allocation entry.
        let protocols: Vec<Address> = allocation.entries.iter().map(|e| e.quote.address).collect();
        let weights: Vec<U256> = allocation
            .entries
            .iter()
            .map(|e| U256::from(e.weight_bps))
            .collect();
        let names: Vec<String> = allocation
            .entries
            .iter()
            .map(|e| e.quote.name.clone())
            .collect();

        let contract = PortfolioVault::new(vault, self.provider.clone());
        let calldata = contract
            .rebalance(account, protocols, weights, names, rationale.to_string())
            .calldata()
            .to_vec();

        let fees = self.gas_oracle.estimate_eip1559_fees().await?;
        let nonce = signing.nonce_manager.get_next_nonce().await?;

        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit: REBALANCE_GAS_LIMIT,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(vault),
            value: U256::ZERO,
            access_list: Default::default(),
            input: calldata.into(),
        };
        let sig = TxSignerSync::sign_transaction_sync(&signing.signer, &mut tx)
            .map_err(|e| AppError::SubmissionFailed(format!("Signing failed: {}", e)))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let raw = signed.encoded_2718();

        match self.provider.send_raw_transaction(raw.as_slice()).await {
            Ok(pending) => {
                let hash = *pending.tx_hash();
                tracing::info!(
                    target: "executor",
                    account = %account,
                    hash = %format!("{:#x}", hash),
                    entries = allocation.entries.len(),
                    "Rebalance transaction sent"
                );
                Ok(hash)
            }
            Err(e) => {
                // Local counter may now be ahead of the chain.
                if let Err(re) = signing.nonce_manager.resync().await {
                    tracing::warn!(target: "executor", error = %re, "Nonce resync failed after rejection");
                }
                Err(AppError::SubmissionFailed(e.to_string()))
            }
        }
    }

    /// Poll for the receipt until the confirmation deadline.
    pub async fn wait_for_confirmation(&self, hash: B256) -> Result<u64, AppError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            if let Ok(Some(receipt)) = self.provider.get_transaction_receipt(hash).await {
                if receipt.status() {
                    return Ok(receipt.block_number.unwrap_or_default());
                }
                return Err(AppError::SubmissionFailed(format!(
                    "transaction {:#x} reverted on-chain",
                    hash
                )));
            }
            if Instant::now() >= deadline {
                return Err(AppError::ConfirmationTimeout {
                    hash: format!("{:#x}", hash),
                    timeout_ms: self.receipt_timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

#[async_trait]
impl Ledger for VaultClient {
    fn is_configured(&self) -> bool {
        self.vault.is_some()
    }

    async fn block_height(&self) -> Result<u64, AppError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| AppError::RpcUnavailable(format!("block height: {}", e)))
    }

    async fn account_state(&self, account: Address) -> Result<AccountState, AppError> {
        let vault = self
            .vault
            .ok_or_else(|| AppError::NotConfigured("vault address unset".to_string()))?;
        let contract = PortfolioVault::new(vault, self.provider.clone());

        let state = contract
            .getPortfolioState(account)
            .call()
            .await
            .map_err(|e| AppError::RpcUnavailable(format!("getPortfolioState: {}", e)))?;
        let allocations = contract
            .getAllocations(account)
            .call()
            .await
            .map_err(|e| AppError::RpcUnavailable(format!("getAllocations: {}", e)))?;

        let raw_allocations = allocations
            .into_iter()
            .map(|view| (view.protocol, view.basisPoints, view.protocolName))
            .collect();

        decode_account_state(
            state.balance,
            state.riskProfile,
            state.depositTimestamp,
            state.lastRebalanceTimestamp,
            state.totalYieldEarned,
            state.isActive,
            raw_allocations,
        )
    }
}

/// Decode the vault's positional tuples into typed account state. Kept as a
/// plain function so malformed-tuple handling is testable without a node.
fn decode_account_state(
    balance: U256,
    risk_raw: u8,
    deposit_ts: U256,
    last_rebalance_ts: U256,
    total_yield_earned: U256,
    is_active: bool,
    raw_allocations: Vec<(Address, U256, String)>,
) -> Result<AccountState, AppError> {
    let risk_policy = RiskPolicy::from_onchain(risk_raw)?;

    let mut entries = Vec::with_capacity(raw_allocations.len());
    for (address, bps, name) in raw_allocations {
        let weight_bps = u64::try_from(bps).map_err(|_| AppError::Validation {
            field: "basisPoints".into(),
            message: format!("{} exceeds u64 range", bps),
        })?;
        entries.push(HeldEntry {
            address,
            name,
            weight_bps,
        });
    }
    let allocation = HeldAllocation::try_from_entries(entries)?;

    Ok(AccountState {
        balance,
        risk_policy,
        is_active,
        allocation,
        deposit_ts: u64::try_from(deposit_ts).unwrap_or(u64::MAX),
        last_rebalance_ts: u64::try_from(last_rebalance_ts).unwrap_or(u64::MAX),
        total_yield_earned,
    })
}
