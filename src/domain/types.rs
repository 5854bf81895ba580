// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::{Address, U256};

pub const TOTAL_BPS: u64 = 10_000;

/// Risk bucket a yield source is classified into. Ordering matters:
/// a policy that allows `High` allows everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// Account-level risk policy stored on-chain as a u8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskPolicy {
    Conservative,
    Balanced,
    Aggressive,
}

impl RiskPolicy {
    /// Decode the on-chain representation. Unknown values are rejected at
    /// the read boundary instead of being guessed at.
    pub fn from_onchain(raw: u8) -> Result<Self, AppError> {
        match raw {
            0 => Ok(RiskPolicy::Conservative),
            1 => Ok(RiskPolicy::Balanced),
            2 => Ok(RiskPolicy::Aggressive),
            other => Err(AppError::Validation {
                field: "riskProfile".into(),
                message: format!("unknown risk policy {}", other),
            }),
        }
    }

    /// Risk tiers eligible under this policy. Conservative is a subset of
    /// Balanced, which is a subset of Aggressive.
    pub fn allowed_tiers(&self) -> &'static [RiskTier] {
        match self {
            RiskPolicy::Conservative => &[RiskTier::Low],
            RiskPolicy::Balanced => &[RiskTier::Low, RiskTier::Medium],
            RiskPolicy::Aggressive => &[RiskTier::Low, RiskTier::Medium, RiskTier::High],
        }
    }
}

impl std::fmt::Display for RiskPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskPolicy::Conservative => write!(f, "Conservative"),
            RiskPolicy::Balanced => write!(f, "Balanced"),
            RiskPolicy::Aggressive => write!(f, "Aggressive"),
        }
    }
}

/// One observed yield-source rate. Produced fresh every cycle and never
/// persisted; `apy` is a percentage (18.4 means 18.4%).
#[derive(Debug, Clone, PartialEq)]
pub struct YieldQuote {
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub address: Address,
    pub apy: f64,
    pub liquidity_usd: f64,
    pub risk: RiskTier,
    pub observed_at: u64,
}

/// Candidate allocation entry: a quote plus its basis-point share.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationEntry {
    pub quote: YieldQuote,
    pub weight_bps: u64,
}

/// Target allocation computed by the optimizer. Non-empty allocations
/// always sum to exactly `TOTAL_BPS`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub entries: Vec<AllocationEntry>,
}

impl Allocation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bps(&self) -> u64 {
        self.entries.iter().map(|e| e.weight_bps).sum()
    }
}

/// Allocation entry as held on-chain: no rate attached, only the source
/// reference and its share.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldEntry {
    pub address: Address,
    pub name: String,
    pub weight_bps: u64,
}

/// The allocation an account currently holds, decoded from ledger tuples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeldAllocation {
    pub entries: Vec<HeldEntry>,
}

impl HeldAllocation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate raw ledger entries into a held allocation. Weights above
    /// `TOTAL_BPS`, duplicate source names, and non-empty sets whose weights
    /// do not sum to `TOTAL_BPS` are malformed tuples.
    pub fn try_from_entries(entries: Vec<HeldEntry>) -> Result<Self, AppError> {
        let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.weight_bps > TOTAL_BPS {
                return Err(AppError::Validation {
                    field: "basisPoints".into(),
                    message: format!("{} holds {} bps", entry.name, entry.weight_bps),
                });
            }
            if seen.contains(&entry.name.as_str()) {
                return Err(AppError::Validation {
                    field: "protocolName".into(),
                    message: format!("duplicate source {}", entry.name),
                });
            }
            seen.push(entry.name.as_str());
        }
        let total: u64 = entries.iter().map(|e| e.weight_bps).sum();
        if !entries.is_empty() && total != TOTAL_BPS {
            return Err(AppError::Validation {
                field: "basisPoints".into(),
                message: format!("weights sum to {} bps", total),
            });
        }
        Ok(Self { entries })
    }
}

/// On-chain portfolio state for one tracked account. Read-only to the
/// agent; mutation happens only through a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub balance: U256,
    pub risk_policy: RiskPolicy,
    pub is_active: bool,
    pub allocation: HeldAllocation,
    pub deposit_ts: u64,
    pub last_rebalance_ts: u64,
    pub total_yield_earned: U256,
}

/// Outcome of one decision pass for one account. Always carries the
/// candidate allocation and its blended APY, whichever path produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceDecision {
    pub should_rebalance: bool,
    pub reasoning: String,
    pub new_allocation: Allocation,
    pub expected_apy: f64,
}
