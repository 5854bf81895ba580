// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::types::{AccountState, RebalanceDecision, YieldQuote};
use crate::infrastructure::network::reasoning::{Reasoner, ReasoningRequest};
use crate::services::agent::optimizer::{best_allocation, blended_apy, current_blended_apy};
use alloy::primitives::Address;
use std::sync::Arc;

/// Decides rebalance vs. hold for one account against one cycle's quotes.
/// Never touches the ledger; its only side effect is the optional call to
/// the external reasoning service.
pub struct DecisionEngine {
    reasoner: Option<Arc<dyn Reasoner>>,
    threshold_bps: u64,
}

impl DecisionEngine {
    pub fn new(reasoner: Option<Arc<dyn Reasoner>>, threshold_bps: u64) -> Self {
        Self {
            reasoner,
            threshold_bps,
        }
    }

    fn threshold_percent(&self) -> f64 {
        self.threshold_bps as f64 / 100.0
    }

    pub async fn decide(
        &self,
        account: Address,
        state: &AccountState,
        quotes: &[YieldQuote],
    ) -> RebalanceDecision {
        let candidate = best_allocation(quotes, state.risk_policy);
        let candidate_apy = blended_apy(&candidate);

        if candidate.is_empty() {
            return RebalanceDecision {
                should_rebalance: false,
                reasoning: format!(
                    "No eligible yield sources under the {} policy; holding.",
                    state.risk_policy
                ),
                new_allocation: candidate,
                expected_apy: candidate_apy,
            };
        }

        let current_apy = current_blended_apy(&state.allocation, quotes);
        let delta = candidate_apy - current_apy;
        let threshold = self.threshold_percent();

        // Materiality gate: immaterial deltas never reach the reasoning
        // service. Applied before any external call.
        if delta.abs() < threshold {
            return RebalanceDecision {
                should_rebalance: false,
                reasoning: format!(
                    "APY delta ({:+.2}%) is below the {:.2}% threshold. No rebalance needed.",
                    delta, threshold
                ),
                new_allocation: candidate,
                expected_apy: candidate_apy,
            };
        }

        if let Some(reasoner) = &self.reasoner {
            let request = ReasoningRequest {
                account,
                risk_policy: state.risk_policy,
                current: &state.allocation,
                current_apy,
                quotes,
                candidate: &candidate,
                candidate_apy,
                delta,
            };
            match reasoner.assess(&request).await {
                Ok(verdict) => {
                    return RebalanceDecision {
                        should_rebalance: verdict.should_rebalance,
                        reasoning: verdict.reasoning,
                        new_allocation: candidate,
                        expected_apy: candidate_apy,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        target: "decision",
                        account = %account,
                        error = %e,
                        "Reasoning service failed; using threshold fallback"
                    );
                }
            }
        } else {
            tracing::debug!(target: "decision", "No reasoning service configured; using threshold fallback");
        }

        let (should_rebalance, reasoning) = fallback_decision(delta, threshold);
        RebalanceDecision {
            should_rebalance,
            reasoning,
            new_allocation: candidate,
            expected_apy: candidate_apy,
        }
    }
}

/// The deterministic rule used whenever the reasoning service is out of the
/// picture. One-sided on purpose: a candidate that is merely different, or
/// worse, than the current allocation does not justify a transaction.
pub fn fallback_decision(delta: f64, threshold: f64) -> (bool, String) {
    if delta >= threshold {
        (
            true,
            format!(
                "Auto-rebalancing: detected {:+.2}% APY improvement opportunity.",
                delta
            ),
        )
    } else {
        (
            false,
            format!(
                "Holding: {:+.2}% APY delta does not clear the {:.2}% threshold.",
                delta, threshold
            ),
        )
    }
}
