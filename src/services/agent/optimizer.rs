// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::types::{
    Allocation, AllocationEntry, HeldAllocation, RiskPolicy, TOTAL_BPS, YieldQuote,
};

/// Rank eligible sources by APY and assign the fixed concentration curve.
/// Returns the empty allocation when no source clears the risk policy;
/// callers must treat that as "no valid target, hold".
pub fn best_allocation(quotes: &[YieldQuote], policy: RiskPolicy) -> Allocation {
    let allowed = policy.allowed_tiers();
    let mut eligible: Vec<&YieldQuote> =
        quotes.iter().filter(|q| allowed.contains(&q.risk)).collect();
    if eligible.is_empty() {
        return Allocation::empty();
    }

    // Stable sort: APY ties keep their feed order, so the same input always
    // yields the same ranking.
    eligible.sort_by(|a, b| b.apy.partial_cmp(&a.apy).unwrap_or(std::cmp::Ordering::Equal));

    let weights = concentration_weights(eligible.len());
    let entries = eligible
        .into_iter()
        .zip(weights)
        .map(|(quote, weight_bps)| AllocationEntry {
            quote: quote.clone(),
            weight_bps,
        })
        .collect();
    Allocation { entries }
}

/// The fixed concentration curve over ranked sources:
/// 1 source takes everything; 2 split 60/40; 3 or more give the top two
/// 50% and 30% and divide the remaining 20% evenly over the tail, with the
/// last tail entry absorbing the integer-division remainder so the total
/// is always exactly `TOTAL_BPS`.
fn concentration_weights(n: usize) -> Vec<u64> {
    match n {
        0 => Vec::new(),
        1 => vec![TOTAL_BPS],
        2 => vec![6_000, 4_000],
        n => {
            let mut out = vec![5_000, 3_000];
            let remainder = TOTAL_BPS - 8_000;
            let tail = (n - 2) as u64;
            let per_each = remainder / tail;
            for i in 0..tail {
                if i == tail - 1 {
                    out.push(remainder - per_each * (tail - 1));
                } else {
                    out.push(per_each);
                }
            }
            out
        }
    }
}

/// Weighted average APY of a candidate allocation.
pub fn blended_apy(allocation: &Allocation) -> f64 {
    allocation
        .entries
        .iter()
        .map(|e| e.quote.apy * e.weight_bps as f64 / TOTAL_BPS as f64)
        .sum()
}

/// Blended APY of the allocation an account currently holds, matched to
/// this cycle's quotes by source name. Entries with no matching quote
/// contribute zero.
pub fn current_blended_apy(held: &HeldAllocation, quotes: &[YieldQuote]) -> f64 {
    held.entries
        .iter()
        .map(|e| {
            let apy = quotes
                .iter()
                .find(|q| q.name == e.name)
                .map(|q| q.apy)
                .unwrap_or(0.0);
            apy * e.weight_bps as f64 / TOTAL_BPS as f64
        })
        .sum()
}
