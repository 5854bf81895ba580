// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::app::config::GlobalSettings;
use crate::domain::error::AppError;
use crate::domain::types::{RiskTier, YieldQuote};
use alloy::primitives::Address;
use async_trait::async_trait;
use rand::Rng;

/// Source of the per-cycle quote set. One call per cycle; results are
/// shared across every tracked account in that cycle.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch_quotes(&self) -> Result<Vec<YieldQuote>, AppError>;
}

/// Static description of one observable yield source.
#[derive(Debug, Clone)]
pub struct ProtocolSource {
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub address: Address,
    pub base_apy: f64,
    pub liquidity_usd: f64,
    pub risk: RiskTier,
}

/// Testnet feed: a fixed protocol catalog with bounded per-observation
/// jitter standing in for live market movement. Production deployments
/// swap this for adapters reading lending/AMM contracts directly.
pub struct SimulatedRateFeed {
    sources: Vec<ProtocolSource>,
    jitter_bps: u64,
}

impl SimulatedRateFeed {
    pub fn new(sources: Vec<ProtocolSource>, jitter_bps: u64) -> Self {
        Self {
            sources,
            jitter_bps,
        }
    }

    pub fn from_settings(settings: &GlobalSettings) -> Self {
        let morpho = settings.morpho_address.unwrap_or(Address::ZERO);
        let kuru = settings.kuru_router_address.unwrap_or(Address::ZERO);
        let ambient = settings.ambient_address.unwrap_or(Address::ZERO);
        let sources = vec![
            ProtocolSource {
                id: "morpho-usdc".into(),
                name: "Morpho USDC".into(),
                protocol: "Morpho".into(),
                address: morpho,
                base_apy: 18.4,
                liquidity_usd: 2_100_000.0,
                risk: RiskTier::Low,
            },
            ProtocolSource {
                id: "kuru-mon-usdc".into(),
                name: "Kuru MON/USDC LP".into(),
                protocol: "Kuru".into(),
                address: kuru,
                base_apy: 32.7,
                liquidity_usd: 890_000.0,
                risk: RiskTier::Medium,
            },
            ProtocolSource {
                id: "kuru-mon-wmon".into(),
                name: "Kuru MON/WMON LP".into(),
                protocol: "Kuru".into(),
                address: kuru,
                base_apy: 22.5,
                liquidity_usd: 1_200_000.0,
                risk: RiskTier::Medium,
            },
            ProtocolSource {
                id: "ambient-usdc".into(),
                name: "Ambient USDC".into(),
                protocol: "Ambient".into(),
                address: ambient,
                base_apy: 14.1,
                liquidity_usd: 3_400_000.0,
                risk: RiskTier::Low,
            },
        ];
        Self::new(sources, settings.rate_jitter_bps_value())
    }

    fn observe(&self, source: &ProtocolSource, observed_at: u64) -> Result<YieldQuote, AppError> {
        Ok(YieldQuote {
            id: source.id.clone(),
            name: source.name.clone(),
            protocol: source.protocol.clone(),
            address: source.address,
            apy: apply_jitter(source.base_apy, self.jitter_bps),
            liquidity_usd: source.liquidity_usd,
            risk: source.risk,
            observed_at,
        })
    }
}

#[async_trait]
impl RateFeed for SimulatedRateFeed {
    async fn fetch_quotes(&self) -> Result<Vec<YieldQuote>, AppError> {
        if self.sources.is_empty() {
            return Err(AppError::SourceUnavailable(
                "no yield sources configured".to_string(),
            ));
        }

        let observed_at = chrono::Utc::now().timestamp().max(0) as u64;
        let mut quotes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match self.observe(source, observed_at) {
                Ok(quote) => quotes.push(quote),
                // A partial quote set is still usable downstream.
                Err(e) => {
                    tracing::warn!(target: "rates", source = %source.name, error = %e, "Source observation failed")
                }
            }
        }

        if quotes.is_empty() {
            return Err(AppError::SourceUnavailable(
                "all yield sources failed this cycle".to_string(),
            ));
        }
        Ok(quotes)
    }
}

/// Scale `base` by a uniform factor in `[-jitter_bps, +jitter_bps]`.
fn apply_jitter(base: f64, jitter_bps: u64) -> f64 {
    if jitter_bps == 0 {
        return base;
    }
    let span = jitter_bps as f64 / 10_000.0;
    base * (1.0 + rand::rng().random_range(-span..=span))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, apy: f64) -> ProtocolSource {
        ProtocolSource {
            id: name.to_lowercase(),
            name: name.to_string(),
            protocol: "Test".to_string(),
            address: Address::ZERO,
            base_apy: apy,
            liquidity_usd: 1_000_000.0,
            risk: RiskTier::Low,
        }
    }

    #[test]
    fn zero_jitter_returns_base_rate() {
        assert_eq!(apply_jitter(18.4, 0), 18.4);
    }

    #[test]
    fn jitter_stays_within_configured_bounds() {
        for _ in 0..200 {
            let apy = apply_jitter(20.0, 1_000);
            assert!((18.0..=22.0).contains(&apy), "apy {} out of bounds", apy);
        }
    }

    #[tokio::test]
    async fn fetch_preserves_catalog_order() {
        let feed = SimulatedRateFeed::new(vec![source("A", 10.0), source("B", 30.0)], 0);
        let quotes = feed.fetch_quotes().await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].name, "A");
        assert_eq!(quotes[1].name, "B");
    }

    #[tokio::test]
    async fn empty_catalog_is_source_unavailable() {
        let feed = SimulatedRateFeed::new(vec![], 0);
        let err = feed.fetch_quotes().await.unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));
    }
}
