// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// 0 means auto-detect from the RPC endpoint.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    // Ledger
    #[serde(default)]
    pub http_provider: String,
    pub vault_address: Option<Address>,

    // Identity
    pub wallet_key: Option<String>,

    // Loop tuning
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_rebalance_threshold_bps")]
    pub rebalance_threshold_bps: u64,
    #[serde(
        default,
        deserialize_with = "deserialize_account_list"
    )]
    pub tracked_accounts: Vec<Address>,

    // Reasoning service
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_reasoning_timeout_ms")]
    pub reasoning_timeout_ms: u64,

    // Confirmation tuning
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,

    // Rate feed
    #[serde(default = "default_rate_jitter_bps")]
    pub rate_jitter_bps: u64,
    pub morpho_address: Option<Address>,
    pub kuru_router_address: Option<Address>,
    pub ambient_address: Option<Address>,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_chain_id() -> u64 {
    10_143 // Monad testnet
}
fn default_poll_interval_ms() -> u64 {
    4_000
}
fn default_rebalance_threshold_bps() -> u64 {
    50
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_reasoning_timeout_ms() -> u64 {
    8_000
}
fn default_receipt_poll_ms() -> u64 {
    500
}
fn default_receipt_timeout_ms() -> u64 {
    12_000
}
fn default_rate_jitter_bps() -> u64 {
    1_000
}
fn default_metrics_port() -> u16 {
    9_000
}

fn deserialize_account_list<'de, D>(deserializer: D) -> Result<Vec<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};
    use std::fmt;

    struct AccountVisitor;

    impl<'de> Visitor<'de> for AccountVisitor {
        type Value = Vec<Address>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of addresses or a comma-separated address string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            parse_account_list(v).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                let addr = Address::from_str(elem.trim())
                    .map_err(|_| A::Error::custom(format!("invalid address '{}'", elem)))?;
                out.push(addr);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(AccountVisitor)
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected) = path {
            builder = builder.add_source(File::from(Path::new(selected)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: env/.env > selected profile file.
        builder = builder.add_source(Environment::default());

        let mut settings: GlobalSettings = builder.build()?.try_deserialize()?;

        // Allow TRACKED_ACCOUNTS env to be a comma/space separated string
        if let Ok(raw) = std::env::var("TRACKED_ACCOUNTS") {
            settings.tracked_accounts = parse_account_list(&raw)?;
        }

        if settings.http_provider.trim().is_empty() {
            return Err(AppError::Config("HTTP_PROVIDER is missing".to_string()));
        }

        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(500))
    }

    pub fn receipt_poll_ms_value(&self) -> u64 {
        self.receipt_poll_ms.max(100)
    }

    pub fn receipt_timeout_ms_value(&self) -> u64 {
        self.receipt_timeout_ms.max(self.receipt_poll_ms_value())
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoning_timeout_ms.max(1_000))
    }

    /// Jitter is capped so the simulated feed cannot swing a rate by more
    /// than half its base value.
    pub fn rate_jitter_bps_value(&self) -> u64 {
        self.rate_jitter_bps.min(5_000)
    }

    pub fn threshold_percent(&self) -> f64 {
        self.rebalance_threshold_bps as f64 / 100.0
    }

    pub fn wallet_key_value(&self) -> Option<&str> {
        self.wallet_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn openai_api_key_value(&self) -> Option<String> {
        if let Ok(v) = std::env::var("OPENAI_API_KEY")
            && !v.trim().is_empty()
        {
            return Some(v);
        }
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
    }
}

fn parse_account_list(raw: &str) -> Result<Vec<Address>, AppError> {
    let cleaned = raw.trim_matches(|c| c == '`' || c == '"' || c == '\'');
    let mut out = Vec::new();
    for part in cleaned.split(|c: char| c == ',' || c.is_whitespace()) {
        let p = part.trim();
        if p.is_empty() {
            continue;
        }
        let addr =
            Address::from_str(p).map_err(|_| AppError::InvalidAddress(p.to_string()))?;
        out.push(addr);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn base_settings() -> GlobalSettings {
        GlobalSettings {
            debug: default_debug(),
            chain_id: default_chain_id(),
            http_provider: "http://localhost:8545".to_string(),
            vault_address: None,
            wallet_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            rebalance_threshold_bps: default_rebalance_threshold_bps(),
            tracked_accounts: Vec::new(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            reasoning_timeout_ms: default_reasoning_timeout_ms(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
            rate_jitter_bps: default_rate_jitter_bps(),
            morpho_address: None,
            kuru_router_address: None,
            ambient_address: None,
            metrics_port: default_metrics_port(),
        }
    }

    #[test]
    fn parses_comma_separated_accounts() {
        let parsed = parse_account_list(
            "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002",
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn rejects_garbage_account_entries() {
        let err = parse_account_list("0x01,not-an-address").unwrap_err();
        assert!(matches!(err, AppError::InvalidAddress(_)));
    }

    #[test]
    fn timing_values_have_safe_floors() {
        let mut settings = base_settings();
        settings.receipt_poll_ms = 0;
        settings.receipt_timeout_ms = 1;
        settings.poll_interval_ms = 1;
        assert_eq!(settings.receipt_poll_ms_value(), 100);
        assert_eq!(settings.receipt_timeout_ms_value(), 100);
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn jitter_is_capped() {
        let mut settings = base_settings();
        settings.rate_jitter_bps = 9_999;
        assert_eq!(settings.rate_jitter_bps_value(), 5_000);
    }

    #[test]
    fn threshold_bps_converts_to_percent() {
        let settings = base_settings();
        assert!((settings.threshold_percent() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_wallet_key_reads_as_unset() {
        let mut settings = base_settings();
        settings.wallet_key = Some("   ".to_string());
        assert!(settings.wallet_key_value().is_none());
    }

    #[test]
    fn tracked_accounts_env_overrides_profile() {
        let _env_lock = env_lock_guard();
        let tmp = std::env::temp_dir().join(format!(
            "rebalancer-config-{}.toml",
            std::process::id()
        ));
        let body = r#"
http_provider = "http://localhost:8545"
tracked_accounts = ["0x0000000000000000000000000000000000000001"]
"#;
        std::fs::write(&tmp, body).expect("write temp config");
        let old = std::env::var("TRACKED_ACCOUNTS").ok();
        unsafe {
            std::env::set_var(
                "TRACKED_ACCOUNTS",
                "0x0000000000000000000000000000000000000002,0x0000000000000000000000000000000000000003",
            );
        }

        let loaded = GlobalSettings::load_with_path(Some(tmp.to_str().expect("utf8 path")))
            .expect("load settings");
        assert_eq!(loaded.tracked_accounts.len(), 2);

        std::fs::remove_file(&tmp).ok();
        if let Some(v) = old {
            unsafe { std::env::set_var("TRACKED_ACCOUNTS", v) };
        } else {
            unsafe { std::env::remove_var("TRACKED_ACCOUNTS") };
        }
    }
}
