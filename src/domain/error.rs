// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Ledger RPC unavailable: {0}")]
    RpcUnavailable(String),

    #[error("Rate source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("On-chain action not configured: {0}")]
    NotConfigured(String),

    #[error("Transaction submission rejected: {0}")]
    SubmissionFailed(String),

    #[error("Transaction {hash} unconfirmed after {timeout_ms}ms")]
    ConfirmationTimeout { hash: String, timeout_ms: u64 },

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Address {0} is invalid or not checksummed")]
    InvalidAddress(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
