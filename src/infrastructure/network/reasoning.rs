// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::domain::types::{Allocation, HeldAllocation, RiskPolicy, YieldQuote};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Everything the reasoning service is shown for one account's decision.
#[derive(Debug, Clone)]
pub struct ReasoningRequest<'a> {
    pub account: Address,
    pub risk_policy: RiskPolicy,
    pub current: &'a HeldAllocation,
    pub current_apy: f64,
    pub quotes: &'a [YieldQuote],
    pub candidate: &'a Allocation,
    pub candidate_apy: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasonedVerdict {
    pub should_rebalance: bool,
    pub reasoning: String,
}

/// Second opinion on a material rebalance. Treated as unreliable: any error
/// here sends the decision engine down its deterministic fallback.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn assess(&self, request: &ReasoningRequest<'_>) -> Result<ReasonedVerdict, AppError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiReasoner {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiReasoner {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("reasoning client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn assess(&self, request: &ReasoningRequest<'_>) -> Result<ReasonedVerdict, AppError> {
        let payload = json!({
            "model": self.model,
            "max_tokens": 256,
            "messages": [{ "role": "user", "content": render_prompt(request) }],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Reasoning POST failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ApiCall {
                provider: "reasoning".into(),
                status: status.as_u16(),
            });
        }

        let body: ChatCompletionResponse = resp.json().await.map_err(|_| AppError::ApiCall {
            provider: "reasoning JSON".into(),
            status: status.as_u16(),
        })?;
        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();

        parse_verdict(content)
    }
}

/// Locate and parse the first well-formed verdict object inside a free-text
/// model response.
pub fn parse_verdict(content: &str) -> Result<ReasonedVerdict, AppError> {
    let object = extract_json_object(content).ok_or_else(|| AppError::Validation {
        field: "reasoning response".into(),
        message: "no JSON object found".into(),
    })?;
    serde_json::from_str(object).map_err(|e| AppError::Validation {
        field: "reasoning response".into(),
        message: e.to_string(),
    })
}

/// Slice out the first balanced `{...}` in `text`, brace-counting with
/// string and escape awareness so prose around the object is tolerated.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn render_prompt(request: &ReasoningRequest<'_>) -> String {
    let current_lines = if request.current.is_empty() {
        "  (none - first allocation)".to_string()
    } else {
        request
            .current
            .entries
            .iter()
            .map(|e| format!("  - {}: {:.2}%", e.name, e.weight_bps as f64 / 100.0))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let quote_lines = request
        .quotes
        .iter()
        .map(|q| {
            format!(
                "  - {} ({}): APY {:.2}%, liquidity ${:.1}M, risk: {}",
                q.name,
                q.protocol,
                q.apy,
                q.liquidity_usd / 1e6,
                q.risk
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let candidate_lines = request
        .candidate
        .entries
        .iter()
        .map(|e| format!("  - {}: {:.2}%", e.quote.name, e.weight_bps as f64 / 100.0))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an autonomous yield optimization agent.\n\n\
         Account: {account}\n\
         Risk policy: {policy}\n\n\
         Current allocation:\n{current_lines}\n\
         Current blended APY: {current_apy:.2}%\n\n\
         Available source rates:\n{quote_lines}\n\n\
         Proposed new allocation (pre-computed):\n{candidate_lines}\n\
         Proposed blended APY: {candidate_apy:.2}%\n\
         APY delta: {delta:+.2}%\n\n\
         Should we rebalance? Reply ONLY as valid JSON:\n\
         {{\n  \"shouldRebalance\": boolean,\n  \"reasoning\": \"1-2 sentence explanation for the decision log\"\n}}",
        account = request.account,
        policy = request.risk_policy,
        current_apy = request.current_apy,
        candidate_apy = request.candidate_apy,
        delta = request.delta,
    )
}
