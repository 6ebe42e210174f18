use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::opener::extract_suggested_opener;

/// Token and dollar accounting reported for one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(rename = "cost_usd")]
    pub compute_cost_usd: f64,
    #[serde(rename = "charge_usd")]
    pub charged_usd: f64,
    #[serde(default)]
    pub model_used: String,
}

impl UsageMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(rename = "analysis")]
    pub raw_analysis_text: String,
    pub usage: UsageMetrics,
    pub remaining_credits: f64,
    #[serde(default)]
    pub analysis_id: Option<String>,
}

impl AnalysisResult {
    /// Re-derived on every call; never cached on the result.
    pub fn suggested_opener(&self) -> Option<String> {
        extract_suggested_opener(&self.raw_analysis_text)
    }

    pub fn summary_line(&self) -> String {
        summary_line(&self.usage, self.remaining_credits)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_charges(&self.usage, self.remaining_credits)
    }
}

pub(crate) fn summary_line(usage: &UsageMetrics, remaining_credits: f64) -> String {
    format!(
        "Cost: ${:.4} | Tokens: {} | Balance: ${:.2}",
        usage.charged_usd,
        usage.total_tokens(),
        remaining_credits
    )
}

pub(crate) fn validate_charges(usage: &UsageMetrics, remaining_credits: f64) -> Result<(), String> {
    for (field, value) in [
        ("usage.cost_usd", usage.compute_cost_usd),
        ("usage.charge_usd", usage.charged_usd),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{field} must be a non-negative number, got {value}"));
        }
    }
    if !remaining_credits.is_finite() {
        return Err("remaining_credits must be finite".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditsBalance {
    pub credits: f64,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHistoryItem {
    pub id: String,
    pub analysis_text: String,
    pub created_at: DateTime<Utc>,
    pub model_used: String,
    pub cost_usd: f64,
    pub charge_usd: f64,
}

impl AnalysisHistoryItem {
    pub fn suggested_opener(&self) -> Option<String> {
        extract_suggested_opener(&self.analysis_text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHistory {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub analyses: Vec<AnalysisHistoryItem>,
}

/// Pulls a human-readable `detail` string out of an error body.
///
/// Anything else (non-JSON, structured validation errors, blank strings)
/// yields `None` so the caller can fall back to a generic message.
pub fn error_detail(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let detail = parsed.get("detail")?.as_str()?.trim();
    if detail.is_empty() {
        return None;
    }
    Some(detail.to_string())
}

pub(crate) fn default_success() -> bool {
    true
}
