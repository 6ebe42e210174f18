use serde::{Deserialize, Serialize};

use super::result::{default_success, summary_line, validate_charges, UsageMetrics};

/// Second-phase request: the user's own reading of a finished analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoCreateRequest {
    pub analysis_id: String,
    pub user_observation: String,
    pub user_resonance: String,
    pub user_intention: String,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub conversation_context: Option<String>,
}

impl CoCreateRequest {
    /// First required field that is empty or whitespace.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("analysis_id", &self.analysis_id),
            ("user_observation", &self.user_observation),
            ("user_resonance", &self.user_resonance),
            ("user_intention", &self.user_intention),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |text| text.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoCreateResult {
    #[serde(default = "default_success")]
    pub success: bool,
    pub suggested_message: String,
    pub usage: UsageMetrics,
    pub remaining_credits: f64,
}

impl CoCreateResult {
    pub fn summary_line(&self) -> String {
        summary_line(&self.usage, self.remaining_credits)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_charges(&self.usage, self.remaining_credits)
    }
}
