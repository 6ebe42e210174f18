use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    #[default]
    Standard,
    Premium,
}

impl QualityTier {
    pub fn from_premium_flag(use_premium: bool) -> Self {
        if use_premium {
            Self::Premium
        } else {
            Self::Standard
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, Self::Premium)
    }

    /// Literal sent in the `use_premium` form field.
    pub fn form_value(self) -> &'static str {
        if self.is_premium() {
            "true"
        } else {
            "false"
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "Standard Model",
            Self::Premium => "Premium Model (Claude Opus)",
        }
    }

    pub fn cost_hint(self) -> &'static str {
        match self {
            Self::Standard => "~$0.02-0.04",
            Self::Premium => "~$0.10-0.20",
        }
    }
}
