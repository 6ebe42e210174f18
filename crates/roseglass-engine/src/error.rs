use thiserror::Error;

pub const PROFILE_IMAGES_REQUIRED: &str = "at least one profile screenshot required";

pub const ANALYSIS_ACTION: &str = "analysis";
pub const CREDITS_ACTION: &str = "credits lookup";
pub const HISTORY_ACTION: &str = "history lookup";
pub const CO_CREATE_ACTION: &str = "co-creation";

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Local precondition failure; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// Non-2xx reply. `message` is the server's `detail` or a generic fallback.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// No response was received. `action` names the call that failed.
    #[error("{action} failed, please try again")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to get credits")]
    CreditsUnavailable { status: u16 },

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl AnalysisError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    pub fn transport(action: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { action, source }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::CreditsUnavailable { status } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            Self::Validation(_) | Self::InvalidResponse { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Http { .. } => "http",
            Self::Transport { .. } => "transport",
            Self::CreditsUnavailable { .. } => "credits_unavailable",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisError, PROFILE_IMAGES_REQUIRED};

    #[test]
    fn http_error_displays_detail_verbatim() {
        let err = AnalysisError::Http {
            status: 402,
            message: "insufficient credits".to_string(),
        };
        assert_eq!(err.to_string(), "insufficient credits");
        assert_eq!(err.status(), Some(402));
        assert!(err.is_http());
        assert!(!err.is_transport());
    }

    #[test]
    fn validation_error_is_local() {
        let err = AnalysisError::validation(PROFILE_IMAGES_REQUIRED);
        assert!(err.is_validation());
        assert_eq!(err.status(), None);
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "at least one profile screenshot required");
    }

    #[test]
    fn credits_error_is_generic() {
        let err = AnalysisError::CreditsUnavailable { status: 500 };
        assert_eq!(err.to_string(), "failed to get credits");
    }
}
