use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_MAX_IMAGES: usize = 10;
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
/// Token the MVP page sends when no real auth is wired up.
pub const DEV_TOKEN: &str = "dev_test_user";

pub const API_URL_ENV: &str = "ROSEGLASS_API_URL";
pub const MAX_IMAGES_ENV: &str = "ROSEGLASS_MAX_IMAGES";
pub const TIMEOUT_ENV: &str = "ROSEGLASS_TIMEOUT_S";
pub const TOKEN_ENV: &str = "ROSEGLASS_TOKEN";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub analyze_path: String,
    pub credits_path: String,
    pub history_path: String,
    pub co_create_path: String,
    pub max_images: usize,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            analyze_path: "/api/analyze".to_string(),
            credits_path: "/api/analyze/credits".to_string(),
            history_path: "/api/analyze/history".to_string(),
            co_create_path: "/api/co-create/".to_string(),
            max_images: DEFAULT_MAX_IMAGES,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        if let Some(url) = read(API_URL_ENV) {
            config = config.with_api_url(&url);
        }
        if let Some(max_images) = read(MAX_IMAGES_ENV)
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|value| *value > 0)
        {
            config.max_images = max_images;
        }
        config.timeout = read(TIMEOUT_ENV)
            .and_then(|raw| raw.parse::<f64>().ok())
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|timeout| !timeout.is_zero());
        config
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_url = trimmed.to_string();
        }
        self
    }

    pub fn analyze_endpoint(&self) -> String {
        self.endpoint(&self.analyze_path)
    }

    pub fn credits_endpoint(&self) -> String {
        self.endpoint(&self.credits_path)
    }

    pub fn history_endpoint(&self) -> String {
        self.endpoint(&self.history_path)
    }

    pub fn co_create_endpoint(&self) -> String {
        self.endpoint(&self.co_create_path)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

/// Explicit token, then `ROSEGLASS_TOKEN`, then the development token.
pub fn resolve_token(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            env::var(TOKEN_ENV)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .unwrap_or_else(|| DEV_TOKEN.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<String, String>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_local_backend() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.analyze_endpoint(), "http://localhost:8000/api/analyze");
        assert_eq!(
            config.credits_endpoint(),
            "http://localhost:8000/api/analyze/credits"
        );
        assert_eq!(config.max_images, 10);
        assert_eq!(config.timeout, None);
        assert_eq!(
            config.co_create_endpoint(),
            "http://localhost:8000/api/co-create/"
        );
    }

    #[test]
    fn env_values_override_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_URL_ENV, " https://api.roseglass.test/ "),
            (MAX_IMAGES_ENV, "4"),
            (TIMEOUT_ENV, "45"),
        ]));
        assert_eq!(config.api_url, "https://api.roseglass.test");
        assert_eq!(
            config.history_endpoint(),
            "https://api.roseglass.test/api/analyze/history"
        );
        assert_eq!(config.max_images, 4);
        assert_eq!(config.timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn invalid_env_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_URL_ENV, "   "),
            (MAX_IMAGES_ENV, "0"),
            (TIMEOUT_ENV, "-3"),
        ]));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn out_of_range_timeout_is_ignored() {
        for raw in ["1e20", "inf", "NaN", "0"] {
            let config = ClientConfig::from_lookup(lookup(&[(TIMEOUT_ENV, raw)]));
            assert_eq!(config.timeout, None, "timeout {raw:?} should be dropped");
        }
        let config = ClientConfig::from_lookup(lookup(&[(TIMEOUT_ENV, "2.5")]));
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn explicit_token_wins() {
        assert_eq!(resolve_token(Some(" tok-123 ")), "tok-123");
    }
}
