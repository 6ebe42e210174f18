use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use roseglass_contracts::analysis::{
    error_detail, AnalysisHistory, AnalysisHistoryItem, AnalysisResult, CoCreateRequest,
    CoCreateResult, CreditsBalance,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{
    AnalysisError, ANALYSIS_ACTION, CO_CREATE_ACTION, CREDITS_ACTION, HISTORY_ACTION,
};
use crate::request::AnalysisPayload;

/// Remote side of the analysis flow. The view only talks to this seam.
pub trait AnalysisBackend {
    fn analyze(&self, payload: &AnalysisPayload, token: &str)
        -> Result<AnalysisResult, AnalysisError>;
    fn credits(&self, token: &str) -> Result<f64, AnalysisError>;
}

/// Single-shot HTTP client for the analysis API. No retries.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    config: ClientConfig,
    http: HttpClient,
}

impl AnalysisClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn submit(
        &self,
        payload: &AnalysisPayload,
        token: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let endpoint = self.config.analyze_endpoint();
        let form = payload.to_form()?;
        info!(
            endpoint = %endpoint,
            profile_images = payload.profile_count(),
            conversation_images = payload.conversation_count(),
            premium = payload.use_premium(),
            "submitting analysis"
        );
        let response = self
            .with_timeout(self.http.post(&endpoint))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .map_err(AnalysisError::transport(ANALYSIS_ACTION))?;
        let (status, body) = read_response(response, ANALYSIS_ACTION)?;
        if !(200..300).contains(&status) {
            warn!(endpoint = %endpoint, status, "analysis request rejected");
            return Err(http_failure(ANALYSIS_ACTION, status, &body));
        }
        let result: AnalysisResult = decode_body(&endpoint, &body)?;
        result
            .validate()
            .map_err(|reason| AnalysisError::InvalidResponse {
                endpoint: endpoint.clone(),
                reason,
            })?;
        info!(
            analysis_id = result.analysis_id.as_deref().unwrap_or("-"),
            tokens = result.usage.total_tokens(),
            charge_usd = result.usage.charged_usd,
            "analysis complete"
        );
        Ok(result)
    }

    pub fn get_credits(&self, token: &str) -> Result<f64, AnalysisError> {
        let endpoint = self.config.credits_endpoint();
        let response = self
            .with_timeout(self.http.get(&endpoint))
            .bearer_auth(token)
            .send()
            .map_err(AnalysisError::transport(CREDITS_ACTION))?;
        let (status, body) = read_response(response, CREDITS_ACTION)?;
        if !(200..300).contains(&status) {
            warn!(endpoint = %endpoint, status, "credits lookup rejected");
            return Err(AnalysisError::CreditsUnavailable { status });
        }
        let balance: CreditsBalance = decode_body(&endpoint, &body)?;
        if !balance.credits.is_finite() || balance.credits < 0.0 {
            return Err(AnalysisError::InvalidResponse {
                endpoint,
                reason: format!("credits must be a non-negative number, got {}", balance.credits),
            });
        }
        debug!(credits = balance.credits, "credits fetched");
        Ok(balance.credits)
    }

    pub fn history(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<Vec<AnalysisHistoryItem>, AnalysisError> {
        let endpoint = self.config.history_endpoint();
        let response = self
            .with_timeout(self.http.get(&endpoint))
            .query(&[("limit", limit.max(1))])
            .bearer_auth(token)
            .send()
            .map_err(AnalysisError::transport(HISTORY_ACTION))?;
        let (status, body) = read_response(response, HISTORY_ACTION)?;
        if !(200..300).contains(&status) {
            warn!(endpoint = %endpoint, status, "history lookup rejected");
            return Err(http_failure(HISTORY_ACTION, status, &body));
        }
        let history: AnalysisHistory = decode_body(&endpoint, &body)?;
        Ok(history.analyses)
    }

    /// Turns the user's own observation, resonance and intention into a
    /// message for the analysed profile. Charged like an analysis.
    pub fn co_create(
        &self,
        request: &CoCreateRequest,
        token: &str,
    ) -> Result<CoCreateResult, AnalysisError> {
        if let Some(field) = request.missing_field() {
            return Err(AnalysisError::validation(format!("{field} is required")));
        }
        let endpoint = self.config.co_create_endpoint();
        info!(
            endpoint = %endpoint,
            analysis_id = %request.analysis_id,
            "requesting co-created message"
        );
        let response = self
            .with_timeout(self.http.post(&endpoint))
            .bearer_auth(token)
            .json(request)
            .send()
            .map_err(AnalysisError::transport(CO_CREATE_ACTION))?;
        let (status, body) = read_response(response, CO_CREATE_ACTION)?;
        if !(200..300).contains(&status) {
            warn!(endpoint = %endpoint, status, "co-create request rejected");
            return Err(http_failure(CO_CREATE_ACTION, status, &body));
        }
        let result: CoCreateResult = decode_body(&endpoint, &body)?;
        result
            .validate()
            .map_err(|reason| AnalysisError::InvalidResponse { endpoint, reason })?;
        Ok(result)
    }

    fn with_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

impl AnalysisBackend for AnalysisClient {
    fn analyze(
        &self,
        payload: &AnalysisPayload,
        token: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.submit(payload, token)
    }

    fn credits(&self, token: &str) -> Result<f64, AnalysisError> {
        self.get_credits(token)
    }
}

fn read_response(
    response: HttpResponse,
    action: &'static str,
) -> Result<(u16, String), AnalysisError> {
    let status = response.status().as_u16();
    let body = response.text().map_err(AnalysisError::transport(action))?;
    Ok((status, body))
}

/// Server `detail` when present, otherwise a message naming the status.
fn http_failure(action: &str, status: u16, body: &str) -> AnalysisError {
    let message = error_detail(body).unwrap_or_else(|| format!("{action} failed (HTTP {status})"));
    AnalysisError::Http { status, message }
}

fn decode_body<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, AnalysisError> {
    serde_json::from_str(body).map_err(|err| AnalysisError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use roseglass_contracts::analysis::CoCreateRequest;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{http_failure, AnalysisClient};
    use crate::config::ClientConfig;
    use crate::error::{
    AnalysisError, ANALYSIS_ACTION, CO_CREATE_ACTION, CREDITS_ACTION, HISTORY_ACTION,
};
    use crate::request::{AnalysisRequest, AnalysisRequestBuilder};
    use crate::staging::test_support::png;

    fn payload(use_premium: bool) -> crate::request::AnalysisPayload {
        let request = AnalysisRequest {
            profile_images: vec![png("p0.png"), png("p1.png")],
            conversation_images: vec![png("c0.png")],
            user_context: Some("long-term".to_string()),
            use_premium,
        };
        match AnalysisRequestBuilder::default().build(&request) {
            Ok(payload) => payload,
            Err(err) => panic!("fixture payload should build: {err}"),
        }
    }

    /// The blocking client must be created, used and dropped off the async runtime.
    async fn run_blocking<T, F>(job: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match tokio::task::spawn_blocking(job).await {
            Ok(value) => value,
            Err(err) => panic!("blocking task failed: {err}"),
        }
    }

    fn client_for(uri: &str) -> AnalysisClient {
        AnalysisClient::new(ClientConfig::default().with_api_url(uri))
    }

    #[tokio::test]
    async fn submit_posts_multipart_with_bearer_token() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_string_contains("name=\"profile_images\"; filename=\"p1.png\""))
            .and(body_string_contains("name=\"conversation_images\""))
            .and(body_string_contains("name=\"use_premium\"\r\n\r\ntrue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "analysis": "**Suggested Opener:**\n> Best view on that hike?\n\nMore",
                "usage": {
                    "input_tokens": 1200,
                    "output_tokens": 300,
                    "cost_usd": 0.01,
                    "charge_usd": 0.02,
                    "model_used": "claude-opus"
                },
                "remaining_credits": 7.5,
                "analysis_id": "an-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let result = run_blocking(move || client_for(&uri).submit(&payload(true), "tok-1")).await?;
        assert_eq!(result.analysis_id.as_deref(), Some("an-1"));
        assert_eq!(result.usage.total_tokens(), 1500);
        assert_eq!(result.suggested_opener().as_deref(), Some("Best view on that hike?"));
        Ok(())
    }

    #[tokio::test]
    async fn payment_required_surfaces_detail_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(json!({"detail": "insufficient credits"})),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = run_blocking(move || client_for(&uri).submit(&payload(false), "tok").err()).await;
        match err {
            Some(AnalysisError::Http { status, message }) => {
                assert_eq!(status, 402);
                assert_eq!(message, "insufficient credits");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = run_blocking(move || client_for(&uri).submit(&payload(false), "tok").err()).await;
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some("analysis failed (HTTP 502)")
        );
    }

    #[tokio::test]
    async fn malformed_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = run_blocking(move || client_for(&uri).submit(&payload(false), "tok").err()).await;
        assert!(matches!(err, Some(AnalysisError::InvalidResponse { .. })));
    }

    #[test]
    fn connection_refused_is_transport_error() {
        let client = AnalysisClient::new(ClientConfig::default().with_api_url("http://127.0.0.1:1"));
        let err = client.submit(&payload(false), "tok").err();
        match err {
            Some(err) => {
                assert!(err.is_transport(), "unexpected error: {err:?}");
                assert!(!err.is_http());
                assert_eq!(err.to_string(), "analysis failed, please try again");
            }
            None => panic!("request to a closed port should fail"),
        }
    }

    #[tokio::test]
    async fn credits_returns_balance() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analyze/credits"))
            .and(header("authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "user_id": "u-1",
                "credits": 12.25
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let credits = run_blocking(move || client_for(&uri).get_credits("tok-2")).await?;
        assert_eq!(credits, 12.25);
        Ok(())
    }

    #[tokio::test]
    async fn credits_failure_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analyze/credits"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "bad token"})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = run_blocking(move || client_for(&uri).get_credits("tok").err()).await;
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some("failed to get credits")
        );
    }

    #[test]
    fn unreachable_credits_lookup_names_credits() {
        let client = AnalysisClient::new(ClientConfig::default().with_api_url("http://127.0.0.1:1"));
        match client.get_credits("tok").err() {
            Some(err) => {
                assert!(err.is_transport(), "unexpected error: {err:?}");
                assert_eq!(err.to_string(), "credits lookup failed, please try again");
            }
            None => panic!("request to a closed port should fail"),
        }
    }

    fn co_create_request() -> CoCreateRequest {
        CoCreateRequest {
            analysis_id: "an-1".to_string(),
            user_observation: "Lots of trail photos".to_string(),
            user_resonance: "I hike most weekends".to_string(),
            user_intention: "Suggest a trail swap".to_string(),
            conversation_context: None,
        }
    }

    #[tokio::test]
    async fn co_create_posts_json_and_decodes_message() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/co-create/"))
            .and(header("authorization", "Bearer tok-3"))
            .and(body_json(json!({
                "analysis_id": "an-1",
                "user_observation": "Lots of trail photos",
                "user_resonance": "I hike most weekends",
                "user_intention": "Suggest a trail swap"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "suggested_message": "\"Trade you my favourite ridge for yours?\"",
                "usage": {
                    "input_tokens": 500,
                    "output_tokens": 60,
                    "cost_usd": 0.005,
                    "charge_usd": 0.01,
                    "model_used": "claude-sonnet"
                },
                "remaining_credits": 4.5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let result =
            run_blocking(move || client_for(&uri).co_create(&co_create_request(), "tok-3")).await?;
        assert_eq!(
            result.suggested_message,
            "\"Trade you my favourite ridge for yours?\""
        );
        assert_eq!(result.remaining_credits, 4.5);
        Ok(())
    }

    #[tokio::test]
    async fn co_create_insufficient_credits_surfaces_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/co-create/"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(json!({"detail": "Insufficient credits for co-creation"})),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let err =
            run_blocking(move || client_for(&uri).co_create(&co_create_request(), "tok").err())
                .await;
        match err {
            Some(AnalysisError::Http { status, message }) => {
                assert_eq!(status, 402);
                assert_eq!(message, "Insufficient credits for co-creation");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn co_create_failure_without_detail_names_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/co-create/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err =
            run_blocking(move || client_for(&uri).co_create(&co_create_request(), "tok").err())
                .await;
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some("co-creation failed (HTTP 500)")
        );
    }

    #[test]
    fn co_create_blank_field_is_never_sent() {
        let client = AnalysisClient::new(ClientConfig::default().with_api_url("http://127.0.0.1:1"));
        let mut request = co_create_request();
        request.user_intention = "   ".to_string();
        match client.co_create(&request, "tok").err() {
            Some(err) => {
                assert!(err.is_validation(), "unexpected error: {err:?}");
                assert_eq!(err.to_string(), "user_intention is required");
            }
            None => panic!("blank intention should be rejected"),
        }
    }

    #[tokio::test]
    async fn history_passes_limit() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analyze/history"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "analyses": [{
                    "id": "an-9",
                    "analysis_text": "text",
                    "created_at": "2026-09-30T08:00:00Z",
                    "model_used": "claude-sonnet",
                    "cost_usd": 0.01,
                    "charge_usd": 0.02
                }]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let items = run_blocking(move || client_for(&uri).history("tok", 5)).await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "an-9");
        Ok(())
    }

    #[test]
    fn http_failure_ignores_non_string_detail() {
        let err = http_failure(
            ANALYSIS_ACTION,
            422,
            r#"{"detail":[{"loc":["body"],"msg":"field required"}]}"#,
        );
        assert_eq!(err.to_string(), "analysis failed (HTTP 422)");
        assert_eq!(err.status(), Some(422));
    }
}
