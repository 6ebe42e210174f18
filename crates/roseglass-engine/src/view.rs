use roseglass_contracts::analysis::{AnalysisResult, QualityTier};
use roseglass_contracts::events::{
    EventPayload, EventWriter, ANALYSIS_COMPLETED, ANALYSIS_FAILED, ANALYSIS_STALE_DROPPED,
    ANALYSIS_SUBMITTED, SELECTION_CHANGED, VIEW_RESET,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::AnalysisBackend;
use crate::error::AnalysisError;
use crate::request::{AnalysisPayload, AnalysisRequest, AnalysisRequestBuilder};
use crate::staging::ImageStager;

pub const SUBMISSION_IN_FLIGHT: &str = "an analysis is already in progress";
pub const RESULT_NOT_CLEARED: &str = "reset the current analysis before submitting again";

/// Idle -> Submitting -> {Success, Failed}; `reset` returns to Idle.
/// `Failed` keeps the form editable and may submit again; a retry blocked by
/// validation drops back to `Idle` with the new notice.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Submitting { generation: u64 },
    Success(AnalysisResult),
    Failed { kind: &'static str, message: String },
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting { .. } => "submitting",
            Self::Success(_) => "success",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// The view was reset after the request left; the outcome was ignored.
    Stale,
}

/// A packaged request taken from a snapshot of the selection.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    generation: u64,
    payload: AnalysisPayload,
}

impl PendingSubmission {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn payload(&self) -> &AnalysisPayload {
        &self.payload
    }

    pub fn run(self, backend: &dyn AnalysisBackend, token: &str) -> SubmissionOutcome {
        let result = backend.analyze(&self.payload, token);
        SubmissionOutcome {
            generation: self.generation,
            result,
        }
    }
}

#[derive(Debug)]
pub struct SubmissionOutcome {
    pub generation: u64,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// Page-level flow: two upload slots, free-text context, tier toggle, and a
/// single-flight submission.
#[derive(Debug)]
pub struct AnalysisView {
    profile: ImageStager,
    conversation: ImageStager,
    user_context: String,
    use_premium: bool,
    builder: AnalysisRequestBuilder,
    state: ViewState,
    notice: Option<String>,
    generation: u64,
    events: EventWriter,
}

impl AnalysisView {
    /// Takes ownership of both stagers and installs selection listeners on them.
    pub fn new(
        mut profile: ImageStager,
        mut conversation: ImageStager,
        builder: AnalysisRequestBuilder,
        events: EventWriter,
    ) -> Self {
        watch_selection(&mut profile, "profile", &events);
        watch_selection(&mut conversation, "conversation", &events);
        Self {
            profile,
            conversation,
            user_context: String::new(),
            use_premium: false,
            builder,
            state: ViewState::Idle,
            notice: None,
            generation: 0,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn profile(&self) -> &ImageStager {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ImageStager {
        &mut self.profile
    }

    pub fn conversation(&self) -> &ImageStager {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ImageStager {
        &mut self.conversation
    }

    pub fn user_context(&self) -> &str {
        &self.user_context
    }

    pub fn set_user_context(&mut self, text: impl Into<String>) {
        self.user_context = text.into();
    }

    pub fn tier(&self) -> QualityTier {
        QualityTier::from_premium_flag(self.use_premium)
    }

    pub fn set_use_premium(&mut self, use_premium: bool) {
        self.use_premium = use_premium;
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, ViewState::Submitting { .. })
    }

    pub fn can_submit(&self) -> bool {
        matches!(self.state, ViewState::Idle | ViewState::Failed { .. })
            && !self.profile.is_empty()
    }

    pub fn submit_label(&self) -> String {
        if self.is_submitting() {
            return "Analyzing...".to_string();
        }
        let count = self.profile.len();
        let noun = if count == 1 { "image" } else { "images" };
        format!("Analyze Profile ({count} {noun})")
    }

    /// Inline message: a failed submission or a rejected attempt to submit.
    pub fn error_message(&self) -> Option<&str> {
        if let ViewState::Failed { message, .. } = &self.state {
            return Some(message);
        }
        self.notice.as_deref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            ViewState::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn suggested_opener(&self) -> Option<String> {
        self.result().and_then(AnalysisResult::suggested_opener)
    }

    /// Packages the current selection and enters `Submitting`.
    ///
    /// Nothing is sent here; the caller runs the returned submission and
    /// hands the outcome back through [`AnalysisView::finish`].
    pub fn begin_submit(&mut self) -> Result<PendingSubmission, AnalysisError> {
        match self.state {
            ViewState::Submitting { .. } => {
                return Err(AnalysisError::validation(SUBMISSION_IN_FLIGHT));
            }
            ViewState::Success(_) => {
                return Err(AnalysisError::validation(RESULT_NOT_CLEARED));
            }
            ViewState::Idle | ViewState::Failed { .. } => {}
        }

        let request = AnalysisRequest {
            profile_images: self.profile.snapshot(),
            conversation_images: self.conversation.snapshot(),
            user_context: Some(self.user_context.clone()).filter(|text| !text.is_empty()),
            use_premium: self.use_premium,
        };
        let payload = match self.builder.build(&request) {
            Ok(payload) => payload,
            Err(err) => {
                debug!("submission blocked: {err}");
                if matches!(self.state, ViewState::Failed { .. }) {
                    self.state = ViewState::Idle;
                }
                self.notice = Some(err.to_string());
                return Err(err);
            }
        };

        self.generation += 1;
        self.notice = None;
        self.state = ViewState::Submitting {
            generation: self.generation,
        };
        let manifest = payload.manifest();
        self.record(
            ANALYSIS_SUBMITTED,
            json!({
                "generation": self.generation,
                "profile_images": payload.profile_count(),
                "conversation_images": payload.conversation_count(),
                "has_context": manifest.user_context.is_some(),
                "use_premium": manifest.use_premium,
                "total_bytes": manifest.total_bytes(),
            }),
        );
        Ok(PendingSubmission {
            generation: self.generation,
            payload,
        })
    }

    /// Applies an outcome unless the view moved on since it was issued.
    pub fn finish(&mut self, outcome: SubmissionOutcome) -> Applied {
        let current = match self.state {
            ViewState::Submitting { generation } => Some(generation),
            _ => None,
        };
        if current != Some(outcome.generation) {
            info!(
                generation = outcome.generation,
                state = self.state.name(),
                "dropping stale analysis outcome"
            );
            self.record(
                ANALYSIS_STALE_DROPPED,
                json!({
                    "generation": outcome.generation,
                    "ok": outcome.result.is_ok(),
                }),
            );
            return Applied::Stale;
        }

        match outcome.result {
            Ok(result) => {
                self.record(
                    ANALYSIS_COMPLETED,
                    json!({
                        "generation": outcome.generation,
                        "analysis_id": result.analysis_id,
                        "input_tokens": result.usage.input_tokens,
                        "output_tokens": result.usage.output_tokens,
                        "charge_usd": result.usage.charged_usd,
                        "remaining_credits": result.remaining_credits,
                        "opener_found": result.suggested_opener().is_some(),
                    }),
                );
                self.state = ViewState::Success(result);
            }
            Err(err) => {
                warn!(kind = err.kind(), "analysis failed: {err}");
                self.record(
                    ANALYSIS_FAILED,
                    json!({
                        "generation": outcome.generation,
                        "kind": err.kind(),
                        "status": err.status(),
                        "message": err.to_string(),
                    }),
                );
                self.state = ViewState::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
            }
        }
        Applied::Applied
    }

    /// Runs a whole submission against `backend` on the current thread.
    pub fn submit(
        &mut self,
        backend: &dyn AnalysisBackend,
        token: &str,
    ) -> Result<&ViewState, AnalysisError> {
        let pending = self.begin_submit()?;
        let outcome = pending.run(backend, token);
        self.finish(outcome);
        Ok(&self.state)
    }

    /// Back to an empty form. Staged images and their previews are released;
    /// the tier toggle is kept. Outstanding submissions become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        let previous = self.state.name();
        self.state = ViewState::Idle;
        self.notice = None;
        self.user_context.clear();
        self.profile.clear();
        self.conversation.clear();
        self.record(VIEW_RESET, json!({ "from": previous }));
    }

    fn record(&self, event_type: &str, payload: Value) {
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event_type, "failed to write session event: {err:#}");
        }
    }
}

fn watch_selection(stager: &mut ImageStager, slot: &'static str, events: &EventWriter) {
    let events = events.clone();
    stager.on_change(move |staged| {
        let names = staged
            .iter()
            .map(|image| Value::String(image.file.name().to_string()))
            .collect::<Vec<Value>>();
        let mut payload = EventPayload::new();
        payload.insert("slot".to_string(), json!(slot));
        payload.insert("count".to_string(), json!(staged.len()));
        payload.insert("files".to_string(), Value::Array(names));
        if let Err(err) = events.emit(SELECTION_CHANGED, payload) {
            warn!(slot, "failed to write session event: {err:#}");
        }
    });
}
