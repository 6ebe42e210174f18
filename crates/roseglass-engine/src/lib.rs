pub mod client;
pub mod config;
pub mod error;
pub mod previews;
pub mod request;
pub mod staging;
pub mod view;

pub use client::{AnalysisBackend, AnalysisClient};
pub use config::{resolve_token, ClientConfig};
pub use error::AnalysisError;
pub use previews::{DataUrlPreviews, ThumbnailPreviews};
pub use request::{AnalysisPayload, AnalysisRequest, AnalysisRequestBuilder};
pub use staging::{ImageFile, ImageStager, PreviewHandle, PreviewSink, SelectionReport};
pub use view::{AnalysisView, Applied, PendingSubmission, SubmissionOutcome, ViewState};

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
