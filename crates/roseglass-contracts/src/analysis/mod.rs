mod co_create;
mod opener;
mod result;
mod tier;

pub use co_create::{CoCreateRequest, CoCreateResult};
pub use opener::extract_suggested_opener;
pub use result::{
    error_detail, AnalysisHistory, AnalysisHistoryItem, AnalysisResult, CreditsBalance,
    UsageMetrics,
};
pub use tier::QualityTier;
