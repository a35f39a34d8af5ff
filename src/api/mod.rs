//! Backend contracts
//!
//! Everything the review session needs from the analysis service, as one
//! trait so the session can run against the HTTP client or a scripted fake.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpBackend;

use crate::issues::{AnalysisHandle, AnalysisResult, Explanation, Issue};
use crate::util::truncate;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Failure of one backend exchange.
///
/// The state machines collapse all of these into "failed"; the variant
/// only matters for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("server rejected the request: {0}")]
    Rejected(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport",
            ApiError::Status { .. } => "status",
            ApiError::Malformed(_) => "malformed",
            ApiError::Rejected(_) => "rejected",
        }
    }

    /// Short text for alerts
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => "Could not reach the review server.".to_string(),
            ApiError::Status { detail, .. } | ApiError::Rejected(detail) => {
                truncate(detail, 160)
            }
            ApiError::Malformed(_) => "The review server sent an unexpected response.".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ═══════════════════════════════════════════════════════════════════════════
//  PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

/// A project archive to upload
#[derive(Debug, Clone)]
pub struct ArchiveUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeCodeRequest {
    pub code: String,
    pub file_path: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationRequest {
    pub issue_code: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub user_id: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateFixRequest {
    pub code: String,
    pub issue: Issue,
    pub user_id: String,
}

/// Suggested fix returned by the backend; nothing is applied yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub fix: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyFixRequest {
    pub file_path: String,
    pub issue: Issue,
    pub fix: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
    pub user_id: String,
}

/// Server-side result of applying a fix; `new_content` is authoritative
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppliedFix {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub new_content: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub issue_code: String,
    pub was_helpful: bool,
    pub explanation_level: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExportRequest<'a> {
    pub(crate) session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temp_dir: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileContent {
    pub(crate) content: String,
}

/// The analysis service as seen by the review session.
///
/// Futures are `Send` so requests can run as background tasks.
pub trait ReviewBackend: Send + Sync + 'static {
    fn analyze_archive(
        &self,
        upload: ArchiveUpload,
    ) -> impl Future<Output = ApiResult<AnalysisResult>> + Send;

    fn analyze_code(
        &self,
        request: AnalyzeCodeRequest,
    ) -> impl Future<Output = ApiResult<AnalysisResult>> + Send;

    fn fetch_file(
        &self,
        path: String,
        handle: AnalysisHandle,
    ) -> impl Future<Output = ApiResult<String>> + Send;

    fn fetch_explanation(
        &self,
        request: ExplanationRequest,
    ) -> impl Future<Output = ApiResult<Explanation>> + Send;

    fn generate_fix(
        &self,
        request: GenerateFixRequest,
    ) -> impl Future<Output = ApiResult<FixSuggestion>> + Send;

    fn apply_fix(
        &self,
        request: ApplyFixRequest,
    ) -> impl Future<Output = ApiResult<AppliedFix>> + Send;

    fn submit_feedback(
        &self,
        request: FeedbackRequest,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn export_project(
        &self,
        handle: AnalysisHandle,
    ) -> impl Future<Output = ApiResult<Vec<u8>>> + Send;
}
