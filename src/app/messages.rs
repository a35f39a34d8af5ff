use crate::api::{ApiError, FixSuggestion};
use crate::issues::{AnalysisResult, Explanation, IssueId};

/// Messages from background tasks to the thread that owns the session.
/// Every spawned task sends exactly one.
#[derive(Debug)]
pub enum BackgroundMessage {
    AnalysisReady(AnalysisResult),
    AnalysisError(ApiError),
    FileLoaded {
        path: String,
        generation: u64,
        content: String,
    },
    FileLoadError {
        path: String,
        generation: u64,
        error: ApiError,
    },
    ExplanationReady {
        id: IssueId,
        explanation: Explanation,
    },
    ExplanationError {
        id: IssueId,
        error: ApiError,
    },
    FeedbackSent {
        id: IssueId,
    },
    FeedbackError {
        id: IssueId,
        error: ApiError,
    },
    FixGenerated {
        id: IssueId,
        suggestion: FixSuggestion,
    },
    FixGenerateError {
        id: IssueId,
        error: ApiError,
    },
    /// Server applied a fix; `new_content` replaces the editor buffer
    FixApplied {
        id: IssueId,
        path: String,
        new_content: String,
        /// Set when the fix was generated in the same task (quick fix)
        explanation: Option<String>,
    },
    FixApplyError {
        id: IssueId,
        error: ApiError,
    },
    ReanalysisReady {
        path: String,
        generation: u64,
        seq: u64,
        result: AnalysisResult,
    },
    ReanalysisError {
        path: String,
        generation: u64,
        seq: u64,
        error: ApiError,
    },
    ExportReady(Vec<u8>),
    ExportError(ApiError),
    /// A task panicked
    Error(String),
}
