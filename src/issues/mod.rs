//! Issue model for Flamingo
//!
//! Analysis runs produce sub-reports (primary linter, complexity, security),
//! each carrying a list of issues. Issues are keyed by `(file, line, code)`
//! so they can be re-identified when the same file is analyzed again.

pub mod normalize;
pub mod store;

pub use normalize::{normalize, FileGroup, IssueSet};
pub use store::{
    ExpandOutcome, ExplanationStatus, FeedbackAction, FeedbackStatus, InteractionState,
    InteractionStore,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Category {
    Error,
    Warning,
    Info,
    Convention,
    Refactor,
    Security,
    Complexity,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Error => "Error",
            Category::Warning => "Warning",
            Category::Info => "Info",
            Category::Convention => "Convention",
            Category::Refactor => "Refactor",
            Category::Security => "Security",
            Category::Complexity => "Complexity",
        }
    }

    /// Marker colour used by editor annotations
    pub fn marker_color(&self) -> MarkerColor {
        match self {
            Category::Error => MarkerColor::Red,
            Category::Warning => MarkerColor::Yellow,
            Category::Security => MarkerColor::Purple,
            Category::Complexity => MarkerColor::Orange,
            Category::Info | Category::Convention | Category::Refactor => MarkerColor::Blue,
        }
    }
}

impl From<String> for Category {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Category::Error,
            "warning" => Category::Warning,
            "convention" => Category::Convention,
            "refactor" => Category::Refactor,
            "security" => Category::Security,
            "complexity" => Category::Complexity,
            _ => Category::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerColor {
    Red,
    Yellow,
    Blue,
    Purple,
    Orange,
}

/// Stable identity of an issue across analysis runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueId {
    pub file: String,
    pub line: u32,
    pub code: String,
}

impl IssueId {
    pub fn new(file: impl Into<String>, line: u32, code: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            code: code.into(),
        }
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.file, self.line, self.code)
    }
}

/// On-demand explanation attached to an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub why: String,
    #[serde(default)]
    pub fix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

const FAILED_EXPLANATION_SOURCE: &str = "flamingo-client";

impl Explanation {
    /// Placeholder shown when the explanation request failed
    pub fn failed() -> Self {
        Self {
            why: "Failed to load explanation.".to_string(),
            fix: "Collapse and expand the issue to try again.".to_string(),
            example: None,
            advanced_tip: None,
            source: Some(FAILED_EXPLANATION_SOURCE.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.source.as_deref() == Some(FAILED_EXPLANATION_SOURCE)
    }
}

/// One analysis finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub category: Category,
    pub file: String,
    #[serde(default)]
    pub line: u32,
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
    #[serde(
        default,
        rename = "flamingo_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub friendly_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

impl Issue {
    pub fn new(
        category: Category,
        file: impl Into<String>,
        line: u32,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            file: file.into(),
            line,
            message: message.into(),
            code: code.into(),
            url: None,
            explanation: None,
            friendly_message: None,
            severity: None,
            confidence: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_explanation(mut self, explanation: Explanation) -> Self {
        self.explanation = Some(explanation);
        self
    }

    pub fn id(&self) -> IssueId {
        IssueId::new(self.file.clone(), self.line, self.code.clone())
    }

    pub fn matches(&self, id: &IssueId) -> bool {
        self.line == id.line && self.file == id.file && self.code == id.code
    }

    /// Friendly restatement if present, raw message otherwise
    pub fn display_message(&self) -> &str {
        self.friendly_message.as_deref().unwrap_or(&self.message)
    }
}

/// Which part of an analysis run a sub-report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubReportKind {
    Primary,
    Complexity,
    Security,
}

impl SubReportKind {
    /// Merge order used by normalization
    pub const ALL: [SubReportKind; 3] = [
        SubReportKind::Primary,
        SubReportKind::Complexity,
        SubReportKind::Security,
    ];

    pub fn wire_key(&self) -> &'static str {
        match self {
            SubReportKind::Primary => "main_analysis",
            SubReportKind::Complexity => "complexity_analysis",
            SubReportKind::Security => "security_scan",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub stderr: Option<String>,
}

/// One labelled section of an analysis result.
///
/// `error` and `issues` are not exclusive: a linter can fail part-way and
/// still report what it found.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubReport {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub issues: Option<Vec<Issue>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub raw: Option<RawOutput>,
}

impl SubReport {
    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self {
            success: Some(true),
            issues: Some(issues),
            error: None,
            raw: None,
        }
    }

    pub fn issues(&self) -> &[Issue] {
        self.issues.as_deref().unwrap_or(&[])
    }
}

/// Session and workspace tokens tying later file/fix requests to one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisHandle {
    pub session_id: String,
    pub temp_dir: Option<String>,
}

/// Top-level response of one analysis invocation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawAnalysis")]
pub struct AnalysisResult {
    pub main_analysis: Option<SubReport>,
    pub complexity_analysis: Option<SubReport>,
    pub security_scan: Option<SubReport>,
    pub project_type: Option<String>,
    pub linter: Option<String>,
    pub experience_level: Option<String>,
    pub session_id: Option<String>,
    pub temp_dir: Option<String>,
}

impl AnalysisResult {
    pub fn sub_report(&self, kind: SubReportKind) -> Option<&SubReport> {
        match kind {
            SubReportKind::Primary => self.main_analysis.as_ref(),
            SubReportKind::Complexity => self.complexity_analysis.as_ref(),
            SubReportKind::Security => self.security_scan.as_ref(),
        }
    }

    /// Sub-reports in merge order, skipping absent ones
    pub fn sub_reports(&self) -> impl Iterator<Item = (SubReportKind, &SubReport)> + '_ {
        SubReportKind::ALL
            .into_iter()
            .filter_map(move |kind| self.sub_report(kind).map(|report| (kind, report)))
    }

    pub fn primary_error(&self) -> Option<&str> {
        self.main_analysis
            .as_ref()
            .and_then(|r| r.error.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    /// Linter stderr captured with the primary report, shown alongside a failure
    pub fn primary_stderr(&self) -> Option<&str> {
        self.main_analysis
            .as_ref()
            .and_then(|r| r.raw.as_ref())
            .and_then(|raw| raw.stderr.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    pub fn handle(&self) -> Option<AnalysisHandle> {
        self.session_id.as_ref().map(|session_id| AnalysisHandle {
            session_id: session_id.clone(),
            temp_dir: self.temp_dir.clone(),
        })
    }
}

/// Wire shape. The archive endpoint nests sub-reports under `result`;
/// the snippet endpoint returns them at the top level.
#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    main_analysis: Option<SubReport>,
    #[serde(default)]
    complexity_analysis: Option<SubReport>,
    #[serde(default)]
    security_scan: Option<SubReport>,
    #[serde(default)]
    project_type: Option<String>,
    #[serde(default)]
    linter: Option<String>,
    #[serde(default)]
    experience_level: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    temp_dir: Option<String>,
    #[serde(default)]
    result: Option<Box<RawAnalysis>>,
}

impl From<RawAnalysis> for AnalysisResult {
    fn from(raw: RawAnalysis) -> Self {
        let inner = raw.result.map(|inner| AnalysisResult::from(*inner));
        match inner {
            Some(inner) => AnalysisResult {
                main_analysis: raw.main_analysis.or(inner.main_analysis),
                complexity_analysis: raw.complexity_analysis.or(inner.complexity_analysis),
                security_scan: raw.security_scan.or(inner.security_scan),
                project_type: raw.project_type.or(inner.project_type),
                linter: raw.linter.or(inner.linter),
                experience_level: raw.experience_level.or(inner.experience_level),
                session_id: raw.session_id.or(inner.session_id),
                temp_dir: raw.temp_dir.or(inner.temp_dir),
            },
            None => AnalysisResult {
                main_analysis: raw.main_analysis,
                complexity_analysis: raw.complexity_analysis,
                security_scan: raw.security_scan,
                project_type: raw.project_type,
                linter: raw.linter,
                experience_level: raw.experience_level,
                session_id: raw.session_id,
                temp_dir: raw.temp_dir,
            },
        }
    }
}
