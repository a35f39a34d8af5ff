//! Scripted in-memory backend for session tests

use super::{
    AnalyzeCodeRequest, ApiError, ApiResult, AppliedFix, ApplyFixRequest, ArchiveUpload,
    ExplanationRequest, FeedbackRequest, FixSuggestion, GenerateFixRequest, ReviewBackend,
};
use crate::issues::{AnalysisHandle, AnalysisResult, Category, Explanation, Issue, SubReport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A line-matching rule standing in for a linter
#[derive(Debug, Clone)]
pub(crate) struct Rule {
    pub(crate) needle: &'static str,
    pub(crate) code: &'static str,
    pub(crate) category: Category,
    pub(crate) message: &'static str,
}

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) analyze_archive: usize,
    pub(crate) analyze_code: Vec<AnalyzeCodeRequest>,
    pub(crate) fetch_file: Vec<String>,
    pub(crate) explanations: Vec<ExplanationRequest>,
    pub(crate) generate_fix: Vec<GenerateFixRequest>,
    pub(crate) apply_fix: Vec<ApplyFixRequest>,
    pub(crate) feedback: Vec<FeedbackRequest>,
    pub(crate) export: usize,
}

#[derive(Default)]
struct Script {
    archive: Option<ApiResult<AnalysisResult>>,
    files: HashMap<String, String>,
    explanations: HashMap<String, ApiResult<Explanation>>,
    feedback: VecDeque<ApiResult<()>>,
    fixes: HashMap<String, ApiResult<FixSuggestion>>,
    analyze_failures: VecDeque<ApiError>,
    apply_failure: Option<ApiError>,
    rules: Vec<Rule>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Calls>>,
}

pub(crate) fn server_error(detail: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        detail: detail.to_string(),
    }
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(self, path: &str, content: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
        self
    }

    pub(crate) fn with_rule(self, rule: Rule) -> Self {
        self.script.lock().unwrap().rules.push(rule);
        self
    }

    pub(crate) fn with_archive_result(self, result: ApiResult<AnalysisResult>) -> Self {
        self.script.lock().unwrap().archive = Some(result);
        self
    }

    pub(crate) fn with_explanation(self, code: &str, result: ApiResult<Explanation>) -> Self {
        self.script
            .lock()
            .unwrap()
            .explanations
            .insert(code.to_string(), result);
        self
    }

    pub(crate) fn with_fix(self, code: &str, result: ApiResult<FixSuggestion>) -> Self {
        self.script
            .lock()
            .unwrap()
            .fixes
            .insert(code.to_string(), result);
        self
    }

    /// Queue feedback outcomes; once exhausted every submission succeeds
    pub(crate) fn with_feedback_outcomes(self, outcomes: Vec<ApiResult<()>>) -> Self {
        self.script.lock().unwrap().feedback.extend(outcomes);
        self
    }

    pub(crate) fn fail_next_analysis(&self, error: ApiError) {
        self.script.lock().unwrap().analyze_failures.push_back(error);
    }

    pub(crate) fn fail_apply(&self, error: ApiError) {
        self.script.lock().unwrap().apply_failure = Some(error);
    }

    pub(crate) fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    pub(crate) fn file(&self, path: &str) -> Option<String> {
        self.script.lock().unwrap().files.get(path).cloned()
    }

    /// Run the line rules over every scripted file
    pub(crate) fn full_analysis(&self) -> AnalysisResult {
        let script = self.script.lock().unwrap();
        let mut paths: Vec<&String> = script.files.keys().collect();
        paths.sort();
        let issues = paths
            .into_iter()
            .flat_map(|path| lint(&script.rules, path, &script.files[path]))
            .collect();
        AnalysisResult {
            main_analysis: Some(SubReport::with_issues(issues)),
            project_type: Some("web".to_string()),
            linter: Some("ruff".to_string()),
            session_id: Some("session-1".to_string()),
            temp_dir: Some("/tmp/pink-coded-session-1".to_string()),
            ..AnalysisResult::default()
        }
    }
}

fn lint(rules: &[Rule], path: &str, content: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for rule in rules {
            if line.contains(rule.needle) {
                issues.push(Issue::new(
                    rule.category,
                    path,
                    idx as u32 + 1,
                    rule.code,
                    rule.message,
                ));
            }
        }
    }
    issues
}

impl ReviewBackend for FakeBackend {
    async fn analyze_archive(&self, _upload: ArchiveUpload) -> ApiResult<AnalysisResult> {
        self.calls.lock().unwrap().analyze_archive += 1;
        let scripted = self.script.lock().unwrap().archive.clone();
        match scripted {
            Some(result) => result,
            None => Ok(self.full_analysis()),
        }
    }

    async fn analyze_code(&self, request: AnalyzeCodeRequest) -> ApiResult<AnalysisResult> {
        self.calls.lock().unwrap().analyze_code.push(request.clone());
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.analyze_failures.pop_front() {
            return Err(error);
        }
        let issues = lint(&script.rules, &request.file_path, &request.code);
        script.files.insert(request.file_path, request.code);
        Ok(AnalysisResult {
            main_analysis: Some(SubReport::with_issues(issues)),
            ..AnalysisResult::default()
        })
    }

    async fn fetch_file(&self, path: String, _handle: AnalysisHandle) -> ApiResult<String> {
        self.calls.lock().unwrap().fetch_file.push(path.clone());
        self.script
            .lock()
            .unwrap()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                detail: format!("File not found at: {}", path),
            })
    }

    async fn fetch_explanation(&self, request: ExplanationRequest) -> ApiResult<Explanation> {
        let code = request.issue_code.clone();
        self.calls.lock().unwrap().explanations.push(request);
        self.script
            .lock()
            .unwrap()
            .explanations
            .get(&code)
            .cloned()
            .unwrap_or_else(|| Err(server_error("no template")))
    }

    async fn generate_fix(&self, request: GenerateFixRequest) -> ApiResult<FixSuggestion> {
        let code = request.issue.code.clone();
        self.calls.lock().unwrap().generate_fix.push(request);
        self.script
            .lock()
            .unwrap()
            .fixes
            .get(&code)
            .cloned()
            .unwrap_or_else(|| Err(server_error("Fix generation failed")))
    }

    /// Deletes the issue's line, whatever the fix text says
    async fn apply_fix(&self, request: ApplyFixRequest) -> ApiResult<AppliedFix> {
        self.calls.lock().unwrap().apply_fix.push(request.clone());
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.apply_failure.clone() {
            return Err(error);
        }
        let content = script
            .files
            .get(&request.file_path)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                detail: "File not found".to_string(),
            })?;
        let target = request.issue.line as usize;
        let new_content = content
            .lines()
            .enumerate()
            .filter(|(idx, _)| idx + 1 != target)
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n");
        script
            .files
            .insert(request.file_path.clone(), new_content.clone());
        Ok(AppliedFix {
            success: true,
            new_content,
            message: Some("Fix applied successfully".to_string()),
        })
    }

    async fn submit_feedback(&self, request: FeedbackRequest) -> ApiResult<()> {
        self.calls.lock().unwrap().feedback.push(request);
        self.script
            .lock()
            .unwrap()
            .feedback
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn export_project(&self, _handle: AnalysisHandle) -> ApiResult<Vec<u8>> {
        self.calls.lock().unwrap().export += 1;
        Ok(b"PK\x03\x04".to_vec())
    }
}
