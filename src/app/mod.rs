//! The review session
//!
//! [`ReviewSession`] owns the issue set, the interaction store, the open
//! editor and the annotation binding. User actions start background
//! requests; their results come back as [`BackgroundMessage`]s and are
//! applied by [`ReviewSession::handle_message`] on the owning thread, so all
//! state changes happen in one place.

pub mod background;
pub mod messages;


pub use messages::BackgroundMessage;

use crate::api::{
    AnalyzeCodeRequest, ApplyFixRequest, ArchiveUpload, ExplanationRequest, FeedbackRequest,
    GenerateFixRequest, ReviewBackend,
};
use crate::config::{Config, ExplanationLevel};
use crate::editor::{
    AnnotationBinding, AnnotationSet, EditorSession, EditorSurface, ReanalysisRequest,
};
use crate::issues::{
    normalize, AnalysisHandle, AnalysisResult, ExpandOutcome, FeedbackAction, InteractionStore,
    Issue, IssueId, IssueSet,
};
use crate::util::plural;
use background::spawn_background;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Values the session needs from [`Config`], resolved once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub user_id: String,
    pub explanation_level: ExplanationLevel,
    pub reanalysis_quiet: Duration,
    pub feedback_reset: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            explanation_level: ExplanationLevel::default(),
            reanalysis_quiet: Duration::from_millis(500),
            feedback_reset: Duration::from_millis(2000),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &mut Config) -> Self {
        Self {
            user_id: config.ensure_user_id(),
            explanation_level: config.explanation_level,
            reanalysis_quiet: config.reanalysis_quiet(),
            feedback_reset: config.feedback_reset(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}

/// Something the front end may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AnalysisLoaded { issues: usize },
    FileOpened { path: String },
    ExplanationLoaded(IssueId),
    ExplanationFailed(IssueId),
    FeedbackSucceeded(IssueId),
    FeedbackFailed(IssueId),
    /// Generated but not applied
    FixSuggested {
        id: IssueId,
        suggestion: crate::api::FixSuggestion,
    },
    FixApplied { id: IssueId },
    IssuesRefreshed { path: String, issues: usize },
    Exported(Vec<u8>),
    Alert(Notice),
}

/// Why an action could not start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No analysis has been loaded yet
    NoAnalysis,
    /// The issue is not in the current issue set
    IssueNotFound(IssueId),
    /// The action needs the issue's file open in the editor
    FileNotOpen(String),
}

impl ActionError {
    /// Returns a user-friendly message for display in notices
    pub fn user_message(&self) -> String {
        match self {
            Self::NoAnalysis => "Analyze a project first.".into(),
            Self::IssueNotFound(id) => {
                format!("Issue {} no longer exists. Re-run the analysis.", id.code)
            }
            Self::FileNotOpen(path) => format!("Open {} to use this action.", path),
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ActionError {}

pub struct ReviewSession<B> {
    backend: Arc<B>,
    settings: SessionSettings,
    analysis: Option<AnalysisResult>,
    handle: Option<AnalysisHandle>,
    issues: IssueSet,
    store: InteractionStore,
    editor: Option<EditorSession>,
    /// File whose content is being fetched, with its generation
    requested_file: Option<(String, u64)>,
    generation: u64,
    binding: AnnotationBinding,
    notice: Option<Notice>,
    /// Spawned tasks whose message has not been handled yet
    pending: usize,
    tx: mpsc::UnboundedSender<BackgroundMessage>,
    rx: mpsc::UnboundedReceiver<BackgroundMessage>,
}

impl<B: ReviewBackend> ReviewSession<B> {
    pub fn new(backend: B, settings: SessionSettings) -> Self {
        Self::with_backend(Arc::new(backend), settings)
    }

    pub fn with_backend(backend: Arc<B>, settings: SessionSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            settings,
            analysis: None,
            handle: None,
            issues: IssueSet::new(),
            store: InteractionStore::new(),
            editor: None,
            requested_file: None,
            generation: 0,
            binding: AnnotationBinding::new(),
            notice: None,
            pending: 0,
            tx,
            rx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn handle(&self) -> Option<&AnalysisHandle> {
        self.handle.as_ref()
    }

    pub fn issues(&self) -> &IssueSet {
        &self.issues
    }

    pub fn issue(&self, id: &IssueId) -> Option<&Issue> {
        self.issues.get(id)
    }

    pub fn store(&self) -> &InteractionStore {
        &self.store
    }

    pub fn editor(&self) -> Option<&EditorSession> {
        self.editor.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// True while any background request is outstanding
    pub fn has_pending_work(&self) -> bool {
        self.pending > 0
    }

    pub fn is_reanalyzing(&self) -> bool {
        self.editor.as_ref().is_some_and(EditorSession::is_analyzing)
    }

    /// One-line summary of the loaded analysis
    pub fn summary(&self) -> String {
        let Some(analysis) = &self.analysis else {
            return "No analysis loaded".to_string();
        };
        if let Some(error) = analysis.primary_error() {
            return format!("Analysis failed: {}", error);
        }
        if self.issues.is_empty() {
            return "No issues found".to_string();
        }
        let files = self.issues.group_by_file().len();
        format!(
            "{} found in {}",
            plural(self.issues.len(), "issue"),
            plural(files, "file")
        )
    }

    fn spawn<F>(&mut self, task_name: &'static str, fut: F)
    where
        F: std::future::Future<Output = BackgroundMessage> + Send + 'static,
    {
        self.pending += 1;
        spawn_background(self.tx.clone(), task_name, fut);
    }

    fn alert(&mut self, message: String, kind: NoticeKind) -> SessionEvent {
        let notice = Notice { message, kind };
        self.notice = Some(notice.clone());
        SessionEvent::Alert(notice)
    }

    /// Wait for the next background message. `None` only if the channel
    /// closed, which cannot happen while the session holds a sender.
    pub async fn next_message(&mut self) -> Option<BackgroundMessage> {
        self.rx.recv().await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  ANALYSIS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Upload a project archive for full analysis
    pub fn analyze_archive(&mut self, upload: ArchiveUpload) {
        info!(
            "Uploading {} ({} bytes) for analysis",
            upload.file_name,
            upload.bytes.len()
        );
        let backend = Arc::clone(&self.backend);
        self.spawn("archive_analysis", async move {
            match backend.analyze_archive(upload).await {
                Ok(result) => BackgroundMessage::AnalysisReady(result),
                Err(error) => BackgroundMessage::AnalysisError(error),
            }
        });
    }

    /// Replace everything with a fresh analysis. Interaction state survives
    /// only for identities that are still present. Returns the issue count.
    pub fn load_analysis(&mut self, result: AnalysisResult) -> usize {
        let removed = self.issues.replace_all(normalize(&result));
        let dropped = self.store.sync(self.issues.ids());
        debug!(
            "Loaded analysis: {} issue(s), {} removed, {} state(s) dropped",
            self.issues.len(),
            removed.len(),
            dropped
        );
        if let Some(handle) = result.handle() {
            self.handle = Some(handle);
        }
        self.analysis = Some(result);
        self.issues.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  EDITOR
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch a file of the analyzed project and open it once it arrives.
    /// Whatever was open is closed immediately.
    pub fn open_file(&mut self, path: &str) -> Result<(), ActionError> {
        let handle = self.handle.clone().ok_or(ActionError::NoAnalysis)?;
        self.close_file();
        self.generation += 1;
        let generation = self.generation;
        self.requested_file = Some((path.to_string(), generation));

        let backend = Arc::clone(&self.backend);
        let path = path.to_string();
        self.spawn("file_fetch", async move {
            match backend.fetch_file(path.clone(), handle).await {
                Ok(content) => BackgroundMessage::FileLoaded {
                    path,
                    generation,
                    content,
                },
                Err(error) => BackgroundMessage::FileLoadError {
                    path,
                    generation,
                    error,
                },
            }
        });
        Ok(())
    }

    /// Open a file whose content is already at hand
    pub fn open_file_with_content(&mut self, path: &str, content: String) {
        self.close_file();
        self.generation += 1;
        self.editor = Some(EditorSession::open(
            path,
            content,
            self.generation,
            self.settings.reanalysis_quiet,
        ));
    }

    pub fn close_file(&mut self) {
        if let Some(editor) = self.editor.take() {
            debug!("Closed {}", editor.path());
        }
        self.requested_file = None;
    }

    /// The user changed the open file's content
    pub fn edit(&mut self, content: String, now: Instant) -> bool {
        match self.editor.as_mut() {
            Some(editor) => editor.edit(content, now),
            None => false,
        }
    }

    /// Drive timers: feedback resets and the re-analysis debounce
    pub fn tick(&mut self, now: Instant) {
        self.store.expire_feedback(now, self.settings.feedback_reset);
        if let Some(request) = self.editor.as_mut().and_then(|e| e.poll(now)) {
            self.spawn_reanalysis(request);
        }
    }

    fn spawn_reanalysis(&mut self, request: ReanalysisRequest) {
        debug!("Re-analyzing {} at edit {}", request.path, request.seq);
        let ReanalysisRequest {
            path,
            generation,
            seq,
            code,
        } = request;
        let body = AnalyzeCodeRequest {
            code,
            file_path: path.clone(),
            user_id: self.settings.user_id.clone(),
            session_id: self
                .handle
                .as_ref()
                .map(|h| h.session_id.clone())
                .unwrap_or_default(),
            temp_dir: self.handle.as_ref().and_then(|h| h.temp_dir.clone()),
        };
        let backend = Arc::clone(&self.backend);
        self.spawn("reanalysis", async move {
            match backend.analyze_code(body).await {
                Ok(result) => BackgroundMessage::ReanalysisReady {
                    path,
                    generation,
                    seq,
                    result,
                },
                Err(error) => BackgroundMessage::ReanalysisError {
                    path,
                    generation,
                    seq,
                    error,
                },
            }
        });
    }

    /// Annotations for the open file, as they should be shown right now
    pub fn annotations(&self) -> Option<AnnotationSet> {
        self.editor
            .as_ref()
            .map(|editor| AnnotationSet::build(editor.path(), self.issues.iter(), &self.store))
    }

    /// Bring `surface` up to date. Returns true if anything was redrawn.
    pub fn sync_annotations<S: EditorSurface + ?Sized>(&mut self, surface: &mut S) -> bool {
        let next = self.annotations();
        self.binding.sync(next, surface)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  EXPLANATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Expand or collapse an issue. The first expansion fetches its
    /// explanation; collapsing after a failure makes the next one retry.
    pub fn toggle_expand(&mut self, id: &IssueId) -> Result<ExpandOutcome, ActionError> {
        let outcome = self
            .store
            .toggle_expanded(id)
            .ok_or_else(|| ActionError::IssueNotFound(id.clone()))?;
        match outcome {
            ExpandOutcome::Expanded {
                fetch_explanation: true,
            } => {
                self.request_explanation(id);
            }
            ExpandOutcome::Collapsed {
                cleared_error: true,
            } => self.issues.clear_explanation(id),
            _ => {}
        }
        Ok(outcome)
    }

    /// Start fetching an explanation unless one is loaded or in flight
    pub fn request_explanation(&mut self, id: &IssueId) -> bool {
        let Some(issue) = self.issues.get(id) else {
            return false;
        };
        let request = ExplanationRequest {
            issue_code: issue.code.clone(),
            message: issue.message.clone(),
            file: issue.file.clone(),
            line: issue.line,
            user_id: self.settings.user_id.clone(),
            level: self.settings.explanation_level.as_str().to_string(),
        };
        if !self.store.begin_explanation(id) {
            debug!("Explanation for {} already loaded or in flight", id);
            return false;
        }

        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        self.spawn("explanation_fetch", async move {
            match backend.fetch_explanation(request).await {
                Ok(explanation) => BackgroundMessage::ExplanationReady { id, explanation },
                Err(error) => BackgroundMessage::ExplanationError { id, error },
            }
        });
        true
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  FEEDBACK
    // ═══════════════════════════════════════════════════════════════════════════

    /// Send the user's judgment of an explanation. Returns false when a
    /// submission for this issue is already in flight.
    pub fn submit_feedback(
        &mut self,
        id: &IssueId,
        action: FeedbackAction,
    ) -> Result<bool, ActionError> {
        if !self.issues.contains(id) {
            return Err(ActionError::IssueNotFound(id.clone()));
        }
        if !self.store.begin_feedback(id, action) {
            return Ok(false);
        }
        self.spawn_feedback(id, action);
        Ok(true)
    }

    /// Resend the last action after a failure
    pub fn retry_feedback(&mut self, id: &IssueId) -> Result<bool, ActionError> {
        if !self.issues.contains(id) {
            return Err(ActionError::IssueNotFound(id.clone()));
        }
        match self.store.retry_feedback(id) {
            Some(action) => {
                self.spawn_feedback(id, action);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn spawn_feedback(&mut self, id: &IssueId, action: FeedbackAction) {
        let request = FeedbackRequest {
            user_id: self.settings.user_id.clone(),
            issue_code: id.code.clone(),
            was_helpful: action.was_helpful(),
            explanation_level: self.settings.explanation_level.as_str().to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        self.spawn("feedback", async move {
            match backend.submit_feedback(request).await {
                Ok(()) => BackgroundMessage::FeedbackSent { id },
                Err(error) => BackgroundMessage::FeedbackError { id, error },
            }
        });
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  FIXES
    // ═══════════════════════════════════════════════════════════════════════════

    /// The issue plus the open editor's content, if the issue's file is open
    fn fix_target(&self, id: &IssueId) -> Result<(Issue, String), ActionError> {
        let issue = self
            .issues
            .get(id)
            .cloned()
            .ok_or_else(|| ActionError::IssueNotFound(id.clone()))?;
        match self.editor.as_ref().filter(|e| e.path() == issue.file) {
            Some(editor) => Ok((issue, editor.content().to_string())),
            None => Err(ActionError::FileNotOpen(issue.file)),
        }
    }

    /// Ask for a fix without applying it
    pub fn generate_fix(&mut self, id: &IssueId) -> Result<(), ActionError> {
        let (issue, code) = self.fix_target(id)?;
        let request = GenerateFixRequest {
            code,
            issue,
            user_id: self.settings.user_id.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        self.spawn("fix_generation", async move {
            match backend.generate_fix(request).await {
                Ok(suggestion) => BackgroundMessage::FixGenerated { id, suggestion },
                Err(error) => BackgroundMessage::FixGenerateError { id, error },
            }
        });
        Ok(())
    }

    /// Have the server apply `fix`; its returned content replaces the buffer
    pub fn apply_fix(&mut self, id: &IssueId, fix: String) -> Result<(), ActionError> {
        let handle = self.handle.clone().ok_or(ActionError::NoAnalysis)?;
        let (issue, _) = self.fix_target(id)?;
        let request = self.apply_request(issue, fix, handle);
        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        self.spawn("fix_apply", async move {
            let path = request.file_path.clone();
            match backend.apply_fix(request).await {
                Ok(applied) => BackgroundMessage::FixApplied {
                    id,
                    path,
                    new_content: applied.new_content,
                    explanation: None,
                },
                Err(error) => BackgroundMessage::FixApplyError { id, error },
            }
        });
        Ok(())
    }

    /// Generate a fix and apply it in one go
    pub fn quick_fix(&mut self, id: &IssueId) -> Result<(), ActionError> {
        let handle = self.handle.clone().ok_or(ActionError::NoAnalysis)?;
        let (issue, code) = self.fix_target(id)?;
        let generate = GenerateFixRequest {
            code,
            issue: issue.clone(),
            user_id: self.settings.user_id.clone(),
        };
        let apply = self.apply_request(issue, String::new(), handle);
        let backend = Arc::clone(&self.backend);
        let id = id.clone();
        self.spawn("quick_fix", async move {
            let suggestion = match backend.generate_fix(generate).await {
                Ok(suggestion) => suggestion,
                Err(error) => return BackgroundMessage::FixGenerateError { id, error },
            };
            let path = apply.file_path.clone();
            let apply = ApplyFixRequest {
                fix: suggestion.fix,
                ..apply
            };
            match backend.apply_fix(apply).await {
                Ok(applied) => BackgroundMessage::FixApplied {
                    id,
                    path,
                    new_content: applied.new_content,
                    explanation: Some(suggestion.explanation),
                },
                Err(error) => BackgroundMessage::FixApplyError { id, error },
            }
        });
        Ok(())
    }

    fn apply_request(&self, issue: Issue, fix: String, handle: AnalysisHandle) -> ApplyFixRequest {
        ApplyFixRequest {
            file_path: issue.file.clone(),
            issue,
            fix,
            session_id: handle.session_id,
            temp_dir: handle.temp_dir,
            user_id: self.settings.user_id.clone(),
        }
    }

    /// Replace the issue's line locally with `replacement`. The edit goes
    /// through the debounce like any other.
    pub fn apply_inline_fix(
        &mut self,
        id: &IssueId,
        replacement: &str,
        now: Instant,
    ) -> Result<bool, ActionError> {
        let (issue, _) = self.fix_target(id)?;
        Ok(self
            .editor
            .as_mut()
            .is_some_and(|editor| editor.splice_line(issue.line, replacement, now)))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Download the (possibly fixed) project as an archive
    pub fn export_project(&mut self) -> Result<(), ActionError> {
        let handle = self.handle.clone().ok_or(ActionError::NoAnalysis)?;
        let backend = Arc::clone(&self.backend);
        self.spawn("export", async move {
            match backend.export_project(handle).await {
                Ok(bytes) => BackgroundMessage::ExportReady(bytes),
                Err(error) => BackgroundMessage::ExportError(error),
            }
        });
        Ok(())
    }
}
