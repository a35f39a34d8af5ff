//! Background task handling for the review session
//!
//! Every request to the backend runs as its own tokio task and reports back
//! with exactly one [`BackgroundMessage`]. The owner of the session drains
//! the channel and applies results here, on its own thread.
//!
//! # Error Handling Patterns
//!
//! - **Channel sends** (`tx.send(...)`): if the receiver is gone the session
//!   was dropped and nobody wants the result, so the error is ignored.
//!
//! - **Late responses**: a result whose issue vanished, whose file was
//!   switched away from, or which was overtaken by a newer edit is logged
//!   at debug level and dropped.

use super::{Notice, NoticeKind, ReviewSession, SessionEvent};
use crate::api::ReviewBackend;
use crate::app::messages::BackgroundMessage;
use crate::editor::EditorSession;
use crate::issues::{normalize, Explanation, ExplanationStatus};
use futures::FutureExt;
use log::{debug, info, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio::sync::mpsc;

impl<B: ReviewBackend> ReviewSession<B> {
    /// Apply every message that has already arrived
    pub fn drain_messages(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Some(event) = self.handle_message(msg, now) {
                events.push(event);
            }
        }
        events
    }

    pub fn handle_message(&mut self, msg: BackgroundMessage, now: Instant) -> Option<SessionEvent> {
        self.pending = self.pending.saturating_sub(1);

        match msg {
            BackgroundMessage::AnalysisReady(result) => {
                if let Some(error) = result.primary_error() {
                    warn!("Analysis reported an error: {}", error);
                }
                let issues = self.load_analysis(result);
                info!("Analysis loaded with {} issue(s)", issues);
                Some(SessionEvent::AnalysisLoaded { issues })
            }
            BackgroundMessage::AnalysisError(error) => {
                warn!("Archive analysis failed ({}): {}", error.kind(), error);
                Some(self.alert(
                    format!("Analysis failed: {}", error.user_message()),
                    NoticeKind::Error,
                ))
            }

            // ═══════════════════════════════════════════════════════════════
            //  FILES
            // ═══════════════════════════════════════════════════════════════
            BackgroundMessage::FileLoaded {
                path,
                generation,
                content,
            } => {
                if self.requested_file.as_ref() != Some(&(path.clone(), generation)) {
                    debug!("Discarding stale content for {} (generation {})", path, generation);
                    return None;
                }
                self.requested_file = None;
                self.editor = Some(EditorSession::open(
                    path.clone(),
                    content,
                    generation,
                    self.settings.reanalysis_quiet,
                ));
                Some(SessionEvent::FileOpened { path })
            }
            BackgroundMessage::FileLoadError {
                path,
                generation,
                error,
            } => {
                if self.requested_file.as_ref() != Some(&(path.clone(), generation)) {
                    return None;
                }
                self.requested_file = None;
                warn!("Could not load {}: {}", path, error);
                Some(self.alert(
                    format!("Could not open {}: {}", path, error.user_message()),
                    NoticeKind::Error,
                ))
            }

            // ═══════════════════════════════════════════════════════════════
            //  EXPLANATIONS
            // ═══════════════════════════════════════════════════════════════
            BackgroundMessage::ExplanationReady { id, explanation } => {
                if !self.store.finish_explanation(&id, true) {
                    debug!("Dropping explanation for {}: no longer loading", id);
                    return None;
                }
                self.issues.attach_explanation(&id, explanation);
                Some(SessionEvent::ExplanationLoaded(id))
            }
            BackgroundMessage::ExplanationError { id, error } => {
                if !self.store.finish_explanation(&id, false) {
                    debug!("Dropping explanation failure for {}: no longer loading", id);
                    return None;
                }
                warn!("Explanation for {} failed ({}): {}", id, error.kind(), error);
                // Collapsed meanwhile: no failure card, the next expand retries.
                if self.store.explanation_status(&id) == ExplanationStatus::Error {
                    self.issues.attach_explanation(&id, Explanation::failed());
                }
                Some(SessionEvent::ExplanationFailed(id))
            }

            // ═══════════════════════════════════════════════════════════════
            //  FEEDBACK
            // ═══════════════════════════════════════════════════════════════
            BackgroundMessage::FeedbackSent { id } => self
                .store
                .finish_feedback(&id, true, now)
                .then_some(SessionEvent::FeedbackSucceeded(id)),
            BackgroundMessage::FeedbackError { id, error } => {
                warn!("Feedback for {} failed ({}): {}", id, error.kind(), error);
                self.store
                    .finish_feedback(&id, false, now)
                    .then_some(SessionEvent::FeedbackFailed(id))
            }

            // ═══════════════════════════════════════════════════════════════
            //  FIXES
            // ═══════════════════════════════════════════════════════════════
            BackgroundMessage::FixGenerated { id, suggestion } => {
                Some(SessionEvent::FixSuggested { id, suggestion })
            }
            BackgroundMessage::FixGenerateError { id, error } => {
                warn!("Fix generation for {} failed: {}", id, error);
                Some(self.alert(
                    format!("Fix generation failed: {}", error.user_message()),
                    NoticeKind::Error,
                ))
            }
            BackgroundMessage::FixApplied {
                id,
                path,
                new_content,
                explanation,
            } => {
                match self.editor.as_mut().filter(|e| e.path() == path) {
                    // Goes through the normal edit path, so re-analysis follows.
                    Some(editor) => {
                        editor.edit(new_content, now);
                    }
                    None => debug!("{} is no longer open; fixed content not loaded", path),
                }
                info!("Applied fix for {}", id);
                self.notice = Some(Notice {
                    message: match explanation.filter(|e| !e.trim().is_empty()) {
                        Some(explanation) => format!("Fix applied: {}", explanation),
                        None => "Fix applied".to_string(),
                    },
                    kind: NoticeKind::Success,
                });
                Some(SessionEvent::FixApplied { id })
            }
            BackgroundMessage::FixApplyError { id, error } => {
                warn!("Applying fix for {} failed: {}", id, error);
                Some(self.alert(
                    format!("Fix failed: {}", error.user_message()),
                    NoticeKind::Error,
                ))
            }

            // ═══════════════════════════════════════════════════════════════
            //  RE-ANALYSIS
            // ═══════════════════════════════════════════════════════════════
            BackgroundMessage::ReanalysisReady {
                path,
                generation,
                seq,
                result,
            } => {
                let editor = self
                    .editor
                    .as_mut()
                    .filter(|e| e.path() == path && e.generation() == generation)?;
                editor.settle(seq, now);
                if !editor.accept_result(seq) {
                    debug!("Discarding re-analysis of {} for edit {}: superseded", path, seq);
                    return None;
                }

                let removed = self.issues.replace_file(&path, normalize(&result));
                self.store.sync(self.issues.ids());
                let issues = self.issues.for_file(&path).len();
                debug!(
                    "Re-analysis of {} (edit {}): {} issue(s), {} resolved",
                    path,
                    seq,
                    issues,
                    removed.len()
                );
                Some(SessionEvent::IssuesRefreshed { path, issues })
            }
            BackgroundMessage::ReanalysisError {
                path,
                generation,
                seq,
                error,
            } => {
                if let Some(editor) = self
                    .editor
                    .as_mut()
                    .filter(|e| e.path() == path && e.generation() == generation)
                {
                    editor.settle(seq, now);
                }
                // Keep the last good issues; the next edit retries.
                warn!("Re-analysis of {} failed ({}): {}", path, error.kind(), error);
                None
            }

            BackgroundMessage::ExportReady(bytes) => Some(SessionEvent::Exported(bytes)),
            BackgroundMessage::ExportError(error) => {
                warn!("Export failed: {}", error);
                Some(self.alert(
                    format!("Export failed: {}", error.user_message()),
                    NoticeKind::Error,
                ))
            }
            BackgroundMessage::Error(e) => {
                warn!("{}", e);
                Some(self.alert(e, NoticeKind::Error))
            }
        }
    }
}

/// Run `fut` on the runtime and deliver its message. A panic becomes
/// [`BackgroundMessage::Error`], so the receiver always hears back once.
pub fn spawn_background<F>(
    tx: mpsc::UnboundedSender<BackgroundMessage>,
    task_name: &'static str,
    fut: F,
) where
    F: Future<Output = BackgroundMessage> + Send + 'static,
{
    tokio::spawn(async move {
        let msg = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(msg) => msg,
            Err(panic) => {
                let detail = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                BackgroundMessage::Error(format!(
                    "Background task '{}' crashed unexpectedly: {}",
                    task_name, detail
                ))
            }
        };
        let _ = tx.send(msg);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_background_delivers_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_background(tx, "ok", async { BackgroundMessage::ExportReady(vec![1, 2]) });
        match rx.recv().await {
            Some(BackgroundMessage::ExportReady(bytes)) => assert_eq!(bytes, vec![1, 2]),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_background_reports_panics() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_background(tx, "explode", async {
            if true {
                panic!("boom");
            }
            BackgroundMessage::ExportReady(Vec::new())
        });
        match rx.recv().await {
            Some(BackgroundMessage::Error(e)) => {
                assert!(e.contains("explode"));
                assert!(e.contains("boom"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
