//! Per-issue interaction state
//!
//! Expansion, explanation loading and feedback submission, keyed by
//! [`IssueId`]. The store is the only owner of this state; the session
//! mutates it through the transition methods below.

use super::IssueId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplanationStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// The user's judgment of an explanation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    Helpful,
    Confusing,
}

impl FeedbackAction {
    pub fn was_helpful(&self) -> bool {
        matches!(self, FeedbackAction::Helpful)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub expanded: bool,
    pub explanation: ExplanationStatus,
    pub feedback: FeedbackStatus,
    /// Set when the user acts, kept through errors so retry can replay it
    pub last_feedback_action: Option<FeedbackAction>,
    feedback_succeeded_at: Option<Instant>,
}

/// Result of toggling an issue open or closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Opened; `fetch_explanation` is set when nothing is loaded or loading yet
    Expanded { fetch_explanation: bool },
    /// Closed; `cleared_error` is set when a failed explanation was reset for retry
    Collapsed { cleared_error: bool },
}

#[derive(Debug, Clone, Default)]
pub struct InteractionStore {
    states: HashMap<IssueId, InteractionState>,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: &IssueId) -> Option<&InteractionState> {
        self.states.get(id)
    }

    pub fn explanation_status(&self, id: &IssueId) -> ExplanationStatus {
        self.states.get(id).map(|s| s.explanation).unwrap_or_default()
    }

    pub fn feedback_status(&self, id: &IssueId) -> FeedbackStatus {
        self.states.get(id).map(|s| s.feedback).unwrap_or_default()
    }

    pub fn is_expanded(&self, id: &IssueId) -> bool {
        self.states.get(id).map(|s| s.expanded).unwrap_or(false)
    }

    /// Start tracking an identity; no-op if it is already known
    pub fn observe(&mut self, id: IssueId) {
        self.states.entry(id).or_default();
    }

    /// Align the store with the current issue identities.
    ///
    /// New identities start idle; identities no longer present are dropped
    /// so their state cannot resurface later. Returns how many were dropped.
    pub fn sync<I>(&mut self, current: I) -> usize
    where
        I: IntoIterator<Item = IssueId>,
    {
        let mut next = HashMap::new();
        for id in current {
            let state = self.states.remove(&id).unwrap_or_default();
            next.insert(id, state);
        }
        let dropped = self.states.len();
        self.states = next;
        dropped
    }

    pub fn toggle_expanded(&mut self, id: &IssueId) -> Option<ExpandOutcome> {
        let expanded = !self.states.get(id)?.expanded;
        self.set_expanded(id, expanded)
    }

    /// Expanding with nothing loaded asks for an explanation. Collapsing
    /// never discards a loaded explanation, but resets a failed one to idle
    /// so the next expand fetches again.
    pub fn set_expanded(&mut self, id: &IssueId, expanded: bool) -> Option<ExpandOutcome> {
        let state = self.states.get_mut(id)?;
        state.expanded = expanded;

        if expanded {
            Some(ExpandOutcome::Expanded {
                fetch_explanation: state.explanation == ExplanationStatus::Idle,
            })
        } else {
            let cleared_error = state.explanation == ExplanationStatus::Error;
            if cleared_error {
                state.explanation = ExplanationStatus::Idle;
            }
            Some(ExpandOutcome::Collapsed { cleared_error })
        }
    }

    /// Idle -> Loading. Returns false (and changes nothing) for any other
    /// status, which is what suppresses duplicate in-flight requests.
    pub fn begin_explanation(&mut self, id: &IssueId) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.explanation == ExplanationStatus::Idle => {
                state.explanation = ExplanationStatus::Loading;
                true
            }
            _ => false,
        }
    }

    /// Loading -> Loaded | Error. A failure landing on a collapsed issue
    /// goes straight back to idle, as if it had been collapsed after.
    pub fn finish_explanation(&mut self, id: &IssueId, loaded: bool) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.explanation == ExplanationStatus::Loading => {
                state.explanation = if loaded {
                    ExplanationStatus::Loaded
                } else if state.expanded {
                    ExplanationStatus::Error
                } else {
                    ExplanationStatus::Idle
                };
                true
            }
            _ => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  FEEDBACK: idle -> loading -> success | error ; error -> loading (retry)
    // ═══════════════════════════════════════════════════════════════════════

    /// The user judged the explanation. Accepted from any state except
    /// loading; a new action while a success is showing restarts the cycle.
    pub fn begin_feedback(&mut self, id: &IssueId, action: FeedbackAction) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.feedback != FeedbackStatus::Loading => {
                state.last_feedback_action = Some(action);
                state.feedback = FeedbackStatus::Loading;
                state.feedback_succeeded_at = None;
                true
            }
            _ => false,
        }
    }

    /// Error -> Loading, replaying the remembered action
    pub fn retry_feedback(&mut self, id: &IssueId) -> Option<FeedbackAction> {
        let state = self.states.get_mut(id)?;
        if state.feedback != FeedbackStatus::Error {
            return None;
        }
        let action = state.last_feedback_action?;
        state.feedback = FeedbackStatus::Loading;
        Some(action)
    }

    pub fn finish_feedback(&mut self, id: &IssueId, succeeded: bool, now: Instant) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.feedback == FeedbackStatus::Loading => {
                if succeeded {
                    state.feedback = FeedbackStatus::Success;
                    state.feedback_succeeded_at = Some(now);
                } else {
                    state.feedback = FeedbackStatus::Error;
                }
                true
            }
            _ => false,
        }
    }

    /// Return successes older than `reset_after` to idle. Returns how many
    /// were reset.
    pub fn expire_feedback(&mut self, now: Instant, reset_after: Duration) -> usize {
        let mut reset = 0;
        for state in self.states.values_mut() {
            if state.feedback != FeedbackStatus::Success {
                continue;
            }
            let due = state
                .feedback_succeeded_at
                .map(|at| now.saturating_duration_since(at) >= reset_after)
                .unwrap_or(true);
            if due {
                state.feedback = FeedbackStatus::Idle;
                state.feedback_succeeded_at = None;
                reset += 1;
            }
        }
        reset
    }
}
