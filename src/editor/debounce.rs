//! Debounced re-analysis
//!
//! Bursts of edits collapse into one analysis request after a quiet period.
//! The clock is passed in, so the machine is driven by whoever owns the
//! event loop (and by tests, deterministically).

use std::time::{Duration, Instant};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    /// Timer armed; fires at `deadline` unless another edit resets it
    Pending { deadline: Instant },
    /// Request for edit `seq` in flight; `queued` when edits arrived since
    Analyzing { seq: u64, queued: bool },
}

#[derive(Debug, Clone)]
pub struct ReanalysisPipeline {
    state: PipelineState,
    quiet: Duration,
}

impl Default for ReanalysisPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl ReanalysisPipeline {
    pub fn new(quiet: Duration) -> Self {
        Self {
            state: PipelineState::Idle,
            quiet,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Drives the "analyzing" indicator
    pub fn is_analyzing(&self) -> bool {
        matches!(self.state, PipelineState::Analyzing { .. })
    }

    /// When the armed timer fires, if one is armed
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PipelineState::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn on_edit(&mut self, now: Instant) {
        self.state = match self.state {
            PipelineState::Idle | PipelineState::Pending { .. } => PipelineState::Pending {
                deadline: now + self.quiet,
            },
            PipelineState::Analyzing { seq, .. } => PipelineState::Analyzing { seq, queued: true },
        };
    }

    /// Fire the timer if it is due. Returns true when a request for
    /// `current_seq` should be sent now.
    pub fn poll(&mut self, now: Instant, current_seq: u64) -> bool {
        match self.state {
            PipelineState::Pending { deadline } if now >= deadline => {
                self.state = PipelineState::Analyzing {
                    seq: current_seq,
                    queued: false,
                };
                true
            }
            _ => false,
        }
    }

    /// The request for `seq` finished, successfully or not. Edits that
    /// arrived meanwhile start a fresh quiet period from `now`.
    pub fn settle(&mut self, seq: u64, now: Instant) -> bool {
        match self.state {
            PipelineState::Analyzing {
                seq: in_flight,
                queued,
            } if in_flight == seq => {
                self.state = if queued {
                    PipelineState::Pending {
                        deadline: now + self.quiet,
                    }
                } else {
                    PipelineState::Idle
                };
                true
            }
            _ => false,
        }
    }
}
