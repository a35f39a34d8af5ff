//! The open file
//!
//! An [`EditorSession`] owns the live content of one file while it is open.
//! Every change goes through [`EditorSession::edit`], which bumps the edit
//! sequence and arms the re-analysis timer. Closing the session discards
//! the buffer.

pub mod annotations;
pub mod debounce;

pub use annotations::{Annotation, AnnotationBinding, AnnotationSet, EditorSurface, Hover};
pub use debounce::{PipelineState, ReanalysisPipeline};

use std::time::{Duration, Instant};

/// Content snapshot to send for re-analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReanalysisRequest {
    pub path: String,
    pub generation: u64,
    pub seq: u64,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    path: String,
    /// Distinguishes this opening of the file from earlier ones
    generation: u64,
    content: String,
    edit_seq: u64,
    applied_seq: u64,
    pipeline: ReanalysisPipeline,
}

impl EditorSession {
    pub fn open(
        path: impl Into<String>,
        content: String,
        generation: u64,
        quiet: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            generation,
            content,
            edit_seq: 0,
            applied_seq: 0,
            pipeline: ReanalysisPipeline::new(quiet),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn edit_seq(&self) -> u64 {
        self.edit_seq
    }

    pub fn pipeline(&self) -> &ReanalysisPipeline {
        &self.pipeline
    }

    pub fn is_analyzing(&self) -> bool {
        self.pipeline.is_analyzing()
    }

    /// Replace the content. Unchanged content is not an edit.
    pub fn edit(&mut self, content: String, now: Instant) -> bool {
        if content == self.content {
            return false;
        }
        self.content = content;
        self.edit_seq += 1;
        self.pipeline.on_edit(now);
        true
    }

    /// Replace exactly one 1-based line, as the inline quick-fix does
    pub fn splice_line(&mut self, line: u32, replacement: &str, now: Instant) -> bool {
        match replace_line(&self.content, line, replacement) {
            Some(next) => self.edit(next, now),
            None => false,
        }
    }

    /// Fire the debounce timer if due
    pub fn poll(&mut self, now: Instant) -> Option<ReanalysisRequest> {
        if !self.pipeline.poll(now, self.edit_seq) {
            return None;
        }
        Some(ReanalysisRequest {
            path: self.path.clone(),
            generation: self.generation,
            seq: self.edit_seq,
            code: self.content.clone(),
        })
    }

    pub fn settle(&mut self, seq: u64, now: Instant) -> bool {
        self.pipeline.settle(seq, now)
    }

    /// Monotonic guard: a result is only applied if it describes newer
    /// content than the last result applied.
    pub fn accept_result(&mut self, seq: u64) -> bool {
        if seq <= self.applied_seq {
            return false;
        }
        self.applied_seq = seq;
        true
    }
}

/// Replace the 1-based `line` of `content`, keeping the line ending style
/// and any trailing newline. `None` when the line does not exist.
pub fn replace_line(content: &str, line: u32, replacement: &str) -> Option<String> {
    let target = (line as usize).checked_sub(1)?;
    let mut out = String::with_capacity(content.len() + replacement.len());
    let mut found = false;

    for (idx, segment) in content.split_inclusive('\n').enumerate() {
        if idx == target {
            found = true;
            out.push_str(replacement);
            if segment.ends_with("\r\n") {
                out.push_str("\r\n");
            } else if segment.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(segment);
        }
    }

    found.then_some(out)
}
