//! Flamingo review library crate
//!
//! Issue normalization, per-issue interaction state, explanation and fix
//! orchestration, and the editor annotation layer with debounced
//! re-analysis. The `flamingo` binary is a thin CLI over [`app::ReviewSession`].

pub mod api;
pub mod app;
pub mod config;
pub mod editor;
pub mod issues;
pub mod util;
