//! Concord Core
//!
//! Core types, errors, and utilities shared across Concord components.
//!
//! This crate provides:
//! - Spans and per-engine results produced by analysis engines
//! - Merged, ranked results returned to callers
//! - Error types and result handling
//! - Text normalization and similarity used by merging and voting

pub mod error;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CallerContext, Cohort, EngineFailure, EngineResult, EngineRunSummary, MergedResult,
    MergedSpan, QualityTier, Span, SpanType, StrategyKind,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::text::{normalize_content, similarity};
    pub use crate::types::{
        CallerContext, Cohort, EngineResult, MergedResult, MergedSpan, QualityTier, Span,
        SpanType, StrategyKind,
    };
}
