//! # Verity Core
//!
//! Shared, runtime-agnostic logic for Verity: the analysis categories, the
//! score classification table, sub-model fusion, detection-API response
//! interpretation, the key-value store abstraction, and the bounded
//! per-category analysis history.
//!
//! This crate contains no HTTP, SQL, or filesystem code. Durable storage is
//! injected through [`store::KvStore`].

pub mod classify;
pub mod fusion;
pub mod history;
pub mod models;
pub mod store;

pub use classify::{classify, profile, summarize, CategoryProfile, Severity, Verdict};
pub use fusion::{interpret, Interpretation, InvalidResponse};
pub use history::{AnalysisHistory, HistoryStats, MAX_ITEMS};
pub use models::{AnalysisRecord, Category, ResultFields, Scores};
