//! Crash reports: persisted recovery results with their analysis.
//!
//! A report lives in exactly one of two partitions, the active directory or
//! its `Dismissed` subdirectory. Dismissing is a rename, never a copy.

pub mod store;

pub use store::{sanitize_id, CrashReportStore, DISMISSED_DIR};
