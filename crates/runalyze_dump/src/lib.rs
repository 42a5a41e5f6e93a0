//! Week-by-week activity export from runalyze.com.
//!
//! The pipeline authenticates once, walks the data browser backwards from the
//! `until` week to the `since` week and saves every activity as FIT, falling
//! back to TCX when no FIT export exists. Files already on disk are skipped.

pub mod activity_types;
pub mod auth;
pub mod dates;
pub mod download;
pub mod error;
pub mod extractor;
pub mod filesystem;
pub mod iterator;
pub mod presentation;
pub mod run;
pub mod settings;
pub mod types;

mod test_utils;

pub use activity_types::{Category, Classifier, ClassifierConfig};
pub use error::{DumpError, DumpResult};
pub use extractor::ActivityExtractor;
pub use run::Pipeline;
pub use types::{ActivityRecord, DateWindow, DownloadResult, DownloadSummary, ResolvedFormat};
