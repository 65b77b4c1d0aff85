//! Attachment extraction: naming, collision handling, classification and
//! the archive-wide driver.

pub mod attachment;
pub mod classify;
pub mod collision;
pub mod extractor;
pub mod filename;
pub mod naming;

pub use extractor::{ExtractOptions, Extractor, PartFailure, RunSummary, RunTotals};
