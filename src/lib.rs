//! Client-side ingestion pipeline for a transcript-processing backend.
//!
//! Audio enters as uploaded files ([`storage::ContentStager`]), direct audio
//! URLs ([`record::SubmissionRecord::from_url`]) or podcast feeds
//! ([`feed::FeedNormalizer`]). Prepared [`record::ImportItem`]s are submitted
//! through [`import::Importer`], which reconciles the backend's per-item
//! verdicts and cleans up confirmed uploads. A [`storage::RetentionSweeper`]
//! removes staged files that were never submitted.

pub mod api;
pub mod config;
pub mod feed;
pub mod import;
pub mod record;
pub mod storage;
pub mod util;

pub use config::Config;
pub use import::{ImportReport, ImportSummary, Importer};
pub use record::{AudioType, ImportItem, SubmissionRecord};
