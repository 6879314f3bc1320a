use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{AudioType, SubmissionRecord};

/// Reasons a record cannot be put on the wire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Either audio data or a file URL must be provided")]
    MissingContentSource,
    #[error("Audio duration must be a non-negative number, got {0}")]
    InvalidDuration(f64),
}

/// First record of a batch that failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Record {index} is invalid: {source}")]
pub struct BatchValidationError {
    pub index: usize,
    #[source]
    pub source: ValidationError,
}

/// Where the backend gets the audio bytes from. Exactly one per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentSource {
    #[serde(rename = "base64_data")]
    Inline(String),
    #[serde(rename = "file_url")]
    Url(String),
}

/// JSON object accepted by `POST /import`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub title: String,
    pub recording_date: String,
    pub category: String,
    pub audio_type: AudioType,
    pub duration_in_sec: f64,
    pub user_summary: String,
    #[serde(flatten)]
    pub source: ContentSource,
}

/// Converts a record into its wire form.
///
/// Inline audio takes precedence over the source URL; the other one is
/// omitted from the output.
pub fn encode(record: &SubmissionRecord) -> Result<WireRecord, ValidationError> {
    if !record.duration_seconds.is_finite() || record.duration_seconds < 0.0 {
        return Err(ValidationError::InvalidDuration(record.duration_seconds));
    }

    let source = match (&record.inline_audio, record.source_url()) {
        (Some(bytes), _) if !bytes.is_empty() => {
            ContentSource::Inline(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        (_, Some(url)) => ContentSource::Url(url.to_string()),
        _ => return Err(ValidationError::MissingContentSource),
    };

    Ok(WireRecord {
        title: record.title.clone(),
        recording_date: record.recording_time.clone(),
        category: record.category.clone(),
        audio_type: record.audio_type,
        duration_in_sec: record.duration_seconds,
        user_summary: record.summary.clone(),
        source,
    })
}

/// Encodes a whole batch, preserving order. Nothing is returned unless every
/// record is valid.
pub fn encode_batch(records: &[SubmissionRecord]) -> Result<Vec<WireRecord>, BatchValidationError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| encode(record).map_err(|source| BatchValidationError { index, source }))
        .collect()
}
