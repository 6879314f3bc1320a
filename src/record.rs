//! Canonical in-memory records shared by every ingestion path.
//!
//! A [`SubmissionRecord`] is the normalized representation of one audio item,
//! whether it came from an uploaded file, a direct audio URL or a podcast feed.
//! An [`ImportItem`] pairs a record with the staged file backing it (if any)
//! and the last rejection text the backend attached to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::StagedFile;

/// Kind of recording, as understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioType {
    /// Recorded meeting or call. Default for uploaded files.
    #[default]
    Meeting,
    /// Published media such as a podcast episode.
    Media,
    /// Anything else.
    Generic,
}

impl AudioType {
    pub const ALL: [AudioType; 3] = [AudioType::Meeting, AudioType::Media, AudioType::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioType::Meeting => "Meeting",
            AudioType::Media => "Media",
            AudioType::Generic => "Generic",
        }
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown audio type '{s}' (expected Meeting, Media or Generic)"))
    }
}

/// The canonical unit of work submitted to the backend.
///
/// Exactly one content source is sent on the wire: `inline_audio` when
/// present and non-empty, otherwise `source_url`. Records without either are
/// rejected by [`crate::api::encode`] before any network call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub title: String,
    /// ISO-8601 timestamp, or empty when unknown.
    pub recording_time: String,
    pub category: String,
    pub audio_type: AudioType,
    pub summary: String,
    pub duration_seconds: f64,
    #[serde(skip)]
    pub inline_audio: Option<Vec<u8>>,
    pub source_url: Option<String>,
}

impl SubmissionRecord {
    /// Default metadata for a freshly uploaded file. The user fills in the rest.
    pub fn scaffold(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            audio_type: AudioType::Meeting,
            ..Self::default()
        }
    }

    /// Record pointing at a remotely hosted audio file.
    pub fn from_url(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            audio_type: AudioType::Media,
            source_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// True when inline audio bytes are attached.
    pub fn has_inline_audio(&self) -> bool {
        self.inline_audio.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Non-empty source URL, if any.
    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// True when at least one content source is usable.
    pub fn has_content_source(&self) -> bool {
        self.has_inline_audio() || self.source_url().is_some()
    }
}

/// One entry of a batch the user is preparing for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub record: SubmissionRecord,
    /// Staged upload backing this record. Its bytes become `inline_audio` at submit time.
    pub staged: Option<StagedFile>,
    /// Rejection reason from the last submission attempt.
    pub error: Option<String>,
}

impl ImportItem {
    pub fn new(record: SubmissionRecord) -> Self {
        Self {
            record,
            staged: None,
            error: None,
        }
    }

    /// Pairs a staged upload with the default upload scaffold. The duration
    /// measured at staging time is carried over; callers may overwrite it.
    pub fn from_staged(staged: StagedFile, category: impl Into<String>) -> Self {
        let mut record = SubmissionRecord::scaffold(category);
        record.duration_seconds = staged.duration_seconds.unwrap_or_default();
        Self {
            record,
            staged: Some(staged),
            error: None,
        }
    }

    /// Name shown to the user: original file name, else title, else position.
    pub fn display_name(&self, index: usize) -> String {
        if let Some(staged) = &self.staged {
            if !staged.original_name.is_empty() {
                return staged.original_name.clone();
            }
        }
        if !self.record.title.trim().is_empty() {
            return self.record.title.clone();
        }
        format!("Index {index}")
    }
}
