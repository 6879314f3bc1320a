use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::outcome::{malformed_request_message, unexpected_status_message};
use crate::util::to_iso_utc;

/// Query sent to `GET /search` as a JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPayload {
    pub fts5_query: String,
    pub semantic_search_query: String,
    pub category: String,
    pub start_time_period_iso: String,
    pub end_time_period_iso: String,
    pub max_segment_return: u64,
}

impl SearchPayload {
    /// Builds a payload; absent time bounds are sent as empty strings.
    pub fn new(
        fts5_query: impl Into<String>,
        semantic_search_query: impl Into<String>,
        category: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_segment_return: u64,
    ) -> Self {
        Self {
            fts5_query: fts5_query.into(),
            semantic_search_query: semantic_search_query.into(),
            category: category.into(),
            start_time_period_iso: start.as_ref().map(to_iso_utc).unwrap_or_default(),
            end_time_period_iso: end.as_ref().map(to_iso_utc).unwrap_or_default(),
            max_segment_return,
        }
    }
}

/// A recording that matched the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchAudioData {
    pub audiofile_hash: String,
    pub title: String,
    pub recording_date: String,
    pub duration_in_sec: f64,
    pub transcript_full: String,
    pub user_summary: String,
    pub ai_keywords: Vec<String>,
    pub ai_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A transcript segment ranked for the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSegmentData {
    pub segment_hash: String,
    pub audiofile_hash: String,
    pub start_in_sec: f64,
    pub end_in_sec: f64,
    pub transcript: String,
    pub bm25_score: f64,
    pub vector_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub full_audio_data: Vec<SearchAudioData>,
    pub top_k_segments: Vec<SearchSegmentData>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(SearchResponse),
    /// The backend answered but refused the query.
    Rejected(String),
    TransportError(String),
}

/// Maps a `/search` status code and JSON body onto a [`SearchOutcome`].
pub fn classify_search(status: u16, body: Value) -> SearchOutcome {
    if status == 200 {
        return match serde_json::from_value::<SearchResponse>(body) {
            Ok(response) => {
                tracing::info!(
                    recordings = response.full_audio_data.len(),
                    segments = response.top_k_segments.len(),
                    "Search request successful"
                );
                SearchOutcome::Found(response)
            }
            Err(e) => {
                tracing::error!(error = %e, "Search response has an unexpected shape");
                SearchOutcome::TransportError(format!("Malformed search response: {e}"))
            }
        };
    }

    let message = if status == 422 {
        match body.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "Search request has an invalid parameter".to_string(),
        }
    } else {
        malformed_request_message(status, &body)
            .unwrap_or_else(|| unexpected_status_message(status, &body))
    };

    tracing::error!(status, "{message}");
    SearchOutcome::Rejected(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_payload_renders_time_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let payload = SearchPayload::new("budget", "budget talks", "Standard", Some(start), None, 5);

        assert_eq!(payload.start_time_period_iso, "2024-03-01T00:00:00Z");
        assert_eq!(payload.end_time_period_iso, "");
    }

    #[test]
    fn test_found_parses_typed_results() {
        let body = json!({
            "ok": true,
            "full_audio_data": [{"audiofile_hash": "abc", "title": "Sync", "ai_keywords": ["q1"]}],
            "top_k_segments": [{"segment_hash": "s1", "audiofile_hash": "abc", "start_in_sec": 1.5,
                                "end_in_sec": 3.0, "transcript": "hi", "bm25_score": 0.3, "vector_score": 0.9}]
        });

        let SearchOutcome::Found(response) = classify_search(200, body) else {
            panic!("expected Found");
        };
        assert!(response.ok);
        assert_eq!(response.full_audio_data[0].ai_keywords, vec!["q1".to_string()]);
        assert_eq!(response.top_k_segments[0].end_in_sec, 3.0);
    }

    #[test]
    fn test_422_uses_backend_error() {
        let body = json!({"error": "Search request has a invalid parameter: category is empty"});
        assert_eq!(
            classify_search(422, body),
            SearchOutcome::Rejected("Search request has a invalid parameter: category is empty".to_string())
        );
    }

    #[test]
    fn test_other_status_is_unexpected() {
        assert_eq!(
            classify_search(409, json!({"ok": false})),
            SearchOutcome::Rejected("Unexpected status code 409. Response: {\"ok\":false}".to_string())
        );
    }
}
