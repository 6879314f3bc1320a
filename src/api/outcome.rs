//! Interpretation of `/import` responses.
//!
//! Everything here is pure: a status code and a parsed JSON body go in, a
//! [`BatchOutcome`] comes out. Network concerns live in [`super::client`].

use serde_json::Value;
use std::fmt;

/// Reason attached to every item when a 422 carries no per-item detail.
pub const SYNTHETIC_422_REASON: &str = "invalid (backend returned 422 without per-item details)";

/// Reason used when the backend lists an index without a matching error.
pub const UNKNOWN_REASON: &str = "unknown";

/// Message shown when a whole batch came back 422.
pub const ALL_INVALID_MESSAGE: &str = "Every audio file in the payload is invalid.";

/// One record the backend refused, by position in the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRejection {
    pub index: usize,
    pub reason: String,
}

impl ItemRejection {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

/// Result of submitting one batch.
///
/// Every `index` in a rejection list is below the submitted batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every record was queued by the backend.
    AllAccepted { imported: u64 },
    /// Nothing was accepted. `rejections` is only filled for 422 responses.
    AllRejected {
        reason: String,
        rejections: Vec<ItemRejection>,
    },
    /// Listed records were refused; the rest were accepted.
    PartiallyAccepted { rejections: Vec<ItemRejection> },
    /// No usable answer: network failure, timeout or a non-JSON response.
    TransportError(String),
}

impl BatchOutcome {
    pub fn rejections(&self) -> &[ItemRejection] {
        match self {
            BatchOutcome::AllRejected { rejections, .. }
            | BatchOutcome::PartiallyAccepted { rejections } => rejections,
            BatchOutcome::AllAccepted { .. } | BatchOutcome::TransportError(_) => &[],
        }
    }
}

/// Backend answers that break the response contract. Logged and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    /// Index is a valid integer but outside `0..batch_size`
    IndexOutOfRange { index: i64, batch_size: usize },
    /// Index is not an integer at all
    NotAnIndex(Value),
    /// `errors` is shorter than `indexes`
    MissingError { index: usize },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::IndexOutOfRange { index, batch_size } => write!(
                f,
                "backend returned index {index} outside of a batch of {batch_size}"
            ),
            ContractViolation::NotAnIndex(value) => {
                write!(f, "backend returned non-integer index {value}")
            }
            ContractViolation::MissingError { index } => {
                write!(f, "backend returned no error text for index {index}")
            }
        }
    }
}

/// Pairs `indexes[k]` with `errors[k]`, keeping only in-range indexes.
///
/// A missing error becomes [`UNKNOWN_REASON`]. Entries that cannot be mapped
/// onto the batch are logged as [`ContractViolation`]s and skipped.
pub fn zip_invalid(indexes: &[Value], errors: &[Value], batch_size: usize) -> Vec<ItemRejection> {
    let mut rejections = Vec::with_capacity(indexes.len().min(batch_size));

    for (k, raw_index) in indexes.iter().enumerate() {
        let index = match raw_index.as_i64() {
            Some(i) if i >= 0 && (i as u64) < batch_size as u64 => i as usize,
            Some(i) => {
                let violation = ContractViolation::IndexOutOfRange {
                    index: i,
                    batch_size,
                };
                tracing::error!(violation = %violation, "Backend contract violation, dropping entry");
                continue;
            }
            None => {
                let violation = ContractViolation::NotAnIndex(raw_index.clone());
                tracing::error!(violation = %violation, "Backend contract violation, dropping entry");
                continue;
            }
        };

        let reason = match errors.get(k) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                let violation = ContractViolation::MissingError { index };
                tracing::warn!(violation = %violation, "Backend contract violation, using unknown reason");
                UNKNOWN_REASON.to_string()
            }
        };

        rejections.push(ItemRejection::new(index, reason));
    }

    rejections
}

/// Maps an `/import` status code and JSON body onto a [`BatchOutcome`].
pub fn classify_import(status: u16, body: &Value, batch_size: usize) -> BatchOutcome {
    match status {
        200 => {
            let imported = body
                .pointer("/imported/count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            tracing::info!(imported, "Import successful");
            BatchOutcome::AllAccepted { imported }
        }
        207 => {
            let rejections = invalid_entries(body, batch_size);
            let count = body
                .pointer("/invalid/count")
                .and_then(Value::as_u64)
                .unwrap_or(rejections.len() as u64);
            tracing::warn!("{count} of {batch_size} audio files in the payload are invalid.");
            if count != rejections.len() as u64 {
                tracing::warn!(
                    reported = count,
                    usable = rejections.len(),
                    "Invalid count does not match the usable indexes"
                );
            }
            BatchOutcome::PartiallyAccepted { rejections }
        }
        422 => {
            tracing::warn!("{ALL_INVALID_MESSAGE}");
            let has_detail = body
                .pointer("/invalid/indexes")
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty());
            let rejections = if has_detail {
                invalid_entries(body, batch_size)
            } else {
                (0..batch_size)
                    .map(|i| ItemRejection::new(i, SYNTHETIC_422_REASON))
                    .collect()
            };
            BatchOutcome::AllRejected {
                reason: ALL_INVALID_MESSAGE.to_string(),
                rejections,
            }
        }
        other => {
            let reason = malformed_request_message(other, body)
                .unwrap_or_else(|| unexpected_status_message(other, body));
            tracing::error!(status = other, "{reason}");
            BatchOutcome::AllRejected {
                reason,
                rejections: Vec::new(),
            }
        }
    }
}

/// Messages for the 400/413/415 family, shared with the search endpoint.
pub(crate) fn malformed_request_message(status: u16, body: &Value) -> Option<String> {
    match status {
        400 => Some(format!("Payload JSON is invalid. Response: {body}")),
        413 => Some(format!(
            "Payload too large. The limit is {} bytes.",
            field_text(body, "limit")
        )),
        415 => Some(format!(
            "Request content type is not supported. Content-Type must be application/json. Got {}",
            field_text(body, "got")
        )),
        _ => None,
    }
}

pub(crate) fn unexpected_status_message(status: u16, body: &Value) -> String {
    format!("Unexpected status code {status}. Response: {body}")
}

/// Renders a top-level body field for a message, `unknown` when absent.
pub(crate) fn field_text(body: &Value, key: &str) -> String {
    match body.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => UNKNOWN_REASON.to_string(),
        Some(other) => other.to_string(),
    }
}

fn invalid_entries(body: &Value, batch_size: usize) -> Vec<ItemRejection> {
    zip_invalid(
        invalid_array(body, "indexes"),
        invalid_array(body, "errors"),
        batch_size,
    )
}

fn invalid_array<'a>(body: &'a Value, field: &str) -> &'a [Value] {
    body.get("invalid")
        .and_then(|invalid| invalid.get(field))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
