//! Transcript backend protocol.
//!
//! - [`payload`] - record to wire-object codec with validation
//! - [`outcome`] - `/import` status interpretation and index reconciliation
//! - [`search`] - `/search` request and response types
//! - [`client`] - HTTP transport with per-call timeouts and the JSON guard

mod client;
mod outcome;
mod payload;
mod search;

pub use client::{build_http_client, ClientError, SyncClient};
pub use outcome::{
    classify_import, zip_invalid, BatchOutcome, ContractViolation, ItemRejection,
    ALL_INVALID_MESSAGE, SYNTHETIC_422_REASON, UNKNOWN_REASON,
};
pub use payload::{encode, encode_batch, BatchValidationError, ContentSource, ValidationError, WireRecord};
pub use search::{
    classify_search, SearchAudioData, SearchOutcome, SearchPayload, SearchResponse,
    SearchSegmentData,
};
