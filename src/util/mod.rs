//! Utility functions shared by the feed, api and import layers.
//!
//! - **URL validation**: scheme and host checks for feed, audio and backend URLs
//! - **Text processing**: control-character stripping and char-boundary safe truncation
//! - **Time**: ISO-8601 UTC rendering shared by records and search payloads
//!
//! # Examples
//!
//! ```
//! use audioport::util::{truncate_chars, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(truncate_chars("héllo", 2), "hé");
//! ```

mod text;
mod time;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars};
pub use time::to_iso_utc;
pub use url_validator::{validate_url, UrlValidationError};
