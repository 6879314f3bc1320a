//! Podcast feed normalization.
//!
//! Turns an RSS/Atom feed URL into canonical [`SubmissionRecord`]s:
//!
//! - [`fetcher`] - HTTP retrieval with timeout, size limit and retry
//! - [`parser`] - entry-to-record mapping on top of `feed-rs`
//! - [`date`] - defensive publish-date parsing
//!
//! # Example
//!
//! ```ignore
//! use audioport::feed::FeedNormalizer;
//!
//! let normalizer = FeedNormalizer::new(reqwest::Client::new(), Duration::from_secs(30));
//! let records = normalizer.normalize("https://podcast.example.com/feed.rss").await?;
//! ```

mod date;
mod fetcher;
mod parser;

pub use date::{parse_pubdate, rss_pubdate_to_iso, DateParseError};
pub use fetcher::FetchError;
pub use parser::{parse_feed, parse_feed_at, ParsedFeed, DEFAULT_FEED_CATEGORY, UNKNOWN_EPISODE_TITLE};

use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::record::SubmissionRecord;
use crate::util::validate_url;

/// Failure to turn a feed URL into records. The message always names the URL.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Couldn't load RSS feed {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("No episodes found in RSS feed {0}")]
    NoEpisodes(String),
}

impl FeedError {
    fn fetch(url: &str, source: FetchError) -> Self {
        FeedError::Fetch {
            url: url.to_string(),
            source,
        }
    }
}

/// Fetches podcast feeds and converts their entries into submission records.
#[derive(Debug, Clone)]
pub struct FeedNormalizer {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedNormalizer {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(client, config.timeouts.feed())
    }

    /// Fetches `url` and returns one record per entry, in feed order.
    ///
    /// Entry-level gaps are filled with defaults (see [`parser`]); only
    /// feed-level problems are errors.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Fetch`] for invalid URLs, network failures, timeouts,
    ///   non-2xx statuses and malformed feeds
    /// - [`FeedError::NoEpisodes`] when the feed parses but has no entries
    pub async fn normalize(&self, url: &str) -> Result<Vec<SubmissionRecord>, FeedError> {
        let validated =
            validate_url(url).map_err(|e| FeedError::fetch(url, FetchError::InvalidUrl(e.to_string())))?;

        let bytes = fetcher::fetch_feed_bytes(&self.client, &validated, self.timeout)
            .await
            .map_err(|e| FeedError::fetch(url, e))?;

        let parsed =
            parse_feed(&bytes).map_err(|e| FeedError::fetch(url, FetchError::Parse(e.to_string())))?;

        if parsed.records.is_empty() {
            tracing::warn!(feed = %url, "Feed parsed but contains no episodes");
            return Err(FeedError::NoEpisodes(url.to_string()));
        }

        tracing::info!(
            feed = %url,
            title = parsed.title.as_deref().unwrap_or(DEFAULT_FEED_CATEGORY),
            episodes = parsed.records.len(),
            date_fallbacks = parsed.date_fallbacks,
            "Normalized feed"
        );
        Ok(parsed.records)
    }
}
