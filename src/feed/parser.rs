use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link};
use feed_rs::parser::{Builder, ParseFeedError};

use super::date::lenient_timestamp;
use crate::record::{AudioType, SubmissionRecord};
use crate::util::{strip_control_chars, to_iso_utc};

/// Title used when an entry has none.
pub const UNKNOWN_EPISODE_TITLE: &str = "Unknown Episode";
/// Category used when the feed itself has no title.
pub const DEFAULT_FEED_CATEGORY: &str = "Podcast";

/// Declared MIME types treated as MP3 audio.
const MP3_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/mpeg3",
    "audio/x-mpeg",
    "audio/x-mp3",
];

/// A feed converted into submission records.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub records: Vec<SubmissionRecord>,
    /// Entries whose publish date was missing or unparseable.
    pub date_fallbacks: usize,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseFeedError> {
    parse_feed_at(bytes, Utc::now())
}

/// Parses RSS/Atom bytes, using `now` as the recording time of entries
/// without a usable publish date.
pub fn parse_feed_at(bytes: &[u8], now: DateTime<Utc>) -> Result<ParsedFeed, ParseFeedError> {
    let parser = Builder::new().timestamp_parser(lenient_timestamp).build();
    let feed = parser.parse(bytes)?;

    let title = feed
        .title
        .map(|t| clean_text(&t.content))
        .filter(|t| !t.is_empty());
    let category = title
        .clone()
        .unwrap_or_else(|| DEFAULT_FEED_CATEGORY.to_string());

    let mut date_fallbacks = 0;
    let records = feed
        .entries
        .into_iter()
        .map(|entry| {
            let (record, fell_back) = entry_to_record(entry, &category, now);
            if fell_back {
                date_fallbacks += 1;
            }
            record
        })
        .collect();

    Ok(ParsedFeed {
        title,
        records,
        date_fallbacks,
    })
}

/// Maps one entry; the flag reports whether the date fell back to `now`.
fn entry_to_record(entry: Entry, category: &str, now: DateTime<Utc>) -> (SubmissionRecord, bool) {
    let source_url = extract_audio_url(&entry);

    let title = entry
        .title
        .map(|t| clean_text(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_EPISODE_TITLE.to_string());

    let summary = entry
        .summary
        .map(|s| clean_text(&s.content))
        .unwrap_or_default();

    let (recording_time, fell_back) = match entry.published.or(entry.updated) {
        Some(published) => (to_iso_utc(&published), false),
        None => {
            tracing::warn!(
                target: "audioport::data_quality",
                episode = %title,
                fallback = %to_iso_utc(&now),
                "Episode publish date missing or unparseable, replaced it with current time"
            );
            (to_iso_utc(&now), true)
        }
    };

    if source_url.is_none() {
        tracing::warn!(episode = %title, "Episode has no link or MP3 enclosure");
    }

    let record = SubmissionRecord {
        title,
        recording_time,
        category: category.to_string(),
        audio_type: AudioType::Media,
        summary,
        duration_seconds: 0.0,
        inline_audio: None,
        source_url,
    };
    (record, fell_back)
}

/// Picks the entry's audio source.
///
/// A direct entry link wins; otherwise the first enclosure declared as MP3.
pub(crate) fn extract_audio_url(entry: &Entry) -> Option<String> {
    if let Some(link) = entry
        .links
        .iter()
        .find(|l| is_direct_link(l) && !l.href.trim().is_empty())
    {
        return Some(link.href.trim().to_string());
    }

    let media_enclosure = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find(|c| {
            c.content_type
                .as_ref()
                .is_some_and(|t| is_mp3_type(&t.to_string()))
        })
        .and_then(|c| c.url.as_ref())
        .map(|u| u.to_string());

    media_enclosure.or_else(|| {
        entry
            .links
            .iter()
            .find(|l| {
                l.rel.as_deref() == Some("enclosure")
                    && l.media_type.as_deref().is_some_and(is_mp3_type)
                    && !l.href.trim().is_empty()
            })
            .map(|l| l.href.trim().to_string())
    })
}

/// RSS `<link>` (no rel) and Atom `rel="alternate"` count as direct links.
fn is_direct_link(link: &Link) -> bool {
    matches!(link.rel.as_deref(), None | Some("alternate"))
}

fn is_mp3_type(declared: &str) -> bool {
    let essence = declared.split(';').next().unwrap_or("").trim();
    MP3_MIME_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(essence))
}

fn clean_text(s: &str) -> String {
    strip_control_chars(s.trim()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn rss(items: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Deep Dive Radio</title>
<link>https://radio.example.com</link>
<description>test</description>
{items}
</channel></rss>"#
        )
    }

    #[test]
    fn test_full_entry() {
        let xml = rss(
            r#"<item>
  <title>Episode 1</title>
  <description>First one</description>
  <pubDate>Mon, 01 Jan 2024 10:30:00 +0100</pubDate>
  <enclosure url="https://cdn.example.com/ep1.mp3" length="123" type="audio/mpeg"/>
</item>"#,
        );

        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        let record = &parsed.records[0];

        assert_eq!(parsed.title.as_deref(), Some("Deep Dive Radio"));
        assert_eq!(record.title, "Episode 1");
        assert_eq!(record.summary, "First one");
        assert_eq!(record.category, "Deep Dive Radio");
        assert_eq!(record.audio_type, AudioType::Media);
        assert_eq!(record.recording_time, "2024-01-01T09:30:00Z");
        assert_eq!(record.source_url.as_deref(), Some("https://cdn.example.com/ep1.mp3"));
        assert_eq!(parsed.date_fallbacks, 0);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<item><enclosure url="https://cdn.example.com/a.mp3" type="audio/mpeg"/></item>
</channel></rss>"#;

        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        let record = &parsed.records[0];

        assert_eq!(record.title, UNKNOWN_EPISODE_TITLE);
        assert_eq!(record.summary, "");
        assert_eq!(record.category, DEFAULT_FEED_CATEGORY);
        assert_eq!(record.recording_time, "2025-06-01T12:00:00Z");
        assert_eq!(parsed.date_fallbacks, 1);
    }

    #[test]
    fn test_empty_pubdate_falls_back_to_now() {
        let xml = rss("<item><title>Blank date</title><pubDate></pubDate></item>");
        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();

        assert_eq!(parsed.records[0].recording_time, "2025-06-01T12:00:00Z");
        assert_eq!(parsed.date_fallbacks, 1);
    }

    #[test]
    fn test_garbage_pubdate_falls_back_to_now() {
        let xml = rss("<item><title>Bad date</title><pubDate>sometime in spring</pubDate></item>");
        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();

        assert_eq!(parsed.records[0].recording_time, "2025-06-01T12:00:00Z");
        assert_eq!(parsed.date_fallbacks, 1);
    }

    #[test]
    fn test_direct_link_preferred_over_enclosure() {
        let xml = rss(
            r#"<item>
  <title>Linked</title>
  <link>https://radio.example.com/audio/ep2.mp3</link>
  <enclosure url="https://cdn.example.com/ep2.mp3" type="audio/mpeg"/>
</item>"#,
        );
        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        assert_eq!(
            parsed.records[0].source_url.as_deref(),
            Some("https://radio.example.com/audio/ep2.mp3")
        );
    }

    #[test]
    fn test_non_mp3_enclosure_ignored() {
        let xml = rss(
            r#"<item>
  <title>Video only</title>
  <enclosure url="https://cdn.example.com/ep3.mp4" type="video/mp4"/>
</item>"#,
        );
        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        assert_eq!(parsed.records[0].source_url, None);
    }

    #[test]
    fn test_atom_enclosure_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:uuid:feed</id>
  <updated>2024-05-01T00:00:00Z</updated>
  <entry>
    <title>Atom episode</title>
    <id>urn:uuid:1</id>
    <updated>2024-05-02T08:00:00+02:00</updated>
    <link rel="enclosure" type="audio/mp3" href="https://cdn.example.com/atom.mp3"/>
  </entry>
</feed>"#;

        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        let record = &parsed.records[0];
        assert_eq!(record.category, "Atom Cast");
        assert_eq!(record.recording_time, "2024-05-02T06:00:00Z");
        assert_eq!(record.source_url.as_deref(), Some("https://cdn.example.com/atom.mp3"));
    }

    #[test]
    fn test_entry_order_preserved() {
        let xml = rss(
            "<item><title>A</title></item><item><title>B</title></item><item><title>C</title></item>",
        );
        let parsed = parse_feed_at(xml.as_bytes(), fixed_now()).unwrap();
        let titles: Vec<_> = parsed.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_feed_at(b"<not valid xml", fixed_now()).is_err());
    }

    #[test]
    fn test_mp3_type_matching() {
        assert!(is_mp3_type("audio/mpeg"));
        assert!(is_mp3_type("Audio/MP3; charset=binary"));
        assert!(!is_mp3_type("audio/ogg"));
        assert!(!is_mp3_type(""));
    }
}
