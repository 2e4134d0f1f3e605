//! Turns raw feed items into storable posts.
//!
//! Both transforms are pure: date parsing reports failure as a value, and
//! markup stripping cannot fail.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use super::parser::RssItem;
use crate::storage::NewPost;

/// Stored in place of empty or boilerplate descriptions
pub const NO_DESCRIPTION: &str = "No description available";

/// Some feeds emit a bare "Comments" link as the whole description
const BOILERPLATE_DESCRIPTION: &str = "Comments";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is a valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized date format: {0:?}")]
pub struct DateParseError(pub String);

/// How one entry of [`DATE_LAYOUTS`] is interpreted.
#[derive(Debug, Clone, Copy)]
enum DateLayout {
    /// chrono format ending in a numeric offset (`%z`)
    Offset(&'static str),
    /// chrono format followed by a space and a zone abbreviation of two or
    /// more letters (`UT`, `GMT`, `EST`). A lone `Z` is left to the literal-Z layout.
    Abbreviated(&'static str),
    /// chrono format with no zone; read as UTC
    Naive(&'static str),
    Rfc3339,
}

/// Tried in order; the first match wins.
const DATE_LAYOUTS: [DateLayout; 9] = [
    // RFC 1123: Mon, 02 Jan 2006 15:04:05 MST
    DateLayout::Abbreviated("%a, %d %b %Y %H:%M:%S"),
    // RFC 1123 with numeric zone: Mon, 02 Jan 2006 15:04:05 -0700
    DateLayout::Offset("%a, %d %b %Y %H:%M:%S %z"),
    // RFC 822: 02 Jan 06 15:04 MST
    DateLayout::Abbreviated("%d %b %y %H:%M"),
    // RFC 822 with numeric zone: 02 Jan 06 15:04 -0700
    DateLayout::Offset("%d %b %y %H:%M %z"),
    // RFC 1123 with a literal Z: Mon, 02 Jan 2006 15:04:05 Z
    DateLayout::Naive("%a, %d %b %Y %H:%M:%S Z"),
    // RFC 3339 / ISO 8601: 2006-01-02T15:04:05Z07:00, fractional seconds allowed
    DateLayout::Rfc3339,
    // ISO 8601 basic offset: 2006-01-02T15:04:05-0700
    DateLayout::Offset("%Y-%m-%dT%H:%M:%S%z"),
    // ISO 8601 without zone: 2006-01-02T15:04:05
    DateLayout::Naive("%Y-%m-%dT%H:%M:%S"),
    // 2006-01-02 15:04:05
    DateLayout::Naive("%Y-%m-%d %H:%M:%S"),
];

impl DateLayout {
    fn parse(self, input: &str) -> Option<DateTime<Utc>> {
        match self {
            DateLayout::Offset(fmt) => DateTime::parse_from_str(input, fmt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateLayout::Abbreviated(fmt) => {
                let (head, zone) = input.rsplit_once(' ')?;
                if zone.len() < 2 || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                let naive = NaiveDateTime::parse_from_str(head, fmt).ok()?;
                let offset = FixedOffset::east_opt(zone_offset_seconds(zone))?;
                offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            DateLayout::Naive(fmt) => NaiveDateTime::parse_from_str(input, fmt)
                .ok()
                .map(|naive| naive.and_utc()),
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Offsets for the zone names RFC 822 defines. Anything else is read as UTC.
fn zone_offset_seconds(zone: &str) -> i32 {
    const HOUR: i32 = 3600;
    match zone.to_ascii_uppercase().as_str() {
        "EST" => -5 * HOUR,
        "EDT" => -4 * HOUR,
        "CST" => -6 * HOUR,
        "CDT" => -5 * HOUR,
        "MST" => -7 * HOUR,
        "MDT" => -6 * HOUR,
        "PST" => -8 * HOUR,
        "PDT" => -7 * HOUR,
        _ => 0,
    }
}

/// Parse a feed's free-text publication date against the known layouts.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = input.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .ok_or_else(|| DateParseError(trimmed.to_string()))
}

/// Remove `<...>` sequences and trim.
///
/// A single non-nested pattern, not an HTML parser: a stray `>` inside an
/// attribute value, or an unclosed `<`, is not handled.
pub fn strip_markup(input: &str) -> String {
    TAG_PATTERN.replace_all(input, "").trim().to_string()
}

/// [`strip_markup`], with empty and "Comments"-only results replaced by
/// [`NO_DESCRIPTION`].
pub fn normalize_description(input: &str) -> String {
    let stripped = strip_markup(input);
    if stripped.is_empty() || stripped == BOILERPLATE_DESCRIPTION {
        NO_DESCRIPTION.to_string()
    } else {
        stripped
    }
}

/// An item normalized for storage, plus the date error when its `pubDate`
/// was present but unreadable.
#[derive(Debug)]
pub struct NormalizedEntry {
    pub post: NewPost,
    pub date_error: Option<DateParseError>,
}

/// Build the post for `item`. Returns `None` when the item has no link,
/// since a post is identified by its URL.
pub fn normalize_item(feed_id: i64, item: &RssItem) -> Option<NormalizedEntry> {
    let url = item.link.trim();
    if url.is_empty() {
        return None;
    }

    let title = item.title.trim();
    let (published_at, date_error) = if item.pub_date.trim().is_empty() {
        (None, None)
    } else {
        match parse_date(&item.pub_date) {
            Ok(dt) => (Some(dt.timestamp()), None),
            Err(e) => (None, Some(e)),
        }
    };

    Some(NormalizedEntry {
        post: NewPost {
            feed_id,
            title: (!title.is_empty()).then(|| title.to_string()),
            url: url.to_string(),
            description: Some(normalize_description(&item.description)),
            published_at,
        },
        date_error,
    })
}
