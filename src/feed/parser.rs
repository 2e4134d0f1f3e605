use serde::{Deserialize, Serialize};

/// An RSS 2.0 document as received from a feed: `<rss><channel>...</channel></rss>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RssFeed {
    pub channel: RssChannel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RssChannel {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "item", default)]
    pub items: Vec<RssItem>,
}

/// One `<item>`, before normalization. All fields are kept as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
}

/// Decode an RSS document and unescape HTML entities in its text fields.
///
/// XML-level escapes are resolved by the decoder; this additionally resolves
/// HTML entities such as `&rsquo;` that feeds commonly double-escape into
/// titles and descriptions. Links and dates are left as decoded.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so a
/// hostile DOCTYPE fails to decode instead of pulling in external content.
pub fn parse_rss(bytes: &[u8]) -> Result<RssFeed, quick_xml::DeError> {
    let mut feed: RssFeed = quick_xml::de::from_reader(bytes)?;
    feed.unescape_html();
    Ok(feed)
}

impl RssFeed {
    fn unescape_html(&mut self) {
        unescape_in_place(&mut self.channel.title);
        unescape_in_place(&mut self.channel.description);
        for item in &mut self.channel.items {
            unescape_in_place(&mut item.title);
            unescape_in_place(&mut item.description);
        }
    }
}

fn unescape_in_place(field: &mut String) {
    if field.contains('&') {
        *field = html_escape::decode_html_entities(field.as_str()).into_owned();
    }
}
