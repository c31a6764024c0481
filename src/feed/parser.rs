use serde::Deserialize;

/// A decoded RSS channel with its items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

/// One `<item>` of a channel.
///
/// `link` is the post's identity for deduplication. `pub_date` is kept raw;
/// see [`crate::feed::normalize_published`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

// ============================================================================
// Wire Types
// ============================================================================

// quick-xml matches elements by local name, so `<atom:link>` and `<link>`
// (or `<media:title>` and `<title>`) land in the same field. Every text
// field is therefore a list, and the first non-empty value wins.

#[derive(Debug, Deserialize)]
struct RawRss {
    channel: RawChannel,
}

#[derive(Debug, Default, Deserialize)]
struct RawChannel {
    #[serde(default)]
    title: Vec<RawText>,
    #[serde(default)]
    link: Vec<RawText>,
    #[serde(default)]
    description: Vec<RawText>,
    #[serde(default, rename = "item")]
    items: Vec<RawItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    title: Vec<RawText>,
    #[serde(default)]
    link: Vec<RawText>,
    #[serde(default)]
    description: Vec<RawText>,
    #[serde(default, rename = "pubDate")]
    pub_date: Vec<RawText>,
}

/// Text content of one element; attributes such as `href` are ignored.
#[derive(Debug, Default, Deserialize)]
struct RawText {
    #[serde(default, rename = "$text")]
    text: String,
}

fn first_text(values: &[RawText]) -> &str {
    values
        .iter()
        .map(|v| v.text.trim())
        .find(|t| !t.is_empty())
        .unwrap_or("")
}

/// Decode an RSS 2.0 document.
///
/// Missing child elements decode as empty strings. Text fields are
/// HTML-entity unescaped after XML decoding, so double-escaped titles such as
/// `Tom &amp;amp; Jerry` come out as `Tom & Jerry`. Namespaced siblings
/// (`atom:link`) and `<item>`s interleaved with other channel elements are
/// accepted.
///
/// # Errors
///
/// Returns the `quick-xml` deserialization error for malformed markup or a
/// document without a `<channel>`.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, quick_xml::DeError> {
    let raw: RawRss = quick_xml::de::from_reader(bytes)?;
    let channel = raw.channel;

    Ok(FeedDocument {
        title: unescape(first_text(&channel.title)),
        link: unescape(first_text(&channel.link)),
        description: unescape(first_text(&channel.description)),
        items: channel
            .items
            .iter()
            .map(|item| FeedItem {
                title: unescape(first_text(&item.title)),
                link: unescape(first_text(&item.link)),
                description: unescape(first_text(&item.description)),
                pub_date: first_text(&item.pub_date).to_string(),
            })
            .collect(),
    })
}

fn unescape(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Recent content &amp;amp; more</description>
    <item>
        <title>First &amp;#39;post&amp;#39;</title>
        <link>https://blog.boot.dev/first/</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
        <description><![CDATA[<p>Hello &amp; welcome</p>]]></description>
    </item>
    <item>
        <title>Second</title>
        <link> https://blog.boot.dev/second/ </link>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = parse_document(SAMPLE_RSS.as_bytes()).unwrap();

        assert_eq!(doc.title, "Boot.dev Blog");
        assert_eq!(doc.link, "https://blog.boot.dev/");
        assert_eq!(doc.description, "Recent content & more");
        assert_eq!(doc.items.len(), 2);

        assert_eq!(
            doc.items[0],
            FeedItem {
                title: "First 'post'".to_string(),
                link: "https://blog.boot.dev/first/".to_string(),
                description: "<p>Hello & welcome</p>".to_string(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_elements_default_to_empty() {
        let doc = parse_document(SAMPLE_RSS.as_bytes()).unwrap();
        let second = &doc.items[1];

        assert_eq!(second.link, "https://blog.boot.dev/second/");
        assert_eq!(second.description, "");
        assert_eq!(second.pub_date, "");
    }

    #[test]
    fn test_empty_channel() {
        let doc =
            parse_document(br#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#)
                .unwrap();
        assert_eq!(doc, FeedDocument::default());
    }

    #[test]
    fn test_atom_self_link_beside_channel_link() {
        for channel in [
            r#"<title>Boot.dev Blog</title><link>https://blog.boot.dev/</link><atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml"/>"#,
            r#"<title>Boot.dev Blog</title><atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml"/><link>https://blog.boot.dev/</link>"#,
        ] {
            let xml = format!(
                r#"<?xml version="1.0"?><rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>{channel}<item><title>One</title><link>https://blog.boot.dev/one/</link></item></channel></rss>"#
            );
            let doc = parse_document(xml.as_bytes()).unwrap();
            assert_eq!(doc.title, "Boot.dev Blog");
            assert_eq!(doc.link, "https://blog.boot.dev/");
            assert_eq!(doc.items.len(), 1);
            assert_eq!(doc.items[0].link, "https://blog.boot.dev/one/");
        }
    }

    #[test]
    fn test_items_interleaved_with_channel_elements() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel>
            <item><title>One</title><link>https://wagslane.dev/one/</link></item>
            <link>https://wagslane.dev/</link>
            <lastBuildDate>Mon, 02 Jan 2006 15:04:05 -0700</lastBuildDate>
            <item><title>Two</title><link>https://wagslane.dev/two/</link></item>
            <title>Wagslane</title>
            <item><title>Three</title><link>https://wagslane.dev/three/</link></item>
        </channel></rss>"#;

        let doc = parse_document(xml.as_bytes()).unwrap();

        assert_eq!(doc.title, "Wagslane");
        assert_eq!(doc.link, "https://wagslane.dev/");
        let titles: Vec<&str> = doc.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_namespaced_item_title_does_not_override_plain_title() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><item>
            <title>Plain</title>
            <media:title>Media</media:title>
            <link>https://x.example.com/1</link>
        </item></channel></rss>"#;

        let doc = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.items[0].title, "Plain");
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_document(b"<not valid xml").is_err());
    }

    #[test]
    fn test_document_without_channel_is_error() {
        assert!(parse_document(b"<html><body>Not a feed</body></html>").is_err());
    }
}
