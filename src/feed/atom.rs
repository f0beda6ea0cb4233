use tracing::debug;

use crate::error::ParseError;
use crate::parser::{self, Element};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// One fetched feed page.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub entries: Vec<Entry>,
    pub next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub updated: Option<String>,
    pub enclosure: Option<String>,
    /// The document embedded in `<content>`, if any could be isolated.
    pub payload: Option<Element>,
}

pub fn parse_page(root: &Element) -> FeedPage {
    let entries = root
        .find_all_in(ATOM_NS, "entry")
        .map(|entry| Entry {
            updated: entry
                .elements()
                .find(|e| e.is_in(ATOM_NS, "updated"))
                .map(|e| e.text().trim().to_string())
                .filter(|s| !s.is_empty()),
            enclosure: link_href(entry, "enclosure"),
            payload: entry
                .elements()
                .find(|e| e.is_in(ATOM_NS, "content"))
                .and_then(|content| match isolate_payload(content) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "skipping entry with unusable payload");
                        None
                    }
                }),
        })
        .collect();

    FeedPage {
        entries,
        next: link_href(root, "next"),
    }
}

/// `href` of the first direct `<link rel=...>` child with the given relation.
fn link_href(parent: &Element, rel: &str) -> Option<String> {
    parent
        .elements()
        .filter(|e| e.is_in(ATOM_NS, "link"))
        .find(|e| e.attr("rel") == Some(rel))
        .and_then(|e| e.attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// An entry's `<content>` carries its record either inline as child elements or
/// as an escaped / CDATA-wrapped document in its text.
pub fn isolate_payload(content: &Element) -> Result<Option<Element>, ParseError> {
    if let Some(child) = content.elements().next() {
        return Ok(Some(child.clone()));
    }
    let text = content.text();
    if text.trim().is_empty() {
        return Ok(None);
    }
    parser::parse_text(&text).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tree::build;

    fn content(inner: &str) -> Element {
        build(&format!(r#"<content xmlns="{}" type="application/xml">{}</content>"#, ATOM_NS, inner)).unwrap()
    }

    #[test]
    fn inline_payload() {
        let p = isolate_payload(&content(r#"<vergadering xmlns="urn:tk" id="m1"/>"#)).unwrap().unwrap();
        assert_eq!(p.name, "vergadering");
        assert_eq!(p.attr("id"), Some("m1"));
    }

    #[test]
    fn escaped_payload() {
        let p = isolate_payload(&content("&lt;vergadering id=\"m2\"&gt;&lt;soort&gt;Plenair&lt;/soort&gt;&lt;/vergadering&gt;"))
            .unwrap()
            .unwrap();
        assert_eq!(p.attr("id"), Some("m2"));
        assert_eq!(p.find_text("soort").as_deref(), Some("Plenair"));
    }

    #[test]
    fn cdata_payload() {
        let p = isolate_payload(&content("<![CDATA[\n<vergadering id=\"m3\"/>]]>")).unwrap().unwrap();
        assert_eq!(p.attr("id"), Some("m3"));
    }

    #[test]
    fn empty_and_broken_payloads() {
        assert!(isolate_payload(&content("  ")).unwrap().is_none());
        assert!(isolate_payload(&content("&lt;broken")).is_err());
    }

    #[test]
    fn page_links_and_entries() {
        let xml = format!(
            r#"<feed xmlns="{ns}">
                <link rel="self" href="https://x/feed?p=1"/>
                <link rel="next" href="https://x/feed?p=2"/>
                <entry>
                    <updated>2024-01-02T10:00:00Z</updated>
                    <link rel="enclosure" href="https://x/doc/1"/>
                    <content type="application/xml"><verslag/></content>
                </entry>
                <entry><content>&lt;oops</content></entry>
            </feed>"#,
            ns = ATOM_NS
        );
        let page = parse_page(&build(&xml).unwrap());
        assert_eq!(page.next.as_deref(), Some("https://x/feed?p=2"));
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].enclosure.as_deref(), Some("https://x/doc/1"));
        assert_eq!(page.entries[0].updated.as_deref(), Some("2024-01-02T10:00:00Z"));
        assert!(page.entries[0].payload.is_some());
        assert!(page.entries[1].payload.is_none());
    }
}
