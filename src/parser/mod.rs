pub mod decode;
pub mod tree;

use crate::error::ParseError;
pub use tree::{Element, Node};

/// A parsed document plus the decoded text it came from.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub root: Element,
}

/// Two-step pipeline: raw bytes → canonical text → element tree.
pub fn parse_document(bytes: &[u8]) -> Result<Document, ParseError> {
    let text = decode::decode(bytes);
    let root = tree::build(&text)?;
    Ok(Document { text, root })
}

/// Parse text that was already decoded (e.g. a payload embedded in a feed entry).
pub fn parse_text(text: &str) -> Result<Element, ParseError> {
    let trimmed = text.trim_start_matches(['\u{FEFF}', ' ', '\t', '\r', '\n']);
    tree::build(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_prefixed_document_parses() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<?xml version=\"1.0\"?><verslag><titel>T</titel></verslag>");
        let doc = parse_document(&bytes).unwrap();
        assert_eq!(doc.root.name, "verslag");
        assert_eq!(doc.root.find_text("titel").as_deref(), Some("T"));
        assert!(doc.text.starts_with("<?xml"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_document(b"<a><b></c></a>").is_err());
    }
}
