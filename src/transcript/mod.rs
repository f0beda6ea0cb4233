pub mod normalize;
pub mod shapes;

use tracing::debug;

use crate::error::ParseError;
use crate::model::TranscriptDocument;
use crate::parser::{self, Element};

/// A transcript ready to persist, plus the decoded source it came from.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub document: TranscriptDocument,
    pub raw_text: String,
}

/// Full per-document pipeline: decode → tree → segments → cleaned and merged.
pub fn process(meeting_id: &str, url: &str, bytes: &[u8]) -> Result<Extracted, ParseError> {
    let doc = parser::parse_document(bytes)?;
    let document = build_document(meeting_id, url, &doc.root)?;
    Ok(Extracted {
        document,
        raw_text: doc.text,
    })
}

pub fn build_document(meeting_id: &str, url: &str, root: &Element) -> Result<TranscriptDocument, ParseError> {
    let (shape, raw) = shapes::extract_segments(root)?;
    let raw_count = raw.len();
    let segments = normalize::normalize(raw);
    debug!(meeting_id, ?shape, raw_count, segments = segments.len(), "extracted transcript");

    let header = if root.is("vergadering") {
        root
    } else {
        root.find("vergadering").unwrap_or(root)
    };
    let timestamp = |name: &str| normalize::normalize_timestamp(header.find_text(name).as_deref());

    Ok(TranscriptDocument {
        meeting_id: meeting_id.to_string(),
        title: header.find_text("titel"),
        date: header.find_text("datum"),
        start_time: timestamp("aanvangstijd"),
        end_time: timestamp("sluiting"),
        location: header.find_text("zaal"),
        meeting_kind: header.find_text("soort"),
        url: url.to_string(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Speaker;

    #[test]
    fn flat_document() {
        let bytes = std::fs::read("tests/fixtures/transcript_flat.xml").unwrap();
        let out = process("vergadering-1", "https://feed.test/Verslag/r1/resource", &bytes).unwrap();
        let d = &out.document;
        assert_eq!(d.title.as_deref(), Some("Plenaire vergadering 80"));
        assert_eq!(d.date.as_deref(), Some("2019-05-28T00:00:00"));
        assert_eq!(d.start_time.as_deref(), Some("2019-05-28T14:00:00"));
        assert_eq!(d.end_time.as_deref(), Some("2019-05-28T23:10:41"));
        assert_eq!(d.location.as_deref(), Some("Plenaire zaal"));
        assert_eq!(d.meeting_kind.as_deref(), Some("Plenair"));

        // The two Wilders fragments are merged into one segment.
        let names: Vec<_> = d.segments.iter().map(|s| s.speaker.name.as_str()).collect();
        assert_eq!(names, vec!["Procedural", "Khadija Arib", "Geert Wilders", "Procedural", "Mark Rutte"]);
        let wilders = &d.segments[2];
        assert_eq!(wilders.text, "Voorzitter, dank u wel. Nog een punt.");
        assert_eq!(wilders.start_timestamp.as_deref(), Some("2019-05-28T14:01:05"));
        assert_eq!(wilders.end_timestamp.as_deref(), Some("2019-05-28T14:09:00"));
        assert_eq!(d.segments[0].speaker, Speaker::procedural());
        assert_eq!(d.segments[4].text, "Dank u, voorzitter.");
        assert!(d.segments.iter().all(|s| !s.text.trim().is_empty()));
        assert!(out.raw_text.starts_with("<?xml"));
    }

    #[test]
    fn nested_document() {
        let bytes = std::fs::read("tests/fixtures/transcript_nested.xml").unwrap();
        let d = process("m2", "u", &bytes).unwrap().document;
        assert_eq!(d.title.as_deref(), Some("Plenaire vergadering 38"));
        assert_eq!(d.date.as_deref(), Some("2020-01-15"));
        assert_eq!(d.segments.len(), 5);
        assert_eq!(d.segments[4].text, "Ik vervolg mijn betoog.");
        assert_eq!(d.segments[2].speaker.party.as_deref(), Some("GroenLinks"));
    }

    #[test]
    fn speech_units_without_text_are_dropped() {
        let xml = r#"<verslag><activiteit>
            <spreker><verslagnaam>A</verslagnaam><alinea>Tekst.</alinea></spreker>
            <spreker><verslagnaam>B</verslagnaam><alinea>  </alinea></spreker>
            <spreker><verslagnaam>C</verslagnaam></spreker>
        </activiteit></verslag>"#;
        let d = process("m", "u", xml.as_bytes()).unwrap().document;
        assert_eq!(d.segments.len(), 1);
        assert_eq!(d.segments[0].speaker.name, "A");
    }

    #[test]
    fn malformed_document_is_parse_error() {
        assert!(process("m", "u", b"<verslag><activiteit></verslag>").is_err());
        assert!(matches!(
            process("m", "u", b"<html><p>hi</p></html>"),
            Err(ParseError::UnrecognizedLayout)
        ));
    }
}
