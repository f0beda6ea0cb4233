use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Segment, Speaker};

/// Speaker label at the very start of a paragraph: salutation, optional name,
/// optional parenthetical (party or portfolio), then a colon. The name is made
/// of initials, surname particles and capitalised words only.
static SPEAKER_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:De heer|Mevrouw|De voorzitter|Voorzitter|Minister-president|Minister|Staatssecretaris|Griffier)\b|Mevr\.|Mw\.|Dhr\.)(?:\s+(?:(?:\p{Lu}\.)+|(?:van|de|der|den|ter|te|'t)\b|\p{Lu}[\p{L}'-]*)){0,8}(?:\s*\([^)]{0,120}\))?\s*:\s*",
    )
    .unwrap()
});
static LINE_BREAKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t\r\n]+").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static FRACTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(T\d{2}:\d{2}:\d{2})\.\d+").unwrap());

/// A segment as it comes out of extraction, before cleaning and merging.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub speaker: Speaker,
    pub text: String,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
}

/// Remove one leading speaker label such as `De heer Jansen (PVV):`.
pub fn strip_speaker_label(text: &str) -> &str {
    let trimmed = text.trim_start();
    match SPEAKER_LABEL_RE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => text,
    }
}

/// Tabs and line breaks become spaces, space runs collapse, ends are trimmed.
pub fn collapse_whitespace(text: &str) -> String {
    let spaced = LINE_BREAKS_RE.replace_all(text, " ");
    SPACES_RE.replace_all(&spaced, " ").trim().to_string()
}

pub fn clean_text(text: &str) -> String {
    collapse_whitespace(strip_speaker_label(text))
}

/// Drop the sub-second part of an ISO timestamp. Anything else passes through.
pub fn normalize_timestamp(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    if !value.contains('T') {
        return Some(value.to_string());
    }
    Some(FRACTION_RE.replace(value, "$1").into_owned())
}

/// Clean every raw segment, drop the empty ones, then fold consecutive
/// segments by the same speaker into one.
pub fn normalize(raw: Vec<RawSegment>) -> Vec<Segment> {
    raw.into_iter()
        .filter_map(|r| {
            let text = clean_text(&r.text);
            (!text.is_empty()).then(|| Segment {
                speaker: r.speaker,
                text,
                start_timestamp: r.start_timestamp,
                end_timestamp: r.end_timestamp,
            })
        })
        .fold(Vec::new(), merge_into)
}

fn merge_into(mut out: Vec<Segment>, next: Segment) -> Vec<Segment> {
    match out.last_mut() {
        Some(last) if last.speaker == next.speaker => {
            last.text.push(' ');
            last.text.push_str(&next.text);
            if last.start_timestamp.is_none() {
                last.start_timestamp = next.start_timestamp;
            }
            if let Some(end) = next.end_timestamp {
                if last.end_timestamp.as_ref().map_or(true, |cur| end > *cur) {
                    last.end_timestamp = Some(end);
                }
            }
        }
        _ => out.push(next),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaker(name: &str, party: &str, role: &str) -> Speaker {
        Speaker {
            name: name.into(),
            party: Some(party.into()),
            role: Some(role.into()),
        }
    }

    fn raw(s: &Speaker, text: &str, start: Option<&str>, end: Option<&str>) -> RawSegment {
        RawSegment {
            speaker: s.clone(),
            text: text.into(),
            start_timestamp: start.map(String::from),
            end_timestamp: end.map(String::from),
        }
    }

    #[test]
    fn merges_same_speaker() {
        let a = speaker("A", "X", "Y");
        let out = normalize(vec![
            raw(&a, "Hello", None, None),
            raw(&a, "there", None, None),
            raw(&a, "friend", None, None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Hello there friend");
    }

    #[test]
    fn different_identity_starts_new_segment() {
        let a = speaker("A", "X", "Y");
        let a_other_party = speaker("A", "Z", "Y");
        let out = normalize(vec![
            raw(&a, "one", None, None),
            raw(&a_other_party, "two", None, None),
            raw(&a, "three", None, None),
        ]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn merge_keeps_earliest_start_and_latest_end() {
        let a = speaker("A", "X", "Y");
        let out = normalize(vec![
            raw(&a, "one", Some("2019-05-28T14:00:00"), Some("2019-05-28T14:01:00")),
            raw(&a, "two", Some("2019-05-28T14:01:00"), None),
            raw(&a, "three", None, Some("2019-05-28T14:03:00")),
            raw(&a, "four", None, Some("2019-05-28T14:02:00")),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_timestamp.as_deref(), Some("2019-05-28T14:00:00"));
        assert_eq!(out[0].end_timestamp.as_deref(), Some("2019-05-28T14:03:00"));
    }

    #[test]
    fn end_set_when_none_yet() {
        let a = speaker("A", "X", "Y");
        let out = normalize(vec![raw(&a, "one", None, None), raw(&a, "two", None, Some("2019-05-28T14:02:00"))]);
        assert_eq!(out[0].end_timestamp.as_deref(), Some("2019-05-28T14:02:00"));
    }

    #[test]
    fn strips_leading_label_only() {
        assert_eq!(clean_text("De heer Jansen: Dank u voorzitter."), "Dank u voorzitter.");
        assert_eq!(clean_text("Voorzitter. Ik open de vergadering."), "Voorzitter. Ik open de vergadering.");
        assert_eq!(clean_text("Mevrouw Van der Berg (GL): Ja."), "Ja.");
        assert_eq!(clean_text("Minister Hoekstra (Financiën): Zeker."), "Zeker.");
        assert_eq!(clean_text("De heer A.B. Jansen (CDA): Goed."), "Goed.");
        assert_eq!(clean_text("Mw. Jansen: Goed."), "Goed.");
        assert_eq!(clean_text("Voorzitter. Ik zeg het nog eens: nee."), "Voorzitter. Ik zeg het nog eens: nee.");
        // Only once, and never mid-text.
        assert_eq!(
            clean_text("De voorzitter: De heer Jansen: heeft het woord."),
            "De heer Jansen: heeft het woord."
        );
        assert_eq!(clean_text("Ik zeg tegen De heer Jansen: nee."), "Ik zeg tegen De heer Jansen: nee.");
        assert_eq!(clean_text("Minister-president Rutte: Ja."), "Ja.");
        assert_eq!(clean_text("Staatssecretaris Van 't Wout: Nee."), "Nee.");
    }

    #[test]
    fn sentences_opening_with_a_salutation_are_kept() {
        for text in [
            "De heer Jansen zei gisteren: we gaan door.",
            "Minister ik ben het met u eens: dat moet anders.",
            "Voorzitter ik wil twee dingen zeggen: ten eerste dit.",
            "Voorzitter de motie: die steunen wij.",
        ] {
            assert_eq!(clean_text(text), text);
        }
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a\t\tb\r\n\nc    d  "), "a b c d");
    }

    #[test]
    fn timestamps() {
        assert_eq!(normalize_timestamp(Some("2019-05-28T14:00:33.123")).as_deref(), Some("2019-05-28T14:00:33"));
        assert_eq!(normalize_timestamp(Some("2019-05-28T14:00:33")).as_deref(), Some("2019-05-28T14:00:33"));
        assert_eq!(
            normalize_timestamp(Some("2019-05-28T14:00:33.5+02:00")).as_deref(),
            Some("2019-05-28T14:00:33+02:00")
        );
        assert_eq!(normalize_timestamp(Some("om half drie")).as_deref(), Some("om half drie"));
        assert_eq!(normalize_timestamp(None), None);
        assert_eq!(normalize_timestamp(Some("  ")), None);
    }

    #[test]
    fn empty_segments_dropped() {
        let a = speaker("A", "X", "Y");
        let b = speaker("B", "X", "Y");
        let out = normalize(vec![
            raw(&a, "one", None, None),
            raw(&b, "  \n\t ", None, None),
            raw(&b, "De heer B:", None, None),
            raw(&a, "two", None, None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "one two");
    }
}
