use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeetingKind {
    Plenary,
    Committee,
}

impl MeetingKind {
    /// Map the feed's `soort` discriminator. Unknown kinds are not meetings we track.
    pub fn from_feed(value: &str) -> Option<Self> {
        let v = value.trim();
        if v.eq_ignore_ascii_case("plenair") {
            Some(MeetingKind::Plenary)
        } else if v.eq_ignore_ascii_case("commissie") {
            Some(MeetingKind::Committee)
        } else {
            None
        }
    }

    pub fn feed_label(self) -> &'static str {
        match self {
            MeetingKind::Plenary => "Plenair",
            MeetingKind::Committee => "Commissie",
        }
    }
}

/// Kinds of meetings a run is interested in.
pub fn wanted_kinds(include_committees: bool) -> Vec<MeetingKind> {
    if include_committees {
        vec![MeetingKind::Plenary, MeetingKind::Committee]
    } else {
        vec![MeetingKind::Plenary]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRecord {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub kind: MeetingKind,
}

/// Parse the leading `YYYY-MM-DD` of a feed date, ignoring any time part.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub party: Option<String>,
    pub role: Option<String>,
}

impl Speaker {
    pub fn procedural() -> Self {
        Speaker {
            name: "Procedural".to_string(),
            party: None,
            role: Some("System".to_string()),
        }
    }

    pub fn unknown() -> Self {
        Speaker {
            name: "Unknown".to_string(),
            party: None,
            role: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: Speaker,
    pub text: String,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
}

/// One meeting's transcript. Segments stay in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub meeting_id: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub meeting_kind: Option<String>,
    pub url: String,
    pub segments: Vec<Segment>,
}

impl TranscriptDocument {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            meeting_id: self.meeting_id.clone(),
            title: self.title.clone(),
            date: self.date.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            location: self.location.clone(),
            meeting_kind: self.meeting_kind.clone(),
            url: self.url.clone(),
            segments_count: self.segments.len(),
        }
    }
}

/// Header snapshot written next to the raw document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub meeting_id: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub meeting_kind: Option<String>,
    pub url: String,
    pub segments_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_kinds() {
        assert_eq!(MeetingKind::from_feed("Plenair"), Some(MeetingKind::Plenary));
        assert_eq!(MeetingKind::from_feed(" commissie "), Some(MeetingKind::Committee));
        assert_eq!(MeetingKind::from_feed("Procedurevergadering"), None);
    }

    #[test]
    fn feed_dates() {
        let d = NaiveDate::from_ymd_opt(2019, 5, 28).unwrap();
        assert_eq!(parse_feed_date("2019-05-28"), Some(d));
        assert_eq!(parse_feed_date("2019-05-28T00:00:00+02:00"), Some(d));
        assert_eq!(parse_feed_date("28 mei"), None);
        assert_eq!(parse_feed_date(""), None);
    }

    #[test]
    fn committees_are_opt_in() {
        assert_eq!(wanted_kinds(false), vec![MeetingKind::Plenary]);
        assert_eq!(wanted_kinds(true).len(), 2);
    }
}
