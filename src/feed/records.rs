use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};

use super::atom::Entry;
use crate::model::{parse_feed_date, MeetingKind, MeetingRecord};
use crate::parser::Element;

fn is_deleted(payload: &Element) -> bool {
    payload
        .attr("verwijderd")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Meeting record from a `Vergadering` entry, if it is one of the wanted kinds.
pub fn meeting_from_entry(entry: &Entry, kinds: &[MeetingKind]) -> Option<MeetingRecord> {
    let payload = entry.payload.as_ref()?;
    if is_deleted(payload) {
        return None;
    }
    let kind = MeetingKind::from_feed(&payload.find_text("soort")?)?;
    if !kinds.contains(&kind) {
        return None;
    }
    let id = payload.attr("id").map(str::trim).filter(|s| !s.is_empty())?;
    Some(MeetingRecord {
        id: id.to_string(),
        date: payload.find_text("datum").as_deref().and_then(parse_feed_date),
        kind,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub meeting_id: String,
    pub url: String,
    pub modified: Option<DateTime<FixedOffset>>,
}

/// Report record from a `Verslag` entry: the parent meeting plus the enclosure URL.
pub fn report_from_entry(entry: &Entry) -> Option<ReportRecord> {
    let payload = entry.payload.as_ref()?;
    if is_deleted(payload) {
        return None;
    }
    let url = entry.enclosure.clone()?;
    let meeting_id = payload
        .find("vergadering")
        .and_then(|v| v.attr("ref"))
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(ReportRecord {
        meeting_id: meeting_id.to_string(),
        url,
        modified: entry.updated.as_deref().and_then(parse_modified),
    })
}

pub fn parse_modified(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}

#[derive(Debug, Clone)]
struct MappedReport {
    url: String,
    modified: Option<DateTime<FixedOffset>>,
}

/// meeting id → document URL. When several reports point at the same meeting,
/// the most recently modified one is kept.
#[derive(Debug, Clone, Default)]
pub struct ReportMapping {
    reports: HashMap<String, MappedReport>,
}

impl ReportMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the record was added or replaced an older one.
    pub fn insert(&mut self, record: ReportRecord) -> bool {
        let candidate = MappedReport {
            url: record.url,
            modified: record.modified,
        };
        match self.reports.get_mut(&record.meeting_id) {
            Some(existing) => {
                // `None < Some(_)`, so a dated report beats an undated one.
                if candidate.modified > existing.modified {
                    *existing = candidate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.reports.insert(record.meeting_id, candidate);
                true
            }
        }
    }

    pub fn get(&self, meeting_id: &str) -> Option<&str> {
        self.reports.get(meeting_id).map(|r| r.url.as_str())
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Plain id → URL view, sorted by id.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.reports
            .iter()
            .map(|(id, r)| (id.clone(), r.url.clone()))
            .collect()
    }
}

impl FromIterator<ReportRecord> for ReportMapping {
    fn from_iter<I: IntoIterator<Item = ReportRecord>>(iter: I) -> Self {
        let mut mapping = ReportMapping::new();
        for record in iter {
            mapping.insert(record);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tree::build;

    fn entry(payload: &str, enclosure: Option<&str>, updated: Option<&str>) -> Entry {
        Entry {
            updated: updated.map(String::from),
            enclosure: enclosure.map(String::from),
            payload: Some(build(payload).unwrap()),
        }
    }

    #[test]
    fn plenary_meeting() {
        let e = entry(
            r#"<vergadering xmlns="http://www.tweedekamer.nl/xsd/tkData/v1-0" id="m1"><soort>Plenair</soort><datum>2019-05-28T00:00:00+02:00</datum></vergadering>"#,
            None,
            None,
        );
        let m = meeting_from_entry(&e, &[MeetingKind::Plenary]).unwrap();
        assert_eq!(m.id, "m1");
        assert_eq!(m.kind, MeetingKind::Plenary);
        assert_eq!(m.date.unwrap().to_string(), "2019-05-28");
    }

    #[test]
    fn committee_filtered_unless_requested() {
        let e = entry(r#"<vergadering id="c1"><soort>Commissie</soort></vergadering>"#, None, None);
        assert!(meeting_from_entry(&e, &[MeetingKind::Plenary]).is_none());
        let m = meeting_from_entry(&e, &[MeetingKind::Plenary, MeetingKind::Committee]).unwrap();
        assert_eq!(m.kind, MeetingKind::Committee);
        assert!(m.date.is_none());
    }

    #[test]
    fn deleted_and_idless_entries_are_skipped() {
        let deleted = entry(r#"<vergadering id="d" verwijderd="true"><soort>Plenair</soort></vergadering>"#, None, None);
        assert!(meeting_from_entry(&deleted, &[MeetingKind::Plenary]).is_none());
        let idless = entry(r#"<vergadering><soort>Plenair</soort></vergadering>"#, None, None);
        assert!(meeting_from_entry(&idless, &[MeetingKind::Plenary]).is_none());
    }

    #[test]
    fn report_needs_enclosure_and_ref() {
        let ok = entry(r#"<verslag id="r1"><vergadering ref="m1"/></verslag>"#, Some("https://x/r1"), Some("2024-01-01T00:00:00Z"));
        let r = report_from_entry(&ok).unwrap();
        assert_eq!(r.meeting_id, "m1");
        assert_eq!(r.url, "https://x/r1");
        assert!(r.modified.is_some());

        let no_link = entry(r#"<verslag><vergadering ref="m1"/></verslag>"#, None, None);
        assert!(report_from_entry(&no_link).is_none());
        let no_ref = entry(r#"<verslag><vergadering/></verslag>"#, Some("https://x"), None);
        assert!(report_from_entry(&no_ref).is_none());
    }

    #[test]
    fn most_recent_report_wins() {
        let rec = |url: &str, at: Option<&str>| ReportRecord {
            meeting_id: "m1".into(),
            url: url.into(),
            modified: at.and_then(parse_modified),
        };
        let mapping: ReportMapping = vec![
            rec("https://x/old", Some("2024-01-01T00:00:00Z")),
            rec("https://x/new", Some("2024-03-01T00:00:00+01:00")),
            rec("https://x/undated", None),
            rec("https://x/older", Some("2023-12-31T00:00:00Z")),
        ]
        .into_iter()
        .collect();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("m1"), Some("https://x/new"));
    }
}
