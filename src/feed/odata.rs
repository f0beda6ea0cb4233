//! Filtered-query access to the same data through the OData JSON API.
//!
//! Used instead of walking the full feeds when only meetings since a given
//! date are needed. Pages come back newest-modified first and are chained by
//! `@odata.nextLink`.

use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::records::{parse_modified, ReportMapping, ReportRecord};
use super::{traverse, PageResult, StopReason, Traversal};
use crate::http::Fetch;
use crate::model::{parse_feed_date, MeetingKind, MeetingRecord};
use crate::parser::decode::decode;

/// Meeting ids per batched report lookup request.
const LOOKUP_BATCH: usize = 20;

#[derive(Debug, Deserialize)]
struct ODataPage<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeetingRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Soort")]
    soort: Option<String>,
    #[serde(rename = "Datum")]
    datum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Vergadering_Id")]
    meeting_id: Option<String>,
    #[serde(rename = "GewijzigdOp")]
    modified: Option<String>,
}

fn parse_json_page<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<ODataPage<T>, serde_json::Error> {
    serde_json::from_str(&decode(bytes))
}

fn kind_filter(kinds: &[MeetingKind]) -> String {
    let clauses: Vec<String> = kinds
        .iter()
        .map(|k| format!("Soort eq '{}'", k.feed_label()))
        .collect();
    format!("({})", clauses.join(" or "))
}

fn query_url(base: &str, entity: &str, filter: &str) -> Result<String, StopReason> {
    Url::parse_with_params(
        &format!("{}/{}", base.trim_end_matches('/'), entity),
        &[("$filter", filter), ("$orderby", "GewijzigdOp desc")],
    )
    .map(String::from)
    .map_err(|e| StopReason::Failed(format!("invalid query URL: {}", e)))
}

/// Meetings dated on or after `since`, newest modification first.
pub async fn meetings_since(
    fetcher: &dyn Fetch,
    odata_url: &str,
    since: NaiveDate,
    kinds: Vec<MeetingKind>,
    budget: Option<usize>,
    cancel: &CancellationToken,
) -> Traversal<MeetingRecord> {
    let filter = format!(
        "Verwijderd eq false and Datum ge {}T00:00:00Z and {}",
        since.format("%Y-%m-%d"),
        kind_filter(&kinds)
    );
    let start = match query_url(odata_url, "Vergadering", &filter) {
        Ok(url) => url,
        Err(stop) => {
            return Traversal {
                records: Vec::new(),
                pages: 0,
                stop,
            }
        }
    };

    traverse(fetcher, "meetings-query", start, budget, cancel, move |bytes| {
        let page: ODataPage<MeetingRow> = parse_json_page(bytes)?;
        let records = page
            .value
            .into_iter()
            .filter_map(|row| {
                let kind = MeetingKind::from_feed(row.soort.as_deref()?)?;
                kinds.contains(&kind).then(|| MeetingRecord {
                    id: row.id,
                    date: row.datum.as_deref().and_then(parse_feed_date),
                    kind,
                })
            })
            .collect();
        Ok(PageResult {
            records,
            next: page.next_link,
        })
    })
    .await
}

fn is_guid_like(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Resolve document URLs for a specific set of meetings, in batches.
///
/// Returns the mapping plus the number of batches that failed part-way.
pub async fn lookup_reports(
    fetcher: &dyn Fetch,
    odata_url: &str,
    meeting_ids: &[String],
    cancel: &CancellationToken,
) -> (ReportMapping, usize) {
    let mut mapping = ReportMapping::new();
    let mut failed_batches = 0;

    let ids: Vec<&str> = meeting_ids
        .iter()
        .map(String::as_str)
        .filter(|id| {
            let ok = is_guid_like(id);
            if !ok {
                warn!(meeting_id = %id, "skipping id that cannot be used in a query");
            }
            ok
        })
        .collect();

    for batch in ids.chunks(LOOKUP_BATCH) {
        if cancel.is_cancelled() {
            break;
        }
        let clauses: Vec<String> = batch.iter().map(|id| format!("Vergadering_Id eq {}", id)).collect();
        let filter = format!("Verwijderd eq false and ({})", clauses.join(" or "));
        let start = match query_url(odata_url, "Verslag", &filter) {
            Ok(url) => url,
            Err(_) => {
                failed_batches += 1;
                continue;
            }
        };

        let base = odata_url.trim_end_matches('/').to_string();
        let traversal = traverse(fetcher, "reports-query", start, None, cancel, move |bytes| {
            let page: ODataPage<ReportRow> = parse_json_page(bytes)?;
            let records = page
                .value
                .into_iter()
                .filter_map(|row| {
                    Some(ReportRecord {
                        meeting_id: row.meeting_id?,
                        url: format!("{}/Verslag/{}/resource", base, row.id),
                        modified: row.modified.as_deref().and_then(parse_modified),
                    })
                })
                .collect();
            Ok(PageResult {
                records,
                next: page.next_link,
            })
        })
        .await;

        if matches!(traversal.stop, StopReason::Failed(_)) {
            failed_batches += 1;
        }
        for record in traversal.records {
            mapping.insert(record);
        }
    }

    (mapping, failed_batches)
}
