pub mod atom;
pub mod odata;
pub mod records;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::http::Fetch;
use crate::model::{MeetingKind, MeetingRecord};
use crate::parser;
use crate::pool::offload;
pub use records::{ReportMapping, ReportRecord};

/// Why a traversal stopped. Only `Failed` means something went wrong, and even
/// then the records gathered so far are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    PageBudget,
    EmptyPage,
    Cancelled,
    Failed(String),
}

#[derive(Debug)]
pub struct Traversal<R> {
    pub records: Vec<R>,
    pub pages: usize,
    pub stop: StopReason,
}

/// Records found on one page plus the page's successor link.
pub struct PageResult<R> {
    pub records: Vec<R>,
    pub next: Option<String>,
}

/// Cursor state for a linked list of feed pages.
#[derive(Debug, Clone)]
pub struct Paginator {
    next_cursor: Option<String>,
    page_count: usize,
    budget: Option<usize>,
}

impl Paginator {
    /// `budget` of `None` means no page limit.
    pub fn new(start: impl Into<String>, budget: Option<usize>) -> Self {
        Self {
            next_cursor: Some(start.into()),
            page_count: 0,
            budget,
        }
    }

    /// URL of the page to fetch next, or why there is none.
    pub fn cursor(&self) -> Result<&str, StopReason> {
        if self.budget.is_some_and(|b| self.page_count >= b) {
            return Err(StopReason::PageBudget);
        }
        self.next_cursor.as_deref().ok_or(StopReason::Exhausted)
    }

    /// Record a fetched page. Returns the terminal reason if this page ends the feed.
    pub fn advance(&mut self, matched: usize, next: Option<String>) -> Option<StopReason> {
        self.page_count += 1;
        self.next_cursor = next;
        if matched == 0 {
            return Some(StopReason::EmptyPage);
        }
        self.cursor().err()
    }

    pub fn pages(&self) -> usize {
        self.page_count
    }
}

/// Walk pages sequentially from `start`, parsing each on the worker pool.
pub async fn traverse<R, P>(
    fetcher: &dyn Fetch,
    label: &str,
    start: String,
    budget: Option<usize>,
    cancel: &CancellationToken,
    parse_page: P,
) -> Traversal<R>
where
    R: Send + 'static,
    P: Fn(&[u8]) -> Result<PageResult<R>, ParseError> + Send + Sync + 'static,
{
    let parse_page = Arc::new(parse_page);
    let mut paginator = Paginator::new(start, budget);
    let mut records = Vec::new();

    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        let url = match paginator.cursor() {
            Ok(url) => url.to_string(),
            Err(reason) => break reason,
        };

        info!(feed = label, page = paginator.pages() + 1, "fetching feed page");
        let body = match fetcher.get(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(feed = label, error = %e, "feed page fetch failed");
                break StopReason::Failed(e.to_string());
            }
        };

        let parse = Arc::clone(&parse_page);
        let page = match offload(move || parse(&body)).await {
            Some(Ok(page)) => page,
            Some(Err(e)) => {
                warn!(feed = label, error = %e, "feed page unusable");
                break StopReason::Failed(e.to_string());
            }
            None => break StopReason::Failed("page parser panicked".to_string()),
        };

        let matched = page.records.len();
        records.extend(page.records);
        debug!(feed = label, matched, total = records.len(), next = ?page.next, "page done");

        if let Some(reason) = paginator.advance(matched, page.next) {
            break reason;
        }
    };

    info!(
        feed = label,
        pages = paginator.pages(),
        records = records.len(),
        stop = ?stop,
        "feed traversal finished"
    );
    Traversal {
        records,
        pages: paginator.pages(),
        stop,
    }
}

/// All meetings of the wanted kinds from the `Vergadering` category.
pub async fn fetch_meetings(
    fetcher: &dyn Fetch,
    feed_url: &str,
    kinds: Vec<MeetingKind>,
    budget: Option<usize>,
    cancel: &CancellationToken,
) -> Traversal<MeetingRecord> {
    let start = format!("{}?category=Vergadering", feed_url);
    traverse(fetcher, "meetings", start, budget, cancel, move |bytes| {
        let doc = parser::parse_document(bytes)?;
        let page = atom::parse_page(&doc.root);
        let records = page
            .entries
            .iter()
            .filter_map(|e| records::meeting_from_entry(e, &kinds))
            .collect();
        Ok(PageResult {
            records,
            next: page.next,
        })
    })
    .await
}

/// All report records from the `Verslag` category.
pub async fn fetch_reports(
    fetcher: &dyn Fetch,
    feed_url: &str,
    budget: Option<usize>,
    cancel: &CancellationToken,
) -> Traversal<ReportRecord> {
    let start = format!("{}?category=Verslag", feed_url);
    traverse(fetcher, "reports", start, budget, cancel, |bytes| {
        let doc = parser::parse_document(bytes)?;
        let page = atom::parse_page(&doc.root);
        let records = page.entries.iter().filter_map(records::report_from_entry).collect();
        Ok(PageResult {
            records,
            next: page.next,
        })
    })
    .await
}

/// Report feed folded into a meeting id → URL mapping.
pub async fn fetch_report_mapping(
    fetcher: &dyn Fetch,
    feed_url: &str,
    budget: Option<usize>,
    cancel: &CancellationToken,
) -> (ReportMapping, StopReason) {
    let traversal = fetch_reports(fetcher, feed_url, budget, cancel).await;
    (traversal.records.into_iter().collect(), traversal.stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::MapFetcher;

    const FEED: &str = "https://feed.test/Feed";

    fn meeting_entry(id: &str, soort: &str) -> String {
        format!(
            r#"<entry><content type="application/xml"><vergadering xmlns="http://www.tweedekamer.nl/xsd/tkData/v1-0" id="{id}"><soort>{soort}</soort><datum>2024-02-01</datum></vergadering></content></entry>"#
        )
    }

    fn page(entries: &[String], next: Option<&str>) -> String {
        let next = next
            .map(|n| format!(r#"<link rel="next" href="{}"/>"#, n.replace('&', "&amp;")))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><feed xmlns="http://www.w3.org/2005/Atom">{}{}</feed>"#,
            next,
            entries.concat()
        )
    }

    fn page_url(n: usize) -> String {
        format!("{}?category=Vergadering&skiptoken={}", FEED, n)
    }

    /// A chain of `n` pages with two plenary meetings each; the last has no next link.
    fn chain(n: usize) -> MapFetcher {
        let mut f = MapFetcher::new();
        for i in 0..n {
            let url = if i == 0 { format!("{}?category=Vergadering", FEED) } else { page_url(i) };
            let next = (i + 1 < n).then(|| page_url(i + 1));
            let entries = vec![meeting_entry(&format!("m{}a", i), "Plenair"), meeting_entry(&format!("m{}b", i), "Plenair")];
            f = f.with(&url, page(&entries, next.as_deref()));
        }
        f
    }

    #[test]
    fn paginator_state_machine() {
        let mut p = Paginator::new("a", Some(2));
        assert_eq!(p.cursor(), Ok("a"));
        assert_eq!(p.advance(3, Some("b".into())), None);
        assert_eq!(p.cursor(), Ok("b"));
        assert_eq!(p.advance(1, Some("c".into())), Some(StopReason::PageBudget));

        let mut p = Paginator::new("a", None);
        assert_eq!(p.advance(0, Some("b".into())), Some(StopReason::EmptyPage));
        let mut p = Paginator::new("a", None);
        assert_eq!(p.advance(1, None), Some(StopReason::Exhausted));
    }

    #[tokio::test]
    async fn follows_next_links_until_null() {
        let f = chain(3);
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], None, &CancellationToken::new()).await;
        assert_eq!(t.stop, StopReason::Exhausted);
        assert_eq!(t.pages, 3);
        assert_eq!(t.records.len(), 6);
        assert_eq!(t.records[0].id, "m0a");
        assert_eq!(t.records[5].id, "m2b");
    }

    #[tokio::test]
    async fn stops_exactly_at_budget() {
        let f = chain(5);
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], Some(2), &CancellationToken::new()).await;
        assert_eq!(t.stop, StopReason::PageBudget);
        assert_eq!(t.pages, 2);
        assert_eq!(f.calls().len(), 2);
        assert_eq!(t.records.len(), 4);
    }

    #[tokio::test]
    async fn page_without_matches_ends_feed() {
        let first = format!("{}?category=Vergadering", FEED);
        let f = MapFetcher::new()
            .with(&first, page(&[meeting_entry("c1", "Commissie")], Some(&page_url(1))))
            .with(&page_url(1), page(&[meeting_entry("p1", "Plenair")], None));
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], None, &CancellationToken::new()).await;
        assert_eq!(t.stop, StopReason::EmptyPage);
        assert_eq!(t.pages, 1);
        assert!(t.records.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_partial_result() {
        let first = format!("{}?category=Vergadering", FEED);
        // Second page is never served.
        let f = MapFetcher::new().with(&first, page(&[meeting_entry("p1", "Plenair")], Some(&page_url(1))));
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], None, &CancellationToken::new()).await;
        assert!(matches!(t.stop, StopReason::Failed(_)));
        assert_eq!(t.records.len(), 1);

        let broken = MapFetcher::new().with(&first, "<feed><entry></feed>");
        let t = fetch_meetings(&broken, FEED, vec![MeetingKind::Plenary], None, &CancellationToken::new()).await;
        assert!(matches!(t.stop, StopReason::Failed(_)));
        assert_eq!(t.pages, 0);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let f = chain(2);
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], None, &cancel).await;
        assert_eq!(t.stop, StopReason::Cancelled);
        assert!(f.calls().is_empty());
    }

    #[tokio::test]
    async fn report_feed_builds_mapping() {
        let xml = std::fs::read("tests/fixtures/reports_page.xml").unwrap();
        let f = MapFetcher::new().with(&format!("{}?category=Verslag", FEED), xml);
        let (mapping, stop) = fetch_report_mapping(&f, FEED, None, &CancellationToken::new()).await;
        assert_eq!(stop, StopReason::Exhausted);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("vergadering-1"), Some("https://feed.test/Verslag/r1b/resource"));
        assert_eq!(mapping.get("vergadering-2"), Some("https://feed.test/Verslag/r2/resource"));
    }

    #[tokio::test]
    async fn meeting_fixture_page() {
        let xml = std::fs::read("tests/fixtures/meetings_page.xml").unwrap();
        let f = MapFetcher::new().with(&format!("{}?category=Vergadering", FEED), xml);
        let t = fetch_meetings(&f, FEED, vec![MeetingKind::Plenary], Some(1), &CancellationToken::new()).await;
        let ids: Vec<_> = t.records.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["vergadering-1", "vergadering-2"]);
        assert_eq!(t.stop, StopReason::PageBudget);
    }
}
