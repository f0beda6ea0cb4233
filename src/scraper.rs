use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{JobError, NetworkError, PersistenceError};
use crate::feed::ReportMapping;
use crate::http::Fetch;
use crate::model::MeetingRecord;
use crate::parser::decode::decode;
use crate::pool::offload;
use crate::store::{Store, WriteOutcome};
use crate::transcript::{self, Extracted};

/// How many captured failures a summary keeps for diagnostics.
pub const FAILURE_SAMPLE: usize = 20;

#[derive(Debug, Clone)]
pub struct JobFailure {
    pub meeting_id: String,
    pub kind: &'static str,
    pub message: String,
}

/// Per-run accounting. Every distinct meeting id lands in exactly one counter.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// No document URL is known for the meeting.
    pub unmatched: usize,
    /// Never started because the run was interrupted.
    pub cancelled: usize,
    pub failures: Vec<JobFailure>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.unmatched + self.cancelled
    }

    fn record(&mut self, meeting_id: String, result: Result<WriteOutcome, JobError>) {
        match result {
            Ok(WriteOutcome::Written) => self.succeeded += 1,
            Ok(WriteOutcome::Skipped) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                warn!(meeting_id = %meeting_id, kind = e.kind(), error = %e, "job failed");
                if self.failures.len() < FAILURE_SAMPLE {
                    self.failures.push(JobFailure {
                        meeting_id,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct BackfillSummary {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct Drained {
    results: Vec<(String, Result<WriteOutcome, JobError>)>,
    cancelled: usize,
}

/// Run one job per id with at most `concurrency` in flight. Each job holds its
/// permit for its whole lifetime. On cancellation no new job starts; jobs
/// already running are awaited.
async fn drive<T, F, Fut>(
    jobs: Vec<(String, T)>,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: &ProgressBar,
    job: F,
) -> Drained
where
    F: Fn(String, T) -> Fut,
    Fut: Future<Output = Result<WriteOutcome, JobError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    // A panicked task only hands back its task id.
    let mut owners: HashMap<Id, String> = HashMap::new();
    let mut cancelled = 0;
    let total = jobs.len();

    for (launched, (id, input)) in jobs.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            cancelled = total - launched;
            info!(cancelled, "interrupted, not starting remaining jobs");
            break;
        };

        let fut = job(id.clone(), input);
        let pb = progress.clone();
        let handle = tasks.spawn(async move {
            let result = fut.await;
            drop(permit);
            pb.inc(1);
            result
        });
        owners.insert(handle.id(), id);
    }

    let mut results = Vec::with_capacity(total - cancelled);
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((task, result)) => {
                let id = owners.remove(&task).unwrap_or_default();
                results.push((id, result));
            }
            Err(e) => {
                let id = owners.remove(&e.id()).unwrap_or_default();
                results.push((id, Err(JobError::Panicked(e.to_string()))));
            }
        }
    }
    Drained { results, cancelled }
}

/// Join meetings with their document URLs and materialize every one that is
/// not already stored.
pub async fn run_jobs(
    fetcher: Arc<dyn Fetch>,
    store: Arc<Store>,
    meetings: &[MeetingRecord],
    mapping: &ReportMapping,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    for meeting in meetings {
        if !seen.insert(meeting.id.as_str()) {
            continue;
        }
        let Some(url) = mapping.get(&meeting.id) else {
            debug!(meeting_id = %meeting.id, "no report for meeting");
            summary.unmatched += 1;
            continue;
        };
        if store.is_satisfied(&meeting.id) {
            summary.skipped += 1;
            continue;
        }
        pending.push((meeting.id.clone(), url.to_string()));
    }

    info!(
        jobs = pending.len(),
        skipped = summary.skipped,
        unmatched = summary.unmatched,
        concurrency,
        "starting transcript jobs"
    );
    progress.set_length(pending.len() as u64);

    let drained = drive(pending, concurrency, cancel, progress, |id, url| {
        let fetcher = Arc::clone(&fetcher);
        let store = Arc::clone(&store);
        async move { materialize(fetcher.as_ref(), store, id, url).await }
    })
    .await;

    summary.cancelled = drained.cancelled;
    for (id, result) in drained.results {
        summary.record(id, result);
    }
    summary
}

/// Fetch → decode/parse/extract/normalize on the worker pool → persist.
async fn materialize(
    fetcher: &dyn Fetch,
    store: Arc<Store>,
    meeting_id: String,
    url: String,
) -> Result<WriteOutcome, JobError> {
    let bytes = fetcher.get(&url).await?;
    let size = bytes.len();

    let (id, u) = (meeting_id.clone(), url.clone());
    let extracted = offload(move || transcript::process(&id, &u, &bytes))
        .await
        .ok_or_else(|| JobError::Panicked(format!("extraction of {}", meeting_id)))??;
    debug!(
        meeting_id = %meeting_id,
        bytes = size,
        segments = extracted.document.segments.len(),
        "transcript extracted"
    );

    let outcome = tokio::task::spawn_blocking(move || persist(&store, &extracted))
        .await
        .map_err(|e| PersistenceError::Worker(e.to_string()))??;
    Ok(outcome)
}

fn persist(store: &Store, extracted: &Extracted) -> Result<WriteOutcome, PersistenceError> {
    let doc = &extracted.document;
    let outcome = store.write_document(doc)?;
    if store.keeps_raw() {
        store.write_raw_sidecars(&doc.meeting_id, &extracted.raw_text, &doc.metadata())?;
    }
    Ok(outcome)
}

/// Re-fetch the source of every stored document whose raw sidecar is missing
/// (or all of them when overwriting) and write the sidecars.
pub async fn backfill_raw(
    fetcher: Arc<dyn Fetch>,
    store: Arc<Store>,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> Result<BackfillSummary, PersistenceError> {
    let mut summary = BackfillSummary::default();
    let listing = Arc::clone(&store);
    let ids = tokio::task::spawn_blocking(move || listing.list_ids())
        .await
        .map_err(|e| PersistenceError::Worker(e.to_string()))??;

    let pending: Vec<(String, ())> = ids
        .into_iter()
        .filter(|id| {
            let missing = store.overwrites() || !store.raw_exists(id);
            if !missing {
                summary.skipped += 1;
            }
            missing
        })
        .map(|id| (id, ()))
        .collect();

    info!(jobs = pending.len(), skipped = summary.skipped, "backfilling raw documents");
    progress.set_length(pending.len() as u64);

    let drained = drive(pending, concurrency, cancel, progress, |id, ()| {
        let fetcher = Arc::clone(&fetcher);
        let store = Arc::clone(&store);
        async move { refetch_raw(fetcher.as_ref(), store, id).await }
    })
    .await;

    summary.cancelled = drained.cancelled;
    for (id, result) in drained.results {
        match result {
            Ok(WriteOutcome::Written) => summary.saved += 1,
            Ok(WriteOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!(meeting_id = %id, kind = e.kind(), error = %e, "backfill failed");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

async fn refetch_raw(fetcher: &dyn Fetch, store: Arc<Store>, meeting_id: String) -> Result<WriteOutcome, JobError> {
    let reader = Arc::clone(&store);
    let key = meeting_id.clone();
    let doc = tokio::task::spawn_blocking(move || reader.read_document(&key))
        .await
        .map_err(|e| PersistenceError::Worker(e.to_string()))??;
    if doc.url.is_empty() {
        return Err(NetworkError::Request {
            url: String::new(),
            message: format!("document {} has no source URL", meeting_id),
        }
        .into());
    }

    let bytes = fetcher.get(&doc.url).await?;
    let raw_text = offload(move || decode(&bytes))
        .await
        .ok_or_else(|| JobError::Panicked(format!("decoding {}", meeting_id)))?;

    let outcome = tokio::task::spawn_blocking(move || {
        store.write_raw_sidecars(&meeting_id, &raw_text, &doc.metadata())
    })
    .await
    .map_err(|e| PersistenceError::Worker(e.to_string()))??;

    Ok(if outcome.wrote_any() {
        WriteOutcome::Written
    } else {
        WriteOutcome::Skipped
    })
}
