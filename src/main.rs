use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tk_scraper::config::Settings;
use tk_scraper::feed::{self, odata, ReportMapping, StopReason};
use tk_scraper::http::{Fetch, HttpClient};
use tk_scraper::model::MeetingRecord;
use tk_scraper::scraper;
use tk_scraper::store::Store;

#[derive(Parser)]
#[command(name = "tk_scraper", about = "Tweede Kamer transcript scraper (SyncFeed / OData)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the feeds, fetch every new transcript and store it
    Run,
    /// Look up the transcript URL of a meeting, or dump the whole mapping as JSON
    Links {
        /// Meeting id to look up
        meeting_id: Option<String>,
        /// Dump every meeting id -> URL pair
        #[arg(long, conflicts_with = "meeting_id")]
        all: bool,
        /// Write the JSON dump here instead of stdout
        #[arg(long, requires = "all")]
        file: Option<PathBuf>,
    },
    /// Re-fetch raw XML for stored transcripts that have none
    BackfillRaw,
    /// Count stored transcripts and sidecars
    Stats,
}

/// Flags that override `tk_scraper.toml` and `TK_*` settings.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Output directory
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Page budget per feed (0 = unlimited)
    #[arg(long, global = true)]
    max_pages: Option<usize>,
    /// Delay before every request, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,
    /// Include committee meetings
    #[arg(long, global = true)]
    include_committees: bool,
    /// Max transcripts in flight
    #[arg(short = 'j', long, global = true)]
    concurrency: Option<usize>,
    /// Do not keep raw XML sidecars
    #[arg(long, global = true)]
    no_raw: bool,
    /// Replace existing output
    #[arg(long, global = true)]
    overwrite: bool,
    /// Only meetings on or after this date (YYYY-MM-DD), via the OData API
    #[arg(long, global = true)]
    since: Option<NaiveDate>,
}

impl Overrides {
    fn apply(self, s: &mut Settings) {
        if let Some(output) = self.output {
            s.output_dir = output;
        }
        if let Some(max_pages) = self.max_pages {
            s.max_pages = max_pages;
        }
        if let Some(delay_ms) = self.delay_ms {
            s.delay_ms = delay_ms;
        }
        if let Some(concurrency) = self.concurrency {
            s.concurrency = concurrency;
        }
        if self.since.is_some() {
            s.since = self.since;
        }
        s.verbose |= self.verbose;
        s.include_committees |= self.include_committees;
        s.overwrite |= self.overwrite;
        if self.no_raw {
            s.keep_raw = false;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load().context("loading settings")?;
    cli.overrides.apply(&mut settings);
    settings.validate()?;
    init_tracing(settings.verbose);
    info!(settings = ?settings, "starting");

    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, letting in-flight jobs finish");
            trip.cancel();
        }
    });

    let store = Arc::new(
        Store::new(&settings.output_dir)
            .overwrite(settings.overwrite)
            .keep_raw(settings.keep_raw),
    );

    match cli.command {
        Commands::Run => {
            let client = http_client(&settings)?;
            run(&settings, client, store, &cancel).await?;
        }
        Commands::Links { meeting_id, all, file } => {
            let client = http_client(&settings)?;
            links(&settings, client.as_ref(), meeting_id, all, file, &cancel).await?;
        }
        Commands::BackfillRaw => {
            let client = http_client(&settings)?;
            let pb = progress_bar()?;
            let s = scraper::backfill_raw(client, store, settings.concurrency, &cancel, &pb).await?;
            pb.finish_and_clear();
            println!(
                "Backfill: {} saved, {} skipped, {} failed, {} cancelled.",
                s.saved, s.skipped, s.failed, s.cancelled
            );
        }
        Commands::Stats => {
            let s = store.stats()?;
            println!("Output:       {}", store.root().display());
            println!("Transcripts:  {}", s.documents);
            println!("Raw XML:      {}", s.raw_documents);
            println!("Metadata:     {}", s.metadata_files);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn http_client(settings: &Settings) -> Result<Arc<dyn Fetch>> {
    let client = HttpClient::new(&settings.user_agent, settings.timeout(), settings.delay())?;
    Ok(Arc::new(client))
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn report_stop(label: &str, records: usize, stop: &StopReason) {
    match stop {
        StopReason::Failed(reason) => {
            warn!(feed = label, records, reason = %reason, "feed stopped early, continuing with partial list")
        }
        stop => info!(feed = label, records, ?stop, "feed done"),
    }
}

/// Meetings plus their report mapping, from the feeds or the filtered query.
async fn collect(
    settings: &Settings,
    client: &dyn Fetch,
    cancel: &CancellationToken,
) -> (Vec<MeetingRecord>, ReportMapping) {
    match settings.since {
        Some(since) => {
            let t = odata::meetings_since(
                client,
                &settings.odata_url,
                since,
                settings.kinds(),
                settings.page_budget(),
                cancel,
            )
            .await;
            report_stop("meetings-query", t.records.len(), &t.stop);
            let ids: Vec<String> = t.records.iter().map(|m| m.id.clone()).collect();
            let (mapping, failed_batches) = odata::lookup_reports(client, &settings.odata_url, &ids, cancel).await;
            if failed_batches > 0 {
                warn!(failed_batches, "some report lookups failed");
            }
            (t.records, mapping)
        }
        None => {
            let (meetings, (mapping, reports_stop)) = tokio::join!(
                feed::fetch_meetings(client, &settings.feed_url, settings.kinds(), settings.page_budget(), cancel),
                feed::fetch_report_mapping(client, &settings.feed_url, settings.page_budget(), cancel),
            );
            report_stop("meetings", meetings.records.len(), &meetings.stop);
            report_stop("reports", mapping.len(), &reports_stop);
            (meetings.records, mapping)
        }
    }
}

async fn run(
    settings: &Settings,
    client: Arc<dyn Fetch>,
    store: Arc<Store>,
    cancel: &CancellationToken,
) -> Result<()> {
    let t_feeds = Instant::now();
    let (meetings, mapping) = collect(settings, client.as_ref(), cancel).await;
    println!(
        "Found {} meetings and {} reports in {:.1}s",
        meetings.len(),
        mapping.len(),
        t_feeds.elapsed().as_secs_f64()
    );
    if meetings.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    let pb = progress_bar()?;
    let summary = scraper::run_jobs(
        client,
        store,
        &meetings,
        &mapping,
        settings.concurrency,
        cancel,
        &pb,
    )
    .await;
    pb.finish_and_clear();

    println!(
        "Done: {} written, {} skipped (already stored), {} failed, {} without report, {} cancelled.",
        summary.succeeded, summary.skipped, summary.failed, summary.unmatched, summary.cancelled
    );
    if !summary.failures.is_empty() {
        println!("\n--- Failures (first {}) ---", summary.failures.len());
        for f in &summary.failures {
            println!("  {} [{}] {}", f.meeting_id, f.kind, f.message);
        }
    }
    Ok(())
}

async fn links(
    settings: &Settings,
    client: &dyn Fetch,
    meeting_id: Option<String>,
    all: bool,
    file: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    if all {
        let (mapping, stop) = feed::fetch_report_mapping(client, &settings.feed_url, settings.page_budget(), cancel).await;
        report_stop("reports", mapping.len(), &stop);
        let json = serde_json::to_string_pretty(&mapping.to_map())?;
        match file {
            Some(path) => {
                std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {} links to {}", mapping.len(), path.display());
            }
            None => println!("{}", json),
        }
        return Ok(());
    }

    let Some(id) = meeting_id else {
        bail!("give a meeting id or --all");
    };
    let (mapping, _) = odata::lookup_reports(client, &settings.odata_url, std::slice::from_ref(&id), cancel).await;
    match mapping.get(&id) {
        Some(url) => println!("{}", url),
        None => bail!("no transcript found for meeting {}", id),
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
