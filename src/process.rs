use std::fmt;

use chrono::{Local, NaiveDate};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::parse::extract_records;
use crate::request::{FetchOutcome, PageFetcher};
use crate::store::{BufferedWriter, IdentifierCache};
use crate::{info_time, CancelToken, HarvestConfig, EXIT_FAILURE, EXIT_STOPPED_EARLY};

/// Why a harvest run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The page budget for this run is used up.
    DepthExhausted,
    /// The last page had no previous week.
    NoMorePages,
    /// Interrupted by the user.
    Cancelled,
    /// The upstream answered 404 for the cursor.
    UpstreamExhausted,
    /// One cursor failed more often than the retry budget allows.
    FetchExhausted,
}

impl StopReason {
    /// Whether the run walked as far as it could or was asked to, rather than stopping early.
    pub fn completed_pass(self) -> bool {
        matches!(
            self,
            StopReason::DepthExhausted | StopReason::NoMorePages | StopReason::UpstreamExhausted
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::DepthExhausted => "depth exhausted",
            StopReason::NoMorePages => "no more pages",
            StopReason::Cancelled => "cancelled",
            StopReason::UpstreamExhausted => "upstream exhausted",
            StopReason::FetchExhausted => "fetch retries exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub reason: StopReason,
    /// Pages processed, i.e. depth budget consumed.
    pub pages: u32,
    /// Records extracted during the run.
    pub new_records: usize,
    /// Records written by the final flush.
    pub persisted: usize,
    /// Records still buffered because the final flush failed.
    pub unflushed: usize,
}

impl HarvestReport {
    /// Process exit status: 0 for a finished pass with everything saved, [`EXIT_STOPPED_EARLY`]
    /// when cancelled or out of retries, [`EXIT_FAILURE`] when the final flush failed.
    pub fn exit_status(&self) -> u8 {
        if self.unflushed > 0 {
            EXIT_FAILURE
        } else if self.reason.completed_pass() {
            0
        } else {
            EXIT_STOPPED_EARLY
        }
    }
}

/// Walks the overview backwards one week at a time, buffering every unseen book and
/// flushing the buffer once when the walk stops.
pub struct Harvester<F> {
    fetcher: F,
    seen: IdentifierCache,
    writer: BufferedWriter,
    config: HarvestConfig,
    cancel: CancelToken,
}

impl<F: PageFetcher> Harvester<F> {
    pub fn new(
        fetcher: F,
        seen: IdentifierCache,
        writer: BufferedWriter,
        config: HarvestConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            fetcher,
            seen,
            writer,
            config,
            cancel,
        }
    }

    pub fn seen(&self) -> &IdentifierCache {
        &self.seen
    }

    pub fn writer(&self) -> &BufferedWriter {
        &self.writer
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the walk starting at `start` (`None` = most recent week) and flushes on every
    /// exit path. The start week is fetched again even when it was processed by an earlier
    /// run: its previous-week pointer is needed, and its books are already in the cache.
    pub async fn run(&mut self, start: Option<String>) -> HarvestReport {
        let start_time = Local::now();
        info_time!(
            "Starting fetch from {}. Target depth: {} additional weeks.",
            start.as_deref().unwrap_or("the latest week"),
            self.config.max_pages
        );

        let mut report = HarvestReport {
            reason: StopReason::NoMorePages,
            pages: 0,
            new_records: 0,
            persisted: 0,
            unflushed: 0,
        };
        let reason = self.walk(start, &mut report).await;
        report.reason = reason;

        match self.writer.flush().await {
            Ok(0) => info!("No new data to save."),
            Ok(written) => report.persisted = written,
            Err(err) => {
                report.unflushed = self.writer.len();
                error!(
                    "Couldn't save {} books to {}: {err}",
                    report.unflushed,
                    self.writer.path().display()
                );
            }
        }

        info_time!(
            start_time,
            "Stopped ({}) after {} weeks, {} new books.",
            report.reason,
            report.pages,
            report.new_records
        );
        report
    }

    async fn walk(
        &mut self,
        mut cursor: Option<String>,
        report: &mut HarvestReport,
    ) -> StopReason {
        let mut remaining = self.config.max_pages;
        let mut failures = 0u32;

        loop {
            if !self.cancel.is_running() {
                return StopReason::Cancelled;
            }
            if remaining == 0 {
                return StopReason::DepthExhausted;
            }

            let page = match self.fetcher.fetch(cursor.as_deref()).await {
                FetchOutcome::Page(page) => page,
                FetchOutcome::NotFound => {
                    error!(cursor = ?cursor, "Date not found upstream. Stopping.");
                    self.cancel.cancel();
                    return StopReason::UpstreamExhausted;
                }
                FetchOutcome::RateLimited => {
                    failures += 1;
                    if failures > self.config.max_retries {
                        error!(
                            cursor = ?cursor,
                            "Still rate limited after {} retries.",
                            self.config.max_retries
                        );
                        return StopReason::FetchExhausted;
                    }
                    warn!(
                        cursor = ?cursor,
                        "Rate limit. Sleeping {:?}...",
                        self.config.rate_limit_cooldown
                    );
                    sleep(self.config.rate_limit_cooldown).await;
                    continue;
                }
                FetchOutcome::Empty(why) | FetchOutcome::TransientError(why) => {
                    failures += 1;
                    if failures > self.config.max_retries {
                        error!(
                            cursor = ?cursor,
                            "Giving up after {} retries: {why}",
                            self.config.max_retries
                        );
                        return StopReason::FetchExhausted;
                    }
                    warn!(
                        cursor = ?cursor,
                        "No page ({why}). Retrying in {:?}.",
                        self.config.retry_backoff
                    );
                    sleep(self.config.retry_backoff).await;
                    continue;
                }
            };
            failures = 0;

            let records = extract_records(&page, &mut self.seen);
            info!(
                "Week {}: +{} unique books.",
                page.current_date().unwrap_or("?"),
                records.len()
            );
            report.new_records += records.len();
            self.writer.append(records);
            remaining -= 1;
            report.pages += 1;

            let Some(previous) = page.previous_date() else {
                info!("Reached the beginning of the list history.");
                return StopReason::NoMorePages;
            };
            if let Some(current) = cursor.as_deref() {
                if !is_older(previous, current) {
                    warn!(
                        cursor = current,
                        previous,
                        "Previous week isn't older than the current one. Stopping."
                    );
                    return StopReason::NoMorePages;
                }
            }
            cursor = Some(previous.to_string());

            if self.cancel.is_running() && remaining > 0 {
                sleep(self.config.page_delay).await;
            }
        }
    }
}

/// `true` when `date` lies strictly before `than`.
fn is_older(date: &str, than: &str) -> bool {
    let parse = |d: &str| NaiveDate::parse_from_str(d, "%Y-%m-%d");
    match (parse(date), parse(than)) {
        (Ok(a), Ok(b)) => a < b,
        _ => date < than,
    }
}
