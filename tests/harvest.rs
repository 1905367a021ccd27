use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bestsellers::store::hydrate;
use bestsellers::{
    BufferedWriter, CancelToken, FetchOutcome, HarvestConfig, Harvester, Page, PageFetcher,
    Record, StopReason,
};
use serde_json::json;
use tempfile::TempDir;

/// Serves a fixed chain of weeks keyed by the cursor asked for. `None` is the latest week.
struct Chain {
    weeks: Vec<(Option<&'static str>, Page)>,
    script: Mutex<VecDeque<FetchOutcome>>,
    asked: Mutex<Vec<Option<String>>>,
}

impl Chain {
    fn new(weeks: Vec<(Option<&'static str>, Page)>) -> Self {
        Self {
            weeks,
            script: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<Option<String>> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for Chain {
    async fn fetch(&self, cursor: Option<&str>) -> FetchOutcome {
        self.asked.lock().unwrap().push(cursor.map(str::to_string));
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        self.weeks
            .iter()
            .find(|(key, _)| *key == cursor)
            .map(|(_, page)| FetchOutcome::Page(page.clone()))
            .unwrap_or(FetchOutcome::NotFound)
    }
}

fn page(date: &str, previous: Option<&str>, isbns: &[&str]) -> Page {
    let books: Vec<_> = isbns
        .iter()
        .enumerate()
        .map(|(i, isbn)| {
            json!({
                "primary_isbn13": isbn,
                "title": format!("BOOK, PART {i}"),
                "author": "Someone",
                "description": "Says \"hello\", then leaves.",
                "rank": i + 1,
                "weeks_on_list": 1
            })
        })
        .collect();
    serde_json::from_value(json!({
        "bestsellers_date": date,
        "published_date": date,
        "previous_published_date": previous,
        "lists": [{"list_name": "Hardcover Nonfiction", "books": books}]
    }))
    .unwrap()
}

fn config(path: &Path, max_pages: u32) -> HarvestConfig {
    HarvestConfig {
        output: path.to_path_buf(),
        max_pages,
        page_delay: Duration::ZERO,
        rate_limit_cooldown: Duration::ZERO,
        retry_backoff: Duration::ZERO,
        max_retries: 3,
    }
}

fn library(path: &Path) -> Vec<Record> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap()
}

async fn harvest(chain: Chain, path: &Path, max_pages: u32) -> (Harvester<Chain>, StopReason) {
    let hydrated = hydrate(path).await.unwrap();
    let mut harvester = Harvester::new(
        chain,
        hydrated.cache,
        BufferedWriter::new(path),
        config(path, max_pages),
        CancelToken::new(),
    );
    let report = harvester.run(hydrated.resume_from).await;
    assert!(harvester.writer().is_empty(), "buffer left after {report:?}");
    (harvester, report.reason)
}

fn three_weeks() -> Chain {
    Chain::new(vec![
        (None, page("2024-01-14", Some("2024-01-07"), &["9780000000001", "9780000000002"])),
        (
            Some("2024-01-07"),
            page("2024-01-07", Some("2023-12-31"), &["9780000000003", "9780000000001"]),
        ),
        (Some("2023-12-31"), page("2023-12-31", None, &["9780000000002"])),
    ])
}

#[tokio::test]
async fn walks_the_whole_chain_into_an_empty_library() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lib.csv");

    let hydrated = hydrate(&path).await.unwrap();
    let mut harvester = Harvester::new(
        three_weeks(),
        hydrated.cache,
        BufferedWriter::new(&path),
        config(&path, 3),
        CancelToken::new(),
    );
    let report = harvester.run(hydrated.resume_from).await;

    assert_eq!(report.reason, StopReason::NoMorePages);
    assert_eq!(report.pages, 3);
    assert_eq!(report.new_records, 3);
    assert_eq!(report.persisted, 3);

    let rows = library(&path);
    let isbns: Vec<_> = rows.iter().map(|r| r.isbn13.as_str()).collect();
    assert_eq!(isbns, ["9780000000001", "9780000000002", "9780000000003"]);
    assert_eq!(rows[0].title, "Book, Part 0");
    assert_eq!(rows[0].description, "Says \"hello\", then leaves.");
    assert_eq!(rows[2].first_seen_date, "2024-01-07");
}

#[tokio::test]
async fn not_found_first_leaves_no_library() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lib.csv");

    let (harvester, reason) = harvest(Chain::new(vec![]), &path, 3).await;

    assert_eq!(reason, StopReason::UpstreamExhausted);
    assert_eq!(harvester.fetcher().asked(), vec![None]);
    assert!(!path.exists());
}

#[tokio::test]
async fn second_run_resumes_from_the_oldest_week_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lib.csv");

    let (_, reason) = harvest(three_weeks(), &path, 2).await;
    assert_eq!(reason, StopReason::DepthExhausted);
    assert_eq!(library(&path).len(), 3);

    let (harvester, reason) = harvest(three_weeks(), &path, 5).await;
    assert_eq!(reason, StopReason::NoMorePages);
    // The resume week is fetched again to learn its previous pointer.
    assert_eq!(
        harvester.fetcher().asked(),
        vec![Some("2024-01-07".to_string()), Some("2023-12-31".to_string())]
    );

    let rows = library(&path);
    assert_eq!(rows.len(), 3);
    let unique: HashSet<_> = rows.iter().map(|r| r.isbn13.clone()).collect();
    assert_eq!(unique.len(), rows.len());
}

#[tokio::test]
async fn cursors_only_move_back_in_time() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lib.csv");
    let chain = three_weeks();
    chain
        .script
        .lock()
        .unwrap()
        .extend([FetchOutcome::RateLimited, FetchOutcome::Empty("HTTP 500".into())]);

    let (harvester, reason) = harvest(chain, &path, 10).await;
    assert_eq!(reason, StopReason::NoMorePages);

    let dated: Vec<String> = harvester.fetcher().asked().into_iter().flatten().collect();
    assert!(dated.windows(2).all(|w| w[1] <= w[0]), "{dated:?}");
}
