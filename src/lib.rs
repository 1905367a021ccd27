//! Walks the NYT bestseller overview backwards week by week and keeps a
//! deduplicated, append-only csv library of every book seen.

mod macros;

pub mod cancel;
pub mod config;
mod error;
pub mod parse;
pub mod process;
pub mod record;
pub mod request;
pub mod store;

pub use cancel::CancelToken;
pub use config::{Cli, HarvestConfig};
pub use error::{Error, Result};
pub use process::{HarvestReport, Harvester, StopReason};
pub use record::Record;
pub use request::{FetchOutcome, NytClient, Page, PageFetcher};
pub use store::{BufferedWriter, Hydrated, IdentifierCache};

const API_BASE_URL: &str = "https://api.nytimes.com/svc/books/v3/lists/overview.json";
const FILE_PATH: &str = "nyt_library_export.csv";
const COVER_URL_BASE: &str = "https://covers.openlibrary.org/b/isbn";
const DEFAULT_WEEKS: u32 = 52;
const PAGE_DELAY_SECS: u64 = 6;
const RATE_LIMIT_COOLDOWN_SECS: u64 = 30;
const RETRY_BACKOFF_SECS: u64 = 10;
/// Exit status of a run that stopped before finishing its pass.
pub const EXIT_STOPPED_EARLY: u8 = 2;
/// Exit status of a run that couldn't start or couldn't save what it found.
pub const EXIT_FAILURE: u8 = 1;
/// Consecutive non-page outcomes tolerated for one cursor before giving up.
const MAX_RETRIES: u32 = 8;
