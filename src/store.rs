//! The csv library on disk: hydrating the seen-ISBN cache and resume cursor from it at
//! startup, and appending newly found records to it.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::{fs, fs::OpenOptions, io::AsyncWriteExt};
use tracing::{error, info, warn};

use crate::record::{Record, HEADERS};
use crate::{Error, Result};

/// Every ISBN already present in the library or found during this run.
#[derive(Debug, Default, Clone)]
pub struct IdentifierCache {
    seen: HashSet<String>,
}

impl IdentifierCache {
    pub fn contains(&self, isbn: &str) -> bool {
        self.seen.contains(isbn)
    }

    /// Returns `true` when `isbn` wasn't cached yet.
    pub fn insert(&mut self, isbn: &str) -> bool {
        if self.seen.contains(isbn) {
            return false;
        }
        self.seen.insert(isbn.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IdentifierCache {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            seen: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// State recovered from the library before a run.
#[derive(Debug, Default)]
pub struct Hydrated {
    pub cache: IdentifierCache,
    /// Oldest `first_seen_date` on record. The walk moves backwards, so this is the frontier.
    pub resume_from: Option<String>,
    /// Rows read, dated or not.
    pub rows: usize,
    /// Rows that were unreadable or held invalid UTF-8.
    pub damaged: usize,
}

/// Scans the library once. A missing file is a fresh start.
///
/// Fails with [`Error::StoreSchema`] when the file has a header without an `isbn13` column,
/// and with `Io`/`Csv` errors when the file or its header can't be read. Damaged rows are
/// skipped field by field.
pub async fn hydrate(path: &Path) -> Result<Hydrated> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("No existing library at {}. Starting fresh.", path.display());
            return Ok(Hydrated::default());
        }
        Err(err) => return Err(err.into()),
    };
    if bytes.is_empty() {
        info!("Library {} exists but is empty.", path.display());
        return Ok(Hydrated::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes.as_slice());
    let headers = reader.byte_headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name.as_bytes());
    let Some(isbn_col) = column("isbn13") else {
        return Err(Error::StoreSchema {
            path: path.display().to_string(),
        });
    };
    let date_col = column("first_seen_date");

    // Rows are read as bytes so one damaged field can't hide the ISBNs around it.
    let field = |row: &csv::ByteRecord, col: usize| {
        row.get(col)
            .and_then(|f| std::str::from_utf8(f).ok())
            .filter(|f| !f.is_empty())
            .map(str::to_owned)
    };
    let mut hydrated = Hydrated::default();
    for row in reader.byte_records() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("Skipping unreadable row in {}: {err}", path.display());
                hydrated.damaged += 1;
                continue;
            }
        };
        hydrated.rows += 1;
        if std::str::from_utf8(row.as_slice()).is_err() {
            hydrated.damaged += 1;
        }

        if let Some(isbn) = field(&row, isbn_col) {
            hydrated.cache.insert(&isbn);
        }
        // ISO dates are fixed width, so string order is chronological order.
        if let Some(date) = date_col.and_then(|c| field(&row, c)) {
            if hydrated.resume_from.as_deref().map_or(true, |oldest| date.as_str() < oldest) {
                hydrated.resume_from = Some(date);
            }
        }
    }

    if hydrated.damaged > 0 {
        warn!(
            "{} damaged rows in {}, kept every readable ISBN.",
            hydrated.damaged,
            path.display()
        );
    }
    match &hydrated.resume_from {
        Some(date) => info!(
            "Resuming library. Loaded {} books. Resuming from {date}.",
            hydrated.rows
        ),
        None => info!("Library {} holds no dated rows.", path.display()),
    }
    Ok(hydrated)
}

/// [`hydrate`], degrading read failures to a fresh start. Only a schema mismatch is fatal.
pub async fn hydrate_or_fresh(path: &Path) -> Result<Hydrated> {
    match hydrate(path).await {
        Ok(hydrated) => Ok(hydrated),
        Err(err @ Error::StoreSchema { .. }) => Err(err),
        Err(err) => {
            error!("Failed to read existing library {}: {err}", path.display());
            warn!("Continuing with an empty cache.");
            Ok(Hydrated::default())
        }
    }
}

/// Collects new records in memory and appends them to the library in one write.
#[derive(Debug)]
pub struct BufferedWriter {
    path: PathBuf,
    pending: Vec<Record>,
}

impl BufferedWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffers `records` behind anything already pending. No I/O.
    pub fn append(&mut self, records: Vec<Record>) {
        self.pending.extend(records);
    }

    pub fn pending(&self) -> &[Record] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends every pending record in arrival order, writing the header first when the
    /// library is new. Returns how many records were written.
    ///
    /// On failure the buffer is kept so a later call can try again.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let needs_header = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => return Err(err.into()),
        };
        let payload = self.encode(needs_header)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&payload).await?;
        file.flush().await?;

        let written = self.pending.len();
        self.pending.clear();
        info!("Appended {written} new books to {}", self.path.display());
        Ok(written)
    }

    fn encode(&self, with_header: bool) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if with_header {
            writer.write_record(HEADERS)?;
        }
        for record in &self.pending {
            writer.serialize(record)?;
        }
        writer.into_inner().map_err(|err| Error::Io(err.into_error()))
    }
}
