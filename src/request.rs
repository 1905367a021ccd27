use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::Result;

const USER_AGENT: &str = concat!("bestsellers/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope the overview endpoint wraps every page in.
#[derive(Debug, Deserialize)]
struct Overview {
    results: Page,
}

/// One week of the overview: every list published that week plus the pointer to the week before.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub bestsellers_date: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    /// `None` once the oldest published week is reached.
    #[serde(default)]
    pub previous_published_date: Option<String>,
    #[serde(default)]
    pub lists: Vec<CategoryGroup>,
}

impl Page {
    /// Date stamped on records first observed on this page.
    pub fn current_date(&self) -> Option<&str> {
        fn present(d: &Option<String>) -> Option<&str> {
            d.as_deref().filter(|d| !d.is_empty())
        }
        present(&self.bestsellers_date).or_else(|| present(&self.published_date))
    }

    /// Pointer to the previous week, with blank strings treated as absent.
    pub fn previous_date(&self) -> Option<&str> {
        self.previous_published_date
            .as_deref()
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    pub list_name: Option<String>,
    #[serde(default)]
    pub books: Vec<RawEntry>,
}

/// A book exactly as the upstream reports it. Nothing beyond presence is validated:
/// a field of the wrong type reads as absent instead of failing the whole week.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub primary_isbn13: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub weeks_on_list: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub rank: Option<u32>,
}

fn lenient_string<'de, D>(de: D) -> core::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Accepts numbers and numeric strings; negative, fractional or oversized values read as absent.
fn lenient_u32<'de, D>(de: D) -> core::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Classified result of a single page request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Page(Page),
    /// Non-200 answer or a body that didn't decode.
    Empty(String),
    /// HTTP 429.
    RateLimited,
    /// HTTP 404: the requested week doesn't exist upstream.
    NotFound,
    /// The request never got an answer.
    TransientError(String),
}

/// Source of overview pages. Implementations only perform the request: no sleeping,
/// no retrying and no shared state.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the week published on `cursor`, or the most recent week when `cursor` is `None`.
    async fn fetch(&self, cursor: Option<&str>) -> FetchOutcome;
}

/// Overview client for the NYT Books API.
pub struct NytClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NytClient {
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl PageFetcher for NytClient {
    async fn fetch(&self, cursor: Option<&str>) -> FetchOutcome {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("api-key", self.api_key.as_str())]);
        if let Some(date) = cursor {
            request = request.query(&[("published_date", date)]);
        }

        let res = match request.send().await {
            Ok(res) => res,
            Err(err) => return FetchOutcome::TransientError(err.without_url().to_string()),
        };

        match res.status() {
            StatusCode::OK => match res.json::<Overview>().await {
                Ok(overview) => FetchOutcome::Page(overview.results),
                Err(err) => {
                    debug!(?cursor, "undecodable overview body: {err}");
                    FetchOutcome::Empty(format!("undecodable body: {}", err.without_url()))
                }
            },
            StatusCode::TOO_MANY_REQUESTS => FetchOutcome::RateLimited,
            StatusCode::NOT_FOUND => FetchOutcome::NotFound,
            status => FetchOutcome::Empty(format!("HTTP {status}")),
        }
    }
}
