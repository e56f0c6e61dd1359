//! Paginated fetch of fundraising-platform collections, with a deterministic
//! synthetic dataset standing in whenever the live API is unavailable.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use donorwall_core::{Campaign, Collection, Contact, DataOrigin, RecurringPlan, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

pub mod http;
pub mod synthetic;

pub use http::{HttpTransport, UpstreamConfig};

pub const CRATE_NAME: &str = "donorwall-upstream";

/// Upper bound on pages read for one collection in one fetch.
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstream credential configured")]
    NotConfigured,
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed page {page} of {collection}: {message}")]
    Decode {
        collection: Collection,
        page: u32,
        message: String,
    },
    #[error("pagination of {collection} stalled at page {page}: no new records")]
    Stalled { collection: Collection, page: u32 },
    #[error("pagination of {collection} exceeded {limit} pages")]
    PageLimit { collection: Collection, limit: u32 },
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of the upstream `{data, meta, links}` envelope. Records stay
/// untyped until [`UpstreamClient`] decodes them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub data: Vec<JsonValue>,
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub links: Option<PageLinks>,
}

impl PageResponse {
    /// `page` is the 1-based page just read, `received` the running record
    /// count including it.
    pub fn has_more(&self, page: u32, received: usize) -> bool {
        if self.data.is_empty() {
            return false;
        }
        if let Some(last_page) = self.meta.last_page {
            return page < last_page;
        }
        if let Some(links) = &self.links {
            return links.next.as_deref().is_some_and(|next| !next.is_empty());
        }
        if let Some(total) = self.meta.total {
            return (received as u64) < total;
        }
        false
    }
}

#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch_page(
        &self,
        collection: Collection,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, UpstreamError>;
}

/// Typed record of one collection.
pub trait UpstreamRecord: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn record_id(&self) -> &str;

    /// Deterministic stand-in dataset for this collection.
    fn synthetic() -> Vec<Self>;
}

impl UpstreamRecord for Contact {
    const COLLECTION: Collection = Collection::Contacts;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn synthetic() -> Vec<Self> {
        synthetic::contacts()
    }
}

impl UpstreamRecord for Transaction {
    const COLLECTION: Collection = Collection::Transactions;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn synthetic() -> Vec<Self> {
        synthetic::transactions()
    }
}

impl UpstreamRecord for RecurringPlan {
    const COLLECTION: Collection = Collection::Plans;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn synthetic() -> Vec<Self> {
        synthetic::plans()
    }
}

impl UpstreamRecord for Campaign {
    const COLLECTION: Collection = Collection::Campaigns;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn synthetic() -> Vec<Self> {
        synthetic::campaigns()
    }
}

#[derive(Debug)]
pub enum FallbackReason {
    /// No credential configured; synthetic data is the expected path.
    MissingCredential,
    /// The live fetch failed and was replaced with synthetic data.
    Degraded(UpstreamError),
}

/// Result of [`UpstreamClient::fetch`]. Both variants carry a complete
/// collection, so the pipeline proceeds identically either way.
#[derive(Debug)]
pub enum FetchOutcome<R> {
    Live {
        records: Vec<R>,
        pages: u32,
        rejected: usize,
    },
    Fallback {
        records: Vec<R>,
        reason: FallbackReason,
    },
}

impl<R> FetchOutcome<R> {
    pub fn records(&self) -> &[R] {
        match self {
            FetchOutcome::Live { records, .. } | FetchOutcome::Fallback { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<R> {
        match self {
            FetchOutcome::Live { records, .. } | FetchOutcome::Fallback { records, .. } => records,
        }
    }

    pub fn origin(&self) -> DataOrigin {
        match self {
            FetchOutcome::Live { .. } => DataOrigin::Live,
            FetchOutcome::Fallback { .. } => DataOrigin::Synthetic,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            FetchOutcome::Fallback {
                reason: FallbackReason::Degraded(_),
                ..
            }
        )
    }

    /// Error-list entry for a degraded fetch. A missing credential is not an
    /// error and yields `None`.
    pub fn error_note(&self, collection: Collection) -> Option<String> {
        match self {
            FetchOutcome::Fallback {
                reason: FallbackReason::Degraded(err),
                ..
            } => Some(format!("API Error ({collection}): {err}")),
            _ => None,
        }
    }
}

/// Records from a fully paginated live fetch.
#[derive(Debug)]
pub struct LivePages<R> {
    pub records: Vec<R>,
    pub pages: u32,
    pub rejected: usize,
}

#[derive(Clone)]
pub struct UpstreamClient {
    transport: Option<Arc<dyn PageTransport>>,
    per_page: u32,
    max_pages: u32,
}

impl UpstreamClient {
    pub fn new(transport: Option<Arc<dyn PageTransport>>, per_page: u32) -> Self {
        Self {
            transport,
            per_page: per_page.max(1),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Client that always serves the synthetic dataset.
    pub fn synthetic_only() -> Self {
        Self::new(None, UpstreamConfig::default().per_page)
    }

    /// HTTP-backed when a credential is configured, synthetic otherwise.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let transport = match &config.api_key {
            Some(key) if !key.trim().is_empty() => {
                let http = HttpTransport::new(config, key.trim().to_string())?;
                Some(Arc::new(http) as Arc<dyn PageTransport>)
            }
            _ => None,
        };
        Ok(Self::new(transport, config.per_page))
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Full collection, never a raw transport failure: errors are logged and
    /// replaced by the synthetic dataset, and the outcome says which happened.
    pub async fn fetch<R: UpstreamRecord>(&self) -> FetchOutcome<R> {
        let collection = R::COLLECTION;
        let Some(transport) = &self.transport else {
            warn!(%collection, "upstream credential not set, using synthetic data");
            return FetchOutcome::Fallback {
                records: R::synthetic(),
                reason: FallbackReason::MissingCredential,
            };
        };

        match self.fetch_pages::<R>(transport.as_ref()).await {
            Ok(live) => FetchOutcome::Live {
                records: live.records,
                pages: live.pages,
                rejected: live.rejected,
            },
            Err(err) => {
                error!(%collection, error = %err, "upstream fetch failed, using synthetic data");
                FetchOutcome::Fallback {
                    records: R::synthetic(),
                    reason: FallbackReason::Degraded(err),
                }
            }
        }
    }

    /// Strict variant of [`Self::fetch`]: any failure is returned as-is.
    pub async fn fetch_live<R: UpstreamRecord>(&self) -> Result<LivePages<R>, UpstreamError> {
        let transport = self.transport.as_ref().ok_or(UpstreamError::NotConfigured)?;
        self.fetch_pages::<R>(transport.as_ref()).await
    }

    async fn fetch_pages<R: UpstreamRecord>(
        &self,
        transport: &dyn PageTransport,
    ) -> Result<LivePages<R>, UpstreamError> {
        let collection = R::COLLECTION;
        let span = info_span!("upstream_fetch", %collection, per_page = self.per_page);

        async move {
            let mut records = Vec::new();
            let mut seen = HashSet::new();
            let mut received = 0usize;
            let mut rejected = 0usize;
            let mut page = 1u32;

            loop {
                let response = transport.fetch_page(collection, page, self.per_page).await?;
                received += response.data.len();
                let more = response.has_more(page, received);
                let mut decoded = 0usize;
                let mut fresh = 0usize;

                for raw in response.data {
                    match serde_json::from_value::<R>(raw) {
                        Ok(record) => {
                            decoded += 1;
                            if seen.insert(record.record_id().to_string()) {
                                fresh += 1;
                                records.push(record);
                            }
                        }
                        Err(err) => {
                            rejected += 1;
                            warn!(%collection, page, error = %err, "rejected malformed record");
                        }
                    }
                }

                info!(%collection, page, total_records = records.len(), "fetched page");
                if !more {
                    break;
                }
                // An upstream that ignores `page` keeps serving the same records.
                if decoded > 0 && fresh == 0 {
                    return Err(UpstreamError::Stalled { collection, page });
                }
                if page >= self.max_pages {
                    return Err(UpstreamError::PageLimit {
                        collection,
                        limit: self.max_pages,
                    });
                }
                page += 1;
            }

            Ok(LivePages {
                records,
                pages: page,
                rejected,
            })
        }
        .instrument(span)
        .await
    }
}
