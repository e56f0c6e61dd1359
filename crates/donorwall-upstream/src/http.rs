//! reqwest transport for `GET {base_url}/{collection}?page=&per_page=`.

use std::time::Duration;

use async_trait::async_trait;
use donorwall_core::Collection;
use reqwest::header::ACCEPT;

use crate::{PageResponse, PageTransport, UpstreamError};

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub per_page: u32,
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.givebutter.com/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            per_page: 100,
            user_agent: Some(format!("donorwall-sync/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &UpstreamConfig, api_key: String) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().map_err(UpstreamError::Client)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.base_url, collection)
    }
}

fn classify_request_error(url: &str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout {
            url: url.to_string(),
        }
    } else {
        UpstreamError::Request {
            url: url.to_string(),
            source: err,
        }
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn fetch_page(
        &self,
        collection: Collection,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, UpstreamError> {
        let url = self.collection_url(collection);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await
            .map_err(|err| classify_request_error(&url, err))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        resp.json::<PageResponse>().await.map_err(|err| {
            if err.is_timeout() {
                classify_request_error(&url, err)
            } else {
                UpstreamError::Decode {
                    collection,
                    page,
                    message: err.to_string(),
                }
            }
        })
    }
}
