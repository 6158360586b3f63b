//! Blocking STAC API client.
//!
//! Requests run on a current-thread tokio runtime owned by the client, so the
//! public surface stays synchronous.

use std::time::Duration;

use opengeo_core::config::LayeredConfig;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{CollectionInfo, Item, SearchRequest};
use opengeo_core::ports::{CatalogClient, RequestSigner};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::wire::{self, CollectionList, ItemCollection, NextPage};

/// Configuration for [`StacClient`]
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s)
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3)
    pub max_retries: u32,
    /// Page size requested when the search does not set `limit` (default 100)
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(30), max_retries: 3, page_size: 100 }
    }
}

impl StacClientOptions {
    pub fn from_config(config: &LayeredConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries.value,
            ..Self::default()
        }
    }
}

/// Build the HTTP client shared by the adapters in this crate
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("opengeo/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OpengeoError::UpstreamUnavailable {
            url: String::new(),
            reason: format!("Failed to build HTTP client: {}", e),
        })
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|e| {
        OpengeoError::UpstreamUnavailable {
            url: String::new(),
            reason: format!("Failed to create async runtime: {}", e),
        }
    })
}

/// Send a request, retrying network failures and 5xx responses with
/// exponential backoff (500ms, 1s, 2s, ...). 4xx responses are not retried.
///
/// `Ok(None)` means the server answered 404.
pub(crate) async fn send_with_retry<F>(
    url: &str,
    max_retries: u32,
    build: F,
) -> Result<Option<reqwest::Response>>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(500 * (1u64 << (attempt - 1).min(6)));
            tracing::debug!("Retrying {} (attempt {}) after {:?}", url, attempt, delay);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(r) if r.status().is_success() => return Ok(Some(r)),
            Ok(r) if r.status() == StatusCode::NOT_FOUND => return Ok(None),
            Ok(r) => {
                let status = r.status();
                let body = r.text().await.unwrap_or_default();
                last_err = Some(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                ));
                // Don't retry client errors (4xx)
                if status.is_client_error() {
                    break;
                }
            }
            Err(e) => {
                last_err = Some(format!("request failed: {}", e));
            }
        }
    }

    Err(OpengeoError::UpstreamUnavailable {
        url: url.to_string(),
        reason: last_err.unwrap_or_else(|| "request failed".to_string()),
    })
}

async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
    response.json::<T>().await.map_err(|e| OpengeoError::UpstreamUnavailable {
        url: url.to_string(),
        reason: format!("Failed to parse STAC response: {}", e),
    })
}

/// STAC API client with pagination and retries
pub struct StacClient {
    root: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    options: StacClientOptions,
    signer: Option<Box<dyn RequestSigner>>,
}

impl StacClient {
    /// Create a client for a catalog root URL
    pub fn new(root: impl Into<String>, options: StacClientOptions) -> Result<Self> {
        let root = root.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: http_client(options.request_timeout)?,
            runtime: runtime()?,
            root,
            options,
            signer: None,
        })
    }

    pub fn with_signer(mut self, signer: Box<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The POST `/search` URL
    pub fn search_url(&self) -> String {
        if self.root.ends_with("/search") {
            self.root.clone()
        } else {
            format!("{}/search", self.root)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match send_with_retry(url, self.options.max_retries, || self.client.get(url)).await? {
            Some(response) => Ok(Some(read_json(url, response).await?)),
            None => Ok(None),
        }
    }

    async fn post_search(&self, url: &str, body: &Value) -> Result<ItemCollection> {
        let response = send_with_retry(url, self.options.max_retries, || {
            self.client.post(url).json(body)
        })
        .await?
        .ok_or_else(|| OpengeoError::UpstreamUnavailable {
            url: url.to_string(),
            reason: "search endpoint not found (HTTP 404)".to_string(),
        })?;
        read_json(url, response).await
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(&self, link: &NextPage, original: &Value) -> Result<ItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let body = match (&link.body, link.merge.unwrap_or(false)) {
                (Some(link_body), true) => {
                    // Merge: start from original params, overlay link body
                    let mut base = original.clone();
                    if let (Some(base_obj), Some(link_obj)) =
                        (base.as_object_mut(), link_body.as_object())
                    {
                        for (k, v) in link_obj {
                            base_obj.insert(k.clone(), v.clone());
                        }
                    }
                    base
                }
                (Some(link_body), false) => link_body.clone(),
                (None, _) => original.clone(),
            };
            self.post_search(&link.href, &body).await
        } else {
            self.get_json(&link.href).await?.ok_or_else(|| OpengeoError::UpstreamUnavailable {
                url: link.href.clone(),
                reason: "pagination link not found (HTTP 404)".to_string(),
            })
        }
    }

    async fn search_async(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        let max = request.max_items;
        let mut body = request.clone();
        if body.limit.is_none() {
            let page = max.map_or(self.options.page_size, |m| {
                (m.min(self.options.page_size as usize) as u32).max(1)
            });
            body.limit = Some(page);
        }
        let body = serde_json::to_value(&body)?;
        let url = self.search_url();
        tracing::debug!("POST {} {}", url, body);

        let mut page = self.post_search(&url, &body).await?;
        let mut items: Vec<Item> = Vec::new();

        loop {
            let next = wire::next_page(&page.links);
            let fetched = page.items.len();
            items.append(&mut page.items);

            if fetched == 0 || max.is_some_and(|m| items.len() >= m) {
                break;
            }

            match next {
                Some(link) => page = self.follow_next(&link, &body).await?,
                None => break,
            }
        }

        if let Some(m) = max {
            items.truncate(m);
        }
        tracing::info!("Search at {} returned {} items", self.root, items.len());
        Ok(items)
    }

    async fn collections_async(&self) -> Result<Vec<CollectionInfo>> {
        let mut url = self.url("collections");
        let mut collections = Vec::new();

        loop {
            let page: CollectionList = self.get_json(&url).await?.ok_or_else(|| {
                OpengeoError::UpstreamUnavailable {
                    url: url.clone(),
                    reason: "collections endpoint not found (HTTP 404)".to_string(),
                }
            })?;
            let next = wire::next_page(&page.links).map(|link| link.href);
            let fetched = page.collections.len();
            collections.extend(page.collections);

            match next {
                Some(href) if fetched > 0 && href != url => url = href,
                _ => break,
            }
        }

        Ok(collections)
    }
}

impl CatalogClient for StacClient {
    fn search(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        self.runtime.block_on(self.search_async(request))
    }

    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        self.runtime.block_on(self.collections_async())
    }

    fn get_collection(&self, id: &str) -> Result<Option<CollectionInfo>> {
        let url = self.url(&format!("collections/{}", id));
        self.runtime.block_on(self.get_json(&url))
    }

    fn get_item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>> {
        let url = self.url(&format!("collections/{}/items/{}", collection_id, item_id));
        self.runtime.block_on(self.get_json(&url))
    }

    fn signer(&self) -> Option<&dyn RequestSigner> {
        self.signer.as_deref()
    }
}
