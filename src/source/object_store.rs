use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Result, SourceError, ZoneObject, ZoneSource};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Zones kept as objects in a bucket behind a JSON object-store API.
///
/// Listing: `GET {endpoint}/storage/v1/b/{bucket}/o?prefix=..&delimiter=/`,
/// paged with `pageToken`. Fetching: `GET .../o/{key}?alt=media`.
pub struct ObjectStoreSource {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
    updated: DateTime<Utc>,
}

impl ObjectStoreSource {
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SourceError::SourceUnavailable(format!("bad endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(SourceError::SourceUnavailable(format!(
                "endpoint {} cannot carry a path",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("bucketdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::SourceUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.to_string(),
            token,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn objects_url(&self, key: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SourceError::SourceUnavailable(format!("endpoint {} cannot carry a path", self.endpoint))
            })?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            // Keys are a single path segment; '/' inside them gets escaped
            if let Some(key) = key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    SourceError::SourceUnavailable(e.to_string())
}

#[async_trait]
impl ZoneSource for ObjectStoreSource {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ZoneObject>> {
        let url = self.objects_url(None)?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("prefix", prefix.to_string()), ("delimiter", "/".to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .get(url.clone())
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;

            if !response.status().is_success() {
                return Err(SourceError::SourceUnavailable(format!(
                    "listing bucket {} failed: HTTP {}",
                    self.bucket,
                    response.status()
                )));
            }

            let page: ListResponse = response.json().await.map_err(transport_error)?;
            trace!("Listed page with {} objects", page.items.len());
            objects.extend(
                page.items
                    .into_iter()
                    .map(|item| ZoneObject::new(item.name, item.updated)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        if objects.is_empty() {
            return Err(SourceError::EmptyCatalog(prefix.to_string()));
        }
        debug!("Bucket {} lists {} objects", self.bucket, objects.len());
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let url = self.objects_url(Some(key))?;
        let response = self
            .get(url)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(SourceError::ObjectNotFound(key.to_string())),
            status if status.is_success() => response.bytes().await.map_err(transport_error),
            status => Err(SourceError::SourceUnavailable(format!(
                "fetching {} failed: HTTP {}",
                key, status
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("bucket {} at {}", self.bucket, self.endpoint)
    }
}
