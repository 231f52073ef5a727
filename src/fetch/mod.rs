//! HTTP access to the remote NMBS data API.

mod api;
mod basic;
mod client;
mod headers;

pub use api::{ApiClient, PLANNING_TABLES, RemoteTable, record_count};
pub use basic::BasicClient;
pub use client::HttpClient;
pub use headers::WithHeader;

#[cfg(test)]
pub(crate) use client::mock;

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::config::Config;
use crate::error::{NmbsError, Result};

/// Builds the production client described by the configuration.
pub fn client_from_config(config: &Config) -> Result<Arc<dyn HttpClient>> {
    let basic = BasicClient::new(&config.user_agent, config.request_timeout)
        .map_err(|e| NmbsError::fetch("configuration", e))?;
    Ok(match &config.api_token {
        Some(token) => Arc::new(WithHeader::bearer(basic, token)?),
        None => Arc::new(basic),
    })
}

/// A response body with the media type the server declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// GETs `url` and returns the body. Transport failures, timeouts and
/// non-success statuses all surface as [`NmbsError::Fetch`].
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes> {
    Ok(fetch_payload(client, url).await?.body)
}

/// Like [`fetch_bytes`], keeping the `Content-Type` header.
pub async fn fetch_payload<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Payload> {
    send(client, reqwest::Method::GET, url).await
}

/// Sends a bodiless request and checks the status.
pub(crate) async fn send<C: HttpClient + ?Sized>(
    client: &C,
    method: reqwest::Method,
    url: &str,
) -> Result<Payload> {
    let parsed = url.parse().map_err(|e| NmbsError::fetch(url, e))?;
    let req = reqwest::Request::new(method, parsed);

    let resp = client
        .execute(req)
        .await
        .map_err(|e| NmbsError::fetch(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(NmbsError::fetch(url, format!("HTTP status {status}")));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.bytes().await.map_err(|e| NmbsError::fetch(url, e))?;
    debug!(url, bytes = body.len(), content_type = ?content_type, "Fetched payload");
    Ok(Payload { body, content_type })
}
