//! Typed access to the endpoints of the NMBS data API.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::client::HttpClient;
use super::{Payload, fetch_bytes, fetch_payload, send};
use crate::error::{NmbsError, Result};

/// Record count for one planning table served by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTable {
    pub name: String,
    pub records: u64,
}

/// GTFS tables the API serves under `planningdata/<table>`.
pub const PLANNING_TABLES: [&str; 8] = [
    "agency",
    "stops",
    "routes",
    "trips",
    "stop_times",
    "calendar",
    "calendar_dates",
    "translations",
];

#[derive(Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    status: String,
}

pub struct ApiClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> ApiClient<C> {
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn health(&self) -> Result<Value> {
        self.get_json("health").await
    }

    /// Raw GTFS-RT payload from an API-relative path, protobuf or JSON
    /// depending on its content type.
    pub async fn realtime_payload(&self, path: &str) -> Result<Payload> {
        fetch_payload(&self.client, &self.url(path)).await
    }

    /// Asks the API to refresh all of its data now. True when the API
    /// answers `{"status": "success"}`.
    pub async fn force_update(&self) -> Result<bool> {
        let url = self.url("update");
        let payload = send(&self.client, reqwest::Method::POST, &url).await?;
        let parsed: UpdateResponse =
            serde_json::from_slice(&payload.body).map_err(|e| NmbsError::decode(url, e))?;
        info!(status = %parsed.status, "Requested remote data update");
        Ok(parsed.status == "success")
    }

    pub async fn planning_files(&self) -> Result<Vec<String>> {
        let url = self.url("planningdata/files");
        let body = fetch_bytes(&self.client, &url).await?;
        let parsed: FilesResponse =
            serde_json::from_slice(&body).map_err(|e| NmbsError::decode(url, e))?;
        Ok(parsed.files)
    }

    pub async fn planning_table(&self, table: &str) -> Result<Value> {
        self.get_json(&format!("planningdata/{table}")).await
    }

    /// Counts the records of each requested planning table. Tables that fail
    /// to load are logged and left out.
    pub async fn planning_summary(&self, tables: &[&str]) -> Vec<RemoteTable> {
        let mut summary = Vec::new();
        for table in tables {
            match self.planning_table(table).await {
                Ok(value) => {
                    let records = record_count(&value);
                    info!(table, records, "Fetched remote planning table");
                    summary.push(RemoteTable {
                        name: table.to_string(),
                        records,
                    });
                }
                Err(e) => warn!(table, error = %e, "Remote planning table unavailable"),
            }
        }
        summary
    }

    /// Summarizes the tables listed by `planningdata/files`, or the default
    /// GTFS tables when the listing is unavailable.
    pub async fn remote_planning(&self) -> Vec<RemoteTable> {
        let tables: Vec<String> = match self.planning_files().await {
            Ok(files) if !files.is_empty() => files
                .iter()
                .map(|f| f.trim_end_matches(".txt").to_string())
                .collect(),
            Ok(_) => PLANNING_TABLES.iter().map(|t| t.to_string()).collect(),
            Err(e) => {
                warn!(error = %e, "Planning file listing unavailable, using default tables");
                PLANNING_TABLES.iter().map(|t| t.to_string()).collect()
            }
        };
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        self.planning_summary(&names).await
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let body = fetch_bytes(&self.client, &url).await?;
        serde_json::from_slice(&body).map_err(|e| NmbsError::decode(url, e))
    }
}

/// Planning endpoints answer either a bare array or `{"data": [...]}`.
pub fn record_count(value: &Value) -> u64 {
    let rows = match value {
        Value::Object(map) => map.get("data").unwrap_or(value),
        _ => value,
    };
    match rows {
        Value::Array(items) => items.len() as u64,
        Value::Null => 0,
        _ => 1,
    }
}
