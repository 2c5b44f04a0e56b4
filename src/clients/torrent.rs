//! Transmission RPC client.
//!
//! Implements the content-processor boundary of the ingestion pipeline:
//! torrent files go up as base64 `metainfo`, links (magnet or http) as
//! `filename`. Handles the `X-Transmission-Session-Id` 409 handshake
//! transparently.

use crate::error::HubError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// Torrent lifecycle phase as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentStatus {
    /// Fetching data.
    Downloading,
    /// Complete, uploading to peers.
    Seeding,
    /// Paused or finished without seeding.
    Stopped,
    /// Verifying local data.
    Checking,
}

/// One torrent as the hub core sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentRecord {
    /// Transmission torrent id.
    pub id: i64,
    /// Display name (empty until magnet metadata resolves).
    pub name: String,
    /// Completion in `0.0..=1.0`.
    pub percent_done: f64,
    /// Lifecycle phase.
    pub status: TorrentStatus,
    /// When the torrent was added.
    pub added: DateTime<Utc>,
}

/// The torrent engine boundary consumed by handlers and the ingestion
/// pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TorrentService: Send + Sync {
    /// Add a torrent by magnet or http link.
    async fn add_link(&self, link: String) -> Result<TorrentRecord, HubError>;
    /// Add a torrent from a local `.torrent` file.
    async fn add_metainfo(&self, path: PathBuf) -> Result<TorrentRecord, HubError>;
    /// All known torrents.
    async fn list(&self) -> Result<Vec<TorrentRecord>, HubError>;
    /// One torrent by id.
    async fn info(&self, id: i64) -> Result<TorrentRecord, HubError>;
    /// Remove a torrent, optionally deleting downloaded data.
    async fn remove(&self, id: i64, delete_data: bool) -> Result<(), HubError>;
}

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const TORRENT_FIELDS: &[&str] = &["id", "name", "percentDone", "status", "addedDate"];

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct WireTorrent {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "percentDone")]
    percent_done: f64,
    #[serde(default)]
    status: i64,
    #[serde(default, rename = "addedDate")]
    added_date: i64,
}

impl From<WireTorrent> for TorrentRecord {
    fn from(wire: WireTorrent) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            percent_done: wire.percent_done,
            status: match wire.status {
                1 | 2 => TorrentStatus::Checking,
                3 | 4 => TorrentStatus::Downloading,
                5 | 6 => TorrentStatus::Seeding,
                _ => TorrentStatus::Stopped,
            },
            added: Utc
                .timestamp_opt(wire.added_date, 0)
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// Transmission daemon client.
pub struct TransmissionClient {
    http: reqwest::Client,
    url: String,
    session_id: RwLock<Option<String>>,
}

impl TransmissionClient {
    /// Client for the RPC endpoint at `url` (e.g.
    /// `http://localhost:9091/transmission/rpc`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            session_id: RwLock::new(None),
        }
    }

    async fn rpc(&self, method: &str, arguments: Value) -> Result<Value, HubError> {
        let body = json!({ "method": method, "arguments": arguments });

        // First 409 per session carries the id to replay with.
        for _ in 0..2 {
            let mut req = self.http.post(&self.url).json(&body);
            if let Some(session) = self.session_id.read().await.clone() {
                req = req.header(SESSION_HEADER, session);
            }
            let response = req.send().await?;

            if response.status() == reqwest::StatusCode::CONFLICT {
                let session = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        HubError::CommandError("transmission: 409 without session id".to_string())
                    })?;
                debug!("transmission session renewed");
                *self.session_id.write().await = Some(session);
                continue;
            }

            let envelope: RpcEnvelope = response.error_for_status()?.json().await?;
            if envelope.result != "success" {
                return Err(HubError::CommandError(format!(
                    "transmission {method}: {}",
                    envelope.result
                )));
            }
            return Ok(envelope.arguments);
        }
        Err(HubError::CommandError(
            "transmission: session handshake failed".to_string(),
        ))
    }

    fn added_record(arguments: &Value) -> Result<TorrentRecord, HubError> {
        if let Some(duplicate) = arguments.get("torrent-duplicate") {
            let wire: WireTorrent = serde_json::from_value(duplicate.clone())?;
            return Err(HubError::AlreadyExists(wire.name));
        }
        let added = arguments
            .get("torrent-added")
            .cloned()
            .ok_or_else(|| HubError::CommandError("transmission: nothing added".to_string()))?;
        let wire: WireTorrent = serde_json::from_value(added)?;
        Ok(wire.into())
    }
}

#[async_trait]
impl TorrentService for TransmissionClient {
    async fn add_link(&self, link: String) -> Result<TorrentRecord, HubError> {
        let arguments = self.rpc("torrent-add", json!({ "filename": link })).await?;
        Self::added_record(&arguments)
    }

    async fn add_metainfo(&self, path: PathBuf) -> Result<TorrentRecord, HubError> {
        let bytes = tokio::fs::read(&path).await?;
        let metainfo = base64::engine::general_purpose::STANDARD.encode(bytes);
        let arguments = self
            .rpc("torrent-add", json!({ "metainfo": metainfo }))
            .await?;
        Self::added_record(&arguments)
    }

    async fn list(&self) -> Result<Vec<TorrentRecord>, HubError> {
        let arguments = self
            .rpc("torrent-get", json!({ "fields": TORRENT_FIELDS }))
            .await?;
        let wires: Vec<WireTorrent> =
            serde_json::from_value(arguments.get("torrents").cloned().unwrap_or(json!([])))?;
        Ok(wires.into_iter().map(Into::into).collect())
    }

    async fn info(&self, id: i64) -> Result<TorrentRecord, HubError> {
        let arguments = self
            .rpc(
                "torrent-get",
                json!({ "ids": [id], "fields": TORRENT_FIELDS }),
            )
            .await?;
        let mut wires: Vec<WireTorrent> =
            serde_json::from_value(arguments.get("torrents").cloned().unwrap_or(json!([])))?;
        if wires.is_empty() {
            return Err(HubError::NotFound(format!("торрент {id}")));
        }
        Ok(wires.remove(0).into())
    }

    async fn remove(&self, id: i64, delete_data: bool) -> Result<(), HubError> {
        self.rpc(
            "torrent-remove",
            json!({ "ids": [id], "delete-local-data": delete_data }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_status_maps_to_lifecycle_phase() {
        let phases = [
            (0, TorrentStatus::Stopped),
            (2, TorrentStatus::Checking),
            (4, TorrentStatus::Downloading),
            (6, TorrentStatus::Seeding),
        ];
        for (code, expected) in phases {
            let wire = WireTorrent {
                id: 1,
                name: "x".to_string(),
                percent_done: 0.0,
                status: code,
                added_date: 0,
            };
            assert_eq!(TorrentRecord::from(wire).status, expected);
        }
    }

    #[test]
    fn duplicate_add_is_already_exists() {
        let arguments = json!({
            "torrent-duplicate": { "id": 3, "name": "debian.iso" }
        });
        let result = TransmissionClient::added_record(&arguments);
        assert!(matches!(result, Err(HubError::AlreadyExists(name)) if name == "debian.iso"));
    }

    #[test]
    fn added_record_parses_the_added_torrent() -> Result<(), HubError> {
        let arguments = json!({
            "torrent-added": { "id": 9, "name": "ubuntu.iso" }
        });
        let record = TransmissionClient::added_record(&arguments)?;
        assert_eq!(record.id, 9);
        assert_eq!(record.name, "ubuntu.iso");
        Ok(())
    }
}
