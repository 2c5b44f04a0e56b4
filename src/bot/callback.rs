//! Compact codec for inline-button payloads.
//!
//! Telegram carries callback identifiers inline in the button, capped at 64
//! bytes, so every payload is "uglified" into a short-key wire object of the
//! shape `{"$": <tag>, ...}` before it is attached to a keyboard and
//! "beautified" back when the button is pressed. The two mappings are exact
//! inverses over the registered variants.
//!
//! Unregistered tags decode to [`CallbackData::Unknown`] instead of failing,
//! so buttons minted by a future version of the bot degrade gracefully.

use crate::error::HubError;
use serde_json::{json, Map, Value};

/// Fixed wire key carrying the variant tag.
pub const TAG_KEY: &str = "$";

/// Hard platform budget for a serialized callback payload, in bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;

/// A structured UI action carried on an inline button.
///
/// Constructed per keyboard render, consumed on button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    /// Re-render the torrent status overview.
    TorrentStatus,
    /// Start the add-torrent flow; the pressed message becomes the edit
    /// target for the eventual confirmation.
    TorrentAdd,
    /// Show details for one torrent.
    TorrentInfo {
        /// Transmission torrent id.
        id: i64,
    },
    /// Ask for delete confirmation.
    TorrentDelete {
        /// Transmission torrent id.
        id: i64,
    },
    /// Confirmed delete, optionally removing downloaded data.
    TorrentDeleteConfirm {
        /// Transmission torrent id.
        id: i64,
        /// Also remove local data.
        with_data: bool,
    },
    /// Send a wake-on-LAN packet to a named device.
    DeviceWake {
        /// Device name from settings.
        device: String,
    },
    /// Run a named hub scenario.
    ScenarioRun {
        /// Scenario name.
        scenario: String,
    },
    /// A tag this build does not know. Carries no fields.
    Unknown {
        /// The unrecognized wire tag.
        tag: String,
    },
}

impl CallbackData {
    /// Wire tag for this variant.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::TorrentStatus => "tc_status",
            Self::TorrentAdd => "tc_add",
            Self::TorrentInfo { .. } => "tc_info",
            Self::TorrentDelete { .. } => "tc_del",
            Self::TorrentDeleteConfirm { .. } => "tc_delc",
            Self::DeviceWake { .. } => "dev_wake",
            Self::ScenarioRun { .. } => "sc_run",
            Self::Unknown { tag } => tag,
        }
    }

    /// Map human-named fields onto their short wire keys.
    fn uglify_fields(&self, wire: &mut Map<String, Value>) {
        match self {
            Self::TorrentStatus | Self::TorrentAdd | Self::Unknown { .. } => {}
            Self::TorrentInfo { id } | Self::TorrentDelete { id } => {
                wire.insert("i".to_string(), json!(id));
            }
            Self::TorrentDeleteConfirm { id, with_data } => {
                wire.insert("i".to_string(), json!(id));
                wire.insert("d".to_string(), json!(with_data));
            }
            Self::DeviceWake { device } => {
                wire.insert("n".to_string(), json!(device));
            }
            Self::ScenarioRun { scenario } => {
                wire.insert("n".to_string(), json!(scenario));
            }
        }
    }

    /// Encode into the compact wire string `{"$":<tag>,...}`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Json`] if serialization fails.
    pub fn uglify(&self) -> Result<String, HubError> {
        let mut wire = Map::new();
        wire.insert(TAG_KEY.to_string(), json!(self.tag()));
        self.uglify_fields(&mut wire);
        Ok(serde_json::to_string(&Value::Object(wire))?)
    }

    /// Decode a wire string back into the full variant.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WrongFormat`] on malformed JSON, a missing tag
    /// key, or missing variant fields. Unregistered tags succeed as
    /// [`CallbackData::Unknown`].
    pub fn beautify(wire: &str) -> Result<Self, HubError> {
        let value: Value = serde_json::from_str(wire)
            .map_err(|e| HubError::WrongFormat(format!("callback payload: {e}")))?;
        let tag = value
            .get(TAG_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::WrongFormat("callback payload without tag".to_string()))?;

        let wire_i64 = |key: &str| {
            value.get(key).and_then(Value::as_i64).ok_or_else(|| {
                HubError::WrongFormat(format!("callback `{tag}` missing field `{key}`"))
            })
        };
        let wire_str = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| {
                    HubError::WrongFormat(format!("callback `{tag}` missing field `{key}`"))
                })
        };

        Ok(match tag {
            "tc_status" => Self::TorrentStatus,
            "tc_add" => Self::TorrentAdd,
            "tc_info" => Self::TorrentInfo { id: wire_i64("i")? },
            "tc_del" => Self::TorrentDelete { id: wire_i64("i")? },
            "tc_delc" => Self::TorrentDeleteConfirm {
                id: wire_i64("i")?,
                with_data: value.get("d").and_then(Value::as_bool).unwrap_or(false),
            },
            "dev_wake" => Self::DeviceWake {
                device: wire_str("n")?,
            },
            "sc_run" => Self::ScenarioRun {
                scenario: wire_str("n")?,
            },
            other => Self::Unknown {
                tag: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered_variants() -> Vec<CallbackData> {
        vec![
            CallbackData::TorrentStatus,
            CallbackData::TorrentAdd,
            CallbackData::TorrentInfo { id: 7 },
            CallbackData::TorrentDelete { id: 12345 },
            CallbackData::TorrentDeleteConfirm {
                id: 3,
                with_data: true,
            },
            CallbackData::DeviceWake {
                device: "nas".to_string(),
            },
            CallbackData::ScenarioRun {
                scenario: "movie_night".to_string(),
            },
        ]
    }

    #[test]
    fn every_registered_variant_round_trips() -> Result<(), HubError> {
        for variant in registered_variants() {
            let wire = variant.uglify()?;
            assert_eq!(CallbackData::beautify(&wire)?, variant, "wire: {wire}");
        }
        Ok(())
    }

    #[test]
    fn status_wire_shape_is_exact() -> Result<(), HubError> {
        assert_eq!(CallbackData::TorrentStatus.uglify()?, r#"{"$":"tc_status"}"#);
        Ok(())
    }

    #[test]
    fn registered_payloads_fit_the_budget() -> Result<(), HubError> {
        for variant in registered_variants() {
            let wire = variant.uglify()?;
            assert!(wire.len() <= CALLBACK_DATA_LIMIT, "oversized: {wire}");
        }
        Ok(())
    }

    #[test]
    fn unknown_tag_beautifies_to_tag_only() -> Result<(), HubError> {
        let decoded = CallbackData::beautify(r#"{"$":"tc_pause","i":9}"#)?;
        assert_eq!(
            decoded,
            CallbackData::Unknown {
                tag: "tc_pause".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn malformed_payloads_are_wrong_format() {
        for wire in ["not json", "{}", r#"{"$":5}"#, r#"{"$":"tc_info"}"#] {
            assert!(
                matches!(CallbackData::beautify(wire), Err(HubError::WrongFormat(_))),
                "accepted: {wire}"
            );
        }
    }
}
