//! Error taxonomy shared across the hub core.
//!
//! Everything a handler can fail with is a [`HubError`]. Platform "no-op
//! edit" conditions are deliberately NOT part of this enum: an edit that
//! changes nothing is reported as [`crate::bot::messenger::EditOutcome::Unchanged`],
//! not as an error.

use thiserror::Error;

/// Errors produced by the hub core and its external clients.
#[derive(Debug, Error)]
pub enum HubError {
    /// A referenced entity (torrent, device, scenario) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Inbound data could not be parsed (callback payload, RPC reply).
    #[error("wrong format: {0}")]
    WrongFormat(String),

    /// The input is understood but refused (file too large, bad kind).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A `timed` budget elapsed before the wrapped task settled.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A `poll` loop observed its cancellation token triggered.
    #[error("cancelled")]
    Cancelled,

    /// Fetching an attachment from the bot platform failed.
    #[error("download failed: {0}")]
    DownloadError(String),

    /// An external service (Transmission, hub web API) reported failure.
    #[error("command failed: {0}")]
    CommandError(String),

    /// Transport-level failure talking to an external service.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Bot platform request failure that is not a recognized no-op edit.
    #[error("telegram error: {0}")]
    Telegram(String),

    /// The entity already exists (duplicate torrent add).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A stale callback referencing state that has since moved on.
    #[error("expired: {0}")]
    Expired(String),

    /// User state persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A callback button payload exceeded the platform's 64-byte budget.
    /// Raised at keyboard construction, never at send time.
    #[error("callback payload `{tag}` is {len} bytes, limit is {limit}")]
    CallbackTooLong {
        /// Tag of the offending payload.
        tag: String,
        /// Serialized length in bytes.
        len: usize,
        /// The platform budget.
        limit: usize,
    },
}

impl HubError {
    /// Human-readable message shown to the user at the dispatch boundary.
    ///
    /// Never exposes raw internal errors; kinds without a meaningful user
    /// phrasing fall back to a generic message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("🔎 Не найдено: {what}"),
            Self::Unsupported(what) => format!("🚫 Не поддерживается: {what}"),
            Self::Timeout(what) => format!("⏱ Не дождались ответа: {what}"),
            Self::Cancelled => "Операция отменена.".to_string(),
            Self::DownloadError(_) => "📥 Не удалось скачать файл, попробуйте ещё раз.".to_string(),
            Self::AlreadyExists(what) => format!("♻️ Уже добавлено: {what}"),
            Self::Expired(_) => "⌛️ Кнопка устарела, обновите сообщение.".to_string(),
            Self::Network(_) | Self::CommandError(_) => {
                "⚠️ Сервис недоступен, попробуйте позже.".to_string()
            }
            _ => "⚠️ Что-то пошло не так.".to_string(),
        }
    }

    /// Whether the dispatch boundary should attach a retry keyboard.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::CommandError(_)
        )
    }
}
