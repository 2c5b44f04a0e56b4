//! Small shared helpers: Telegram API retry and text clamping.

use crate::error::HubError;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Retry a Telegram API operation with exponential backoff and jitter.
///
/// Meant for transient transport failures around send/edit/download calls;
/// the strategy is bounded, so a persistent failure still surfaces quickly.
///
/// # Errors
///
/// Returns the operation's last error once the attempts are exhausted.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T, HubError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HubError>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Safely truncate a string to a maximum character length (not bytes).
///
/// UTF-8 safe, never panics on multi-byte characters.
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Split a message into parts that fit Telegram's length limit, breaking
/// on line boundaries.
///
/// Lines longer than `max_length` are split mid-line by character.
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    for line in message.lines() {
        if line.len() > max_length {
            if !current.is_empty() {
                parts.push(current.trim_end().to_string());
                current.clear();
            }
            let mut chunk = String::new();
            for c in line.chars() {
                if chunk.len() + c.len_utf8() > max_length {
                    parts.push(chunk.clone());
                    chunk.clear();
                }
                chunk.push(c);
            }
            current.push_str(&chunk);
            current.push('\n');
            continue;
        }

        if current.len() + line.len() + 1 > max_length && !current.is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        parts.push(current.trim_end().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message_untouched() {
        let parts = split_long_message("привет", 100);
        assert_eq!(parts, vec!["привет".to_string()]);
    }

    #[test]
    fn test_split_breaks_on_lines() {
        let message = "aaaa\nbbbb\ncccc";
        let parts = split_long_message(message, 10);
        assert_eq!(parts, vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }
}
