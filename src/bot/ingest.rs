//! Ingestion of user-supplied torrent files and links.
//!
//! Input is either a message attachment or free text. Attachments are
//! fetched into a scoped temporary directory that is removed on every exit
//! path; removal failures are logged and never mask the primary outcome.
//! Free text is scanned for a magnet or `.torrent` link; anything else is
//! `Ok(None)` ("not applicable"), not an error.

use crate::bot::messenger::Messenger;
use crate::clients::torrent::{TorrentRecord, TorrentService};
use crate::error::HubError;
use lazy_regex::lazy_regex;
use std::path::PathBuf;
use tracing::{info, warn};

/// Maximum accepted `.torrent` attachment size (20 MB).
pub const MAX_ATTACHMENT_SIZE: u32 = 20 * 1024 * 1024;

static RE_MAGNET: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"magnet:\?\S+");
static RE_TORRENT_URL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"https?://\S+\.torrent(?:\?\S*)?");

/// An inbound attachment descriptor from the bot platform.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Platform file id for download.
    pub file_id: String,
    /// Original file name, if the platform knows it.
    pub file_name: Option<String>,
    /// Declared size in bytes.
    pub size: u32,
}

/// What a message contributed to ingestion.
#[derive(Debug, Clone, Default)]
pub struct InboundContent {
    /// File attachment, if present.
    pub attachment: Option<Attachment>,
    /// Message text or caption, if present.
    pub text: Option<String>,
}

/// Scoped temporary download directory. Removed on drop, on every exit
/// path; a failed removal is logged, never raised.
struct TempDownload {
    dir: Option<tempfile::TempDir>,
}

impl TempDownload {
    fn create() -> Result<Self, HubError> {
        let dir = tempfile::Builder::new()
            .prefix("domovoy-ingest-")
            .tempdir()?;
        Ok(Self { dir: Some(dir) })
    }

    fn file_path(&self) -> PathBuf {
        // `dir` is only taken in Drop.
        self.dir
            .as_ref()
            .map_or_else(|| PathBuf::from("download.torrent"), |dir| {
                dir.path().join("download.torrent")
            })
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("failed to remove temp download dir {}: {e}", path.display());
            }
        }
    }
}

/// Extract the first recognizable torrent link from free text.
#[must_use]
pub fn find_link(text: &str) -> Option<&str> {
    RE_MAGNET
        .find(text)
        .or_else(|| RE_TORRENT_URL.find(text))
        .map(|m| m.as_str())
}

/// Turn an inbound message into a torrent record via the content processor.
///
/// Returns `Ok(None)` when the input is recognized as irrelevant: no
/// attachment and no recognizable link in the text.
///
/// # Errors
///
/// Oversized attachments are [`HubError::Unsupported`]; download and
/// processor failures propagate. Temp cleanup never fails the call.
pub async fn ingest(
    messenger: &dyn Messenger,
    torrents: &dyn TorrentService,
    content: &InboundContent,
) -> Result<Option<TorrentRecord>, HubError> {
    if let Some(attachment) = &content.attachment {
        if attachment.size > MAX_ATTACHMENT_SIZE {
            return Err(HubError::Unsupported(format!(
                "файл больше {} МБ",
                MAX_ATTACHMENT_SIZE / 1024 / 1024
            )));
        }

        let scratch = TempDownload::create()?;
        let path = scratch.file_path();
        messenger
            .download_file(attachment.file_id.clone(), path.clone())
            .await?;
        info!(
            file_name = ?attachment.file_name,
            size = attachment.size,
            "attachment downloaded for ingestion"
        );
        let record = torrents.add_metainfo(path).await?;
        return Ok(Some(record));
    }

    if let Some(link) = content.text.as_deref().and_then(find_link) {
        let record = torrents.add_link(link.to_string()).await?;
        return Ok(Some(record));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::messenger::MockMessenger;
    use crate::clients::torrent::{MockTorrentService, TorrentStatus};
    use chrono::DateTime;
    use std::sync::{Arc, Mutex};

    fn record(name: &str) -> TorrentRecord {
        TorrentRecord {
            id: 1,
            name: name.to_string(),
            percent_done: 0.0,
            status: TorrentStatus::Downloading,
            added: DateTime::UNIX_EPOCH,
        }
    }

    fn attachment_content() -> InboundContent {
        InboundContent {
            attachment: Some(Attachment {
                file_id: "file-1".to_string(),
                file_name: Some("ubuntu.torrent".to_string()),
                size: 1024,
            }),
            text: None,
        }
    }

    /// Messenger double that actually materializes the file and records
    /// where it put it.
    fn downloading_messenger(seen: Arc<Mutex<Option<PathBuf>>>) -> MockMessenger {
        let mut messenger = MockMessenger::new();
        messenger.expect_download_file().returning(move |_, dest| {
            std::fs::write(&dest, b"d8:announce0:e").expect("write temp file");
            *seen.lock().expect("lock") = Some(dest);
            Ok(())
        });
        messenger
    }

    #[tokio::test]
    async fn temp_file_is_removed_after_success() {
        let seen = Arc::new(Mutex::new(None));
        let messenger = downloading_messenger(seen.clone());
        let mut torrents = MockTorrentService::new();
        torrents.expect_add_metainfo().returning(|path| {
            assert!(path.exists(), "processor must see the downloaded file");
            Ok(record("ubuntu"))
        });

        let result = ingest(&messenger, &torrents, &attachment_content()).await;
        assert!(matches!(result, Ok(Some(r)) if r.name == "ubuntu"));

        let path = seen.lock().expect("lock").clone().expect("downloaded");
        assert!(!path.exists(), "temp file must be gone after success");
    }

    #[tokio::test]
    async fn temp_file_is_removed_after_processor_failure() {
        let seen = Arc::new(Mutex::new(None));
        let messenger = downloading_messenger(seen.clone());
        let mut torrents = MockTorrentService::new();
        torrents
            .expect_add_metainfo()
            .returning(|_| Err(HubError::CommandError("daemon down".to_string())));

        let result = ingest(&messenger, &torrents, &attachment_content()).await;
        assert!(matches!(result, Err(HubError::CommandError(_))));

        let path = seen.lock().expect("lock").clone().expect("downloaded");
        assert!(!path.exists(), "temp file must be gone after failure");
    }

    #[tokio::test]
    async fn oversized_attachment_is_rejected_before_download() {
        let mut messenger = MockMessenger::new();
        messenger.expect_download_file().times(0);
        let torrents = MockTorrentService::new();

        let content = InboundContent {
            attachment: Some(Attachment {
                file_id: "file-1".to_string(),
                file_name: None,
                size: MAX_ATTACHMENT_SIZE + 1,
            }),
            text: None,
        };
        let result = ingest(&messenger, &torrents, &content).await;
        assert!(matches!(result, Err(HubError::Unsupported(_))));
    }

    #[tokio::test]
    async fn magnet_text_is_forwarded_without_temp_files() {
        let messenger = MockMessenger::new();
        let mut torrents = MockTorrentService::new();
        torrents
            .expect_add_link()
            .withf(|link| link.starts_with("magnet:?xt=urn:btih:"))
            .returning(|_| Ok(record("fedora")));

        let content = InboundContent {
            attachment: None,
            text: Some("вот ссылка magnet:?xt=urn:btih:deadbeef качай".to_string()),
        };
        let result = ingest(&messenger, &torrents, &content).await;
        assert!(matches!(result, Ok(Some(r)) if r.name == "fedora"));
    }

    #[tokio::test]
    async fn plain_chat_text_is_not_applicable() {
        let messenger = MockMessenger::new();
        let torrents = MockTorrentService::new();

        let content = InboundContent {
            attachment: None,
            text: Some("привет, как дела?".to_string()),
        };
        let result = ingest(&messenger, &torrents, &content).await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn link_recognition() {
        assert!(find_link("magnet:?xt=urn:btih:abc").is_some());
        assert!(find_link("see https://example.com/file.torrent please").is_some());
        assert!(find_link("https://example.com/page.html").is_none());
        assert!(find_link("просто текст").is_none());
    }
}
