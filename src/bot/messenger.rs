//! Outbound platform boundary.
//!
//! The dispatch protocol talks to Telegram through the [`Messenger`] trait
//! so tests can substitute a recording double. The real implementation wraps
//! teloxide with bounded retry for transient network failures and maps the
//! platform's "message is not modified" refusal into
//! [`EditOutcome::Unchanged`] instead of an error.

use crate::bot::keyboard::InlineKeyboard;
use crate::error::HubError;
use crate::utils;
use async_trait::async_trait;
use std::path::PathBuf;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, FileId, MessageId, ParseMode, ReplyParameters};

/// A delivered message a later edit can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    /// Chat holding the message.
    pub chat_id: i64,
    /// Platform message id within the chat.
    pub message_id: i32,
}

/// Result of an edit request.
///
/// `Unchanged` is the platform refusing to "edit" to identical content. It
/// is a successful no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message content was replaced.
    Edited,
    /// The platform reported no visible change.
    Unchanged,
}

/// Outbound operations the dispatch protocol consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, optionally with a keyboard and as a reply.
    async fn send_text(
        &self,
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
        reply_to: Option<i32>,
    ) -> Result<MessageRef, HubError>;

    /// Edit an existing message's text (and keyboard) in place.
    async fn edit_text(
        &self,
        target: MessageRef,
        text: String,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<EditOutcome, HubError>;

    /// Acknowledge a callback query, optionally with a toast.
    async fn answer_callback(
        &self,
        query_id: String,
        toast: Option<String>,
    ) -> Result<(), HubError>;

    /// Download a platform file to a local path.
    async fn download_file(&self, file_id: String, dest: PathBuf) -> Result<(), HubError>;
}

const ERROR_NOT_MODIFIED: &str = "message is not modified";

/// teloxide-backed [`Messenger`].
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    /// Wrap a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
        reply_to: Option<i32>,
    ) -> Result<MessageRef, HubError> {
        utils::retry_telegram_operation(|| async {
            let mut req = self
                .bot
                .send_message(ChatId(chat_id), text.clone())
                .parse_mode(ParseMode::Html);
            if let Some(kb) = &keyboard {
                req = req.reply_markup(kb.markup());
            }
            if let Some(message_id) = reply_to {
                req = req.reply_parameters(ReplyParameters::new(MessageId(message_id)));
            }
            let sent = req
                .await
                .map_err(|e| HubError::Telegram(format!("send: {e}")))?;
            Ok(MessageRef {
                chat_id: sent.chat.id.0,
                message_id: sent.id.0,
            })
        })
        .await
    }

    async fn edit_text(
        &self,
        target: MessageRef,
        text: String,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<EditOutcome, HubError> {
        utils::retry_telegram_operation(|| async {
            let mut req = self
                .bot
                .edit_message_text(
                    ChatId(target.chat_id),
                    MessageId(target.message_id),
                    text.clone(),
                )
                .parse_mode(ParseMode::Html);
            if let Some(kb) = &keyboard {
                req = req.reply_markup(kb.markup());
            }
            match req.await {
                Ok(_) => Ok(EditOutcome::Edited),
                // Must be recognized inside the retry closure, otherwise the
                // no-op would be retried as a failure.
                Err(e) if e.to_string().contains(ERROR_NOT_MODIFIED) => Ok(EditOutcome::Unchanged),
                Err(e) => Err(HubError::Telegram(format!("edit: {e}"))),
            }
        })
        .await
    }

    async fn answer_callback(
        &self,
        query_id: String,
        toast: Option<String>,
    ) -> Result<(), HubError> {
        let mut req = self.bot.answer_callback_query(CallbackQueryId(query_id));
        if let Some(toast) = toast {
            req = req.text(toast);
        }
        req.await
            .map_err(|e| HubError::Telegram(format!("answer callback: {e}")))?;
        Ok(())
    }

    async fn download_file(&self, file_id: String, dest: PathBuf) -> Result<(), HubError> {
        utils::retry_telegram_operation(|| async {
            let file = self
                .bot
                .get_file(FileId(file_id.clone()))
                .await
                .map_err(|e| HubError::DownloadError(format!("get_file: {e}")))?;
            let mut out = tokio::fs::File::create(&dest)
                .await
                .map_err(|e| HubError::DownloadError(format!("create {}: {e}", dest.display())))?;
            self.bot
                .download_file(&file.path, &mut out)
                .await
                .map_err(|e| HubError::DownloadError(format!("download: {e}")))?;
            Ok(())
        })
        .await
    }
}
