//! Polymorphic outbound responses and the edit-vs-send dispatch protocol.
//!
//! A handler returns a [`Response`]; the dispatcher renders it against the
//! trigger context. Callback-query triggers prefer editing the originating
//! message in place, falling back to sending when no editable message
//! exists; text-message triggers always send new messages. The platform's
//! "nothing changed" refusal ([`EditOutcome::Unchanged`]) is resolved into a
//! silent toast acknowledgment, never shown as an error.

use crate::bot::keyboard::InlineKeyboard;
use crate::bot::messenger::{EditOutcome, MessageRef, Messenger};
use crate::bot::views;
use crate::error::HubError;
use tracing::warn;

/// Editable text content with an optional inline keyboard.
#[derive(Debug, Clone)]
pub struct TextResponse {
    /// HTML-formatted body.
    pub text: String,
    /// Keyboard attached to the message.
    pub keyboard: Option<InlineKeyboard>,
}

impl TextResponse {
    /// Plain text response.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    /// Attach a keyboard.
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Ephemeral toast with an optional in-place update of the origin message.
#[derive(Debug, Clone)]
pub struct NotificationResponse {
    /// Toast text shown by the callback acknowledgment.
    pub toast: Option<String>,
    /// Re-rendered content for the originating message.
    pub update: Option<TextResponse>,
}

impl NotificationResponse {
    /// Toast-only notification.
    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            toast: Some(text.into()),
            update: None,
        }
    }

    /// No toast, no update. Acknowledges the callback spinner and nothing
    /// else; on a message trigger it delivers nothing at all.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            toast: None,
            update: None,
        }
    }

    /// The refresh shape: fixed toast plus a re-render of the origin
    /// message, used by refresh buttons that may produce unchanged content.
    #[must_use]
    pub fn refresh(update: TextResponse) -> Self {
        Self {
            toast: Some(views::TOAST_REFRESHED.to_string()),
            update: Some(update),
        }
    }
}

/// What a handler hands back to the dispatcher. Created per invocation,
/// consumed immediately, never persisted.
#[derive(Debug, Clone)]
pub enum Response {
    /// One editable message.
    Text(TextResponse),
    /// Two or more ordered messages; delivery is strictly sequential.
    Multiple(Vec<TextResponse>),
    /// Toast acknowledgment with optional origin update.
    Notification(NotificationResponse),
}

/// The inbound event a response is rendered against.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// An inbound text message.
    Message {
        /// Chat the message arrived in.
        chat_id: i64,
        /// The triggering message, replied to on send.
        message_id: i32,
    },
    /// An inbound callback query.
    Callback {
        /// Query id to acknowledge.
        query_id: String,
        /// Chat of the originating message.
        chat_id: i64,
        /// Originating message, if the platform still has it.
        origin: Option<MessageRef>,
    },
}

impl Trigger {
    /// Chat this trigger belongs to.
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => *chat_id,
        }
    }
}

/// Deliver `response` according to the trigger context.
///
/// # Errors
///
/// Propagates platform delivery failures. A no-op edit is not a failure.
pub async fn deliver(
    messenger: &dyn Messenger,
    trigger: &Trigger,
    response: Response,
) -> Result<(), HubError> {
    match trigger {
        Trigger::Message {
            chat_id,
            message_id,
        } => deliver_to_message(messenger, *chat_id, *message_id, response).await,
        Trigger::Callback {
            query_id,
            chat_id,
            origin,
        } => deliver_to_callback(messenger, query_id, *chat_id, *origin, response).await,
    }
}

async fn deliver_to_message(
    messenger: &dyn Messenger,
    chat_id: i64,
    message_id: i32,
    response: Response,
) -> Result<(), HubError> {
    match response {
        Response::Text(text) => {
            messenger
                .send_text(chat_id, text.text, text.keyboard, Some(message_id))
                .await?;
            Ok(())
        }
        Response::Multiple(texts) => {
            let mut reply_to = Some(message_id);
            for text in texts {
                messenger
                    .send_text(chat_id, text.text, text.keyboard, reply_to.take())
                    .await?;
            }
            Ok(())
        }
        Response::Notification(notification) => {
            // No query to acknowledge on a message trigger; only the update
            // body is deliverable.
            if let Some(update) = notification.update {
                messenger
                    .send_text(chat_id, update.text, update.keyboard, None)
                    .await?;
            }
            Ok(())
        }
    }
}

async fn deliver_to_callback(
    messenger: &dyn Messenger,
    query_id: &str,
    chat_id: i64,
    origin: Option<MessageRef>,
    response: Response,
) -> Result<(), HubError> {
    match response {
        Response::Text(text) => {
            edit_or_send(messenger, chat_id, origin, text).await?;
            messenger.answer_callback(query_id.to_owned(), None).await
        }
        Response::Multiple(texts) => {
            let mut texts = texts.into_iter();
            if let Some(first) = texts.next() {
                edit_or_send(messenger, chat_id, origin, first).await?;
            }
            for text in texts {
                messenger
                    .send_text(chat_id, text.text, text.keyboard, None)
                    .await?;
            }
            messenger.answer_callback(query_id.to_owned(), None).await
        }
        Response::Notification(notification) => {
            let update = async {
                if let (Some(update), Some(target)) = (notification.update, origin) {
                    messenger
                        .edit_text(target, update.text, update.keyboard)
                        .await
                        .map(|_| ())
                } else {
                    Ok(())
                }
            };
            let ack = messenger.answer_callback(query_id.to_owned(), notification.toast);
            let (update_result, ack_result) = tokio::join!(update, ack);
            update_result?;
            ack_result
        }
    }
}

/// The callback-trigger edit path: edit in place when an origin message
/// exists, otherwise send new. `Unchanged` counts as success.
async fn edit_or_send(
    messenger: &dyn Messenger,
    chat_id: i64,
    origin: Option<MessageRef>,
    text: TextResponse,
) -> Result<EditOutcome, HubError> {
    match origin {
        Some(target) => messenger.edit_text(target, text.text, text.keyboard).await,
        None => {
            messenger
                .send_text(chat_id, text.text, text.keyboard, None)
                .await?;
            Ok(EditOutcome::Edited)
        }
    }
}

/// Convert a handler error into a best-effort user-visible Response.
#[must_use]
pub fn error_response(error: &HubError) -> Response {
    let keyboard = if error.is_retryable() {
        views::retry_keyboard().ok()
    } else {
        None
    };
    Response::Text(TextResponse {
        text: error.user_message(),
        keyboard,
    })
}

/// The dispatch boundary: deliver the handler's result, converting handler
/// errors into an error Response first.
///
/// # Errors
///
/// Only platform delivery failures escape; handler errors are rendered.
pub async fn deliver_or_report(
    messenger: &dyn Messenger,
    trigger: &Trigger,
    result: Result<Response, HubError>,
) -> Result<(), HubError> {
    match result {
        Ok(response) => deliver(messenger, trigger, response).await,
        Err(error) => {
            warn!("handler failed, reporting to user: {error}");
            deliver(messenger, trigger, error_response(&error)).await
        }
    }
}
