//! Inline keyboards with a construction-time payload budget.
//!
//! The 64-byte callback limit is enforced at the moment a keyboard is
//! authored. A violation is a [`HubError::CallbackTooLong`] naming the
//! offending payload, never a silent truncation and never a delivery-time
//! surprise.

use crate::bot::callback::{CallbackData, CALLBACK_DATA_LIMIT};
use crate::error::HubError;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// One button of an [`InlineKeyboard`].
#[derive(Debug, Clone)]
pub enum Button {
    /// A button carrying an encoded [`CallbackData`] payload.
    Callback {
        /// Visible label.
        label: String,
        /// The action to encode.
        data: CallbackData,
    },
    /// A plain link button.
    Url {
        /// Visible label.
        label: String,
        /// Target URL.
        url: String,
    },
}

impl Button {
    /// Callback button shorthand.
    pub fn callback(label: impl Into<String>, data: CallbackData) -> Self {
        Self::Callback {
            label: label.into(),
            data,
        }
    }

    /// URL button shorthand.
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            label: label.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone)]
enum ReadyButton {
    Callback { label: String, payload: String },
    Url { label: String, url: reqwest::Url },
}

/// An ordered grid of buttons whose callback payloads are already encoded
/// and verified against [`CALLBACK_DATA_LIMIT`].
#[derive(Debug, Clone)]
pub struct InlineKeyboard {
    rows: Vec<Vec<ReadyButton>>,
}

impl InlineKeyboard {
    /// Build a keyboard, encoding every callback payload up front.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CallbackTooLong`] the instant any payload's
    /// serialized form exceeds the budget, and [`HubError::Json`] if a
    /// payload fails to serialize at all.
    pub fn new(rows: Vec<Vec<Button>>) -> Result<Self, HubError> {
        let mut ready_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut ready = Vec::with_capacity(row.len());
            for button in row {
                ready.push(match button {
                    Button::Callback { label, data } => {
                        let payload = data.uglify()?;
                        if payload.len() > CALLBACK_DATA_LIMIT {
                            return Err(HubError::CallbackTooLong {
                                tag: data.tag().to_string(),
                                len: payload.len(),
                                limit: CALLBACK_DATA_LIMIT,
                            });
                        }
                        ReadyButton::Callback { label, payload }
                    }
                    Button::Url { label, url } => ReadyButton::Url {
                        label,
                        url: url
                            .parse()
                            .map_err(|e| HubError::WrongFormat(format!("button url: {e}")))?,
                    },
                });
            }
            ready_rows.push(ready);
        }
        Ok(Self { rows: ready_rows })
    }

    /// Single-row shorthand.
    ///
    /// # Errors
    ///
    /// Same conditions as [`InlineKeyboard::new`].
    pub fn single_row(row: Vec<Button>) -> Result<Self, HubError> {
        Self::new(vec![row])
    }

    /// Render as the teloxide wire type. Infallible: payloads were encoded
    /// and size-checked at construction.
    #[must_use]
    pub fn markup(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(self.rows.iter().map(|row| {
            row.iter().map(|button| match button {
                ReadyButton::Callback { label, payload } => {
                    InlineKeyboardButton::callback(label.clone(), payload.clone())
                }
                ReadyButton::Url { label, url } => {
                    InlineKeyboardButton::url(label.clone(), url.clone())
                }
            })
        }))
    }
}
