//! Inbound update handlers.
//!
//! The teloxide endpoints here are thin glue: they extract the user, build a
//! [`Trigger`], call the state-driven core functions and hand the result to
//! the dispatch protocol. The core functions know nothing about teloxide, so
//! the whole conversation flow is testable against mocked services.

use crate::bot::callback::CallbackData;
use crate::bot::ingest::{self, Attachment, InboundContent};
use crate::bot::messenger::{MessageRef, Messenger};
use crate::bot::response::{
    self, NotificationResponse, Response, TextResponse, Trigger,
};
use crate::bot::views;
use crate::clients::device::DeviceService;
use crate::clients::scenario::ScenarioService;
use crate::clients::torrent::{TorrentRecord, TorrentService};
use crate::config;
use crate::error::HubError;
use crate::storage::{StatePayload, StateTag, UserState, UserStateStore};
use crate::tasks;
use crate::utils;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Telegram caps message bodies at 4096 bytes; stay under it with margin.
const MESSAGE_LIMIT: usize = 4000;

/// Everything a handler needs, injected through dptree.
pub struct HubServices {
    /// Outbound platform boundary.
    pub messenger: Arc<dyn Messenger>,
    /// Torrent engine.
    pub torrents: Arc<dyn TorrentService>,
    /// Wake-on-LAN control.
    pub devices: Arc<dyn DeviceService>,
    /// Hub scenario execution.
    pub scenarios: Arc<dyn ScenarioService>,
    /// Per-user conversation state.
    pub store: UserStateStore,
    /// Wakeable device names from settings.
    pub device_names: Vec<String>,
    /// Runnable scenario names from settings.
    pub scenario_names: Vec<String>,
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды домового:")]
pub enum Command {
    /// Greet and show what the bot can do
    #[command(description = "приветствие и справка.")]
    Start,
    /// Show the torrent status overview
    #[command(description = "статус загрузок.")]
    Torrents,
    /// Ask for a torrent file or link
    #[command(description = "добавить загрузку.")]
    Add,
    /// Show devices and scenarios
    #[command(description = "устройства и сценарии.")]
    Status,
    /// List the supported commands
    #[command(description = "показать справку.")]
    Help,
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn message_trigger(msg: &Message) -> Trigger {
    Trigger::Message {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    }
}

fn inbound_content(msg: &Message) -> InboundContent {
    let attachment = msg.document().map(|doc| Attachment {
        file_id: doc.file.id.0.clone(),
        file_name: doc.file_name.clone(),
        size: doc.file.size,
    });
    InboundContent {
        attachment,
        text: msg.text().or_else(|| msg.caption()).map(ToString::to_string),
    }
}

/// Run a service call under the standard external-operation budget.
async fn bounded<T, Fut>(label: &str, call: Fut) -> Result<T, HubError>
where
    Fut: std::future::Future<Output = Result<T, HubError>>,
{
    tasks::timed(
        Duration::from_secs(config::TORRENT_OP_TIMEOUT_SECS),
        label,
        |_token| call,
    )
    .await
}

/// Compose the torrent overview, chunking bodies that exceed the platform
/// message limit into an ordered multi-message response. The keyboard rides
/// on the last chunk.
async fn overview_response(services: &HubServices) -> Result<Response, HubError> {
    let records = bounded("transmission", services.torrents.list()).await?;
    let body = views::torrent_overview(&records);
    let keyboard = views::overview_keyboard(&records)?;

    let mut parts = utils::split_long_message(&body, MESSAGE_LIMIT);
    if parts.len() <= 1 {
        return Ok(Response::Text(
            TextResponse::new(body).with_keyboard(keyboard),
        ));
    }
    let last = parts.pop().map(|text| TextResponse::new(text).with_keyboard(keyboard));
    let mut texts: Vec<TextResponse> = parts.into_iter().map(TextResponse::new).collect();
    texts.extend(last);
    Ok(Response::Multiple(texts))
}

async fn overview_update(services: &HubServices) -> Result<TextResponse, HubError> {
    let records = bounded("transmission", services.torrents.list()).await?;
    Ok(TextResponse::new(views::torrent_overview(&records))
        .with_keyboard(views::overview_keyboard(&records)?))
}

/// Poll Transmission until the magnet's metadata resolves and the record has
/// a name. A budget overrun keeps the unnamed record instead of failing: the
/// torrent is already added, only the display name is missing.
async fn resolve_metadata(
    services: &HubServices,
    record: TorrentRecord,
) -> Result<TorrentRecord, HubError> {
    if !record.name.is_empty() {
        return Ok(record);
    }
    let id = record.id;
    let resolved: Arc<StdMutex<Option<TorrentRecord>>> = Arc::new(StdMutex::new(None));

    let outcome = tasks::timed(
        Duration::from_secs(config::METADATA_POLL_TIMEOUT_SECS),
        "метаданные торрента",
        |token| {
            let slot = Arc::clone(&resolved);
            async move {
                tasks::poll(
                    Duration::from_millis(config::METADATA_POLL_INTERVAL_MS),
                    Some(&token),
                    || {
                        let slot = Arc::clone(&slot);
                        async move {
                            let current = services.torrents.info(id).await?;
                            if current.name.is_empty() {
                                return Ok(false);
                            }
                            *slot
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(current);
                            Ok(true)
                        }
                    },
                )
                .await
            }
        },
    )
    .await;

    match outcome {
        Ok(()) => Ok(resolved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .unwrap_or(record)),
        Err(HubError::Timeout(_)) => {
            warn!(id, "magnet metadata did not resolve in time");
            Ok(record)
        }
        Err(e) => Err(e),
    }
}

/// Finish a successful add: wait for metadata, move the user to `Waiting`
/// and render the confirmation. When the state carries an edit target (the
/// "➕ Добавить" button press), the confirmation replaces that message and
/// the inbound message gets no reply at all.
async fn added_response(
    services: &HubServices,
    user_id: i64,
    previous: &UserState,
    record: TorrentRecord,
) -> Result<Response, HubError> {
    if record.name.is_empty() {
        // The metadata poll can run for seconds; show interim text on the
        // message the confirmation will later replace.
        if let Some(StatePayload::EditTarget {
            chat_id,
            message_id,
        }) = previous.payload
        {
            services
                .messenger
                .edit_text(
                    MessageRef {
                        chat_id,
                        message_id,
                    },
                    views::TORRENT_ADDING.to_string(),
                    None,
                )
                .await?;
        }
    }
    let record = resolve_metadata(services, record).await?;
    info!(user_id, id = record.id, name = %record.name, "torrent added");

    services
        .store
        .set(user_id, UserState::new(StateTag::Waiting))
        .await?;

    let confirmation =
        TextResponse::new(views::torrent_added(&record)).with_keyboard(views::status_keyboard()?);

    if let Some(StatePayload::EditTarget {
        chat_id,
        message_id,
    }) = previous.payload
    {
        services
            .messenger
            .edit_text(
                MessageRef {
                    chat_id,
                    message_id,
                },
                confirmation.text,
                confirmation.keyboard,
            )
            .await?;
        return Ok(Response::Notification(NotificationResponse::silent()));
    }
    Ok(Response::Text(confirmation))
}

/// Core command handling, independent of the transport.
///
/// # Errors
///
/// Propagates service and persistence failures for the dispatch boundary to
/// render.
pub async fn handle_command(
    services: &HubServices,
    user_id: i64,
    command: Command,
) -> Result<Response, HubError> {
    match command {
        Command::Start => {
            services
                .store
                .set(user_id, UserState::new(StateTag::First))
                .await?;
            Ok(Response::Text(TextResponse::new(views::WELCOME)))
        }
        Command::Torrents => overview_response(services).await,
        Command::Add => {
            services
                .store
                .set(user_id, UserState::new(StateTag::AwaitingAttachment))
                .await?;
            Ok(Response::Text(TextResponse::new(views::SEND_ATTACHMENT)))
        }
        Command::Status => Ok(Response::Text(
            TextResponse::new(views::hub_status(
                &services.device_names,
                &services.scenario_names,
            ))
            .with_keyboard(views::hub_keyboard(
                &services.device_names,
                &services.scenario_names,
            )?),
        )),
        Command::Help => Ok(Response::Text(TextResponse::new(
            Command::descriptions().to_string(),
        ))),
    }
}

/// Core free-form message handling, driven by the user's conversation state.
///
/// # Errors
///
/// Propagates ingestion, service and persistence failures.
pub async fn handle_content(
    services: &HubServices,
    user_id: i64,
    content: &InboundContent,
) -> Result<Response, HubError> {
    let state = services.store.get_or_create(user_id).await?;

    let ingested = ingest::ingest(
        services.messenger.as_ref(),
        services.torrents.as_ref(),
        content,
    )
    .await?;
    if let Some(record) = ingested {
        return added_response(services, user_id, &state, record).await;
    }

    // Nothing torrent-like in the message; what that means depends on where
    // the conversation is.
    match state.tag {
        StateTag::AwaitingAttachment => {
            Ok(Response::Text(TextResponse::new(views::NOT_A_TORRENT)))
        }
        StateTag::Waiting => overview_response(services).await,
        StateTag::First => Ok(Response::Text(TextResponse::new(views::WELCOME))),
    }
}

/// Core callback handling.
///
/// # Errors
///
/// Propagates service and persistence failures.
pub async fn handle_callback_data(
    services: &HubServices,
    user_id: i64,
    data: CallbackData,
    origin: Option<MessageRef>,
) -> Result<Response, HubError> {
    match data {
        CallbackData::TorrentStatus => Ok(Response::Notification(NotificationResponse::refresh(
            overview_update(services).await?,
        ))),
        CallbackData::TorrentAdd => {
            let mut state = UserState::new(StateTag::AwaitingAttachment);
            state.payload = origin.map(|target| StatePayload::EditTarget {
                chat_id: target.chat_id,
                message_id: target.message_id,
            });
            services.store.set(user_id, state).await?;
            Ok(Response::Text(TextResponse::new(views::SEND_ATTACHMENT)))
        }
        CallbackData::TorrentInfo { id } => {
            let record = bounded("transmission", services.torrents.info(id)).await?;
            Ok(Response::Text(
                TextResponse::new(views::torrent_details(&record))
                    .with_keyboard(views::details_keyboard(id)?),
            ))
        }
        CallbackData::TorrentDelete { id } => {
            let record = bounded("transmission", services.torrents.info(id)).await?;
            Ok(Response::Text(
                TextResponse::new(views::delete_confirmation(&record))
                    .with_keyboard(views::delete_confirm_keyboard(id)?),
            ))
        }
        CallbackData::TorrentDeleteConfirm { id, with_data } => {
            bounded("transmission", services.torrents.remove(id, with_data)).await?;
            info!(user_id, id, with_data, "torrent removed");
            Ok(Response::Notification(NotificationResponse {
                toast: Some(views::TOAST_DELETED.to_string()),
                update: Some(overview_update(services).await?),
            }))
        }
        CallbackData::DeviceWake { device } => {
            bounded("wake-on-LAN", services.devices.wake(device.clone())).await?;
            Ok(Response::Notification(NotificationResponse::toast(
                views::toast_device_woken(&device),
            )))
        }
        CallbackData::ScenarioRun { scenario } => {
            bounded("сценарий", services.scenarios.run(scenario.clone())).await?;
            Ok(Response::Notification(NotificationResponse::toast(
                views::toast_scenario_started(&scenario),
            )))
        }
        CallbackData::Unknown { tag } => {
            warn!(user_id, tag, "stale callback button pressed");
            Ok(Response::Notification(NotificationResponse::toast(
                views::TOAST_STALE_BUTTON,
            )))
        }
    }
}

/// teloxide endpoint for commands.
///
/// # Errors
///
/// Returns an error only when even the error report could not be delivered.
pub async fn on_command(
    msg: Message,
    command: Command,
    services: Arc<HubServices>,
) -> anyhow::Result<()> {
    let user_id = get_user_id_safe(&msg);
    let trigger = message_trigger(&msg);
    let result = handle_command(&services, user_id, command).await;
    response::deliver_or_report(services.messenger.as_ref(), &trigger, result).await?;
    Ok(())
}

/// teloxide endpoint for free-form messages (text, documents, captions).
///
/// # Errors
///
/// Returns an error only when even the error report could not be delivered.
pub async fn on_message(msg: Message, services: Arc<HubServices>) -> anyhow::Result<()> {
    let user_id = get_user_id_safe(&msg);
    let trigger = message_trigger(&msg);
    let content = inbound_content(&msg);
    let result = handle_content(&services, user_id, &content).await;
    response::deliver_or_report(services.messenger.as_ref(), &trigger, result).await?;
    Ok(())
}

/// teloxide endpoint for callback queries.
///
/// # Errors
///
/// Returns an error only when even the error report could not be delivered.
pub async fn on_callback(query: CallbackQuery, services: Arc<HubServices>) -> anyhow::Result<()> {
    let user_id = query.from.id.0.cast_signed();
    let origin = query.message.as_ref().map(|m| MessageRef {
        chat_id: m.chat().id.0,
        message_id: m.id().0,
    });
    let trigger = Trigger::Callback {
        query_id: query.id.0.clone(),
        chat_id: origin.map_or(user_id, |target| target.chat_id),
        origin,
    };

    let result = match query.data.as_deref() {
        Some(wire) => match CallbackData::beautify(wire) {
            Ok(data) => handle_callback_data(&services, user_id, data, origin).await,
            Err(e) => Err(e),
        },
        None => Err(HubError::WrongFormat("пустой callback".to_string())),
    };
    response::deliver_or_report(services.messenger.as_ref(), &trigger, result).await?;
    Ok(())
}

/// teloxide endpoint for messages from users outside the allow-list.
///
/// # Errors
///
/// Never; delivery failures are logged and swallowed.
pub async fn on_unauthorized(msg: Message, services: Arc<HubServices>) -> anyhow::Result<()> {
    let user_id = get_user_id_safe(&msg);
    warn!(user_id, "unauthorized access attempt");
    if let Err(e) = services
        .messenger
        .send_text(
            msg.chat.id.0,
            views::ACCESS_DENIED.to_string(),
            None,
            Some(msg.id.0),
        )
        .await
    {
        warn!(user_id, "failed to deliver denial: {e}");
    }
    Ok(())
}
