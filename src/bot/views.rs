//! User-facing texts and keyboards.
//!
//! All strings interpolating user- or tracker-controlled content (torrent
//! names) go through HTML escaping; everything else is static HTML.

use crate::bot::callback::CallbackData;
use crate::bot::keyboard::{Button, InlineKeyboard};
use crate::clients::torrent::{TorrentRecord, TorrentStatus};
use crate::error::HubError;

/// Toast shown by the refresh notification shape.
pub const TOAST_REFRESHED: &str = "Обновлено";

/// Toast after a confirmed torrent removal.
pub const TOAST_DELETED: &str = "🗑 Удалено";

/// Toast for a pressed button this build does not recognize.
pub const TOAST_STALE_BUTTON: &str = "Кнопка устарела, обновите меню";

/// Toast after a wake-on-LAN packet went out.
#[must_use]
pub fn toast_device_woken(device: &str) -> String {
    format!("⚡️ Будим {device}")
}

/// Toast after a scenario was started.
#[must_use]
pub fn toast_scenario_started(scenario: &str) -> String {
    format!("🎬 Запущен сценарий {scenario}")
}

/// Greeting for `/start`.
pub const WELCOME: &str = r"👋 <b>Домовой на связи</b>

Я слежу за домом: торренты, устройства, сценарии.
• /torrents — загрузки
• /status — состояние хаба
• Пришлите torrent-файл или magnet-ссылку, чтобы добавить загрузку";

/// Prompt when the bot expects a torrent file or link.
pub const SEND_ATTACHMENT: &str =
    "📎 Пришлите torrent-файл или magnet-ссылку одним сообщением.";

/// Reply when awaited input is neither a file nor a recognizable link.
pub const NOT_A_TORRENT: &str =
    "🤔 Это не похоже на торрент. Нужен .torrent файл или magnet-ссылка.";

/// Denial for unknown senders.
pub const ACCESS_DENIED: &str = "⛔️ Доступ запрещён";

/// Shown while the hub waits for torrent metadata.
pub const TORRENT_ADDING: &str = "⏳ Добавляю торрент...";

/// Confirmation that a torrent was added.
#[must_use]
pub fn torrent_added(record: &TorrentRecord) -> String {
    format!(
        "✅ Добавлено: <b>{}</b>",
        html_escape::encode_text(&record.name)
    )
}

/// One line of the status overview.
fn torrent_line(record: &TorrentRecord) -> String {
    let icon = match record.status {
        TorrentStatus::Downloading => "⏬",
        TorrentStatus::Seeding => "✅",
        TorrentStatus::Stopped => "⏸",
        TorrentStatus::Checking => "🔍",
    };
    format!(
        "{icon} <b>{}</b> — {:.0}%",
        html_escape::encode_text(&record.name),
        record.percent_done * 100.0
    )
}

/// The torrent status overview body.
#[must_use]
pub fn torrent_overview(records: &[TorrentRecord]) -> String {
    if records.is_empty() {
        return "📭 Активных загрузок нет.".to_string();
    }
    let lines: Vec<String> = records.iter().map(torrent_line).collect();
    format!("📥 <b>Загрузки</b>\n\n{}", lines.join("\n"))
}

/// Detail card for one torrent.
#[must_use]
pub fn torrent_details(record: &TorrentRecord) -> String {
    format!(
        "<b>{}</b>\nПрогресс: {:.1}%\nДобавлен: {}",
        html_escape::encode_text(&record.name),
        record.percent_done * 100.0,
        record.added.format("%d.%m.%Y %H:%M"),
    )
}

/// Delete confirmation prompt.
#[must_use]
pub fn delete_confirmation(record: &TorrentRecord) -> String {
    format!(
        "🗑 Удалить <b>{}</b>?",
        html_escape::encode_text(&record.name)
    )
}

/// Hub overview: wakeable devices and runnable scenarios.
#[must_use]
pub fn hub_status(devices: &[String], scenarios: &[String]) -> String {
    if devices.is_empty() && scenarios.is_empty() {
        return "🏠 Устройства и сценарии не настроены.".to_string();
    }
    let mut sections = Vec::new();
    if !devices.is_empty() {
        sections.push(format!("⚡️ Устройства: {}", devices.join(", ")));
    }
    if !scenarios.is_empty() {
        sections.push(format!("🎬 Сценарии: {}", scenarios.join(", ")));
    }
    format!("🏠 <b>Хаб</b>\n\n{}", sections.join("\n"))
}

/// One button per device and per scenario.
///
/// # Errors
///
/// Construction fails if a name pushes its payload over the platform budget.
pub fn hub_keyboard(devices: &[String], scenarios: &[String]) -> Result<InlineKeyboard, HubError> {
    let mut rows = Vec::new();
    for device in devices {
        rows.push(vec![Button::callback(
            format!("⚡️ {device}"),
            CallbackData::DeviceWake {
                device: device.clone(),
            },
        )]);
    }
    for scenario in scenarios {
        rows.push(vec![Button::callback(
            format!("🎬 {scenario}"),
            CallbackData::ScenarioRun {
                scenario: scenario.clone(),
            },
        )]);
    }
    InlineKeyboard::new(rows)
}

/// Refresh-only keyboard attached to status messages.
///
/// # Errors
///
/// Construction fails only if a payload exceeds the platform budget.
pub fn status_keyboard() -> Result<InlineKeyboard, HubError> {
    InlineKeyboard::single_row(vec![Button::callback("🔄 Обновить", CallbackData::TorrentStatus)])
}

/// Keyboard under the status overview: refresh plus per-torrent detail.
///
/// # Errors
///
/// Construction fails only if a payload exceeds the platform budget.
pub fn overview_keyboard(records: &[TorrentRecord]) -> Result<InlineKeyboard, HubError> {
    let mut rows = vec![vec![
        Button::callback("🔄 Обновить", CallbackData::TorrentStatus),
        Button::callback("➕ Добавить", CallbackData::TorrentAdd),
    ]];
    for record in records {
        rows.push(vec![Button::callback(
            format!("ℹ️ {}", crate::utils::truncate_str(&record.name, 24)),
            CallbackData::TorrentInfo { id: record.id },
        )]);
    }
    InlineKeyboard::new(rows)
}

/// Keyboard under a torrent detail card.
///
/// # Errors
///
/// Construction fails only if a payload exceeds the platform budget.
pub fn details_keyboard(id: i64) -> Result<InlineKeyboard, HubError> {
    InlineKeyboard::new(vec![
        vec![Button::callback("🗑 Удалить", CallbackData::TorrentDelete { id })],
        vec![Button::callback("⬅️ К списку", CallbackData::TorrentStatus)],
    ])
}

/// Yes/no keyboard for a delete confirmation.
///
/// # Errors
///
/// Construction fails only if a payload exceeds the platform budget.
pub fn delete_confirm_keyboard(id: i64) -> Result<InlineKeyboard, HubError> {
    InlineKeyboard::new(vec![
        vec![
            Button::callback(
                "🗑 С данными",
                CallbackData::TorrentDeleteConfirm {
                    id,
                    with_data: true,
                },
            ),
            Button::callback(
                "📄 Только из списка",
                CallbackData::TorrentDeleteConfirm {
                    id,
                    with_data: false,
                },
            ),
        ],
        vec![Button::callback("⬅️ Отмена", CallbackData::TorrentInfo { id })],
    ])
}

/// Recovery keyboard for retryable errors.
///
/// # Errors
///
/// Construction fails only if a payload exceeds the platform budget.
pub fn retry_keyboard() -> Result<InlineKeyboard, HubError> {
    InlineKeyboard::single_row(vec![Button::callback(
        "🔄 Повторить",
        CallbackData::TorrentStatus,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str) -> TorrentRecord {
        TorrentRecord {
            id: 1,
            name: name.to_string(),
            percent_done: 0.5,
            status: TorrentStatus::Downloading,
            added: chrono::Utc
                .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn torrent_names_are_html_escaped() {
        let overview = torrent_overview(&[record("<script>alert(1)</script>")]);
        assert!(!overview.contains("<script>"));
        assert!(overview.contains("&lt;script&gt;"));
    }

    #[test]
    fn empty_overview_has_placeholder() {
        assert!(torrent_overview(&[]).contains("нет"));
    }

    #[test]
    fn keyboards_construct_within_budget() -> Result<(), HubError> {
        status_keyboard()?;
        details_keyboard(i64::MAX)?;
        delete_confirm_keyboard(i64::MAX)?;
        retry_keyboard()?;
        overview_keyboard(&[record("a"), record("b")])?;
        hub_keyboard(
            &["nas".to_string()],
            &["movie_night".to_string(), "lights_off".to_string()],
        )?;
        Ok(())
    }

    #[test]
    fn hub_status_lists_both_sections() {
        let body = hub_status(&["nas".to_string()], &["movie_night".to_string()]);
        assert!(body.contains("nas"));
        assert!(body.contains("movie_night"));

        assert!(hub_status(&[], &[]).contains("не настроены"));
    }
}
