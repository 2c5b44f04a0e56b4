use domovoy::bot::handlers::{self, get_user_id_safe, Command, HubServices};
use domovoy::bot::messenger::TelegramMessenger;
use domovoy::clients::device::WolDeviceService;
use domovoy::clients::scenario::HttpScenarioService;
use domovoy::clients::torrent::TransmissionClient;
use domovoy::config::Settings;
use domovoy::storage::{FileRepository, UserStateStore};
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting Домовой hub bot...");

    // Load settings
    let settings = init_settings();

    // Initialize Bot
    let bot = Bot::new(settings.telegram_token.clone());

    let services = init_services(&bot, &settings);

    // Setup handlers
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, services])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_services(bot: &Bot, settings: &Settings) -> Arc<HubServices> {
    let devices = settings.devices();
    let device_names = devices.iter().map(|d| d.name.clone()).collect();
    let scenario_names = settings.scenarios();

    info!(
        state_file = %settings.state_file,
        transmission = %settings.transmission_url,
        "Initializing hub services"
    );

    Arc::new(HubServices {
        messenger: Arc::new(TelegramMessenger::new(bot.clone())),
        torrents: Arc::new(TransmissionClient::new(settings.transmission_url.clone())),
        devices: Arc::new(WolDeviceService::new(devices)),
        scenarios: Arc::new(HttpScenarioService::new(settings.hub_api_url.clone())),
        store: UserStateStore::new(Arc::new(FileRepository::new(settings.state_file.clone()))),
        device_names,
        scenario_names,
    })
}

fn setup_handler() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(|q: CallbackQuery, settings: Arc<Settings>| {
                    settings
                        .allowed_users()
                        .contains(&q.from.id.0.cast_signed())
                })
                .endpoint(handlers::on_callback),
        )
        .branch(
            Update::filter_message().branch(
                // Основная ветка для авторизованных пользователей
                dptree::filter(|msg: Message, settings: Arc<Settings>| {
                    settings.allowed_users().contains(&get_user_id_safe(&msg))
                })
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handlers::on_command),
                )
                .endpoint(handlers::on_message),
            ),
        )
        .branch(
            // Все, кто не попал в фильтр выше — неавторизованы
            Update::filter_message().endpoint(handlers::on_unauthorized),
        )
}
