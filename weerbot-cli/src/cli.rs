use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Password, Text};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use weerbot_core::{
    BotDispatcher, ChatId, Config, Pipeline, ReportKind, RunOutcome, Scheduler, TelegramClient,
    config::{
        DEFAULT_TELEGRAM_API, DEFAULT_UV_URL, DEFAULT_WEATHER_URL, RelayConfig, TelegramConfig,
        UvConfig, WeatherConfig,
    },
    schedule::{ScheduleState, schedule_table},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weerbot", version, about = "Weather and UV reports for Telegram")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true, env = "WEERBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler and the chat bot until interrupted.
    Run {
        /// Only run scheduled updates; do not answer chat messages.
        #[arg(long)]
        no_bot: bool,
    },

    /// Run a single update and deliver it to the recipient list.
    Once {
        /// "summary" or "details".
        #[arg(long, default_value = "summary")]
        kind: ReportKind,
    },

    /// Fetch and print a report without storing or sending it.
    Preview {
        /// "summary" or "details".
        #[arg(long, default_value = "summary")]
        kind: ReportKind,
    },

    /// Print the daily update schedule.
    Schedule,

    /// Create or update the config file interactively.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run { no_bot } => {
                let cfg = load_config(self.config.as_deref())?;
                run_service(&cfg, no_bot).await?;
            }
            Command::Once { kind } => {
                let cfg = load_config(self.config.as_deref())?;
                let pipeline = Pipeline::from_config(&cfg)?;
                pipeline
                    .notifier()
                    .files()
                    .ensure_files()
                    .await
                    .context("Failed to create recipient lists")?;

                match pipeline.run_update(kind).await {
                    RunOutcome::Delivered {
                        delivery,
                        published,
                        ..
                    } => {
                        println!(
                            "Weather {kind} delivered to {} recipient(s), {} failed, {} skipped.",
                            delivery.delivered.len(),
                            delivery.failed.len(),
                            delivery.skipped.len()
                        );
                        if !published {
                            println!("Warning: the snapshot could not be published.");
                        }
                    }
                    RunOutcome::Replied { .. } => {}
                    RunOutcome::Failed(payload) => bail!("Weather {kind} update failed: {payload}"),
                }
            }
            Command::Preview { kind } => {
                let cfg = load_config(self.config.as_deref())?;
                let pipeline = Pipeline::from_config(&cfg)?;
                let text = pipeline
                    .preview(kind)
                    .await
                    .map_err(|payload| anyhow!("Could not build {kind} report: {payload}"))?;
                println!("{text}");
            }
            Command::Schedule => print_schedule(),
            Command::Configure => {
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                configure(&path)?;
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = Config::load(path)?;
    tracing::debug!("configuration loaded");
    Ok(cfg)
}

async fn run_service(cfg: &Config, no_bot: bool) -> Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(cfg)?);
    pipeline
        .notifier()
        .files()
        .ensure_files()
        .await
        .context("Failed to create recipient lists")?;

    let scheduler = Scheduler::new(pipeline.clone());

    let bot = if no_bot {
        tracing::info!("chat bot disabled");
        None
    } else {
        let client = TelegramClient::from_config(cfg).context("Failed to build Telegram client")?;
        let dispatcher = BotDispatcher::new(pipeline, cfg.telegram.authorized_users.clone());
        Some((dispatcher, client))
    };
    let bot = async move {
        match bot {
            Some((dispatcher, client)) => dispatcher.run(client).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = scheduler.run() => {}
        _ = bot => {}
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for shutdown signal")?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

fn print_schedule() {
    let table = schedule_table();
    let next = ScheduleState::new(table.clone(), Local::now().naive_local()).next_run();

    for entry in &table {
        let marker = match next {
            Some((at, _)) if at.time() == entry.at => "  <- next",
            _ => "",
        };
        println!("{}  {}{marker}", entry.at.format("%H:%M"), entry.kind);
    }
}

/// Prompt for a secret; an empty answer keeps `current` when there is one.
fn prompt_secret(message: &str, current: Option<&str>) -> Result<String> {
    let mut prompt = Password::new(message).without_confirmation();
    if current.is_some() {
        prompt = prompt.with_help_message("Leave empty to keep the current value");
    }

    let value = prompt.prompt()?;
    match current {
        Some(current) if value.trim().is_empty() => Ok(current.to_string()),
        _ => Ok(value.trim().to_string()),
    }
}

fn parse_chat_ids(input: &str) -> Result<Vec<ChatId>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ChatId>()
                .with_context(|| format!("'{s}' is not a valid chat id"))
        })
        .collect()
}

fn configure(path: &Path) -> Result<()> {
    let existing = if path.exists() {
        Some(Config::load(Some(path))?)
    } else {
        None
    };
    let current = existing.as_ref();

    println!("Configuring weerbot ({})", path.display());

    let token = prompt_secret(
        "Telegram bot token:",
        current.map(|c| c.telegram.token.as_str()),
    )?;

    let mut operator = CustomType::<i64>::new("Operator chat id:")
        .with_error_message("Please enter a numeric chat id");
    if let Some(c) = current {
        operator = operator.with_default(c.telegram.operator_chat_id.0);
    }
    let operator_chat_id = ChatId(operator.prompt()?);

    let users_default = current
        .map(|c| {
            c.telegram
                .authorized_users
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| operator_chat_id.to_string());
    let authorized_users = parse_chat_ids(
        &Text::new("Authorized chat ids (comma separated):")
            .with_default(&users_default)
            .prompt()?,
    )?;

    let weather_key = prompt_secret(
        "Weather API key:",
        current.map(|c| c.weather.api_key.as_str()),
    )?;
    let location_default = current
        .map(|c| c.weather.location.clone())
        .unwrap_or_default();
    let location = Text::new("Location (lat,lon):")
        .with_default(&location_default)
        .prompt()?;

    let uv_key = prompt_secret("UV API key:", current.map(|c| c.uv.api_key.as_str()))?;
    let backup_key = Password::new("Backup UV API key (optional):")
        .without_confirmation()
        .prompt_skippable()?
        .filter(|k| !k.trim().is_empty())
        .or_else(|| current.and_then(|c| c.uv.backup_api_key.clone()));

    let relay = if Confirm::new("Mirror the weather snapshot to a remote server over scp?")
        .with_default(current.is_some_and(|c| c.relay.is_some()))
        .prompt()?
    {
        let relay_current = current.and_then(|c| c.relay.as_ref());
        let key_default = relay_current
            .map(|r| r.ssh_key.display().to_string())
            .unwrap_or_default();
        let server_default = relay_current.map(|r| r.server.clone()).unwrap_or_default();
        let path_default = relay_current
            .map(|r| r.remote_path.clone())
            .unwrap_or_default();

        Some(RelayConfig {
            enabled: true,
            ssh_key: PathBuf::from(
                Text::new("SSH private key:")
                    .with_default(&key_default)
                    .prompt()?,
            ),
            server: Text::new("Server (user@host:port):")
                .with_default(&server_default)
                .prompt()?,
            remote_path: Text::new("Remote directory:")
                .with_default(&path_default)
                .prompt()?,
            notify_operator: relay_current.is_none_or(|r| r.notify_operator),
        })
    } else {
        None
    };

    let cfg = Config {
        http_timeout_secs: current.map_or(30, |c| c.http_timeout_secs),
        telegram: TelegramConfig {
            token,
            api_base: current
                .map(|c| c.telegram.api_base.clone())
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API.to_string()),
            operator_chat_id,
            authorized_users,
        },
        weather: WeatherConfig {
            api_key: weather_key,
            location: location.trim().to_string(),
            base_url: current
                .map(|c| c.weather.base_url.clone())
                .unwrap_or_else(|| DEFAULT_WEATHER_URL.to_string()),
            retry_delay_secs: current.map_or(60, |c| c.weather.retry_delay_secs),
        },
        uv: UvConfig {
            api_key: uv_key,
            backup_api_key: backup_key,
            base_url: current
                .map(|c| c.uv.base_url.clone())
                .unwrap_or_else(|| DEFAULT_UV_URL.to_string()),
            cache_path: current
                .map(|c| c.uv.cache_path.clone())
                .unwrap_or_else(|| PathBuf::from("uv.json")),
        },
        storage: current
            .map(|c| c.storage.clone())
            .unwrap_or_default(),
        relay,
    };

    cfg.validate()?;
    cfg.save(path)?;

    println!("Configuration saved to {}", path.display());
    Ok(())
}
