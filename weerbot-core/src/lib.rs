//! Core library for the `weerbot` service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Clients for the weather, UV and Telegram APIs
//! - Report rendering, snapshot publishing and recipient delivery
//! - The update pipeline, the daily schedule and the chat command dispatcher
//!
//! It is used by `weerbot-cli`, but can also be embedded in other binaries.

pub mod bot;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod schedule;
pub mod severity;
pub mod snapshot;
pub mod telegram;
pub mod uv;
pub mod weather;

#[cfg(test)]
mod testing;

pub use bot::{BotCommand, BotDispatcher};
pub use config::Config;
pub use model::{ChatId, Coordinates, ErrorPayload, ReportKind, UvReading, WeatherSnapshot};
pub use notify::{Delivery, Notifier, RecipientFiles};
pub use pipeline::{Pipeline, RunOutcome};
pub use schedule::{ScheduleEntry, Scheduler, schedule_table};
pub use severity::Severity;
pub use telegram::{MessageSink, TelegramClient};
pub use uv::{OpenUvClient, UvOutcome, UvSource};
pub use weather::{WeatherSource, WeerliveClient};
