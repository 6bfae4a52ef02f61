//! Interactive chat commands.

use std::{sync::Arc, time::Duration};

use crate::{
    model::{ChatId, ReportKind},
    pipeline::Pipeline,
    telegram::{IncomingMessage, MessageSink, OutgoingMessage, TelegramClient},
};

pub const SUMMARY_BUTTON: &str = "😎 Het weer samengevat";
pub const DETAILS_BUTTON: &str = "📒 Gedetailleerde gegevens";

const MENU_PROMPT: &str = "Wat wil je doen?";
const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that. Type /menu to see what I can do.";
const NOT_AUTHORIZED: &str = "Sorry, it looks like you're not authorized.";

const COMMANDS_HELP: &str = "<b>Menu</b> - Toon het menu\n/menu\n\n<b>Start</b> - Start de bot\n/start";

const LONG_POLL: Duration = Duration::from_secs(30);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Menu,
    Report(ReportKind),
    Unknown,
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        // `/start@weerbot` is how commands arrive in group chats
        let command = text.split('@').next().unwrap_or(text);

        match command {
            "/start" => BotCommand::Start,
            "/menu" => BotCommand::Menu,
            SUMMARY_BUTTON => BotCommand::Report(ReportKind::Summary),
            DETAILS_BUTTON => BotCommand::Report(ReportKind::Details),
            _ => BotCommand::Unknown,
        }
    }
}

fn welcome_text(name: &str) -> String {
    format!(
        "Hey {name},\n\n\
         Ik ben een Weer Bot.\n\n\
         Twee keer per uur log ik weergegevens en een paar keer per dag wat gedetailleerder. \
         Je kunt deze gegevens ook handmatig opvragen.\n\n\
         Je vindt deze functies in het menu.\n\
         {COMMANDS_HELP}",
        name = crate::report::escape_html(name),
    )
}

/// Routes incoming chat messages to the pipeline.
#[derive(Debug, Clone)]
pub struct BotDispatcher {
    pipeline: Arc<Pipeline>,
    authorized: Vec<ChatId>,
}

impl BotDispatcher {
    pub fn new(pipeline: Arc<Pipeline>, authorized: Vec<ChatId>) -> Self {
        Self {
            pipeline,
            authorized,
        }
    }

    fn is_authorized(&self, chat: ChatId) -> bool {
        self.authorized.contains(&chat)
    }

    async fn send(&self, message: OutgoingMessage) {
        let chat = message.chat;
        if let Err(e) = self.pipeline.sink().send(message).await {
            tracing::error!("failed to send message to {chat}: {e}");
        }
    }

    async fn send_menu(&self, chat: ChatId) {
        self.send(
            OutgoingMessage::html(chat, MENU_PROMPT).with_keyboard([SUMMARY_BUTTON, DETAILS_BUTTON]),
        )
        .await;
    }

    pub async fn handle(&self, message: &IncomingMessage) {
        let chat = message.chat;
        let command = BotCommand::parse(&message.text);
        let authorized = self.is_authorized(chat);

        match command {
            BotCommand::Start if authorized => {
                tracing::info!("user {} ({chat}) started the bot", message.sender_name);
                self.send(OutgoingMessage::html(chat, welcome_text(&message.sender_name)))
                    .await;
                self.send_menu(chat).await;
            }
            BotCommand::Menu if authorized => self.send_menu(chat).await,
            BotCommand::Report(kind) if authorized => {
                self.pipeline.run_interactive(kind, chat).await;
                self.send_menu(chat).await;
            }
            _ => {
                tracing::info!("unrecognized input from {chat}: {:?}", message.text);
                self.send(
                    OutgoingMessage::html(chat, NOT_UNDERSTOOD).replying_to(message.message_id),
                )
                .await;
                if authorized {
                    self.send_menu(chat).await;
                } else {
                    self.send(OutgoingMessage::html(chat, NOT_AUTHORIZED)).await;
                }
            }
        }
    }

    /// Long-poll Telegram and handle messages one at a time. Never returns.
    pub async fn run(self, client: TelegramClient) {
        tracing::info!("bot running");
        let mut offset = 0;

        loop {
            match client.get_updates(offset, LONG_POLL).await {
                Ok(updates) => {
                    offset = updates.next_offset(offset);
                    for message in &updates.messages {
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("polling Telegram failed: {e}");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}
