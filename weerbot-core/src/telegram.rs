//! Minimal Telegram Bot API client: `sendMessage` and `getUpdates`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug},
    time::Duration,
};

use crate::{config::Config, error::SinkError, model::ChatId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
    Markdown,
}

/// A message ready to be handed to the messaging sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat: ChatId,
    pub text: String,
    pub parse_mode: ParseMode,
    /// One-time reply keyboard, one button per entry.
    pub keyboard: Option<Vec<String>>,
    pub reply_to: Option<i64>,
}

impl OutgoingMessage {
    pub fn html(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat,
            text: text.into(),
            parse_mode: ParseMode::Html,
            keyboard: None,
            reply_to: None,
        }
    }

    /// JSON diagnostic wrapped in a Markdown code block.
    pub fn code_block(chat: ChatId, body: &str) -> Self {
        Self {
            chat,
            text: format!("```\n{body}\n```"),
            parse_mode: ParseMode::Markdown,
            keyboard: None,
            reply_to: None,
        }
    }

    pub fn with_keyboard<I, S>(mut self, buttons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyboard = Some(buttons.into_iter().map(Into::into).collect());
        self
    }

    pub fn replying_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync + Debug {
    async fn send(&self, message: OutgoingMessage) -> Result<(), SinkError>;
}

/// One `getUpdates` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Updates {
    /// Highest update id in the batch, text or not. The next poll must ask
    /// for the update after it or Telegram redelivers the batch.
    pub last_update_id: Option<i64>,
    pub messages: Vec<IncomingMessage>,
}

impl Updates {
    /// Offset for the next poll.
    pub fn next_offset(&self, current: i64) -> i64 {
        self.last_update_id.map_or(current, |id| current.max(id + 1))
    }
}

/// Incoming text message from `getUpdates`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub message_id: i64,
    pub chat: ChatId,
    pub sender_name: String,
    pub text: String,
}

#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    api_base: String,
    http: Client,
}

impl Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: String, api_base: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.telegram.token.clone(),
            config.telegram.api_base.clone(),
            config.http_timeout(),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Long-poll for new messages. `timeout` is the server-side wait.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Updates, SinkError> {
        let secs = timeout.as_secs();
        let res: ApiResponse<Vec<TgUpdate>> = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(timeout + Duration::from_secs(10))
            .send()
            .await?
            .json()
            .await?;

        if !res.ok {
            return Err(SinkError::Api {
                description: res.description.unwrap_or_default(),
            });
        }

        let updates = res.result.unwrap_or_default();
        let last_update_id = updates.iter().map(|u| u.update_id).max();
        let messages = updates
            .into_iter()
            .filter_map(|u| {
                let message = u.message?;
                Some(IncomingMessage {
                    update_id: u.update_id,
                    message_id: message.message_id,
                    chat: ChatId(message.chat.id),
                    sender_name: message.from.map(|f| f.first_name).unwrap_or_default(),
                    text: message.text?,
                })
            })
            .collect();

        Ok(Updates {
            last_update_id,
            messages,
        })
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send(&self, message: OutgoingMessage) -> Result<(), SinkError> {
        let chat = message.chat;
        let body = SendMessage::from(&message);

        let res: ApiResponse<serde_json::Value> = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if res.ok {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                chat,
                description: res.description.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: ParseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

impl<'a> From<&'a OutgoingMessage> for SendMessage<'a> {
    fn from(m: &'a OutgoingMessage) -> Self {
        SendMessage {
            chat_id: m.chat.0,
            text: &m.text,
            parse_mode: m.parse_mode,
            reply_markup: m.keyboard.as_ref().map(|buttons| ReplyKeyboard::two_per_row(buttons)),
            reply_to_message_id: m.reply_to,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    one_time_keyboard: bool,
    resize_keyboard: bool,
}

impl ReplyKeyboard {
    fn two_per_row(buttons: &[String]) -> Self {
        let keyboard = buttons
            .chunks(2)
            .map(|row| {
                row.iter()
                    .map(|text| KeyboardButton { text: text.clone() })
                    .collect()
            })
            .collect();
        Self {
            keyboard,
            one_time_keyboard: true,
            resize_keyboard: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    first_name: String,
}
