//! The update pipeline: fetch, render, publish, deliver.
//!
//! Scheduled and interactive runs share one [`Pipeline`]; a mutex makes sure
//! only one of them touches the snapshot file, the UV cache and the remote
//! mirror at a time.

use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    config::Config,
    model::{ChatId, Coordinates, ErrorPayload, ReportKind},
    notify::{Delivery, Notifier, RecipientFiles},
    report,
    snapshot::{Relay, ScpRelay, SnapshotPublisher},
    telegram::{MessageSink, OutgoingMessage, TelegramClient},
    uv::{OpenUvClient, UvOutcome, UvSource},
    weather::{WeatherSource, WeerliveClient},
};

pub const INTERACTIVE_FAILURE_TEXT: &str =
    "Sorry, het weer kon nu niet worden opgehaald. Probeer het later opnieuw.";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Report delivered to the recipient list of `kind`.
    Delivered {
        kind: ReportKind,
        delivery: Delivery,
        published: bool,
    },
    /// Report sent to the chat that asked for it.
    Replied {
        kind: ReportKind,
        chat: ChatId,
        published: bool,
    },
    /// Nothing was stored or delivered; the operator got the payload.
    Failed(ErrorPayload),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

/// A fully rendered report plus the raw weather payload behind it.
#[derive(Debug, Clone)]
pub struct PreparedReport {
    pub kind: ReportKind,
    pub text: String,
    pub raw: Value,
}

#[derive(Debug)]
pub struct Pipeline {
    weather: Arc<dyn WeatherSource>,
    uv: Arc<dyn UvSource>,
    coordinates: Coordinates,
    publisher: SnapshotPublisher,
    notifier: Notifier,
    sink: Arc<dyn MessageSink>,
    operator: ChatId,
    report_relay_errors: bool,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        uv: Arc<dyn UvSource>,
        coordinates: Coordinates,
        publisher: SnapshotPublisher,
        notifier: Notifier,
        sink: Arc<dyn MessageSink>,
        operator: ChatId,
    ) -> Self {
        Self {
            weather,
            uv,
            coordinates,
            publisher,
            notifier,
            sink,
            operator,
            report_relay_errors: true,
            running: Mutex::new(()),
        }
    }

    /// Whether relay failures are forwarded to the operator chat.
    pub fn report_relay_errors(mut self, enabled: bool) -> Self {
        self.report_relay_errors = enabled;
        self
    }

    /// Wire up the production clients from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let telegram = TelegramClient::from_config(config)
            .context("Failed to build Telegram client")?;
        let sink: Arc<dyn MessageSink> = Arc::new(telegram);

        let weather = WeerliveClient::from_config(config)
            .context("Failed to build weather API client")?;
        let uv = OpenUvClient::from_config(config).context("Failed to build UV API client")?;

        let relay: Option<Arc<dyn Relay>> = match &config.relay {
            Some(relay_cfg) => {
                ScpRelay::from_config(relay_cfg)?.map(|r| Arc::new(r) as Arc<dyn Relay>)
            }
            None => None,
        };
        let report_relay_errors = config.relay.as_ref().is_some_and(|r| r.notify_operator);

        let publisher = SnapshotPublisher::new(&config.storage.snapshot_path, relay);
        let notifier = Notifier::new(
            RecipientFiles::from_config(config),
            config.telegram.authorized_users.iter().copied(),
            sink.clone(),
        );

        Ok(Self::new(
            Arc::new(weather),
            Arc::new(uv),
            config.coordinates()?,
            publisher,
            notifier,
            sink,
            config.telegram.operator_chat_id,
        )
        .report_relay_errors(report_relay_errors))
    }

    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Fetch weather and UV data and render the report for `kind`.
    ///
    /// Does not store, relay or deliver anything apart from refreshing the UV
    /// cache on a live lookup.
    pub async fn prepare(&self, kind: ReportKind) -> Result<PreparedReport, ErrorPayload> {
        let fetched = self.weather.fetch_weather().await?;

        let outcome = self.uv.fetch_uv(self.coordinates).await;
        match &outcome {
            UvOutcome::Fresh { key, .. } => tracing::debug!("UV data fetched with the {key} key"),
            UvOutcome::Degraded { reason, .. } => tracing::warn!("using cached UV data: {reason}"),
            UvOutcome::Failed { reason } => tracing::error!("no UV data available: {reason}"),
        }
        let reading = outcome.into_result()?;

        Ok(PreparedReport {
            kind,
            text: report::format_report(kind, &fetched.snapshot, &reading),
            raw: fetched.raw,
        })
    }

    /// Render a report without storing or delivering it.
    pub async fn preview(&self, kind: ReportKind) -> Result<String, ErrorPayload> {
        let _guard = self.running.lock().await;
        self.prepare(kind).await.map(|r| r.text)
    }

    /// Scheduled run: deliver `kind` to its recipient list.
    pub async fn run_update(&self, kind: ReportKind) -> RunOutcome {
        let _guard = self.running.lock().await;
        tracing::debug!("weather update {kind} started");

        let prepared = match self.prepare(kind).await {
            Ok(prepared) => prepared,
            Err(payload) => {
                tracing::error!(
                    "weather data could not be fetched, aborting storing and sending: {payload}"
                );
                self.report_failure(&payload).await;
                return RunOutcome::Failed(payload);
            }
        };

        tracing::info!("weather data fetched, storing and sending");
        let published = self.publish(&prepared.raw).await;

        let outcome = match self.notifier.notify(kind, &prepared.text).await {
            Ok(delivery) => RunOutcome::Delivered {
                kind,
                delivery,
                published,
            },
            Err(e) => {
                tracing::error!("weather {kind} message not delivered: {e}");
                let payload = ErrorPayload::new("Error sending weather message", e.to_string());
                self.report_failure(&payload).await;
                RunOutcome::Failed(payload)
            }
        };

        tracing::debug!("weather update {kind} ended");
        outcome
    }

    /// On-demand run for a single chat.
    pub async fn run_interactive(&self, kind: ReportKind, chat: ChatId) -> RunOutcome {
        let _guard = self.running.lock().await;
        tracing::debug!("weather {kind} requested by {chat}");

        let prepared = match self.prepare(kind).await {
            Ok(prepared) => prepared,
            Err(payload) => {
                tracing::error!("weather {kind} request from {chat} failed: {payload}");
                self.reply(OutgoingMessage::html(chat, INTERACTIVE_FAILURE_TEXT)).await;
                self.report_failure(&payload).await;
                return RunOutcome::Failed(payload);
            }
        };

        self.reply(OutgoingMessage::html(chat, prepared.text)).await;
        let published = self.publish(&prepared.raw).await;

        RunOutcome::Replied {
            kind,
            chat,
            published,
        }
    }

    async fn publish(&self, raw: &Value) -> bool {
        match self.publisher.publish(raw).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("error publishing weather snapshot: {e}");
                if self.report_relay_errors {
                    let payload = ErrorPayload::new("Error sending weather data", e.to_string());
                    self.report_failure(&payload).await;
                }
                false
            }
        }
    }

    async fn reply(&self, message: OutgoingMessage) {
        let chat = message.chat;
        if let Err(e) = self.sink.send(message).await {
            tracing::error!("failed to reply to {chat}: {e}");
        }
    }

    /// Send `payload` to the operator as a JSON code block.
    pub async fn report_failure(&self, payload: &ErrorPayload) {
        let message = OutgoingMessage::code_block(self.operator, &payload.to_pretty_json());
        if let Err(e) = self.sink.send(message).await {
            tracing::error!("failed to notify operator {}: {e}", self.operator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        notify::RecipientFiles,
        telegram::ParseMode,
        testing::{FakeRelay, FakeSink, FakeUv, FakeWeather},
    };
    use std::path::Path;
    use tempfile::TempDir;

    const OPERATOR: ChatId = ChatId(1);

    struct Harness {
        _dir: TempDir,
        snapshot: std::path::PathBuf,
        sink: Arc<FakeSink>,
        relay: Arc<FakeRelay>,
        weather: Arc<FakeWeather>,
        pipeline: Pipeline,
    }

    fn harness(weather: FakeWeather, uv: FakeUv, relay: FakeRelay) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("weer_output.json");
        let files = RecipientFiles {
            summary: dir.path().join("users_summary.txt"),
            details: dir.path().join("users_details.txt"),
        };
        std::fs::write(&files.summary, "1\n2\n77\n").unwrap();
        std::fs::write(&files.details, "2\n").unwrap();

        let sink = Arc::new(FakeSink::default());
        let relay = Arc::new(relay);
        let weather = Arc::new(weather);

        let pipeline = Pipeline::new(
            weather.clone(),
            Arc::new(uv),
            Coordinates { lat: 52.1, lon: 5.1 },
            SnapshotPublisher::new(&snapshot, Some(relay.clone() as Arc<dyn Relay>)),
            Notifier::new(files, [ChatId(1), ChatId(2)], sink.clone()),
            sink.clone(),
            OPERATOR,
        );

        Harness {
            _dir: dir,
            snapshot,
            sink,
            relay,
            weather,
            pipeline,
        }
    }

    fn exists(path: &Path) -> bool {
        path.try_exists().unwrap()
    }

    #[tokio::test]
    async fn successful_run_publishes_and_delivers() {
        let h = harness(FakeWeather::ok(), FakeUv::fresh(), FakeRelay::default());

        let outcome = h.pipeline.run_update(ReportKind::Summary).await;

        let RunOutcome::Delivered { delivery, published, .. } = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert!(published);
        assert_eq!(delivery.delivered, vec![ChatId(1), ChatId(2)]);
        assert_eq!(delivery.skipped, vec![ChatId(77)]);

        let stored: Value =
            serde_json::from_str(&std::fs::read_to_string(&h.snapshot).unwrap()).unwrap();
        assert_eq!(stored["liveweer"][0]["temp"], "14.2");
        assert_eq!(h.relay.files.lock().unwrap().len(), 1);

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.parse_mode == ParseMode::Html));
        assert!(messages[0].text.contains("Weer in het kort"));
    }

    #[tokio::test]
    async fn details_run_uses_details_list_and_template() {
        let h = harness(FakeWeather::ok(), FakeUv::fresh(), FakeRelay::default());

        h.pipeline.run_update(ReportKind::Details).await;

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chat, ChatId(2));
        assert!(messages[0].text.contains("<b>Morgen:</b>"));
    }

    #[tokio::test]
    async fn weather_failure_sends_only_operator_diagnostic() {
        let payload = ErrorPayload::new(crate::weather::WEATHER_FETCH_FAILED, "timed out");
        let h = harness(
            FakeWeather::new([Err(payload.clone())]),
            FakeUv::fresh(),
            FakeRelay::default(),
        );

        let outcome = h.pipeline.run_update(ReportKind::Summary).await;

        assert_eq!(outcome, RunOutcome::Failed(payload));
        assert!(!exists(&h.snapshot));
        assert!(h.relay.files.lock().unwrap().is_empty());

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chat, OPERATOR);
        assert_eq!(messages[0].parse_mode, ParseMode::Markdown);
        assert!(messages[0].text.contains("\"Message\": \"timed out\""));
    }

    #[tokio::test]
    async fn uv_failure_aborts_the_whole_run() {
        let h = harness(
            FakeWeather::ok(),
            FakeUv(UvOutcome::Failed {
                reason: "no cached UV data available".into(),
            }),
            FakeRelay::default(),
        );

        let outcome = h.pipeline.run_update(ReportKind::Details).await;

        assert!(outcome.is_failure());
        assert!(!exists(&h.snapshot));
        assert_eq!(h.sink.chats(), vec![OPERATOR]);
    }

    #[tokio::test]
    async fn degraded_uv_still_delivers() {
        let h = harness(
            FakeWeather::ok(),
            FakeUv(UvOutcome::Degraded {
                reading: report::tests::reading(),
                reason: "HTTP 500".into(),
            }),
            FakeRelay::default(),
        );

        let outcome = h.pipeline.run_update(ReportKind::Summary).await;

        assert!(matches!(outcome, RunOutcome::Delivered { .. }));
        assert_eq!(h.sink.chats(), vec![ChatId(1), ChatId(2)]);
    }

    #[tokio::test]
    async fn relay_failure_does_not_block_delivery() {
        let h = harness(
            FakeWeather::ok(),
            FakeUv::fresh(),
            FakeRelay {
                fail_with: Some("Connection refused".into()),
                ..Default::default()
            },
        );

        let outcome = h.pipeline.run_update(ReportKind::Details).await;

        let RunOutcome::Delivered { delivery, published, .. } = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert!(!published);
        assert_eq!(delivery.delivered, vec![ChatId(2)]);
        assert!(exists(&h.snapshot));

        // operator diagnostic first, then the report
        let messages = h.sink.messages();
        assert_eq!(messages[0].chat, OPERATOR);
        assert!(messages[0].text.contains("Connection refused"));
        assert_eq!(messages[1].chat, ChatId(2));
    }

    #[tokio::test]
    async fn interactive_run_replies_to_requester_only() {
        let h = harness(FakeWeather::ok(), FakeUv::fresh(), FakeRelay::default());

        let outcome = h.pipeline.run_interactive(ReportKind::Summary, ChatId(2)).await;

        assert!(matches!(outcome, RunOutcome::Replied { chat: ChatId(2), published: true, .. }));
        assert_eq!(h.sink.chats(), vec![ChatId(2)]);
        assert!(exists(&h.snapshot));
    }

    #[tokio::test]
    async fn interactive_reply_goes_out_before_relay() {
        let h = harness(
            FakeWeather::ok(),
            FakeUv::fresh(),
            FakeRelay {
                fail_with: Some("Connection timed out".into()),
                ..Default::default()
            },
        );

        let outcome = h.pipeline.run_interactive(ReportKind::Summary, ChatId(2)).await;

        assert!(matches!(outcome, RunOutcome::Replied { published: false, .. }));
        assert_eq!(h.relay.files.lock().unwrap().len(), 1);
        // the requester is answered first; the relay diagnostic follows
        let messages = h.sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chat, ChatId(2));
        assert!(messages[0].text.contains("Weer in het kort"));
        assert_eq!(messages[1].chat, OPERATOR);
        assert!(messages[1].text.contains("Connection timed out"));
    }

    #[tokio::test]
    async fn interactive_failure_apologizes_and_alerts_operator() {
        let h = harness(
            FakeWeather::new([Err(ErrorPayload::new("x", "y"))]),
            FakeUv::fresh(),
            FakeRelay::default(),
        );

        let outcome = h.pipeline.run_interactive(ReportKind::Details, ChatId(2)).await;

        assert!(outcome.is_failure());
        let messages = h.sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, INTERACTIVE_FAILURE_TEXT);
        assert_eq!(messages[1].chat, OPERATOR);
        assert!(!exists(&h.snapshot));
    }

    #[tokio::test]
    async fn concurrent_runs_are_serialized() {
        let h = harness(FakeWeather::ok(), FakeUv::fresh(), FakeRelay::default());
        let pipeline = Arc::new(h.pipeline);

        let a = {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run_update(ReportKind::Summary).await })
        };
        let b = {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run_interactive(ReportKind::Details, ChatId(1)).await })
        };

        assert!(!a.await.unwrap().is_failure());
        assert!(!b.await.unwrap().is_failure());
        assert_eq!(h.weather.calls(), 2);
        assert_eq!(h.weather.max_in_flight(), 1);
        assert_eq!(h.relay.files.lock().unwrap().len(), 2);
    }
}
