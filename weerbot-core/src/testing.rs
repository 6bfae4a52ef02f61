//! In-memory stand-ins for the pipeline's collaborators.

use async_trait::async_trait;
use std::{
    collections::{HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    error::{RelayError, SinkError},
    model::{ChatId, Coordinates, ErrorPayload, FetchedWeather},
    report,
    snapshot::Relay,
    telegram::{MessageSink, OutgoingMessage},
    uv::{ApiKeySlot, UvOutcome, UvSource},
    weather::WeatherSource,
};

#[derive(Debug, Default)]
pub struct FakeSink {
    sent: Mutex<Vec<OutgoingMessage>>,
    failing: HashSet<ChatId>,
}

impl FakeSink {
    pub fn failing_for(chats: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            sent: Mutex::default(),
            failing: chats.into_iter().collect(),
        }
    }

    /// Messages that were accepted, in send order.
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn chats(&self) -> Vec<ChatId> {
        self.messages().iter().map(|m| m.chat).collect()
    }
}

#[async_trait]
impl MessageSink for FakeSink {
    async fn send(&self, message: OutgoingMessage) -> Result<(), SinkError> {
        if self.failing.contains(&message.chat) {
            return Err(SinkError::Rejected {
                chat: message.chat,
                description: "Forbidden: bot was blocked by the user".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeWeather {
    results: Mutex<VecDeque<Result<FetchedWeather, ErrorPayload>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWeather {
    pub fn new(results: impl IntoIterator<Item = Result<FetchedWeather, ErrorPayload>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new([Ok(fetched())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch_weather(&self) -> Result<FetchedWeather, ErrorPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = {
            let mut results = self.results.lock().unwrap();
            match results.len() {
                0 => Err(ErrorPayload::new("exhausted", "no more fake results")),
                1 => results[0].clone(),
                _ => results.pop_front().unwrap_or_else(|| Ok(fetched())),
            }
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug)]
pub struct FakeUv(pub UvOutcome);

impl FakeUv {
    pub fn fresh() -> Self {
        FakeUv(UvOutcome::Fresh {
            reading: report::tests::reading(),
            key: ApiKeySlot::Primary,
        })
    }
}

#[async_trait]
impl UvSource for FakeUv {
    async fn fetch_uv(&self, _at: Coordinates) -> UvOutcome {
        self.0.clone()
    }
}

#[derive(Debug, Default)]
pub struct FakeRelay {
    pub files: Mutex<Vec<PathBuf>>,
    pub fail_with: Option<String>,
}

#[async_trait]
impl Relay for FakeRelay {
    async fn relay(&self, file: &Path) -> Result<(), RelayError> {
        self.files.lock().unwrap().push(file.to_path_buf());
        match &self.fail_with {
            Some(msg) => Err(RelayError::Output(msg.clone())),
            None => Ok(()),
        }
    }
}

pub fn fetched() -> FetchedWeather {
    FetchedWeather {
        snapshot: report::tests::snapshot(),
        raw: serde_json::json!({ "liveweer": [{ "temp": "14.2", "image": "bewolkt" }] }),
    }
}
