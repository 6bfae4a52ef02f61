use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    config::Config,
    error::NotifyError,
    model::{ChatId, ReportKind},
    telegram::{MessageSink, OutgoingMessage},
};

/// Line-delimited chat ids, one file per report kind. Maintained outside
/// this crate; read fresh on every delivery.
#[derive(Debug, Clone)]
pub struct RecipientFiles {
    pub summary: PathBuf,
    pub details: PathBuf,
}

impl RecipientFiles {
    pub fn from_config(config: &Config) -> Self {
        Self {
            summary: config.recipients_path(ReportKind::Summary).to_path_buf(),
            details: config.recipients_path(ReportKind::Details).to_path_buf(),
        }
    }

    pub fn path(&self, kind: ReportKind) -> &Path {
        match kind {
            ReportKind::Summary => &self.summary,
            ReportKind::Details => &self.details,
        }
    }

    /// Create empty lists (and their directories) where none exist yet.
    pub async fn ensure_files(&self) -> std::io::Result<()> {
        for kind in ReportKind::all() {
            let path = self.path(*kind);
            if tokio::fs::try_exists(path).await? {
                continue;
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, "").await?;
            tracing::info!("created empty recipient list {}", path.display());
        }
        Ok(())
    }

    pub async fn read(&self, kind: ReportKind) -> Result<Vec<ChatId>, NotifyError> {
        let path = self.path(kind);
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| NotifyError::Recipients {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(parse_recipients(&contents))
    }
}

/// Parse a recipient list. Blank lines are skipped, malformed lines logged.
pub fn parse_recipients(contents: &str) -> Vec<ChatId> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<ChatId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("ignoring malformed recipient line {line:?}");
                None
            }
        })
        .collect()
}

/// Outcome of one delivery round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: Vec<ChatId>,
    pub failed: Vec<ChatId>,
    /// Listed in the file but not on the allow-list.
    pub skipped: Vec<ChatId>,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    files: RecipientFiles,
    authorized: HashSet<ChatId>,
    sink: Arc<dyn MessageSink>,
}

impl Notifier {
    pub fn new(
        files: RecipientFiles,
        authorized: impl IntoIterator<Item = ChatId>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            files,
            authorized: authorized.into_iter().collect(),
            sink,
        }
    }

    pub fn files(&self) -> &RecipientFiles {
        &self.files
    }

    /// Send `text` to every authorized recipient of `kind`. A failed send is
    /// logged and does not stop the remaining sends.
    pub async fn notify(&self, kind: ReportKind, text: &str) -> Result<Delivery, NotifyError> {
        tracing::debug!("sending weather {kind} message");

        let mut seen = HashSet::new();
        let mut delivery = Delivery::default();

        for chat in self.files.read(kind).await? {
            if !seen.insert(chat) {
                continue;
            }
            if !self.authorized.contains(&chat) {
                tracing::warn!("recipient {chat} is not authorized, skipping");
                delivery.skipped.push(chat);
                continue;
            }
            match self.sink.send(OutgoingMessage::html(chat, text)).await {
                Ok(()) => delivery.delivered.push(chat),
                Err(e) => {
                    tracing::error!("failed to send weather {kind} message to {chat}: {e}");
                    delivery.failed.push(chat);
                }
            }
        }

        tracing::info!(
            "weather {kind} message delivered to {} recipient(s), {} failed",
            delivery.delivered.len(),
            delivery.failed.len()
        );
        Ok(delivery)
    }
}
