//! Fixed daily schedule and the polling loop that drives it.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::{sync::Arc, time::Duration};

use crate::{model::ReportKind, pipeline::Pipeline};

/// Half-hour marks that get the detailed report instead of the summary.
pub const DETAIL_TIMES: [(u32, u32); 5] = [(5, 58), (11, 58), (14, 58), (17, 58), (21, 58)];

/// Minutes past the hour at which updates run.
pub const UPDATE_MINUTES: [u32; 2] = [28, 58];

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub at: NaiveTime,
    pub kind: ReportKind,
}

/// The 48 daily entries: every `HH:28` and `HH:58`, details at [`DETAIL_TIMES`].
pub fn schedule_table() -> Vec<ScheduleEntry> {
    (0..24)
        .flat_map(|hour| UPDATE_MINUTES.iter().map(move |&minute| (hour, minute)))
        .filter_map(|(hour, minute)| {
            let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
            let kind = if DETAIL_TIMES.contains(&(hour, minute)) {
                ReportKind::Details
            } else {
                ReportKind::Summary
            };
            Some(ScheduleEntry { at, kind })
        })
        .collect()
}

fn next_occurrence(at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Next run time of every entry.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    entries: Vec<(ScheduleEntry, NaiveDateTime)>,
}

impl ScheduleState {
    pub fn new(table: Vec<ScheduleEntry>, now: NaiveDateTime) -> Self {
        let entries = table
            .into_iter()
            .map(|entry| (entry, next_occurrence(entry.at, now)))
            .collect();
        Self { entries }
    }

    /// Kind to run if any entry fell due by `now`; fired entries move to
    /// their next day. When several fell due in one tick a single run is
    /// made, details taking precedence.
    pub fn due(&mut self, now: NaiveDateTime) -> Option<ReportKind> {
        let mut due = None;
        for (entry, next) in &mut self.entries {
            if *next > now {
                continue;
            }
            *next = next_occurrence(entry.at, now);
            due = match (due, entry.kind) {
                (Some(ReportKind::Details), _) | (_, ReportKind::Details) => Some(ReportKind::Details),
                _ => Some(ReportKind::Summary),
            };
        }
        due
    }

    pub fn next_run(&self) -> Option<(NaiveDateTime, ReportKind)> {
        self.entries
            .iter()
            .min_by_key(|(_, next)| *next)
            .map(|(entry, next)| (*next, entry.kind))
    }
}

/// Runs one detailed update at start, then polls the schedule.
#[derive(Debug)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    table: Vec<ScheduleEntry>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            table: schedule_table(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Never returns. Each run is awaited before the next poll, so scheduled
    /// runs cannot overlap.
    pub async fn run(self) {
        tracing::info!("running startup weather update");
        self.pipeline.run_update(ReportKind::Details).await;

        let mut state = ScheduleState::new(self.table, Local::now().naive_local());
        if let Some((at, kind)) = state.next_run() {
            tracing::info!("next scheduled {kind} update at {at}");
        }

        loop {
            tokio::time::sleep(self.poll_interval).await;

            if let Some(kind) = state.due(Local::now().naive_local()) {
                let outcome = self.pipeline.run_update(kind).await;
                if outcome.is_failure() {
                    tracing::warn!("scheduled {kind} update failed");
                }
                tracing::info!("-----------------------------------------------------------");
            }
        }
    }
}
