use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::calendar::CalendarSource;
use crate::classifier::ReminderClassifier;
use crate::config::GeneralConfig;
use crate::error::{AppError, ReminderError};
use crate::event::{AugmentedEvent, EventIssue, RawEvent, NO_DESCRIPTION, NO_LOCATION};
use crate::formatter::EventTimeFormatter;
use crate::reminder::ReminderGenerator;
use crate::time_window::{self, RangeSelection, TimeRange};

/// 時刻が整形できず生の値も無い場合の表示
pub const UNKNOWN_TIME: &str = "时间未知";

/// 一回の描画で表示層に渡す内容
#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    pub selection: RangeSelection,
    pub calendar_id: String,
    pub range: TimeRange,
    pub events: Vec<AugmentedEvent>,
    pub no_events: bool,
}

/// イベント一覧の整形・分類・リマインダー付与を行う
pub struct EventPipeline {
    classifier: ReminderClassifier,
    formatter: EventTimeFormatter,
    generator: Arc<dyn ReminderGenerator>,
    concurrency: usize,
}

impl EventPipeline {
    pub fn new(
        classifier: ReminderClassifier,
        formatter: EventTimeFormatter,
        generator: Arc<dyn ReminderGenerator>,
    ) -> Self {
        Self {
            classifier,
            formatter,
            generator,
            concurrency: 4,
        }
    }

    pub fn from_config(
        general: &GeneralConfig,
        generator: Arc<dyn ReminderGenerator>,
    ) -> Result<Self, AppError> {
        Ok(Self::new(
            ReminderClassifier::new(general.reminder_keywords.iter().cloned()),
            EventTimeFormatter::new(general.display_tz()?),
            generator,
        )
        .with_concurrency(general.reminder_concurrency))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 入力順を保ったまま、イベントごとに一件の AugmentedEvent を返す
    ///
    /// 対象イベントのリマインダー生成は並行に走らせ、完了順に関係なく
    /// 入力位置をキーに集めてから元の順序で組み立てる。
    pub async fn run(&self, events: Vec<RawEvent>) -> Vec<AugmentedEvent> {
        let qualifying: Vec<bool> = events
            .iter()
            .map(|event| self.classifier.qualifies(&event.summary))
            .collect();

        self.generator.retain(&events).await;

        let requested = qualifying.iter().filter(|q| **q).count();
        if requested > 0 {
            info!(
                "Generating {} reminder(s) for {} event(s)",
                requested,
                events.len()
            );
        }

        let mut reminders: HashMap<usize, Result<String, ReminderError>> = stream::iter(
            events
                .iter()
                .enumerate()
                .filter(|(index, _)| qualifying[*index]),
        )
        .map(|(index, event)| async move { (index, self.generator.generate(event).await) })
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        events
            .into_iter()
            .zip(qualifying)
            .enumerate()
            .map(|(index, (event, qualifies))| {
                self.augment(event, qualifies, reminders.remove(&index))
            })
            .collect()
    }

    fn augment(
        &self,
        event: RawEvent,
        qualifies: bool,
        reminder: Option<Result<String, ReminderError>>,
    ) -> AugmentedEvent {
        let mut issues = Vec::new();

        let formatted_time = match self.formatter.format(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not format time of '{}': {}", event.summary, e);
                issues.push(EventIssue::Format(e.to_string()));
                event.start.raw().unwrap_or(UNKNOWN_TIME).to_string()
            }
        };

        let reminder = match reminder {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!("Reminder for '{}' unavailable: {}", event.summary, e);
                issues.push(EventIssue::Reminder(e.to_string()));
                String::new()
            }
            None => String::new(),
        };

        AugmentedEvent {
            formatted_time,
            description: event
                .description
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            location: event.location.unwrap_or_else(|| NO_LOCATION.to_string()),
            summary: event.summary,
            qualifies,
            reminder,
            issues,
        }
    }

    /// 範囲を決めてイベントを取得し、パイプラインを通した結果を返す
    ///
    /// 取得に失敗した場合はイベントを一件も作らずにエラーを返す。
    pub async fn present(
        &self,
        source: &dyn CalendarSource,
        calendar_id: &str,
        selection: RangeSelection,
        now: DateTime<Utc>,
    ) -> Result<CalendarView, AppError> {
        let range = time_window::resolve(selection, now);
        debug!("Resolved {:?} to {} .. {}", selection, range.start, range.end);

        let raw_events = source.list_events(calendar_id, &range).await?;
        let events = self.run(raw_events).await;

        Ok(CalendarView {
            selection,
            calendar_id: calendar_id.to_string(),
            range,
            no_events: events.is_empty(),
            events,
        })
    }
}
