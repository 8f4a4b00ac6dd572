use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gcal_reminder_rs::calendar::CalendarSource;
use gcal_reminder_rs::classifier::ReminderClassifier;
use gcal_reminder_rs::error::{AppError, ReminderError};
use gcal_reminder_rs::event::{EventIssue, EventTime, RawEvent};
use gcal_reminder_rs::formatter::EventTimeFormatter;
use gcal_reminder_rs::pipeline::EventPipeline;
use gcal_reminder_rs::reminder::ReminderGenerator;
use gcal_reminder_rs::time_window::{RangeSelection, TimeRange};

/// Deterministic generator that fails for summaries listed in `failing`
#[derive(Default)]
struct ScriptedGenerator {
    failing: Vec<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl ReminderGenerator for ScriptedGenerator {
    async fn generate(&self, event: &RawEvent) -> Result<String, ReminderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Longer summaries sleep longer, so completion order differs from input order
        let delay = 5 * event.summary.chars().count() as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.failing.iter().any(|f| f == &event.summary) {
            return Err(ReminderError::Other("service unavailable".into()));
        }
        Ok(format!("别忘了「{}」！", event.summary))
    }
}

/// In-memory calendar returning a fixed list
struct StaticCalendar(Vec<RawEvent>);

#[async_trait]
impl CalendarSource for StaticCalendar {
    async fn list_events(&self, _calendar_id: &str, _range: &TimeRange) -> Result<Vec<RawEvent>, AppError> {
        Ok(self.0.clone())
    }
}

fn pipeline(generator: Arc<ScriptedGenerator>) -> EventPipeline {
    EventPipeline::new(
        ReminderClassifier::default(),
        EventTimeFormatter::default(),
        generator,
    )
}

fn whole_day(summary: &str, date: &str, next: &str) -> RawEvent {
    RawEvent {
        summary: summary.to_string(),
        start: EventTime::whole_day(date),
        end: EventTime::whole_day(next),
        ..Default::default()
    }
}

fn timed(summary: &str, start: &str, end: &str) -> RawEvent {
    RawEvent {
        summary: summary.to_string(),
        start: EventTime::timed(start),
        end: EventTime::timed(end),
        ..Default::default()
    }
}

#[tokio::test]
async fn whole_day_family_event_gets_reminder() {
    let generator = Arc::new(ScriptedGenerator::default());
    let out = pipeline(generator.clone())
        .run(vec![whole_day("家人聚會", "2024-06-01", "2024-06-02")])
        .await;

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].formatted_time, "2024-06-01 (全天)");
    assert!(out[0].qualifies);
    assert!(!out[0].reminder.is_empty());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timed_event_without_keyword_has_no_reminder() {
    let generator = Arc::new(ScriptedGenerator::default());
    let out = pipeline(generator.clone())
        .run(vec![timed("Team sync", "2024-06-01T09:00:00Z", "2024-06-01T10:00:00Z")])
        .await;

    assert_eq!(out[0].formatted_time, "2024-06-01 09:00 至 10:00");
    assert_eq!(out[0].reminder, "");
    assert!(!out[0].qualifies);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_input_signals_no_events() {
    let generator = Arc::new(ScriptedGenerator::default());
    let pipeline = pipeline(generator);

    assert!(pipeline.run(Vec::new()).await.is_empty());

    let view = pipeline
        .present(&StaticCalendar(Vec::new()), "primary", RangeSelection::Week, Utc::now())
        .await
        .unwrap();
    assert!(view.no_events);
    assert!(view.events.is_empty());
}

#[tokio::test]
async fn one_failed_generation_degrades_only_that_event() {
    let generator = Arc::new(ScriptedGenerator {
        failing: vec!["爸爸生日".to_string()],
        ..Default::default()
    });
    let events = vec![
        whole_day("家人聚會", "2024-06-01", "2024-06-02"),
        whole_day("爸爸生日", "2024-06-03", "2024-06-04"),
        timed("牙科看診", "2024-06-05T02:00:00Z", "2024-06-05T03:00:00Z"),
    ];

    let out = pipeline(generator.clone()).run(events).await;

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].summary, "家人聚會");
    assert_eq!(out[1].summary, "爸爸生日");
    assert_eq!(out[2].summary, "牙科看診");

    assert_eq!(out[0].reminder, "别忘了「家人聚會」！");
    assert_eq!(out[1].reminder, "");
    assert!(matches!(out[1].issues.as_slice(), [EventIssue::Reminder(_)]));
    assert_eq!(out[2].reminder, "别忘了「牙科看診」！");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn order_is_preserved_for_mixed_inputs() {
    let summaries = [
        "Standup",
        "結婚紀念日晚餐",
        "家人",
        "Code review",
        "外婆九十大壽生日宴",
        "看診",
        "Gym",
    ];
    let events: Vec<RawEvent> = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let day = format!("2024-06-{:02}", i + 1);
            let next = format!("2024-06-{:02}", i + 2);
            whole_day(s, &day, &next)
        })
        .collect();

    let out = pipeline(Arc::new(ScriptedGenerator::default()))
        .with_concurrency(8)
        .run(events)
        .await;

    let got: Vec<&str> = out.iter().map(|e| e.summary.as_str()).collect();
    assert_eq!(got, summaries);
    let flags: Vec<bool> = out.iter().map(|e| e.qualifies).collect();
    assert_eq!(flags, [false, true, true, false, true, true, false]);
    for event in &out {
        assert_eq!(event.qualifies, !event.reminder.is_empty());
    }
}

#[tokio::test]
async fn rerunning_with_deterministic_generator_is_idempotent() {
    let events = vec![
        whole_day("家人聚會", "2024-06-01", "2024-06-02"),
        timed("Team sync", "2024-06-01T09:00:00Z", "2024-06-01T10:00:00Z"),
    ];
    let pipeline = pipeline(Arc::new(ScriptedGenerator::default()));

    let first = pipeline.run(events.clone()).await;
    let second = pipeline.run(events).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn present_uses_the_selected_window() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let view = pipeline(Arc::new(ScriptedGenerator::default()))
        .present(
            &StaticCalendar(vec![whole_day("生日", "2024-06-02", "2024-06-03")]),
            "family@example.com",
            RangeSelection::Month,
            now,
        )
        .await
        .unwrap();

    assert_eq!(view.range.start, now);
    assert_eq!(view.range.end, Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap());
    assert_eq!(view.calendar_id, "family@example.com");
    assert!(!view.no_events);
}
