use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::error::FormatError;
use crate::event::{EventTime, RawEvent};

/// イベント時刻を表示用文字列に整形する
///
/// 時刻付きイベントは開始・終了とも同じ表示タイムゾーンに変換してから整形する。
#[derive(Debug, Clone, Copy)]
pub struct EventTimeFormatter {
    display_tz: Tz,
}

impl Default for EventTimeFormatter {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl EventTimeFormatter {
    pub fn new(display_tz: Tz) -> Self {
        Self { display_tz }
    }

    pub fn format(&self, event: &RawEvent) -> Result<String, FormatError> {
        match (&event.start, &event.end) {
            (
                EventTime { date_time: Some(start), .. },
                EventTime { date_time: Some(end), .. },
            ) => {
                let start = parse_instant(start)?.with_timezone(&self.display_tz);
                let end = parse_instant(end)?.with_timezone(&self.display_tz);
                Ok(format!(
                    "{} 至 {}",
                    start.format("%Y-%m-%d %H:%M"),
                    end.format("%H:%M")
                ))
            }
            (EventTime { date_time: Some(_), .. }, _) | (_, EventTime { date_time: Some(_), .. }) => {
                Err(FormatError::MixedKinds)
            }
            (EventTime { date: Some(date), .. }, _) => {
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|source| {
                    FormatError::InvalidDate {
                        value: date.clone(),
                        source,
                    }
                })?;
                Ok(format!("{} (全天)", date.format("%Y-%m-%d")))
            }
            _ => Err(FormatError::Missing("start")),
        }
    }
}

fn parse_instant(value: &str) -> Result<DateTime<chrono::FixedOffset>, FormatError> {
    DateTime::parse_from_rfc3339(value).map_err(|source| FormatError::InvalidDateTime {
        value: value.to_string(),
        source,
    })
}
