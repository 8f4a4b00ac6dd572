use serde::{Deserialize, Serialize};

/// 説明が無い場合の表示
pub const NO_DESCRIPTION: &str = "无描述";

/// 場所が無い場合の表示
pub const NO_LOCATION: &str = "无地点";

/// Google Calendar APIのイベント時刻
///
/// 時刻付きイベントは `dateTime`、終日イベントは `date` のみを持つ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn timed(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            ..Default::default()
        }
    }

    pub fn whole_day(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Default::default()
        }
    }

    /// 生の値（dateTimeがあればそれ、無ければdate）
    pub fn raw(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

/// カレンダーから取得したままのイベント
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub start: EventTime,

    #[serde(default)]
    pub end: EventTime,
}

impl RawEvent {
    /// リマインダーキャッシュのキー
    ///
    /// タイトルや開始時刻が変わった場合は別のイベントとして扱う。
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.id.as_deref().unwrap_or(""),
            self.summary,
            self.start.raw().unwrap_or("")
        )
    }
}

/// イベント一件に起きた部分的な失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum EventIssue {
    Format(String),
    Reminder(String),
}

/// 表示用に加工済みのイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AugmentedEvent {
    pub formatted_time: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub qualifies: bool,
    pub reminder: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<EventIssue>,
}
