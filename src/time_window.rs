use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::format_datetime_for_api;

/// 表示範囲の選択肢
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RangeSelection {
    /// 今日と今後三日間
    #[default]
    Current,
    /// 今後七日間
    Week,
    /// 今後三十日間
    Month,
}

impl RangeSelection {
    pub const ALL: [RangeSelection; 3] = [
        RangeSelection::Current,
        RangeSelection::Week,
        RangeSelection::Month,
    ];

    pub fn days(self) -> i64 {
        match self {
            RangeSelection::Current => 3,
            RangeSelection::Week => 7,
            RangeSelection::Month => 30,
        }
    }

    /// 画面表示用のラベル
    pub fn label(self) -> &'static str {
        match self {
            RangeSelection::Current => "当前行事历 (今天和未来三天)",
            RangeSelection::Week => "当周行事历 (未来七天)",
            RangeSelection::Month => "当月行事历 (未来30天)",
        }
    }
}

/// 半開区間 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[cfg(test)]
    fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// APIクエリ用 (timeMin, timeMax)
    pub fn to_query(&self) -> (String, String) {
        (
            format_datetime_for_api(self.start),
            format_datetime_for_api(self.end),
        )
    }
}

/// 選択肢と現在時刻から表示範囲を決定する
pub fn resolve(selection: RangeSelection, now: DateTime<Utc>) -> TimeRange {
    TimeRange {
        start: now,
        end: now + Duration::days(selection.days()),
    }
}
