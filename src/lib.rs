use chrono::{DateTime, Utc};

pub mod calendar;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod formatter;
pub mod pipeline;
pub mod reminder;
pub mod render;
pub mod time_window;
pub mod utils;

/// Google Calendar APIのためのISO 8601形式の日付文字列を生成
pub fn format_datetime_for_api(dt: DateTime<Utc>) -> String {
    // Zを使ってUTC（GMT）であることを示す
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
