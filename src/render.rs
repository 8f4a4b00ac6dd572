use anyhow::{Context, Result};
use chrono_tz::Tz;
use console::style;
use std::fmt::Write;

use crate::pipeline::CalendarView;

/// 端末表示用のテキストを組み立てる
pub fn render_text(view: &CalendarView, display_tz: Tz) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style("Google Calendar Event Viewer").bold().underlined());
    let _ = writeln!(
        out,
        "{} | {} 至 {}",
        style(view.selection.label()).cyan(),
        view.range.start.with_timezone(&display_tz).format("%Y-%m-%d %H:%M"),
        view.range.end.with_timezone(&display_tz).format("%Y-%m-%d %H:%M"),
    );
    let _ = writeln!(out);

    if view.no_events {
        let _ = writeln!(out, "没有找到事件。");
        return out;
    }

    for event in &view.events {
        let _ = writeln!(out, "{}: {}", style(&event.formatted_time).dim(), style(&event.summary).bold());
        let _ = writeln!(out, "    地点: {}", event.location);
        let _ = writeln!(out, "    描述: {}", event.description);

        if event.qualifies {
            let _ = writeln!(out, "    {}", style("特别提醒!").red().bold());
            if !event.reminder.is_empty() {
                let _ = writeln!(out, "    AI 提醒: {}", style(&event.reminder).green());
            }
        }
    }

    out
}

/// JSON形式で出力する
pub fn render_json(view: &CalendarView) -> Result<String> {
    serde_json::to_string_pretty(view).context("Failed to serialize calendar view")
}
