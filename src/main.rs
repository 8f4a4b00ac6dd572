use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use gcal_reminder_rs::calendar::{CalendarSource, GoogleCalendarClient};
use gcal_reminder_rs::config::{self as app_config, AppConfig};
use gcal_reminder_rs::pipeline::EventPipeline;
use gcal_reminder_rs::reminder::{CachedReminderGenerator, OpenAiReminderGenerator, ReminderGenerator};
use gcal_reminder_rs::render;
use gcal_reminder_rs::time_window::RangeSelection;

mod wizard;

use wizard::ConfigWizard;

/// Google Calendar event viewer with AI reminders for family, birthdays and appointments
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Path to config file
    #[clap(short, long, value_parser, default_value = "config.toml")]
    config: PathBuf,

    /// Time window to show (defaults to general.range from the config)
    #[clap(short, long, value_enum)]
    range: Option<RangeSelection>,

    /// Calendar ID to show instead of the configured one
    #[clap(long)]
    calendar_id: Option<String>,

    /// Print the result as JSON
    #[clap(long)]
    json: bool,

    /// Re-render periodically until interrupted
    #[clap(short, long)]
    watch: bool,

    /// Run configuration wizard
    #[clap(long)]
    wizard: bool,

    /// Write a sample config file and exit
    #[clap(long)]
    init_config: bool,
}

/// アプリケーションのロギングを初期化
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    info!("gcal_reminder_rs v{} を起動しました", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        app_config::generate_sample_config(&args.config)?;
        info!("Sample config written to {}", args.config.display());
        return Ok(());
    }

    // 設定ウィザードを実行
    if args.wizard {
        info!("Starting configuration wizard");
        return ConfigWizard::new(&args.config).run().await;
    }

    let config_path = app_config::resolve_config_path(&args.config);
    let config = app_config::load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    // 実行全体のエラーは main の戻り値として一度だけ報告する
    run(&args, &config).await
}

async fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let selection = args.range.unwrap_or(config.general.range);
    let calendar_id = config
        .google_calendar
        .effective_calendar_id(args.calendar_id.as_deref())?;
    let display_tz = config.general.display_tz()?;

    // 認証情報の不備はここで一度だけ報告する
    let source = GoogleCalendarClient::from_config(&config.google_calendar)?;

    let openai = OpenAiReminderGenerator::new(&config.openai, &config.general);
    let generator: Arc<dyn ReminderGenerator> = if args.watch {
        Arc::new(CachedReminderGenerator::new(openai))
    } else {
        Arc::new(openai)
    };
    let pipeline = EventPipeline::from_config(&config.general, generator)?;

    if !args.watch {
        info!("Running in one-shot mode");
        return render_once(args, &pipeline, &source, &calendar_id, selection, display_tz).await;
    }

    info!(
        "Running in watch mode (every {}s, Ctrl-C to stop)",
        config.general.refresh_interval_secs
    );
    let mut refresh = time::interval(Duration::from_secs(config.general.refresh_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                // 進行中の描画はCtrl-Cで破棄され、リマインダー生成もそこで止まる
                tokio::select! {
                    result = render_once(args, &pipeline, &source, &calendar_id, selection, display_tz) => {
                        if let Err(e) = result {
                            error!("Render failed: {:#}", e);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, cancelling in-flight requests");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }
    }
}

async fn render_once(
    args: &Args,
    pipeline: &EventPipeline,
    source: &dyn CalendarSource,
    calendar_id: &str,
    selection: RangeSelection,
    display_tz: chrono_tz::Tz,
) -> Result<()> {
    let view = pipeline
        .present(source, calendar_id, selection, Utc::now())
        .await?;

    info!(
        "Rendered {} event(s) ({} with reminders)",
        view.events.len(),
        view.events.iter().filter(|e| !e.reminder.is_empty()).count()
    );

    if args.json {
        println!("{}", render::render_json(&view)?);
    } else {
        print!("{}", render::render_text(&view, display_tz));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcal_reminder_rs::error::AppError;

    const EMPTY_REFRESH_TOKEN: &str = r#"
[google_calendar]
calendar_id = "family@group.calendar.google.com"

[google_calendar.credentials]
type = "oauth"
client_id = "cid"
client_secret = "secret"
refresh_token = ""

[openai]
api_key = "sk-test"
"#;

    #[tokio::test]
    async fn credential_failure_is_returned_to_main_untouched() {
        let config: AppConfig = toml::from_str(EMPTY_REFRESH_TOKEN).unwrap();
        let args = Args::parse_from(["gcal_reminder_rs"]);

        let err = run(&args, &config).await.unwrap_err();

        match err.downcast_ref::<AppError>() {
            Some(AppError::Credential(message)) => {
                assert!(message.contains("refresh_token is empty"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.chain().count(), 1);
    }
}
