use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::classifier;
use crate::error::AppError;
use crate::time_window::RangeSelection;

/// 環境変数で設定を上書きする際のプレフィックス
pub const ENV_PREFIX: &str = "GCAL_REMINDER";

/// アプリケーション全体の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// アプリケーション全般の設定
    #[serde(default)]
    pub general: GeneralConfig,

    /// Google Calendar API の設定
    pub google_calendar: GoogleCalendarConfig,

    /// OpenAI API の設定
    pub openai: OpenAIConfig,
}

/// 一般設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// デフォルトの表示範囲
    #[serde(default)]
    pub range: RangeSelection,

    /// 表示タイムゾーン（IANA名）
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,

    /// AIリマインダー対象のキーワード
    #[serde(default = "classifier::default_keywords")]
    pub reminder_keywords: Vec<String>,

    /// リマインダー生成の同時実行数
    #[serde(default = "default_reminder_concurrency")]
    pub reminder_concurrency: usize,

    /// リマインダー生成一回あたりのタイムアウト（秒）
    #[serde(default = "default_reminder_timeout")]
    pub reminder_timeout_secs: u64,

    /// リマインダー生成の再試行回数
    #[serde(default = "default_reminder_retries")]
    pub reminder_retries: u32,

    /// ウォッチモードの再描画間隔（秒）
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            range: RangeSelection::default(),
            display_timezone: default_display_timezone(),
            reminder_keywords: classifier::default_keywords(),
            reminder_concurrency: default_reminder_concurrency(),
            reminder_timeout_secs: default_reminder_timeout(),
            reminder_retries: default_reminder_retries(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl GeneralConfig {
    pub fn display_tz(&self) -> Result<Tz, AppError> {
        self.display_timezone.parse::<Tz>().map_err(|e| {
            AppError::config(format!(
                "unknown display_timezone '{}': {}",
                self.display_timezone, e
            ))
        })
    }
}

/// Google Calendar API 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleCalendarConfig {
    /// カレンダーID
    #[serde(default)]
    pub calendar_id: String,

    /// ユーザー指定のカレンダーID（空でなければcalendar_idより優先）
    #[serde(default)]
    pub calendar_id_override: String,

    /// APIのベースURL
    #[serde(default = "default_calendar_api_base")]
    pub api_base: String,

    /// 1ページあたりの最大取得件数
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// 認証情報
    pub credentials: CredentialsConfig,
}

impl GoogleCalendarConfig {
    /// 実際に使うカレンダーIDを決める（コマンドライン > override > calendar_id）
    pub fn effective_calendar_id(&self, cli_override: Option<&str>) -> Result<String, AppError> {
        [
            cli_override.unwrap_or(""),
            self.calendar_id_override.as_str(),
            self.calendar_id.as_str(),
        ]
        .into_iter()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::config("google_calendar.calendar_id is not set"))
    }
}

/// Google API の認証情報
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// サービスアカウント（JSONキー）
    ServiceAccount {
        /// キーファイルのパス
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_file: Option<PathBuf>,

        /// キーJSONそのもの（key_fileより優先）
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_json: Option<String>,
    },

    /// OAuthクライアント + リフレッシュトークン
    Oauth {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
}

/// OpenAI API 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// OpenAI API キー
    pub api_key: String,

    /// 使用するモデル
    #[serde(default = "default_model")]
    pub model: String,

    /// 互換APIを使う場合のベースURL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// システムプロンプト
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

// デフォルト値
fn default_display_timezone() -> String {
    "UTC".to_string()
}

fn default_reminder_concurrency() -> usize {
    4
}

fn default_reminder_timeout() -> u64 {
    30
}

fn default_reminder_retries() -> u32 {
    2
}

fn default_refresh_interval() -> u64 {
    300 // 5分
}

fn default_calendar_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_max_results() -> u32 {
    250
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_system_prompt() -> String {
    "你是一个有助于生成友好提醒的AI助手。".to_string()
}

/// 設定ファイルを読み込む
///
/// `GCAL_REMINDER_OPENAI__API_KEY` のような環境変数で値を上書きできる。
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, AppError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AppError::config(format!(
            "config file {} not found (run with --init-config or --wizard)",
            path.display()
        )));
    }

    let config: AppConfig = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

/// 明示的に指定されなかった場合の設定ファイルパスを決める
///
/// カレントディレクトリに無ければXDG設定ディレクトリを見る。
pub fn resolve_config_path(requested: &Path) -> PathBuf {
    if requested.exists() || requested.is_absolute() {
        return requested.to_path_buf();
    }

    match crate::utils::get_config_dir() {
        Ok(dir) if dir.join(requested).exists() => dir.join(requested),
        _ => requested.to_path_buf(),
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.general.display_tz()?;

        if self.general.reminder_concurrency == 0 {
            return Err(AppError::config("general.reminder_concurrency must be at least 1"));
        }
        if self.general.reminder_timeout_secs == 0 {
            return Err(AppError::config("general.reminder_timeout_secs must be at least 1"));
        }
        if self.openai.api_key.trim().is_empty() {
            return Err(AppError::config("openai.api_key is empty"));
        }
        Ok(())
    }
}

/// デフォルトの設定を作成する
pub fn create_default_config() -> AppConfig {
    AppConfig {
        general: GeneralConfig::default(),
        google_calendar: GoogleCalendarConfig {
            calendar_id: "your_calendar_id@group.calendar.google.com".to_string(),
            calendar_id_override: String::new(),
            api_base: default_calendar_api_base(),
            max_results: default_max_results(),
            credentials: CredentialsConfig::ServiceAccount {
                key_file: Some(PathBuf::from("service_account.json")),
                key_json: None,
            },
        },
        openai: OpenAIConfig {
            api_key: "your_openai_api_key".to_string(),
            model: default_model(),
            api_base: None,
            system_prompt: default_system_prompt(),
        },
    }
}

/// サンプル設定ファイルを作成する
pub fn generate_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = create_default_config();
    let toml_str = toml::to_string_pretty(&config)
        .context("Failed to serialize config")?;

    std::fs::write(path, toml_str)
        .context("Failed to write sample config file")?;

    Ok(())
}
