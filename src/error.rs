use std::time::Duration;

use thiserror::Error;

/// 実行全体を中断するエラー
///
/// これらが返された場合、イベントは一件も表示しない。
#[derive(Debug, Error)]
pub enum AppError {
    /// 認証情報が無い、または壊れている
    #[error("Credential error: {0}")]
    Credential(String),

    /// カレンダーAPIへのアクセス失敗（通信・権限・レスポンス不正）
    #[error("Calendar access error: {message}\nhint: {remediation}")]
    CalendarAccess {
        message: String,
        remediation: String,
    },

    /// 設定ファイルの読み込み・検証エラー
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn credential(message: impl Into<String>) -> Self {
        AppError::Credential(message.into())
    }

    pub fn calendar_access(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        AppError::CalendarAccess {
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// イベント一件分の時刻整形エラー
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("event {0} time is missing")]
    Missing(&'static str),

    #[error("invalid dateTime '{value}': {source}")]
    InvalidDateTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid date '{value}': {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("start and end mix a timed and a whole-day value")]
    MixedKinds,
}

/// リマインダー生成の失敗
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("text generation service error: {0}")]
    Service(#[from] async_openai::error::OpenAIError),

    #[error("text generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("text generation returned no content")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

impl ReminderError {
    /// 再試行で回復しうる失敗か
    ///
    /// タイムアウト、通信エラー、429/5xx のみ。認証エラーや不正なリクエスト、
    /// 空の応答は何度送っても同じ結果になる。
    pub fn is_transient(&self) -> bool {
        use async_openai::error::OpenAIError;

        match self {
            ReminderError::Timeout(_) => true,
            ReminderError::Service(OpenAIError::Reqwest(e)) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(e.is_request(), |status| {
                        status.is_server_error() || status.as_u16() == 429
                    })
            }
            // ステータスコードは残らないので、エラー種別で判断する
            ReminderError::Service(OpenAIError::ApiError(api)) => {
                matches!(api.r#type.as_deref(), Some("server_error"))
            }
            _ => false,
        }
    }
}
