use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::{CredentialsConfig, GoogleCalendarConfig};
use crate::error::AppError;
use crate::event::RawEvent;
use crate::time_window::TimeRange;
use crate::utils::mask_token;

pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

const REMEDIATION_FORBIDDEN: &str = "share the calendar with the service account email (or the OAuth user) \
and make sure the Google Calendar API is enabled for the project";
const REMEDIATION_NOT_FOUND: &str = "check google_calendar.calendar_id (or --calendar-id); \
the calendar must exist and be visible to these credentials";
const REMEDIATION_GENERIC: &str = "check the network connection and google_calendar.api_base, then retry";

/// 読み取り専用のカレンダーデータソース
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// 半開区間 [start, end) のイベントを開始時刻順で返す
    async fn list_events(&self, calendar_id: &str, range: &TimeRange) -> Result<Vec<RawEvent>, AppError>;
}

/// アクセストークンの取得方法
enum TokenSource {
    ServiceAccount(yup_oauth2::ServiceAccountKey),
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
}

struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|expires_at| now + Duration::seconds(60) < expires_at)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<RawEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Google Calendar API v3 クライアント
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_base: String,
    max_results: u32,
    tokens: TokenSource,
    cached_token: Mutex<Option<CachedToken>>,
}

impl GoogleCalendarClient {
    /// 設定から認証情報を読み込んでクライアントを作成
    ///
    /// 認証情報が無い・壊れている場合はここで `AppError::Credential` を返す。
    pub fn from_config(config: &GoogleCalendarConfig) -> Result<Self, AppError> {
        let tokens = load_token_source(&config.credentials)?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            tokens,
            cached_token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let token = match &self.tokens {
            TokenSource::ServiceAccount(key) => fetch_service_account_token(key).await?,
            TokenSource::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                self.refresh_access_token(client_id, client_secret, refresh_token, token_uri)
                    .await?
            }
        };

        debug!("Access token obtained: {}", mask_token(&token.value));
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// リフレッシュトークンを使ってアクセストークンを取得
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        token_uri: &str,
    ) -> Result<CachedToken, AppError> {
        debug!("Sending token refresh request to {}", token_uri);

        let form_data = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let res = self
            .http
            .post(token_uri)
            .form(&form_data)
            .send()
            .await
            .map_err(|e| {
                AppError::calendar_access(
                    format!("failed to send token refresh request: {}", e),
                    REMEDIATION_GENERIC,
                )
            })?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            debug!("Token refresh request failed: {} - {}", status, error_text);
            return Err(AppError::credential(format!(
                "token refresh failed with status {}: {}",
                status, error_text
            )));
        }

        let body: TokenResponse = res
            .json()
            .await
            .map_err(|e| AppError::credential(format!("failed to parse token response: {}", e)))?;

        Ok(CachedToken {
            value: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    async fn fetch_page(
        &self,
        token: &str,
        calendar_id: &str,
        range: &TimeRange,
        page_token: Option<&str>,
    ) -> Result<EventsPage, AppError> {
        let endpoint = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut url = url::Url::parse(&endpoint)
            .map_err(|e| AppError::config(format!("invalid calendar api_base '{}': {}", self.api_base, e)))?;
        let (time_min, time_max) = range.to_query();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("timeMin", &time_min)
                .append_pair("timeMax", &time_max)
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime")
                .append_pair("maxResults", &self.max_results.to_string());
            if let Some(page_token) = page_token {
                query.append_pair("pageToken", page_token);
            }
        }

        debug!("Calendar API URL: {}", url);

        let res = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                AppError::calendar_access(
                    format!("failed to send request to Google Calendar API: {}", e),
                    REMEDIATION_GENERIC,
                )
            })?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            debug!("Calendar API request failed: {} - {}", status, error_text);

            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED => AppError::credential(format!(
                    "Google Calendar rejected the access token: {}",
                    error_text
                )),
                reqwest::StatusCode::FORBIDDEN => AppError::calendar_access(
                    format!("permission denied for calendar '{}': {}", calendar_id, error_text),
                    REMEDIATION_FORBIDDEN,
                ),
                reqwest::StatusCode::NOT_FOUND => AppError::calendar_access(
                    format!("calendar '{}' not found", calendar_id),
                    REMEDIATION_NOT_FOUND,
                ),
                _ => AppError::calendar_access(
                    format!("Calendar API request failed with status {}: {}", status, error_text),
                    REMEDIATION_GENERIC,
                ),
            });
        }

        res.json::<EventsPage>().await.map_err(|e| {
            AppError::calendar_access(
                format!("failed to parse Calendar API response: {}", e),
                REMEDIATION_GENERIC,
            )
        })
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn list_events(&self, calendar_id: &str, range: &TimeRange) -> Result<Vec<RawEvent>, AppError> {
        debug!(
            "Fetching events from calendar {} ({} to {})",
            calendar_id, range.start, range.end
        );

        let token = self.access_token().await?;
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self
                .fetch_page(&token, calendar_id, range, page_token.as_deref())
                .await?;
            pages += 1;
            debug!("Page {}: {} events", pages, page.items.len());
            all_events.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        if all_events.is_empty() {
            info!("No events in calendar {} for the selected range", calendar_id);
        } else {
            info!(
                "Retrieved {} events from calendar {} in {} page(s)",
                all_events.len(),
                calendar_id,
                pages
            );
        }

        Ok(all_events)
    }
}

/// 設定された認証情報を検証して読み込む
fn load_token_source(credentials: &CredentialsConfig) -> Result<TokenSource, AppError> {
    match credentials {
        CredentialsConfig::ServiceAccount { key_file, key_json } => {
            let json = match (key_json, key_file) {
                (Some(json), _) if !json.trim().is_empty() => json.clone(),
                (_, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                    AppError::credential(format!(
                        "failed to read service account key file {}: {}",
                        path.display(),
                        e
                    ))
                })?,
                _ => {
                    return Err(AppError::credential(
                        "service_account credentials need key_file or key_json",
                    ))
                }
            };

            let key = yup_oauth2::parse_service_account_key(json.as_bytes()).map_err(|e| {
                AppError::credential(format!("malformed service account key: {}", e))
            })?;
            debug!("Loaded service account key for {}", key.client_email);
            Ok(TokenSource::ServiceAccount(key))
        }
        CredentialsConfig::Oauth {
            client_id,
            client_secret,
            refresh_token,
            token_uri,
        } => {
            if client_id.trim().is_empty() || client_secret.trim().is_empty() {
                return Err(AppError::credential("oauth client_id/client_secret is empty"));
            }
            if refresh_token.trim().is_empty() {
                return Err(AppError::credential(
                    "oauth refresh_token is empty (run --wizard to authorize this application)",
                ));
            }
            Ok(TokenSource::RefreshToken {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
                token_uri: token_uri.clone(),
            })
        }
    }
}

async fn fetch_service_account_token(key: &yup_oauth2::ServiceAccountKey) -> Result<CachedToken, AppError> {
    let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key.clone())
        .build()
        .await
        .map_err(|e| AppError::credential(format!("failed to create authenticator: {}", e)))?;

    let token = auth
        .token(&[CALENDAR_READONLY_SCOPE])
        .await
        .map_err(|e| AppError::credential(format!("failed to obtain access token: {}", e)))?;

    let value = token
        .token()
        .ok_or_else(|| AppError::credential("service account token response had no access token"))?
        .to_string();

    Ok(CachedToken {
        value,
        expires_at: token
            .expiration_time()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), 0)),
    })
}
