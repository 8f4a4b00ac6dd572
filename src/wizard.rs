use anyhow::{Context, Result};
use async_trait::async_trait;
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use gcal_reminder_rs::calendar::CALENDAR_READONLY_SCOPE;
use gcal_reminder_rs::classifier;
use gcal_reminder_rs::config::{
    create_default_config, AppConfig, CredentialsConfig, GeneralConfig, GoogleCalendarConfig,
    OpenAIConfig,
};
use gcal_reminder_rs::time_window::RangeSelection;

const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// 同意画面のURLをブラウザで開く
struct BrowserFlowDelegate;

impl InstalledFlowDelegate for BrowserFlowDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("正在浏览器中打开 Google 授权页面...");
            if let Err(e) = open::that(url) {
                println!("无法自动打开浏览器: {}", e);
                println!("请在浏览器中打开以下 URL 完成授权:");
                println!("{}", url);
            }
            println!("请在 Google 授权页面登录并允许访问...");
            Ok(String::new())
        })
    }
}

/// 認証フローで発行されたトークンを保持するだけのストア
///
/// 設定ファイルへはリフレッシュトークンのみ書き出す。
#[derive(Clone, Default)]
struct CapturedTokens(Arc<Mutex<Option<TokenInfo>>>);

impl CapturedTokens {
    async fn refresh_token(&self) -> Option<String> {
        self.0
            .lock()
            .await
            .as_ref()
            .and_then(|token| token.refresh_token.clone())
            .filter(|token| !token.is_empty())
    }
}

#[async_trait]
impl TokenStorage for CapturedTokens {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        *self.0.lock().await = Some(token);
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.0.lock().await.clone()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleCalendarListResponse {
    items: Vec<GoogleCalendar>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleCalendar {
    id: String,
    summary: String,
    description: Option<String>,
    primary: Option<bool>,
}

/// 対話型設定ウィザード
pub struct ConfigWizard {
    term: Term,
    theme: ColorfulTheme,
    output: PathBuf,
}

impl ConfigWizard {
    /// 新しいウィザードインスタンスを作成
    pub fn new(output: &Path) -> Self {
        Self {
            term: Term::stdout(),
            theme: ColorfulTheme::default(),
            output: output.to_path_buf(),
        }
    }

    /// ウィザードを実行
    pub async fn run(&self) -> Result<()> {
        self.term.clear_screen()?;

        println!("{}", style("gcal_reminder_rs 设置向导").bold().underlined());
        println!("此向导将以交互方式完成应用程序的设置。\n");

        let general = self.configure_general()?;
        let openai = self.configure_openai()?;
        let google_calendar = self.configure_google_calendar().await?;

        let config = AppConfig {
            general,
            google_calendar,
            openai,
        };

        self.save_config(&config)?;

        println!("\n{}", style("设置完成！").green().bold());
        println!(
            "运行: {}",
            style(format!("gcal_reminder_rs --config {}", self.output.display())).cyan()
        );

        Ok(())
    }

    /// 基本設定
    fn configure_general(&self) -> Result<GeneralConfig> {
        println!("\n{}", style("基本设置").bold());

        let labels: Vec<&str> = RangeSelection::ALL.iter().map(|s| s.label()).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("默认查看范围")
            .default(0)
            .items(&labels)
            .interact_on(&self.term)?;

        let display_timezone: String = Input::with_theme(&self.theme)
            .with_prompt("显示时区（IANA 名称）")
            .default("UTC".into())
            .validate_with(|tz: &String| -> Result<(), String> {
                tz.parse::<chrono_tz::Tz>()
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text_on(&self.term)?;

        let keywords: String = Input::with_theme(&self.theme)
            .with_prompt("AI 提醒关键词（逗号分隔）")
            .default(classifier::DEFAULT_KEYWORDS.join(","))
            .interact_text_on(&self.term)?;

        Ok(GeneralConfig {
            range: RangeSelection::ALL[selection],
            display_timezone,
            reminder_keywords: parse_keywords(&keywords),
            ..GeneralConfig::default()
        })
    }

    /// OpenAI設定
    fn configure_openai(&self) -> Result<OpenAIConfig> {
        println!("\n{}", style("OpenAI 设置").bold());
        println!("OpenAI 的 API 密钥可在 https://platform.openai.com/api-keys 获取。");

        let api_key: String = Input::with_theme(&self.theme)
            .with_prompt("OpenAI API 密钥")
            .interact_on(&self.term)?;

        let models = vec!["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

        let selection = Select::with_theme(&self.theme)
            .with_prompt("使用的模型")
            .default(0)
            .items(&models)
            .interact_on(&self.term)?;

        let defaults = create_default_config().openai;
        Ok(OpenAIConfig {
            api_key,
            model: models[selection].to_string(),
            ..defaults
        })
    }

    /// Googleカレンダー設定
    async fn configure_google_calendar(&self) -> Result<GoogleCalendarConfig> {
        println!("\n{}", style("Google Calendar 设置").bold());

        let kinds = ["服务账号 (service account JSON 密钥)", "OAuth 客户端 (浏览器授权)"];
        let kind = Select::with_theme(&self.theme)
            .with_prompt("认证方式")
            .default(0)
            .items(&kinds)
            .interact_on(&self.term)?;

        let defaults = create_default_config().google_calendar;

        if kind == 0 {
            let key_file: String = Input::with_theme(&self.theme)
                .with_prompt("服务账号密钥文件路径")
                .default("service_account.json".into())
                .interact_text_on(&self.term)?;

            match fs::read_to_string(&key_file)
                .ok()
                .and_then(|json| yup_oauth2::parse_service_account_key(json.as_bytes()).ok())
            {
                Some(key) => println!(
                    "请将日历共享给服务账号: {}",
                    style(&key.client_email).yellow()
                ),
                None => println!(
                    "{}",
                    style("无法读取该密钥文件，请稍后确认路径与内容。").red()
                ),
            }

            let calendar_id: String = Input::with_theme(&self.theme)
                .with_prompt("日历 ID")
                .interact_on(&self.term)?;

            return Ok(GoogleCalendarConfig {
                calendar_id,
                credentials: CredentialsConfig::ServiceAccount {
                    key_file: Some(PathBuf::from(key_file)),
                    key_json: None,
                },
                ..defaults
            });
        }

        println!("需要在 Google Cloud Console 完成以下准备：");
        println!("1. 在 https://console.cloud.google.com/apis/dashboard 创建项目");
        println!("2. 启用 Google Calendar API");
        println!("3. 设置 OAuth 同意屏幕");
        println!("4. 创建类型为「桌面应用」的 OAuth 2.0 客户端 ID");
        println!();

        let client_id: String = Input::with_theme(&self.theme)
            .with_prompt("Google Cloud OAuth 客户端 ID")
            .interact_on(&self.term)?;

        let client_secret: String = Input::with_theme(&self.theme)
            .with_prompt("Google Cloud OAuth 客户端密钥")
            .interact_on(&self.term)?;

        println!("\n{}", style("开始 OAuth 授权...").green());

        let (access_token, refresh_token) = self
            .authorize_in_browser(&client_id, &client_secret)
            .await?;

        println!("{}", style("授权完成！").green());

        println!("正在获取日历列表...");
        let calendars = self.get_calendar_list(&access_token).await?;

        let calendar_id = if calendars.items.is_empty() {
            println!("未找到日历，使用主日历。");
            "primary".to_string()
        } else {
            let calendar_items: Vec<String> = calendars
                .items
                .iter()
                .map(|cal| {
                    let primary_label = if cal.primary.unwrap_or(false) { " (主日历)" } else { "" };
                    format!("{}{} (ID: {})", cal.summary, primary_label, cal.id)
                })
                .collect();

            let default_index = calendars
                .items
                .iter()
                .position(|cal| cal.primary.unwrap_or(false))
                .unwrap_or(0);

            let selected = Select::with_theme(&self.theme)
                .with_prompt("选择要查看的日历")
                .items(&calendar_items)
                .default(default_index)
                .interact_on(&self.term)?;

            println!("已选择: {}", style(&calendars.items[selected].summary).green());
            calendars.items[selected].id.clone()
        };

        Ok(GoogleCalendarConfig {
            calendar_id,
            credentials: CredentialsConfig::Oauth {
                client_id,
                client_secret,
                refresh_token,
                token_uri: TOKEN_URI.to_string(),
            },
            ..defaults
        })
    }

    /// ブラウザで同意を得てトークンを取得する
    ///
    /// リダイレクトの受け取りとコード交換は yup-oauth2 に任せ、
    /// 発行されたトークンはメモリ上のストアから取り出す。
    async fn authorize_in_browser(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(String, String)> {
        let secret = yup_oauth2::ApplicationSecret {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_uri: AUTH_URI.to_string(),
            token_uri: TOKEN_URI.to_string(),
            redirect_uris: vec!["http://localhost".to_string()],
            project_id: None,
            client_email: None,
            auth_provider_x509_cert_url: None,
            client_x509_cert_url: None,
        };

        let store = CapturedTokens::default();
        let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
            .flow_delegate(Box::new(BrowserFlowDelegate))
            .with_storage(Box::new(store.clone()))
            .build()
            .await
            .context("Failed to create authenticator")?;

        let token = auth
            .token(&[CALENDAR_READONLY_SCOPE])
            .await
            .context("Failed to obtain access token")?;
        let access_token = token
            .token()
            .ok_or_else(|| anyhow::anyhow!("No access token in the OAuth response"))?
            .to_string();

        let refresh_token = store.refresh_token().await.ok_or_else(|| {
            anyhow::anyhow!("Google did not issue a refresh token; revoke the app's access and retry")
        })?;

        Ok((access_token, refresh_token))
    }

    /// カレンダー一覧を取得
    async fn get_calendar_list(&self, access_token: &str) -> Result<GoogleCalendarListResponse> {
        let client = reqwest::Client::new();

        let response = client.get("https://www.googleapis.com/calendar/v3/users/me/calendarList")
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch the calendar list")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "no error details".to_string());
            return Err(anyhow::anyhow!("Failed to fetch the calendar list: {}", error_text));
        }

        let calendar_list: GoogleCalendarListResponse = response.json().await
            .context("Failed to parse the calendar list")?;

        Ok(calendar_list)
    }

    /// 設定ファイルを保存
    fn save_config(&self, config: &AppConfig) -> Result<()> {
        println!("\n确认设置内容：");

        let config_str = toml::to_string_pretty(config)?;
        println!("{}", style("```").dim());
        println!("{}", config_str);
        println!("{}", style("```").dim());

        let confirm = Confirm::with_theme(&self.theme)
            .with_prompt(format!("保存到 {} ?", self.output.display()))
            .default(true)
            .interact_on(&self.term)?;

        if confirm {
            fs::write(&self.output, config_str)
                .context("Failed to save the config file")?;
            println!("设置已保存到 {}", style(self.output.display()).yellow());
        } else {
            println!("已取消保存");
        }
        Ok(())
    }
}

/// カンマ区切り（全角カンマも可）のキーワードを分割
fn parse_keywords(input: &str) -> Vec<String> {
    input
        .split([',', '，'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
