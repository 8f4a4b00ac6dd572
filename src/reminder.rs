use async_openai::{
    config::OpenAIConfig as OpenAIClientConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{GeneralConfig, OpenAIConfig};
use crate::error::ReminderError;
use crate::event::RawEvent;

/// イベントからリマインダー文を生成する
#[async_trait]
pub trait ReminderGenerator: Send + Sync {
    async fn generate(&self, event: &RawEvent) -> Result<String, ReminderError>;

    /// 現在のイベント一覧に無いイベントの保持分を捨てる
    ///
    /// 何も保持しない実装では何もしない。
    async fn retain(&self, _current: &[RawEvent]) {}
}

/// リマインダー生成用のプロンプトを構築
pub fn build_prompt(event: &RawEvent) -> String {
    format!(
        "基于以下事件生成一个温馨提醒: {} 在 {}",
        event.summary,
        event.start.raw().unwrap_or("")
    )
}

/// OpenAIのチャットAPIでリマインダーを生成する
pub struct OpenAiReminderGenerator {
    client: Client<OpenAIClientConfig>,
    model: String,
    system_prompt: String,
    timeout: Duration,
    retries: u32,
    retry_backoff: Duration,
}

impl OpenAiReminderGenerator {
    pub fn new(openai: &OpenAIConfig, general: &GeneralConfig) -> Self {
        let mut client_config = OpenAIClientConfig::new().with_api_key(openai.api_key.clone());
        if let Some(api_base) = &openai.api_base {
            client_config = client_config.with_api_base(api_base.clone());
        }

        Self {
            client: Client::with_config(client_config),
            model: openai.model.clone(),
            system_prompt: openai.system_prompt.clone(),
            timeout: Duration::from_secs(general.reminder_timeout_secs),
            retries: general.reminder_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<String, ReminderError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_prompt.clone())
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.to_string())
                    .build()?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .n(1u8)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .unwrap_or("");

        if content.is_empty() {
            return Err(ReminderError::EmptyResponse);
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl ReminderGenerator for OpenAiReminderGenerator {
    async fn generate(&self, event: &RawEvent) -> Result<String, ReminderError> {
        let prompt = build_prompt(event);
        debug!("Reminder prompt: {}", prompt);

        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.request_once(&prompt)).await {
                Ok(result) => result,
                Err(_) => Err(ReminderError::Timeout(self.timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Reminder generation for '{}' failed ({}), retry {}/{}",
                        event.summary, e, attempt, self.retries
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 生成済みリマインダーをイベント単位でメモリに保持する
///
/// ウォッチモードで再描画するたびに同じイベントのAPI呼び出しが走らないようにする。
/// 失敗は保持しない。
pub struct CachedReminderGenerator<G> {
    inner: G,
    cache: Mutex<HashMap<String, String>>,
}

impl<G: ReminderGenerator> CachedReminderGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl<G: ReminderGenerator> ReminderGenerator for CachedReminderGenerator<G> {
    async fn generate(&self, event: &RawEvent) -> Result<String, ReminderError> {
        let key = event.cache_key();
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!("Reminder cache hit for '{}'", event.summary);
            return Ok(hit.clone());
        }

        let text = self.inner.generate(event).await?;
        self.cache.lock().await.insert(key, text.clone());
        Ok(text)
    }

    async fn retain(&self, current: &[RawEvent]) {
        let keep: HashSet<String> = current.iter().map(RawEvent::cache_key).collect();

        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|key, _| keep.contains(key));
        if cache.len() < before {
            debug!("Dropped {} stale reminder(s) from cache", before - cache.len());
        }
        drop(cache);

        self.inner.retain(current).await;
    }
}
