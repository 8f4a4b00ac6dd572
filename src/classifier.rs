/// リマインダー対象のデフォルトキーワード（家族・誕生日・記念日・通院）
pub const DEFAULT_KEYWORDS: [&str; 4] = ["家人", "生日", "紀念日", "看診"];

pub fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// イベントのタイトルからAIリマインダーの対象かどうかを判定する
///
/// 大文字小文字を区別する部分文字列一致。単語境界は見ないので、
/// 長い単語の一部にキーワードが含まれていても一致とみなす。
#[derive(Debug, Clone)]
pub struct ReminderClassifier {
    keywords: Vec<String>,
}

impl Default for ReminderClassifier {
    fn default() -> Self {
        Self::new(default_keywords())
    }
}

impl ReminderClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // 空文字列はすべてに一致してしまうので除外
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn qualifies(&self, summary: &str) -> bool {
        self.keywords.iter().any(|k| summary.contains(k.as_str()))
    }
}
