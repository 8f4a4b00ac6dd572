use anyhow::Result;
use std::path::PathBuf;

pub const APP_NAME: &str = "gcal_reminder_rs";

/// ユーザーホームディレクトリのパスを取得
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// XDG設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(dir)
    } else {
        get_home_dir()?.join(".config")
    };

    Ok(config_dir.join(APP_NAME))
}

/// ログ出力用にトークンを伏せる
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "[TOKEN_TOO_SHORT_TO_MASK]".to_string();
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}
