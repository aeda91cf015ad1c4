//! 回复文本与内联键盘
//!
//! 与具体聊天平台无关：核心只产出文本与按钮数据，由前端负责渲染。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 内联键盘按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    pub label: String,
    pub callback_data: String,
}

/// 内联键盘（按行排列）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

/// 一条待发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

pub fn welcome() -> String {
    "👋 Welcome to the LinkedIn Job URL Bot!\n\n\
     Use /checkjobs to get the next job link.\n\
     Use /help for assistance."
        .to_string()
}

pub fn help() -> String {
    "📌 Commands:\n\
     /checkjobs - Get the next LinkedIn job link\n\
     /help - Show this help message"
        .to_string()
}

pub fn job_link(url: &str) -> String {
    format!("🔗 Job Link: {}", url)
}

pub fn batch_prompt() -> String {
    "How many job links would you like to get?".to_string()
}

/// 批量确认
pub fn batch_ack(count: u32) -> String {
    format!(
        "✅ Your {} live job link{} will be sent in a few minutes.",
        count,
        if count > 1 { "s" } else { "" }
    )
}

/// 批量失败时发给会话的通知
pub fn batch_failed(count: u32) -> String {
    format!(
        "⚠️ Sorry, checking your {} job link{} failed. Please try again.",
        count,
        if count > 1 { "s" } else { "" }
    )
}

pub fn unsupported_batch(supported: &[u32]) -> String {
    let sizes = supported
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("That batch size is not available. Choose one of: {}", sizes)
}

/// 批量选择键盘：每个支持的批量大小一行
pub fn batch_keyboard(counts: &[u32]) -> Keyboard {
    Keyboard {
        rows: counts
            .iter()
            .map(|&count| {
                vec![KeyboardButton {
                    label: format!("Get {} link{}", count, if count > 1 { "s" } else { "" }),
                    callback_data: batch_callback_data(count),
                }]
            })
            .collect(),
    }
}

pub fn batch_callback_data(count: u32) -> String {
    format!("more_{}", count)
}

static BATCH_CALLBACK_RE: OnceLock<Regex> = OnceLock::new();

/// 解析 `more_<n>` 回调数据
pub fn parse_batch_callback(data: &str) -> Option<u32> {
    let re = BATCH_CALLBACK_RE.get_or_init(|| Regex::new(r"^more_(\d+)$").unwrap());
    re.captures(data.trim())?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_callback() {
        assert_eq!(parse_batch_callback("more_1"), Some(1));
        assert_eq!(parse_batch_callback("more_3"), Some(3));
        assert_eq!(parse_batch_callback("more_"), None);
        assert_eq!(parse_batch_callback("more_x"), None);
        assert_eq!(parse_batch_callback("less_3"), None);
        assert_eq!(parse_batch_callback("more_99999999999"), None);
    }

    #[test]
    fn test_keyboard_round_trips_callback() {
        let keyboard = batch_keyboard(&[1, 3]);
        assert_eq!(keyboard.rows.len(), 2);
        assert_eq!(keyboard.rows[0][0].label, "Get 1 link");
        assert_eq!(keyboard.rows[1][0].label, "Get 3 links");
        assert_eq!(parse_batch_callback(&keyboard.rows[1][0].callback_data), Some(3));
    }

    #[test]
    fn test_batch_ack_pluralizes() {
        assert_eq!(
            batch_ack(1),
            "✅ Your 1 live job link will be sent in a few minutes."
        );
        assert_eq!(
            batch_ack(3),
            "✅ Your 3 live job links will be sent in a few minutes."
        );
    }
}
