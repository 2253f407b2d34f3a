//! 国际化模块
//!
//! 提供多语言消息支持，目前支持中文和英文。
//! 气语言以中文为第一语言，因此默认语言是中文。

pub mod messages;
pub mod zh;
pub mod en;

/// 支持的语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// 中文（默认）
    #[default]
    Zh,
    /// 英文
    En,
}

impl Locale {
    /// 从字符串解析语言
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "zh" | "chinese" | "cn" => Some(Locale::Zh),
            "en" | "english" => Some(Locale::En),
            _ => None,
        }
    }

    /// 获取语言代码
    pub fn code(&self) -> &'static str {
        match self {
            Locale::Zh => "zh",
            Locale::En => "en",
        }
    }

    /// 从系统环境检测语言
    pub fn from_env() -> Self {
        if let Ok(lang) = std::env::var("LANG") {
            if lang.to_lowercase().starts_with("en") {
                return Locale::En;
            }
        }
        Locale::Zh
    }
}

/// 获取指定语言的消息
pub fn get_message(key: &str, locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => zh::get(key),
        Locale::En => en::get(key),
    }
}

/// 获取带参数的消息（使用 {} 占位符）
pub fn format_message(key: &str, locale: Locale, args: &[&str]) -> String {
    let mut msg = get_message(key, locale).to_string();
    for arg in args {
        if let Some(pos) = msg.find("{}") {
            msg.replace_range(pos..pos + 2, arg);
        }
    }
    msg
}
