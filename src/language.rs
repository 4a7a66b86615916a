//! # Language detection
//!
//! Classifies a message as Chinese or English with layered heuristics. The
//! first layer that fires wins:
//!
//! 1. Any CJK ideograph (U+4E00–U+9FFF, U+3400–U+4DBF, U+F900–U+FAFF).
//! 2. A stoplist of common Chinese function words and names.
//! 3. A code-point scan of the U+4E00–U+9FFF block, kept as its own check for
//!    text that arrives with mangled encoding.
//! 4. Full-width Chinese punctuation (`？`, `，`, `。`).
//! 5. Otherwise English.
//!
//! [`detect`] is pure: voice-input locale and response language both hang off it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Response / query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(format!("unsupported language `{other}`")),
        }
    }
}

const CHINESE_STOPLIST: &[&str] = &[
    "李一鸣", "一鸣", "你好", "什么", "哪里", "工作", "论文", "找", "在", "的", "是", "了", "和",
    "有", "他", "她", "我", "你", "毕业", "学位", "技能", "项目", "经验", "教育", "大学", "专业",
    "研究", "开发", "设计", "系统", "软件", "硬件",
];

const CHINESE_PUNCTUATION: &[char] = &['？', '，', '。'];

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

fn has_unified_ideograph_code_point(text: &str) -> bool {
    text.chars()
        .map(u32::from)
        .any(|code| (0x4E00..=0x9FFF).contains(&code))
}

/// Detect the language of `text`. Never fails.
///
/// # Examples
/// ```rust
/// use portfolio_assistant::language::{detect, Language};
///
/// assert_eq!(detect("Hello, how are you?"), Language::En);
/// assert_eq!(detect("你好"), Language::Zh);
/// ```
pub fn detect(text: &str) -> Language {
    if text.chars().any(is_cjk_ideograph) {
        trace!("language: CJK ideograph range");
        return Language::Zh;
    }
    if CHINESE_STOPLIST.iter().any(|word| text.contains(word)) {
        trace!("language: Chinese stoplist");
        return Language::Zh;
    }
    if has_unified_ideograph_code_point(text) {
        trace!("language: code-point scan");
        return Language::Zh;
    }
    if text.contains(CHINESE_PUNCTUATION) {
        trace!("language: full-width punctuation");
        return Language::Zh;
    }
    Language::En
}

/// Resolve the response language for a request.
///
/// `force_language` beats an explicit `language`, which beats detection.
/// `"auto"`, empty and unrecognised values fall through to [`detect`].
pub fn resolve(message: &str, language: Option<&str>, force_language: Option<&str>) -> Language {
    force_language
        .and_then(|value| value.parse().ok())
        .or_else(|| language.and_then(|value| value.parse().ok()))
        .unwrap_or_else(|| detect(message))
}
