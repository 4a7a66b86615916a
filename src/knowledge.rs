//! # Knowledge domain types
//!
//! The curated facts the assistant can draw on, and the scored wrappers the
//! search engines hand to each other.
//!
//! - [`Category`] is a closed set. Each variant carries its bilingual keyword
//!   lists and the phrases used by the fallback ladder, so adding a category is
//!   a compile error until its table row exists.
//! - [`KnowledgeEntry`] is read-only from the pipeline's point of view.
//! - [`SearchResult`] composes an entry with a [`Scores`] block. Fusion only
//!   ever touches the scores, never the entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Knowledge categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Personal,
    Education,
    Experience,
    Projects,
    Skills,
    Awards,
    Contact,
    Languages,
    Interests,
    CurrentStatus,
    Career,
}

/// Keyword and phrase data attached to a [`Category`].
#[derive(Debug)]
pub struct CategoryProfile {
    /// English trigger keywords (matched as lowercase substrings).
    pub english_keywords: &'static [&'static str],
    /// Chinese trigger keywords.
    pub chinese_keywords: &'static [&'static str],
    /// Lead-in for a templated English answer. `{name}` is replaced with the owner's short name.
    pub english_phrase: &'static str,
    /// Lead-in for a templated Chinese answer. `{name}` is replaced with the owner's Chinese name.
    pub chinese_phrase: &'static str,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Personal,
        Category::Education,
        Category::Experience,
        Category::Projects,
        Category::Skills,
        Category::Awards,
        Category::Contact,
        Category::Languages,
        Category::Interests,
        Category::CurrentStatus,
        Category::Career,
    ];

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Education => "education",
            Category::Experience => "experience",
            Category::Projects => "projects",
            Category::Skills => "skills",
            Category::Awards => "awards",
            Category::Contact => "contact",
            Category::Languages => "languages",
            Category::Interests => "interests",
            Category::CurrentStatus => "current_status",
            Category::Career => "career",
        }
    }

    /// The associated keyword/phrase table row.
    pub fn profile(self) -> &'static CategoryProfile {
        match self {
            Category::Personal => &CategoryProfile {
                english_keywords: &["name", "who", "about", "introduction", "background", "person"],
                chinese_keywords: &["叫", "名字", "是谁", "介绍", "背景", "个人", "人", "李一鸣", "一鸣"],
                english_phrase: "About {name}",
                chinese_phrase: "关于{name}",
            },
            Category::Education => &CategoryProfile {
                english_keywords: &[
                    "education", "university", "degree", "study", "academic", "school", "master",
                    "eit", "digital", "bachelor", "undergraduate",
                ],
                chinese_keywords: &[
                    "教育", "大学", "学位", "学习", "学校", "硕士", "学历", "专业", "本科", "毕业",
                    "毕业于", "哪里", "哪个大学", "什么大学", "学士",
                ],
                english_phrase: "About {name}'s educational background",
                chinese_phrase: "关于{name}的教育背景",
            },
            Category::Experience => &CategoryProfile {
                english_keywords: &[
                    "experience", "work", "job", "career", "professional", "employment", "position",
                ],
                chinese_keywords: &["经验", "工作", "职业", "就业", "实习", "经历", "岗位"],
                english_phrase: "Regarding {name}'s professional experience",
                chinese_phrase: "关于{name}的专业经验",
            },
            Category::Projects => &CategoryProfile {
                english_keywords: &[
                    "project", "built", "developed", "created", "designed", "implemented",
                    "portfolio", "work",
                ],
                chinese_keywords: &["项目", "开发", "设计", "构建", "作品", "做过", "开发过"],
                english_phrase: "About {name}'s projects",
                chinese_phrase: "关于{name}的项目",
            },
            Category::Skills => &CategoryProfile {
                english_keywords: &[
                    "skill", "technology", "programming", "language", "framework", "tool",
                    "expertise", "c++", "python",
                ],
                chinese_keywords: &["技能", "技术", "编程", "程序", "框架", "工具", "会", "掌握"],
                english_phrase: "About {name}'s technical skills",
                chinese_phrase: "关于{name}的技术技能",
            },
            Category::Awards => &CategoryProfile {
                english_keywords: &[
                    "award", "scholarship", "achievement", "recognition", "honor", "prize",
                    "certificate",
                ],
                chinese_keywords: &[
                    "奖学金", "奖项", "荣誉", "获奖", "奖励", "成就", "拿过", "得过", "奖",
                ],
                english_phrase: "Regarding {name}'s awards and achievements",
                chinese_phrase: "关于{name}的奖项和奖学金",
            },
            Category::Contact => &CategoryProfile {
                english_keywords: &[
                    "contact", "email", "phone", "reach", "connect", "location", "address", "hire",
                ],
                chinese_keywords: &["联系", "邮箱", "电话", "地址", "联系方式", "招聘"],
                english_phrase: "Contacting {name}",
                chinese_phrase: "联系{name}",
            },
            Category::Languages => &CategoryProfile {
                english_keywords: &["language", "english", "chinese", "speak", "fluent", "proficiency"],
                chinese_keywords: &["语言", "英语", "中文", "说", "流利", "会说"],
                english_phrase: "About the languages {name} speaks",
                chinese_phrase: "关于{name}的语言能力",
            },
            Category::Interests => &CategoryProfile {
                english_keywords: &["hobby", "interest", "personal", "free", "time", "like", "enjoy"],
                chinese_keywords: &["爱好", "兴趣", "喜欢", "业余", "空闲", "个人"],
                english_phrase: "About {name}'s interests",
                chinese_phrase: "关于{name}的兴趣爱好",
            },
            Category::CurrentStatus => &CategoryProfile {
                english_keywords: &[
                    "looking", "seeking", "search", "want", "need", "thesis", "job", "work",
                    "career", "employment", "opportunity",
                ],
                chinese_keywords: &[
                    "找", "寻找", "找工作", "求职", "论文", "毕业论文", "工作", "职业", "机会", "就业",
                ],
                english_phrase: "About what {name} is currently looking for",
                chinese_phrase: "关于{name}的近况",
            },
            Category::Career => &CategoryProfile {
                english_keywords: &[
                    "career", "interested", "passion", "role", "position", "field", "industry",
                ],
                chinese_keywords: &[
                    "职业", "兴趣", "热情", "角色", "职位", "领域", "行业", "感兴趣",
                ],
                english_phrase: "About {name}'s career interests",
                chinese_phrase: "关于{name}的职业方向",
            },
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a category name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown knowledge category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// One curated fact about the portfolio owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i32,
    pub category: Category,
    pub title: String,
    /// The passage injected into prompts and fallback answers.
    pub content: String,
    pub keywords: Vec<String>,
    /// Higher wins ties and feeds every score as `priority / 10`.
    pub priority: i32,
    pub is_active: bool,
}

impl KnowledgeEntry {
    /// `priority / 10`, the priority term shared by every scoring formula.
    pub fn priority_weight(&self) -> f64 {
        f64::from(self.priority) / 10.0
    }

    /// Text used to embed this entry: `"<title>: <content>"`.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.title, self.content)
    }
}

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    CategoryMatch,
    ContentSearch,
    VectorSearch,
    Fallback,
}

impl ResultSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultSource::CategoryMatch => "category_match",
            ResultSource::ContentSearch => "content_search",
            ResultSource::VectorSearch => "vector_search",
            ResultSource::Fallback => "fallback",
        }
    }
}

/// Per-strategy scores. Unset strategy scores read as `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub keyword: f64,
    pub vector: f64,
    pub combined: f64,
}

/// A knowledge entry plus the scores a search assigned to it.
///
/// Identity (for deduplication) is `entry.id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub entry: KnowledgeEntry,
    pub scores: Scores,
    pub source: ResultSource,
}

impl SearchResult {
    pub fn keyword(entry: KnowledgeEntry, score: f64, source: ResultSource) -> Self {
        Self {
            entry,
            scores: Scores {
                keyword: score,
                combined: score,
                ..Scores::default()
            },
            source,
        }
    }

    pub fn vector(entry: KnowledgeEntry, score: f64) -> Self {
        Self {
            entry,
            scores: Scores {
                vector: score,
                combined: score,
                ..Scores::default()
            },
            source: ResultSource::VectorSearch,
        }
    }

    pub fn id(&self) -> i32 {
        self.entry.id
    }

    /// The score downstream consumers rank and threshold on.
    pub fn score(&self) -> f64 {
        self.scores.combined
    }

    /// `round(score * 100)` clamped into `0..=100`.
    pub fn confidence_percent(&self) -> u8 {
        (self.score() * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Sort descending by combined score; equal scores keep their incoming order.
pub(crate) fn sort_by_score_desc(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score().total_cmp(&a.score()));
}
