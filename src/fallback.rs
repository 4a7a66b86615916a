//! # Fallback answers
//!
//! Deterministic replies used whenever the language model cannot answer.
//! Evaluated in order, first match wins:
//!
//! 1. A personal question (age, family, ...) that no retrieved result covers
//!    gets a fixed disclaimer pointing to direct contact.
//! 2. Otherwise the best result is quoted behind its category phrase.
//! 3. Otherwise a generic overview greeting.
//!
//! Every branch yields a non-empty sentence in the requested language.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Profile;
use crate::knowledge::SearchResult;
use crate::language::Language;

/// English patterns match whole words only, so "languages" is not "age".
static ENGLISH_PERSONAL_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(age|old|birthday|born|favorite|likes|hobbies|relationship|married|family|address|phone number|personal life)\b",
    )
    .expect("valid personal-question regex")
});

const CHINESE_PERSONAL_PATTERNS: &[&str] = &[
    "年龄", "几岁", "多大", "生日", "出生", "结婚", "婚姻", "恋爱", "女朋友", "男朋友", "家人",
    "家庭", "住址", "电话号码", "私生活",
];

/// Whether `message` asks about something personal the knowledge base does
/// not usually hold.
pub fn is_personal_question(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ENGLISH_PERSONAL_PATTERNS.is_match(&lowered)
        || CHINESE_PERSONAL_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
}

/// Pick the fallback reply for `message`.
///
/// `results` are the ranked results, best first. A result "covers" the
/// question when it scores above `relevance_threshold`.
pub fn fallback_response(
    message: &str,
    results: &[SearchResult],
    language: Language,
    profile: &Profile,
    relevance_threshold: f64,
) -> String {
    let covered = results.iter().any(|r| r.score() > relevance_threshold);
    if is_personal_question(message) && !covered {
        return personal_disclaimer(language, profile);
    }
    match results.first() {
        Some(best) => quote_result(best, language, profile),
        None => greeting(language, profile),
    }
}

fn personal_disclaimer(language: Language, profile: &Profile) -> String {
    let name = profile.display_name(language);
    match language {
        Language::En => {
            format!(
                "I don't have that specific information about {name}. I have details about {name}'s \
                 education, professional skills, projects, and achievements, but not personal details \
                 like this. For such specific information, I'd recommend contacting {name} directly \
                 through this website."
            )
        }
        Language::Zh => {
            format!(
                "抱歉，我没有关于{name}的这个具体信息。我主要了解{name}的教育背景、专业技能、项目经验和获奖情况。\
                 如需了解更多个人信息，建议直接通过网站联系{name}。"
            )
        }
    }
}

fn quote_result(result: &SearchResult, language: Language, profile: &Profile) -> String {
    let category = result.entry.category.profile();
    let content = result.entry.content.trim().trim_end_matches(['.', '。']);
    let name = profile.display_name(language);
    match language {
        Language::En => {
            let phrase = category.english_phrase.replace("{name}", name);
            format!("{phrase}: {content}. For more information, please contact {name} directly through this website.")
        }
        Language::Zh => {
            let phrase = category.chinese_phrase.replace("{name}", name);
            format!("{phrase}：{content}。如需了解更多信息，请通过网站联系{name}。")
        }
    }
}

fn greeting(language: Language, profile: &Profile) -> String {
    let name = profile.display_name(language);
    match language {
        Language::En => {
            format!(
                "Thank you for your question! I have information about {name}'s education, projects, \
                 skills, and achievements. Please feel free to contact {name} directly through this website."
            )
        }
        Language::Zh => {
            format!(
                "感谢您的问题！我可以为您提供{name}的教育背景、项目经验、技能和获奖情况等信息。请随时通过网站与{name}联系。"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Category, ResultSource};
    use crate::test_support::entry;

    fn result(category: Category, content: &str, score: f64) -> SearchResult {
        SearchResult::keyword(entry(1, category, "t", content, 5), score, ResultSource::CategoryMatch)
    }

    #[test]
    fn personal_patterns_in_both_languages() {
        assert!(is_personal_question("How OLD is Yiming?"));
        assert!(is_personal_question("Is he married?"));
        assert!(is_personal_question("一鸣几岁了？"));
        assert!(!is_personal_question("What projects has Yiming built?"));
    }

    #[test]
    fn english_patterns_need_whole_words() {
        assert!(!is_personal_question("What languages does Yiming speak?"));
        assert!(!is_personal_question("Does he hold a degree?"));
        assert!(is_personal_question("What is his phone number?"));

        let out = fallback_response("What languages does Yiming speak?", &[], Language::En, &Profile::default(), 0.3);
        assert!(out.starts_with("Thank you for your question!"));
    }

    #[test]
    fn uncovered_personal_question_gets_disclaimer() {
        let profile = Profile::default();
        let weak = [result(Category::Education, "EIT Digital", 0.2)];
        let en = fallback_response("What is his birthday?", &weak, Language::En, &profile, 0.3);
        assert!(en.starts_with("I don't have that specific information about Yiming."));
        let zh = fallback_response("一鸣的生日是哪天？", &[], Language::Zh, &profile, 0.3);
        assert!(zh.starts_with("抱歉"));
        assert!(zh.contains("李一鸣"));
    }

    #[test]
    fn covered_personal_question_quotes_the_result() {
        let profile = Profile::default();
        let strong = [result(Category::Interests, "Climbing and chess", 0.9)];
        let out = fallback_response("What are his hobbies?", &strong, Language::En, &profile, 0.3);
        assert_eq!(
            out,
            "About Yiming's interests: Climbing and chess. For more information, please contact Yiming directly through this website."
        );
    }

    #[test]
    fn best_result_is_quoted_in_chinese() {
        let profile = Profile::default();
        let results = [result(Category::Education, "EIT Digital Master School.", 0.68)];
        let out = fallback_response("一鸣在哪里读书？", &results, Language::Zh, &profile, 0.3);
        assert_eq!(
            out,
            "关于李一鸣的教育背景：EIT Digital Master School。如需了解更多信息，请通过网站联系李一鸣。"
        );
    }

    #[test]
    fn empty_results_get_a_greeting_and_never_empty() {
        let profile = Profile::default();
        for language in [Language::En, Language::Zh] {
            for message in ["", "hello", "你好", "how old"] {
                let out = fallback_response(message, &[], language, &profile, 0.3);
                assert!(!out.trim().is_empty());
            }
        }
        let en = fallback_response("hello", &[], Language::En, &profile, 0.3);
        assert!(en.starts_with("Thank you for your question!"));
    }
}
