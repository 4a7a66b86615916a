//! # Query translation
//!
//! Rewrites a Chinese question into English before searching an English
//! knowledge base. Best effort: any failure returns the input unchanged.

use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::llm::{GenerationConfig, LanguageModel, with_timeout};

#[derive(Clone)]
pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    subject: String,
    timeout: Duration,
}

impl QueryTranslator {
    /// `subject` is the full name of the person questions are about.
    pub fn new(model: Arc<dyn LanguageModel>, subject: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model,
            subject: subject.into(),
            timeout,
        }
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "You are a query translator. Translate the following Chinese question about {} to English, \
             keeping the same meaning and intent. Only return the English translation, nothing else.\n\n\
             Chinese question: {text}\n\n\
             English translation:",
            self.subject
        )
    }

    /// The trimmed English translation of `text`, or `text` itself when the
    /// model fails, times out or returns nothing.
    pub async fn translate_to_english(&self, text: &str) -> String {
        let prompt = self.prompt(text);
        match with_timeout(
            self.timeout,
            self.model.generate(&prompt, &GenerationConfig::TRANSLATION),
        )
        .await
        {
            Ok(translated) if !translated.trim().is_empty() => {
                let translated = translated.trim().to_string();
                debug!(original = text, translated = %translated, "query translated");
                translated
            }
            Ok(_) => {
                warn!("translation returned empty text; using original query");
                text.to_string()
            }
            Err(e) => {
                warn!(error = %e, "translation failed; using original query");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    fn translator(model: Arc<ScriptedModel>) -> QueryTranslator {
        QueryTranslator::new(model, "Yiming Li", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn returns_trimmed_translation_with_translation_sampling() {
        let model = Arc::new(ScriptedModel::replying(["  Where did Yiming study?\n"]));
        let out = translator(model.clone()).translate_to_english("一鸣在哪里读书？").await;
        assert_eq!(out, "Where did Yiming study?");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("about Yiming Li to English"));
        assert!(prompts[0].contains("Chinese question: 一鸣在哪里读书？"));
        assert!(prompts[0].ends_with("English translation:"));
        assert_eq!(model.configs()[0], GenerationConfig::TRANSLATION);
    }

    #[tokio::test]
    async fn failure_and_empty_output_pass_through() {
        let failing = translator(Arc::new(ScriptedModel::failing()));
        assert_eq!(failing.translate_to_english("你好").await, "你好");

        let empty = translator(Arc::new(ScriptedModel::replying(["   "])));
        assert_eq!(empty.translate_to_english("你好").await, "你好");
    }
}
