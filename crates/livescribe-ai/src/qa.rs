//! Interactive question answering over the full meeting context.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use livescribe_core::config::LlmConfig;

use crate::context::ContextStore;
use crate::knowledge::KnowledgeBase;
use crate::llm::LlmClient;
use crate::prompt::{check_budget, PromptContext};

pub const SUGGESTED_QUESTION_COUNT: usize = 4;

/// Padding used when the model yields fewer than four usable questions.
pub const DEFAULT_SUGGESTED_QUESTIONS: [&str; 4] = [
    "What are the key technical details mentioned?",
    "What are the next steps or action items?",
    "Who is responsible for each task?",
    "What timeline was discussed?",
];

#[derive(Clone, Debug, PartialEq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Answers client questions and produces the suggested-question sets.
///
/// A chat history is kept for inspection and pruning, but each LLM call
/// passes a single concatenated prompt; the full transcript carries the
/// conversation context.
pub struct QaHandler {
    config: LlmConfig,
    llm: Arc<dyn LlmClient>,
    context: ContextStore,
    knowledge: KnowledgeBase,
    history: Mutex<Vec<ChatMessage>>,
}

impl QaHandler {
    pub fn new(
        config: LlmConfig,
        llm: Arc<dyn LlmClient>,
        context: ContextStore,
        knowledge: KnowledgeBase,
    ) -> Self {
        Self {
            config,
            llm,
            context,
            knowledge,
            history: Mutex::new(Vec::new()),
        }
    }

    async fn prompt_context(&self, intent: &str) -> PromptContext {
        let intent = if intent.is_empty() {
            self.config.focus_prompt.clone()
        } else {
            intent.to_string()
        };
        PromptContext {
            kb_content: self.knowledge.content().await,
            intent,
            transcript: self.context.transcript_text().await,
        }
    }

    /// Answers one question against the full context plus knowledge base.
    pub async fn answer(&self, question: &str, intent: &str) -> Result<String> {
        self.push_message(ChatRole::User, question).await;

        let ctx = self.prompt_context(intent).await;
        let prompt = ctx.qa_prompt(question);
        check_budget(&prompt, self.config.context_soft_limit_chars);

        let answer = self
            .llm
            .generate(&prompt)
            .await
            .context("question answering failed")?;

        self.push_message(ChatRole::Assistant, &answer).await;
        Ok(answer)
    }

    /// Exactly four suggested questions. Model output is parsed line by
    /// line; shortfalls are padded with the defaults, LLM failures return
    /// the defaults outright.
    pub async fn suggested_questions(&self, intent: &str) -> Vec<String> {
        let ctx = self.prompt_context(intent).await;
        if ctx.transcript.is_empty() {
            debug!("no transcript context yet, returning default questions");
            return DEFAULT_SUGGESTED_QUESTIONS
                .iter()
                .map(|q| q.to_string())
                .collect();
        }

        let prompt = ctx.suggested_questions_prompt();
        check_budget(&prompt, self.config.context_soft_limit_chars);
        match self.llm.generate(&prompt).await {
            Ok(response) => parse_suggested_questions(&response),
            Err(e) => {
                warn!("suggested question generation failed: {e}");
                DEFAULT_SUGGESTED_QUESTIONS
                    .iter()
                    .map(|q| q.to_string())
                    .collect()
            }
        }
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Q/A pairs rendered for display.
    pub async fn conversation_summary(&self) -> String {
        let history = self.history.lock().await;
        if history.is_empty() {
            return "No Q&A conversation yet.".to_string();
        }
        history
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| format!("Q: {}\nA: {}", pair[0].content, pair[1].content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn push_message(&self, role: ChatRole, content: &str) {
        let mut history = self.history.lock().await;
        history.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        // Prune oldest-first once the cap is crossed
        let cap = self.config.max_conversation_length;
        if history.len() > cap {
            let excess = history.len() - cap;
            history.drain(..excess);
        }
    }
}

/// Splits an LLM response into question lines: strips list markers, keeps
/// lines containing `?`, pads with defaults and truncates to four.
pub fn parse_suggested_questions(response: &str) -> Vec<String> {
    let mut questions: Vec<String> = response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || c == '.' || c == '-' || c == '*' || c == '•' || c == '●' || c == ' '
                })
                .to_string()
        })
        .filter(|line| !line.is_empty() && line.contains('?'))
        .collect();

    let mut defaults = DEFAULT_SUGGESTED_QUESTIONS.iter();
    while questions.len() < SUGGESTED_QUESTION_COUNT {
        match defaults.next() {
            Some(q) => questions.push(q.to_string()),
            None => break,
        }
    }
    questions.truncate(SUGGESTED_QUESTION_COUNT);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use livescribe_audio::TranscriptSegment;
    use std::sync::Mutex as StdMutex;

    struct ScriptedLlm {
        responses: StdMutex<Vec<Result<String, String>>>,
        prompts: StdMutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses),
                prompts: StdMutex::new(Vec::new()),
            })
        }

        fn always(response: &str) -> Arc<Self> {
            Self::new(vec![Ok(response.to_string()); 32])
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Request("script exhausted".into()));
            }
            responses.remove(0).map_err(LlmError::Request)
        }
    }

    fn segment(sequence: u64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            spans: vec![],
            language: "en".to_string(),
            batch_sequence: sequence,
            timestamp: Utc::now(),
            duration: 3.0,
            model: "whisper-1".to_string(),
        }
    }

    fn handler(llm: Arc<ScriptedLlm>, context: ContextStore) -> QaHandler {
        QaHandler::new(LlmConfig::default(), llm, context, KnowledgeBase::new())
    }

    // ──────────────────────────────────────────────────────────
    // Answering
    // ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_answer_includes_all_segments_verbatim() {
        let context = ContextStore::new();
        let words = ["budget", "timeline", "Friday", "approval", "handoff"];
        for (i, word) in words.iter().enumerate() {
            context
                .append(segment(i as u64, &format!("segment about {word}")))
                .await;
        }
        let llm = ScriptedLlm::always("the answer");
        let qa = handler(llm.clone(), context);

        let answer = qa.answer("Who is doing what by when?", "").await.unwrap();
        assert_eq!(answer, "the answer");

        let prompt = llm.last_prompt();
        for word in words {
            assert!(
                prompt.contains(&format!("segment about {word}")),
                "prompt missing segment with {word}"
            );
        }
        assert!(prompt.contains("Question: Who is doing what by when?"));
    }

    #[tokio::test]
    async fn test_answer_includes_kb_content() {
        let context = ContextStore::new();
        context.append(segment(0, "hello")).await;
        let kb = KnowledgeBase::new();
        kb.add("# Pricing\nthe enterprise tier costs 100").await;
        let llm = ScriptedLlm::always("ok");
        let qa = QaHandler::new(LlmConfig::default(), llm.clone(), context, kb);

        qa.answer("How much?", "").await.unwrap();
        assert!(llm.last_prompt().contains("the enterprise tier costs 100"));
    }

    #[tokio::test]
    async fn test_answer_works_with_empty_context() {
        let llm = ScriptedLlm::always("no context answer");
        let qa = handler(llm, ContextStore::new());
        let answer = qa.answer("Anything yet?", "").await.unwrap();
        assert_eq!(answer, "no context answer");
    }

    #[tokio::test]
    async fn test_answer_error_propagates() {
        let llm = ScriptedLlm::new(vec![Err("rate limited".to_string())]);
        let qa = handler(llm, ContextStore::new());
        assert!(qa.answer("q", "").await.is_err());
    }

    #[tokio::test]
    async fn test_history_grows_and_prunes() {
        let llm = ScriptedLlm::always("a");
        let context = ContextStore::new();
        let qa = QaHandler::new(
            LlmConfig {
                max_conversation_length: 4,
                ..Default::default()
            },
            llm,
            context,
            KnowledgeBase::new(),
        );

        for i in 0..5 {
            qa.answer(&format!("question {i}"), "").await.unwrap();
        }
        assert_eq!(qa.history_len().await, 4, "history capped at the limit");
    }

    #[tokio::test]
    async fn test_conversation_summary() {
        let llm = ScriptedLlm::always("the answer");
        let qa = handler(llm, ContextStore::new());
        assert_eq!(qa.conversation_summary().await, "No Q&A conversation yet.");

        qa.answer("first?", "").await.unwrap();
        let summary = qa.conversation_summary().await;
        assert!(summary.contains("Q: first?"));
        assert!(summary.contains("A: the answer"));
    }

    // ──────────────────────────────────────────────────────────
    // Suggested questions
    // ──────────────────────────────────────────────────────────

    #[test]
    fn test_parse_strips_markers() {
        let response = "1. What is the budget?\n- Who approves it?\n* When is it due?\n• Why now?";
        let questions = parse_suggested_questions(response);
        assert_eq!(
            questions,
            vec![
                "What is the budget?",
                "Who approves it?",
                "When is it due?",
                "Why now?"
            ]
        );
    }

    #[test]
    fn test_parse_drops_non_questions_and_pads() {
        let response = "Here are some questions:\nWhat is the plan?\nno question mark here";
        let questions = parse_suggested_questions(response);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0], "What is the plan?");
        assert_eq!(questions[1], DEFAULT_SUGGESTED_QUESTIONS[0]);
        assert_eq!(questions[3], DEFAULT_SUGGESTED_QUESTIONS[2]);
    }

    #[test]
    fn test_parse_truncates_to_four() {
        let response = (0..6)
            .map(|i| format!("Question number {i}?"))
            .collect::<Vec<_>>()
            .join("\n");
        let questions = parse_suggested_questions(&response);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[3], "Question number 3?");
    }

    #[test]
    fn test_parse_empty_response_gives_defaults() {
        let questions = parse_suggested_questions("");
        assert_eq!(questions.len(), 4);
        for (q, d) in questions.iter().zip(DEFAULT_SUGGESTED_QUESTIONS) {
            assert_eq!(q, d);
        }
    }

    #[tokio::test]
    async fn test_suggested_questions_happy_path() {
        let context = ContextStore::new();
        context.append(segment(0, "we talked about shipping")).await;
        let llm = ScriptedLlm::always("When do we ship?\nWho signs off?\nWhat is blocked?\nWhere are the docs?");
        let qa = handler(llm, context);

        let questions = qa.suggested_questions("").await;
        assert_eq!(questions.len(), 4);
        assert!(questions.iter().all(|q| q.contains('?')));
        assert_eq!(questions[0], "When do we ship?");
    }

    #[tokio::test]
    async fn test_suggested_questions_llm_failure_gives_defaults() {
        let context = ContextStore::new();
        context.append(segment(0, "content")).await;
        let llm = ScriptedLlm::new(vec![Err("boom".to_string())]);
        let qa = handler(llm, context);

        let questions = qa.suggested_questions("").await;
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0], DEFAULT_SUGGESTED_QUESTIONS[0]);
    }

    #[tokio::test]
    async fn test_suggested_questions_empty_context_gives_defaults_without_call() {
        let llm = ScriptedLlm::always("never called");
        let qa = handler(llm.clone(), ContextStore::new());
        let questions = qa.suggested_questions("").await;
        assert_eq!(questions.len(), 4);
        assert!(llm.prompts.lock().unwrap().is_empty(), "no llm call on empty context");
    }
}
