//! Timed LLM observations over the accumulating transcript.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livescribe_core::config::LlmConfig;

use crate::context::ContextStore;
use crate::knowledge::KnowledgeBase;
use crate::llm::LlmClient;
use crate::prompt::PromptContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Summary,
    ActionItem,
    Question,
    Decision,
    FollowUp,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InsightKind::Summary => "summary",
            InsightKind::ActionItem => "action_item",
            InsightKind::Question => "question",
            InsightKind::Decision => "decision",
            InsightKind::FollowUp => "follow_up",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub content: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Seconds of transcript the insight reflected.
    pub context_duration: f64,
}

/// Generates summary/theme/question insights from the full context.
pub struct InsightGenerator {
    config: LlmConfig,
    llm: Arc<dyn LlmClient>,
    context: ContextStore,
    knowledge: KnowledgeBase,
}

impl InsightGenerator {
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

    async fn generate(&self, prompt: String, kind: InsightKind, confidence: f64) -> Result<Insight> {
        crate::prompt::check_budget(&prompt, self.config.context_soft_limit_chars);
        let content = self
            .llm
            .generate(&prompt)
            .await
            .context("insight generation failed")?;
        Ok(Insight {
            kind,
            content,
            confidence,
            timestamp: Utc::now(),
            context_duration: self.context.stats().await.total_duration,
        })
    }

    /// An observation about what is happening in the conversation.
    pub async fn generate_summary(&self, intent: &str) -> Result<Insight> {
        let ctx = self.prompt_context(intent).await;
        if ctx.transcript.is_empty() {
            bail!("no context available for summary");
        }
        self.generate(ctx.summary_prompt(), InsightKind::Summary, 0.8)
            .await
    }

    /// Key themes, decisions and noteworthy moments.
    pub async fn generate_themes(&self, intent: &str) -> Result<Insight> {
        let ctx = self.prompt_context(intent).await;
        if ctx.transcript.is_empty() {
            bail!("no context available for insights");
        }
        self.generate(ctx.themes_prompt(), InsightKind::Summary, 0.85)
            .await
    }

    /// Clarifying questions the attendees may want to raise.
    pub async fn generate_questions(&self, intent: &str) -> Result<Insight> {
        let ctx = self.prompt_context(intent).await;
        if ctx.transcript.is_empty() {
            bail!("no context available for questions");
        }
        self.generate(
            ctx.clarifying_questions_prompt(),
            InsightKind::Question,
            0.7,
        )
        .await
    }

    /// One tick of the automated cadence: summary and themes alternate,
    /// deterministically derived from the wall clock so restarts keep the
    /// same rotation.
    pub async fn generate_for_tick(&self, intent: &str) -> Result<Insight> {
        let interval = self.config.insight_interval.max(1);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if (now / interval) % 2 == 0 {
            self.generate_summary(intent).await
        } else {
            self.generate_themes(intent).await
        }
    }
}
