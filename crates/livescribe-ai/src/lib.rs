pub mod context;
pub mod insights;
pub mod knowledge;
pub mod llm;
pub mod prompt;
pub mod qa;

pub use context::{ContextStats, ContextStore};
pub use insights::{Insight, InsightGenerator, InsightKind};
pub use knowledge::{DocumentSummary, KbStats, KnowledgeBase, KnowledgeDocument};
pub use llm::{GeminiLlm, LlmClient, LlmError};
pub use qa::{QaHandler, DEFAULT_SUGGESTED_QUESTIONS, SUGGESTED_QUESTION_COUNT};
