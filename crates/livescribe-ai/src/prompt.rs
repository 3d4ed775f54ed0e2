//! Prompt assembly shared by insights and Q&A.
//!
//! Every prompt is built the same way: optional knowledge-base section,
//! optional session-focus preamble, the task instruction and the complete
//! transcript. The full history goes in every time; the model's context
//! window is assumed to be large enough for realistic meetings.

use tracing::warn;

/// Logs when a prompt grows past the soft budget. Never truncates;
/// the full transcript is the whole point.
pub fn check_budget(prompt: &str, soft_limit_chars: usize) {
    if soft_limit_chars > 0 && prompt.len() > soft_limit_chars {
        warn!(
            "prompt length {} chars exceeds soft budget of {}",
            prompt.len(),
            soft_limit_chars
        );
    }
}

/// Inputs gathered from the stores right before an LLM call.
#[derive(Clone, Debug, Default)]
pub struct PromptContext {
    pub kb_content: String,
    pub intent: String,
    pub transcript: String,
}

impl PromptContext {
    pub fn has_kb(&self) -> bool {
        !self.kb_content.is_empty()
    }

    pub fn has_intent(&self) -> bool {
        !self.intent.is_empty()
    }

    fn preamble(&self) -> String {
        let mut parts = String::new();
        if self.has_kb() {
            parts.push_str(&format!("KNOWLEDGE BASE:\n{}\n\n", self.kb_content));
        }
        if self.has_intent() {
            parts.push_str(&format!(
                "The user's goal for this session is: '{}'\n\n",
                self.intent
            ));
        }
        parts
    }

    pub fn summary_prompt(&self) -> String {
        let kb_clause = if self.has_kb() { " and knowledge base" } else { "" };
        let focus_clause = if self.has_intent() {
            format!(", especially related to {}", self.intent)
        } else {
            String::new()
        };
        let kb_hint = if self.has_kb() {
            " Connect insights to the knowledge base when relevant."
        } else {
            ""
        };
        format!(
            "{}Based on the meeting transcript{kb_clause}, provide an insightful observation \
             about what's happening in the conversation (2-3 sentences, ~400 characters).\n\n\
             Complete Meeting Transcript:\n{}\n\n\
             Share an interesting insight, pattern, or notable point from the \
             discussion{focus_clause}.{kb_hint} Make it a statement, not a question:",
            self.preamble(),
            self.transcript
        )
    }

    pub fn themes_prompt(&self) -> String {
        let kb_clause = if self.has_kb() {
            " and knowledge base context"
        } else {
            ""
        };
        let focus_clause = if self.has_intent() {
            format!(", particularly regarding {}", self.intent)
        } else {
            String::new()
        };
        let kb_hint = if self.has_kb() {
            " Reference the knowledge base when relevant."
        } else {
            ""
        };
        format!(
            "{}From the meeting transcript{kb_clause}, extract key themes, decisions, or \
             noteworthy moments (2-3 sentences, ~400 characters).\n\n\
             Complete Meeting Transcript:\n{}\n\n\
             Identify what's most interesting or important about the conversation so \
             far{focus_clause}.{kb_hint} Focus on patterns, decisions, or notable developments:",
            self.preamble(),
            self.transcript
        )
    }

    pub fn clarifying_questions_prompt(&self) -> String {
        let kb_clause = if self.has_kb() { " and knowledge base" } else { "" };
        let focus_clause = if self.has_intent() {
            format!(" regarding {}", self.intent)
        } else {
            String::new()
        };
        let kb_hint = if self.has_kb() {
            " Use the knowledge base to inform your questions."
        } else {
            ""
        };
        format!(
            "{}Based on the meeting discussion{kb_clause}, suggest 2-3 thoughtful clarifying \
             questions (aim for ~400 characters).\n\n\
             Complete Meeting Transcript:\n{}\n\n\
             Identify key gaps or areas needing clarification{focus_clause}.{kb_hint}\n\
             Format each question on a new line. Make them specific and actionable:",
            self.preamble(),
            self.transcript
        )
    }

    pub fn qa_prompt(&self, question: &str) -> String {
        let transcript = if self.transcript.is_empty() {
            "No meeting context available yet."
        } else {
            &self.transcript
        };
        format!(
            "{}You are an AI assistant with access to the COMPLETE meeting transcript from \
             beginning to end. Please answer the following question using information from the \
             meeting transcript and any provided knowledge base.\n\n\
             Complete Meeting Transcript (everything from start to now):\n{transcript}\n\n\
             Question: {question}\n\n\
             Please provide a comprehensive answer based on the ENTIRE meeting transcript and \
             knowledge base. If the knowledge base contains relevant information, incorporate \
             it into your answer. You have access to everything that has been said from the \
             beginning of the meeting.\n\nAnswer:",
            self.preamble()
        )
    }

    pub fn suggested_questions_prompt(&self) -> String {
        let kb_clause = if self.has_kb() { " and knowledge base" } else { "" };
        let focus_clause = if self.has_intent() {
            format!(", with special focus on {}", self.intent)
        } else {
            String::new()
        };
        format!(
            "{}Based on the COMPLETE meeting transcript from beginning to end{kb_clause}, \
             generate exactly 4 specific questions that attendees might want to ask. These \
             should be relevant to ANY topics discussed throughout the ENTIRE meeting, not \
             just recent parts.\n\n\
             Complete Meeting Transcript (entire history):\n{}\n\n\
             Considering ALL topics and discussions from the ENTIRE meeting{focus_clause}, \
             list exactly 4 questions, one per line, without numbering or bullet points. \
             Each question should end with a question mark.",
            self.preamble(),
            self.transcript
        )
    }
}
