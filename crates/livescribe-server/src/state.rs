//! Process-wide server state threaded through the WebSocket handlers and
//! background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use livescribe_ai::{ContextStore, InsightGenerator, KnowledgeBase, LlmClient, QaHandler};
use livescribe_core::config::Config;
use livescribe_core::keys::ApiKeyStore;

use crate::session::SessionManager;

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub context: ContextStore,
    pub knowledge: KnowledgeBase,
    pub qa: QaHandler,
    pub insights: InsightGenerator,
    pub keys: Mutex<ApiKeyStore>,
    /// False at process start; frames are discarded ahead of the segmenter
    /// until a client enables recording.
    recording_enabled: AtomicBool,
    /// Latest client-supplied session intent, shared by every session.
    intent: RwLock<String>,
    /// Most recently generated suggested-question set.
    suggested: RwLock<Vec<String>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>, keys: ApiKeyStore) -> Arc<Self> {
        let context = ContextStore::new();
        let knowledge = KnowledgeBase::new();
        let qa = QaHandler::new(
            config.llm.clone(),
            llm.clone(),
            context.clone(),
            knowledge.clone(),
        );
        let insights = InsightGenerator::new(
            config.llm.clone(),
            llm,
            context.clone(),
            knowledge.clone(),
        );
        let sessions = SessionManager::new(&config.server);
        Arc::new(Self {
            config,
            sessions,
            context,
            knowledge,
            qa,
            insights,
            keys: Mutex::new(keys),
            recording_enabled: AtomicBool::new(false),
            intent: RwLock::new(String::new()),
            suggested: RwLock::new(Vec::new()),
            started_at: Utc::now(),
        })
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled.load(Ordering::Relaxed)
    }

    pub fn set_recording_enabled(&self, enabled: bool) {
        self.recording_enabled.store(enabled, Ordering::Relaxed);
    }

    pub async fn intent(&self) -> String {
        self.intent.read().await.clone()
    }

    pub async fn set_intent(&self, intent: impl Into<String>) {
        *self.intent.write().await = intent.into();
    }

    pub async fn suggested_questions(&self) -> Vec<String> {
        self.suggested.read().await.clone()
    }

    pub async fn set_suggested_questions(&self, questions: Vec<String>) {
        *self.suggested.write().await = questions;
    }

    pub async fn health(&self) -> Value {
        let uptime = (Utc::now() - self.started_at).num_seconds();
        let sessions = self.sessions.stats().await;
        let context = self.context.stats().await;
        json!({
            "status": "healthy",
            "uptime_seconds": uptime,
            "recording": self.recording_enabled(),
            "active_sessions": sessions.active_sessions,
            "questions_answered": sessions.questions_answered,
            "transcript": {
                "segments": context.segment_count,
                "total_duration": context.total_duration,
                "word_count": context.word_count,
            },
        })
    }
}
