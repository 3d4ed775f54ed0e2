//! Routing of inbound WebSocket messages to the stores and back out as
//! typed responses and broadcasts.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::protocol::{
    parse_inbound, Inbound, Outbound, ParseFailure, QuestionsPayload, RecordingAction,
};
use crate::session::QaPair;
use crate::state::AppState;

/// Default answer confidence reported to clients.
const ANSWER_CONFIDENCE: f64 = 0.8;

/// Sends the connect-time greeting: a status message carrying the session
/// id, the current knowledge-base content, and the current recording state.
pub async fn send_welcome(state: &Arc<AppState>, session_id: &str) {
    let welcome = Outbound::Status {
        message: "Connected to Live Q&A".to_string(),
        session_id: Some(session_id.to_string()),
        timestamp: Utc::now(),
    };
    state.sessions.send_to(session_id, &welcome).await;

    let kb = Outbound::KbContent {
        content: state.knowledge.content().await,
        timestamp: Utc::now(),
    };
    state.sessions.send_to(session_id, &kb).await;

    state
        .sessions
        .send_to(session_id, &Outbound::recording_status(state.recording_enabled()))
        .await;
}

/// Processes one raw frame from a client. Parse and validation failures
/// answer with a typed error; the connection always stays open.
pub async fn process_message(state: &Arc<AppState>, session_id: &str, raw: &str) {
    let message = match parse_inbound(raw) {
        Ok(message) => message,
        Err(ParseFailure::MalformedJson) => {
            state
                .sessions
                .send_to(session_id, &Outbound::error("Invalid JSON format", None))
                .await;
            return;
        }
        Err(ParseFailure::Invalid {
            description,
            request_id,
        }) => {
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::error(format!("Invalid message: {description}"), request_id),
                )
                .await;
            return;
        }
    };

    match message {
        Inbound::Question {
            content,
            request_id,
        } => handle_question(state, session_id, content, request_id).await,
        Inbound::Intent { content } => handle_intent(state, session_id, content).await,
        Inbound::RecordingControl { content } => {
            handle_recording_control(state, session_id, content.action).await
        }
        Inbound::StatusRequest { .. } => {
            // The only request kind that validates is recording_status
            state
                .sessions
                .send_to(session_id, &Outbound::recording_status(state.recording_enabled()))
                .await;
        }
        Inbound::UpdateKb { content } => handle_update_kb(state, session_id, content).await,
        Inbound::ListKbRecords => {
            let records = state.knowledge.list().await;
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::KbRecordsList {
                        records,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        Inbound::CreateKbRecord { content } => {
            let doc_id = state.knowledge.add(content).await;
            let title = state
                .knowledge
                .get(&doc_id)
                .await
                .map(|doc| doc.title())
                .unwrap_or_default();
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::KbRecordCreated {
                        success: true,
                        doc_id,
                        title,
                        timestamp: Utc::now(),
                    },
                )
                .await;
            broadcast_kb_changed(state).await;
        }
        Inbound::UpdateKbRecord { doc_id, content } => {
            let success = state.knowledge.update(&doc_id, content).await;
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::KbRecordUpdated {
                        success,
                        doc_id,
                        timestamp: Utc::now(),
                    },
                )
                .await;
            if success {
                broadcast_kb_changed(state).await;
            }
        }
        Inbound::DeleteKbRecord { doc_id } => {
            let success = state.knowledge.remove(&doc_id).await;
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::KbRecordDeleted {
                        success,
                        doc_id,
                        timestamp: Utc::now(),
                    },
                )
                .await;
            if success {
                broadcast_kb_changed(state).await;
            }
        }
        Inbound::GetKbRecord { doc_id } => {
            match state.knowledge.get(&doc_id).await {
                Some(doc) => {
                    state
                        .sessions
                        .send_to(
                            session_id,
                            &Outbound::KbRecordContent {
                                doc_id,
                                title: doc.title(),
                                content: doc.content,
                                timestamp: Utc::now(),
                            },
                        )
                        .await;
                }
                None => {
                    state
                        .sessions
                        .send_to(
                            session_id,
                            &Outbound::error(format!("document not found: {doc_id}"), None),
                        )
                        .await;
                }
            }
        }
        Inbound::GetApiKeys => {
            let keys = {
                let store = state.keys.lock().await;
                store.load().unwrap_or_default().masked()
            };
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::ApiKeys {
                        openai_key: keys.openai_key,
                        gemini_key: keys.gemini_key,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        Inbound::SetApiKeys {
            openai_key,
            gemini_key,
        } => {
            let result = {
                let store = state.keys.lock().await;
                store.store(&openai_key, &gemini_key)
            };
            let (success, message) = match result {
                Ok(()) => (true, "API keys updated successfully".to_string()),
                Err(e) => (false, e.to_string()),
            };
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::ApiKeysUpdated {
                        success,
                        message,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
    }
}

async fn handle_question(
    state: &Arc<AppState>,
    session_id: &str,
    question: String,
    request_id: Option<String>,
) {
    debug!("processing question from {session_id}");
    let intent = state.intent().await;
    let started = Instant::now();

    match state.qa.answer(&question, &intent).await {
        Ok(answer) => {
            let processing_time = started.elapsed().as_secs_f64();
            state
                .sessions
                .record_qa(
                    session_id,
                    QaPair {
                        question: question.clone(),
                        answer: answer.clone(),
                        processing_time,
                        timestamp: Utc::now(),
                    },
                )
                .await;
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::Answer {
                        question,
                        content: answer,
                        request_id,
                        confidence: ANSWER_CONFIDENCE,
                        processing_time,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        Err(e) => {
            warn!("question answering failed: {e:#}");
            state
                .sessions
                .send_to(
                    session_id,
                    &Outbound::error(format!("Failed to process question: {e:#}"), request_id),
                )
                .await;
        }
    }
}

async fn handle_intent(state: &Arc<AppState>, session_id: &str, content: String) {
    let intent = content.trim().to_string();
    info!("session intent updated: '{intent}'");
    state.set_intent(intent.clone()).await;

    let label = if intent.is_empty() { "Default" } else { &intent };
    state
        .sessions
        .send_to(
            session_id,
            &Outbound::status(format!("Session focus updated: {label}")),
        )
        .await;
}

async fn handle_recording_control(
    state: &Arc<AppState>,
    session_id: &str,
    action: RecordingAction,
) {
    let enabled = matches!(action, RecordingAction::Start);
    state.set_recording_enabled(enabled);
    info!(
        "recording {} by session {session_id}",
        if enabled { "started" } else { "stopped" }
    );

    let verb = if enabled { "started" } else { "stopped" };
    state
        .sessions
        .send_to(session_id, &Outbound::status(format!("Recording {verb}")))
        .await;
    state
        .sessions
        .broadcast(&Outbound::recording_status(enabled))
        .await;
}

async fn handle_update_kb(state: &Arc<AppState>, session_id: &str, content: String) {
    state.knowledge.replace_all(content).await;
    state
        .sessions
        .send_to(
            session_id,
            &Outbound::KbUpdated {
                success: true,
                message: "Knowledge base updated".to_string(),
                timestamp: Utc::now(),
            },
        )
        .await;
    broadcast_kb_changed(state).await;
}

/// Tells every client the knowledge base changed so they can refresh their
/// view. Past insights are not regenerated.
async fn broadcast_kb_changed(state: &Arc<AppState>) {
    state
        .sessions
        .broadcast(&Outbound::KbUpdated {
            success: true,
            message: "Knowledge base changed".to_string(),
            timestamp: Utc::now(),
        })
        .await;
}

/// Broadcasts a freshly generated suggested-question set and remembers it
/// as the current one.
pub async fn publish_suggested_questions(state: &Arc<AppState>, questions: Vec<String>) {
    state.set_suggested_questions(questions.clone()).await;
    state
        .sessions
        .broadcast(&Outbound::SuggestedQuestions {
            content: QuestionsPayload {
                questions,
                timestamp: Utc::now(),
            },
        })
        .await;
}
