//! Timer-driven background tasks owned by the server: session expiry,
//! automated insights and suggested-question regeneration.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::publish_suggested_questions;
use crate::protocol::{InsightPayload, Outbound};
use crate::state::AppState;

/// Delay before the first suggested-question tick so some transcript can
/// accumulate.
const QUESTIONS_INITIAL_DELAY: Duration = Duration::from_secs(10);

pub fn spawn_background_tasks(
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(session_sweep_task(state.clone(), cancel.clone())),
        tokio::spawn(insight_task(state.clone(), cancel.clone())),
        tokio::spawn(suggested_questions_task(state, cancel)),
    ]
}

/// Evicts sessions past their TTL on a fixed cadence.
async fn session_sweep_task(state: Arc<AppState>, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.server.session_sweep_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
        let evicted = state.sessions.sweep_expired().await;
        if evicted > 0 {
            info!("session sweep evicted {evicted} expired sessions");
        }
    }
    debug!("session sweep task stopped");
}

/// Generates and broadcasts one insight per interval, alternating summary
/// and themes. A failed tick is skipped; the next one proceeds normally.
async fn insight_task(state: Arc<AppState>, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.llm.insight_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
        if state.context.is_empty().await {
            continue;
        }
        let intent = state.intent().await;
        match state.insights.generate_for_tick(&intent).await {
            Ok(insight) => {
                debug!("broadcasting {} insight", insight.kind);
                state
                    .sessions
                    .broadcast(&Outbound::Insight {
                        content: InsightPayload::from(&insight),
                    })
                    .await;
            }
            Err(e) => warn!("insight tick skipped: {e:#}"),
        }
    }
    debug!("insight task stopped");
}

/// Regenerates the suggested-question set on a fixed cadence, regardless of
/// whether new transcript content arrived.
async fn suggested_questions_task(state: Arc<AppState>, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(QUESTIONS_INITIAL_DELAY) => {}
    }

    let period = Duration::from_secs(state.config.llm.question_update_interval);
    loop {
        let intent = state.intent().await;
        let questions = state.qa.suggested_questions(&intent).await;
        debug!(
            "publishing {} suggested questions at {}",
            questions.len(),
            Utc::now()
        );
        publish_suggested_questions(&state, questions).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }
    debug!("suggested questions task stopped");
}
