//! Client session registry and broadcast fan-out.
//!
//! Each connected WebSocket owns one session: a uuid, a bounded outbound
//! queue and a bounded history of answered questions. The registry doubles
//! as the publish side of the fan-out: broadcasts serialise a message once
//! and enqueue it on every live session, dropping any client whose queue
//! is full.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use livescribe_core::config::ServerConfig;

use crate::protocol::Outbound;

#[derive(Clone, Debug)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    pub processing_time: f64,
    pub timestamp: DateTime<Utc>,
}

struct SessionEntry {
    created_at: DateTime<Utc>,
    tx: mpsc::Sender<String>,
    qa_history: VecDeque<QaPair>,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub questions_answered: usize,
    pub average_response_time: f64,
}

/// Registry of live sessions plus the broadcast hub over them.
pub struct SessionManager {
    max_sessions: usize,
    session_ttl: Duration,
    queue_capacity: usize,
    max_qa_history: usize,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            max_sessions: config.max_sessions,
            session_ttl: Duration::seconds(config.session_timeout as i64),
            queue_capacity: config.outbound_queue_capacity,
            max_qa_history: config.max_qa_history,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a new session, evicting the oldest one when at capacity.
    /// Returns the session id and the read side of its outbound queue.
    pub async fn register(&self) -> (String, mpsc::Receiver<String>) {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(id, _)| id.clone())
            {
                info!("session capacity reached, evicting oldest session {oldest}");
                sessions.remove(&oldest);
            }
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        sessions.insert(
            id.clone(),
            SessionEntry {
                created_at: Utc::now(),
                tx,
                qa_history: VecDeque::new(),
            },
        );
        debug!("registered session {id}");
        (id, rx)
    }

    pub async fn disconnect(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!("session {session_id} disconnected");
        }
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Sends to one session. A full or closed queue drops the session: a
    /// client that cannot keep up is disconnected rather than stalling the
    /// pipeline.
    pub async fn send_to(&self, session_id: &str, message: &Outbound) -> bool {
        let json = message.to_json();
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get(session_id) else {
            return false;
        };
        if entry.tx.try_send(json).is_err() {
            warn!("outbound queue unavailable for session {session_id}, dropping session");
            sessions.remove(session_id);
            return false;
        }
        true
    }

    /// Delivers a message to every live session in registration order.
    /// Returns how many sessions received it.
    pub async fn broadcast(&self, message: &Outbound) -> usize {
        let json = message.to_json();
        let mut dropped = Vec::new();
        let mut delivered = 0;
        {
            let sessions = self.sessions.read().await;
            for (id, entry) in sessions.iter() {
                if entry.tx.try_send(json.clone()).is_err() {
                    dropped.push(id.clone());
                } else {
                    delivered += 1;
                }
            }
        }
        if !dropped.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in dropped {
                warn!("dropping slow session {id} during broadcast");
                sessions.remove(&id);
            }
        }
        delivered
    }

    /// Records an answered question on the owning session, pruning the
    /// oldest pairs past the cap.
    pub async fn record_qa(&self, session_id: &str, pair: QaPair) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.qa_history.push_back(pair);
            while entry.qa_history.len() > self.max_qa_history {
                entry.qa_history.pop_front();
            }
        }
    }

    pub async fn qa_history_len(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, |entry| entry.qa_history.len())
    }

    /// Removes sessions whose creation time is older than the TTL,
    /// regardless of activity. Returns how many were evicted.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - self.session_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.created_at >= cutoff;
            if !keep {
                info!("session {id} expired after ttl");
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read().await;
        let questions_answered: usize =
            sessions.values().map(|entry| entry.qa_history.len()).sum();
        let total_time: f64 = sessions
            .values()
            .flat_map(|entry| entry.qa_history.iter())
            .map(|pair| pair.processing_time)
            .sum();
        SessionStats {
            active_sessions: sessions.len(),
            questions_answered,
            average_response_time: if questions_answered > 0 {
                total_time / questions_answered as f64
            } else {
                0.0
            },
        }
    }

    #[cfg(test)]
    pub(crate) async fn backdate_session(&self, session_id: &str, age_seconds: i64) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.created_at = Utc::now() - Duration::seconds(age_seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_sessions: usize, queue_capacity: usize) -> ServerConfig {
        ServerConfig {
            max_sessions,
            outbound_queue_capacity: queue_capacity,
            session_timeout: 3600,
            max_qa_history: 3,
            ..Default::default()
        }
    }

    fn pair(question: &str) -> QaPair {
        QaPair {
            question: question.to_string(),
            answer: "a".to_string(),
            processing_time: 0.5,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_register_and_disconnect() {
        let manager = SessionManager::new(&config(4, 8));
        let (id, _rx) = manager.register().await;
        assert!(manager.contains(&id).await);
        manager.disconnect(&id).await;
        assert!(!manager.contains(&id).await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let manager = SessionManager::new(&config(2, 8));
        let (first, _rx1) = manager.register().await;
        manager.backdate_session(&first, 100).await;
        let (second, _rx2) = manager.register().await;
        let (third, _rx3) = manager.register().await;

        assert_eq!(manager.len().await, 2);
        assert!(!manager.contains(&first).await, "oldest evicted");
        assert!(manager.contains(&second).await);
        assert!(manager.contains(&third).await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let manager = SessionManager::new(&config(4, 8));
        let (_id1, mut rx1) = manager.register().await;
        let (_id2, mut rx2) = manager.register().await;

        let delivered = manager.broadcast(&Outbound::status("hello")).await;
        assert_eq!(delivered, 2);
        assert!(rx1.recv().await.unwrap().contains("hello"));
        assert!(rx2.recv().await.unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_slow_session_dropped_on_overflow() {
        let manager = SessionManager::new(&config(4, 2));
        let (slow, _rx_kept_but_not_drained) = manager.register().await;
        let (fast, mut fast_rx) = manager.register().await;

        // Fill the slow session's queue, then overflow it
        for _ in 0..3 {
            manager.broadcast(&Outbound::status("tick")).await;
            while fast_rx.try_recv().is_ok() {}
        }

        assert!(!manager.contains(&slow).await, "slow session dropped");
        assert!(manager.contains(&fast).await, "healthy session unaffected");
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let manager = SessionManager::new(&config(4, 8));
        assert!(!manager.send_to("ghost", &Outbound::status("x")).await);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let manager = SessionManager::new(&config(4, 16));
        let (id, mut rx) = manager.register().await;
        for i in 0..5 {
            manager.send_to(&id, &Outbound::status(format!("m{i}"))).await;
        }
        for i in 0..5 {
            assert!(rx.recv().await.unwrap().contains(&format!("m{i}")));
        }
    }

    #[tokio::test]
    async fn test_qa_history_caps_at_limit() {
        let manager = SessionManager::new(&config(4, 8));
        let (id, _rx) = manager.register().await;
        for i in 0..5 {
            manager.record_qa(&id, pair(&format!("q{i}"))).await;
        }
        assert_eq!(manager.qa_history_len(&id).await, 3);
    }

    #[tokio::test]
    async fn test_sweep_expires_old_sessions() {
        let manager = SessionManager::new(&config(4, 8));
        let (old, _rx1) = manager.register().await;
        let (fresh, _rx2) = manager.register().await;
        manager.backdate_session(&old, 7200).await;

        let evicted = manager.sweep_expired().await;
        assert_eq!(evicted, 1);
        assert!(!manager.contains(&old).await);
        assert!(manager.contains(&fresh).await);
    }

    #[tokio::test]
    async fn test_stats() {
        let manager = SessionManager::new(&config(4, 8));
        let (id, _rx) = manager.register().await;
        manager.record_qa(&id, pair("q")).await;
        manager.record_qa(&id, pair("q2")).await;

        let stats = manager.stats().await;
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.questions_answered, 2);
        assert!((stats.average_response_time - 0.5).abs() < 1e-9);
    }
}
