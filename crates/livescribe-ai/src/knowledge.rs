//! User-authored reference documents appended to every LLM prompt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Separator between documents in the concatenated prompt view.
const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";
/// Titles derived from a plain first line are cut to this many characters.
const TITLE_MAX_LEN: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeDocument {
    pub doc_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    pub fn title(&self) -> String {
        extract_title(&self.content)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KbStats {
    pub total_documents: usize,
    pub total_characters: usize,
}

/// Listing entry: everything a client needs to render the document picker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub char_count: usize,
}

/// Derives a display title from markdown content: first `#` header, else
/// first `##` header, else the first non-empty line (truncated), else a
/// placeholder.
pub fn extract_title(content: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            return rest.trim().to_string();
        }
    }
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("## ") {
            return rest.trim().to_string();
        }
    }
    for line in content.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            if trimmed.chars().count() > TITLE_MAX_LEN {
                let cut: String = trimmed.chars().take(TITLE_MAX_LEN).collect();
                return format!("{cut}...");
            }
            return trimmed.to_string();
        }
    }
    "Untitled Document".to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Documents {
    /// Kept in creation order; the map semantics live in doc_id lookups.
    documents: Vec<KnowledgeDocument>,
}

/// Mutable, ordered collection of user documents. All operations serialise
/// against each other; readers see a point-in-time view.
#[derive(Clone, Default)]
pub struct KnowledgeBase {
    inner: Arc<RwLock<Documents>>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document and returns its generated identifier.
    pub async fn add(&self, content: impl Into<String>) -> String {
        let now = Utc::now();
        let doc = KnowledgeDocument {
            doc_id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        };
        let id = doc.doc_id.clone();
        self.inner.write().await.documents.push(doc);
        id
    }

    /// Overwrites a document's content. Returns false when the id is
    /// unknown; on success `updated_at` strictly increases.
    pub async fn update(&self, doc_id: &str, content: impl Into<String>) -> bool {
        let mut inner = self.inner.write().await;
        let Some(doc) = inner.documents.iter_mut().find(|d| d.doc_id == doc_id) else {
            return false;
        };
        doc.content = content.into();
        let now = Utc::now();
        // Clock granularity can make two writes land on the same instant;
        // the update contract requires strict monotonicity.
        doc.updated_at = if now > doc.updated_at {
            now
        } else {
            doc.updated_at + chrono::Duration::microseconds(1)
        };
        true
    }

    pub async fn remove(&self, doc_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.documents.len();
        inner.documents.retain(|d| d.doc_id != doc_id);
        inner.documents.len() < before
    }

    pub async fn get(&self, doc_id: &str) -> Option<KnowledgeDocument> {
        self.inner
            .read()
            .await
            .documents
            .iter()
            .find(|d| d.doc_id == doc_id)
            .cloned()
    }

    /// Document summaries ordered by creation time ascending.
    pub async fn list(&self) -> Vec<DocumentSummary> {
        self.inner
            .read()
            .await
            .documents
            .iter()
            .map(|d| DocumentSummary {
                doc_id: d.doc_id.clone(),
                title: d.title(),
                created_at: d.created_at,
                updated_at: d.updated_at,
                char_count: d.content.chars().count(),
            })
            .collect()
    }

    /// All documents concatenated in creation order, separated by
    /// `\n\n---\n\n`. Empty string when the base is empty.
    pub async fn content(&self) -> String {
        let inner = self.inner.read().await;
        inner
            .documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR)
    }

    /// Drops every document and installs `content` as the single remaining
    /// one. Returns the new document id.
    pub async fn replace_all(&self, content: impl Into<String>) -> String {
        let now = Utc::now();
        let doc = KnowledgeDocument {
            doc_id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        };
        let id = doc.doc_id.clone();
        let mut inner = self.inner.write().await;
        inner.documents.clear();
        inner.documents.push(doc);
        id
    }

    pub async fn clear(&self) {
        self.inner.write().await.documents.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn stats(&self) -> KbStats {
        let inner = self.inner.read().await;
        KbStats {
            total_documents: inner.documents.len(),
            total_characters: inner
                .documents
                .iter()
                .map(|d| d.content.chars().count())
                .sum(),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.documents.is_empty()
    }

    pub async fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.inner.read().await)
    }

    pub async fn from_json(json: &str) -> serde_json::Result<Self> {
        let documents: Documents = serde_json::from_str(json)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(documents)),
        })
    }
}
