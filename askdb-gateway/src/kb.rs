use std::collections::BTreeSet;
use std::path::Path;

use askdb_core::{Payload, Value};
use serde::{Deserialize, Serialize};

use crate::GatewayError;

pub const JOIN_CARD: &str = "join_card";

/// One schema knowledge document: DDL, business rules, example SQL or a
/// join card. `metadata.type` names the kind.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SchemaDoc {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Payload,
}

impl SchemaDoc {
    pub fn new(page_content: impl Into<String>, doc_type: &str) -> Self {
        let mut metadata = Payload::new();
        metadata.insert("type".to_string(), Value::from(doc_type));
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocFile {
    Plain(Vec<SchemaDoc>),
    Wrapped { documents: Vec<SchemaDoc> },
}

/// Lexical index over schema documents, ranked by query-token overlap.
#[derive(Clone, Debug, Default)]
pub struct InMemoryKnowledgeBase {
    docs: Vec<SchemaDoc>,
    tokens: Vec<BTreeSet<String>>,
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl InMemoryKnowledgeBase {
    pub fn new(docs: Vec<SchemaDoc>) -> Self {
        let tokens = docs.iter().map(|doc| tokenize(&doc.page_content)).collect();
        Self { docs, tokens }
    }

    /// Loads a JSON array of documents, or an object with a `documents` array.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| GatewayError::KnowledgeBase(format!("{}: {err}", path.display())))?;
        let docs = match serde_json::from_str::<DocFile>(&raw)
            .map_err(|err| GatewayError::KnowledgeBase(format!("{}: {err}", path.display())))?
        {
            DocFile::Plain(docs) | DocFile::Wrapped { documents: docs } => docs,
        };
        tracing::info!(documents = docs.len(), path = %path.display(), "loaded schema knowledge base");
        Ok(Self::new(docs))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Top `k` documents sharing tokens with `query`. With a `doc_type` that
    /// matches nothing, the search is repeated without the filter.
    pub fn search(&self, query: &str, k: usize, doc_type: Option<&str>) -> Vec<SchemaDoc> {
        if let Some(doc_type) = doc_type {
            let filtered = self.ranked(query, k, Some(doc_type));
            if !filtered.is_empty() {
                return filtered;
            }
            tracing::debug!(doc_type, "no documents of requested type, searching all");
        }
        self.ranked(query, k, None)
    }

    fn ranked(&self, query: &str, k: usize, doc_type: Option<&str>) -> Vec<SchemaDoc> {
        let wanted = tokenize(query);
        let mut scored: Vec<(usize, usize)> = self
            .docs
            .iter()
            .zip(&self.tokens)
            .enumerate()
            .filter(|(_, (doc, _))| doc_type.map_or(true, |kind| doc.doc_type() == Some(kind)))
            .map(|(index, (_, tokens))| (index, wanted.intersection(tokens).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        // Stable sort keeps file order among equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(index, _)| self.docs[index].clone())
            .collect()
    }

    pub fn join_cards(&self, k: usize) -> Vec<SchemaDoc> {
        self.docs
            .iter()
            .filter(|doc| doc.doc_type() == Some(JOIN_CARD))
            .take(k)
            .cloned()
            .collect()
    }
}
