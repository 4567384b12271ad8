//! Mapping document lookup.

use crate::config::MappingDocument;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of mapping documents, addressed by id or name.
#[async_trait]
pub trait MappingRegistry: Send + Sync {
    /// Find a document whose id or name equals `key`; ids take precedence.
    async fn find_by_id_or_name(&self, key: &str) -> anyhow::Result<Option<Arc<MappingDocument>>>;
}

#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<String, Arc<MappingDocument>>,
    by_name: HashMap<String, Arc<MappingDocument>>,
}

/// In-memory registry, typically loaded from the config file.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    index: RwLock<Index>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from documents; later documents win on key collision.
    pub fn from_documents(documents: impl IntoIterator<Item = MappingDocument>) -> Self {
        let mut index = Index::default();
        for document in documents {
            index_document(&mut index, Arc::new(document));
        }
        Self {
            index: RwLock::new(index),
        }
    }

    /// Add or replace a document.
    pub async fn insert(&self, document: MappingDocument) -> Arc<MappingDocument> {
        let document = Arc::new(document);
        let mut index = self.index.write().await;
        index_document(&mut index, Arc::clone(&document));
        debug!(mapping = %document.id, "Registered mapping document");
        document
    }

    /// Remove the document with this id, returning it if present.
    pub async fn remove(&self, id: &str) -> Option<Arc<MappingDocument>> {
        let mut index = self.index.write().await;
        let document = index.by_id.remove(id)?;
        if let Some(name) = &document.name {
            if index.by_name.get(name).is_some_and(|d| d.id == document.id) {
                index.by_name.remove(name);
            }
        }
        Some(document)
    }

    /// Number of documents.
    pub async fn len(&self) -> usize {
        self.index.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.by_id.is_empty()
    }
}

fn index_document(index: &mut Index, document: Arc<MappingDocument>) {
    if let Some(name) = &document.name {
        index.by_name.insert(name.clone(), Arc::clone(&document));
    }
    index.by_id.insert(document.id.clone(), document);
}

#[async_trait]
impl MappingRegistry for InMemoryRegistry {
    async fn find_by_id_or_name(&self, key: &str) -> anyhow::Result<Option<Arc<MappingDocument>>> {
        let index = self.index.read().await;
        Ok(index
            .by_id
            .get(key)
            .or_else(|| index.by_name.get(key))
            .cloned())
    }
}
