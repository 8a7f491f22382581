//! In-process document store.

use super::{
    DocumentRepository, RepositoryError, RepositorySession, TransactionOptions, materialize,
    validate_name,
};
use crate::models::{Document, DocumentRef, NewDocument, ROOT_PATH};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

type DocumentMap = BTreeMap<String, Document>;

/// Document store keyed by path. Clones share the same documents.
#[derive(Clone)]
pub struct MemoryRepository {
    documents: Arc<RwLock<DocumentMap>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        let mut documents = BTreeMap::new();
        documents.insert(ROOT_PATH.to_string(), Document::root());
        Self {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Snapshot of every committed document path, root included.
    pub fn paths(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[rocket::async_trait]
impl DocumentRepository for MemoryRepository {
    async fn begin(
        &self,
        options: TransactionOptions,
    ) -> Result<Box<dyn RepositorySession>, RepositoryError> {
        Ok(Box::new(MemorySession {
            documents: Arc::clone(&self.documents),
            staged: BTreeMap::new(),
            started: Instant::now(),
            timeout: options.timeout,
        }))
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>, RepositoryError> {
        Ok(self.documents.read().get(path).cloned())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<Document>, RepositoryError> {
        let documents = self.documents.read();
        let Some(parent) = documents.get(path) else {
            return Ok(Vec::new());
        };

        let mut children: Vec<Document> = documents
            .values()
            .filter(|doc| doc.parent_id == Some(parent.id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn count_documents(&self) -> Result<i64, RepositoryError> {
        Ok(self.documents.read().len().saturating_sub(1) as i64)
    }
}

/// Unit of work over a [`MemoryRepository`]; writes are staged until commit.
pub struct MemorySession {
    documents: Arc<RwLock<DocumentMap>>,
    staged: DocumentMap,
    started: Instant,
    timeout: Option<Duration>,
}

impl MemorySession {
    fn check_timeout(&self) -> Result<(), RepositoryError> {
        match self.timeout {
            Some(timeout) if self.started.elapsed() > timeout => {
                Err(RepositoryError::TransactionTimeout(timeout))
            }
            _ => Ok(()),
        }
    }

    fn lookup(&self, path: &str) -> Option<Document> {
        self.staged
            .get(path)
            .cloned()
            .or_else(|| self.documents.read().get(path).cloned())
    }
}

#[rocket::async_trait]
impl RepositorySession for MemorySession {
    async fn create_document(
        &mut self,
        document: NewDocument,
    ) -> Result<DocumentRef, RepositoryError> {
        self.check_timeout()?;
        validate_name(&document.name)?;

        let Some(parent) = self.lookup(&document.parent.path) else {
            return Err(RepositoryError::ParentNotFound(document.parent.path.clone()));
        };

        let path = document.path();
        if self.lookup(&path).is_some() {
            return Err(RepositoryError::DuplicatePath(path));
        }

        let mut stored = materialize(document, Uuid::new_v4());
        stored.parent_id = Some(parent.id);
        let reference = stored.to_ref();
        self.staged.insert(path, stored);
        Ok(reference)
    }

    async fn exists(&mut self, path: &str) -> Result<bool, RepositoryError> {
        self.check_timeout()?;
        Ok(self.lookup(path).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.check_timeout()?;
        let MemorySession {
            documents, staged, ..
        } = *self;

        let mut documents = documents.write();
        if let Some(path) = staged.keys().find(|path| documents.contains_key(*path)) {
            return Err(RepositoryError::DuplicatePath(path.clone()));
        }

        documents.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}
