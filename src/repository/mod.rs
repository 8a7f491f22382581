//! Content repository the importer writes into.
//!
//! Two backends implement the same pair of traits:
//!
//! - **`postgres`**: the production store, one sqlx transaction per session.
//! - **`memory`**: an in-process store used by the CLI dry-run mode and tests.
//!
//! A [`RepositorySession`] is a unit of work. Documents created through a
//! session are visible to that session immediately and to everybody else once
//! [`RepositorySession::commit`] returns.

pub mod memory;
pub mod pg_config;
pub mod postgres;

use crate::models::{Document, DocumentRef, NewDocument};
use chrono::Utc;
use rocket_db_pools::sqlx;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Errors raised by repository backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("parent document not found: {0}")]
    ParentNotFound(String),
    #[error("document already exists: {0}")]
    DuplicatePath(String),
    #[error("invalid document name '{0}'")]
    InvalidName(String),
    #[error("transaction exceeded timeout of {0:?}")]
    TransactionTimeout(Duration),
}

impl RepositoryError {
    /// Errors tied to a single document; the session stays usable afterwards.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RepositoryError::ParentNotFound(_)
                | RepositoryError::DuplicatePath(_)
                | RepositoryError::InvalidName(_)
        )
    }
}

/// Per-transaction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Abort the transaction when it runs longer than this.
    pub timeout: Option<Duration>,
    /// Favour write throughput over durability guarantees.
    pub bulk_mode: bool,
}

impl TransactionOptions {
    /// Build options from a timeout in seconds, where `0` keeps the backend default.
    pub fn with_timeout_secs(timeout_secs: u32, bulk_mode: bool) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(u64::from(timeout_secs))),
            bulk_mode,
        }
    }
}

#[rocket::async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Open a new unit of work.
    async fn begin(
        &self,
        options: TransactionOptions,
    ) -> Result<Box<dyn RepositorySession>, RepositoryError>;

    async fn get_document(&self, path: &str) -> Result<Option<Document>, RepositoryError>;

    /// Direct children of the document at `path`, ordered by name.
    async fn list_children(&self, path: &str) -> Result<Vec<Document>, RepositoryError>;

    /// Number of documents, not counting the root.
    async fn count_documents(&self) -> Result<i64, RepositoryError>;
}

#[rocket::async_trait]
pub trait RepositorySession: Send {
    async fn create_document(&mut self, document: NewDocument)
    -> Result<DocumentRef, RepositoryError>;

    async fn exists(&mut self, path: &str) -> Result<bool, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Reject names that cannot form a single path segment.
pub(crate) fn validate_name(name: &str) -> Result<(), RepositoryError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(RepositoryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Turn a factory-produced document into its stored form.
pub(crate) fn materialize(document: NewDocument, id: Uuid) -> Document {
    let path = document.path();
    let (blob_filename, blob_mime_type, blob_length, blob_digest, blob_data) =
        match document.blob {
            Some(blob) => (
                Some(blob.filename.clone()),
                blob.mime_type.clone(),
                Some(blob.length()),
                Some(blob.digest()),
                Some(blob.data),
            ),
            None => (None, None, None, None, None),
        };

    Document {
        id,
        parent_id: Some(document.parent.id),
        path,
        name: document.name,
        doc_type: document.doc_type,
        title: document.title,
        properties: Value::Object(document.properties),
        blob_filename,
        blob_mime_type,
        blob_length,
        blob_digest,
        blob_data,
        created_at: Utc::now(),
    }
}
