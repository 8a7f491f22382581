//! PostgreSQL document store.

use super::pg_config::PgConfig;
use super::{
    DocumentRepository, RepositoryError, RepositorySession, TransactionOptions, materialize,
    validate_name,
};
use crate::models::{Document, DocumentRef, NewDocument, ROOT_PATH};
use rocket_db_pools::sqlx::{self, PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// SQLSTATE raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

const DOCUMENT_COLUMNS: &str = "id, parent_id, path, name, doc_type, title, properties, \
     blob_filename, blob_mime_type, blob_length, blob_digest, blob_data, created_at";

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[rocket::async_trait]
impl DocumentRepository for PgRepository {
    async fn begin(
        &self,
        options: TransactionOptions,
    ) -> Result<Box<dyn RepositorySession>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(timeout) = options.timeout {
            PgConfig::apply_statement_timeout(&mut tx, timeout).await?;
        }
        if options.bulk_mode {
            PgConfig::apply_bulk_import_optimizations(&mut tx).await?;
        }

        Ok(Box::new(PgSession {
            tx,
            timeout: options.timeout,
        }))
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>, RepositoryError> {
        let query = format!("SELECT {} FROM documents WHERE path = $1", DOCUMENT_COLUMNS);
        let document = sqlx::query_as::<_, Document>(&query)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    async fn list_children(&self, path: &str) -> Result<Vec<Document>, RepositoryError> {
        let query = format!(
            r#"SELECT {} FROM documents
               WHERE parent_id = (SELECT id FROM documents WHERE path = $1)
               ORDER BY name ASC"#,
            DOCUMENT_COLUMNS
        );
        let documents = sqlx::query_as::<_, Document>(&query)
            .bind(path)
            .fetch_all(&self.pool)
            .await?;

        Ok(documents)
    }

    async fn count_documents(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE path <> $1")
            .bind(ROOT_PATH)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// One sqlx transaction.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
    timeout: Option<Duration>,
}

impl PgSession {
    fn map_error(&self, err: sqlx::Error) -> RepositoryError {
        let cancelled = matches!(
            &err,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(QUERY_CANCELED)
        );

        match (cancelled, self.timeout) {
            (true, Some(timeout)) => RepositoryError::TransactionTimeout(timeout),
            _ => RepositoryError::Database(err),
        }
    }
}

#[rocket::async_trait]
impl RepositorySession for PgSession {
    async fn create_document(
        &mut self,
        document: NewDocument,
    ) -> Result<DocumentRef, RepositoryError> {
        validate_name(&document.name)?;

        let parent: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM documents WHERE path = $1")
            .bind(&document.parent.path)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| self.map_error(e))?;

        let Some((parent_id,)) = parent else {
            return Err(RepositoryError::ParentNotFound(document.parent.path.clone()));
        };

        let stored = materialize(document, Uuid::new_v4());

        // ON CONFLICT keeps the transaction usable when the path is taken
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"INSERT INTO documents (id, parent_id, path, name, doc_type, title, properties,
                                      blob_filename, blob_mime_type, blob_length, blob_digest, blob_data)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               ON CONFLICT (path) DO NOTHING
               RETURNING id"#,
        )
        .bind(stored.id)
        .bind(parent_id)
        .bind(&stored.path)
        .bind(&stored.name)
        .bind(&stored.doc_type)
        .bind(&stored.title)
        .bind(&stored.properties)
        .bind(&stored.blob_filename)
        .bind(&stored.blob_mime_type)
        .bind(stored.blob_length)
        .bind(&stored.blob_digest)
        .bind(&stored.blob_data)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| self.map_error(e))?;

        match inserted {
            Some((id,)) => Ok(DocumentRef {
                id,
                path: stored.path,
            }),
            None => Err(RepositoryError::DuplicatePath(stored.path)),
        }
    }

    async fn exists(&mut self, path: &str) -> Result<bool, RepositoryError> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(found.is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let timeout = self.timeout;
        self.tx.commit().await.map_err(|err| match (&err, timeout) {
            (sqlx::Error::Database(db_err), Some(timeout))
                if db_err.code().as_deref() == Some(QUERY_CANCELED) =>
            {
                RepositoryError::TransactionTimeout(timeout)
            }
            _ => RepositoryError::Database(err),
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
