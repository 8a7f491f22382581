use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Path of the repository root document. It always exists.
pub const ROOT_PATH: &str = "/";

/// Fixed identifier of the root document.
pub const ROOT_ID: Uuid = Uuid::nil();

// ===== Repository Documents =====

/// A document stored in the content repository.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, FromRow)]
pub struct Document {
    pub id: Uuid,
    #[serde(rename = "parentId")]
    pub parent_id: Option<Uuid>,
    pub path: String,
    pub name: String,
    #[serde(rename = "docType")]
    pub doc_type: String,
    pub title: String,
    pub properties: Value,
    #[serde(rename = "blobFilename")]
    pub blob_filename: Option<String>,
    #[serde(rename = "blobMimeType")]
    pub blob_mime_type: Option<String>,
    #[serde(rename = "blobLength")]
    pub blob_length: Option<i64>,
    #[serde(rename = "blobDigest")]
    pub blob_digest: Option<String>,
    #[serde(skip)]
    pub blob_data: Option<Vec<u8>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// The implicit root every import targets by default.
    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            parent_id: None,
            path: ROOT_PATH.to_string(),
            name: String::new(),
            doc_type: "Root".to_string(),
            title: String::new(),
            properties: Value::Object(Map::new()),
            blob_filename: None,
            blob_mime_type: None,
            blob_length: None,
            blob_digest: None,
            blob_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn to_ref(&self) -> DocumentRef {
        DocumentRef {
            id: self.id,
            path: self.path.clone(),
        }
    }
}

/// Lightweight handle on a persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub id: Uuid,
    pub path: String,
}

impl DocumentRef {
    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            path: ROOT_PATH.to_string(),
        }
    }
}

/// Binary content attached to a leaf document.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub filename: String,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            data,
        }
    }

    pub fn length(&self) -> i64 {
        self.data.len() as i64
    }

    /// Hex encoded SHA-256 of the content.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.data);
        hash.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

/// Document representation produced by a document-model factory, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub parent: DocumentRef,
    pub name: String,
    pub doc_type: String,
    pub title: String,
    pub properties: Map<String, Value>,
    pub blob: Option<Blob>,
}

impl NewDocument {
    /// Repository path this document will occupy.
    pub fn path(&self) -> String {
        join_path(&self.parent.path, &self.name)
    }
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Normalize an absolute repository path: collapse duplicate and trailing slashes.
///
/// Returns `None` for relative paths.
pub fn normalize_path(path: &str) -> Option<String> {
    let trimmed = path.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Some(ROOT_PATH.to_string());
    }

    Some(format!("/{}", segments.join("/")))
}

// ===== API Envelopes =====

/// Generic `{ "data": ... }` response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}
