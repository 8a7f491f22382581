//! Conversion of source nodes into repository documents.

use super::error::ImportError;
use super::source::SourceNode;
use crate::models::{DocumentRef, NewDocument};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_FOLDERISH_TYPE: &str = "Folder";
pub const DEFAULT_LEAF_TYPE: &str = "File";
pub const DEFAULT_FACTORY_KIND: &str = "default";

const FALLBACK_NAME: &str = "untitled";

pub trait DocumentModelFactory: Send + Sync + fmt::Debug {
    /// Whether `node` becomes a folderish document.
    fn is_target_document_model_folderish(&self, node: &dyn SourceNode) -> bool {
        node.is_folderish()
    }

    fn create_folderish_node(
        &self,
        parent: &DocumentRef,
        node: &dyn SourceNode,
    ) -> Result<NewDocument, ImportError>;

    fn create_leaf_node(
        &self,
        parent: &DocumentRef,
        node: &dyn SourceNode,
    ) -> Result<NewDocument, ImportError>;

    /// Access to the type-configurable default factory, if this is one.
    fn as_default(&self) -> Option<&DefaultDocumentModelFactory> {
        None
    }
}

/// Maps folders and files onto two configurable document types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDocumentModelFactory {
    folderish_type: String,
    leaf_type: String,
}

impl DefaultDocumentModelFactory {
    pub fn new(folderish_type: impl Into<String>, leaf_type: impl Into<String>) -> Self {
        Self {
            folderish_type: folderish_type.into(),
            leaf_type: leaf_type.into(),
        }
    }

    pub fn folderish_type(&self) -> &str {
        &self.folderish_type
    }

    pub fn leaf_type(&self) -> &str {
        &self.leaf_type
    }

    /// Copy of this factory with the given types replaced.
    pub fn with_types(&self, leaf_type: Option<&str>, folderish_type: Option<&str>) -> Self {
        Self {
            folderish_type: folderish_type.unwrap_or(&self.folderish_type).to_string(),
            leaf_type: leaf_type.unwrap_or(&self.leaf_type).to_string(),
        }
    }

    fn base_document(&self, parent: &DocumentRef, node: &dyn SourceNode, doc_type: &str) -> NewDocument {
        let title = node.name();
        NewDocument {
            parent: parent.clone(),
            name: valid_name(&title),
            doc_type: doc_type.to_string(),
            title,
            properties: node.properties(),
            blob: None,
        }
    }
}

impl Default for DefaultDocumentModelFactory {
    fn default() -> Self {
        Self::new(DEFAULT_FOLDERISH_TYPE, DEFAULT_LEAF_TYPE)
    }
}

impl DocumentModelFactory for DefaultDocumentModelFactory {
    fn create_folderish_node(
        &self,
        parent: &DocumentRef,
        node: &dyn SourceNode,
    ) -> Result<NewDocument, ImportError> {
        Ok(self.base_document(parent, node, &self.folderish_type))
    }

    fn create_leaf_node(
        &self,
        parent: &DocumentRef,
        node: &dyn SourceNode,
    ) -> Result<NewDocument, ImportError> {
        let mut document = self.base_document(parent, node, &self.leaf_type);
        document.blob = node.blob()?;
        Ok(document)
    }

    fn as_default(&self) -> Option<&DefaultDocumentModelFactory> {
        Some(self)
    }
}

/// Make a source name usable as a single path segment.
pub fn valid_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '-' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        _ => cleaned,
    }
}

/// Guess a mime type from a file extension.
pub fn detect_mime_type(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();

    let mime = match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };

    Some(mime)
}

/// Builds a factory from `(folderish_type, leaf_type)`.
pub type FactoryConstructor = fn(&str, &str) -> Arc<dyn DocumentModelFactory>;

/// Named document-model factory constructors.
#[derive(Clone)]
pub struct DocumentFactoryRegistry {
    constructors: BTreeMap<String, FactoryConstructor>,
}

impl DocumentFactoryRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: FactoryConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn get(&self, kind: &str) -> Option<FactoryConstructor> {
        self.constructors.get(kind).copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

impl Default for DocumentFactoryRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_FACTORY_KIND, |folderish, leaf| {
            Arc::new(DefaultDocumentModelFactory::new(folderish, leaf))
        });
        registry
    }
}
