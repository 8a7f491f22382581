//! Source trees the importer walks.
//!
//! A [`SourceNode`] is one item to import: a folder-like node that has
//! children, or a leaf that usually carries a blob. Implementations:
//!
//! - [`FileSourceNode`]: a plain filesystem tree
//! - [`FileWithMetadataSourceNode`]: filesystem tree with `metadata.properties` files
//! - [`RandomTextSourceNode`]: synthetic tree for load testing
//!
//! Path-based implementations are selected by name through a
//! [`SourceNodeRegistry`].

mod file;
mod metadata;
mod random;

pub use file::FileSourceNode;
pub use metadata::{FileWithMetadataSourceNode, METADATA_FILE_NAME, parse_properties};
pub use random::RandomTextSourceNode;

use super::error::ImportError;
use crate::models::Blob;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const FILE_SOURCE_KIND: &str = "file";
pub const METADATA_SOURCE_KIND: &str = "file-with-metadata";

pub trait SourceNode: Send + Sync + fmt::Debug {
    fn name(&self) -> String;

    fn is_folderish(&self) -> bool;

    /// Child nodes in import order. Leaves return an empty list.
    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, ImportError>;

    fn blob(&self) -> Result<Option<Blob>, ImportError>;

    /// Extra document properties carried by the source.
    fn properties(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Human readable origin, used in logs.
    fn source_path(&self) -> String;
}

/// Builds a source node for a source path.
pub type SourceNodeConstructor = fn(&str) -> Result<Arc<dyn SourceNode>, ImportError>;

/// Named source-node constructors.
#[derive(Clone)]
pub struct SourceNodeRegistry {
    constructors: BTreeMap<String, SourceNodeConstructor>,
}

impl SourceNodeRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: SourceNodeConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn get(&self, kind: &str) -> Option<SourceNodeConstructor> {
        self.constructors.get(kind).copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

impl Default for SourceNodeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FILE_SOURCE_KIND, |path| {
            Ok(Arc::new(FileSourceNode::new(path)?) as Arc<dyn SourceNode>)
        });
        registry.register(METADATA_SOURCE_KIND, |path| {
            Ok(Arc::new(FileWithMetadataSourceNode::new(path)?) as Arc<dyn SourceNode>)
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_filesystem_kinds() {
        let registry = SourceNodeRegistry::default();
        assert_eq!(
            registry.kinds(),
            vec![FILE_SOURCE_KIND.to_string(), METADATA_SOURCE_KIND.to_string()]
        );
        assert!(registry.get("random").is_none());
    }

    #[test]
    fn constructor_reports_missing_path() {
        let registry = SourceNodeRegistry::default();
        let constructor = registry.get(FILE_SOURCE_KIND).unwrap();
        let err = constructor("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ImportError::Source { .. }));
    }
}
