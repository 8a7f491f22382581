use super::SourceNode;
use crate::importer::error::ImportError;
use crate::models::Blob;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file or directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSourceNode {
    path: PathBuf,
    folderish: bool,
}

impl FileSourceNode {
    /// Fails when `path` cannot be stat'ed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path)
            .map_err(|e| ImportError::unreadable(path.display().to_string(), e))?;

        Ok(Self {
            folderish: metadata.is_dir(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Child paths of a directory, sorted by file name.
    pub(crate) fn child_entries(&self) -> Result<Vec<FileSourceNode>, ImportError> {
        if !self.folderish {
            return Ok(Vec::new());
        }

        let unreadable = |e| ImportError::unreadable(self.path.display().to_string(), e);
        let mut children = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            // follow symlinks so linked directories are imported as folders
            let is_dir = fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
            children.push(FileSourceNode {
                path,
                folderish: is_dir,
            });
        }

        children.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(children)
    }
}

impl SourceNode for FileSourceNode {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn is_folderish(&self) -> bool {
        self.folderish
    }

    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, ImportError> {
        Ok(self
            .child_entries()?
            .into_iter()
            .map(|child| Arc::new(child) as Arc<dyn SourceNode>)
            .collect())
    }

    fn blob(&self) -> Result<Option<Blob>, ImportError> {
        if self.folderish {
            return Ok(None);
        }

        let data = fs::read(&self.path)
            .map_err(|e| ImportError::unreadable(self.path.display().to_string(), e))?;
        Ok(Some(Blob::new(self.name(), data)))
    }

    fn source_path(&self) -> String {
        self.path.display().to_string()
    }
}
