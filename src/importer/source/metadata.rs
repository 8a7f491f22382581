use super::{FileSourceNode, SourceNode};
use crate::importer::error::ImportError;
use crate::models::Blob;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Per-directory properties file. It is read, never imported.
pub const METADATA_FILE_NAME: &str = "metadata.properties";

/// Separator turning a property value into a list.
const ARRAY_SEPARATOR: char = '|';

/// Filesystem node whose documents receive properties from `metadata.properties` files.
///
/// A properties file applies to every entry of its directory and of all
/// subdirectories; a deeper file overrides keys set higher up.
#[derive(Debug, Clone)]
pub struct FileWithMetadataSourceNode {
    inner: FileSourceNode,
    inherited: Map<String, Value>,
}

impl FileWithMetadataSourceNode {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        Ok(Self {
            inner: FileSourceNode::new(path)?,
            inherited: Map::new(),
        })
    }

    fn own_metadata(&self) -> Result<Map<String, Value>, ImportError> {
        let file = self.inner.path().join(METADATA_FILE_NAME);
        match fs::read_to_string(&file) {
            Ok(content) => Ok(parse_properties(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(ImportError::unreadable(file.display().to_string(), e)),
        }
    }
}

impl SourceNode for FileWithMetadataSourceNode {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn is_folderish(&self) -> bool {
        self.inner.is_folderish()
    }

    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, ImportError> {
        if !self.is_folderish() {
            return Ok(Vec::new());
        }

        let mut scoped = self.inherited.clone();
        scoped.extend(self.own_metadata()?);

        Ok(self
            .inner
            .child_entries()?
            .into_iter()
            .filter(|child| child.name() != METADATA_FILE_NAME)
            .map(|child| {
                Arc::new(FileWithMetadataSourceNode {
                    inner: child,
                    inherited: scoped.clone(),
                }) as Arc<dyn SourceNode>
            })
            .collect())
    }

    fn blob(&self) -> Result<Option<Blob>, ImportError> {
        self.inner.blob()
    }

    fn properties(&self) -> Map<String, Value> {
        self.inherited.clone()
    }

    fn source_path(&self) -> String {
        self.inner.source_path()
    }
}

/// Parse `key=value` and `key: value` lines; `#` and `!` start comments.
///
/// The key ends at the first `=` or at the first `:` followed by whitespace,
/// whichever comes first, so prefixed keys such as `dc:title=…` keep their
/// prefix and values may contain either character.
pub fn parse_properties(content: &str) -> Map<String, Value> {
    let mut properties = Map::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let Some(split) = separator(line) else {
            log::warn!("ignoring malformed metadata line: {}", line);
            continue;
        };

        let key = line[..split].trim();
        let value = line[split + 1..].trim();
        if key.is_empty() {
            continue;
        }

        let value = if value.contains(ARRAY_SEPARATOR) {
            Value::Array(
                value
                    .split(ARRAY_SEPARATOR)
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            )
        } else {
            Value::String(value.to_string())
        };
        properties.insert(key.to_string(), value);
    }

    properties
}

fn separator(line: &str) -> Option<usize> {
    let equals = line.find('=');
    let colon = line.char_indices().find_map(|(i, c)| {
        let next = line[i + c.len_utf8()..].chars().next();
        (c == ':' && next.is_none_or(char::is_whitespace)).then_some(i)
    });

    match (equals, colon) {
        (Some(e), Some(c)) => Some(e.min(c)),
        (e, c) => e.or(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalars_lists_and_comments() {
        let props = parse_properties(
            "# comment\n! other comment\ndc:source = scanner\ndc:subjects=a|b | c\nbroken line\n",
        );
        assert_eq!(props.get("dc"), None);
        assert_eq!(props.len(), 2);
        assert_eq!(props["dc:source"], json!("scanner"));
        assert_eq!(props["dc:subjects"], json!(["a", "b", "c"]));
    }

    #[test]
    fn colon_separated_values_may_contain_equals() {
        let props = parse_properties(
            "url: http://x?a=b\ndc:title: Annual report\ndc:rights=a: b\nempty:\n",
        );
        assert_eq!(props["url"], json!("http://x?a=b"));
        assert_eq!(props["dc:title"], json!("Annual report"));
        assert_eq!(props["dc:rights"], json!("a: b"));
        assert_eq!(props["empty"], json!(""));
        assert_eq!(props.len(), 4);
    }

    #[test]
    fn deeper_metadata_overrides_inherited_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(METADATA_FILE_NAME),
            "dc:source=archive\ndc:rights=internal\n",
        )
        .unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join(METADATA_FILE_NAME), "dc:rights=public\n").unwrap();
        fs::write(sub.join("deep.txt"), "deep").unwrap();

        let root = FileWithMetadataSourceNode::new(dir.path()).unwrap();
        let children = root.children().unwrap();
        let names: Vec<String> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["sub", "top.txt"]);

        let top = &children[1];
        assert_eq!(top.properties()["dc:rights"], json!("internal"));

        let sub_children = children[0].children().unwrap();
        let deep = &sub_children[0];
        assert_eq!(deep.name(), "deep.txt");
        assert_eq!(deep.properties()["dc:rights"], json!("public"));
        assert_eq!(deep.properties()["dc:source"], json!("archive"));
    }
}
