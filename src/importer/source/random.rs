use super::SourceNode;
use crate::importer::error::ImportError;
use crate::models::Blob;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_CHILDREN: usize = 20;
const MAX_DEPTH: usize = 6;
const FOLDER_RATIO: f64 = 0.15;
const MIN_WORDS: usize = 50;
const MAX_WORDS: usize = 500;

const WORDS: &[&str] = &[
    "archive", "batch", "content", "document", "folder", "import", "ledger", "metadata",
    "node", "record", "repository", "schema", "source", "storage", "thread", "version",
    "workflow", "index", "policy", "report",
];

/// Synthetic tree of folders and text files.
///
/// The whole tree is bounded by a node budget shared by every node spawned
/// from the same root. Structure and content derive from the seed.
#[derive(Debug)]
pub struct RandomTextSourceNode {
    name: String,
    folderish: bool,
    level: usize,
    seed: u64,
    budget: Arc<AtomicUsize>,
}

impl RandomTextSourceNode {
    /// Root folder of a tree holding at most `max_nodes` nodes below it.
    pub fn root(max_nodes: usize, seed: u64) -> Self {
        Self {
            name: format!("random-{}", seed),
            folderish: true,
            level: 0,
            seed,
            budget: Arc::new(AtomicUsize::new(max_nodes)),
        }
    }

    fn claim(&self) -> bool {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl SourceNode for RandomTextSourceNode {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_folderish(&self) -> bool {
        self.folderish
    }

    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, ImportError> {
        if !self.folderish {
            return Ok(Vec::new());
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        // the root always fans out fully so small budgets still produce leaves
        let wanted = if self.level == 0 {
            MAX_CHILDREN
        } else {
            rng.gen_range(1..=MAX_CHILDREN)
        };

        let mut children: Vec<Arc<dyn SourceNode>> = Vec::with_capacity(wanted);
        for idx in 0..wanted {
            if !self.claim() {
                break;
            }

            let folderish = self.level < MAX_DEPTH && rng.gen_bool(FOLDER_RATIO);
            let name = if folderish {
                format!("folder-{}-{}", self.level + 1, idx)
            } else {
                format!("file-{}-{}.txt", self.level + 1, idx)
            };

            children.push(Arc::new(RandomTextSourceNode {
                name,
                folderish,
                level: self.level + 1,
                seed: rng.r#gen(),
                budget: Arc::clone(&self.budget),
            }));
        }

        Ok(children)
    }

    fn blob(&self) -> Result<Option<Blob>, ImportError> {
        if self.folderish {
            return Ok(None);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let count = rng.gen_range(MIN_WORDS..=MAX_WORDS);
        let text = (0..count)
            .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ");

        let mut blob = Blob::new(self.name.clone(), text.into_bytes());
        blob.mime_type = Some("text/plain".to_string());
        Ok(Some(blob))
    }

    fn source_path(&self) -> String {
        format!("random://{}/{}", self.seed, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(node: &dyn SourceNode) -> usize {
        node.children()
            .unwrap()
            .iter()
            .map(|child| 1 + count(child.as_ref()))
            .sum()
    }

    #[test]
    fn tree_respects_node_budget() {
        // smaller than the root fan-out: the root alone uses the whole budget
        let small = RandomTextSourceNode::root(15, 7);
        assert_eq!(count(&small), 15);

        let large = RandomTextSourceNode::root(500, 7);
        let total = count(&large);
        assert!(total >= MAX_CHILDREN && total <= 500, "got {}", total);
    }

    #[test]
    fn content_is_reproducible() {
        let first = RandomTextSourceNode::root(10, 42).children().unwrap();
        let second = RandomTextSourceNode::root(10, 42).children().unwrap();

        let names: Vec<String> = first.iter().map(|c| c.name()).collect();
        let again: Vec<String> = second.iter().map(|c| c.name()).collect();
        assert_eq!(names, again);

        let leaf = first.iter().find(|c| !c.is_folderish()).unwrap();
        let twin = second.iter().find(|c| c.name() == leaf.name()).unwrap();
        assert_eq!(leaf.blob().unwrap(), twin.blob().unwrap());
    }
}
