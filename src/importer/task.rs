//! One unit of import work: a subtree walked inside a single session at a time.

use super::error::ImportError;
use super::events::{DocumentEvent, EventService};
use super::factories::{DocumentModelFactory, detect_mime_type};
use super::logger::ImporterLogger;
use super::source::SourceNode;
use crate::models::{DocumentRef, NewDocument};
use crate::repository::{DocumentRepository, RepositorySession, TransactionOptions};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type WorkItem = (Arc<dyn SourceNode>, DocumentRef);

#[derive(Debug, Default)]
pub(crate) struct ImportCounters {
    folders: AtomicUsize,
    leaves: AtomicUsize,
    errors: AtomicUsize,
}

impl ImportCounters {
    pub(crate) fn folders(&self) -> usize {
        self.folders.load(Ordering::Relaxed)
    }

    pub(crate) fn leaves(&self) -> usize {
        self.leaves.load(Ordering::Relaxed)
    }

    pub(crate) fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

/// State shared by every task of one importer run.
pub(crate) struct TaskContext {
    pub(crate) repository: Arc<dyn DocumentRepository>,
    pub(crate) factory: Arc<dyn DocumentModelFactory>,
    pub(crate) events: Arc<EventService>,
    pub(crate) logger: Arc<dyn ImporterLogger>,
    pub(crate) transaction_timeout: u32,
    pub(crate) batch_size: usize,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) tracker: TaskTracker,
    pub(crate) cancel: CancellationToken,
    pub(crate) counters: Arc<ImportCounters>,
    pub(crate) failure: Mutex<Option<String>>,
    pub(crate) next_task_id: AtomicUsize,
}

impl TaskContext {
    pub(crate) fn take_failure(&self) -> Option<String> {
        self.failure.lock().take()
    }

    fn record_failure(&self, message: String) {
        let mut failure = self.failure.lock();
        // keep the first failure, later ones are usually consequences
        if failure.is_none() {
            *failure = Some(message);
        }
    }

    async fn begin(&self) -> Result<Box<dyn RepositorySession>, ImportError> {
        // bulk mode is whatever the event service says when the transaction opens
        let options = TransactionOptions::with_timeout_secs(
            self.transaction_timeout,
            self.events.is_bulk_mode(),
        );
        Ok(self.repository.begin(options).await?)
    }

    /// Commit pending work and open the next session.
    async fn commit(
        &self,
        session: Box<dyn RepositorySession>,
        pending: &mut Vec<DocumentEvent>,
    ) -> Result<Box<dyn RepositorySession>, ImportError> {
        if pending.is_empty() {
            return Ok(session);
        }

        session.commit().await?;
        self.events.fire_post_commit(std::mem::take(pending));
        self.begin().await
    }

    async fn build_document(
        &self,
        node: &Arc<dyn SourceNode>,
        parent: &DocumentRef,
        folderish: bool,
    ) -> Result<NewDocument, ImportError> {
        let factory = Arc::clone(&self.factory);
        let node = Arc::clone(node);
        let parent = parent.clone();

        let mut document = tokio::task::spawn_blocking(move || {
            if folderish {
                factory.create_folderish_node(&parent, node.as_ref())
            } else {
                factory.create_leaf_node(&parent, node.as_ref())
            }
        })
        .await??;

        if !self.events.is_mime_type_detection_blocked() {
            if let Some(blob) = document.blob.as_mut() {
                if blob.mime_type.is_none() {
                    blob.mime_type = detect_mime_type(&blob.filename).map(str::to_string);
                }
            }
        }

        Ok(document)
    }

    async fn children(&self, node: &Arc<dyn SourceNode>) -> Result<Vec<Arc<dyn SourceNode>>, ImportError> {
        let node = Arc::clone(node);
        tokio::task::spawn_blocking(move || node.children()).await?
    }

    fn skip(&self, node: &dyn SourceNode, error: &ImportError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        self.logger
            .warn(&format!("Skipping {}: {}", node.source_path(), error));
    }
}

pub(crate) struct ImportTask {
    id: usize,
    context: Arc<TaskContext>,
    work: Vec<WorkItem>,
    _permit: OwnedSemaphorePermit,
}

impl ImportTask {
    /// Run `work` on a new tracked task. Items are popped from the back.
    ///
    /// A panicking task is recorded as the run's failure.
    pub(crate) fn spawn(
        context: Arc<TaskContext>,
        work: Vec<WorkItem>,
        permit: OwnedSemaphorePermit,
    ) {
        let id = context.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = ImportTask {
            id,
            context: Arc::clone(&context),
            work,
            _permit: permit,
        };

        let handle = tokio::spawn(task.run());
        let watcher = Arc::clone(&context);
        context.tracker.spawn(async move {
            if let Err(e) = handle.await {
                let error = ImportError::from(e);
                watcher
                    .logger
                    .error(&format!("import task {} aborted: {}", id, error));
                watcher.record_failure(error.to_string());
            }
        });
    }

    async fn run(mut self) {
        let context = Arc::clone(&self.context);
        context.logger.debug(&format!("import task {} started", self.id));

        match self.process().await {
            Ok(created) => context
                .logger
                .debug(&format!("import task {} done, {} documents", self.id, created)),
            Err(e) => {
                context
                    .logger
                    .error(&format!("import task {} failed: {}", self.id, e));
                context.record_failure(e.to_string());
            }
        }
    }

    async fn process(&mut self) -> Result<usize, ImportError> {
        let context = Arc::clone(&self.context);
        let mut session = context.begin().await?;
        let mut pending: Vec<DocumentEvent> = Vec::new();
        let mut created_total = 0;

        while let Some((node, parent)) = self.work.pop() {
            if context.cancel.is_cancelled() {
                context
                    .logger
                    .info(&format!("import task {} interrupted", self.id));
                break;
            }

            let folderish = context.factory.is_target_document_model_folderish(node.as_ref());
            let created = match self.create(&mut session, &node, &parent, folderish).await {
                Ok(created) => created,
                Err(e) if e.is_node_scoped() => {
                    context.skip(node.as_ref(), &e);
                    continue;
                }
                Err(e) => {
                    let _ = session.rollback().await;
                    return Err(e);
                }
            };

            created_total += 1;
            let counter = if folderish {
                &context.counters.folders
            } else {
                &context.counters.leaves
            };
            counter.fetch_add(1, Ordering::Relaxed);
            pending.push(DocumentEvent::created(created.0.clone(), created.1));

            if pending.len() >= context.batch_size {
                session = context.commit(session, &mut pending).await?;
            }

            if !folderish {
                continue;
            }

            let children = match context.children(&node).await {
                Ok(children) => children,
                Err(e) if e.is_node_scoped() => {
                    context.skip(node.as_ref(), &e);
                    continue;
                }
                Err(e) => {
                    let _ = session.rollback().await;
                    return Err(e);
                }
            };

            for child in children.into_iter().rev() {
                let hand_off = context.factory.is_target_document_model_folderish(child.as_ref());
                let permit = if hand_off {
                    Arc::clone(&context.semaphore).try_acquire_owned().ok()
                } else {
                    None
                };

                match permit {
                    Some(permit) => {
                        // the new task must see its parent
                        session = context.commit(session, &mut pending).await?;
                        ImportTask::spawn(
                            Arc::clone(&context),
                            vec![(child, created.0.clone())],
                            permit,
                        );
                    }
                    None => self.work.push((child, created.0.clone())),
                }
            }
        }

        if pending.is_empty() {
            session.rollback().await?;
        } else {
            session.commit().await?;
            context.events.fire_post_commit(pending);
        }

        Ok(created_total)
    }

    async fn create(
        &self,
        session: &mut Box<dyn RepositorySession>,
        node: &Arc<dyn SourceNode>,
        parent: &DocumentRef,
        folderish: bool,
    ) -> Result<(DocumentRef, String), ImportError> {
        let document = self.context.build_document(node, parent, folderish).await?;
        let doc_type = document.doc_type.clone();
        let created = session.create_document(document).await?;
        Ok((created, doc_type))
    }
}
