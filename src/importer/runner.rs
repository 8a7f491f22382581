//! Multi-threaded import of a source tree into the repository.
//!
//! The importer walks the source tree with a set of tokio tasks. Each task
//! owns one repository session, creates documents depth-first and commits
//! every `batch_size` documents. A task that meets a folderish child while a
//! semaphore permit is free hands that subtree to a new task.

use super::error::ImportError;
use super::events::EventService;
use super::factories::{DefaultDocumentModelFactory, DocumentModelFactory};
use super::filter::ImporterFilter;
use super::logger::ImporterLogger;
use super::source::SourceNode;
use super::task::{ImportCounters, ImportTask, TaskContext};
use crate::models::normalize_path;
use crate::repository::DocumentRepository;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_NB_THREADS: usize = 5;

/// Everything one importer run needs to know about its input and pacing.
#[derive(Clone)]
pub struct ImporterRunnerConfiguration {
    pub source: Arc<dyn SourceNode>,
    pub target_path: String,
    pub logger: Arc<dyn ImporterLogger>,
    pub skip_root_container_creation: bool,
    pub batch_size: usize,
    pub nb_threads: usize,
}

impl ImporterRunnerConfiguration {
    pub fn builder(
        source: Arc<dyn SourceNode>,
        target_path: impl Into<String>,
        logger: Arc<dyn ImporterLogger>,
    ) -> ImporterRunnerConfigurationBuilder {
        ImporterRunnerConfigurationBuilder::new(source, target_path, logger)
    }
}

impl fmt::Debug for ImporterRunnerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImporterRunnerConfiguration")
            .field("source", &self.source.source_path())
            .field("target_path", &self.target_path)
            .field("skip_root_container_creation", &self.skip_root_container_creation)
            .field("batch_size", &self.batch_size)
            .field("nb_threads", &self.nb_threads)
            .finish()
    }
}

pub struct ImporterRunnerConfigurationBuilder {
    source: Arc<dyn SourceNode>,
    target_path: String,
    logger: Arc<dyn ImporterLogger>,
    skip_root_container_creation: bool,
    batch_size: usize,
    nb_threads: usize,
}

impl ImporterRunnerConfigurationBuilder {
    pub fn new(
        source: Arc<dyn SourceNode>,
        target_path: impl Into<String>,
        logger: Arc<dyn ImporterLogger>,
    ) -> Self {
        Self {
            source,
            target_path: target_path.into(),
            logger,
            skip_root_container_creation: false,
            batch_size: DEFAULT_BATCH_SIZE,
            nb_threads: DEFAULT_NB_THREADS,
        }
    }

    pub fn skip_root_container_creation(mut self, skip: bool) -> Self {
        self.skip_root_container_creation = skip;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn nb_threads(mut self, nb_threads: usize) -> Self {
        self.nb_threads = nb_threads;
        self
    }

    pub fn build(self) -> Result<ImporterRunnerConfiguration, ImportError> {
        let target_path = normalize_path(&self.target_path).ok_or_else(|| {
            ImportError::InvalidConfiguration(format!(
                "target path must be absolute, got '{}'",
                self.target_path
            ))
        })?;

        Ok(ImporterRunnerConfiguration {
            source: self.source,
            target_path,
            logger: self.logger,
            skip_root_container_creation: self.skip_root_container_creation,
            batch_size: self.batch_size.max(1),
            nb_threads: self.nb_threads.max(1),
        })
    }
}

/// Outcome of one importer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub documents: usize,
    pub folders: usize,
    pub leaves: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
    pub docs_per_second: f64,
    pub cancelled: bool,
}

impl ImportReport {
    fn from_counters(counters: &ImportCounters, started: Instant, cancelled: bool) -> Self {
        let elapsed = started.elapsed();
        let folders = counters.folders();
        let leaves = counters.leaves();
        let documents = folders + leaves;
        let secs = elapsed.as_secs_f64();

        Self {
            documents,
            folders,
            leaves,
            errors: counters.errors(),
            elapsed_ms: elapsed.as_millis() as u64,
            docs_per_second: if secs > 0.0 { documents as f64 / secs } else { 0.0 },
            cancelled,
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents imported ({} folders, {} leaves, {} errors) in {} ms, {:.1} docs/s{}",
            self.documents,
            self.folders,
            self.leaves,
            self.errors,
            self.elapsed_ms,
            self.docs_per_second,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

pub struct GenericMultiThreadedImporter {
    config: ImporterRunnerConfiguration,
    repository: Arc<dyn DocumentRepository>,
    events: Arc<EventService>,
    factory: Arc<dyn DocumentModelFactory>,
    filters: Vec<Box<dyn ImporterFilter>>,
    transaction_timeout: u32,
    cancel: CancellationToken,
}

impl GenericMultiThreadedImporter {
    pub fn new(
        config: ImporterRunnerConfiguration,
        repository: Arc<dyn DocumentRepository>,
        events: Arc<EventService>,
    ) -> Self {
        Self {
            config,
            repository,
            events,
            factory: Arc::new(DefaultDocumentModelFactory::default()),
            filters: Vec::new(),
            transaction_timeout: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_factory(&mut self, factory: Arc<dyn DocumentModelFactory>) {
        self.factory = factory;
    }

    /// Seconds; `0` keeps the repository default.
    pub fn set_transaction_timeout(&mut self, timeout_secs: u32) {
        self.transaction_timeout = timeout_secs;
    }

    pub fn transaction_timeout(&self) -> u32 {
        self.transaction_timeout
    }

    pub fn add_filter(&mut self, filter: Box<dyn ImporterFilter>) {
        self.filters.push(filter);
    }

    /// Token cancelling this run; clones stay valid after `run` consumes the importer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop_import_process(&self) {
        self.config.logger.info("Stopping import process");
        self.cancel.cancel();
    }

    pub async fn run(self) -> Result<ImportReport, ImportError> {
        let logger = Arc::clone(&self.config.logger);
        logger.info(&format!(
            "Starting import of {} into {} ({} threads, batch size {})",
            self.config.source.source_path(),
            self.config.target_path,
            self.config.nb_threads,
            self.config.batch_size
        ));

        for filter in &self.filters {
            filter.handle_before_import();
        }

        let started = Instant::now();
        let result = self.import().await;

        for filter in &self.filters {
            filter.handle_after_import(result.as_ref().err());
        }

        match result {
            Ok(counters) => {
                let report =
                    ImportReport::from_counters(&counters, started, self.cancel.is_cancelled());
                logger.info(&format!("Import finished: {}", report));
                Ok(report)
            }
            Err(e) => {
                logger.error(&format!("Import failed: {}", e));
                Err(e)
            }
        }
    }

    async fn import(&self) -> Result<Arc<ImportCounters>, ImportError> {
        let target = self
            .repository
            .get_document(&self.config.target_path)
            .await?
            .ok_or_else(|| ImportError::TargetNotFound(self.config.target_path.clone()))?
            .to_ref();

        let source = Arc::clone(&self.config.source);
        let work: Vec<(Arc<dyn SourceNode>, _)> = if self.config.skip_root_container_creation {
            let children = tokio::task::spawn_blocking(move || source.children()).await??;
            // reversed so the task pops them in source order
            children
                .into_iter()
                .rev()
                .map(|child| (child, target.clone()))
                .collect()
        } else {
            vec![(source, target)]
        };

        let semaphore = Arc::new(Semaphore::new(self.config.nb_threads));
        let context = Arc::new(TaskContext {
            repository: Arc::clone(&self.repository),
            factory: Arc::clone(&self.factory),
            events: Arc::clone(&self.events),
            logger: Arc::clone(&self.config.logger),
            transaction_timeout: self.transaction_timeout,
            batch_size: self.config.batch_size,
            semaphore: Arc::clone(&semaphore),
            tracker: TaskTracker::new(),
            cancel: self.cancel.clone(),
            counters: Arc::new(ImportCounters::default()),
            failure: Default::default(),
            next_task_id: Default::default(),
        });

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| ImportError::TaskFailed(e.to_string()))?;
        ImportTask::spawn(Arc::clone(&context), work, permit);

        context.tracker.close();
        context.tracker.wait().await;

        if let Some(failure) = context.take_failure() {
            return Err(ImportError::TaskFailed(failure));
        }

        Ok(Arc::clone(&context.counters))
    }
}
