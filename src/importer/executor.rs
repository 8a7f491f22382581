//! Executors run an importer either inline or in the background and keep
//! track of the import currently running.

use super::error::ImportError;
use super::events::EventService;
use super::factories::DocumentModelFactory;
use super::filter::EventServiceConfiguratorFilter;
use super::logger::{BufferedLogger, ImporterLogger};
use super::runner::{GenericMultiThreadedImporter, ImportReport, ImporterRunnerConfiguration};
use super::source::SourceNode;
use crate::repository::DocumentRepository;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const IMPORT_FINISHED: &str = "Import finished";
pub const IMPORT_STARTED: &str = "Started";
pub const RUNNING: &str = "Running";
pub const NOT_RUNNING: &str = "Not Running";
pub const IMPORTER_KILLED: &str = "Importer killed";

struct ActiveImport {
    run_id: Uuid,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ExecutionInner {
    active: Mutex<Option<ActiveImport>>,
    last_report: Mutex<Option<ImportReport>>,
    last_error: Mutex<Option<String>>,
    transaction_timeout: AtomicU32,
}

/// Bookkeeping shared between an executor and the imports it launched.
#[derive(Clone, Default)]
pub struct ExecutionState {
    inner: Arc<ExecutionInner>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, cancel: CancellationToken) -> Result<Uuid, ImportError> {
        let mut active = self.inner.active.lock();
        if active.is_some() {
            return Err(ImportError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        *active = Some(ActiveImport { run_id, cancel });
        Ok(run_id)
    }

    fn finish(&self, run_id: Uuid, result: &Result<ImportReport, ImportError>) {
        match result {
            Ok(report) => {
                *self.inner.last_report.lock() = Some(report.clone());
                *self.inner.last_error.lock() = None;
            }
            Err(e) => *self.inner.last_error.lock() = Some(e.to_string()),
        }

        let mut active = self.inner.active.lock();
        if active.as_ref().is_some_and(|a| a.run_id == run_id) {
            *active = None;
        }
    }

    fn guard(&self, run_id: Uuid) -> RunGuard {
        RunGuard {
            execution: self.clone(),
            run_id,
            finished: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    /// Cancel the running import. Returns false when nothing runs.
    pub fn kill(&self) -> bool {
        match self.inner.active.lock().as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn last_report(&self) -> Option<ImportReport> {
        self.inner.last_report.lock().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    pub fn transaction_timeout(&self) -> u32 {
        self.inner.transaction_timeout.load(Ordering::Relaxed)
    }

    pub fn set_transaction_timeout(&self, timeout_secs: u32) {
        self.inner
            .transaction_timeout
            .store(timeout_secs, Ordering::Relaxed);
    }
}

/// Releases the running slot even if the import never returns.
struct RunGuard {
    execution: ExecutionState,
    run_id: Uuid,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, result: &Result<ImportReport, ImportError>) {
        self.finished = true;
        self.execution.finish(self.run_id, result);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = ImportError::TaskFailed("import aborted before completion".to_string());
            log::error!("{}", aborted);
            self.execution.finish(self.run_id, &Err(aborted));
        }
    }
}

#[rocket::async_trait]
pub trait ImporterExecutor: Send + Sync {
    fn logger(&self) -> Arc<dyn ImporterLogger>;

    fn execution(&self) -> &ExecutionState;

    fn set_transaction_timeout(&self, timeout_secs: u32) {
        self.execution().set_transaction_timeout(timeout_secs);
    }

    fn transaction_timeout(&self) -> u32 {
        self.execution().transaction_timeout()
    }

    /// Run `runner` inline when `interactive`, otherwise on a background task.
    async fn run(
        &self,
        runner: GenericMultiThreadedImporter,
        interactive: bool,
    ) -> Result<String, ImportError> {
        let execution = self.execution().clone();
        let run_id = execution.claim(runner.cancellation_token())?;
        let guard = execution.guard(run_id);

        if interactive {
            let result = runner.run().await;
            guard.finish(&result);
            return result.map(|_| IMPORT_FINISHED.to_string());
        }

        tokio::spawn(async move {
            let result = runner.run().await;
            guard.finish(&result);
        });
        Ok(IMPORT_STARTED.to_string())
    }

    fn status(&self) -> String {
        if self.is_running() {
            RUNNING.to_string()
        } else {
            NOT_RUNNING.to_string()
        }
    }

    fn is_running(&self) -> bool {
        self.execution().is_running()
    }

    fn kill(&self) -> String {
        if self.execution().kill() {
            self.logger().info(IMPORTER_KILLED);
        }
        IMPORTER_KILLED.to_string()
    }

    fn last_report(&self) -> Option<ImportReport> {
        self.execution().last_report()
    }
}

/// Executor building its own runner from a source node.
pub struct DefaultImporterExecutor {
    repository: Arc<dyn DocumentRepository>,
    events: Arc<EventService>,
    logger: Arc<dyn ImporterLogger>,
    factory: RwLock<Option<Arc<dyn DocumentModelFactory>>>,
    execution: ExecutionState,
}

impl DefaultImporterExecutor {
    pub fn new(repository: Arc<dyn DocumentRepository>, events: Arc<EventService>) -> Self {
        Self {
            repository,
            events,
            logger: Arc::new(BufferedLogger::default()),
            factory: RwLock::new(None),
            execution: ExecutionState::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn ImporterLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn set_factory(&self, factory: Option<Arc<dyn DocumentModelFactory>>) {
        *self.factory.write() = factory;
    }

    pub fn factory(&self) -> Option<Arc<dyn DocumentModelFactory>> {
        self.factory.read().clone()
    }

    pub fn repository(&self) -> Arc<dyn DocumentRepository> {
        Arc::clone(&self.repository)
    }

    pub fn events(&self) -> Arc<EventService> {
        Arc::clone(&self.events)
    }

    pub async fn run_source(
        &self,
        source: Arc<dyn SourceNode>,
        target_path: &str,
        skip_root_container_creation: bool,
        batch_size: usize,
        nb_threads: usize,
        interactive: bool,
    ) -> Result<String, ImportError> {
        let config = ImporterRunnerConfiguration::builder(source, target_path, self.logger())
            .skip_root_container_creation(skip_root_container_creation)
            .batch_size(batch_size)
            .nb_threads(nb_threads)
            .build()?;

        let mut runner = GenericMultiThreadedImporter::new(
            config,
            Arc::clone(&self.repository),
            Arc::clone(&self.events),
        );
        runner.set_transaction_timeout(self.transaction_timeout());
        runner.add_filter(Box::new(EventServiceConfiguratorFilter::bulk(Arc::clone(
            &self.events,
        ))));
        if let Some(factory) = self.factory() {
            runner.set_factory(factory);
        }

        self.run(runner, interactive).await
    }
}

#[rocket::async_trait]
impl ImporterExecutor for DefaultImporterExecutor {
    fn logger(&self) -> Arc<dyn ImporterLogger> {
        Arc::clone(&self.logger)
    }

    fn execution(&self) -> &ExecutionState {
        &self.execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::factories::tests::PanickingFactory;
    use crate::importer::source::FileSourceNode;
    use crate::repository::MemoryRepository;
    use std::fs;
    use std::time::Duration;

    fn executor(repository: &MemoryRepository) -> DefaultImporterExecutor {
        DefaultImporterExecutor::new(Arc::new(repository.clone()), Arc::new(EventService::new()))
    }

    fn source(dir: &tempfile::TempDir) -> Arc<dyn SourceNode> {
        Arc::new(FileSourceNode::new(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn interactive_run_finishes_inline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let repository = MemoryRepository::new();
        let executor = executor(&repository);

        let status = executor
            .run_source(source(&dir), "/", true, 10, 2, true)
            .await
            .unwrap();

        assert_eq!(status, IMPORT_FINISHED);
        assert_eq!(executor.status(), NOT_RUNNING);
        assert_eq!(executor.last_report().unwrap().documents, 1);
        assert!(repository.paths().contains(&"/a.txt".to_string()));
    }

    #[tokio::test]
    async fn background_run_completes_later() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("{}.txt", i)), "x").unwrap();
        }
        let repository = MemoryRepository::new();
        let executor = executor(&repository);

        let status = executor
            .run_source(source(&dir), "/", true, 5, 1, false)
            .await
            .unwrap();
        assert_eq!(status, IMPORT_STARTED);

        for _ in 0..200 {
            if !executor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(executor.status(), NOT_RUNNING);
        assert_eq!(repository.count_documents().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let repository = MemoryRepository::new();
        let executor = executor(&repository);

        // hold the slot as a running import would
        let run_id = executor.execution().claim(CancellationToken::new()).unwrap();
        assert_eq!(executor.status(), RUNNING);

        let err = executor
            .run_source(source(&dir), "/", false, 10, 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::AlreadyRunning));
        assert_eq!(err.to_string(), "Task is already running");

        executor
            .execution()
            .finish(run_id, &Ok(ImportReport::default()));
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn kill_cancels_the_active_import() {
        let repository = MemoryRepository::new();
        let executor = executor(&repository);
        let token = CancellationToken::new();
        executor.execution().claim(token.clone()).unwrap();

        assert_eq!(executor.kill(), IMPORTER_KILLED);
        assert!(token.is_cancelled());
    }

    async fn wait_until_idle(executor: &DefaultImporterExecutor) {
        for _ in 0..500 {
            if !executor.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("import still running");
    }

    #[tokio::test]
    async fn kill_stops_a_running_background_import() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5000 {
            fs::write(dir.path().join(format!("{:04}.txt", i)), "x").unwrap();
        }
        let repository = MemoryRepository::new();
        let executor = executor(&repository);

        let status = executor
            .run_source(source(&dir), "/", true, 100, 1, false)
            .await
            .unwrap();
        assert_eq!(status, IMPORT_STARTED);

        // let at least one batch land before killing
        for _ in 0..500 {
            if repository.count_documents().await.unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(executor.kill(), IMPORTER_KILLED);
        wait_until_idle(&executor).await;

        let report = executor.last_report().unwrap();
        assert!(report.cancelled);
        assert!(report.documents > 0);
        assert!(report.documents < 5000, "{}", report);
        // work done before the kill is committed, nothing more
        assert_eq!(
            repository.count_documents().await.unwrap(),
            report.documents as i64
        );
    }

    #[tokio::test]
    async fn panicking_background_import_frees_the_executor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let repository = MemoryRepository::new();
        let executor = executor(&repository);
        executor.set_factory(Some(Arc::new(PanickingFactory)));

        executor
            .run_source(source(&dir), "/", true, 10, 1, false)
            .await
            .unwrap();
        wait_until_idle(&executor).await;
        assert!(executor.execution().last_error().unwrap().contains("panicked"));

        // the slot is free for the next import
        executor.set_factory(None);
        let status = executor
            .run_source(source(&dir), "/", true, 10, 1, true)
            .await
            .unwrap();
        assert_eq!(status, IMPORT_FINISHED);
        assert_eq!(repository.count_documents().await.unwrap(), 1);
    }

    #[test]
    fn abandoned_run_releases_the_slot() {
        let execution = ExecutionState::new();
        let run_id = execution.claim(CancellationToken::new()).unwrap();

        drop(execution.guard(run_id));

        assert!(!execution.is_running());
        assert!(execution.last_error().unwrap().contains("aborted"));
        assert!(execution.claim(CancellationToken::new()).is_ok());
    }

    #[tokio::test]
    async fn failed_run_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let repository = MemoryRepository::new();
        let executor = executor(&repository);

        let err = executor
            .run_source(source(&dir), "/missing", false, 10, 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::TargetNotFound(_)));
        assert!(executor.execution().last_error().unwrap().contains("/missing"));
        assert!(!executor.is_running());
    }
}
