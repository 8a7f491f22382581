//! Entry point for launching imports.
//!
//! The service turns a source path into a [`SourceNode`] and resolves the
//! [`DocumentModelFactory`] from its configured kinds, then hands both to an
//! importer executor. It neither walks trees nor manages transactions itself.

use super::error::ImportError;
use super::events::EventService;
use super::executor::{DefaultImporterExecutor, ImporterExecutor};
use super::factories::{
    DEFAULT_FOLDERISH_TYPE, DEFAULT_LEAF_TYPE, DocumentFactoryRegistry, DocumentModelFactory,
};
use super::filter::EventServiceConfiguratorFilter;
use super::logger::ImporterLogger;
use super::runner::{GenericMultiThreadedImporter, ImporterRunnerConfiguration};
use super::source::{SourceNode, SourceNodeRegistry};
use crate::config::ImporterConfig;
use crate::repository::DocumentRepository;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

pub const CAN_NOT_IMPORT: &str = "Can not import";

const NO_SOURCE_NODE: &str = "Need to set a sourceNode to be used by this importer";
const NO_FACTORY: &str = "Need to set a documentModelFactory to be used by this importer";

/// Client-facing service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("import failed: {0}")]
    Import(#[source] ImportError),
    #[error("unknown source node kind '{kind}', expected one of {known:?}")]
    UnknownSourceKind { kind: String, known: Vec<String> },
    #[error("unknown document model factory kind '{kind}', expected one of {known:?}")]
    UnknownFactoryKind { kind: String, known: Vec<String> },
}

#[derive(Clone, Default)]
struct ServiceSettings {
    doc_model_factory_kind: Option<String>,
    source_node_kind: Option<String>,
    document_model_factory: Option<Arc<dyn DocumentModelFactory>>,
    folderish_doc_type: Option<String>,
    leaf_doc_type: Option<String>,
    importer_logger: Option<Arc<dyn ImporterLogger>>,
    transaction_timeout: u32,
}

pub struct DefaultImporterService {
    settings: RwLock<ServiceSettings>,
    sources: SourceNodeRegistry,
    factories: DocumentFactoryRegistry,
    repository: Arc<dyn DocumentRepository>,
    events: Arc<EventService>,
}

impl DefaultImporterService {
    /// Service with the built-in registries and no kinds selected yet.
    pub fn new(repository: Arc<dyn DocumentRepository>, events: Arc<EventService>) -> Self {
        Self::with_registries(
            repository,
            events,
            SourceNodeRegistry::default(),
            DocumentFactoryRegistry::default(),
        )
    }

    pub fn with_registries(
        repository: Arc<dyn DocumentRepository>,
        events: Arc<EventService>,
        sources: SourceNodeRegistry,
        factories: DocumentFactoryRegistry,
    ) -> Self {
        Self {
            settings: RwLock::new(ServiceSettings::default()),
            sources,
            factories,
            repository,
            events,
        }
    }

    pub fn from_config(
        repository: Arc<dyn DocumentRepository>,
        events: Arc<EventService>,
        config: &ImporterConfig,
    ) -> Result<Self, ServiceError> {
        let service = Self::new(repository, events);
        service.set_source_node_kind(&config.source_node_kind)?;
        service.set_doc_model_factory_kind(&config.doc_model_factory_kind)?;
        if let Some(leaf) = &config.leaf_doc_type {
            service.set_leaf_doc_type(leaf.clone());
        }
        if let Some(folderish) = &config.folderish_doc_type {
            service.set_folderish_doc_type(folderish.clone());
        }
        service.set_transaction_timeout(config.transaction_timeout);
        Ok(service)
    }

    /// Import synchronously with a fresh executor.
    ///
    /// Returns `Ok(())` without importing when no source node can be built.
    pub async fn import_documents(
        &self,
        destination_path: &str,
        source_path: &str,
        skip_root_container_creation: bool,
        batch_size: usize,
        nb_threads: usize,
    ) -> Result<(), ServiceError> {
        let Some(source) = self.create_source_node(source_path) else {
            log::error!("{}", NO_SOURCE_NODE);
            return Ok(());
        };

        let factory = self.document_model_factory();
        if factory.is_none() {
            log::error!("{}", NO_FACTORY);
        }

        let (transaction_timeout, logger) = {
            let settings = self.settings.read();
            (settings.transaction_timeout, settings.importer_logger.clone())
        };

        let mut executor =
            DefaultImporterExecutor::new(Arc::clone(&self.repository), Arc::clone(&self.events));
        if let Some(logger) = logger {
            executor = executor.with_logger(logger);
        }
        executor.set_factory(factory);
        executor.set_transaction_timeout(transaction_timeout);

        executor
            .run_source(
                source,
                destination_path,
                skip_root_container_creation,
                batch_size,
                nb_threads,
                true,
            )
            .await
            .map(|_| ())
            .map_err(import_failed)
    }

    /// Import through `executor`, inline or in the background.
    ///
    /// Returns the executor status, or [`CAN_NOT_IMPORT`] when no source node
    /// can be built.
    #[allow(clippy::too_many_arguments)]
    pub async fn import_with_executor(
        &self,
        executor: &dyn ImporterExecutor,
        destination_path: &str,
        source_path: &str,
        skip_root_container_creation: bool,
        batch_size: usize,
        nb_threads: usize,
        interactive: bool,
    ) -> Result<String, ServiceError> {
        let factory = self.document_model_factory();
        self.launch(
            executor,
            factory,
            destination_path,
            source_path,
            skip_root_container_creation,
            batch_size,
            nb_threads,
            interactive,
        )
        .await
    }

    /// Like [`Self::import_with_executor`], with document types for this call only.
    ///
    /// A missing type falls back to the configured one, then to `File`/`Folder`.
    /// Overrides only apply to the default factory.
    #[allow(clippy::too_many_arguments)]
    pub async fn import_with_types(
        &self,
        executor: &dyn ImporterExecutor,
        leaf_type: Option<&str>,
        folderish_type: Option<&str>,
        destination_path: &str,
        source_path: &str,
        skip_root_container_creation: bool,
        batch_size: usize,
        nb_threads: usize,
        interactive: bool,
    ) -> Result<String, ServiceError> {
        let factory = self.document_model_factory().map(|factory| {
            let Some(default) = factory.as_default() else {
                return factory;
            };

            let settings = self.settings.read();
            let leaf = leaf_type
                .map(str::to_string)
                .or_else(|| settings.leaf_doc_type.clone())
                .unwrap_or_else(|| DEFAULT_LEAF_TYPE.to_string());
            let folderish = folderish_type
                .map(str::to_string)
                .or_else(|| settings.folderish_doc_type.clone())
                .unwrap_or_else(|| DEFAULT_FOLDERISH_TYPE.to_string());

            Arc::new(default.with_types(Some(&leaf), Some(&folderish)))
                as Arc<dyn DocumentModelFactory>
        });

        executor.set_transaction_timeout(self.transaction_timeout());
        let result = self
            .launch(
                executor,
                factory,
                destination_path,
                source_path,
                skip_root_container_creation,
                batch_size,
                nb_threads,
                interactive,
            )
            .await;

        self.set_document_model_factory(None);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn launch(
        &self,
        executor: &dyn ImporterExecutor,
        factory: Option<Arc<dyn DocumentModelFactory>>,
        destination_path: &str,
        source_path: &str,
        skip_root_container_creation: bool,
        batch_size: usize,
        nb_threads: usize,
        interactive: bool,
    ) -> Result<String, ServiceError> {
        let Some(source) = self.create_source_node(source_path) else {
            log::error!("{}", NO_SOURCE_NODE);
            return Ok(CAN_NOT_IMPORT.to_string());
        };
        if factory.is_none() {
            log::error!("{}", NO_FACTORY);
        }

        let config = ImporterRunnerConfiguration::builder(source, destination_path, executor.logger())
            .skip_root_container_creation(skip_root_container_creation)
            .batch_size(batch_size)
            .nb_threads(nb_threads)
            .build()
            .map_err(|e| {
                log::error!("{}", e);
                ServiceError::Import(e)
            })?;

        let mut runner = GenericMultiThreadedImporter::new(
            config,
            Arc::clone(&self.repository),
            Arc::clone(&self.events),
        );
        runner.set_transaction_timeout(self.transaction_timeout());
        runner.add_filter(Box::new(EventServiceConfiguratorFilter::new(
            Arc::clone(&self.events),
            false,
            false,
            false,
            true,
        )));
        if let Some(factory) = factory {
            runner.set_factory(factory);
        }

        executor
            .run(runner, interactive)
            .await
            .map_err(import_failed)
    }

    fn create_source_node(&self, source_path: &str) -> Option<Arc<dyn SourceNode>> {
        let kind = self.settings.read().source_node_kind.clone()?;
        let constructor = self.sources.get(&kind)?;

        match constructor(source_path) {
            Ok(node) => Some(node),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// Cached factory, built from the configured kind on first use.
    fn document_model_factory(&self) -> Option<Arc<dyn DocumentModelFactory>> {
        let mut settings = self.settings.write();
        if settings.document_model_factory.is_none() {
            let constructor = settings
                .doc_model_factory_kind
                .as_deref()
                .and_then(|kind| self.factories.get(kind));

            if let Some(constructor) = constructor {
                let folderish = settings
                    .folderish_doc_type
                    .as_deref()
                    .unwrap_or(DEFAULT_FOLDERISH_TYPE);
                let leaf = settings.leaf_doc_type.as_deref().unwrap_or(DEFAULT_LEAF_TYPE);
                settings.document_model_factory = Some(constructor(folderish, leaf));
            }
        }

        settings.document_model_factory.clone()
    }

    pub fn set_doc_model_factory_kind(&self, kind: &str) -> Result<(), ServiceError> {
        if !self.factories.contains(kind) {
            return Err(ServiceError::UnknownFactoryKind {
                kind: kind.to_string(),
                known: self.factories.kinds(),
            });
        }
        self.settings.write().doc_model_factory_kind = Some(kind.to_string());
        Ok(())
    }

    pub fn doc_model_factory_kind(&self) -> Option<String> {
        self.settings.read().doc_model_factory_kind.clone()
    }

    pub fn set_source_node_kind(&self, kind: &str) -> Result<(), ServiceError> {
        if !self.sources.contains(kind) {
            return Err(ServiceError::UnknownSourceKind {
                kind: kind.to_string(),
                known: self.sources.kinds(),
            });
        }
        self.settings.write().source_node_kind = Some(kind.to_string());
        Ok(())
    }

    pub fn source_node_kind(&self) -> Option<String> {
        self.settings.read().source_node_kind.clone()
    }

    pub fn set_folderish_doc_type(&self, doc_type: impl Into<String>) {
        self.settings.write().folderish_doc_type = Some(doc_type.into());
    }

    pub fn folderish_doc_type(&self) -> Option<String> {
        self.settings.read().folderish_doc_type.clone()
    }

    pub fn set_leaf_doc_type(&self, doc_type: impl Into<String>) {
        self.settings.write().leaf_doc_type = Some(doc_type.into());
    }

    pub fn leaf_doc_type(&self) -> Option<String> {
        self.settings.read().leaf_doc_type.clone()
    }

    pub fn set_importer_logger(&self, logger: Arc<dyn ImporterLogger>) {
        self.settings.write().importer_logger = Some(logger);
    }

    pub fn importer_logger(&self) -> Option<Arc<dyn ImporterLogger>> {
        self.settings.read().importer_logger.clone()
    }

    pub fn set_transaction_timeout(&self, timeout_secs: u32) {
        self.settings.write().transaction_timeout = timeout_secs;
    }

    pub fn transaction_timeout(&self) -> u32 {
        self.settings.read().transaction_timeout
    }

    /// Inject a factory; `None` makes the next import rebuild it from the configured kind.
    pub fn set_document_model_factory(&self, factory: Option<Arc<dyn DocumentModelFactory>>) {
        self.settings.write().document_model_factory = factory;
    }

    pub fn repository(&self) -> Arc<dyn DocumentRepository> {
        Arc::clone(&self.repository)
    }

    pub fn events(&self) -> Arc<EventService> {
        Arc::clone(&self.events)
    }
}

fn import_failed(error: ImportError) -> ServiceError {
    log::error!("Import error: {}", error);
    ServiceError::Import(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::factories::DefaultDocumentModelFactory;
    use crate::importer::source::{FILE_SOURCE_KIND, METADATA_FILE_NAME, METADATA_SOURCE_KIND};
    use crate::repository::MemoryRepository;
    use std::fs;

    fn service(repository: &MemoryRepository) -> DefaultImporterService {
        DefaultImporterService::from_config(
            Arc::new(repository.clone()),
            Arc::new(EventService::new()),
            &ImporterConfig::default(),
        )
        .unwrap()
    }

    fn executor(service: &DefaultImporterService) -> DefaultImporterExecutor {
        DefaultImporterExecutor::new(service.repository(), service.events())
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), "note").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();
        fs::write(dir.path().join("photos").join("cat.png"), "png").unwrap();
        dir
    }

    fn root_name(dir: &tempfile::TempDir) -> String {
        format!("/{}", dir.path().file_name().unwrap().to_string_lossy())
    }

    #[tokio::test]
    async fn missing_source_imports_nothing() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        let executor = executor(&service);

        service
            .import_documents("/", "/does/not/exist", false, 10, 1)
            .await
            .unwrap();
        let status = service
            .import_with_executor(&executor, "/", "/does/not/exist", false, 10, 1, true)
            .await
            .unwrap();

        assert_eq!(status, CAN_NOT_IMPORT);
        assert_eq!(repository.count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unset_source_kind_imports_nothing() {
        let repository = MemoryRepository::new();
        let service =
            DefaultImporterService::new(Arc::new(repository.clone()), Arc::new(EventService::new()));
        let dir = tree();

        let status = service
            .import_with_executor(
                &executor(&service),
                "/",
                dir.path().to_str().unwrap(),
                false,
                10,
                1,
                true,
            )
            .await
            .unwrap();
        assert_eq!(status, CAN_NOT_IMPORT);
    }

    #[tokio::test]
    async fn skip_root_controls_root_container() {
        let dir = tree();
        let source = dir.path().to_str().unwrap();

        let repository = MemoryRepository::new();
        service(&repository)
            .import_documents("/", source, false, 10, 2)
            .await
            .unwrap();
        let root = root_name(&dir);
        let folder = repository.get_document(&root).await.unwrap().unwrap();
        assert_eq!(folder.doc_type, DEFAULT_FOLDERISH_TYPE);
        assert!(repository.paths().contains(&format!("{}/photos/cat.png", root)));

        let repository = MemoryRepository::new();
        service(&repository)
            .import_documents("/", source, true, 10, 2)
            .await
            .unwrap();
        assert!(repository.get_document(&root).await.unwrap().is_none());
        assert!(repository.paths().contains(&"/photos/cat.png".to_string()));
    }

    #[tokio::test]
    async fn type_overrides_apply_to_one_call() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        service.set_leaf_doc_type("Note");
        let executor = executor(&service);

        let first = tree();
        let status = service
            .import_with_types(
                &executor,
                Some("Picture"),
                Some("Album"),
                "/",
                first.path().to_str().unwrap(),
                true,
                10,
                1,
                true,
            )
            .await
            .unwrap();
        assert_eq!(status, "Import finished");
        let photo = repository.get_document("/photos/cat.png").await.unwrap().unwrap();
        assert_eq!(photo.doc_type, "Picture");
        let album = repository.get_document("/photos").await.unwrap().unwrap();
        assert_eq!(album.doc_type, "Album");

        let second = tree();
        let target = "/photos";
        service
            .import_with_executor(&executor, target, second.path().to_str().unwrap(), true, 10, 1, true)
            .await
            .unwrap();
        let note = repository.get_document("/photos/note.txt").await.unwrap().unwrap();
        assert_eq!(note.doc_type, "Note");
        let folder = repository.get_document("/photos/photos").await.unwrap().unwrap();
        assert_eq!(folder.doc_type, DEFAULT_FOLDERISH_TYPE);
    }

    #[tokio::test]
    async fn overrides_fall_back_to_configured_types() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        service.set_folderish_doc_type("Workspace");
        let dir = tree();

        service
            .import_with_types(
                &executor(&service),
                None,
                None,
                "/",
                dir.path().to_str().unwrap(),
                true,
                10,
                1,
                true,
            )
            .await
            .unwrap();

        let photos = repository.get_document("/photos").await.unwrap().unwrap();
        assert_eq!(photos.doc_type, "Workspace");
        let note = repository.get_document("/note.txt").await.unwrap().unwrap();
        assert_eq!(note.doc_type, DEFAULT_LEAF_TYPE);
    }

    #[tokio::test]
    async fn injected_factory_is_used() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        service.set_document_model_factory(Some(Arc::new(DefaultDocumentModelFactory::new(
            "Section", "Asset",
        ))));
        let dir = tree();

        service
            .import_documents("/", dir.path().to_str().unwrap(), true, 10, 1)
            .await
            .unwrap();

        let note = repository.get_document("/note.txt").await.unwrap().unwrap();
        assert_eq!(note.doc_type, "Asset");
    }

    #[tokio::test]
    async fn metadata_source_kind_sets_properties() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        service.set_source_node_kind(METADATA_SOURCE_KIND).unwrap();
        let dir = tree();
        fs::write(dir.path().join(METADATA_FILE_NAME), "dc:source=scanner\n").unwrap();

        service
            .import_documents("/", dir.path().to_str().unwrap(), true, 10, 1)
            .await
            .unwrap();

        let note = repository.get_document("/note.txt").await.unwrap().unwrap();
        assert_eq!(note.properties["dc:source"], "scanner");
        assert!(repository.get_document("/metadata.properties").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failures_are_wrapped() {
        let repository = MemoryRepository::new();
        let service = service(&repository);
        let dir = tree();

        let err = service
            .import_documents("/missing", dir.path().to_str().unwrap(), false, 10, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Import(ImportError::TargetNotFound(_))));

        let err = service
            .import_with_executor(&executor(&service), "relative", dir.path().to_str().unwrap(), false, 10, 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Import(ImportError::InvalidConfiguration(_))));
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let service = service(&MemoryRepository::new());
        let err = service.set_source_node_kind("ftp").unwrap_err();
        assert!(matches!(&err, ServiceError::UnknownSourceKind { kind, .. } if kind == "ftp"));
        assert_eq!(
            err.to_string(),
            "unknown source node kind 'ftp', expected one of [\"file\", \"file-with-metadata\"]"
        );

        let err = service.set_doc_model_factory_kind("xml").unwrap_err();
        assert!(matches!(
            &err,
            ServiceError::UnknownFactoryKind { known, .. } if known == &vec!["default".to_string()]
        ));
        assert_eq!(service.source_node_kind().as_deref(), Some(FILE_SOURCE_KIND));
    }
}
