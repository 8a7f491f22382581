use importer_server::config::ImporterConfig;
use importer_server::importer::events::{DocumentEvent, DocumentEventListener};
use importer_server::importer::source::{METADATA_FILE_NAME, METADATA_SOURCE_KIND};
use importer_server::importer::{
    DefaultImporterExecutor, DefaultImporterService, EventService, ImporterExecutor, ListenerMode,
};
use importer_server::repository::{DocumentRepository, MemoryRepository};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct BatchCounter {
    batches: AtomicUsize,
    documents: AtomicUsize,
}

impl DocumentEventListener for BatchCounter {
    fn name(&self) -> &str {
        "batch-counter"
    }

    fn handle(&self, events: &[DocumentEvent]) {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.documents.fetch_add(events.len(), Ordering::SeqCst);
    }
}

#[tokio::test]
async fn metadata_tree_import_with_batches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fs::write(root.join(METADATA_FILE_NAME), "dc:publisher=records office\n").unwrap();
    let contracts = root.join("contracts");
    fs::create_dir(&contracts).unwrap();
    fs::write(
        contracts.join(METADATA_FILE_NAME),
        "dc:subjects=legal|finance\n",
    )
    .unwrap();
    for i in 0..9 {
        fs::write(contracts.join(format!("contract-{i}.txt")), format!("contract {i}")).unwrap();
    }

    let repository = MemoryRepository::new();
    let events = Arc::new(EventService::new());
    let counter = Arc::new(BatchCounter::default());
    events.add_listener(ListenerMode::Sync, counter.clone());

    let config = ImporterConfig {
        source_node_kind: METADATA_SOURCE_KIND.to_string(),
        ..ImporterConfig::default()
    };
    let service =
        DefaultImporterService::from_config(Arc::new(repository.clone()), events.clone(), &config)
            .expect("valid configuration");
    let executor = DefaultImporterExecutor::new(service.repository(), service.events());

    let status = service
        .import_with_executor(&executor, "/", root.to_str().unwrap(), true, 4, 1, true)
        .await
        .expect("import succeeds");
    assert_eq!(status, "Import finished");

    // contracts folder + 9 contracts, committed 4 at a time
    assert_eq!(repository.count_documents().await.unwrap(), 10);
    assert_eq!(counter.documents.load(Ordering::SeqCst), 10);
    assert_eq!(counter.batches.load(Ordering::SeqCst), 3);
    assert!(!events.is_bulk_mode());

    let contract = repository
        .get_document("/contracts/contract-5.txt")
        .await
        .unwrap()
        .expect("contract imported");
    assert_eq!(contract.properties["dc:publisher"], json!("records office"));
    assert_eq!(contract.properties["dc:subjects"], json!(["legal", "finance"]));
    assert_eq!(executor.last_report().expect("report").leaves, 9);
}
