use importer_server::importer::source::FileSourceNode;
use importer_server::importer::{DefaultImporterExecutor, EventService, ImporterExecutor};
use importer_server::repository::{
    DocumentRepository, PgRepository, RepositoryError, TransactionOptions,
};
use importer_server::models::{DocumentRef, NewDocument};
use importer_server::test_support::{TestDatabase, TestDatabaseError};
use serde_json::Map;
use std::fs;
use std::sync::Arc;

async fn test_database(test: &str) -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping {test}: TEST_DATABASE_URL not set");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

#[tokio::test]
async fn import_round_trips_through_postgres() {
    let Some(test_db) = test_database("postgres import test").await else {
        return;
    };

    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("invoice.pdf"), b"%PDF-1.7").unwrap();
    fs::create_dir(dir.path().join("letters")).unwrap();
    for i in 0..7 {
        fs::write(dir.path().join("letters").join(format!("letter-{i}.txt")), "dear").unwrap();
    }

    let repository = Arc::new(PgRepository::new(test_db.pool_clone()));
    let executor = DefaultImporterExecutor::new(repository.clone(), Arc::new(EventService::new()));
    executor.set_transaction_timeout(30);

    let status = executor
        .run_source(
            Arc::new(FileSourceNode::new(dir.path()).unwrap()),
            "/",
            true,
            3,
            4,
            true,
        )
        .await
        .expect("import succeeds");
    assert_eq!(status, "Import finished");
    assert_eq!(repository.count_documents().await.unwrap(), 9);

    let invoice = repository
        .get_document("/invoice.pdf")
        .await
        .unwrap()
        .expect("invoice stored");
    assert_eq!(invoice.blob_length, Some(8));
    assert_eq!(invoice.blob_mime_type.as_deref(), Some("application/pdf"));
    assert_eq!(invoice.blob_data.as_deref(), Some(&b"%PDF-1.7"[..]));

    let letters = repository.list_children("/letters").await.unwrap();
    assert_eq!(letters.len(), 7);
    assert_eq!(letters[0].name, "letter-0.txt");

    // a second pass only reports duplicates
    let status = executor
        .run_source(
            Arc::new(FileSourceNode::new(dir.path()).unwrap()),
            "/",
            true,
            3,
            1,
            true,
        )
        .await
        .expect("re-import succeeds");
    assert_eq!(status, "Import finished");
    let report = executor.last_report().expect("report");
    assert_eq!(report.documents, 0);
    assert_eq!(report.errors, 2);
    assert_eq!(repository.count_documents().await.unwrap(), 9);

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn session_rejects_orphans_and_duplicates() {
    let Some(test_db) = test_database("postgres session test").await else {
        return;
    };

    let repository = PgRepository::new(test_db.pool_clone());
    let folder = |parent: &DocumentRef, name: &str| NewDocument {
        parent: parent.clone(),
        name: name.to_string(),
        doc_type: "Folder".to_string(),
        title: name.to_string(),
        properties: Map::new(),
        blob: None,
    };

    let mut session = repository
        .begin(TransactionOptions::with_timeout_secs(10, true))
        .await
        .unwrap();
    let archive = session
        .create_document(folder(&DocumentRef::root(), "archive"))
        .await
        .unwrap();
    assert!(session.exists("/archive").await.unwrap());

    let err = session
        .create_document(folder(&DocumentRef::root(), "archive"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::DuplicatePath(_)));

    let orphan_parent = DocumentRef {
        id: uuid::Uuid::new_v4(),
        path: "/missing".to_string(),
    };
    let err = session
        .create_document(folder(&orphan_parent, "child"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ParentNotFound(_)));

    // the transaction survives recoverable errors
    session
        .create_document(folder(&archive, "2025"))
        .await
        .unwrap();
    session.commit().await.unwrap();

    assert!(repository.get_document("/archive/2025").await.unwrap().is_some());

    test_db.close().await.expect("failed to drop test database");
}
