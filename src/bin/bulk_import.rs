use std::io::{self, Write};
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use sqlx::postgres::PgPoolOptions;

use importer_server::db::run_migrations;
use importer_server::importer::factories::{
    DEFAULT_FACTORY_KIND, DEFAULT_FOLDERISH_TYPE, DEFAULT_LEAF_TYPE,
};
use importer_server::importer::runner::DEFAULT_BATCH_SIZE;
use importer_server::importer::source::{FILE_SOURCE_KIND, RandomTextSourceNode};
use importer_server::importer::{
    AuditLogListener, BufferedLogger, DefaultDocumentModelFactory, DefaultImporterExecutor,
    DefaultImporterService, EventService, ImporterExecutor, ListenerMode,
};
use importer_server::repository::{DocumentRepository, MemoryRepository, PgRepository};

#[derive(Parser, Debug)]
#[command(
    name = "bulk_import",
    about = "Import a directory tree into the document repository",
    group(ArgGroup::new("input").required(true).args(["source", "random"]))
)]
struct Args {
    /// Filesystem path to import.
    #[arg(long)]
    source: Option<String>,

    /// Import a synthetic tree of at most N documents instead of a path.
    #[arg(long, value_name = "N")]
    random: Option<usize>,

    /// Seed for the synthetic tree.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Repository path receiving the imported documents.
    #[arg(long, default_value = "/")]
    target: String,

    /// Import the source's children directly under the target.
    #[arg(long)]
    skip_root: bool,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Concurrent import tasks; defaults to the number of CPUs.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    leaf_type: Option<String>,

    #[arg(long)]
    folderish_type: Option<String>,

    /// Source node kind (`file` or `file-with-metadata`).
    #[arg(long, default_value = FILE_SOURCE_KIND)]
    source_kind: String,

    /// Transaction timeout in seconds, `0` for the database default.
    #[arg(long, default_value_t = 0)]
    transaction_timeout: u32,

    /// Import into an in-memory repository instead of `DATABASE_URL`.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let threads = args.threads.unwrap_or_else(num_cpus::get);

    let repository: Arc<dyn DocumentRepository> = if args.dry_run {
        Arc::new(MemoryRepository::new())
    } else {
        let database_url = std::env::var("DATABASE_URL")?;
        let pool = PgPoolOptions::new()
            .max_connections(threads as u32 + 2)
            .connect(&database_url)
            .await?;
        run_migrations(&pool).await?;
        Arc::new(PgRepository::new(pool))
    };

    let events = Arc::new(EventService::new());
    events.add_listener(ListenerMode::Async, Arc::new(AuditLogListener));
    let executor = DefaultImporterExecutor::new(Arc::clone(&repository), Arc::clone(&events))
        .with_logger(Arc::new(BufferedLogger::new(false)));

    let result = match (&args.source, args.random) {
        (_, Some(max_nodes)) => {
            executor.set_factory(Some(Arc::new(DefaultDocumentModelFactory::new(
                args.folderish_type.as_deref().unwrap_or(DEFAULT_FOLDERISH_TYPE),
                args.leaf_type.as_deref().unwrap_or(DEFAULT_LEAF_TYPE),
            ))));
            executor.set_transaction_timeout(args.transaction_timeout);
            executor
                .run_source(
                    Arc::new(RandomTextSourceNode::root(max_nodes, args.seed)),
                    &args.target,
                    args.skip_root,
                    args.batch_size,
                    threads,
                    true,
                )
                .await
                .map_err(|err| err.to_string())
        }
        (Some(source), None) => {
            let service = DefaultImporterService::new(Arc::clone(&repository), events);
            service.set_source_node_kind(&args.source_kind)?;
            service.set_doc_model_factory_kind(DEFAULT_FACTORY_KIND)?;
            service.set_transaction_timeout(args.transaction_timeout);

            service
                .import_with_types(
                    &executor,
                    args.leaf_type.as_deref(),
                    args.folderish_type.as_deref(),
                    &args.target,
                    source,
                    args.skip_root,
                    args.batch_size,
                    threads,
                    true,
                )
                .await
                .map_err(|err| err.to_string())
        }
        (None, None) => Err("either --source or --random is required".to_string()),
    };

    let status = match result {
        Ok(status) => status,
        Err(err) => {
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(1);
        }
    };

    match executor.last_report() {
        Some(report) => println!("{status}: {report}"),
        None => println!("{status}"),
    }

    if args.dry_run {
        println!(
            "dry run: repository holds {} documents",
            repository.count_documents().await?
        );
    }

    Ok(())
}
