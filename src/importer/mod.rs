//! Bulk document import.
//!
//! ```text
//! DefaultImporterService ─> SourceNodeRegistry ─> SourceNode tree
//!        │               └> DocumentFactoryRegistry ─> DocumentModelFactory
//!        └> ImporterExecutor ─> GenericMultiThreadedImporter ─> ImportTask ─> repository
//! ```
//!
//! The service resolves a source node and a document-model factory from
//! configured kinds and delegates the run to an executor. The runner owns the
//! concurrency model: a bounded set of tokio tasks, each committing its
//! documents in batches.

pub mod error;
pub mod events;
pub mod executor;
pub mod factories;
pub mod filter;
pub mod logger;
pub mod runner;
pub mod service;
pub mod source;
mod task;

pub use error::ImportError;
pub use events::{AuditLogListener, EventService, ListenerMode};
pub use executor::{DefaultImporterExecutor, ImporterExecutor};
pub use factories::{DefaultDocumentModelFactory, DocumentFactoryRegistry, DocumentModelFactory};
pub use filter::{EventServiceConfiguratorFilter, ImporterFilter};
pub use logger::{BufferedLogger, ImporterLogger};
pub use runner::{GenericMultiThreadedImporter, ImportReport, ImporterRunnerConfiguration};
pub use service::{DefaultImporterService, ServiceError};
pub use source::{SourceNode, SourceNodeRegistry};
