use crate::importer::factories::DEFAULT_FACTORY_KIND;
use crate::importer::runner::{DEFAULT_BATCH_SIZE, DEFAULT_NB_THREADS};
use crate::importer::source::FILE_SOURCE_KIND;
use std::env;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Importer service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImporterConfig {
    pub source_node_kind: String,
    pub doc_model_factory_kind: String,
    pub leaf_doc_type: Option<String>,
    pub folderish_doc_type: Option<String>,
    /// Seconds, `0` keeps the repository default.
    pub transaction_timeout: u32,
    pub batch_size: usize,
    pub nb_threads: usize,
    /// Keep recent importer log lines for the admin API.
    pub log_buffer: bool,
}

impl ImporterConfig {
    pub fn from_env() -> Self {
        Self {
            source_node_kind: env_string("IMPORTER_SOURCE_KIND", FILE_SOURCE_KIND),
            doc_model_factory_kind: env_string("IMPORTER_FACTORY_KIND", DEFAULT_FACTORY_KIND),
            leaf_doc_type: env_opt_string("IMPORTER_LEAF_TYPE"),
            folderish_doc_type: env_opt_string("IMPORTER_FOLDERISH_TYPE"),
            transaction_timeout: env_u32("IMPORTER_TRANSACTION_TIMEOUT_SECS", 0),
            batch_size: env_usize("IMPORTER_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            nb_threads: env_usize("IMPORTER_THREADS", DEFAULT_NB_THREADS).max(1),
            log_buffer: env_bool("IMPORTER_LOG_BUFFER", true),
        }
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            source_node_kind: FILE_SOURCE_KIND.to_string(),
            doc_model_factory_kind: DEFAULT_FACTORY_KIND.to_string(),
            leaf_doc_type: None,
            folderish_doc_type: None,
            transaction_timeout: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            nb_threads: DEFAULT_NB_THREADS,
            log_buffer: true,
        }
    }
}
