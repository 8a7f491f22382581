//! Document event dispatch.
//!
//! Listeners are notified after a repository transaction commits. Imports toggle
//! the service flags through [`super::filter::EventServiceConfiguratorFilter`]
//! so heavy post-commit work can be suspended while thousands of documents are
//! created.

use crate::models::DocumentRef;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEventKind {
    Created,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    pub kind: DocumentEventKind,
    pub document: DocumentRef,
    pub doc_type: String,
}

impl DocumentEvent {
    pub fn created(document: DocumentRef, doc_type: impl Into<String>) -> Self {
        Self {
            kind: DocumentEventKind::Created,
            document,
            doc_type: doc_type.into(),
        }
    }
}

/// How a listener is run after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerMode {
    /// Inline, before the committing task moves on.
    Sync,
    /// On a separate tokio task.
    Async,
}

pub trait DocumentEventListener: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, events: &[DocumentEvent]);
}

/// Switches controlling event processing and repository tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFlags {
    pub block_sync_post_commit: bool,
    pub block_async: bool,
    pub block_mime_type_detection: bool,
    pub bulk_mode: bool,
}

/// Imports currently holding an [`ImportFlagsGuard`] and the flags they replaced.
#[derive(Debug, Default)]
struct ImportScope {
    active: usize,
    baseline: EventFlags,
}

#[derive(Default)]
pub struct EventService {
    listeners: RwLock<Vec<(ListenerMode, Arc<dyn DocumentEventListener>)>>,
    flags: RwLock<EventFlags>,
    scope: Mutex<ImportScope>,
}

impl EventService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, mode: ListenerMode, listener: Arc<dyn DocumentEventListener>) {
        log::debug!("registering {:?} document listener '{}'", mode, listener.name());
        self.listeners.write().push((mode, listener));
    }

    pub fn flags(&self) -> EventFlags {
        *self.flags.read()
    }

    /// Replace the flags, returning the previous ones.
    pub fn set_flags(&self, flags: EventFlags) -> EventFlags {
        std::mem::replace(&mut *self.flags.write(), flags)
    }

    /// Apply `flags` for the lifetime of the returned guard.
    ///
    /// Overlapping imports share the override: the first one records the
    /// flags in place, the last guard dropped puts them back.
    pub fn enter_import(self: &Arc<Self>, flags: EventFlags) -> ImportFlagsGuard {
        let mut scope = self.scope.lock();
        let previous = self.set_flags(flags);
        if scope.active == 0 {
            scope.baseline = previous;
        }
        scope.active += 1;

        ImportFlagsGuard {
            events: Arc::clone(self),
        }
    }

    fn leave_import(&self) {
        let mut scope = self.scope.lock();
        scope.active = scope.active.saturating_sub(1);
        if scope.active == 0 {
            self.set_flags(scope.baseline);
        }
    }

    /// Number of imports currently overriding the flags.
    pub fn active_imports(&self) -> usize {
        self.scope.lock().active
    }

    pub fn is_bulk_mode(&self) -> bool {
        self.flags.read().bulk_mode
    }

    pub fn is_mime_type_detection_blocked(&self) -> bool {
        self.flags.read().block_mime_type_detection
    }

    /// Notify listeners about documents of a committed transaction.
    pub fn fire_post_commit(&self, events: Vec<DocumentEvent>) {
        if events.is_empty() {
            return;
        }

        let flags = self.flags();
        let listeners = self.listeners.read().clone();
        let events = Arc::new(events);

        for (mode, listener) in listeners {
            match mode {
                ListenerMode::Sync if !flags.block_sync_post_commit => listener.handle(&events),
                ListenerMode::Async if !flags.block_async => {
                    let events = Arc::clone(&events);
                    match Handle::try_current() {
                        Ok(handle) => {
                            handle.spawn(async move { listener.handle(&events) });
                        }
                        Err(_) => listener.handle(&events),
                    }
                }
                _ => {}
            }
        }
    }
}

/// Import-scoped flag override, see [`EventService::enter_import`].
#[must_use = "the flags are restored as soon as the guard is dropped"]
pub struct ImportFlagsGuard {
    events: Arc<EventService>,
}

impl Drop for ImportFlagsGuard {
    fn drop(&mut self) {
        self.events.leave_import();
    }
}

/// Writes a debug line for every committed batch.
pub struct AuditLogListener;

impl DocumentEventListener for AuditLogListener {
    fn name(&self) -> &str {
        "audit-log"
    }

    fn handle(&self, events: &[DocumentEvent]) {
        log::debug!("{} documents committed", events.len());
        for event in events {
            log::trace!("{:?} {} ({})", event.kind, event.document.path, event.doc_type);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingListener {
        pub(crate) seen: AtomicUsize,
    }

    impl DocumentEventListener for CountingListener {
        fn name(&self) -> &str {
            "counting"
        }

        fn handle(&self, events: &[DocumentEvent]) {
            self.seen.fetch_add(events.len(), Ordering::SeqCst);
        }
    }

    fn events(n: usize) -> Vec<DocumentEvent> {
        (0..n)
            .map(|i| {
                DocumentEvent::created(
                    DocumentRef {
                        id: uuid::Uuid::new_v4(),
                        path: format!("/doc-{}", i),
                    },
                    "File",
                )
            })
            .collect()
    }

    #[test]
    fn sync_listeners_run_unless_blocked() {
        let service = EventService::new();
        let listener = Arc::new(CountingListener::default());
        service.add_listener(ListenerMode::Sync, listener.clone());

        service.fire_post_commit(events(3));
        assert_eq!(listener.seen.load(Ordering::SeqCst), 3);

        service.set_flags(EventFlags {
            block_sync_post_commit: true,
            ..EventFlags::default()
        });
        service.fire_post_commit(events(2));
        assert_eq!(listener.seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn set_flags_returns_previous_value() {
        let service = EventService::new();
        let bulk = EventFlags {
            bulk_mode: true,
            ..EventFlags::default()
        };

        assert_eq!(service.set_flags(bulk), EventFlags::default());
        assert!(service.is_bulk_mode());
        assert_eq!(service.set_flags(EventFlags::default()), bulk);
    }

    #[test]
    fn overlapping_imports_restore_the_baseline_once() {
        let service = Arc::new(EventService::new());
        let bulk = EventFlags {
            bulk_mode: true,
            ..EventFlags::default()
        };

        let first = service.enter_import(bulk);
        let second = service.enter_import(bulk);
        assert_eq!(service.active_imports(), 2);

        // the first import ends while the second still runs
        drop(first);
        assert!(service.is_bulk_mode());

        drop(second);
        assert_eq!(service.active_imports(), 0);
        assert_eq!(service.flags(), EventFlags::default());
    }

    #[tokio::test]
    async fn async_listeners_run_on_the_runtime() {
        let service = EventService::new();
        let listener = Arc::new(CountingListener::default());
        service.add_listener(ListenerMode::Async, listener.clone());

        service.fire_post_commit(events(4));
        for _ in 0..50 {
            if listener.seen.load(Ordering::SeqCst) == 4 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(listener.seen.load(Ordering::SeqCst), 4);
    }
}
