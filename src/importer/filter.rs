use super::error::ImportError;
use super::events::{EventFlags, EventService, ImportFlagsGuard};
use parking_lot::Mutex;
use std::sync::Arc;

/// Hooks run around a whole import.
pub trait ImporterFilter: Send + Sync {
    fn handle_before_import(&self);
    fn handle_after_import(&self, error: Option<&ImportError>);
}

/// Reconfigures the event service for the duration of an import.
pub struct EventServiceConfiguratorFilter {
    events: Arc<EventService>,
    flags: EventFlags,
    guard: Mutex<Option<ImportFlagsGuard>>,
}

impl EventServiceConfiguratorFilter {
    pub fn new(
        events: Arc<EventService>,
        block_sync_post_commit: bool,
        block_async: bool,
        block_mime_type_detection: bool,
        bulk_mode: bool,
    ) -> Self {
        Self {
            events,
            flags: EventFlags {
                block_sync_post_commit,
                block_async,
                block_mime_type_detection,
                bulk_mode,
            },
            guard: Mutex::new(None),
        }
    }

    /// Preset used for every service-launched import: bulk mode on, listeners untouched.
    pub fn bulk(events: Arc<EventService>) -> Self {
        Self::new(events, false, false, false, true)
    }
}

impl ImporterFilter for EventServiceConfiguratorFilter {
    fn handle_before_import(&self) {
        *self.guard.lock() = Some(self.events.enter_import(self.flags));
        log::debug!("event service configured for import: {:?}", self.flags);
    }

    fn handle_after_import(&self, error: Option<&ImportError>) {
        drop(self.guard.lock().take());
        if let Some(err) = error {
            log::debug!("event service restored after failed import: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_restored_after_import() {
        let events = Arc::new(EventService::new());
        let filter = EventServiceConfiguratorFilter::new(events.clone(), true, false, true, true);

        filter.handle_before_import();
        let during = events.flags();
        assert!(during.block_sync_post_commit);
        assert!(during.block_mime_type_detection);
        assert!(during.bulk_mode);
        assert!(!during.block_async);

        filter.handle_after_import(Some(&ImportError::AlreadyRunning));
        assert_eq!(events.flags(), EventFlags::default());
    }

    #[test]
    fn interleaved_filters_leave_normal_mode_behind() {
        let events = Arc::new(EventService::new());
        let first = EventServiceConfiguratorFilter::bulk(events.clone());
        let second = EventServiceConfiguratorFilter::bulk(events.clone());

        first.handle_before_import();
        second.handle_before_import();
        first.handle_after_import(None);
        assert!(events.is_bulk_mode());

        second.handle_after_import(None);
        assert!(!events.is_bulk_mode());
    }

    #[test]
    fn dropped_filter_releases_its_override() {
        let events = Arc::new(EventService::new());
        let filter = EventServiceConfiguratorFilter::bulk(events.clone());

        filter.handle_before_import();
        drop(filter);
        assert!(!events.is_bulk_mode());
        assert_eq!(events.active_imports(), 0);
    }
}
