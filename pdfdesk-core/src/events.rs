//! Notifications from the core to whatever presents the document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::BitmapHandle;

/// Observer interface implemented by the presentation layer. Every method defaults to a
/// no-op so a shell only overrides what it displays.
///
/// Calls may arrive on a worker thread (e.g. the state change after a background save).
pub trait ViewerShell: Send + Sync {
    fn state_changed(&self, _dirty: bool, _path: Option<&Path>) {}

    fn page_ready(&self, _page_index: usize, _bitmap: &BitmapHandle) {}

    fn page_failed(&self, _page_index: usize, _reason: &str) {}

    fn current_page_changed(&self, _page_index: usize, _total: usize) {}

    fn objects_changed(&self, _page_index: usize) {}
}

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    StateChanged {
        dirty: bool,
        path: Option<PathBuf>,
    },
    PageReady {
        page_index: usize,
        bitmap: BitmapHandle,
    },
    PageFailed {
        page_index: usize,
        reason: String,
    },
    CurrentPageChanged {
        page_index: usize,
        total: usize,
    },
    ObjectsChanged {
        page_index: usize,
    },
}

impl ViewerEvent {
    pub fn dispatch(&self, shell: &dyn ViewerShell) {
        match self {
            ViewerEvent::StateChanged { dirty, path } => shell.state_changed(*dirty, path.as_deref()),
            ViewerEvent::PageReady { page_index, bitmap } => shell.page_ready(*page_index, bitmap),
            ViewerEvent::PageFailed { page_index, reason } => shell.page_failed(*page_index, reason),
            ViewerEvent::CurrentPageChanged { page_index, total } => {
                shell.current_page_changed(*page_index, *total)
            }
            ViewerEvent::ObjectsChanged { page_index } => shell.objects_changed(*page_index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    shells: Vec<(SubscriptionId, Arc<dyn ViewerShell>)>,
}

/// Registry of shells for one document session. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<RwLock<Subscribers>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, shell: Arc<dyn ViewerShell>) -> SubscriptionId {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.shells.push((id, shell));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.shells.len();
        inner.shells.retain(|(existing, _)| *existing != id);
        inner.shells.len() != before
    }

    pub fn publish(&self, event: ViewerEvent) {
        // Snapshot the list so a shell may (un)subscribe from inside its callback.
        let shells: Vec<_> = self
            .inner
            .read()
            .shells
            .iter()
            .map(|(_, shell)| Arc::clone(shell))
            .collect();
        for shell in shells {
            event.dispatch(shell.as_ref());
        }
    }
}

/// A shell that just records what it was told. Useful for polling loops and tests.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ViewerEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<ViewerEvent> {
        self.events.lock().clone()
    }

    fn push(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }
}

impl ViewerShell for EventLog {
    fn state_changed(&self, dirty: bool, path: Option<&Path>) {
        self.push(ViewerEvent::StateChanged {
            dirty,
            path: path.map(Path::to_path_buf),
        });
    }

    fn page_ready(&self, page_index: usize, bitmap: &BitmapHandle) {
        self.push(ViewerEvent::PageReady {
            page_index,
            bitmap: Arc::clone(bitmap),
        });
    }

    fn page_failed(&self, page_index: usize, reason: &str) {
        self.push(ViewerEvent::PageFailed {
            page_index,
            reason: reason.to_string(),
        });
    }

    fn current_page_changed(&self, page_index: usize, total: usize) {
        self.push(ViewerEvent::CurrentPageChanged { page_index, total });
    }

    fn objects_changed(&self, page_index: usize) {
        self.push(ViewerEvent::ObjectsChanged { page_index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_every_subscriber_until_unsubscribed() {
        let hub = EventHub::new();
        let first = Arc::new(EventLog::new());
        let second = Arc::new(EventLog::new());
        let first_id = hub.subscribe(first.clone());
        hub.subscribe(second.clone());

        hub.publish(ViewerEvent::ObjectsChanged { page_index: 3 });
        assert!(hub.unsubscribe(first_id));
        assert!(!hub.unsubscribe(first_id));
        hub.publish(ViewerEvent::CurrentPageChanged {
            page_index: 1,
            total: 4,
        });

        assert_eq!(first.drain().len(), 1);
        let received = second.drain();
        assert_eq!(received.len(), 2);
        assert!(matches!(
            received[1],
            ViewerEvent::CurrentPageChanged {
                page_index: 1,
                total: 4
            }
        ));
    }
}
