//! Marshaling of engine callbacks onto the UI thread.
//!
//! Engine callbacks fire on engine-internal threads. They only post a
//! [`UiTask`] here; the owner of the surface drains the queue on the UI
//! thread, in posting order.

use crate::engine::Callback;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Work to run on the UI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiTask {
    /// The engine queued one or more events.
    EngineEvents,
    /// A new video frame is ready to be rendered.
    FrameReady,
}

#[derive(Default)]
struct Shared {
    tasks: Mutex<VecDeque<UiTask>>,
    notify: Mutex<Option<Callback>>,
}

/// Thread-safe FIFO of [`UiTask`]s.
#[derive(Clone, Default)]
pub struct UiQueue {
    inner: Arc<Shared>,
}

impl UiQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task`. Safe to call from any thread.
    ///
    /// A task identical to the one at the back of the queue is coalesced.
    pub fn post(&self, task: UiTask) {
        {
            let mut tasks = self.inner.tasks.lock();
            if tasks.back() == Some(&task) {
                return;
            }
            tasks.push_back(task);
        }

        let notify = self.inner.notify.lock().clone();
        if let Some(notify) = notify {
            notify();
        }
    }

    /// Removes and returns every queued task, oldest first.
    pub fn take_all(&self) -> Vec<UiTask> {
        self.inner.tasks.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Installs a callback run after every post, e.g. to wake a host event loop.
    pub fn set_notify(&self, notify: Option<Callback>) {
        *self.inner.notify.lock() = notify;
    }

    /// Callback that posts `task`, suitable for handing to the engine.
    pub fn poster(&self, task: UiTask) -> Callback {
        let queue = self.clone();
        Arc::new(move || queue.post(task))
    }
}

impl std::fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiQueue")
            .field("tasks", &*self.inner.tasks.lock())
            .finish_non_exhaustive()
    }
}
