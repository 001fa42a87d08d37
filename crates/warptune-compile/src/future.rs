//! A handle to an eventually-available module.

use crate::error::CompileError;
use std::sync::{Arc, Condvar, Mutex};
use warptune_backend::GpuModule;

#[derive(Debug)]
struct SharedSlot {
    slot: Mutex<Option<Result<GpuModule, CompileError>>>,
    done: Condvar,
}

/// Producer half: fulfilled exactly once by the compilation worker.
pub struct ModulePromise {
    shared: Arc<SharedSlot>,
}

impl ModulePromise {
    pub fn fulfill(self, result: Result<GpuModule, CompileError>) {
        let mut slot = self.shared.slot.lock().expect("module slot poisoned");
        *slot = Some(result);
        self.shared.done.notify_all();
    }
}

/// Consumer half: polled non-blockingly by the tuning state machine.
#[derive(Debug)]
pub struct PendingModule {
    shared: Arc<SharedSlot>,
}

/// Create an unfulfilled promise/future pair.
pub fn module_channel() -> (ModulePromise, PendingModule) {
    let shared = Arc::new(SharedSlot {
        slot: Mutex::new(None),
        done: Condvar::new(),
    });
    (
        ModulePromise {
            shared: Arc::clone(&shared),
        },
        PendingModule { shared },
    )
}

impl PendingModule {
    /// A future that is already resolved.
    pub fn ready_now(result: Result<GpuModule, CompileError>) -> PendingModule {
        let (promise, pending) = module_channel();
        promise.fulfill(result);
        pending
    }

    /// Whether the result is available without blocking.
    pub fn ready(&self) -> bool {
        self.shared
            .slot
            .lock()
            .expect("module slot poisoned")
            .is_some()
    }

    /// Take the result if it is available.
    pub fn try_take(&mut self) -> Option<Result<GpuModule, CompileError>> {
        self.shared
            .slot
            .lock()
            .expect("module slot poisoned")
            .take()
    }

    /// Block until the result is available and take it.
    ///
    /// Returns [`CompileError::WorkerLost`] if the producer was dropped
    /// without fulfilling the promise.
    pub fn wait_take(&mut self) -> Result<GpuModule, CompileError> {
        let mut slot = self.shared.slot.lock().expect("module slot poisoned");
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            if Arc::strong_count(&self.shared) == 1 {
                return Err(CompileError::WorkerLost);
            }
            let (guard, timeout) = self
                .shared
                .done
                .wait_timeout(slot, std::time::Duration::from_millis(50))
                .expect("module slot poisoned");
            slot = guard;
            let _ = timeout;
        }
    }
}
