//! Interrupt pin and deferred context-sync queue.
//!
//! Devices and timer threads share this handle with the CPU. The pin and
//! the queue are only observed by the interpreter at instruction
//! boundaries; no ordering is promised inside an instruction.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

type SyncAction = Box<dyn FnOnce() + Send>;

/// Shared handle for asynchronous events targeting the CPU.
#[derive(Default)]
pub struct InterruptLine {
    pin: AtomicBool,
    power_off: AtomicBool,
    actions: Mutex<Vec<SyncAction>>,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert the external interrupt pin.
    pub fn assert_int(&self) {
        self.pin.store(true, Ordering::Release);
    }

    /// Release the external interrupt pin.
    pub fn release_int(&self) {
        self.pin.store(false, Ordering::Release);
    }

    /// Whether the pin is currently asserted.
    pub fn is_asserted(&self) -> bool {
        self.pin.load(Ordering::Acquire)
    }

    /// Ask the run loop to stop at the next instruction boundary.
    pub fn request_power_off(&self) {
        self.power_off.store(true, Ordering::Release);
    }

    /// Consume a pending power-off request.
    pub(crate) fn take_power_off(&self) -> bool {
        self.power_off.swap(false, Ordering::AcqRel)
    }

    /// Queue a callback to run at the next instruction boundary.
    pub fn post_ctx_sync(&self, action: impl FnOnce() + Send + 'static) {
        self.actions.lock().push(Box::new(action));
    }

    /// Take all queued context-sync actions.
    pub(crate) fn drain_ctx_sync(&self) -> Vec<SyncAction> {
        std::mem::take(&mut *self.actions.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_pin_assert_release() {
        let line = InterruptLine::new();
        assert!(!line.is_asserted());
        line.assert_int();
        assert!(line.is_asserted());
        line.release_int();
        assert!(!line.is_asserted());
    }

    #[test]
    fn test_ctx_sync_drains_in_order() {
        let line = InterruptLine::new();
        let counter = Arc::new(AtomicU32::new(0));

        for i in 1..=3 {
            let c = counter.clone();
            line.post_ctx_sync(move || {
                c.store(i, Ordering::SeqCst);
            });
        }

        let actions = line.drain_ctx_sync();
        assert_eq!(actions.len(), 3);
        for a in actions {
            a();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(line.drain_ctx_sync().is_empty());
    }
}
