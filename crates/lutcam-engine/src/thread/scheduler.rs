use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::Lifecycle;

/// Identifies one render thread's lifecycle inside a [`Scheduler`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    pub fn index(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct Slots {
    next: u64,
    lifecycles: HashMap<u64, Lifecycle>,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<Slots>,
    wake: Condvar,
}

/// The monitor render threads and their owners synchronize on.
///
/// One lock and one condition variable guard the lifecycle flags of every
/// thread registered here. Pipelines in the same application may share a
/// scheduler or each create their own; it is passed in at construction.
/// All waiters recheck their condition after every wake-up.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render threads currently registered.
    pub fn threads(&self) -> usize {
        self.inner.slots.lock().lifecycles.len()
    }

    pub(crate) fn register(&self, lifecycle: Lifecycle) -> SlotId {
        let mut slots = self.inner.slots.lock();
        slots.next += 1;
        let id = slots.next;
        slots.lifecycles.insert(id, lifecycle);
        SlotId(id)
    }

    pub(crate) fn unregister(&self, slot: SlotId) {
        self.inner.slots.lock().lifecycles.remove(&slot.0);
        self.inner.wake.notify_all();
    }

    pub(crate) fn lock(&self) -> SchedulerGuard<'_> {
        SchedulerGuard {
            slots: self.inner.slots.lock(),
            inner: &self.inner,
        }
    }

    /// Copy of a thread's flags.
    pub(crate) fn snapshot(&self, slot: SlotId) -> Option<Lifecycle> {
        self.inner.slots.lock().lifecycles.get(&slot.0).cloned()
    }

    /// Mutates a lifecycle and wakes every waiter. A no-op for slots that
    /// are gone.
    pub(crate) fn update<R>(&self, slot: SlotId, f: impl FnOnce(&mut Lifecycle) -> R) -> Option<R> {
        let mut guard = self.lock();
        let out = guard.lifecycle(slot).map(f);
        guard.notify_all();
        out
    }

    /// Mutates a lifecycle, wakes every waiter, then blocks until `done`
    /// holds (or the slot disappears).
    pub(crate) fn update_and_wait(
        &self,
        slot: SlotId,
        mutate: impl FnOnce(&mut Lifecycle),
        done: impl Fn(&Lifecycle) -> bool,
    ) {
        let mut guard = self.lock();
        let Some(lc) = guard.lifecycle(slot) else {
            return;
        };
        mutate(lc);
        guard.notify_all();
        while let Some(lc) = guard.lifecycle(slot) {
            if done(lc) {
                break;
            }
            guard.wait();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.threads())
            .finish()
    }
}

/// Held lock on a [`Scheduler`].
pub(crate) struct SchedulerGuard<'a> {
    slots: MutexGuard<'a, Slots>,
    inner: &'a Inner,
}

impl SchedulerGuard<'_> {
    pub(crate) fn lifecycle(&mut self, slot: SlotId) -> Option<&mut Lifecycle> {
        self.slots.lifecycles.get_mut(&slot.0)
    }

    pub(crate) fn notify_all(&self) {
        self.inner.wake.notify_all();
    }

    /// Releases the lock until notified.
    pub(crate) fn wait(&mut self) {
        self.inner.wake.wait(&mut self.slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn slots_are_independent() {
        let scheduler = Scheduler::new();
        let a = scheduler.register(Lifecycle::new(1, 1, true));
        let b = scheduler.register(Lifecycle::new(2, 2, false));
        assert_ne!(a, b);
        assert_eq!(scheduler.threads(), 2);

        scheduler.update(a, |lc| lc.request_paused = true);
        assert!(scheduler.snapshot(a).unwrap().request_paused);
        assert!(!scheduler.snapshot(b).unwrap().request_paused);

        scheduler.unregister(a);
        assert_eq!(scheduler.update(a, |lc| lc.width), None);
        assert_eq!(scheduler.threads(), 1);
    }

    #[test]
    fn waiter_wakes_when_condition_holds() {
        let scheduler = Scheduler::new();
        let slot = scheduler.register(Lifecycle::new(1, 1, true));

        let responder = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                scheduler.update(slot, |lc| lc.paused = true);
            })
        };

        scheduler.update_and_wait(slot, |lc| lc.request_paused = true, |lc| lc.paused);
        assert!(scheduler.snapshot(slot).unwrap().paused);
        responder.join().unwrap();
    }

    #[test]
    fn waiter_returns_when_slot_disappears() {
        let scheduler = Scheduler::new();
        let slot = scheduler.register(Lifecycle::new(1, 1, true));
        let remover = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                scheduler.unregister(slot);
            })
        };
        scheduler.update_and_wait(slot, |_| {}, |_| false);
        remover.join().unwrap();
    }
}
