//! Reload-safe generation counter for scheduled work
//!
//! Every piece of recurring work captures an [`Epoch`] when it is scheduled
//! and may only act while holding an [`EpochGuard`] for that value. The guard
//! is a read lock on the counter, so [`LifecycleEpoch::bump`] waits for
//! in-flight guarded work and nothing stale can start once the bump returns.
//!
//! Guards cover in-memory steps only. Economy calls and ledger I/O run after
//! the guard is dropped.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct LifecycleEpoch {
    current: RwLock<u64>,
}

/// Proof that the captured epoch is current; blocks bumps while alive.
///
/// Never call [`LifecycleEpoch::bump`] on the same thread while holding one.
pub struct EpochGuard<'a> {
    _lock: RwLockReadGuard<'a, u64>,
    epoch: Epoch,
}

impl EpochGuard<'_> {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

impl LifecycleEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        Epoch(*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Invalidate every previously captured epoch
    pub fn bump(&self) -> Epoch {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        tracing::debug!("Lifecycle epoch advanced to {}", *current);
        Epoch(*current)
    }

    pub fn is_current(&self, captured: Epoch) -> bool {
        self.current() == captured
    }

    /// Check and hold: returns a guard only if `captured` is still current
    pub fn guard(&self, captured: Epoch) -> Option<EpochGuard<'_>> {
        let lock = self.current.read().unwrap_or_else(PoisonError::into_inner);
        if *lock == captured.0 {
            Some(EpochGuard {
                _lock: lock,
                epoch: captured,
            })
        } else {
            None
        }
    }
}

/// An epoch captured at schedule time, handed to every run of a scheduled task
#[derive(Debug, Clone)]
pub struct EpochTicket {
    epoch: Arc<LifecycleEpoch>,
    captured: Epoch,
}

impl EpochTicket {
    pub fn capture(epoch: Arc<LifecycleEpoch>) -> Self {
        let captured = epoch.current();
        Self { epoch, captured }
    }

    pub fn captured(&self) -> Epoch {
        self.captured
    }

    pub fn is_current(&self) -> bool {
        self.epoch.is_current(self.captured)
    }

    pub fn guard(&self) -> Option<EpochGuard<'_>> {
        self.epoch.guard(self.captured)
    }

    /// Run `f` under the guard; `None` once the ticket is stale
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.guard()?;
        Some(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_bump_makes_captured_epoch_stale() {
        let epoch = LifecycleEpoch::new();
        let captured = epoch.current();
        assert!(epoch.is_current(captured));

        let next = epoch.bump();
        assert!(!epoch.is_current(captured));
        assert!(epoch.is_current(next));
        assert!(next > captured);
    }

    #[test]
    fn test_stale_callback_performs_no_mutation() {
        let epoch = LifecycleEpoch::new();
        let counter = AtomicU32::new(0);
        let captured = epoch.current();

        epoch.bump();

        if let Some(_guard) = epoch.guard(captured) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bump_waits_for_guarded_work() {
        let epoch = Arc::new(LifecycleEpoch::new());
        let captured = epoch.current();
        let work_done = Arc::new(AtomicBool::new(false));

        let guard = epoch.guard(captured).unwrap();

        let bumper = {
            let epoch = epoch.clone();
            let work_done = work_done.clone();
            thread::spawn(move || {
                epoch.bump();
                work_done.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(50));
        work_done.store(true, Ordering::SeqCst);
        drop(guard);

        assert!(bumper.join().unwrap(), "bump completed while guarded work was in flight");
        assert!(!epoch.is_current(captured));
    }

    #[test]
    fn test_ticket_runs_until_bumped() {
        let epoch = Arc::new(LifecycleEpoch::new());
        let ticket = EpochTicket::capture(epoch.clone());

        assert_eq!(ticket.run(|| 7), Some(7));
        assert!(ticket.is_current());

        epoch.bump();
        assert_eq!(ticket.run(|| 7), None);
        assert!(ticket.guard().is_none());
        assert!(!ticket.is_current());
    }

    #[test]
    fn test_bump_allowed_once_ticket_work_leaves_guard() {
        let epoch = Arc::new(LifecycleEpoch::new());
        let ticket = EpochTicket::capture(epoch.clone());

        // Unguarded follow-up work may reload from inside a scheduled task
        let drained = ticket.run(|| vec![1, 2, 3]).unwrap();
        let bumped = epoch.bump();

        assert_eq!(drained.len(), 3);
        assert!(bumped > ticket.captured());
    }
}
