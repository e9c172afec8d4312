//! Epoch-bound recurring and delayed work on the Tokio runtime
//!
//! Each run happens on the blocking pool, since actions call into the economy
//! and the ledger. The action receives its [`EpochTicket`] and takes the guard
//! itself around whatever must not straddle a reload.

use crate::epoch::{EpochTicket, LifecycleEpoch};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::{self, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, trace, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
}

/// Every task is `(epoch, action)`: once its epoch is stale it never runs again.
pub struct Scheduler {
    epoch: Arc<LifecycleEpoch>,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl Scheduler {
    pub fn new(epoch: Arc<LifecycleEpoch>) -> Self {
        Self {
            epoch,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn epoch(&self) -> &Arc<LifecycleEpoch> {
        &self.epoch
    }

    /// Run `action` every `interval`, starting one interval from now.
    ///
    /// Returns false when called outside a Tokio runtime.
    pub fn schedule_repeating<F>(&self, name: impl Into<String>, interval: Duration, action: F) -> bool
    where
        F: Fn(&EpochTicket) + Send + Sync + 'static,
    {
        let name = name.into();
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot schedule '{}' outside a Tokio runtime", name);
            return false;
        };

        let ticket = EpochTicket::capture(self.epoch.clone());
        let captured = ticket.captured();
        let action = Arc::new(action);
        let interval = interval.max(MIN_INTERVAL);
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let tick_ticket = ticket.clone();
                let tick_action = action.clone();
                let ran = task::spawn_blocking(move || {
                    if !tick_ticket.is_current() {
                        return false;
                    }
                    tick_action(&tick_ticket);
                    true
                })
                .await;

                match ran {
                    Ok(true) => {}
                    Ok(false) => {
                        trace!("Task '{}' from epoch {} is stale, stopping", task_name, captured.value());
                        break;
                    }
                    Err(e) => warn!("Task '{}' tick failed: {}", task_name, e),
                }
            }
        });

        debug!("Scheduled '{}' every {:?} in epoch {}", name, interval, captured.value());
        self.track(name, handle);
        true
    }

    /// Run `action` once after `delay`, unless the epoch moves first
    pub fn schedule_once<F>(&self, name: impl Into<String>, delay: Duration, action: F) -> bool
    where
        F: FnOnce(&EpochTicket) + Send + 'static,
    {
        let name = name.into();
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot schedule '{}' outside a Tokio runtime", name);
            return false;
        };

        let ticket = EpochTicket::capture(self.epoch.clone());
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            time::sleep(delay).await;

            let captured = ticket.captured();
            let ran = task::spawn_blocking(move || {
                if !ticket.is_current() {
                    return false;
                }
                action(&ticket);
                true
            })
            .await;

            match ran {
                Ok(true) => {}
                Ok(false) => trace!("One-shot '{}' from epoch {} is stale, skipped", task_name, captured.value()),
                Err(e) => warn!("One-shot '{}' failed: {}", task_name, e),
            }
        });

        self.track(name, handle);
        true
    }

    /// Bump the epoch and abort every outstanding task
    pub fn cancel_all(&self) -> usize {
        self.epoch.bump();

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return 0,
        };

        let mut cancelled = 0;
        for task in tasks {
            if !task.handle.is_finished() {
                trace!("Aborting scheduled task '{}'", task.name);
                cancelled += 1;
            }
            task.handle.abort();
        }

        if cancelled > 0 {
            debug!("Cancelled {} scheduled task(s)", cancelled);
        }
        cancelled
    }

    /// Number of tasks still running
    pub fn active(&self) -> usize {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.retain(|task| !task.handle.is_finished());
                tasks.len()
            }
            Err(_) => 0,
        }
    }

    fn track(&self, name: String, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.handle.is_finished());
            tasks.push(ScheduledTask { name, handle });
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        thread,
        time::Instant,
    };

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(LifecycleEpoch::new()))
    }

    #[tokio::test]
    async fn test_repeating_task_ticks() {
        let scheduler = scheduler();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = ticks.clone();
        assert!(scheduler.schedule_repeating("tick", Duration::from_millis(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        time::sleep(Duration::from_millis(80)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
        assert_eq!(scheduler.active(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_ticks() {
        let scheduler = scheduler();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = ticks.clone();
        scheduler.schedule_repeating("tick", Duration::from_millis(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        time::sleep(Duration::from_millis(35)).await;

        assert_eq!(scheduler.cancel_all(), 1);
        let seen = ticks.load(Ordering::SeqCst);

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test]
    async fn test_external_bump_retires_stale_task() {
        let scheduler = scheduler();
        let ticks = Arc::new(AtomicU32::new(0));

        let counter = ticks.clone();
        scheduler.schedule_repeating("tick", Duration::from_millis(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.epoch().bump();
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test]
    async fn test_once_skipped_after_bump() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        scheduler.schedule_once("late", Duration::from_millis(20), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = fired.clone();
        scheduler.epoch().bump();
        scheduler.schedule_once("fresh", Duration::from_millis(20), move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_schedule_outside_runtime_refused() {
        let scheduler = scheduler();
        assert!(!scheduler.schedule_repeating("nowhere", Duration::from_millis(5), |_| {}));
        assert!(!scheduler.schedule_once("nowhere", Duration::from_millis(5), |_| {}));
    }

    #[tokio::test]
    async fn test_slow_action_leaves_runtime_responsive() {
        let scheduler = scheduler();
        let entered = Arc::new(AtomicU32::new(0));

        let flag = entered.clone();
        scheduler.schedule_once("slow", Duration::from_millis(1), move |_| {
            flag.store(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(400));
        });

        while entered.load(Ordering::SeqCst) == 0 {
            time::sleep(Duration::from_millis(1)).await;
        }

        let started = Instant::now();
        time::sleep(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_action_can_cancel_its_own_scheduler() {
        let scheduler = Arc::new(scheduler());
        let weak = Arc::downgrade(&scheduler);

        scheduler.schedule_repeating("self-cancel", Duration::from_millis(5), move |_| {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.cancel_all();
            }
        });

        let before = scheduler.epoch().current();
        let result = time::timeout(Duration::from_secs(1), async {
            while scheduler.epoch().current() == before {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "cancel_all from a scheduled task never returned");
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test]
    async fn test_ticket_guard_goes_stale_after_cancel() {
        let scheduler = scheduler();
        let guarded = Arc::new(AtomicU32::new(0));

        let counter = guarded.clone();
        scheduler.schedule_once("late", Duration::from_millis(30), move |ticket| {
            if ticket.run(|| ()).is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        scheduler.cancel_all();

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(guarded.load(Ordering::SeqCst), 0);
    }
}
