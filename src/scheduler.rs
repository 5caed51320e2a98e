//! Execution context of the delivery phase.
//!
//! [`Scheduler`] resolves a [`ConcurrencyPolicy`] into a Tokio runtime
//! handle: the ambient runtime for [`ConcurrencyPolicy::Shared`], or a
//! runtime owned by the scheduler for [`ConcurrencyPolicy::Dedicated`].
//! [`InFlight`] counts queued and running deliveries so callers can wait for
//! the engine to go idle. [`DeliveryLane`] bounds the deliveries of a single
//! tracker, so one stuck backend cannot starve the others.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    sync::{Notify, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    config::{ConcurrencyPolicy, Configuration},
    error::{Error, InternalResult},
};

pub struct Scheduler {
    policy: ConcurrencyPolicy,
    handle: Handle,
    /// Present only for the dedicated policy.
    runtime: Option<Runtime>,
}

impl Scheduler {
    pub fn new(policy: ConcurrencyPolicy) -> InternalResult<Self> {
        match policy {
            ConcurrencyPolicy::Shared => {
                let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
                Ok(Self {
                    policy,
                    handle,
                    runtime: None,
                })
            }
            ConcurrencyPolicy::Dedicated { worker_threads } => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(worker_threads)
                    .thread_name("trackhub-delivery")
                    .enable_all()
                    .build()
                    .map_err(Error::RuntimeBuild)?;
                debug!("Dedicated delivery runtime started: {} workers", worker_threads);
                Ok(Self {
                    policy,
                    handle: runtime.handle().clone(),
                    runtime: Some(runtime),
                })
            }
        }
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Runtime::drop panics inside an async context; shutdown_background does not.
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down dedicated delivery runtime");
            runtime.shutdown_background();
        }
    }
}

/// Count of pending units of work.
#[derive(Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one unit of work. It completes when the guard drops,
    /// including during a panic unwind.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: self.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// Per-tracker delivery bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneLimits {
    /// Deliveries waiting or running before new ones are dropped.
    pub pending: usize,
    /// Deliveries running at the same time.
    pub concurrent: usize,
}

impl Default for LaneLimits {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

impl From<&Configuration> for LaneLimits {
    fn from(configuration: &Configuration) -> Self {
        Self {
            pending: configuration.max_pending_per_tracker,
            concurrent: configuration.max_concurrent_deliveries,
        }
    }
}

/// Delivery capacity of one registered tracker.
///
/// A delivery first reserves a pending slot without waiting, then waits for
/// a running slot inside its own task. The fan-out loop only ever does the
/// first step.
#[derive(Debug)]
pub struct DeliveryLane {
    pending: Arc<Semaphore>,
    running: Arc<Semaphore>,
}

impl DeliveryLane {
    pub fn new(limits: LaneLimits) -> Self {
        Self {
            pending: Arc::new(Semaphore::new(limits.pending)),
            running: Arc::new(Semaphore::new(limits.concurrent)),
        }
    }

    /// `None` when the lane already holds `pending` deliveries.
    pub fn try_reserve(&self) -> Option<LaneReservation> {
        let pending = self.pending.clone().try_acquire_owned().ok()?;
        Some(LaneReservation {
            _pending: pending,
            running: self.running.clone(),
        })
    }

    pub fn available_pending(&self) -> usize {
        self.pending.available_permits()
    }

    pub fn available_running(&self) -> usize {
        self.running.available_permits()
    }
}

/// A pending slot in a [`DeliveryLane`].
pub struct LaneReservation {
    _pending: OwnedSemaphorePermit,
    running: Arc<Semaphore>,
}

impl LaneReservation {
    /// Waits for a running slot. Both slots are released when the returned
    /// permit drops.
    pub async fn start(self) -> LanePermit {
        // lane semaphores are never closed
        let running = self.running.clone().acquire_owned().await.ok();
        LanePermit {
            _reservation: self,
            _running: running,
        }
    }
}

pub struct LanePermit {
    _reservation: LaneReservation,
    _running: Option<OwnedSemaphorePermit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shared_requires_runtime() {
        assert!(matches!(
            Scheduler::new(ConcurrencyPolicy::Shared),
            Err(Error::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_shared_uses_current_runtime() {
        let scheduler = Scheduler::new(ConcurrencyPolicy::Shared).unwrap();
        assert_eq!(scheduler.policy(), ConcurrencyPolicy::Shared);
        assert_eq!(scheduler.spawn(async { 1 + 1 }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dedicated_runs_on_own_threads() {
        let scheduler =
            Scheduler::new(ConcurrencyPolicy::Dedicated { worker_threads: 1 }).unwrap();
        let name = scheduler
            .spawn(async { std::thread::current().name().map(str::to_string) })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("trackhub-delivery"));
        // dropped inside an async context
        drop(scheduler);
    }

    #[test]
    fn test_dedicated_without_ambient_runtime() {
        let scheduler =
            Scheduler::new(ConcurrencyPolicy::Dedicated { worker_threads: 2 }).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        scheduler.spawn(async move {
            tx.send(42).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_in_flight_waits_for_guards() {
        let in_flight = InFlight::new();
        let guard = in_flight.enter();
        let second = in_flight.enter();
        assert_eq!(in_flight.count(), 2);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
            drop(second);
        });

        tokio::time::timeout(Duration::from_secs(1), in_flight.wait_idle())
            .await
            .unwrap();
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn test_lane_reserve_is_bounded() {
        let lane = DeliveryLane::new(LaneLimits {
            pending: 2,
            concurrent: 1,
        });
        let first = lane.try_reserve().unwrap();
        let second = lane.try_reserve().unwrap();
        assert!(lane.try_reserve().is_none());
        assert_eq!(lane.available_pending(), 0);

        drop(second);
        assert!(lane.try_reserve().is_some());
        drop(first);
        assert_eq!(lane.available_pending(), 2);
    }

    #[tokio::test]
    async fn test_lane_start_waits_for_running_slot() {
        let lane = DeliveryLane::new(LaneLimits {
            pending: 4,
            concurrent: 1,
        });
        let running = lane.try_reserve().unwrap().start().await;
        assert_eq!(lane.available_running(), 0);

        let waiting = tokio::spawn(lane.try_reserve().unwrap().start());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        assert_eq!(lane.available_pending(), 2);

        drop(running);
        let permit = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        drop(permit);
        assert_eq!(lane.available_pending(), 4);
        assert_eq!(lane.available_running(), 1);
    }

    #[test]
    fn test_lane_limits_from_configuration() {
        let config = Configuration::default()
            .with_max_pending_per_tracker(8)
            .with_max_concurrent_deliveries(2);
        assert_eq!(
            LaneLimits::from(&config),
            LaneLimits {
                pending: 8,
                concurrent: 2
            }
        );
    }
}
