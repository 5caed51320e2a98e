//! # Dispatch Engine
//!
//! The engine owns the default parameters and the tracker registry, and fans
//! every dispatched event out to the trackers the event allows.
//!
//! ## Dispatch Flow
//!
//! ```text
//!  caller thread                 │  delivery runtime
//!                                │
//!  merge(defaults, descriptor)   │
//!  build Event                   │
//!  try_send ──── bounded queue ──┼──▶ fan-out loop
//!  return                        │      snapshot registry
//!                                │      filter: listed && enabled
//!                                │      reserve the tracker's lane
//!                                │      spawn one task per tracker
//!                                │        (waits for a running slot)
//! ```
//!
//! The synchronous half is cheap and never blocks: the event is built from
//! the defaults as they are at the moment of the call. Everything after the
//! queue is asynchronous and gives no ordering guarantees, neither between
//! events nor between trackers of the same event.
//!
//! Each tracker has its own [`DeliveryLane`]. The fan-out loop never waits
//! on one: when a tracker already holds `max_pending_per_tracker`
//! deliveries, it misses the event with a [`ReportKind::Dropped`] report
//! while every other tracker still receives it.
//!
//! ## Failure Model
//!
//! Dispatch is fire-and-forget. Nothing is returned to the caller, and a
//! missing, disabled or failing tracker simply does not receive the event.
//! Outcomes are visible through three channels only:
//!
//! - the tracker's own [`Tracker::handle_error`] hook
//! - the [`ReportBus`] ([`DispatchEngine::subscribe_reports`])
//! - `tracing` logs

use std::{
    collections::HashSet,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use futures::FutureExt;
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{self, error::TrySendError},
    },
};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    config::{ConcurrencyPolicy, Configuration},
    error::InternalResult,
    event::{DeliveryReport, Event, EventDescriptor, ReportBus, ReportKind, ReportReceiver},
    parameters::{merge, ParameterSet},
    scheduler::{InFlight, InFlightGuard, LaneLimits, LaneReservation, Scheduler},
    tracker::{Tracker, TrackerError, TrackerId},
    tracker_registry::{Registration, TrackerRegistry},
};

/// One dispatched event waiting for fan-out.
struct DispatchJob {
    event: Arc<Event>,
    recipients: HashSet<TrackerId>,
    _pending: InFlightGuard,
}

/// State shared between the engine and its fan-out loop.
///
/// Holds no queue sender, so dropping the engine closes the queue and ends
/// the loop.
struct DeliveryContext {
    registry: TrackerRegistry,
    reports: ReportBus,
    in_flight: Arc<InFlight>,
    handle: Handle,
}

pub struct DispatchEngine {
    defaults: RwLock<Option<ParameterSet>>,
    registry: TrackerRegistry,
    sender: mpsc::Sender<DispatchJob>,
    context: Arc<DeliveryContext>,
    dispatched: AtomicU64,
    scheduler: Scheduler,
}

impl DispatchEngine {
    /// Builds an engine and starts its fan-out loop.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    ///   for zero or oversized capacities, or zero worker counts
    /// * [`Error::NoRuntime`](crate::Error::NoRuntime) for the shared policy
    ///   outside of a Tokio runtime
    ///
    /// ```rust,no_run
    /// # use trackhub::{config::Configuration, dispatcher::DispatchEngine};
    /// # async fn example() -> trackhub::InternalResult<()> {
    /// let engine = DispatchEngine::new(Configuration::default())?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(level = "debug", skip(configuration), fields(concurrency = %configuration.concurrency))]
    pub fn new(configuration: Configuration) -> InternalResult<Self> {
        configuration.validate()?;
        let scheduler = Scheduler::new(configuration.concurrency)?;

        let registry = TrackerRegistry::with_limits(LaneLimits::from(&configuration));
        let (sender, receiver) = mpsc::channel(configuration.queue_capacity);
        let context = Arc::new(DeliveryContext {
            registry: registry.clone(),
            reports: ReportBus::new(configuration.report_capacity),
            in_flight: InFlight::new(),
            handle: scheduler.handle().clone(),
        });
        scheduler.spawn(run_fan_out(receiver, context.clone()));

        debug!(
            "DispatchEngine created: queue_capacity={}, max_concurrent_deliveries={}, max_pending_per_tracker={}",
            configuration.queue_capacity,
            configuration.max_concurrent_deliveries,
            configuration.max_pending_per_tracker
        );

        Ok(Self {
            defaults: RwLock::new(configuration.default_parameters),
            registry,
            sender,
            context,
            dispatched: AtomicU64::new(0),
            scheduler,
        })
    }

    /// Replaces the default parameters. In-flight events keep the defaults
    /// they were built with.
    pub fn set_default_parameters(&self, parameters: ParameterSet) {
        *self.defaults.write().unwrap_or_else(PoisonError::into_inner) = Some(parameters);
    }

    /// Merges `parameters` into the defaults; new keys win. `None` is a no-op.
    pub fn add_parameters(&self, parameters: Option<ParameterSet>) {
        if parameters.is_none() {
            return;
        }
        let mut defaults = self.defaults.write().unwrap_or_else(PoisonError::into_inner);
        *defaults = merge(defaults.take(), parameters);
    }

    pub fn default_parameters(&self) -> Option<ParameterSet> {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers a tracker under its own id, replacing any tracker with the
    /// same id.
    pub fn add_tracker(&self, tracker: Arc<dyn Tracker>) {
        self.registry.register(tracker);
    }

    pub fn remove_tracker(&self, id: &str) -> Option<Arc<dyn Tracker>> {
        self.registry.unregister(id)
    }

    pub fn tracker(&self, id: &str) -> Option<Arc<dyn Tracker>> {
        self.registry.get(id)
    }

    pub fn trackers(&self) -> &TrackerRegistry {
        &self.registry
    }

    /// Sends an event to every tracker that is both enabled and listed in
    /// `descriptor.trackers()`.
    ///
    /// Returns as soon as the event is built and queued. Never blocks and
    /// never fails: when the queue is full the event is dropped and a
    /// [`ReportKind::Dropped`] report is published.
    pub fn dispatch<E: EventDescriptor + ?Sized>(&self, descriptor: &E) {
        let parameters = merge(self.default_parameters(), Some(descriptor.parameters()));
        let event = Arc::new(Event::new(descriptor.name(), parameters));
        let recipients: HashSet<TrackerId> = descriptor.trackers().into_iter().collect();
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Dispatching event: {} ({}) to {} trackers",
            event.name(),
            event.id(),
            recipients.len()
        );
        if recipients.is_empty() {
            return;
        }

        let job = DispatchJob {
            event,
            recipients,
            _pending: self.context.in_flight.enter(),
        };
        if let Err(err) = self.sender.try_send(job) {
            let (job, reason) = match err {
                TrySendError::Full(job) => (job, "delivery queue full"),
                TrySendError::Closed(job) => (job, "delivery queue closed"),
            };
            warn!("Event dropped: {} ({}): {}", job.event.name(), job.event.id(), reason);
            self.context
                .reports
                .publish(DeliveryReport::new(&job.event, None, ReportKind::Dropped).with_message(reason));
        }
    }

    /// Waits until no dispatched event is queued or being delivered.
    ///
    /// Meant for tests and graceful shutdown; under a steady stream of
    /// dispatches from other tasks this may not return.
    pub async fn flush(&self) {
        self.context.in_flight.wait_idle().await;
    }

    /// Queued plus running deliveries.
    pub fn pending(&self) -> usize {
        self.context.in_flight.count()
    }

    pub fn subscribe_reports(&self) -> ReportReceiver {
        self.context.reports.subscribe()
    }

    /// Number of `dispatch` calls so far, delivered or not.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn concurrency(&self) -> ConcurrencyPolicy {
        self.scheduler.policy()
    }
}

async fn run_fan_out(mut receiver: mpsc::Receiver<DispatchJob>, context: Arc<DeliveryContext>) {
    while let Some(job) = receiver.recv().await {
        fan_out(&context, job);
    }
    debug!("Fan-out loop stopped");
}

fn fan_out(context: &Arc<DeliveryContext>, job: DispatchJob) {
    let DispatchJob {
        event,
        recipients,
        _pending,
    } = job;
    let mut found = HashSet::with_capacity(recipients.len());

    for Registration { tracker, lane } in context.registry.registrations() {
        let Some(id) = guarded(|| tracker.id().clone()) else {
            continue;
        };
        if !recipients.contains(&id) {
            continue;
        }
        found.insert(id.clone());

        if !guarded(|| tracker.is_enabled()).unwrap_or(false) {
            trace!("Tracker not enabled: {}", id);
            notify(&*tracker, &TrackerError::NotEnabled { id: id.clone() });
            context
                .reports
                .publish(DeliveryReport::new(&event, Some(&id), ReportKind::NotEnabled));
            continue;
        }

        let Some(reservation) = lane.try_reserve() else {
            lane_full(context, &event, &id);
            continue;
        };
        let pending = context.in_flight.enter();
        context.handle.spawn(deliver(
            context.clone(),
            tracker,
            id,
            event.clone(),
            reservation,
            pending,
        ));
    }

    for id in recipients.difference(&found) {
        debug!("Tracker not registered: {} for event {}", id, event.name());
        context.reports.publish(
            DeliveryReport::new(&event, Some(id), ReportKind::NotRegistered)
                .with_message(TrackerError::NotRegistered { id: id.clone() }.to_string()),
        );
    }
}

async fn deliver(
    context: Arc<DeliveryContext>,
    tracker: Arc<dyn Tracker>,
    id: TrackerId,
    event: Arc<Event>,
    reservation: LaneReservation,
    _pending: InFlightGuard,
) {
    let _permit = reservation.start().await;
    trace!("Delivering event {} to {}", event.name(), id);
    let outcome = AssertUnwindSafe(async { tracker.deliver(&event).await })
        .catch_unwind()
        .await;

    let report = match outcome {
        Ok(Ok(())) => DeliveryReport::new(&event, Some(&id), ReportKind::Delivered),
        Ok(Err(err)) => {
            warn!("Delivery failed: {} at {}: {}", event.name(), id, err);
            notify(&*tracker, &err);
            DeliveryReport::new(&event, Some(&id), ReportKind::Failed).with_message(err.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Tracker panicked: {} at {}: {}", event.name(), id, message);
            notify(&*tracker, &TrackerError::delivery_failed(&id, message.clone()));
            DeliveryReport::new(&event, Some(&id), ReportKind::Panicked).with_message(message)
        }
    };
    context.reports.publish(report);
}

fn lane_full(context: &DeliveryContext, event: &Event, id: &TrackerId) {
    warn!(
        "Event dropped for tracker {}: {} ({}): {} deliveries already pending",
        id,
        event.name(),
        event.id(),
        context.registry.limits().pending
    );
    context.reports.publish(
        DeliveryReport::new(event, Some(id), ReportKind::Dropped)
            .with_message("tracker backlog full"),
    );
}

/// Calls the tracker's error hook, containing a panic in it.
fn notify(tracker: &dyn Tracker, error: &TrackerError) {
    if guarded(|| tracker.handle_error(error)).is_none() {
        warn!("Error hook panicked: {}", error.id());
    }
}

/// Runs tracker code on the fan-out loop; a panic yields `None` instead of
/// ending the loop.
fn guarded<T>(f: impl FnOnce() -> T) -> Option<T> {
    catch_unwind(AssertUnwindSafe(f)).ok()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
