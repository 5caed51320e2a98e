//! # Delivery Reports
//!
//! Dispatch is fire-and-forget, so nothing about the outcome of a delivery
//! is returned to the caller. The report bus is the side channel through
//! which those outcomes can still be observed: every filtered, delivered,
//! failed or dropped (event, tracker) pair produces a [`DeliveryReport`].
//!
//! The bus is a Tokio broadcast channel. Publishing never blocks and never
//! fails the dispatch; with no subscriber, reports are simply discarded.
//! Slow subscribers lag and lose the oldest reports.

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::trace;
use uuid::Uuid;

use crate::{event::Event, tracker::TrackerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ReportKind {
    /// `deliver` returned `Ok`.
    Delivered,
    /// Listed tracker was disabled, delivery skipped.
    NotEnabled,
    /// Listed identifier has no registered tracker.
    NotRegistered,
    /// `deliver` returned an error.
    Failed,
    /// `deliver` panicked.
    Panicked,
    /// The delivery queue was full or closed; nothing was delivered.
    Dropped,
}

impl ReportKind {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ReportKind::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub event_id: Uuid,
    pub event_name: String,
    /// `None` for reports about the whole event, e.g. [`ReportKind::Dropped`].
    pub tracker_id: Option<TrackerId>,
    pub kind: ReportKind,
    pub message: Option<String>,
}

impl DeliveryReport {
    pub fn new(event: &Event, tracker_id: Option<&TrackerId>, kind: ReportKind) -> Self {
        Self {
            event_id: event.id(),
            event_name: event.name().to_string(),
            tracker_id: tracker_id.cloned(),
            kind,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("Report receiver lagged: {count}")]
    Lagged { count: u64 },

    #[error("Report bus closed")]
    Closed,
}

pub type ReportResult<T> = Result<T, ReportError>;

pub struct ReportBus {
    sender: broadcast::Sender<DeliveryReport>,
    capacity: usize,
}

impl ReportBus {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects that
    /// before a bus is built.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> ReportReceiver {
        ReportReceiver::new(self.sender.subscribe())
    }

    pub fn publish(&self, report: DeliveryReport) {
        trace!("Publishing report: {:?}", report);
        // No subscribers is the normal case.
        let _ = self.sender.send(report);
    }

    pub fn subscribers_size(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct ReportReceiver {
    receiver: broadcast::Receiver<DeliveryReport>,
}

impl ReportReceiver {
    fn new(receiver: broadcast::Receiver<DeliveryReport>) -> Self {
        Self { receiver }
    }

    /// Receives the next report. On lag the receiver skips to the newest
    /// reports and returns [`ReportError::Lagged`]; calling again continues.
    pub async fn recv(&mut self) -> ReportResult<DeliveryReport> {
        match self.receiver.recv().await {
            Ok(report) => Ok(report),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                self.receiver = self.receiver.resubscribe();
                Err(ReportError::Lagged { count })
            }
            Err(broadcast::error::RecvError::Closed) => Err(ReportError::Closed),
        }
    }

    /// Non-blocking variant; `Ok(None)` when no report is pending.
    pub fn try_recv(&mut self) -> ReportResult<Option<DeliveryReport>> {
        match self.receiver.try_recv() {
            Ok(report) => Ok(Some(report)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                self.receiver = self.receiver.resubscribe();
                Err(ReportError::Lagged { count })
            }
            Err(broadcast::error::TryRecvError::Closed) => Err(ReportError::Closed),
        }
    }

    /// Stream of reports that silently skips over lag.
    pub fn into_stream(self) -> impl Stream<Item = DeliveryReport> {
        BroadcastStream::new(self.receiver).filter_map(|report| report.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kind: ReportKind) -> DeliveryReport {
        let event = Event::new("login", None);
        DeliveryReport::new(&event, Some(&"firebase".into()), kind)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = ReportBus::new(4);
        bus.publish(report(ReportKind::Delivered));
        assert_eq!(bus.subscribers_size(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = ReportBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(report(ReportKind::NotEnabled).with_message("disabled"));

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert_eq!(received1.kind, ReportKind::NotEnabled);
        assert_eq!(received2.message.as_deref(), Some("disabled"));
    }

    #[tokio::test]
    async fn test_lagged_receiver_recovers() {
        let bus = ReportBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.publish(report(ReportKind::Delivered));
        }
        assert!(matches!(rx.recv().await, Err(ReportError::Lagged { .. })));

        bus.publish(report(ReportKind::Failed));
        assert_eq!(rx.recv().await.unwrap().kind, ReportKind::Failed);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = ReportBus::new(2);
        let mut rx = bus.subscribe();
        assert_eq!(rx.try_recv(), Ok(None));
    }

    #[tokio::test]
    async fn test_stream_yields_reports() {
        let bus = ReportBus::new(8);
        let stream = bus.subscribe().into_stream();
        bus.publish(report(ReportKind::Delivered));
        bus.publish(report(ReportKind::Dropped));
        drop(bus);

        let kinds: Vec<_> = stream.map(|r| r.kind).collect().await;
        assert_eq!(kinds, vec![ReportKind::Delivered, ReportKind::Dropped]);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ReportKind::NotRegistered.to_string(), "NotRegistered");
        assert!(!ReportKind::Delivered.is_failure());
        assert!(ReportKind::Panicked.is_failure());
    }
}
