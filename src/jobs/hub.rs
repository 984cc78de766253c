//! In-process fan-out of job progress events
//!
//! Every subscriber owns a bounded channel. Delivery is best-effort: a
//! subscriber whose channel is full or closed is dropped from the job's
//! subscriber set instead of being retried. When a job publishes a terminal
//! status its channels are closed, which ends every subscriber's stream.

use crate::jobs::JobStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One progress notification for one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Receiving end of a progress subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub job_id: Uuid,
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Waits for the next event; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered event without waiting
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<ProgressEvent>,
}

/// Per-job subscriber registry
#[derive(Debug)]
pub struct ProgressHub {
    subscribers: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ProgressHub {
    /// Creates a hub whose subscribers buffer up to `buffer` events
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Attaches a subscriber to `job_id`
    ///
    /// When `initial` is given it is delivered first. If it carries a
    /// terminal status the subscriber is not registered, so the stream ends
    /// right after it.
    pub fn subscribe(&self, job_id: Uuid, initial: Option<ProgressEvent>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let finished = initial
            .as_ref()
            .map(|event| event.status.is_terminal())
            .unwrap_or(false);

        if let Some(event) = initial {
            // A fresh channel always has room for one event.
            let _ = sender.try_send(event);
        }

        if !finished {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers
                .entry(job_id)
                .or_default()
                .push(Subscriber { id, sender });
            tracing::debug!("Subscriber {} attached to job {}", id, job_id);
        }

        Subscription {
            id,
            job_id,
            receiver,
        }
    }

    /// Detaches a subscriber, returning whether it was attached
    pub fn unsubscribe(&self, job_id: Uuid, subscription_id: u64) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&job_id) else {
            return false;
        };

        let before = list.len();
        list.retain(|s| s.id != subscription_id);
        let removed = list.len() != before;

        if list.is_empty() {
            subscribers.remove(&job_id);
        }
        removed
    }

    /// Pushes an event to every subscriber of its job
    ///
    /// Subscribers that cannot accept the event are dropped. A terminal
    /// status closes every remaining channel for the job.
    pub fn publish(&self, event: &ProgressEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&event.job_id) else {
            return;
        };

        list.retain(|subscriber| match subscriber.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(
                    "Dropping subscriber {} of job {}: buffer full",
                    subscriber.id,
                    event.job_id
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    "Dropping subscriber {} of job {}: receiver gone",
                    subscriber.id,
                    event.job_id
                );
                false
            }
        });

        if event.status.is_terminal() || list.is_empty() {
            subscribers.remove(&event.job_id);
        }
    }

    /// Closes every subscriber of `job_id`
    pub fn close(&self, job_id: Uuid) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.remove(&job_id);
    }

    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.get(&job_id).map(Vec::len).unwrap_or(0)
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(job_id: Uuid, progress: u8, status: JobStatus) -> ProgressEvent {
        ProgressEvent {
            job_id,
            status,
            progress,
            message: format!("{}%", progress),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let hub = ProgressHub::new(16);
        let job = Uuid::new_v4();
        let mut first = hub.subscribe(job, None);
        let mut second = hub.subscribe(job, None);

        for progress in [10, 20, 30] {
            hub.publish(&event(job, progress, JobStatus::Running));
        }

        for sub in [&mut first, &mut second] {
            let seen: Vec<u8> = [sub.try_recv(), sub.try_recv(), sub.try_recv()]
                .into_iter()
                .map(|e| e.unwrap().progress)
                .collect();
            assert_eq!(seen, vec![10, 20, 30]);
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_does_not_affect_others() {
        let hub = ProgressHub::new(16);
        let job = Uuid::new_v4();
        let first = hub.subscribe(job, None);
        let mut second = hub.subscribe(job, None);

        hub.publish(&event(job, 10, JobStatus::Running));
        assert!(hub.unsubscribe(job, first.id));
        assert!(!hub.unsubscribe(job, first.id));
        hub.publish(&event(job, 20, JobStatus::Running));

        assert_eq!(second.recv().await.unwrap().progress, 10);
        assert_eq!(second.recv().await.unwrap().progress, 20);
        assert_eq!(hub.subscriber_count(job), 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_is_dropped() {
        let hub = ProgressHub::new(1);
        let job = Uuid::new_v4();
        let mut slow = hub.subscribe(job, None);
        let mut fast = hub.subscribe(job, None);

        hub.publish(&event(job, 10, JobStatus::Running));
        assert_eq!(fast.recv().await.unwrap().progress, 10);

        hub.publish(&event(job, 20, JobStatus::Running));
        assert_eq!(fast.recv().await.unwrap().progress, 20);
        assert_eq!(hub.subscriber_count(job), 1);

        // The slow subscriber keeps what it buffered, then its stream ends.
        assert_eq!(slow.recv().await.unwrap().progress, 10);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_removed() {
        let hub = ProgressHub::new(4);
        let job = Uuid::new_v4();
        let sub = hub.subscribe(job, None);
        drop(sub);

        hub.publish(&event(job, 10, JobStatus::Running));
        assert_eq!(hub.subscriber_count(job), 0);
    }

    #[tokio::test]
    async fn test_terminal_event_ends_stream() {
        let hub = ProgressHub::new(4);
        let job = Uuid::new_v4();
        let mut sub = hub.subscribe(job, None);

        hub.publish(&event(job, 100, JobStatus::Completed));

        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Completed);
        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscriber_count(job), 0);
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_delivered_first() {
        let hub = ProgressHub::new(4);
        let job = Uuid::new_v4();
        let mut sub = hub.subscribe(job, Some(event(job, 5, JobStatus::Running)));

        hub.publish(&event(job, 50, JobStatus::Running));

        assert_eq!(sub.recv().await.unwrap().progress, 5);
        assert_eq!(sub.recv().await.unwrap().progress, 50);
    }

    #[tokio::test]
    async fn test_terminal_snapshot_ends_immediately() {
        let hub = ProgressHub::new(4);
        let job = Uuid::new_v4();
        let mut sub = hub.subscribe(job, Some(event(job, 0, JobStatus::Failed)));

        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Failed);
        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscriber_count(job), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = ProgressHub::new(4);
        hub.publish(&event(Uuid::new_v4(), 10, JobStatus::Running));
    }
}
