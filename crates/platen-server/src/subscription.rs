// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Subscription object: a pull-mode (ippget) event subscription with a
// bounded ring of pending notifications.
//
// Sequence numbers are the public contract: they are assigned at enqueue,
// increase monotonically, and are never reused within a subscription.  The
// ring index is private; when the ring overflows, the oldest event is
// evicted and `first_sequence` advances.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use platen_ipp::{Attributes, Value};

use crate::events::Event;

/// One buffered event notification.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub sequence: i32,
    pub time: DateTime<Utc>,
    /// The event-notification attribute group, ready to copy into a
    /// Get-Notifications response.
    pub attrs: Attributes,
}

/// Mutable subscription state, guarded by the subscription's lock.
pub struct SubscriptionInner {
    /// Weak back-reference: id of the owning printer, if printer-scoped.
    pub printer_id: Option<i32>,
    /// Weak back-reference: id of the owning job, if job-scoped.
    pub job_id: Option<i32>,
    pub username: String,
    pub events: Event,
    /// Optional filter applied to notification attribute copies.
    pub notify_attributes: Vec<String>,
    /// Opaque client cookie, at most 63 bytes.
    pub user_data: Option<Vec<u8>>,
    pub charset: String,
    pub language: String,
    /// Lease in seconds; 0 means infinite.
    pub lease_seconds: i32,
    pub expire: Option<DateTime<Utc>>,
    /// Minimum spacing between delivered events, seconds.
    pub time_interval: i32,
    pub last_event_time: Option<DateTime<Utc>>,
    ring: VecDeque<EventRecord>,
    capacity: usize,
    pub first_sequence: i32,
    pub last_sequence: i32,
}

/// An event subscription.
pub struct Subscription {
    pub id: i32,
    pub uuid: String,
    pub inner: RwLock<SubscriptionInner>,
}

impl Subscription {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i32,
        printer_id: Option<i32>,
        job_id: Option<i32>,
        username: &str,
        events: Event,
        lease_seconds: i32,
        capacity: usize,
    ) -> Self {
        let expire = (lease_seconds > 0).then(|| Utc::now() + Duration::seconds(lease_seconds as i64));
        Self {
            id,
            uuid: format!("urn:uuid:{}", Uuid::new_v4()),
            inner: RwLock::new(SubscriptionInner {
                printer_id,
                job_id,
                username: username.to_string(),
                events,
                notify_attributes: Vec::new(),
                user_data: None,
                charset: "utf-8".into(),
                language: "en".into(),
                lease_seconds,
                expire,
                time_interval: 0,
                last_event_time: None,
                ring: VecDeque::new(),
                capacity,
                first_sequence: 1,
                last_sequence: 0,
            }),
        }
    }
}

impl SubscriptionInner {
    /// Whether this subscription wants events for the given scope/mask.
    ///
    /// Job subscriptions see only their job's events; printer subscriptions
    /// see their printer's; system subscriptions see everything.
    pub fn matches(&self, printer_id: Option<i32>, job_id: Option<i32>, mask: Event) -> bool {
        if (self.events & mask).is_empty() {
            return false;
        }
        if let Some(own_job) = self.job_id {
            return job_id == Some(own_job);
        }
        if let Some(own_printer) = self.printer_id {
            return printer_id == Some(own_printer);
        }
        true
    }

    /// Whether the time-interval throttle currently suppresses delivery.
    pub fn throttled(&self, now: DateTime<Utc>) -> bool {
        if self.time_interval <= 0 {
            return false;
        }
        self.last_event_time
            .is_some_and(|last| now - last < Duration::seconds(self.time_interval as i64))
    }

    /// Enqueue an event, evicting the oldest when full.  Returns the
    /// assigned sequence number.
    pub fn enqueue(&mut self, sub_id: i32, mut attrs: Attributes, now: DateTime<Utc>) -> i32 {
        self.last_sequence += 1;
        let sequence = self.last_sequence;

        attrs.set("notify-charset", vec![Value::Charset(self.charset.clone())]);
        attrs.set(
            "notify-natural-language",
            vec![Value::Language(self.language.clone())],
        );
        attrs.set("notify-subscription-id", vec![Value::Integer(sub_id)]);
        attrs.set("notify-sequence-number", vec![Value::Integer(sequence)]);
        if let Some(data) = &self.user_data {
            attrs.set("notify-user-data", vec![Value::OctetString(data.clone())]);
        }

        if self.ring.len() == self.capacity {
            self.ring.pop_front();
            self.first_sequence += 1;
        }
        self.ring.push_back(EventRecord { sequence, time: now, attrs });
        self.last_event_time = Some(now);
        sequence
    }

    /// Live ring length.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// All buffered events with sequence ≥ `since`.
    pub fn events_since(&self, since: i32) -> Vec<EventRecord> {
        self.ring.iter().filter(|e| e.sequence >= since).cloned().collect()
    }

    /// Truncate the lease, used when the back-referenced owner goes away.
    pub fn truncate_lease(&mut self) {
        self.printer_id = None;
        self.job_id = None;
        self.expire = Some(Utc::now());
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expire.is_some_and(|e| e <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(capacity: usize) -> Subscription {
        Subscription::new(1, Some(1), None, "alice", Event::JOB_STATE_CHANGED, 60, capacity)
    }

    fn event() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.add(
            "notify-subscribed-event",
            Value::Keyword("job-state-changed".into()),
        );
        attrs
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic_from_one() {
        let sub = subscription(10);
        let mut inner = sub.inner.write().await;
        assert_eq!(inner.enqueue(sub.id, event(), Utc::now()), 1);
        assert_eq!(inner.enqueue(sub.id, event(), Utc::now()), 2);
        assert_eq!(inner.enqueue(sub.id, event(), Utc::now()), 3);
        assert_eq!(inner.first_sequence, 1);
    }

    #[tokio::test]
    async fn ring_invariant_holds_through_eviction() {
        let sub = subscription(3);
        let mut inner = sub.inner.write().await;
        for _ in 0..7 {
            inner.enqueue(sub.id, event(), Utc::now());
            assert_eq!(
                (inner.last_sequence - inner.first_sequence + 1) as usize,
                inner.len(),
                "sequence window must equal live ring length"
            );
        }
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.first_sequence, 5);
        assert_eq!(inner.last_sequence, 7);
    }

    #[tokio::test]
    async fn events_since_filters_by_sequence() {
        let sub = subscription(10);
        let mut inner = sub.inner.write().await;
        for _ in 0..5 {
            inner.enqueue(sub.id, event(), Utc::now());
        }
        let got = inner.events_since(3);
        let seqs: Vec<i32> = got.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert!(inner.events_since(6).is_empty());
    }

    #[tokio::test]
    async fn scope_matching() {
        let sub = subscription(10);
        let inner = sub.inner.read().await;
        assert!(inner.matches(Some(1), None, Event::JOB_STATE_CHANGED));
        assert!(inner.matches(Some(1), Some(9), Event::JOB_STATE_CHANGED));
        assert!(!inner.matches(Some(2), None, Event::JOB_STATE_CHANGED));
        assert!(!inner.matches(Some(1), None, Event::PRINTER_STATE_CHANGED));
    }

    #[tokio::test]
    async fn job_scoped_subscription_sees_only_its_job() {
        let sub = Subscription::new(2, Some(1), Some(42), "bob", Event::JOB_COMPLETED, 0, 10);
        let inner = sub.inner.read().await;
        assert!(inner.matches(Some(1), Some(42), Event::JOB_COMPLETED));
        assert!(!inner.matches(Some(1), Some(43), Event::JOB_COMPLETED));
        assert!(!inner.matches(Some(1), None, Event::JOB_COMPLETED));
    }

    #[tokio::test]
    async fn lease_truncation_expires_and_clears_backrefs() {
        let sub = subscription(10);
        let mut inner = sub.inner.write().await;
        assert!(!inner.expired(Utc::now()));
        inner.truncate_lease();
        assert!(inner.expired(Utc::now()));
        assert_eq!(inner.printer_id, None);
    }

    #[tokio::test]
    async fn zero_lease_never_expires() {
        let sub = Subscription::new(3, None, None, "root", Event::all(), 0, 10);
        let inner = sub.inner.read().await;
        assert!(!inner.expired(Utc::now() + Duration::days(365)));
    }
}
