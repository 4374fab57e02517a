// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event delivery into subscriptions.
//
// `add_event` builds the event-notification payload from the affected
// objects (taking their read locks briefly, before any subscription lock),
// fans it out to every subscription whose event mask and scope match, and
// broadcasts the process-wide notify handle that Get-Notifications waiters
// and the scheduler listen on.

use std::sync::Arc;

use bitflags::bitflags;
use chrono::Utc;
use tokio::time::Duration;
use tracing::debug;

use platen_ipp::{Attributes, Value};

use crate::job::Job;
use crate::printer::Printer;
use crate::resource::Resource;
use crate::store::ServerState;

bitflags! {
    /// Subscribable event classes (`notify-events` keywords).
    ///
    /// Bit order matches [`Event::KEYWORDS`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Event: u32 {
        const PRINTER_CREATED            = 0x0000_0001;
        const PRINTER_DELETED            = 0x0000_0002;
        const PRINTER_CONFIG_CHANGED     = 0x0000_0004;
        const PRINTER_STATE_CHANGED      = 0x0000_0008;
        const PRINTER_STOPPED            = 0x0000_0010;
        const PRINTER_RESTARTED          = 0x0000_0020;
        const PRINTER_SHUTDOWN           = 0x0000_0040;
        const PRINTER_QUEUE_ORDER_CHANGED = 0x0000_0080;
        const JOB_CREATED                = 0x0000_0100;
        const JOB_COMPLETED              = 0x0000_0200;
        const JOB_CONFIG_CHANGED         = 0x0000_0400;
        const JOB_PROGRESS               = 0x0000_0800;
        const JOB_STATE_CHANGED          = 0x0000_1000;
        const JOB_STOPPED                = 0x0000_2000;
        const JOB_FETCHABLE              = 0x0000_4000;
        const RESOURCE_CREATED           = 0x0000_8000;
        const RESOURCE_INSTALLED         = 0x0001_0000;
        const RESOURCE_CANCELED          = 0x0002_0000;
        const RESOURCE_CONFIG_CHANGED    = 0x0004_0000;
        const RESOURCE_STATE_CHANGED     = 0x0008_0000;
        const SYSTEM_CONFIG_CHANGED      = 0x0010_0000;
        const SYSTEM_STATE_CHANGED       = 0x0020_0000;
        const SYSTEM_STOPPED             = 0x0040_0000;
    }
}

impl Event {
    /// Keyword for bit i is `KEYWORDS[i]`.
    pub const KEYWORDS: [&'static str; 23] = [
        "printer-created",
        "printer-deleted",
        "printer-config-changed",
        "printer-state-changed",
        "printer-stopped",
        "printer-restarted",
        "printer-shutdown",
        "printer-queue-order-changed",
        "job-created",
        "job-completed",
        "job-config-changed",
        "job-progress",
        "job-state-changed",
        "job-stopped",
        "job-fetchable",
        "resource-created",
        "resource-installed",
        "resource-canceled",
        "resource-config-changed",
        "resource-state-changed",
        "system-config-changed",
        "system-state-changed",
        "system-stopped",
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .position(|k| *k == keyword)
            .map(|i| Self::from_bits_truncate(1 << i))
    }

    /// Keywords for every set bit.
    pub fn keywords(&self) -> Vec<&'static str> {
        Self::KEYWORDS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bits() & (1 << i) != 0)
            .map(|(_, k)| *k)
            .collect()
    }

    /// The first keyword of the set, used as `notify-subscribed-event`.
    pub fn first_keyword(&self) -> &'static str {
        self.keywords().first().copied().unwrap_or("none")
    }
}

/// Enqueue an event into every matching subscription and wake waiters.
///
/// Object locks are taken (read-only) to build the payload and released
/// before the subscriptions registry lock, per the locking order.
pub async fn add_event(
    state: &Arc<ServerState>,
    printer: Option<&Arc<Printer>>,
    job: Option<&Arc<Job>>,
    event: Event,
    message: &str,
) {
    add_event_full(state, printer, job, None, event, message).await;
}

/// `add_event` variant carrying a resource reference.
pub async fn add_event_full(
    state: &Arc<ServerState>,
    printer: Option<&Arc<Printer>>,
    job: Option<&Arc<Job>>,
    resource: Option<&Arc<Resource>>,
    event: Event,
    message: &str,
) {
    let mut base = Attributes::new();
    base.add(
        "notify-subscribed-event",
        Value::Keyword(event.first_keyword().into()),
    );
    base.add("notify-text", Value::Text(message.into()));
    base.add("printer-up-time", Value::Integer(state.uptime()));

    let printer_id = printer.map(|p| p.id);
    let job_id = job.map(|j| j.id);

    if let Some(printer) = printer {
        let inner = printer.inner.read().await;
        base.add("printer-state", Value::Enum(inner.state.value()));
        base.add_all(
            "printer-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
        base.add("printer-is-accepting-jobs", Value::Boolean(inner.is_accepting));
    }
    if let Some(job) = job {
        let inner = job.inner.read().await;
        base.add("job-id", Value::Integer(job.id));
        base.add("job-state", Value::Enum(inner.state.value()));
        base.add_all(
            "job-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
        base.add(
            "job-impressions-completed",
            Value::Integer(inner.impressions_completed),
        );
    }
    if let Some(resource) = resource {
        let inner = resource.inner.read().await;
        base.add("resource-id", Value::Integer(resource.id));
        base.add("resource-state", Value::Enum(inner.state.value()));
    }

    let now = Utc::now();
    let mut delivered = 0usize;
    {
        let subs = state.subscriptions.read().await;
        for sub in subs.iter() {
            let mut inner = sub.inner.write().await;
            if inner.expired(now) || !inner.matches(printer_id, job_id, event) {
                continue;
            }
            if event == Event::JOB_PROGRESS && inner.throttled(now) {
                continue;
            }
            inner.enqueue(sub.id, base.clone(), now);
            delivered += 1;
        }
    }

    debug!(
        event = event.first_keyword(),
        subscriptions = delivered,
        "event enqueued"
    );
    state.event_notify.notify_waiters();
}

/// Background task: expire subscription leases and drop subscriptions
/// whose lease has lapsed.
pub async fn run_lease_sweeper(state: Arc<ServerState>) {
    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let now = Utc::now();
        let expired: Vec<i32> = {
            let subs = state.subscriptions.read().await;
            let mut expired = Vec::new();
            for sub in subs.iter() {
                if sub.inner.read().await.expired(now) {
                    expired.push(sub.id);
                }
            }
            expired
        };
        for id in expired {
            debug!(subscription_id = id, "subscription lease expired");
            state.remove_subscription(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use platen_core::ServerConfig;

    #[test]
    fn event_keywords_round_trip() {
        for (i, keyword) in Event::KEYWORDS.iter().enumerate() {
            let bit = Event::from_keyword(keyword).expect("known keyword");
            assert_eq!(bit.bits(), 1 << i);
        }
        assert_eq!(Event::from_keyword("bogus"), None);
        assert_eq!(Event::JOB_STATE_CHANGED.first_keyword(), "job-state-changed");
    }

    #[tokio::test]
    async fn add_event_reaches_matching_subscriptions_only() {
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let printer = Arc::new(Printer::new(
            1,
            "p",
            platen_core::ServiceType::Print,
            &state.config,
        ));
        state.add_printer(Arc::clone(&printer)).await;

        let matching = Arc::new(Subscription::new(
            state.next_subscription_id(),
            Some(printer.id),
            None,
            "alice",
            Event::JOB_STATE_CHANGED,
            0,
            10,
        ));
        let wrong_event = Arc::new(Subscription::new(
            state.next_subscription_id(),
            Some(printer.id),
            None,
            "alice",
            Event::PRINTER_STATE_CHANGED,
            0,
            10,
        ));
        let wrong_printer = Arc::new(Subscription::new(
            state.next_subscription_id(),
            Some(999),
            None,
            "alice",
            Event::JOB_STATE_CHANGED,
            0,
            10,
        ));
        state.add_subscription(Arc::clone(&matching)).await;
        state.add_subscription(Arc::clone(&wrong_event)).await;
        state.add_subscription(Arc::clone(&wrong_printer)).await;

        let job = Arc::new(Job::for_tests(1, printer.id, "p", 50));
        add_event(
            &state,
            Some(&printer),
            Some(&job),
            Event::JOB_STATE_CHANGED,
            "Job created.",
        )
        .await;

        assert_eq!(matching.inner.read().await.len(), 1);
        assert!(wrong_event.inner.read().await.is_empty());
        assert!(wrong_printer.inner.read().await.is_empty());

        let inner = matching.inner.read().await;
        let record = &inner.events_since(1)[0];
        assert_eq!(
            record.attrs.get_string("notify-subscribed-event"),
            Some("job-state-changed")
        );
        assert_eq!(record.attrs.get_integer("notify-sequence-number"), Some(1));
        assert_eq!(record.attrs.get_integer("job-id"), Some(1));
    }

    #[tokio::test]
    async fn add_event_wakes_waiters() {
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let waiter_state = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            tokio::time::timeout(
                Duration::from_secs(5),
                waiter_state.event_notify.notified(),
            )
            .await
            .is_ok()
        });
        // Give the waiter a moment to register.
        tokio::time::sleep(Duration::from_millis(50)).await;
        add_event(&state, None, None, Event::SYSTEM_CONFIG_CHANGED, "poke").await;
        assert!(waiter.await.expect("join"));
    }
}
