// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subscription operations and pull-mode (ippget) notification delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use platen_core::error::Result;
use platen_ipp::tag::GroupTag;
use platen_ipp::{status, Attribute, Message, Value};

use crate::auth;
use crate::dispatch::Ctx;
use crate::events::Event;
use crate::job::Job;
use crate::ops::{error_response, ok_response, requested_attributes};
use crate::printer::Printer;
use crate::subscription::Subscription;
use crate::validate;

/// Default lease when the client does not ask for one, seconds.
const DEFAULT_LEASE_SECONDS: i32 = 86400;

/// Bound on one Get-Notifications wait iteration.
const NOTIFY_WAIT: Duration = Duration::from_secs(30);

/// Maximum notify-user-data payload, bytes.
const USER_DATA_MAX: usize = 63;

/// Outcome of validating one subscription template group.
enum TemplateOutcome {
    Created(Arc<Subscription>),
    Invalid { offender: Attribute, message: &'static str },
}

/// Validate one subscription group and create the subscription object.
async fn create_from_template(
    ctx: &Ctx<'_>,
    printer: Option<&Arc<Printer>>,
    job: Option<&Arc<Job>>,
    template: &platen_ipp::Attributes,
) -> TemplateOutcome {
    // Pull method is mandatory and must be ippget; push URIs are refused.
    if let Some(attr) = template.find("notify-recipient-uri") {
        return TemplateOutcome::Invalid {
            offender: attr.clone(),
            message: "Push notifications are not supported.",
        };
    }
    match template.find("notify-pull-method") {
        Some(attr) if attr.values.first().and_then(Value::as_str) == Some("ippget") => {}
        Some(attr) => {
            return TemplateOutcome::Invalid {
                offender: attr.clone(),
                message: "Unsupported notify-pull-method.",
            }
        }
        None => {
            return TemplateOutcome::Invalid {
                offender: Attribute::new(
                    "notify-pull-method",
                    Value::OutOfBand(platen_ipp::tag::UNSUPPORTED_VALUE),
                ),
                message: "Missing notify-pull-method.",
            }
        }
    }

    let mut events = Event::empty();
    if let Some(attr) = template.find("notify-events") {
        for value in attr.values.iter().filter_map(Value::as_str) {
            match Event::from_keyword(value) {
                Some(event) => events |= event,
                None => {
                    return TemplateOutcome::Invalid {
                        offender: attr.clone(),
                        message: "Unsupported notify-events keyword.",
                    }
                }
            }
        }
    }
    if events.is_empty() {
        events = Event::JOB_COMPLETED;
    }

    if let Some(attr) = template.find("notify-user-data") {
        let too_big = attr.values.first().is_some_and(|v| match v {
            Value::OctetString(bytes) => bytes.len() > USER_DATA_MAX,
            _ => false,
        });
        if too_big {
            return TemplateOutcome::Invalid {
                offender: attr.clone(),
                message: "notify-user-data is limited to 63 octets.",
            };
        }
    }

    let lease = if job.is_some() {
        // Job subscriptions live exactly as long as their job.
        0
    } else {
        template
            .get_integer("notify-lease-duration")
            .unwrap_or(DEFAULT_LEASE_SECONDS)
            .max(0)
    };

    let sub = Arc::new(Subscription::new(
        ctx.state.next_subscription_id(),
        printer.map(|p| p.id),
        job.map(|j| j.id),
        &ctx.effective_username(),
        events,
        lease,
        ctx.state.config.max_subscription_events,
    ));

    {
        let mut inner = sub.inner.write().await;
        inner.time_interval = template.get_integer("notify-time-interval").unwrap_or(0).max(0);
        if let Some(attr) = template.find("notify-attributes") {
            inner.notify_attributes = attr
                .values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(Value::OctetString(bytes)) =
            template.find("notify-user-data").and_then(|a| a.values.first())
        {
            inner.user_data = Some(bytes.clone());
        }
        if let Some(charset) = ctx
            .request
            .operation()
            .and_then(|g| g.get_string("attributes-charset"))
        {
            inner.charset = charset.to_string();
        }
        if let Some(language) = ctx
            .request
            .operation()
            .and_then(|g| g.get_string("attributes-natural-language"))
        {
            inner.language = language.to_string();
        }
    }

    ctx.state.add_subscription(Arc::clone(&sub)).await;
    info!(subscription_id = sub.id, events = ?events, "subscription created");
    TemplateOutcome::Created(sub)
}

/// Create-Printer/Job/System-Subscriptions: one subscription per
/// subscription template group.
pub async fn create_subscriptions(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.printer.clone();

    // Create-Job-Subscriptions targets an existing job.
    let job = match (ctx.request.code == platen_ipp::op::CREATE_JOB_SUBSCRIPTIONS, &printer) {
        (true, Some(printer)) => {
            let Some(job) = crate::ops::find_target_job(ctx, printer).await else {
                return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
            };
            Some(job)
        }
        _ => None,
    };

    let mut response = ok_response(ctx.request);
    let templates: Vec<platen_ipp::Attributes> = ctx
        .request
        .groups_tagged(GroupTag::Subscription)
        .cloned()
        .collect();

    if templates.is_empty() {
        return Ok(error_response(
            ctx.request,
            status::BAD_REQUEST,
            "No subscription attributes in request.",
        ));
    }

    for template in &templates {
        match create_from_template(ctx, printer.as_ref(), job.as_ref(), template).await {
            TemplateOutcome::Created(sub) => {
                response
                    .new_group(GroupTag::Subscription)
                    .add("notify-subscription-id", Value::Integer(sub.id));
            }
            TemplateOutcome::Invalid { offender, message } => {
                response.code = status::ATTRIBUTES_OR_VALUES;
                response.set_status_message(message);
                validate::respond_unsupported(&mut response, &offender);
            }
        }
    }
    Ok(response)
}

/// Subscription groups piggybacked on a job-creation request.
pub async fn create_requested(ctx: &Ctx<'_>, printer: Option<&Arc<Printer>>, job: Option<&Arc<Job>>) {
    let templates: Vec<platen_ipp::Attributes> = ctx
        .request
        .groups_tagged(GroupTag::Subscription)
        .cloned()
        .collect();
    for template in &templates {
        if let TemplateOutcome::Invalid { message, .. } =
            create_from_template(ctx, printer, job, template).await
        {
            debug!(message, "ignoring invalid piggybacked subscription");
        }
    }
}

/// Resolve the target subscription and check ownership.
async fn find_target_subscription(
    ctx: &Ctx<'_>,
) -> std::result::Result<Arc<Subscription>, Message> {
    let Some(id) = ctx
        .request
        .operation()
        .and_then(|g| g.get_integer("notify-subscription-id"))
    else {
        return Err(error_response(
            ctx.request,
            status::BAD_REQUEST,
            "Missing notify-subscription-id.",
        ));
    };
    let Some(sub) = ctx.state.find_subscription(id).await else {
        return Err(error_response(
            ctx.request,
            status::NOT_FOUND,
            "Subscription does not exist.",
        ));
    };

    let owner = sub.inner.read().await.username.clone();
    if ctx.effective_username() != owner
        && !auth::is_admin(&ctx.state.config, ctx.username.as_deref())
    {
        return Err(error_response(
            ctx.request,
            status::NOT_AUTHORIZED,
            "Not the subscription owner.",
        ));
    }
    Ok(sub)
}

/// Cancel-Subscription.
pub async fn cancel_subscription(ctx: &mut Ctx<'_>) -> Result<Message> {
    let sub = match find_target_subscription(ctx).await {
        Ok(sub) => sub,
        Err(response) => return Ok(response),
    };
    ctx.state.remove_subscription(sub.id).await;
    info!(subscription_id = sub.id, "subscription canceled");
    Ok(ok_response(ctx.request))
}

/// Renew-Subscription: extend (or trim) the lease.
pub async fn renew_subscription(ctx: &mut Ctx<'_>) -> Result<Message> {
    let sub = match find_target_subscription(ctx).await {
        Ok(sub) => sub,
        Err(response) => return Ok(response),
    };

    let lease = ctx
        .request
        .group(GroupTag::Subscription)
        .and_then(|g| g.get_integer("notify-lease-duration"))
        .or_else(|| {
            ctx.request
                .operation()
                .and_then(|g| g.get_integer("notify-lease-duration"))
        })
        .unwrap_or(DEFAULT_LEASE_SECONDS)
        .max(0);

    {
        let mut inner = sub.inner.write().await;
        if inner.job_id.is_some() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job subscriptions cannot be renewed.",
            ));
        }
        inner.lease_seconds = lease;
        inner.expire =
            (lease > 0).then(|| Utc::now() + chrono::Duration::seconds(lease as i64));
    }

    let mut response = ok_response(ctx.request);
    response
        .new_group(GroupTag::Subscription)
        .add("notify-lease-duration", Value::Integer(lease));
    Ok(response)
}

/// Copy a subscription's description attributes into a response group.
async fn copy_subscription_attributes(
    response: &mut Message,
    sub: &Subscription,
    requested: Option<&std::collections::HashSet<String>>,
) {
    let inner = sub.inner.read().await;
    let want = |name: &str| requested.is_none_or(|set| set.contains(name));

    let group = response.new_group(GroupTag::Subscription);
    if want("notify-subscription-id") {
        group.add("notify-subscription-id", Value::Integer(sub.id));
    }
    if want("notify-subscription-uuid") {
        group.add("notify-subscription-uuid", Value::Uri(sub.uuid.clone()));
    }
    if want("notify-events") {
        group.add_all(
            "notify-events",
            inner
                .events
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
    }
    if want("notify-pull-method") {
        group.add("notify-pull-method", Value::Keyword("ippget".into()));
    }
    if want("notify-lease-duration") {
        group.add("notify-lease-duration", Value::Integer(inner.lease_seconds));
    }
    if want("notify-subscriber-user-name") {
        group.add(
            "notify-subscriber-user-name",
            Value::Name(inner.username.clone()),
        );
    }
    if want("notify-time-interval") && inner.time_interval > 0 {
        group.add("notify-time-interval", Value::Integer(inner.time_interval));
    }
    if let Some(job_id) = inner.job_id {
        if want("notify-job-id") {
            group.add("notify-job-id", Value::Integer(job_id));
        }
    }
    if let Some(data) = &inner.user_data {
        if want("notify-user-data") {
            group.add("notify-user-data", Value::OctetString(data.clone()));
        }
    }
}

/// Get-Subscription-Attributes.
pub async fn get_subscription_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let sub = match find_target_subscription(ctx).await {
        Ok(sub) => sub,
        Err(response) => return Ok(response),
    };
    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    copy_subscription_attributes(&mut response, &sub, requested.as_ref()).await;
    Ok(response)
}

/// Get-Subscriptions: list subscriptions scoped to the target.
pub async fn get_subscriptions(ctx: &mut Ctx<'_>) -> Result<Message> {
    let requested = requested_attributes(ctx.request);
    let operation = ctx.request.operation();
    let my_subscriptions = operation
        .and_then(|g| g.get_boolean("my-subscriptions"))
        .unwrap_or(false);
    let limit = operation
        .and_then(|g| g.get_integer("limit"))
        .filter(|n| *n > 0)
        .map(|n| n as usize);
    let username = ctx.effective_username();
    let printer_id = ctx.printer.as_ref().map(|p| p.id);

    let subs: Vec<Arc<Subscription>> = {
        let all = ctx.state.subscriptions.read().await;
        all.iter().cloned().collect()
    };

    let mut response = ok_response(ctx.request);
    let mut emitted = 0usize;
    for sub in subs {
        {
            let inner = sub.inner.read().await;
            if let Some(printer_id) = printer_id {
                if inner.printer_id != Some(printer_id) {
                    continue;
                }
            }
            if my_subscriptions && inner.username != username {
                continue;
            }
        }
        if limit.is_some_and(|l| emitted >= l) {
            break;
        }
        copy_subscription_attributes(&mut response, &sub, requested.as_ref()).await;
        emitted += 1;
    }
    Ok(response)
}

/// Get-Notifications: pull buffered events for one or more subscriptions,
/// optionally blocking until something arrives.
pub async fn get_notifications(ctx: &mut Ctx<'_>) -> Result<Message> {
    let operation = ctx.request.operation();
    let Some(ids_attr) = operation.and_then(|g| g.find("notify-subscription-ids")) else {
        return Ok(error_response(
            ctx.request,
            status::BAD_REQUEST,
            "Missing notify-subscription-ids.",
        ));
    };
    let ids: Vec<i32> = ids_attr.values.iter().filter_map(Value::as_integer).collect();
    let sequences: Vec<i32> = operation
        .and_then(|g| g.find("notify-sequence-numbers"))
        .map(|a| a.values.iter().filter_map(Value::as_integer).collect())
        .unwrap_or_default();
    let wait = operation.and_then(|g| g.get_boolean("notify-wait")).unwrap_or(false);
    let username = ctx.effective_username();
    let is_admin = auth::is_admin(&ctx.state.config, ctx.username.as_deref());

    let mut response = ok_response(ctx.request);
    response
        .group_mut(GroupTag::Operation)
        .add("notify-get-interval", Value::Integer(30));

    // With notify-wait, keep collecting until something arrives or the
    // 30-second bound lapses.  The waiter is enabled before each collection
    // pass so a broadcast between collect and wait is not lost.
    let deadline = tokio::time::Instant::now() + NOTIFY_WAIT;
    let delivered = loop {
        let mut notified = std::pin::pin!(ctx.state.event_notify.notified());
        notified.as_mut().enable();
        let delivered =
            collect_events(ctx, &ids, &sequences, &username, is_admin, &mut response).await;
        if delivered > 0 || !wait {
            break delivered;
        }
        debug!("Get-Notifications waiting for events");
        if tokio::time::timeout_at(deadline, notified).await.is_err() {
            break 0;
        }
    };

    debug!(delivered, "Get-Notifications complete");
    Ok(response)
}

/// Append every buffered event with sequence ≥ the caller's cursor to the
/// response, one event-notification group per event.  A missing or
/// foreign subscription id fails only its own entry.
async fn collect_events(
    ctx: &Ctx<'_>,
    ids: &[i32],
    sequences: &[i32],
    username: &str,
    is_admin: bool,
    response: &mut Message,
) -> usize {
    let mut total = 0usize;
    for (index, id) in ids.iter().enumerate() {
        let since = sequences.get(index).copied().unwrap_or(1);
        let Some(sub) = ctx.state.find_subscription(*id).await else {
            continue;
        };
        let inner = sub.inner.read().await;
        if inner.username != username && !is_admin {
            continue;
        }
        for record in inner.events_since(since) {
            let group = response.new_group(GroupTag::EventNotification);
            for attr in &record.attrs {
                if !inner.notify_attributes.is_empty()
                    && attr.name.starts_with("notify-")
                    && attr.name != "notify-subscription-id"
                    && attr.name != "notify-sequence-number"
                    && attr.name != "notify-subscribed-event"
                    && !inner.notify_attributes.contains(&attr.name)
                {
                    continue;
                }
                group.push(attr.clone());
            }
            total += 1;
        }
    }
    total
}
