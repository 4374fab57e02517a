// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation handlers, one module per object family, plus the response
// helpers they share.  Every handler follows the same shape: apply the
// authorization policy, validate inputs, mutate the object store, emit
// events, assemble the response.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};

use platen_ipp::tag::GroupTag;
use platen_ipp::{status, IppDateTime, Message, Value};

use crate::dispatch::Ctx;
use crate::job::Job;
use crate::printer::Printer;

pub mod documents;
pub mod jobs;
pub mod printers;
pub mod proxy;
pub mod resources;
pub mod subscriptions;
pub mod system;

/// A successful-ok response echoing the request id.
pub fn ok_response(request: &Message) -> Message {
    Message::response(status::OK, request.request_id)
}

/// An error response with a status-message diagnostic.
pub fn error_response(request: &Message, status: u16, message: &str) -> Message {
    let mut response = Message::response(status, request.request_id);
    response.set_status_message(message);
    response
}

/// The requested-attributes filter, if one is present and not "all".
pub fn requested_attributes(request: &Message) -> Option<HashSet<String>> {
    let attr = request.operation()?.find("requested-attributes")?;
    let names: HashSet<String> = attr
        .values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if names.contains("all") {
        return None;
    }
    Some(names)
}

/// Printer URI as seen by clients.
pub fn printer_uri(ctx: &Ctx<'_>, printer: &Printer) -> String {
    format!("ipp://{}{}", ctx.host, printer.path)
}

/// Job URI under its printer.
pub fn job_uri(ctx: &Ctx<'_>, printer: &Printer, job_id: i32) -> String {
    format!("ipp://{}{}/{}", ctx.host, printer.path, job_id)
}

/// Convert a chrono timestamp to the IPP dateTime form.
pub fn ipp_date_time(when: DateTime<Utc>) -> IppDateTime {
    IppDateTime {
        year: when.year().clamp(0, u16::MAX as i32) as u16,
        month: when.month() as u8,
        day: when.day() as u8,
        hour: when.hour() as u8,
        minutes: when.minute() as u8,
        seconds: when.second() as u8,
        deciseconds: 0,
        utc_direction: b'+',
        utc_hours: 0,
        utc_minutes: 0,
    }
}

/// Resolve the job a request targets: `job-id` in the operation group, or
/// the trailing segment of a `job-uri` target.
pub async fn find_target_job(ctx: &Ctx<'_>, printer: &Arc<Printer>) -> Option<Arc<Job>> {
    let operation = ctx.request.operation()?;

    let job_id = if let Some(id) = operation.get_integer("job-id") {
        Some(id)
    } else {
        operation
            .get_string("job-uri")
            .and_then(|uri| uri.rsplit('/').next())
            .and_then(|segment| segment.parse::<i32>().ok())
    };

    let job_id = job_id?;
    printer.inner.read().await.jobs.get(&job_id).cloned()
}

/// Append the standard job status attributes to a response group.
pub async fn add_job_status_group(response: &mut Message, ctx: &Ctx<'_>, printer: &Printer, job: &Job) {
    let inner = job.inner.read().await;
    let group = response.new_group(GroupTag::Job);
    group.add("job-id", Value::Integer(job.id));
    group.add("job-uri", Value::Uri(job_uri(ctx, printer, job.id)));
    group.add("job-uuid", Value::Uri(job.uuid.clone()));
    group.add("job-state", Value::Enum(inner.state.value()));
    group.add_all(
        "job-state-reasons",
        inner
            .reasons
            .keywords()
            .into_iter()
            .map(|k| Value::Keyword(k.into()))
            .collect(),
    );
}

/// Epoch-style `time-at-*` value relative to the printer's start time.
pub fn time_at(printer: &Printer, when: DateTime<Utc>) -> i32 {
    (when - printer.start_time).num_seconds() as i32
}
