// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer operations: attribute access, state control, and job-hold
// administration.

use std::sync::Arc;

use tracing::info;

use platen_core::error::Result;
use platen_core::{PrinterReasons, PrinterState};
use platen_ipp::tag::{self, GroupTag};
use platen_ipp::{Message, Value};

use crate::dispatch::Ctx;
use crate::events::{self, Event};
use crate::job;
use crate::ops::{ipp_date_time, ok_response, printer_uri, requested_attributes, time_at};
use crate::printer::Printer;
use crate::validate::{self, PRINTER_VALUES};

/// Get-Printer-Attributes: description, capabilities, and live status.
pub async fn get_printer_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let requested = requested_attributes(ctx.request);

    let mut response = ok_response(ctx.request);
    let uri = printer_uri(ctx, &printer);
    let uptime = ctx.state.uptime();

    let inner = printer.inner.read().await;

    // Device-supplied capabilities shadow the static snapshot.
    let mut attrs = inner.dev_attrs.copy_filtered(requested.as_ref(), None);
    for attr in inner.attrs.copy_filtered(requested.as_ref(), None).iter() {
        if attrs.find(&attr.name).is_none() {
            attrs.push(attr.clone());
        }
    }

    let want = |name: &str| requested.as_ref().is_none_or(|set| set.contains(name));

    if want("printer-id") {
        attrs.set("printer-id", vec![Value::Integer(printer.id)]);
    }
    if want("printer-uri-supported") {
        attrs.set("printer-uri-supported", vec![Value::Uri(uri.clone())]);
    }
    if want("printer-uuid") {
        attrs.set("printer-uuid", vec![Value::Uri(printer.uuid.clone())]);
    }
    if want("printer-state") {
        attrs.set("printer-state", vec![Value::Enum(inner.state.value())]);
    }
    if want("printer-state-reasons") {
        attrs.set(
            "printer-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
    }
    if want("printer-state-message") {
        attrs.set(
            "printer-state-message",
            vec![Value::Text(format!("Printer is {}.", inner.state.keyword()))],
        );
    }
    if want("printer-is-accepting-jobs") {
        attrs.set("printer-is-accepting-jobs", vec![Value::Boolean(inner.is_accepting)]);
    }
    if want("queued-job-count") {
        attrs.set(
            "queued-job-count",
            vec![Value::Integer(inner.queued_job_count() as i32)],
        );
    }
    if want("printer-up-time") {
        attrs.set("printer-up-time", vec![Value::Integer(uptime)]);
    }
    if want("printer-state-change-time") {
        attrs.set(
            "printer-state-change-time",
            vec![Value::Integer(time_at(&printer, inner.state_time))],
        );
    }
    if want("printer-state-change-date-time") {
        attrs.set(
            "printer-state-change-date-time",
            vec![Value::DateTime(ipp_date_time(inner.state_time))],
        );
    }
    if want("printer-config-change-time") {
        attrs.set(
            "printer-config-change-time",
            vec![Value::Integer(time_at(&printer, inner.config_time))],
        );
    }
    if want("printer-config-change-date-time") {
        attrs.set(
            "printer-config-change-date-time",
            vec![Value::DateTime(ipp_date_time(inner.config_time))],
        );
    }
    if want("printer-current-time") {
        attrs.set(
            "printer-current-time",
            vec![Value::DateTime(ipp_date_time(chrono::Utc::now()))],
        );
    }

    let group = response.new_group(GroupTag::Printer);
    for attr in &attrs {
        group.push(attr.clone());
    }
    Ok(response)
}

/// Get-Printer-Supported-Values: the `*-supported` capability subset.
pub async fn get_printer_supported_values(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let requested = requested_attributes(ctx.request);

    let mut response = ok_response(ctx.request);
    let inner = printer.inner.read().await;
    let group = response.new_group(GroupTag::Printer);
    for attr in &inner.attrs {
        if !attr.name.ends_with("-supported") {
            continue;
        }
        if requested.as_ref().is_some_and(|set| !set.contains(&attr.name)) {
            continue;
        }
        group.push(attr.clone());
    }
    Ok(response)
}

/// Set-Printer-Attributes: validate against the printer schema table,
/// then apply, routing the device/auth rows to their dedicated fields.
pub async fn set_printer_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    ctx.require_admin()?;

    let mut response = ok_response(ctx.request);
    if !validate::validate_group(
        ctx.request,
        &mut response,
        GroupTag::Printer,
        PRINTER_VALUES,
        None,
        false,
    ) {
        return Ok(response);
    }

    if let Some(group) = ctx.request.group(GroupTag::Printer) {
        let mut inner = printer.inner.write().await;
        for attr in group {
            if attr.value_tag() == tag::DELETE_ATTRIBUTE {
                inner.attrs.remove(&attr.name);
                continue;
            }
            let first = attr.values.first().and_then(Value::as_str).map(str::to_string);
            match attr.name.as_str() {
                "smi2699-device-command" => inner.command = first,
                "smi2699-device-uri" => inner.device_uri = first,
                "smi2699-device-format" => inner.device_format = first,
                "smi2699-auth-print-group" => inner.print_group = first,
                "smi2699-auth-proxy-group" => inner.proxy_group = first,
                "smi2699-max-output-device" => {
                    if let Some(n) = attr.values.first().and_then(Value::as_integer) {
                        inner.max_devices = n.max(0) as usize;
                    }
                }
                _ => inner.attrs.set(&attr.name, attr.values.clone()),
            }
        }
        inner.config_time = chrono::Utc::now();
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        None,
        Event::PRINTER_CONFIG_CHANGED,
        "Printer attributes changed.",
    )
    .await;
    Ok(response)
}

// ---------------------------------------------------------------------------
// State control
// ---------------------------------------------------------------------------

/// Apply a printer-state mutation and emit the right event.  The shared
/// body of pause/resume/disable/enable/shutdown/startup/restart.
pub async fn set_printer_state(
    ctx: &Ctx<'_>,
    printer: &Arc<Printer>,
    operation: u16,
) -> Result<()> {
    let event;
    let message;
    {
        let mut inner = printer.inner.write().await;
        match operation {
            platen_ipp::op::PAUSE_PRINTER | platen_ipp::op::PAUSE_ALL_PRINTERS => {
                inner.state = PrinterState::Stopped;
                inner.reasons -= PrinterReasons::MOVING_TO_PAUSED;
                inner.reasons |= PrinterReasons::PAUSED;
                event = Event::PRINTER_STOPPED;
                message = "Printer paused.";
            }
            platen_ipp::op::PAUSE_PRINTER_AFTER_CURRENT_JOB
            | platen_ipp::op::PAUSE_ALL_PRINTERS_AFTER_CURRENT_JOB => {
                if inner.processing_job.is_some() {
                    inner.reasons |= PrinterReasons::MOVING_TO_PAUSED;
                } else {
                    inner.state = PrinterState::Stopped;
                    inner.reasons |= PrinterReasons::PAUSED;
                }
                event = Event::PRINTER_STATE_CHANGED;
                message = "Printer pausing.";
            }
            platen_ipp::op::RESUME_PRINTER | platen_ipp::op::RESUME_ALL_PRINTERS => {
                if inner.state == PrinterState::Stopped {
                    inner.state = if inner.processing_job.is_some() {
                        PrinterState::Processing
                    } else {
                        PrinterState::Idle
                    };
                }
                inner.reasons -= PrinterReasons::PAUSED | PrinterReasons::MOVING_TO_PAUSED;
                event = Event::PRINTER_STATE_CHANGED;
                message = "Printer resumed.";
            }
            platen_ipp::op::DISABLE_PRINTER | platen_ipp::op::DISABLE_ALL_PRINTERS => {
                inner.is_accepting = false;
                event = Event::PRINTER_STATE_CHANGED;
                message = "Printer disabled.";
            }
            platen_ipp::op::ENABLE_PRINTER | platen_ipp::op::ENABLE_ALL_PRINTERS => {
                inner.is_accepting = true;
                event = Event::PRINTER_STATE_CHANGED;
                message = "Printer enabled.";
            }
            platen_ipp::op::SHUTDOWN_PRINTER
            | platen_ipp::op::SHUTDOWN_ONE_PRINTER
            | platen_ipp::op::SHUTDOWN_ALL_PRINTERS => {
                inner.is_shutdown = true;
                event = Event::PRINTER_SHUTDOWN;
                message = "Printer shutdown.";
            }
            platen_ipp::op::STARTUP_PRINTER
            | platen_ipp::op::STARTUP_ONE_PRINTER
            | platen_ipp::op::STARTUP_ALL_PRINTERS => {
                inner.is_shutdown = false;
                event = Event::PRINTER_RESTARTED;
                message = "Printer started.";
            }
            platen_ipp::op::RESTART_PRINTER => {
                inner.is_shutdown = false;
                inner.state = PrinterState::Idle;
                inner.reasons -= PrinterReasons::PAUSED | PrinterReasons::MOVING_TO_PAUSED;
                event = Event::PRINTER_RESTARTED;
                message = "Printer restarted.";
            }
            _ => {
                return Err(platen_core::PlatenError::InvariantViolated(
                    "set_printer_state called with a non-state operation".into(),
                ))
            }
        }
        inner.state_time = chrono::Utc::now();
    }

    info!(printer = %printer.name, message, "printer state operation");
    events::add_event(ctx.state, Some(printer), None, event, message).await;

    // Resume/startup/restart may unblock the queue.
    job::check_jobs(ctx.state, printer).await;
    Ok(())
}

macro_rules! state_op {
    ($name:ident) => {
        pub async fn $name(ctx: &mut Ctx<'_>) -> Result<Message> {
            let printer = ctx.target_printer()?;
            ctx.require_admin()?;
            set_printer_state(ctx, &printer, ctx.request.code).await?;
            Ok(ok_response(ctx.request))
        }
    };
}

state_op!(pause_printer);
state_op!(resume_printer);
state_op!(disable_printer);
state_op!(enable_printer);
state_op!(shutdown_printer);
state_op!(startup_printer);
state_op!(restart_printer);

// ---------------------------------------------------------------------------
// Job-hold administration
// ---------------------------------------------------------------------------

/// Hold-New-Jobs: newly created jobs are held until released.
pub async fn hold_new_jobs(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    ctx.require_admin()?;

    {
        let mut inner = printer.inner.write().await;
        inner.hold_new_jobs = true;
        inner.reasons |= PrinterReasons::HOLD_NEW_JOBS;
    }
    events::add_event(
        ctx.state,
        Some(&printer),
        None,
        Event::PRINTER_STATE_CHANGED,
        "Holding new jobs.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Release-Held-New-Jobs: stop holding, and release the jobs held by the
/// printer (jobs held by explicit client request stay held).
pub async fn release_held_new_jobs(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    ctx.require_admin()?;

    let released = {
        let mut inner = printer.inner.write().await;
        inner.hold_new_jobs = false;
        inner.reasons -= PrinterReasons::HOLD_NEW_JOBS;

        let mut released = Vec::new();
        for held in inner.active_jobs.clone() {
            let mut job_inner = held.inner.write().await;
            if job_inner.state == platen_core::JobState::PendingHeld && job_inner.held_by_printer {
                super::jobs::release_hold(&mut job_inner);
                released.push(Arc::clone(&held));
            }
        }
        released
    };

    for released_job in &released {
        events::add_event(
            ctx.state,
            Some(&printer),
            Some(released_job),
            Event::JOB_STATE_CHANGED,
            "Job released.",
        )
        .await;
    }
    job::check_jobs(ctx.state, &printer).await;
    Ok(ok_response(ctx.request))
}

/// Identify-Printer: flag the printer for attention; a proxy picks the
/// request up via Acknowledge-Identify-Printer.
pub async fn identify_printer(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;

    let actions: Vec<String> = ctx
        .request
        .operation()
        .and_then(|g| g.find("identify-actions"))
        .map(|a| {
            a.values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| vec!["display".into()]);
    let message = ctx
        .request
        .operation()
        .and_then(|g| g.get_string("message"))
        .map(str::to_string);

    {
        let mut inner = printer.inner.write().await;
        inner.identify_actions = actions;
        inner.identify_message = message;
        inner.reasons |= PrinterReasons::IDENTIFY_PRINTER_REQUESTED;
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        None,
        Event::PRINTER_STATE_CHANGED,
        "Identify-Printer requested.",
    )
    .await;
    Ok(ok_response(ctx.request))
}
