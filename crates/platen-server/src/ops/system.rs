// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// System operations: system attributes, printer lifecycle, and the
// all-printers fan-out of the per-printer state controls.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use platen_core::error::Result;
use platen_core::{JobReasons, JobState, PrinterReasons, ServiceType};
use platen_ipp::tag::GroupTag;
use platen_ipp::{status, Message, Value};

use crate::dispatch::Ctx;
use crate::events::{self, Event};
use crate::job;
use crate::ops::{error_response, ok_response, printer_uri, requested_attributes};
use crate::printer::Printer;
use crate::validate::{self, PRINTER_VALUES, SYSTEM_VALUES};

/// Get-System-Attributes.
pub async fn get_system_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);

    let system = ctx.state.system.read().await;
    let mut attrs = system.attrs.copy_filtered(requested.as_ref(), None);

    let want = |name: &str| requested.as_ref().is_none_or(|set| set.contains(name));

    // System state summarizes the printers: processing beats idle, and a
    // system with every printer stopped is stopped.
    let printers = ctx.state.printers.read().await;
    let mut any_processing = false;
    let mut all_stopped = !printers.is_empty();
    for printer in printers.iter() {
        let inner = printer.inner.read().await;
        match inner.state {
            platen_core::PrinterState::Processing => {
                any_processing = true;
                all_stopped = false;
            }
            platen_core::PrinterState::Idle => all_stopped = false,
            platen_core::PrinterState::Stopped => {}
        }
    }
    let state = if any_processing {
        4
    } else if all_stopped {
        5
    } else {
        3
    };

    if want("system-state") {
        attrs.set("system-state", vec![Value::Enum(state)]);
    }
    if want("system-state-reasons") {
        attrs.set("system-state-reasons", vec![Value::Keyword("none".into())]);
    }
    if want("system-up-time") {
        attrs.set("system-up-time", vec![Value::Integer(ctx.state.uptime())]);
    }
    if want("system-config-change-date-time") {
        attrs.set(
            "system-config-change-date-time",
            vec![Value::DateTime(crate::ops::ipp_date_time(system.config_time))],
        );
    }
    if want("system-default-printer-id") {
        attrs.set(
            "system-default-printer-id",
            vec![match system.default_printer_id {
                Some(id) => Value::Integer(id),
                None => Value::OutOfBand(platen_ipp::tag::NO_VALUE),
            }],
        );
    }
    if want("system-configured-printers") {
        let mut cols = Vec::new();
        for printer in printers.iter() {
            let inner = printer.inner.read().await;
            let mut col = platen_ipp::Attributes::new();
            col.add("printer-id", Value::Integer(printer.id));
            col.add("printer-name", Value::Name(printer.name.clone()));
            col.add("printer-state", Value::Enum(inner.state.value()));
            col.add("printer-is-accepting-jobs", Value::Boolean(inner.is_accepting));
            col.add(
                "printer-xri-supported",
                Value::Uri(printer_uri(ctx, printer)),
            );
            cols.push(Value::Collection(col));
        }
        if !cols.is_empty() {
            attrs.set("system-configured-printers", cols);
        }
    }

    let group = response.new_group(GroupTag::System);
    for attr in &attrs {
        group.push(attr.clone());
    }
    Ok(response)
}

/// Get-System-Supported-Values: the settable-attribute vocabulary.
pub async fn get_system_supported_values(ctx: &mut Ctx<'_>) -> Result<Message> {
    let mut response = ok_response(ctx.request);
    let group = response.new_group(GroupTag::System);
    group.add_all(
        "system-settable-attributes-supported",
        SYSTEM_VALUES
            .iter()
            .map(|row| Value::Keyword(row.name.into()))
            .collect(),
    );
    group.add_all(
        "printer-creation-attributes-supported",
        PRINTER_VALUES
            .iter()
            .map(|row| Value::Keyword(row.name.into()))
            .collect(),
    );
    Ok(response)
}

/// Set-System-Attributes: validate the entire request before any change,
/// then apply atomically.
pub async fn set_system_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;

    let mut response = ok_response(ctx.request);
    if !validate::validate_group(
        ctx.request,
        &mut response,
        GroupTag::System,
        SYSTEM_VALUES,
        None,
        false,
    ) {
        // Mid-validation failure performs no mutations.
        return Ok(response);
    }

    if let Some(group) = ctx.request.group(GroupTag::System) {
        let mut system = ctx.state.system.write().await;
        for attr in group {
            if attr.value_tag() == platen_ipp::tag::DELETE_ATTRIBUTE {
                system.attrs.remove(&attr.name);
            } else if attr.name == "system-default-printer-id" {
                system.default_printer_id = attr.values.first().and_then(Value::as_integer);
            } else {
                system.attrs.set(&attr.name, attr.values.clone());
            }
        }
        system.config_time = Utc::now();
    }

    events::add_event(ctx.state, None, None, Event::SYSTEM_CONFIG_CHANGED, "System attributes changed.")
        .await;
    Ok(response)
}

/// Create-Printer.
pub async fn create_printer(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let request = ctx.request;

    let Some(name) = request.operation().and_then(|g| g.get_string("printer-name")) else {
        return Ok(error_response(request, status::BAD_REQUEST, "Missing printer-name."));
    };
    if name.is_empty() || name.contains('/') || name.contains('#') || name.len() > 127 {
        return Ok(error_response(
            request,
            status::ATTRIBUTES_OR_VALUES,
            "Bad printer-name value.",
        ));
    }
    let service = match request
        .operation()
        .and_then(|g| g.get_string("printer-service-type"))
        .unwrap_or("print")
    {
        "print" => ServiceType::Print,
        "print3d" => ServiceType::Print3d,
        "faxout" => ServiceType::Faxout,
        other => {
            return Ok(error_response(
                request,
                status::ATTRIBUTES_OR_VALUES,
                &format!("Unsupported printer-service-type \"{other}\"."),
            ));
        }
    };

    let name = name.to_string();
    let path = format!("{}/{}", service.prefix(), name);
    if ctx.state.find_printer(&path).await.is_some() {
        return Ok(error_response(
            request,
            status::NOT_POSSIBLE,
            &format!("Printer \"{name}\" already exists."),
        ));
    }

    let mut response = ok_response(request);
    if !validate::validate_group(
        request,
        &mut response,
        GroupTag::Printer,
        PRINTER_VALUES,
        None,
        true,
    ) {
        return Ok(response);
    }

    let printer = Arc::new(Printer::new(
        ctx.state.next_printer_id(),
        &name,
        service,
        &ctx.state.config,
    ));

    {
        let mut inner = printer.inner.write().await;

        if let Some(group) = request.group(GroupTag::Printer) {
            for attr in group {
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
        }

        // Apply any template-printer resources named by the request.
        if let Some(ids) = request.operation().and_then(|g| g.find("resource-ids")) {
            let supported = inner.attrs.find("printer-creation-attributes-supported").cloned();
            for id in ids.values.iter().filter_map(Value::as_integer) {
                let Some(resource) = ctx.state.find_resource(id).await else { continue };
                let is_template = {
                    let r = resource.inner.read().await;
                    r.rtype == "template-printer"
                        && r.state == platen_core::ResourceState::Installed
                };
                if !is_template {
                    continue;
                }
                if let Err(err) = crate::ops::resources::apply_template(
                    &resource,
                    &mut inner.attrs,
                    supported.as_ref(),
                    PRINTER_VALUES,
                )
                .await
                {
                    error!(resource_id = id, error = %err, "unable to apply printer template");
                }
            }
        }
    }

    ctx.state.add_printer(Arc::clone(&printer)).await;
    events::add_event(ctx.state, Some(&printer), None, Event::PRINTER_CREATED, "Printer created.")
        .await;

    let group = response.new_group(GroupTag::Printer);
    group.add("printer-id", Value::Integer(printer.id));
    group.add("printer-uuid", Value::Uri(printer.uuid.clone()));
    group.add("printer-uri-supported", Value::Uri(printer_uri(ctx, &printer)));
    group.add("printer-is-accepting-jobs", Value::Boolean(true));
    group.add(
        "printer-state",
        Value::Enum(platen_core::PrinterState::Idle.value()),
    );
    group.add("printer-state-reasons", Value::Keyword("none".into()));
    Ok(response)
}

/// Delete-Printer: abort its jobs, detach its subscriptions, and remove
/// it from the registry.
pub async fn delete_printer(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let printer = ctx.target_printer()?;

    // Stop the processing job first; the reaper finalizes it.
    let (processing, others) = {
        let mut inner = printer.inner.write().await;
        inner.is_deleted = true;
        inner.is_accepting = false;
        inner.reasons |= PrinterReasons::DELETED;

        let processing = inner.processing_job.and_then(|id| inner.jobs.get(&id).cloned());
        let others: Vec<_> = inner
            .active_jobs
            .iter()
            .filter(|j| Some(j.id) != processing.as_ref().map(|p| p.id))
            .cloned()
            .collect();
        (processing, others)
    };

    if let Some(job) = &processing {
        {
            let mut job_inner = job.inner.write().await;
            job_inner.cancel_requested = true;
        }
        job::stop_job(ctx.state, &printer, job).await;
    }
    for job in others {
        job::finish_job(
            ctx.state,
            &printer,
            &job,
            JobState::Aborted,
            JobReasons::ABORTED_BY_SYSTEM,
        )
        .await;
    }

    // Clear subscription back-references and truncate their leases.
    {
        let subs = ctx.state.subscriptions.read().await;
        for sub in subs.iter() {
            let mut inner = sub.inner.write().await;
            if inner.printer_id == Some(printer.id) {
                inner.truncate_lease();
            }
        }
    }

    // Release allocated resources.
    {
        let resource_ids = printer.inner.read().await.resources.clone();
        for id in resource_ids {
            if let Some(resource) = ctx.state.find_resource(id).await {
                resource.inner.write().await.release();
            }
        }
    }

    events::add_event(ctx.state, Some(&printer), None, Event::PRINTER_DELETED, "Printer deleted.")
        .await;
    ctx.state.remove_printer(printer.id).await;
    info!(printer = %printer.name, "printer deleted");
    Ok(ok_response(ctx.request))
}

/// Get-Printers: one printer group per configured printer.
pub async fn get_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    let operation = ctx.request.operation();
    let service_filter = operation.and_then(|g| g.get_string("printer-service-type"));
    let limit = operation
        .and_then(|g| g.get_integer("limit"))
        .filter(|n| *n > 0)
        .map(|n| n as usize);

    let printers: Vec<Arc<Printer>> = {
        let all = ctx.state.printers.read().await;
        all.iter().cloned().collect()
    };

    let mut response = ok_response(ctx.request);
    let mut emitted = 0usize;
    for printer in printers {
        let matches_service = match service_filter {
            Some("print") => printer.service == ServiceType::Print,
            Some("print3d") => printer.service == ServiceType::Print3d,
            Some("faxout") => printer.service == ServiceType::Faxout,
            _ => true,
        };
        if !matches_service {
            continue;
        }
        if limit.is_some_and(|l| emitted >= l) {
            break;
        }

        let inner = printer.inner.read().await;
        let group = response.new_group(GroupTag::Printer);
        group.add("printer-id", Value::Integer(printer.id));
        group.add("printer-name", Value::Name(printer.name.clone()));
        group.add("printer-uuid", Value::Uri(printer.uuid.clone()));
        group.add("printer-uri-supported", Value::Uri(printer_uri(ctx, &printer)));
        group.add("printer-state", Value::Enum(inner.state.value()));
        group.add_all(
            "printer-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
        group.add("printer-is-accepting-jobs", Value::Boolean(inner.is_accepting));
        emitted += 1;
    }
    Ok(response)
}

/// Restart-System: restart every printer and reannounce.
pub async fn restart_system(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;

    let printers: Vec<Arc<Printer>> = {
        let all = ctx.state.printers.read().await;
        all.iter().cloned().collect()
    };
    for printer in &printers {
        let mut inner = printer.inner.write().await;
        inner.is_shutdown = false;
        if inner.state == platen_core::PrinterState::Stopped {
            inner.state = platen_core::PrinterState::Idle;
        }
        inner.reasons -= PrinterReasons::PAUSED | PrinterReasons::MOVING_TO_PAUSED;
        inner.state_time = Utc::now();
    }
    {
        let mut system = ctx.state.system.write().await;
        system.state_time = Utc::now();
    }

    events::add_event(ctx.state, None, None, Event::SYSTEM_STATE_CHANGED, "System restarted.").await;
    for printer in &printers {
        job::check_jobs(ctx.state, printer).await;
    }
    info!("system restarted");
    Ok(ok_response(ctx.request))
}

/// Fan an admin state operation out to every printer.
async fn for_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let printers: Vec<Arc<Printer>> = {
        let all = ctx.state.printers.read().await;
        all.iter().cloned().collect()
    };
    for printer in &printers {
        crate::ops::printers::set_printer_state(ctx, printer, ctx.request.code).await?;
    }
    Ok(ok_response(ctx.request))
}

pub async fn disable_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}

pub async fn enable_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}

pub async fn pause_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}

pub async fn resume_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}

pub async fn shutdown_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}

pub async fn startup_all_printers(ctx: &mut Ctx<'_>) -> Result<Message> {
    for_all_printers(ctx).await
}
