// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output-device proxy protocol: Register/Deregister, capability updates
// (full and sparse), job-state reconciliation, and the Fetch/Acknowledge
// pull model.

use std::sync::Arc;

use tracing::{info, warn};

use platen_core::error::Result;
use platen_core::{JobReasons, JobState, PrinterReasons, ServiceType};
use platen_ipp::tag::GroupTag;
use platen_ipp::{status, Attribute, Attributes, Message, Value};

use crate::auth::{self, Policy};
use crate::device::OutputDevice;
use crate::dispatch::Ctx;
use crate::events::{self, Event};
use crate::job::{self, Job};
use crate::ops::{
    error_response, find_target_job, ok_response, printer_uri, requested_attributes,
};
use crate::printer::Printer;
use crate::transform::{self, TransformMode};

/// Proxy operations require membership in the proxy group (the printer's
/// override, or the global one).
async fn require_proxy(ctx: &Ctx<'_>, printer: Option<&Printer>) -> Result<()> {
    let group = match printer {
        Some(printer) => printer.inner.read().await.proxy_group.clone(),
        None => None,
    };
    let group = group.or_else(|| ctx.state.config.proxy_group.clone());
    match group {
        Some(group) => auth::authorize(
            &ctx.state.config,
            ctx.username.as_deref(),
            Policy::Group(&group),
        ),
        // No proxy group configured: any authenticated user may proxy.
        None => auth::authorize(&ctx.state.config, ctx.username.as_deref(), Policy::Authenticated),
    }
}

/// The `output-device-uuid` operation attribute.
fn device_uuid(ctx: &Ctx<'_>) -> Option<String> {
    ctx.request
        .operation()
        .and_then(|g| g.get_string("output-device-uuid"))
        .map(str::to_string)
}

/// Register-Output-Device: reuse the printer already carrying the device,
/// else attach to a proxy-group printer with capacity, else create a new
/// printer named from the UUID tail.
pub async fn register_output_device(ctx: &mut Ctx<'_>) -> Result<Message> {
    require_proxy(ctx, None).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };

    let printers: Vec<Arc<Printer>> = {
        let all = ctx.state.printers.read().await;
        all.iter().cloned().collect()
    };

    // Reuse a printer that already knows this device.
    let mut target = None;
    for printer in &printers {
        if printer.inner.read().await.find_device(&uuid).is_some() {
            target = Some(Arc::clone(printer));
            break;
        }
    }

    // Otherwise any printer with device capacity.
    if target.is_none() {
        for printer in &printers {
            let inner = printer.inner.read().await;
            if inner.devices.len() < inner.max_devices && !inner.is_deleted {
                drop(inner);
                let mut inner = printer.inner.write().await;
                inner.devices.push(Arc::new(OutputDevice::new(&uuid)));
                target = Some(Arc::clone(printer));
                break;
            }
        }
    }

    // Otherwise create a fresh printer at /ipp/print/<uuid-tail>.
    let printer = match target {
        Some(printer) => printer,
        None => {
            let tail: String = uuid
                .chars()
                .rev()
                .take_while(|c| *c != '-' && *c != ':')
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            if tail.is_empty() {
                // The registration path cannot be built from this UUID;
                // report it rather than registering silently wrong.
                warn!(uuid = %uuid, "unusable output-device-uuid");
                return Ok(error_response(
                    ctx.request,
                    status::INTERNAL_ERROR,
                    "Unable to build a printer path for the output device.",
                ));
            }
            let printer = Arc::new(Printer::new(
                ctx.state.next_printer_id(),
                &tail,
                ServiceType::Print,
                &ctx.state.config,
            ));
            printer
                .inner
                .write()
                .await
                .devices
                .push(Arc::new(OutputDevice::new(&uuid)));
            ctx.state.add_printer(Arc::clone(&printer)).await;
            events::add_event(
                ctx.state,
                Some(&printer),
                None,
                Event::PRINTER_CREATED,
                "Printer created for output device.",
            )
            .await;
            printer
        }
    };

    info!(printer = %printer.name, device = %uuid, "output device registered");

    let mut response = ok_response(ctx.request);
    let group = response.new_group(GroupTag::Printer);
    group.add("printer-id", Value::Integer(printer.id));
    group.add("printer-uuid", Value::Uri(printer.uuid.clone()));
    group.add("printer-uri-supported", Value::Uri(printer_uri(ctx, &printer)));
    Ok(response)
}

/// Deregister-Output-Device.
pub async fn deregister_output_device(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };

    let orphaned: Vec<Arc<Job>> = {
        let mut inner = printer.inner.write().await;
        let before = inner.devices.len();
        inner.devices.retain(|d| d.uuid != uuid);
        if inner.devices.len() == before {
            return Ok(error_response(
                ctx.request,
                status::NOT_FOUND,
                "Output device is not registered here.",
            ));
        }
        if inner.devices.is_empty() {
            inner.dev_attrs = Attributes::new();
        }

        // Jobs assigned to (or fetchable by) the departed device abort.
        let mut orphaned = Vec::new();
        for job in inner.active_jobs.clone() {
            let job_inner = job.inner.read().await;
            let assigned = job_inner.dev_uuid.as_deref() == Some(uuid.as_str());
            let fetchable = job_inner.reasons.contains(JobReasons::JOB_FETCHABLE);
            if assigned || (fetchable && inner.devices.is_empty()) {
                orphaned.push(Arc::clone(&job));
            }
        }
        orphaned
    };

    for job in orphaned {
        job::finish_job(
            ctx.state,
            &printer,
            &job,
            JobState::Aborted,
            JobReasons::JOB_CANCELED_AT_DEVICE | JobReasons::ABORTED_BY_SYSTEM,
        )
        .await;
    }

    info!(printer = %printer.name, device = %uuid, "output device deregistered");
    events::add_event(
        ctx.state,
        Some(&printer),
        None,
        Event::PRINTER_CONFIG_CHANGED,
        "Output device deregistered.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Parse a sparse attribute name: `name.N` or `name.N-M` (1-indexed).
fn sparse_indices(name: &str) -> Option<(&str, usize, usize)> {
    let (base, suffix) = name.rsplit_once('.')?;
    if base.is_empty() {
        return None;
    }
    if let Some((low, high)) = suffix.split_once('-') {
        let low: usize = low.parse().ok()?;
        let high: usize = high.parse().ok()?;
        (low >= 1 && high >= low).then_some((base, low, high))
    } else {
        let index: usize = suffix.parse().ok()?;
        (index >= 1).then_some((base, index, index))
    }
}

/// Merge one update into a device capability set, supporting the sparse
/// indexed form alongside whole-attribute replacement.
fn merge_device_attribute(target: &mut Attributes, attr: &Attribute) {
    if let Some((base, low, high)) = sparse_indices(&attr.name) {
        if let Some(existing) = target.iter_mut().find(|a| a.name == base) {
            // Grow the value list as needed, then splice the new values in.
            let filler = existing
                .values
                .last()
                .cloned()
                .unwrap_or(Value::OutOfBand(platen_ipp::tag::NO_VALUE));
            while existing.values.len() < high {
                existing.values.push(filler.clone());
            }
            for (offset, value) in attr.values.iter().enumerate() {
                let index = low - 1 + offset;
                if index < high {
                    existing.values[index] = value.clone();
                }
            }
            return;
        }
        // No existing attribute: a sparse update becomes a plain set.
        target.set(base, attr.values.clone());
        return;
    }
    target.set(&attr.name, attr.values.clone());
}

/// Update-Output-Device-Attributes.
pub async fn update_output_device_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };

    let Some(group) = ctx.request.group(GroupTag::Printer) else {
        return Ok(error_response(
            ctx.request,
            status::BAD_REQUEST,
            "No printer attributes in request.",
        ));
    };

    {
        let mut inner = printer.inner.write().await;
        let Some(device) = inner.find_device(&uuid) else {
            return Ok(error_response(
                ctx.request,
                status::NOT_FOUND,
                "Output device is not registered here.",
            ));
        };
        {
            let mut dev_attrs = device.attrs.write().await;
            for attr in group {
                merge_device_attribute(&mut dev_attrs, attr);
            }
        }
        // The printer's merged view mirrors the device set directly when a
        // single device is registered, and unions otherwise (first device
        // wins on conflicts).
        let mut merged = Attributes::new();
        for device in &inner.devices {
            let dev_attrs = device.attrs.read().await;
            for attr in dev_attrs.iter() {
                if merged.find(&attr.name).is_none() {
                    merged.push(attr.clone());
                }
            }
        }
        inner.dev_attrs = merged;
        inner.config_time = chrono::Utc::now();
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        None,
        Event::PRINTER_CONFIG_CHANGED,
        "Output device attributes updated.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Update-Active-Jobs: reconcile the device's job list with ours.  Jobs
/// the device did not mention, and jobs whose server state is already
/// terminal, are reported back in parallel `job-ids` /
/// `output-device-job-states` lists.
pub async fn update_active_jobs(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };

    let operation = ctx.request.operation();
    let reported_ids: Vec<i32> = operation
        .and_then(|g| g.find("job-ids"))
        .map(|a| a.values.iter().filter_map(Value::as_integer).collect())
        .unwrap_or_default();
    let reported_states: Vec<i32> = operation
        .and_then(|g| g.find("output-device-job-states"))
        .map(|a| a.values.iter().filter_map(Value::as_integer).collect())
        .unwrap_or_default();

    let mut mismatched: Vec<(i32, JobState)> = Vec::new();
    {
        let inner = printer.inner.read().await;
        for job in &inner.active_jobs {
            let job_inner = job.inner.read().await;
            if job_inner.dev_uuid.as_deref() != Some(uuid.as_str()) {
                continue;
            }
            match reported_ids.iter().position(|id| *id == job.id) {
                None => mismatched.push((job.id, job_inner.state)),
                Some(_) => {}
            }
        }
        // States the device reports for jobs we already finished.
        for (index, id) in reported_ids.iter().enumerate() {
            if let Some(job) = inner.jobs.get(id) {
                let job_inner = job.inner.read().await;
                let reported =
                    reported_states.get(index).copied().and_then(JobState::from_value);
                if job_inner.state.is_terminal() && reported != Some(job_inner.state) {
                    mismatched.push((job.id, job_inner.state));
                }
            } else {
                mismatched.push((*id, JobState::Aborted));
            }
        }
    }

    // Record the device's view on the jobs it reported.
    {
        let inner = printer.inner.read().await;
        for (index, id) in reported_ids.iter().enumerate() {
            if let Some(job) = inner.jobs.get(id) {
                let mut job_inner = job.inner.write().await;
                if !job_inner.state.is_terminal() {
                    job_inner.dev_state =
                        reported_states.get(index).copied().and_then(JobState::from_value);
                }
            }
        }
    }

    let mut response = ok_response(ctx.request);
    if !mismatched.is_empty() {
        let operation = response.group_mut(GroupTag::Operation);
        operation.add_all(
            "job-ids",
            mismatched.iter().map(|(id, _)| Value::Integer(*id)).collect(),
        );
        operation.add_all(
            "output-device-job-states",
            mismatched
                .iter()
                .map(|(_, state)| Value::Enum(state.value()))
                .collect(),
        );
    }
    Ok(response)
}

/// Update-Job-Status: record the device-side job state; a terminal device
/// state finishes the job here too.
pub async fn update_job_status(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    let job_group = ctx.request.group(GroupTag::Job);
    let dev_state = job_group
        .and_then(|g| g.get_integer("output-device-job-state"))
        .and_then(JobState::from_value);

    {
        let mut inner = job.inner.write().await;
        if let Some(state) = dev_state {
            inner.dev_state = Some(state);
        }
        if let Some(message) = job_group.and_then(|g| g.get_string("output-device-job-state-message"))
        {
            inner.dev_message = Some(message.to_string());
        }
        if let Some(reasons) = job_group.and_then(|g| g.find("output-device-job-state-reasons")) {
            let mut bits = JobReasons::empty();
            for keyword in reasons.values.iter().filter_map(Value::as_str) {
                if let Some(bit) = JobReasons::from_keyword(keyword) {
                    bits |= bit;
                }
            }
            inner.dev_reasons = bits;
        }
        if let Some(completed) = job_group.and_then(|g| g.get_integer("job-impressions-completed"))
        {
            if completed >= inner.impressions_completed {
                inner.impressions_completed = completed;
            }
        }
    }

    if let Some(state) = dev_state.filter(JobState::is_terminal) {
        let already_terminal = job.inner.read().await.state.is_terminal();
        if !already_terminal {
            let reasons = match state {
                JobState::Canceled => JobReasons::JOB_CANCELED_AT_DEVICE,
                JobState::Aborted => JobReasons::ABORTED_BY_SYSTEM,
                _ => JobReasons::JOB_COMPLETED_SUCCESSFULLY,
            };
            job::finish_job(ctx.state, &printer, &job, state, reasons).await;
        }
    } else {
        events::add_event(
            ctx.state,
            Some(&printer),
            Some(&job),
            Event::JOB_PROGRESS,
            "Job status updated.",
        )
        .await;
    }

    Ok(ok_response(ctx.request))
}

/// Update-Document-Status: impressions progress for the single document.
pub async fn update_document_status(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    let doc_group = ctx.request.group(GroupTag::Document);
    {
        let mut inner = job.inner.write().await;
        if let Some(completed) = doc_group.and_then(|g| g.get_integer("impressions-completed")) {
            if completed >= inner.impressions_completed {
                inner.impressions_completed = completed;
            }
        }
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        Some(&job),
        Event::JOB_PROGRESS,
        "Document status updated.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Fetch-Job: hand the job's attributes to the proxy.
pub async fn fetch_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !job.inner.read().await.reasons.contains(JobReasons::JOB_FETCHABLE) {
        return Ok(error_response(ctx.request, status::NOT_POSSIBLE, "Job is not fetchable."));
    }

    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    super::jobs::copy_job_attributes(&mut response, ctx, &printer, &job, requested.as_ref()).await;
    Ok(response)
}

/// Fetch-Document: stream the document, optionally through the transform
/// for format conversion.
pub async fn fetch_document(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    let (fetchable, format, filename) = {
        let inner = job.inner.read().await;
        (
            inner.reasons.contains(JobReasons::JOB_FETCHABLE),
            inner.format.clone(),
            inner.filename.clone(),
        )
    };
    if !fetchable {
        return Ok(error_response(ctx.request, status::NOT_POSSIBLE, "Job is not fetchable."));
    }
    let Some(filename) = filename else {
        return Ok(error_response(ctx.request, status::NOT_POSSIBLE, "Job has no document."));
    };

    let accepted: Vec<String> = ctx
        .request
        .operation()
        .and_then(|g| g.find("document-format-accepted"))
        .map(|a| {
            a.values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let needs_transform =
        !accepted.is_empty() && !accepted.iter().any(|f| *f == format || f == "*/*");

    let command = printer.inner.read().await.command.clone();
    let (data, sent_format) = if needs_transform {
        let Some(command) = command else {
            return Ok(error_response(
                ctx.request,
                status::DOCUMENT_FORMAT_NOT_SUPPORTED,
                "Document format conversion is not available.",
            ));
        };
        match transform::run_transform(ctx.state, &printer, &job, &command, TransformMode::ToClient)
            .await
        {
            Ok(outcome) if outcome.success => {
                let format = accepted.first().cloned().unwrap_or(format);
                (outcome.client_bytes, format)
            }
            Ok(_) | Err(_) => {
                return Ok(error_response(
                    ctx.request,
                    status::INTERNAL_ERROR,
                    "Document conversion failed.",
                ));
            }
        }
    } else {
        match tokio::fs::read(&filename).await {
            Ok(data) => (data, format),
            Err(err) => {
                warn!(job_id = job.id, error = %err, "unable to read spool file");
                return Ok(error_response(
                    ctx.request,
                    status::INTERNAL_ERROR,
                    "Unable to read the spool file.",
                ));
            }
        }
    };

    let mut response = ok_response(ctx.request);
    response
        .group_mut(GroupTag::Operation)
        .add("document-format", Value::MimeType(sent_format));
    response.data = data;
    Ok(response)
}

/// Acknowledge-Job: the proxy takes ownership; the fetchable flag clears
/// and the job enters processing against the device.
pub async fn acknowledge_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    {
        let mut printer_inner = printer.inner.write().await;
        let mut inner = job.inner.write().await;
        if !inner.reasons.contains(JobReasons::JOB_FETCHABLE) {
            return Ok(error_response(ctx.request, status::NOT_POSSIBLE, "Job is not fetchable."));
        }
        inner.reasons -= JobReasons::JOB_FETCHABLE;
        inner.reasons |= JobReasons::QUEUED_IN_DEVICE;
        inner.dev_uuid = Some(uuid.clone());
        inner.state = JobState::Processing;
        inner.processing = Some(chrono::Utc::now());
        printer_inner.processing_job = Some(job.id);
        printer_inner.state = platen_core::PrinterState::Processing;
        printer_inner.state_time = chrono::Utc::now();
    }

    info!(job_id = job.id, device = %uuid, "job acknowledged by output device");
    events::add_event(
        ctx.state,
        Some(&printer),
        Some(&job),
        Event::JOB_STATE_CHANGED,
        "Job acknowledged.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Acknowledge-Document: receipt confirmation for the single document.
pub async fn acknowledge_document(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    if find_target_job(ctx, &printer).await.is_none() {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    }
    Ok(ok_response(ctx.request))
}

/// Acknowledge-Identify-Printer: clear the pending identify request and
/// hand its actions to the proxy.
pub async fn acknowledge_identify_printer(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let (actions, message) = {
        let mut inner = printer.inner.write().await;
        if !inner.reasons.contains(PrinterReasons::IDENTIFY_PRINTER_REQUESTED) {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "No Identify-Printer request is pending.",
            ));
        }
        inner.reasons -= PrinterReasons::IDENTIFY_PRINTER_REQUESTED;
        (
            std::mem::take(&mut inner.identify_actions),
            inner.identify_message.take(),
        )
    };

    let mut response = ok_response(ctx.request);
    let operation = response.group_mut(GroupTag::Operation);
    if !actions.is_empty() {
        operation.add_all(
            "identify-actions",
            actions.into_iter().map(Value::Keyword).collect(),
        );
    }
    if let Some(message) = message {
        operation.add("message", Value::Text(message));
    }
    Ok(response)
}

/// Get-Output-Device-Attributes: the device's own capability snapshot.
pub async fn get_output_device_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    require_proxy(ctx, Some(&printer)).await?;

    let Some(uuid) = device_uuid(ctx) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing output-device-uuid."));
    };

    let device = printer.inner.read().await.find_device(&uuid);
    let Some(device) = device else {
        return Ok(error_response(
            ctx.request,
            status::NOT_FOUND,
            "Output device is not registered here.",
        ));
    };

    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    let attrs = device.attrs.read().await.copy_filtered(requested.as_ref(), None);
    let group = response.new_group(GroupTag::Printer);
    group.add("output-device-uuid", Value::Uri(uuid));
    for attr in &attrs {
        group.push(attr.clone());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_name_parsing() {
        assert_eq!(sparse_indices("media-supported.3"), Some(("media-supported", 3, 3)));
        assert_eq!(sparse_indices("media-supported.2-5"), Some(("media-supported", 2, 5)));
        assert_eq!(sparse_indices("media-supported"), None);
        assert_eq!(sparse_indices("media-supported.0"), None);
        assert_eq!(sparse_indices("media-supported.5-2"), None);
        assert_eq!(sparse_indices(".3"), None);
    }

    #[test]
    fn sparse_merge_replaces_indexed_values() {
        let mut target = Attributes::new();
        target.set(
            "media-supported",
            vec![
                Value::Keyword("a".into()),
                Value::Keyword("b".into()),
                Value::Keyword("c".into()),
            ],
        );

        merge_device_attribute(
            &mut target,
            &Attribute::new("media-supported.2", Value::Keyword("B".into())),
        );
        let attr = target.find("media-supported").expect("attr");
        assert_eq!(
            attr.values,
            vec![
                Value::Keyword("a".into()),
                Value::Keyword("B".into()),
                Value::Keyword("c".into()),
            ]
        );
    }

    #[test]
    fn sparse_merge_range_grows_list() {
        let mut target = Attributes::new();
        target.set("media-supported", vec![Value::Keyword("a".into())]);

        merge_device_attribute(
            &mut target,
            &Attribute::with_values(
                "media-supported.2-3",
                vec![Value::Keyword("b".into()), Value::Keyword("c".into())],
            ),
        );
        let attr = target.find("media-supported").expect("attr");
        assert_eq!(attr.values.len(), 3);
        assert_eq!(attr.values[2], Value::Keyword("c".into()));
    }

    #[test]
    fn full_merge_replaces_whole_attribute() {
        let mut target = Attributes::new();
        target.set("sides-supported", vec![Value::Keyword("one-sided".into())]);
        merge_device_attribute(
            &mut target,
            &Attribute::with_values(
                "sides-supported",
                vec![
                    Value::Keyword("one-sided".into()),
                    Value::Keyword("two-sided-long-edge".into()),
                ],
            ),
        );
        assert_eq!(target.find("sides-supported").expect("attr").values.len(), 2);
    }
}
