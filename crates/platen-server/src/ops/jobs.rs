// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job operations: submission, document transfer, cancel/hold/release, and
// attribute access.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use platen_core::error::Result;
use platen_core::{JobReasons, JobState};
use platen_ipp::tag::{self, GroupTag};
use platen_ipp::{status, Attribute, Attributes, Message, Value};

use crate::auth::{self, Policy};
use crate::dispatch::Ctx;
use crate::job::{self, Job};
use crate::ops::{
    add_job_status_group, error_response, find_target_job, ipp_date_time, job_uri, ok_response,
    printer_uri, requested_attributes, time_at,
};
use crate::printer::Printer;
use crate::events;
use crate::validate::{self, F_CREATEOP, JOB_VALUES};

/// Job-submission authorization: open unless the printer carries a print
/// group, in which case membership is required.
async fn authorize_submit(ctx: &Ctx<'_>, printer: &Printer) -> Result<()> {
    let group = printer.inner.read().await.print_group.clone();
    match group {
        Some(group) => auth::authorize(&ctx.state.config, ctx.username.as_deref(), Policy::Group(&group)),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Range/enum/keyword checks for well-known job template values, applied
/// after the schema-table pass.  Offenders are copied to the unsupported
/// group and fail the request with `attributes-or-values`.
fn check_job_values(printer_attrs: &Attributes, request: &Message, response: &mut Message) -> bool {
    let mut ok = true;
    let mut reject = |attr: &Attribute, response: &mut Message, message: &str| {
        ok = false;
        validate::respond_unsupported(response, attr);
        if status::is_success(response.code) {
            response.code = status::ATTRIBUTES_OR_VALUES;
            response.set_status_message(message);
        }
    };

    let find = |name: &str| {
        request
            .group(GroupTag::Job)
            .and_then(|g| g.find(name))
            .or_else(|| request.operation().and_then(|g| g.find(name)))
    };

    if let Some(attr) = find("copies") {
        let (lower, upper) = printer_attrs
            .find("copies-supported")
            .and_then(|a| a.values.first())
            .and_then(|v| match v {
                Value::RangeOfInteger { lower, upper } => Some((*lower, *upper)),
                _ => None,
            })
            .unwrap_or((1, 99));
        let copies = attr.values.first().and_then(Value::as_integer).unwrap_or(0);
        if !(lower..=upper).contains(&copies) {
            reject(attr, response, "Unsupported copies value.");
        }
    }

    if let Some(attr) = find("job-priority") {
        let priority = attr.values.first().and_then(Value::as_integer).unwrap_or(0);
        if !(1..=100).contains(&priority) {
            reject(attr, response, "Unsupported job-priority value.");
        }
    }

    if let Some(attr) = find("print-quality") {
        let quality = attr.values.first().and_then(Value::as_integer).unwrap_or(0);
        if !(3..=5).contains(&quality) {
            reject(attr, response, "Unsupported print-quality value.");
        }
    }

    if let Some(attr) = find("orientation-requested") {
        if !attr.is_out_of_band() {
            let orientation = attr.values.first().and_then(Value::as_integer).unwrap_or(0);
            if !(3..=7).contains(&orientation) {
                reject(attr, response, "Unsupported orientation-requested value.");
            }
        }
    }

    if let Some(attr) = find("page-ranges") {
        let bad = attr.values.iter().any(|v| match v {
            Value::RangeOfInteger { lower, upper } => *lower < 1 || lower > upper,
            _ => true,
        });
        if bad {
            reject(attr, response, "Unsupported page-ranges value.");
        }
    }

    if let Some(attr) = find("media") {
        if let Some(media) = attr.values.first().and_then(Value::as_str) {
            if !printer_attrs.contains_string("media-supported", media) {
                reject(attr, response, "Unsupported media value.");
            }
        }
    }

    if let Some(attr) = find("sides") {
        if let Some(sides) = attr.values.first().and_then(Value::as_str) {
            if !printer_attrs.contains_string("sides-supported", sides) {
                reject(attr, response, "Unsupported sides value.");
            }
        }
    }

    ok
}

/// Full job-creation validation: structural well-formedness, the schema
/// table, supported-keyword gating, value checks, and document-format.
async fn valid_job_attributes(
    ctx: &Ctx<'_>,
    printer: &Printer,
    response: &mut Message,
) -> bool {
    if let Some(group) = ctx.request.group(GroupTag::Job) {
        if let Err(err) = group.validate() {
            response.code = status::BAD_REQUEST;
            response.set_status_message(&format!("Malformed job attributes: {err}."));
            return false;
        }
    }

    let printer_inner = printer.inner.read().await;
    let supported = printer_inner.attrs.find("job-creation-attributes-supported").cloned();

    let mut ok = validate::validate_group(
        ctx.request,
        response,
        GroupTag::Job,
        JOB_VALUES,
        supported.as_ref(),
        true,
    );

    ok &= check_job_values(&printer_inner.attrs, ctx.request, response);

    // document-format must be a supported MIME type (octet-stream always
    // accepted; detection refines it later).
    if let Some(attr) = ctx
        .request
        .operation()
        .and_then(|g| g.find_tagged("document-format", tag::MIME_TYPE))
    {
        let format = attr.values.first().and_then(Value::as_str).unwrap_or("");
        if format != "application/octet-stream"
            && !printer_inner.attrs.contains_string("document-format-supported", format)
        {
            ok = false;
            validate::respond_unsupported(response, attr);
            response.code = status::DOCUMENT_FORMAT_NOT_SUPPORTED;
            response.set_status_message(&format!("Unsupported document format \"{format}\"."));
        }
    }

    ok
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Decode a `job-hold-until-time` dateTime into a chrono timestamp.
fn hold_time_from(value: &Value) -> Option<DateTime<Utc>> {
    let Value::DateTime(dt) = value else { return None };
    Utc.with_ymd_and_hms(
        dt.year as i32,
        dt.month as u32,
        dt.day as u32,
        dt.hour as u32,
        dt.minutes as u32,
        dt.seconds as u32,
    )
    .single()
}

/// Create the job object for a job-submission request: guards, attribute
/// copying, format selection, and hold evaluation.  Returns an error
/// response when the printer cannot take the job.
async fn new_job(ctx: &Ctx<'_>, printer: &Arc<Printer>) -> std::result::Result<Arc<Job>, Message> {
    let request = ctx.request;
    let username = ctx.effective_username();

    let job = {
        let mut printer_inner = printer.inner.write().await;

        if !printer_inner.is_accepting {
            return Err(error_response(
                request,
                status::NOT_ACCEPTING_JOBS,
                "Not accepting jobs.",
            ));
        }
        if printer_inner.queued_job_count() >= ctx.state.config.max_jobs {
            return Err(error_response(
                request,
                status::TOO_MANY_JOBS,
                "Too many jobs are queued.",
            ));
        }

        let operation = request.operation();
        let job_group = request.group(GroupTag::Job);
        let find = |name: &str| {
            job_group
                .and_then(|g| g.find(name))
                .or_else(|| operation.and_then(|g| g.find(name)))
        };

        let name = find("job-name")
            .and_then(|a| a.values.first())
            .and_then(Value::as_str)
            .unwrap_or("untitled")
            .to_string();
        let priority = find("job-priority")
            .and_then(|a| a.values.first())
            .and_then(Value::as_integer)
            .or_else(|| printer_inner.attrs.get_integer("job-priority-default"))
            .unwrap_or(50);

        let job = Arc::new(Job::new(
            ctx.state.next_job_id(),
            printer.id,
            &printer.name,
            &name,
            &username,
            priority,
        ));

        {
            let mut inner = job.inner.write().await;

            // Copy approved job-group attributes, and create-op-exempt ones
            // from the operation group; the document-level names go to the
            // document attribute set.
            for row in JOB_VALUES {
                let attr = job_group.and_then(|g| g.find(row.name)).or_else(|| {
                    (row.flags & F_CREATEOP != 0)
                        .then(|| operation.and_then(|g| g.find(row.name)))
                        .flatten()
                });
                let Some(attr) = attr else { continue };
                if matches!(row.name, "document-name" | "document-message" | "document-metadata") {
                    inner.doc_attrs.push(attr.clone());
                } else {
                    inner.attrs.push(attr.clone());
                }
            }
            if let Some(attr) = operation.and_then(|g| g.find("document-format")) {
                inner.doc_attrs.push(attr.clone());
            }
            if let Some(attr) = operation.and_then(|g| g.find("compression")) {
                inner.doc_attrs.push(attr.clone());
            }
            inner
                .attrs
                .set("job-originating-user-name", vec![Value::Name(username.clone())]);

            // Effective format: detected > requested > printer default.
            inner.format = operation
                .and_then(|g| g.get_string("document-format-detected"))
                .or_else(|| operation.and_then(|g| g.get_string("document-format")))
                .or_else(|| printer_inner.attrs.get_string("document-format-default"))
                .unwrap_or("application/octet-stream")
                .to_string();

            // Hold evaluation.
            let hold_keyword = find("job-hold-until")
                .and_then(|a| a.values.first())
                .and_then(Value::as_str)
                .map(str::to_string);
            let hold_time = find("job-hold-until-time")
                .and_then(|a| a.values.first())
                .and_then(hold_time_from);
            let held_by_keyword = hold_keyword.as_deref().is_some_and(|k| k != "no-hold");
            if held_by_keyword || hold_time.is_some() || printer_inner.hold_new_jobs {
                inner.state = JobState::PendingHeld;
                inner.reasons |= JobReasons::JOB_HOLD_UNTIL_SPECIFIED;
                inner.hold_until_keyword = hold_keyword.clone();
                inner.hold_until_time = hold_time;
                if !held_by_keyword && hold_time.is_none() {
                    inner.held_by_printer = true;
                    inner.hold_until_keyword = Some("indefinite".into());
                }
            }
        }

        // Apply any template-job resources named by the request.
        if let Some(ids) = operation.and_then(|g| g.find("resource-ids")) {
            let supported = printer_inner
                .attrs
                .find("job-creation-attributes-supported")
                .cloned();
            for id in ids.values.iter().filter_map(Value::as_integer) {
                let Some(resource) = ctx.state.find_resource(id).await else { continue };
                let is_template = {
                    let r = resource.inner.read().await;
                    r.rtype == "template-job"
                        && r.state == platen_core::ResourceState::Installed
                };
                if !is_template {
                    continue;
                }
                let mut inner = job.inner.write().await;
                if let Err(err) = crate::ops::resources::apply_template(
                    &resource,
                    &mut inner.attrs,
                    supported.as_ref(),
                    JOB_VALUES,
                )
                .await
                {
                    warn!(resource_id = id, error = %err, "unable to apply job template");
                }
            }
        }

        let priority = job.cached_priority();
        printer_inner.add_job(Arc::clone(&job), priority);
        job
    };

    info!(
        printer = %printer.name,
        job_id = job.id,
        user = %username,
        "job created"
    );
    events::add_event(ctx.state, Some(printer), Some(&job), events::Event::JOB_CREATED, "Job created.")
        .await;

    // Job-creation requests may carry subscription groups.
    crate::ops::subscriptions::create_requested(ctx, Some(printer), Some(&job)).await;

    Ok(job)
}

/// Write the received document into the job's spool file, running format
/// detection on the first 8 bytes when the format is still octet-stream.
///
/// A job canceled while its document was in flight stays untouched: the
/// terminal state is final, and the written file is simply orphaned.
async fn spool_document(
    ctx: &Ctx<'_>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    data: &[u8],
) -> Result<()> {
    let detected = (data.len() >= 4)
        .then(|| job::detect_format(&data[..data.len().min(8)]))
        .flatten();

    let format = {
        let mut inner = job.inner.write().await;
        if inner.state.is_terminal() {
            return Ok(());
        }
        inner.spool_open = true;
        if inner.format == "application/octet-stream" {
            if let Some(detected) = detected {
                inner.format = detected.to_string();
                inner
                    .doc_attrs
                    .set("document-format-detected", vec![Value::MimeType(detected.into())]);
            }
        }
        inner.format.clone()
    };

    tokio::fs::create_dir_all(&ctx.state.config.spool_dir).await?;
    let path = job::spool_filename(&ctx.state.config, &printer.name, job.id, &format, None);
    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;

    let digest = hex::encode(Sha256::digest(data));

    {
        let mut inner = job.inner.write().await;
        inner.spool_open = false;
        if inner.state.is_terminal() {
            return Ok(());
        }
        inner.filename = Some(path);
        inner.sha256 = Some(digest);
        inner.reasons -= JobReasons::JOB_INCOMING;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Submission operations
// ---------------------------------------------------------------------------

/// Print-Job: create a job with an attached document.
pub async fn print_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let mut response = ok_response(ctx.request);
    if !valid_job_attributes(ctx, &printer, &mut response).await {
        return Ok(response);
    }
    if ctx.request.data.is_empty() {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "No document data."));
    }

    let job = match new_job(ctx, &printer).await {
        Ok(job) => job,
        Err(response) => return Ok(response),
    };

    if let Err(err) = spool_document(ctx, &printer, &job, &ctx.request.data).await {
        warn!(job_id = job.id, error = %err, "unable to spool document");
        job::finish_job(ctx.state, &printer, &job, JobState::Aborted, JobReasons::ABORTED_BY_SYSTEM)
            .await;
        return Ok(error_response(
            ctx.request,
            status::INTERNAL_ERROR,
            "Unable to create spool file.",
        ));
    }

    job::check_jobs(ctx.state, &printer).await;

    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

/// Print-URI: create a job whose document is fetched from a URI.
pub async fn print_uri(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let mut response = ok_response(ctx.request);
    if !valid_job_attributes(ctx, &printer, &mut response).await {
        return Ok(response);
    }
    let Some(uri) = document_uri(ctx, &mut response) else {
        return Ok(response);
    };

    let job = match new_job(ctx, &printer).await {
        Ok(job) => job,
        Err(response) => return Ok(response),
    };

    if let Some(response) = fetch_into_job(ctx, &printer, &job, &uri).await {
        return Ok(response);
    }

    job::check_jobs(ctx.state, &printer).await;
    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

/// Validate-Job: run creation validation without creating anything.
pub async fn validate_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let mut response = ok_response(ctx.request);
    valid_job_attributes(ctx, &printer, &mut response).await;
    Ok(response)
}

/// Create-Job: create a job awaiting its document.
pub async fn create_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let mut response = ok_response(ctx.request);
    if !valid_job_attributes(ctx, &printer, &mut response).await {
        return Ok(response);
    }

    let job = match new_job(ctx, &printer).await {
        Ok(job) => job,
        Err(response) => return Ok(response),
    };

    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

/// Send-Document: attach the single document to a Create-Job job.
pub async fn send_document(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    {
        let inner = job.inner.read().await;
        if inner.state.is_terminal() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job is not in a pending state.",
            ));
        }
        if inner.filename.is_some() || inner.spool_open {
            return Ok(error_response(
                ctx.request,
                status::TOO_MANY_DOCUMENTS,
                "Multiple document jobs are not supported.",
            ));
        }
    }

    let last_document = ctx
        .request
        .operation()
        .and_then(|g| g.get_boolean("last-document"))
        .unwrap_or(false);
    if !last_document {
        return Ok(error_response(
            ctx.request,
            status::ATTRIBUTES_OR_VALUES,
            "Multiple document jobs are not supported (last-document must be true).",
        ));
    }

    if ctx.request.data.is_empty() {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "No document data."));
    }

    // Document-level format override for this transfer.
    if let Some(format) = ctx.request.operation().and_then(|g| g.get_string("document-format")) {
        let mut inner = job.inner.write().await;
        inner.format = format.to_string();
        inner
            .doc_attrs
            .set("document-format", vec![Value::MimeType(format.into())]);
    }

    let mut response = ok_response(ctx.request);
    if let Err(err) = spool_document(ctx, &printer, &job, &ctx.request.data).await {
        warn!(job_id = job.id, error = %err, "unable to spool document");
        job::finish_job(ctx.state, &printer, &job, JobState::Aborted, JobReasons::ABORTED_BY_SYSTEM)
            .await;
        return Ok(error_response(
            ctx.request,
            status::INTERNAL_ERROR,
            "Unable to create spool file.",
        ));
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        Some(&job),
        events::Event::JOB_STATE_CHANGED,
        "Document received.",
    )
    .await;
    job::check_jobs(ctx.state, &printer).await;

    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

/// Send-URI: attach a document fetched from a URI.
pub async fn send_uri(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    authorize_submit(ctx, &printer).await?;

    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    {
        let inner = job.inner.read().await;
        if inner.state.is_terminal() || inner.filename.is_some() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job already has a document.",
            ));
        }
    }

    let mut response = ok_response(ctx.request);
    let Some(uri) = document_uri(ctx, &mut response) else {
        return Ok(response);
    };

    if let Some(response) = fetch_into_job(ctx, &printer, &job, &uri).await {
        return Ok(response);
    }

    job::check_jobs(ctx.state, &printer).await;
    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

/// Extract and pre-validate `document-uri`.
fn document_uri(ctx: &Ctx<'_>, response: &mut Message) -> Option<String> {
    let Some(attr) = ctx.request.find_tagged("document-uri", tag::URI) else {
        *response = error_response(ctx.request, status::BAD_REQUEST, "Missing document-uri.");
        return None;
    };
    if attr.values.len() != 1 {
        *response = error_response(
            ctx.request,
            status::ATTRIBUTES_OR_VALUES,
            "Too many document-uri values.",
        );
        validate::respond_unsupported(response, attr);
        return None;
    }
    attr.values.first().and_then(Value::as_str).map(str::to_string)
}

/// Fetch the document behind `uri` into the job's spool file.  Returns an
/// error response on failure (the job aborts).
async fn fetch_into_job(
    ctx: &Ctx<'_>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    uri: &str,
) -> Option<Message> {
    let format = job.inner.read().await.format.clone();
    if let Err(err) = tokio::fs::create_dir_all(&ctx.state.config.spool_dir).await {
        warn!(error = %err, "unable to create spool directory");
    }
    let path = job::spool_filename(&ctx.state.config, &printer.name, job.id, &format, None);

    match crate::fetch::fetch_document_uri(&ctx.state.config, uri, &path).await {
        Ok(fetched) => {
            let mut inner = job.inner.write().await;
            if inner.state.is_terminal() {
                // Canceled while fetching; the terminal state is final.
                return None;
            }
            if inner.format == "application/octet-stream" {
                if let Some(detected) = job::detect_format(&fetched.header) {
                    inner.format = detected.to_string();
                    inner
                        .doc_attrs
                        .set("document-format-detected", vec![Value::MimeType(detected.into())]);
                }
            }
            inner.filename = Some(path);
            inner.reasons -= JobReasons::JOB_INCOMING;
            None
        }
        Err(err) => {
            warn!(job_id = job.id, uri, error = %err, "document fetch failed");
            let (code, message) = match &err {
                platen_core::PlatenError::BadRequest(m) => {
                    if m.contains("scheme") {
                        (status::URI_SCHEME_NOT_SUPPORTED, m.clone())
                    } else {
                        (status::BAD_REQUEST, m.clone())
                    }
                }
                platen_core::PlatenError::DocumentAccess(m) => {
                    (status::DOCUMENT_ACCESS_ERROR, m.clone())
                }
                other => (status::INTERNAL_ERROR, other.to_string()),
            };
            job::finish_job(
                ctx.state,
                printer,
                job,
                JobState::Aborted,
                JobReasons::DOCUMENT_ACCESS_ERROR | JobReasons::ABORTED_BY_SYSTEM,
            )
            .await;
            Some(error_response(ctx.request, code, &message))
        }
    }
}

// ---------------------------------------------------------------------------
// Cancel / hold / release
// ---------------------------------------------------------------------------

/// Owner-or-admin gate for operations on an existing job.
async fn authorize_job_access(ctx: &Ctx<'_>, job: &Job) -> Result<bool> {
    let owner = job.inner.read().await.username.clone();
    let effective = ctx.effective_username();
    if effective == owner || auth::is_admin(&ctx.state.config, ctx.username.as_deref()) {
        return Ok(true);
    }
    Ok(false)
}

/// Cancel-Job.
pub async fn cancel_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !authorize_job_access(ctx, &job).await? {
        return Err(platen_core::PlatenError::Forbidden);
    }

    {
        let inner = job.inner.read().await;
        if inner.state.is_terminal() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                &format!("Job is already {}.", inner.state.keyword()),
            ));
        }
    }

    job::cancel_job(ctx.state, &printer, &job).await;
    Ok(ok_response(ctx.request))
}

/// Cancel-Current-Job.
pub async fn cancel_current_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    ctx.require_admin()?;

    let current = {
        let inner = printer.inner.read().await;
        inner.processing_job.and_then(|id| inner.jobs.get(&id).cloned())
    };

    match current {
        Some(job) => {
            job::cancel_job(ctx.state, &printer, &job).await;
            Ok(ok_response(ctx.request))
        }
        None => {
            let mut response = ok_response(ctx.request);
            response.set_status_message("No current job.");
            Ok(response)
        }
    }
}

/// Cancel-Jobs (admin) and Cancel-My-Jobs (owner).
pub async fn cancel_jobs(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let my_jobs = ctx.request.code == platen_ipp::op::CANCEL_MY_JOBS;
    if !my_jobs {
        ctx.require_admin()?;
    }
    let username = ctx.effective_username();

    let targets: Vec<Arc<Job>> = {
        let inner = printer.inner.read().await;
        let mut targets = Vec::new();
        for job in &inner.active_jobs {
            if my_jobs {
                let job_inner = job.inner.read().await;
                if job_inner.username != username {
                    continue;
                }
            }
            targets.push(Arc::clone(job));
        }
        targets
    };

    let count = targets.len();
    for job in targets {
        job::cancel_job(ctx.state, &printer, &job).await;
    }

    info!(printer = %printer.name, count, my_jobs, "jobs canceled");
    Ok(ok_response(ctx.request))
}

/// Hold-Job: pending → pending-held.
pub async fn hold_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !authorize_job_access(ctx, &job).await? {
        return Err(platen_core::PlatenError::Forbidden);
    }

    {
        let mut inner = job.inner.write().await;
        if !matches!(inner.state, JobState::Pending | JobState::PendingHeld) {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job cannot be held in its current state.",
            ));
        }
        let keyword = ctx
            .request
            .operation()
            .and_then(|g| g.get_string("job-hold-until"))
            .unwrap_or("indefinite")
            .to_string();
        inner.state = JobState::PendingHeld;
        inner.reasons |= JobReasons::JOB_HOLD_UNTIL_SPECIFIED;
        inner.hold_until_keyword = Some(keyword);
        inner.hold_until_time = None;
    }

    events::add_event(ctx.state, Some(&printer), Some(&job), events::Event::JOB_STATE_CHANGED, "Job held.")
        .await;
    Ok(ok_response(ctx.request))
}

/// Release-Job: pending-held → pending.
pub async fn release_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !authorize_job_access(ctx, &job).await? {
        return Err(platen_core::PlatenError::Forbidden);
    }

    {
        let mut inner = job.inner.write().await;
        if inner.state != JobState::PendingHeld {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job is not held.",
            ));
        }
        release_hold(&mut inner);
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        Some(&job),
        events::Event::JOB_STATE_CHANGED,
        "Job released.",
    )
    .await;
    job::check_jobs(ctx.state, &printer).await;
    Ok(ok_response(ctx.request))
}

/// Shared hold-clearing used by Release-Job and Release-Held-New-Jobs.
pub fn release_hold(inner: &mut crate::job::JobInner) {
    inner.state = JobState::Pending;
    inner.reasons -= JobReasons::JOB_HOLD_UNTIL_SPECIFIED;
    inner.hold_until_keyword = None;
    inner.hold_until_time = None;
    inner.held_by_printer = false;
}

/// Close-Job: no more documents are coming.
pub async fn close_job(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !authorize_job_access(ctx, &job).await? {
        return Err(platen_core::PlatenError::Forbidden);
    }

    let has_document = job.inner.read().await.filename.is_some();
    if !has_document {
        // Single-document jobs closed without a document have nothing to
        // print.
        job::finish_job(
            ctx.state,
            &printer,
            &job,
            JobState::Aborted,
            JobReasons::JOB_DATA_INSUFFICIENT | JobReasons::ABORTED_BY_SYSTEM,
        )
        .await;
    } else {
        job::check_jobs(ctx.state, &printer).await;
    }

    let mut response = ok_response(ctx.request);
    add_job_status_group(&mut response, ctx, &printer, &job).await;
    Ok(response)
}

// ---------------------------------------------------------------------------
// Attribute access
// ---------------------------------------------------------------------------

/// Copy a job's attributes into a response group, honoring the
/// requested-attributes filter and the privacy filter for non-owners.
pub async fn copy_job_attributes(
    response: &mut Message,
    ctx: &Ctx<'_>,
    printer: &Printer,
    job: &Job,
    requested: Option<&HashSet<String>>,
) {
    let full_access = {
        let owner = job.inner.read().await.username.clone();
        ctx.effective_username() == owner
            || auth::is_admin(&ctx.state.config, ctx.username.as_deref())
    };
    let privacy = (!full_access).then(auth::privacy_attributes);

    let inner = job.inner.read().await;
    let mut attrs = inner.attrs.copy_filtered(requested, privacy.as_ref());

    let want = |name: &str| {
        requested.is_none_or(|set| set.contains(name))
            && privacy.as_ref().is_none_or(|set| !set.contains(name))
    };

    if want("job-id") {
        attrs.set("job-id", vec![Value::Integer(job.id)]);
    }
    if want("job-uri") {
        attrs.set("job-uri", vec![Value::Uri(job_uri(ctx, printer, job.id))]);
    }
    if want("job-uuid") {
        attrs.set("job-uuid", vec![Value::Uri(job.uuid.clone())]);
    }
    if want("job-printer-uri") {
        attrs.set("job-printer-uri", vec![Value::Uri(printer_uri(ctx, printer))]);
    }
    if want("job-state") {
        attrs.set("job-state", vec![Value::Enum(inner.state.value())]);
    }
    if want("job-state-reasons") {
        attrs.set(
            "job-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
    }
    if want("job-name") {
        attrs.set("job-name", vec![Value::Name(inner.name.clone())]);
    }
    if want("job-priority") {
        attrs.set("job-priority", vec![Value::Integer(inner.priority)]);
    }
    if want("document-format") {
        attrs.set("document-format", vec![Value::MimeType(inner.format.clone())]);
    }
    if want("job-impressions") {
        attrs.set("job-impressions", vec![Value::Integer(inner.impressions)]);
    }
    if want("job-impressions-completed") {
        attrs.set(
            "job-impressions-completed",
            vec![Value::Integer(inner.impressions_completed)],
        );
    }
    if want("job-hold-until") {
        if let Some(keyword) = &inner.hold_until_keyword {
            attrs.set("job-hold-until", vec![Value::Keyword(keyword.clone())]);
        }
    }
    if want("time-at-creation") {
        attrs.set("time-at-creation", vec![Value::Integer(time_at(printer, job.created))]);
    }
    if want("date-time-at-creation") {
        attrs.set(
            "date-time-at-creation",
            vec![Value::DateTime(ipp_date_time(job.created))],
        );
    }
    if want("time-at-processing") {
        attrs.set(
            "time-at-processing",
            vec![match inner.processing {
                Some(when) => Value::Integer(time_at(printer, when)),
                None => Value::OutOfBand(tag::NO_VALUE),
            }],
        );
    }
    if want("date-time-at-processing") {
        attrs.set(
            "date-time-at-processing",
            vec![match inner.processing {
                Some(when) => Value::DateTime(ipp_date_time(when)),
                None => Value::OutOfBand(tag::NO_VALUE),
            }],
        );
    }
    if want("time-at-completed") {
        attrs.set(
            "time-at-completed",
            vec![match inner.completed {
                Some(when) => Value::Integer(time_at(printer, when)),
                None => Value::OutOfBand(tag::NO_VALUE),
            }],
        );
    }
    if want("date-time-at-completed") {
        attrs.set(
            "date-time-at-completed",
            vec![match inner.completed {
                Some(when) => Value::DateTime(ipp_date_time(when)),
                None => Value::OutOfBand(tag::NO_VALUE),
            }],
        );
    }
    if let Some(uuid) = &inner.dev_uuid {
        if want("output-device-assigned") {
            attrs.set("output-device-assigned", vec![Value::Name(uuid.clone())]);
        }
    }
    if let Some(state) = inner.dev_state {
        if want("output-device-job-state") {
            attrs.set("output-device-job-state", vec![Value::Enum(state.value())]);
        }
    }
    if !inner.dev_reasons.is_empty() && want("output-device-job-state-reasons") {
        attrs.set(
            "output-device-job-state-reasons",
            inner
                .dev_reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
    }
    if let Some(message) = &inner.dev_message {
        if want("output-device-job-state-message") {
            attrs.set(
                "output-device-job-state-message",
                vec![Value::Text(message.clone())],
            );
        }
    }

    let group = response.new_group(GroupTag::Job);
    for attr in &attrs {
        group.push(attr.clone());
    }
}

/// Get-Job-Attributes.
pub async fn get_job_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    copy_job_attributes(&mut response, ctx, &printer, &job, requested.as_ref()).await;
    Ok(response)
}

/// Get-Jobs: list jobs filtered by which-jobs / my-jobs / limit.
pub async fn get_jobs(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let operation = ctx.request.operation();
    let which = operation
        .and_then(|g| g.get_string("which-jobs"))
        .unwrap_or("not-completed");
    let my_jobs = operation.and_then(|g| g.get_boolean("my-jobs")).unwrap_or(false);
    let limit = operation
        .and_then(|g| g.get_integer("limit"))
        .filter(|n| *n > 0)
        .map(|n| n as usize);
    let username = ctx.effective_username();
    let requested = requested_attributes(ctx.request);

    let jobs: Vec<Arc<Job>> = {
        let inner = printer.inner.read().await;
        match which {
            "completed" => {
                // Terminal jobs, newest first.
                let mut jobs: Vec<Arc<Job>> = Vec::new();
                for job in inner.jobs.values().rev() {
                    if job.inner.read().await.state.is_terminal() {
                        jobs.push(Arc::clone(job));
                    }
                }
                jobs
            }
            "all" => inner.jobs.values().cloned().collect(),
            "fetchable" => {
                let mut jobs = Vec::new();
                for job in &inner.active_jobs {
                    if job
                        .inner
                        .read()
                        .await
                        .reasons
                        .contains(JobReasons::JOB_FETCHABLE)
                    {
                        jobs.push(Arc::clone(job));
                    }
                }
                jobs
            }
            _ => inner.active_jobs.clone(),
        }
    };

    let mut response = ok_response(ctx.request);
    let mut emitted = 0usize;
    for job in jobs {
        if my_jobs && job.inner.read().await.username != username {
            continue;
        }
        if limit.is_some_and(|l| emitted >= l) {
            break;
        }
        copy_job_attributes(&mut response, ctx, &printer, &job, requested.as_ref()).await;
        emitted += 1;
    }
    Ok(response)
}

/// Set-Job-Attributes: mutate job template attributes on a live job.
pub async fn set_job_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if !authorize_job_access(ctx, &job).await? {
        return Err(platen_core::PlatenError::Forbidden);
    }

    {
        let inner = job.inner.read().await;
        if inner.state.is_terminal() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Job attributes cannot change after termination.",
            ));
        }
    }

    let mut response = ok_response(ctx.request);
    if !validate::validate_group(ctx.request, &mut response, GroupTag::Job, JOB_VALUES, None, false)
    {
        return Ok(response);
    }

    let mut reorder = None;
    if let Some(group) = ctx.request.group(GroupTag::Job) {
        let mut inner = job.inner.write().await;
        for attr in group {
            if attr.value_tag() == tag::DELETE_ATTRIBUTE {
                inner.attrs.remove(&attr.name);
                continue;
            }
            inner.attrs.set(&attr.name, attr.values.clone());
            if attr.name == "job-priority" {
                if let Some(priority) = attr.values.first().and_then(Value::as_integer) {
                    inner.priority = priority;
                    reorder = Some(priority);
                }
            }
            if attr.name == "job-name" {
                if let Some(name) = attr.values.first().and_then(Value::as_str) {
                    inner.name = name.to_string();
                }
            }
        }
    }

    // A priority change re-slots the job in the active queue.
    if let Some(priority) = reorder {
        job.set_cached_priority(priority);
        let mut inner = printer.inner.write().await;
        if inner.active_jobs.iter().any(|j| j.id == job.id) {
            inner.active_jobs.retain(|j| j.id != job.id);
            inner.add_job(Arc::clone(&job), priority);
            inner.jobs.insert(job.id, Arc::clone(&job));
        }
    }

    events::add_event(
        ctx.state,
        Some(&printer),
        Some(&job),
        events::Event::JOB_CONFIG_CHANGED,
        "Job attributes changed.",
    )
    .await;
    Ok(response)
}
