// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document operations.
//
// Jobs hold exactly one document, so the Document object is synthesized
// from the Job: document-number is always 1, and document state follows
// job state.

use std::collections::HashSet;

use platen_core::error::Result;
use platen_ipp::tag::{self, GroupTag};
use platen_ipp::{status, Message, Value};

use crate::dispatch::Ctx;
use crate::job::Job;
use crate::ops::{
    error_response, find_target_job, ipp_date_time, job_uri, ok_response, printer_uri,
    requested_attributes,
};
use crate::printer::Printer;
use crate::validate::{self, JOB_VALUES};

/// The one valid document number.
const DOCUMENT_NUMBER: i32 = 1;

/// Check the `document-number` operation attribute, rejecting anything
/// but document 1.
fn check_document_number(ctx: &Ctx<'_>) -> Option<Message> {
    let number = ctx
        .request
        .operation()
        .and_then(|g| g.get_integer("document-number"));
    match number {
        Some(DOCUMENT_NUMBER) | None => None,
        Some(_) => Some(error_response(
            ctx.request,
            status::NOT_FOUND,
            "Document does not exist.",
        )),
    }
}

/// Copy the synthesized document attributes of a job into a response
/// group.
pub async fn copy_document_attributes(
    response: &mut Message,
    ctx: &Ctx<'_>,
    printer: &Printer,
    job: &Job,
    requested: Option<&HashSet<String>>,
) {
    let inner = job.inner.read().await;
    let mut attrs = inner.doc_attrs.copy_filtered(requested, None);

    let want = |name: &str| requested.is_none_or(|set| set.contains(name));

    if want("document-number") {
        attrs.set("document-number", vec![Value::Integer(DOCUMENT_NUMBER)]);
    }
    if want("document-job-id") {
        attrs.set("document-job-id", vec![Value::Integer(job.id)]);
    }
    if want("document-job-uri") {
        attrs.set("document-job-uri", vec![Value::Uri(job_uri(ctx, printer, job.id))]);
    }
    if want("document-printer-uri") {
        attrs.set("document-printer-uri", vec![Value::Uri(printer_uri(ctx, printer))]);
    }
    if want("document-uuid") {
        attrs.set("document-uuid", vec![Value::Uri(job.uuid.clone())]);
    }
    if want("document-format") {
        attrs.set("document-format", vec![Value::MimeType(inner.format.clone())]);
    }
    if want("document-state") {
        attrs.set("document-state", vec![Value::Enum(inner.state.value())]);
    }
    if want("document-state-reasons") {
        attrs.set(
            "document-state-reasons",
            inner
                .reasons
                .keywords()
                .into_iter()
                .map(|k| Value::Keyword(k.into()))
                .collect(),
        );
    }
    if want("last-document") {
        attrs.set("last-document", vec![Value::Boolean(true)]);
    }
    if want("impressions") {
        attrs.set("impressions", vec![Value::Integer(inner.impressions)]);
    }
    if want("impressions-completed") {
        attrs.set(
            "impressions-completed",
            vec![Value::Integer(inner.impressions_completed)],
        );
    }
    if want("date-time-at-created") {
        attrs.set(
            "date-time-at-created",
            vec![Value::DateTime(ipp_date_time(job.created))],
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

    let group = response.new_group(GroupTag::Document);
    for attr in &attrs {
        group.push(attr.clone());
    }
}

/// Get-Document-Attributes.
pub async fn get_document_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if let Some(response) = check_document_number(ctx) {
        return Ok(response);
    }

    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    copy_document_attributes(&mut response, ctx, &printer, &job, requested.as_ref()).await;
    Ok(response)
}

/// Get-Documents: the single document as a one-element list.
pub async fn get_documents(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };

    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    if job.inner.read().await.filename.is_some() {
        copy_document_attributes(&mut response, ctx, &printer, &job, requested.as_ref()).await;
    }
    Ok(response)
}

/// Cancel-Document: cancels the job (one document per job).
pub async fn cancel_document(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if let Some(response) = check_document_number(ctx) {
        return Ok(response);
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

    crate::job::cancel_job(ctx.state, &printer, &job).await;
    Ok(ok_response(ctx.request))
}

/// Set-Document-Attributes: mutate the document attribute set.
pub async fn set_document_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let printer = ctx.target_printer()?;
    let Some(job) = find_target_job(ctx, &printer).await else {
        return Ok(error_response(ctx.request, status::NOT_FOUND, "Job does not exist."));
    };
    if let Some(response) = check_document_number(ctx) {
        return Ok(response);
    }

    {
        let inner = job.inner.read().await;
        if inner.state.is_terminal() {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Document attributes cannot change after termination.",
            ));
        }
    }

    let mut response = ok_response(ctx.request);
    if !validate::validate_group(
        ctx.request,
        &mut response,
        GroupTag::Document,
        JOB_VALUES,
        None,
        false,
    ) {
        return Ok(response);
    }

    if let Some(group) = ctx.request.group(GroupTag::Document) {
        let mut inner = job.inner.write().await;
        for attr in group {
            if attr.value_tag() == tag::DELETE_ATTRIBUTE {
                inner.doc_attrs.remove(&attr.name);
            } else {
                inner.doc_attrs.set(&attr.name, attr.values.clone());
            }
        }
    }
    Ok(response)
}

/// Validate-Document: validation without side effects.
pub async fn validate_document(ctx: &mut Ctx<'_>) -> Result<Message> {
    let mut response = ok_response(ctx.request);
    validate::validate_group(
        ctx.request,
        &mut response,
        GroupTag::Document,
        JOB_VALUES,
        None,
        true,
    );
    Ok(response)
}
