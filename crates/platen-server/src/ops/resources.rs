// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resource operations (PWG 5100.22) and printer resource allocation.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use platen_core::error::Result;
use platen_core::{spool_extension, ResourceState};
use platen_ipp::tag::GroupTag;
use platen_ipp::{status, Message, Value};

use crate::dispatch::Ctx;
use crate::events::{self, Event};
use crate::ops::{error_response, ipp_date_time, ok_response, requested_attributes};
use crate::resource::{is_template_type, Resource, RESOURCE_FORMATS, RESOURCE_TYPES};
use crate::validate;

/// Resolve the resource a request targets via `resource-id`.
async fn find_target_resource(ctx: &Ctx<'_>) -> std::result::Result<Arc<Resource>, Message> {
    let Some(id) = ctx.request.operation().and_then(|g| g.get_integer("resource-id")) else {
        return Err(error_response(ctx.request, status::BAD_REQUEST, "Missing resource-id."));
    };
    ctx.state
        .find_resource(id)
        .await
        .ok_or_else(|| error_response(ctx.request, status::NOT_FOUND, "Resource does not exist."))
}

/// Create-Resource: register an empty resource of a known type.
pub async fn create_resource(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;

    let Some(attr) = ctx.request.find("resource-type") else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing resource-type."));
    };
    let rtype = attr.values.first().and_then(Value::as_str).unwrap_or("");
    if !RESOURCE_TYPES.contains(&rtype) {
        let mut response = error_response(
            ctx.request,
            status::ATTRIBUTES_OR_VALUES,
            &format!("Unsupported resource-type \"{rtype}\"."),
        );
        validate::respond_unsupported(&mut response, attr);
        return Ok(response);
    }

    let resource = Arc::new(Resource::new(ctx.state.next_resource_id(), rtype));
    {
        let mut inner = resource.inner.write().await;
        for name in ["resource-name", "resource-info"] {
            if let Some(attr) = ctx.request.find(name) {
                inner.attrs.push(attr.clone());
            }
        }
    }
    ctx.state.add_resource(Arc::clone(&resource)).await;

    info!(resource_id = resource.id, rtype, "resource created");
    events::add_event_full(
        ctx.state,
        None,
        None,
        Some(&resource),
        Event::RESOURCE_CREATED,
        "Resource created.",
    )
    .await;

    let mut response = ok_response(ctx.request);
    let group = response.new_group(GroupTag::Resource);
    group.add("resource-id", Value::Integer(resource.id));
    group.add("resource-state", Value::Enum(ResourceState::Pending.value()));
    group.add("resource-uuid", Value::Uri(resource.uuid.clone()));
    Ok(response)
}

/// Send-Resource-Data: stream the payload and make the resource
/// available.
pub async fn send_resource_data(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let resource = match find_target_resource(ctx).await {
        Ok(resource) => resource,
        Err(response) => return Ok(response),
    };

    {
        let inner = resource.inner.read().await;
        if inner.state != ResourceState::Pending {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Resource already has data.",
            ));
        }
    }

    let Some(format_attr) = ctx.request.find("resource-format") else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing resource-format."));
    };
    let format = format_attr.values.first().and_then(Value::as_str).unwrap_or("");
    if !RESOURCE_FORMATS.contains(&format) {
        let mut response = error_response(
            ctx.request,
            status::ATTRIBUTES_OR_VALUES,
            &format!("Unsupported resource-format \"{format}\"."),
        );
        validate::respond_unsupported(&mut response, format_attr);
        return Ok(response);
    }
    if ctx.request.data.is_empty() {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "No resource data."));
    }

    let path = ctx
        .state
        .config
        .spool_dir
        .join(format!("resource-{}.{}", resource.id, spool_extension(format)));
    if let Err(err) = tokio::fs::create_dir_all(&ctx.state.config.spool_dir).await {
        warn!(error = %err, "unable to create spool directory");
    }
    let write = async {
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&ctx.request.data).await?;
        file.flush().await
    };
    if let Err(err) = write.await {
        warn!(resource_id = resource.id, error = %err, "unable to store resource data");
        let mut inner = resource.inner.write().await;
        inner.state = ResourceState::Aborted;
        inner.state_time = Utc::now();
        return Ok(error_response(
            ctx.request,
            status::INTERNAL_ERROR,
            "Unable to store resource data.",
        ));
    }

    {
        let mut inner = resource.inner.write().await;
        inner.format = Some(format.to_string());
        inner.filename = Some(path);
        inner.state = ResourceState::Available;
        inner.state_time = Utc::now();
    }

    events::add_event_full(
        ctx.state,
        None,
        None,
        Some(&resource),
        Event::RESOURCE_STATE_CHANGED,
        "Resource data received.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Install-Resource: available → installed.
pub async fn install_resource(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let resource = match find_target_resource(ctx).await {
        Ok(resource) => resource,
        Err(response) => return Ok(response),
    };

    {
        let mut inner = resource.inner.write().await;
        if inner.state != ResourceState::Available {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                &format!("Resource is {}.", inner.state.keyword()),
            ));
        }
        inner.state = ResourceState::Installed;
        inner.state_time = Utc::now();
    }

    info!(resource_id = resource.id, "resource installed");
    events::add_event_full(
        ctx.state,
        None,
        None,
        Some(&resource),
        Event::RESOURCE_INSTALLED,
        "Resource installed.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Cancel-Resource: immediate when unused, deferred while allocated.
pub async fn cancel_resource(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let resource = match find_target_resource(ctx).await {
        Ok(resource) => resource,
        Err(response) => return Ok(response),
    };

    let deferred = {
        let mut inner = resource.inner.write().await;
        if matches!(inner.state, ResourceState::Canceled | ResourceState::Aborted) {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Resource is already canceled.",
            ));
        }
        if inner.use_count > 0 {
            inner.cancel_requested = true;
            true
        } else {
            inner.state = ResourceState::Canceled;
            inner.state_time = Utc::now();
            false
        }
    };

    info!(resource_id = resource.id, deferred, "resource cancel requested");
    if !deferred {
        events::add_event_full(
            ctx.state,
            None,
            None,
            Some(&resource),
            Event::RESOURCE_CANCELED,
            "Resource canceled.",
        )
        .await;
    }
    Ok(ok_response(ctx.request))
}

/// Set-Resource-Attributes: only pending resources are mutable.
pub async fn set_resource_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let resource = match find_target_resource(ctx).await {
        Ok(resource) => resource,
        Err(response) => return Ok(response),
    };

    {
        let mut inner = resource.inner.write().await;
        if inner.state != ResourceState::Pending {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Only pending resources are settable.",
            ));
        }
        if let Some(group) = ctx.request.group(GroupTag::Resource) {
            for attr in group {
                if attr.value_tag() == platen_ipp::tag::DELETE_ATTRIBUTE {
                    inner.attrs.remove(&attr.name);
                } else {
                    inner.attrs.set(&attr.name, attr.values.clone());
                }
            }
        }
    }

    events::add_event_full(
        ctx.state,
        None,
        None,
        Some(&resource),
        Event::RESOURCE_CONFIG_CHANGED,
        "Resource attributes changed.",
    )
    .await;
    Ok(ok_response(ctx.request))
}

/// Copy resource description and status attributes into a response group.
async fn copy_resource_attributes(
    response: &mut Message,
    resource: &Resource,
    requested: Option<&std::collections::HashSet<String>>,
) {
    let inner = resource.inner.read().await;
    let want = |name: &str| requested.is_none_or(|set| set.contains(name));

    let group = response.new_group(GroupTag::Resource);
    if want("resource-id") {
        group.add("resource-id", Value::Integer(resource.id));
    }
    if want("resource-uuid") {
        group.add("resource-uuid", Value::Uri(resource.uuid.clone()));
    }
    if want("resource-type") {
        group.add("resource-type", Value::Keyword(inner.rtype.clone()));
    }
    if want("resource-state") {
        group.add("resource-state", Value::Enum(inner.state.value()));
    }
    if want("resource-use-count") {
        group.add("resource-use-count", Value::Integer(inner.use_count as i32));
    }
    if want("resource-format") {
        match &inner.format {
            Some(format) => group.add("resource-format", Value::MimeType(format.clone())),
            None => group.add(
                "resource-format",
                Value::OutOfBand(platen_ipp::tag::NO_VALUE),
            ),
        }
    }
    if want("date-time-at-creation") {
        group.add(
            "date-time-at-creation",
            Value::DateTime(ipp_date_time(resource.created)),
        );
    }
    for attr in &inner.attrs {
        if requested.is_none_or(|set| set.contains(&attr.name)) {
            group.push(attr.clone());
        }
    }
}

/// Get-Resource-Attributes.
pub async fn get_resource_attributes(ctx: &mut Ctx<'_>) -> Result<Message> {
    let resource = match find_target_resource(ctx).await {
        Ok(resource) => resource,
        Err(response) => return Ok(response),
    };
    let requested = requested_attributes(ctx.request);
    let mut response = ok_response(ctx.request);
    copy_resource_attributes(&mut response, &resource, requested.as_ref()).await;
    Ok(response)
}

/// Get-Resources: list with optional type/state filters and a limit.
pub async fn get_resources(ctx: &mut Ctx<'_>) -> Result<Message> {
    let requested = requested_attributes(ctx.request);
    let operation = ctx.request.operation();
    let type_filter = operation
        .and_then(|g| g.get_strings("resource-types").first().map(|s| s.to_string()));
    let limit = operation
        .and_then(|g| g.get_integer("limit"))
        .filter(|n| *n > 0)
        .map(|n| n as usize);

    let resources: Vec<Arc<Resource>> = {
        let all = ctx.state.resources.read().await;
        all.iter().cloned().collect()
    };

    let mut response = ok_response(ctx.request);
    let mut emitted = 0usize;
    for resource in resources {
        if let Some(filter) = &type_filter {
            if &resource.inner.read().await.rtype != filter {
                continue;
            }
        }
        if limit.is_some_and(|l| emitted >= l) {
            break;
        }
        copy_resource_attributes(&mut response, &resource, requested.as_ref()).await;
        emitted += 1;
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Printer allocation
// ---------------------------------------------------------------------------

/// Allocate-Printer-Resources: pin installed, non-template resources to a
/// printer.
pub async fn allocate_printer_resources(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let printer = ctx.target_printer()?;

    let Some(ids_attr) = ctx.request.operation().and_then(|g| g.find("resource-ids")) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing resource-ids."));
    };
    let ids: Vec<i32> = ids_attr.values.iter().filter_map(Value::as_integer).collect();

    for id in &ids {
        let Some(resource) = ctx.state.find_resource(*id).await else {
            return Ok(error_response(
                ctx.request,
                status::NOT_FOUND,
                &format!("Resource {id} does not exist."),
            ));
        };
        let inner = resource.inner.read().await;
        if inner.state != ResourceState::Installed {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                &format!("Resource {id} is not installed."),
            ));
        }
        if is_template_type(&inner.rtype) {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                &format!("Resource {id} is a template and cannot be allocated."),
            ));
        }
    }

    {
        let mut printer_inner = printer.inner.write().await;
        let new: Vec<i32> = ids
            .iter()
            .copied()
            .filter(|id| !printer_inner.resources.contains(id))
            .collect();
        if printer_inner.resources.len() + new.len() > ctx.state.config.max_resources_per_printer {
            return Ok(error_response(
                ctx.request,
                status::NOT_POSSIBLE,
                "Too many resources allocated to this printer.",
            ));
        }
        for id in new {
            printer_inner.resources.push(id);
            if let Some(resource) = ctx.state.find_resource(id).await {
                resource.inner.write().await.use_count += 1;
            }
        }
    }

    info!(printer = %printer.name, ?ids, "resources allocated");
    Ok(ok_response(ctx.request))
}

/// Deallocate-Printer-Resources: release allocations, applying deferred
/// cancels.
pub async fn deallocate_printer_resources(ctx: &mut Ctx<'_>) -> Result<Message> {
    ctx.require_admin()?;
    let printer = ctx.target_printer()?;

    let Some(ids_attr) = ctx.request.operation().and_then(|g| g.find("resource-ids")) else {
        return Ok(error_response(ctx.request, status::BAD_REQUEST, "Missing resource-ids."));
    };
    let ids: Vec<i32> = ids_attr.values.iter().filter_map(Value::as_integer).collect();

    let mut canceled = Vec::new();
    {
        let mut printer_inner = printer.inner.write().await;
        for id in &ids {
            if !printer_inner.resources.contains(id) {
                return Ok(error_response(
                    ctx.request,
                    status::NOT_POSSIBLE,
                    &format!("Resource {id} is not allocated to this printer."),
                ));
            }
            printer_inner.resources.retain(|r| r != id);
            if let Some(resource) = ctx.state.find_resource(*id).await {
                if resource.inner.write().await.release() {
                    canceled.push(resource);
                }
            }
        }
    }

    for resource in canceled {
        events::add_event_full(
            ctx.state,
            None,
            None,
            Some(&resource),
            Event::RESOURCE_CANCELED,
            "Resource canceled.",
        )
        .await;
    }
    Ok(ok_response(ctx.request))
}

/// Load a template resource's stored attribute set and merge it into
/// `target`, keeping only names listed in `supported` (when given), rows
/// known to the schema table, and names not already present.
pub async fn apply_template(
    resource: &Resource,
    target: &mut platen_ipp::Attributes,
    supported: Option<&platen_ipp::Attribute>,
    rows: &[crate::validate::ValueRow],
) -> Result<()> {
    let path = {
        let inner = resource.inner.read().await;
        inner
            .filename
            .clone()
            .ok_or_else(|| platen_core::PlatenError::NotPossible("template has no data".into()))?
    };

    let bytes = tokio::fs::read(&path).await?;
    let message = Message::parse(&bytes)
        .map_err(|e| platen_core::PlatenError::Server(format!("unreadable template: {e}")))?;

    for group in &message.groups {
        for attr in &group.attributes {
            if target.find(&attr.name).is_some() {
                continue;
            }
            if let Some(supported) = supported {
                if !supported.values.iter().filter_map(Value::as_str).any(|v| v == attr.name) {
                    continue;
                }
            }
            let allowed = rows.iter().any(|row| {
                row.name == attr.name
                    && (attr.value_tag() == row.tag || attr.value_tag() == row.alt_tag)
                    && (attr.values.len() == 1 || row.flags & crate::validate::F_1SETOF != 0)
            });
            if allowed {
                target.push(attr.clone());
            }
        }
    }
    Ok(())
}
