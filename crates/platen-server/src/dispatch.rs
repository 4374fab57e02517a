// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request triage and operation dispatch.
//
// Preconditions are checked in a fixed order before any handler runs:
// version, request-id, attribute group ordering, the three leading
// operation attributes (charset, natural language, target URI), target
// resolution, and the shutdown gate.  The target URI then selects either
// the printer-operation switch or the system-operation switch.

use std::sync::Arc;

use tracing::{debug, warn};

use platen_core::error::Result;
use platen_ipp::tag::{self, GroupTag};
use platen_ipp::{op, status, Message};

use crate::ops;
use crate::ops::error_response;
use crate::printer::Printer;
use crate::store::ServerState;

/// Per-request context handed to operation handlers.
pub struct Ctx<'a> {
    pub state: &'a Arc<ServerState>,
    pub request: &'a Message,
    /// Target printer resolved from the request URI (or printer-id).
    pub printer: Option<Arc<Printer>>,
    /// Authenticated username from the HTTP layer, if any.
    pub username: Option<String>,
    /// Host[:port] used when building printer and job URIs.
    pub host: String,
}

impl Ctx<'_> {
    /// The job owner name for created jobs: the authenticated identity
    /// wins; otherwise `requesting-user-name`; otherwise "anonymous".
    pub fn effective_username(&self) -> String {
        if let Some(user) = &self.username {
            return user.clone();
        }
        self.request
            .operation()
            .and_then(|g| g.get_string("requesting-user-name"))
            .unwrap_or("anonymous")
            .to_string()
    }

    pub fn target_printer(&self) -> Result<Arc<Printer>> {
        self.printer
            .clone()
            .ok_or_else(|| platen_core::PlatenError::NotFound("no target printer".into()))
    }

    /// Enforce the administrative policy for this request.
    pub fn require_admin(&self) -> Result<()> {
        crate::auth::authorize(
            &self.state.config,
            self.username.as_deref(),
            crate::auth::admin_policy(&self.state.config),
        )
    }
}

/// Resource path of a URI (`ipp://host:port/path` → `/path`).
fn uri_resource_path(uri: &str) -> Option<String> {
    let rest = uri.split_once("://").map(|(_, rest)| rest)?;
    let path_start = rest.find('/')?;
    let path = &rest[path_start..];
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Some(path.to_string())
}

/// Strip the job-id from a job-uri resource path to get the printer path.
///
/// faxout paths truncate at the fixed service prefix; print paths drop the
/// trailing `/<job-id>` segment.
fn job_uri_printer_path(resource: &str) -> Option<String> {
    if resource.starts_with("/ipp/faxout/") {
        return Some(resource[..11].to_string());
    }
    if let Some(rest) = resource.strip_prefix("/ipp/print/") {
        return Some(match rest.find('/') {
            Some(slash) => format!("/ipp/print/{}", &rest[..slash]),
            None => "/ipp/print".to_string(),
        });
    }
    None
}

/// Process one decoded IPP request end to end.
///
/// `Unauthorized`/`Forbidden` bubble to the HTTP layer as 401/403; every
/// other outcome is an IPP response message.
pub async fn process_request(
    state: &Arc<ServerState>,
    request: &Message,
    username: Option<String>,
    host: &str,
) -> Result<Message> {
    debug!(
        operation = op::name(request.code),
        request_id = request.request_id,
        version = ?request.version,
        groups = request.groups.len(),
        data_bytes = request.data.len(),
        "processing IPP request"
    );

    // 1. Version.
    let (major, minor) = request.version;
    if !(1..=2).contains(&major) {
        return Ok(error_response(
            request,
            status::VERSION_NOT_SUPPORTED,
            &format!("Bad request version number {major}.{minor}."),
        ));
    }

    // 2. Request id.
    if request.request_id == 0 {
        return Ok(error_response(request, status::BAD_REQUEST, "Bad request-id 0."));
    }

    if request.groups.iter().all(|g| g.attributes.is_empty()) {
        return Ok(error_response(request, status::BAD_REQUEST, "No attributes in request."));
    }

    // 3. Group tags must be non-decreasing (zero separators ignored).
    let mut last_group = GroupTag::Zero;
    for group in &request.groups {
        if group.tag == GroupTag::Zero {
            continue;
        }
        if group.tag < last_group {
            return Ok(error_response(
                request,
                status::BAD_REQUEST,
                "Attribute groups are out of order.",
            ));
        }
        last_group = group.tag;
    }

    // 4. First three operation attributes: charset, language, target URI.
    let empty = platen_ipp::Attributes::new();
    let operation = request.operation().unwrap_or(&empty);
    let mut leading = operation.iter();

    let charset = leading
        .next()
        .filter(|a| a.name == "attributes-charset" && a.value_tag() == tag::CHARSET);
    let language = leading.next().filter(|a| {
        a.name == "attributes-natural-language" && a.value_tag() == tag::NATURAL_LANGUAGE
    });
    let mut target = leading.next().filter(|a| {
        matches!(a.name.as_str(), "system-uri" | "printer-uri" | "job-uri")
            && a.value_tag() == tag::URI
    });

    if target.is_none() && state.config.relaxed_conformance {
        target = ["system-uri", "printer-uri", "job-uri"]
            .iter()
            .find_map(|name| operation.find_tagged(name, tag::URI));
        if target.is_some() {
            warn!("target URI was not the third operation attribute (RFC 8011 4.1.5)");
        }
    }

    if let Some(charset) = charset {
        let value = charset.values.first().and_then(|v| v.as_str()).unwrap_or("");
        if !value.eq_ignore_ascii_case("us-ascii") && !value.eq_ignore_ascii_case("utf-8") {
            return Ok(error_response(
                request,
                status::CHARSET_NOT_SUPPORTED,
                &format!("Unsupported character set \"{value}\"."),
            ));
        }
    }

    let (Some(_), Some(_), Some(target)) = (charset, language, target) else {
        return Ok(error_response(
            request,
            status::BAD_REQUEST,
            "Missing required attributes in request.",
        ));
    };

    // 5. Resolve the target object.
    let target_name = target.name.clone();
    let target_uri = target.values.first().and_then(|v| v.as_str()).unwrap_or("");
    let Some(resource) = uri_resource_path(target_uri) else {
        return Ok(error_response(
            request,
            status::ATTRIBUTES_OR_VALUES,
            &format!("Bad \"{target_name}\" value '{target_uri}'."),
        ));
    };

    let not_found =
        || error_response(request, status::NOT_FOUND, &format!("\"{target_name}\" '{target_uri}' not found."));

    let mut printer = None;
    let mut is_system = false;

    if target_name == "job-uri" {
        let Some(printer_path) = job_uri_printer_path(&resource) else {
            return Ok(not_found());
        };
        printer = state.find_printer(&printer_path).await;
        if printer.is_none() {
            return Ok(not_found());
        }
    } else {
        printer = state.find_printer(&resource).await;
        if printer.is_none() {
            if resource == "/ipp/system" {
                is_system = true;
            } else {
                return Ok(not_found());
            }
        }
    }

    // System requests may re-target a printer via printer-id.
    if is_system {
        if let Some(attr) = operation.find("printer-id") {
            let id = attr.values.first().and_then(|v| v.as_integer()).unwrap_or(0);
            if attr.values.len() != 1 || id <= 0 {
                let mut response =
                    error_response(request, status::BAD_REQUEST, "Bad printer-id attribute.");
                crate::validate::respond_unsupported(&mut response, attr);
                return Ok(response);
            }
            printer = state.find_printer_by_id(id).await;
            if printer.is_none() {
                return Ok(error_response(request, status::NOT_FOUND, "Unknown printer-id."));
            }
        }
    }

    // 6. Shutdown gate.
    if let Some(p) = &printer {
        let shutdown = p.inner.read().await.is_shutdown;
        if shutdown
            && request.code != op::STARTUP_PRINTER
            && request.code != op::STARTUP_ONE_PRINTER
        {
            return Ok(error_response(
                request,
                status::SERVICE_UNAVAILABLE,
                &format!("\"{}\" is shutdown.", p.name),
            ));
        }
    }

    let mut ctx = Ctx { state, request, printer, username, host: host.to_string() };

    if is_system {
        dispatch_system(&mut ctx).await
    } else {
        dispatch_printer(&mut ctx).await
    }
}

/// Printer-targeted operation switch.
async fn dispatch_printer(ctx: &mut Ctx<'_>) -> Result<Message> {
    let request = ctx.request;
    match request.code {
        op::PRINT_JOB => ops::jobs::print_job(ctx).await,
        op::PRINT_URI => ops::jobs::print_uri(ctx).await,
        op::VALIDATE_JOB => ops::jobs::validate_job(ctx).await,
        op::CREATE_JOB => ops::jobs::create_job(ctx).await,
        op::SEND_DOCUMENT => ops::jobs::send_document(ctx).await,
        op::SEND_URI => ops::jobs::send_uri(ctx).await,
        op::CANCEL_JOB => ops::jobs::cancel_job(ctx).await,
        op::CANCEL_CURRENT_JOB => ops::jobs::cancel_current_job(ctx).await,
        op::CANCEL_JOBS | op::CANCEL_MY_JOBS => ops::jobs::cancel_jobs(ctx).await,
        op::GET_JOB_ATTRIBUTES => ops::jobs::get_job_attributes(ctx).await,
        op::SET_JOB_ATTRIBUTES => ops::jobs::set_job_attributes(ctx).await,
        op::GET_JOBS => ops::jobs::get_jobs(ctx).await,
        op::CLOSE_JOB => ops::jobs::close_job(ctx).await,
        op::HOLD_JOB => ops::jobs::hold_job(ctx).await,
        op::RELEASE_JOB => ops::jobs::release_job(ctx).await,

        op::GET_PRINTER_ATTRIBUTES => ops::printers::get_printer_attributes(ctx).await,
        op::GET_PRINTER_SUPPORTED_VALUES => {
            ops::printers::get_printer_supported_values(ctx).await
        }
        op::SET_PRINTER_ATTRIBUTES => ops::printers::set_printer_attributes(ctx).await,
        op::HOLD_NEW_JOBS => ops::printers::hold_new_jobs(ctx).await,
        op::RELEASE_HELD_NEW_JOBS => ops::printers::release_held_new_jobs(ctx).await,
        op::IDENTIFY_PRINTER => ops::printers::identify_printer(ctx).await,
        op::SHUTDOWN_PRINTER => ops::printers::shutdown_printer(ctx).await,
        op::STARTUP_PRINTER => ops::printers::startup_printer(ctx).await,
        op::RESTART_PRINTER => ops::printers::restart_printer(ctx).await,
        op::DISABLE_PRINTER => ops::printers::disable_printer(ctx).await,
        op::ENABLE_PRINTER => ops::printers::enable_printer(ctx).await,
        op::PAUSE_PRINTER | op::PAUSE_PRINTER_AFTER_CURRENT_JOB => {
            ops::printers::pause_printer(ctx).await
        }
        op::RESUME_PRINTER => ops::printers::resume_printer(ctx).await,

        op::CANCEL_DOCUMENT => ops::documents::cancel_document(ctx).await,
        op::GET_DOCUMENT_ATTRIBUTES => ops::documents::get_document_attributes(ctx).await,
        op::GET_DOCUMENTS => ops::documents::get_documents(ctx).await,
        op::SET_DOCUMENT_ATTRIBUTES => ops::documents::set_document_attributes(ctx).await,
        op::VALIDATE_DOCUMENT => ops::documents::validate_document(ctx).await,

        op::CREATE_PRINTER_SUBSCRIPTIONS | op::CREATE_JOB_SUBSCRIPTIONS => {
            ops::subscriptions::create_subscriptions(ctx).await
        }
        op::CANCEL_SUBSCRIPTION => ops::subscriptions::cancel_subscription(ctx).await,
        op::RENEW_SUBSCRIPTION => ops::subscriptions::renew_subscription(ctx).await,
        op::GET_SUBSCRIPTION_ATTRIBUTES => {
            ops::subscriptions::get_subscription_attributes(ctx).await
        }
        op::GET_SUBSCRIPTIONS => ops::subscriptions::get_subscriptions(ctx).await,
        op::GET_NOTIFICATIONS => ops::subscriptions::get_notifications(ctx).await,

        op::ACKNOWLEDGE_DOCUMENT => ops::proxy::acknowledge_document(ctx).await,
        op::ACKNOWLEDGE_IDENTIFY_PRINTER => ops::proxy::acknowledge_identify_printer(ctx).await,
        op::ACKNOWLEDGE_JOB => ops::proxy::acknowledge_job(ctx).await,
        op::FETCH_DOCUMENT => ops::proxy::fetch_document(ctx).await,
        op::FETCH_JOB => ops::proxy::fetch_job(ctx).await,
        op::GET_OUTPUT_DEVICE_ATTRIBUTES => ops::proxy::get_output_device_attributes(ctx).await,
        op::UPDATE_ACTIVE_JOBS => ops::proxy::update_active_jobs(ctx).await,
        op::UPDATE_DOCUMENT_STATUS => ops::proxy::update_document_status(ctx).await,
        op::UPDATE_JOB_STATUS => ops::proxy::update_job_status(ctx).await,
        op::UPDATE_OUTPUT_DEVICE_ATTRIBUTES => {
            ops::proxy::update_output_device_attributes(ctx).await
        }
        op::DEREGISTER_OUTPUT_DEVICE => ops::proxy::deregister_output_device(ctx).await,

        op::ALLOCATE_PRINTER_RESOURCES => ops::resources::allocate_printer_resources(ctx).await,
        op::DEALLOCATE_PRINTER_RESOURCES => {
            ops::resources::deallocate_printer_resources(ctx).await
        }

        other => {
            warn!(operation = %format!("{other:#06x}"), "unsupported printer operation");
            Ok(error_response(
                request,
                status::OPERATION_NOT_SUPPORTED,
                "Operation not supported.",
            ))
        }
    }
}

/// System-targeted operation switch (`/ipp/system`).
async fn dispatch_system(ctx: &mut Ctx<'_>) -> Result<Message> {
    let request = ctx.request;
    match request.code {
        // The default printer answers Get-Printer-Attributes on the
        // system URI when one exists.
        op::GET_PRINTER_ATTRIBUTES => {
            if ctx.printer.is_none() {
                ctx.printer = ctx.state.default_printer().await;
            }
            match ctx.printer {
                Some(_) => ops::printers::get_printer_attributes(ctx).await,
                None => Ok(error_response(request, status::NOT_FOUND, "No default printer.")),
            }
        }

        op::GET_SYSTEM_ATTRIBUTES => ops::system::get_system_attributes(ctx).await,
        op::GET_SYSTEM_SUPPORTED_VALUES => ops::system::get_system_supported_values(ctx).await,
        op::SET_SYSTEM_ATTRIBUTES => ops::system::set_system_attributes(ctx).await,
        op::CREATE_PRINTER => ops::system::create_printer(ctx).await,
        op::DELETE_PRINTER => match ctx.printer {
            Some(_) => ops::system::delete_printer(ctx).await,
            None => Ok(error_response(request, status::BAD_REQUEST, "Missing printer-id.")),
        },
        op::GET_PRINTERS => ops::system::get_printers(ctx).await,
        op::RESTART_SYSTEM => ops::system::restart_system(ctx).await,
        op::DISABLE_ALL_PRINTERS => ops::system::disable_all_printers(ctx).await,
        op::ENABLE_ALL_PRINTERS => ops::system::enable_all_printers(ctx).await,
        op::PAUSE_ALL_PRINTERS | op::PAUSE_ALL_PRINTERS_AFTER_CURRENT_JOB => {
            ops::system::pause_all_printers(ctx).await
        }
        op::RESUME_ALL_PRINTERS => ops::system::resume_all_printers(ctx).await,
        op::SHUTDOWN_ALL_PRINTERS => ops::system::shutdown_all_printers(ctx).await,
        op::STARTUP_ALL_PRINTERS => ops::system::startup_all_printers(ctx).await,
        op::SHUTDOWN_ONE_PRINTER => match ctx.printer {
            Some(_) => ops::printers::shutdown_printer(ctx).await,
            None => Ok(error_response(request, status::BAD_REQUEST, "Missing printer-id.")),
        },
        op::STARTUP_ONE_PRINTER => match ctx.printer {
            Some(_) => ops::printers::startup_printer(ctx).await,
            None => Ok(error_response(request, status::BAD_REQUEST, "Missing printer-id.")),
        },

        op::CANCEL_RESOURCE => ops::resources::cancel_resource(ctx).await,
        op::CREATE_RESOURCE => ops::resources::create_resource(ctx).await,
        op::INSTALL_RESOURCE => ops::resources::install_resource(ctx).await,
        op::SEND_RESOURCE_DATA => ops::resources::send_resource_data(ctx).await,
        op::SET_RESOURCE_ATTRIBUTES => ops::resources::set_resource_attributes(ctx).await,
        op::GET_RESOURCE_ATTRIBUTES => ops::resources::get_resource_attributes(ctx).await,
        op::GET_RESOURCES => ops::resources::get_resources(ctx).await,

        op::CREATE_SYSTEM_SUBSCRIPTIONS | op::CREATE_RESOURCE_SUBSCRIPTIONS => {
            ops::subscriptions::create_subscriptions(ctx).await
        }
        op::CANCEL_SUBSCRIPTION => ops::subscriptions::cancel_subscription(ctx).await,
        op::RENEW_SUBSCRIPTION => ops::subscriptions::renew_subscription(ctx).await,
        op::GET_SUBSCRIPTION_ATTRIBUTES => {
            ops::subscriptions::get_subscription_attributes(ctx).await
        }
        op::GET_SUBSCRIPTIONS => ops::subscriptions::get_subscriptions(ctx).await,
        op::GET_NOTIFICATIONS => ops::subscriptions::get_notifications(ctx).await,

        op::REGISTER_OUTPUT_DEVICE => ops::proxy::register_output_device(ctx).await,

        other => {
            warn!(operation = %format!("{other:#06x}"), "unsupported system operation");
            Ok(error_response(
                request,
                status::OPERATION_NOT_SUPPORTED,
                "Operation not supported.",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_paths() {
        assert_eq!(
            uri_resource_path("ipp://h:631/ipp/print/office"),
            Some("/ipp/print/office".into())
        );
        assert_eq!(uri_resource_path("ipp://h/ipp/system"), Some("/ipp/system".into()));
        assert_eq!(uri_resource_path("not-a-uri"), None);
        assert_eq!(uri_resource_path("ipp://hostonly"), None);
    }

    #[test]
    fn job_uri_stripping() {
        assert_eq!(
            job_uri_printer_path("/ipp/print/office/42"),
            Some("/ipp/print/office".into())
        );
        assert_eq!(job_uri_printer_path("/ipp/print/42"), Some("/ipp/print".into()));
        assert_eq!(job_uri_printer_path("/ipp/print"), None);
        // faxout truncates at the service prefix.
        assert_eq!(job_uri_printer_path("/ipp/faxout/fax/7"), Some("/ipp/faxout".into()));
        assert_eq!(job_uri_printer_path("/other/x"), None);
    }
}
