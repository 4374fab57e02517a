// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The IPP server: TCP accept loop and minimal HTTP framing.
//
// IPP is transported over HTTP POST (RFC 8010 §3) with a
// `Content-Type: application/ipp` body.  We parse just enough HTTP to
// extract each POST body, keep the connection alive between requests, and
// answer with `200 OK` carrying the IPP response.  Authorization failures
// surface as bare 401/403 with no IPP body.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use platen_core::error::Result;
use platen_core::PlatenError;
use platen_ipp::{status, Message};

use crate::auth;
use crate::dispatch;
use crate::store::ServerState;

/// Maximum bytes accepted for one request (headers + body).
const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

/// Maximum bytes of HTTP headers.
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Parsed subset of an HTTP request head.
#[derive(Debug)]
struct HttpHead {
    method: String,
    content_length: usize,
    authorization: Option<String>,
    expect_continue: bool,
    keep_alive: bool,
}

/// Parse an HTTP request head (request line + headers).
fn parse_http_head(head: &str) -> Option<HttpHead> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let _path = parts.next()?;
    let version = parts.next()?;

    let mut content_length = 0;
    let mut authorization = None;
    let mut expect_continue = false;
    let mut keep_alive = version != "HTTP/1.0";

    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().ok()?;
        } else if name.eq_ignore_ascii_case("authorization") {
            authorization = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("expect") {
            expect_continue = value.eq_ignore_ascii_case("100-continue");
        } else if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("close") {
                keep_alive = false;
            } else if value.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }
    }

    Some(HttpHead { method, content_length, authorization, expect_continue, keep_alive })
}

/// The IPP server.
///
/// Binds a TCP listener and accepts connections; each connection is
/// handled serially in its own task until it closes.
pub struct IppServer {
    state: Arc<ServerState>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
    local_addr: Option<SocketAddr>,
}

impl IppServer {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            local_addr: None,
        }
    }

    /// The bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&mut self) -> Result<()> {
        let bind = format!("{}:{}", self.state.config.bind_address, self.state.config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| PlatenError::Server(format!("bind {bind}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PlatenError::Server(format!("local addr: {e}")))?;
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, "IPP server listening");

        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, state, shutdown, connections).await;
        });
        self.task_handle = Some(handle);
        Ok(())
    }

    /// Signal the accept loop to exit and await it.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown_signal.notify_one();
        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| PlatenError::Server(format!("task join: {e}")))?;
        }
        info!("IPP server stopped");
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        state: Arc<ServerState>,
        shutdown: Arc<Notify>,
        connections: Arc<AtomicU32>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming IPP connection");
                            let state = Arc::clone(&state);
                            let connections = Arc::clone(&connections);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = handle_connection(stream, peer_addr, state).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

/// Serve one connection: requests are processed serially to completion and
/// responses go back in request order.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<()> {
    let host = format!("{}:{}", state.config.server_name, state.config.port);
    let mut buf: Vec<u8> = Vec::with_capacity(8192);

    loop {
        // Read until the end of the HTTP head.
        let head_end = loop {
            if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            if buf.len() > MAX_HEADER_BYTES {
                send_plain(&mut stream, 431, "Request Header Fields Too Large", &[]).await?;
                return Ok(());
            }
            let mut chunk = [0u8; 8192];
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| PlatenError::Server(format!("read from {peer_addr}: {e}")))?;
            if n == 0 {
                // Clean close between requests.
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head_text = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let Some(head) = parse_http_head(&head_text) else {
            send_plain(&mut stream, 400, "Bad Request", &[]).await?;
            return Ok(());
        };

        if head.content_length > MAX_REQUEST_BYTES {
            send_plain(&mut stream, 413, "Payload Too Large", &[]).await?;
            return Ok(());
        }

        if head.expect_continue {
            stream
                .write_all(b"HTTP/1.1 100 Continue\r\n\r\n")
                .await
                .map_err(|e| PlatenError::Server(format!("write continue: {e}")))?;
        }

        // Read the body.
        while buf.len() < head_end + head.content_length {
            let mut chunk = [0u8; 8192];
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| PlatenError::Server(format!("read body from {peer_addr}: {e}")))?;
            if n == 0 {
                warn!(peer = %peer_addr, "connection closed mid-body");
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = buf[head_end..head_end + head.content_length].to_vec();
        // Keep any pipelined bytes for the next iteration.
        buf.drain(..head_end + head.content_length);

        if head.method != "POST" {
            send_plain(&mut stream, 405, "Method Not Allowed", &[("Allow", "POST")]).await?;
            if !head.keep_alive {
                return Ok(());
            }
            continue;
        }

        let username = head
            .authorization
            .as_deref()
            .and_then(|header| auth::verify_basic(&state.config, header));

        let response_bytes = match Message::parse(&body) {
            Ok(request) => {
                match dispatch::process_request(&state, &request, username, &host).await {
                    Ok(response) => {
                        debug!(
                            peer = %peer_addr,
                            operation = platen_ipp::op::name(request.code),
                            status = platen_ipp::status::name(response.code),
                            "IPP request handled"
                        );
                        response.encode()
                    }
                    Err(PlatenError::Unauthorized) => {
                        send_plain(
                            &mut stream,
                            401,
                            "Unauthorized",
                            &[("WWW-Authenticate", "Basic realm=\"platen\"")],
                        )
                        .await?;
                        if !head.keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                    Err(PlatenError::Forbidden) => {
                        send_plain(&mut stream, 403, "Forbidden", &[]).await?;
                        if !head.keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                    Err(err) => {
                        error!(peer = %peer_addr, error = %err, "internal error handling request");
                        let mut response =
                            Message::response(status::INTERNAL_ERROR, request.request_id);
                        response.set_status_message(&err.to_string());
                        response.encode()
                    }
                }
            }
            Err(parse_err) => {
                warn!(peer = %peer_addr, error = %parse_err, "malformed IPP request");
                let mut response = Message::response(status::BAD_REQUEST, 0);
                response.set_status_message(&format!("Malformed IPP request: {parse_err}"));
                response.encode()
            }
        };

        send_ipp(&mut stream, &response_bytes, head.keep_alive).await?;
        if !head.keep_alive {
            return Ok(());
        }
    }
}

/// Write an IPP response wrapped in HTTP.
async fn send_ipp(stream: &mut TcpStream, body: &[u8], keep_alive: bool) -> Result<()> {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/ipp\r\n\
         Content-Length: {}\r\n\
         Connection: {connection}\r\n\
         \r\n",
        body.len()
    );
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| PlatenError::Server(format!("write HTTP headers: {e}")))?;
    stream
        .write_all(body)
        .await
        .map_err(|e| PlatenError::Server(format!("write IPP body: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| PlatenError::Server(format!("flush: {e}")))?;
    Ok(())
}

/// Write a bodyless HTTP status response.
async fn send_plain(
    stream: &mut TcpStream,
    code: u16,
    reason: &str,
    extra_headers: &[(&str, &str)],
) -> Result<()> {
    let mut head = format!("HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\n");
    for (name, value) in extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| PlatenError::Server(format!("write HTTP status: {e}")))?;
    Ok(())
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::Printer;
    use platen_core::{JobState, ServerConfig, ServiceType};
    use platen_ipp::tag::GroupTag;
    use platen_ipp::{op, Value};

    // -- Fixtures -----------------------------------------------------------

    /// A server with one printer "p" and a temp spool directory.
    async fn fixture() -> (tempfile::TempDir, Arc<ServerState>, Arc<Printer>) {
        let spool = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.spool_dir = spool.path().to_path_buf();
        config.server_name = "h".into();

        let state = Arc::new(ServerState::new(config));
        let printer = Arc::new(Printer::new(
            state.next_printer_id(),
            "p",
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(Arc::clone(&printer)).await;
        (spool, state, printer)
    }

    /// Build a conforming request targeting the given URI.
    fn build_request(operation: u16, target_name: &str, uri: &str) -> Message {
        let mut msg = Message::request(operation, 1);
        let group = msg.new_group(GroupTag::Operation);
        group.add("attributes-charset", Value::Charset("utf-8".into()));
        group.add("attributes-natural-language", Value::Language("en".into()));
        group.add(target_name, Value::Uri(uri.into()));
        msg
    }

    fn printer_request(operation: u16) -> Message {
        build_request(operation, "printer-uri", "ipp://h/ipp/print/p")
    }

    async fn run(state: &Arc<ServerState>, request: &Message) -> Message {
        dispatch::process_request(state, request, None, "h:8631")
            .await
            .expect("request should produce an IPP response")
    }

    // -- Triage -------------------------------------------------------------

    #[tokio::test]
    async fn bad_version_is_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut request = printer_request(op::GET_PRINTER_ATTRIBUTES);
        request.version = (3, 0);
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::VERSION_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn zero_request_id_is_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut request = printer_request(op::GET_PRINTER_ATTRIBUTES);
        request.request_id = 0;
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_order_groups_are_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut request = Message::request(op::PRINT_JOB, 3);
        // Job group before the operation group.
        request.new_group(GroupTag::Job).add("copies", Value::Integer(1));
        let group = request.new_group(GroupTag::Operation);
        group.add("attributes-charset", Value::Charset("utf-8".into()));
        group.add("attributes-natural-language", Value::Language("en".into()));
        group.add("printer-uri", Value::Uri("ipp://h/ipp/print/p".into()));
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_charset_is_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut request = Message::request(op::GET_PRINTER_ATTRIBUTES, 4);
        let group = request.new_group(GroupTag::Operation);
        group.add("attributes-natural-language", Value::Language("en".into()));
        group.add("printer-uri", Value::Uri("ipp://h/ipp/print/p".into()));
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_charset_value_is_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut request = Message::request(op::GET_PRINTER_ATTRIBUTES, 4);
        let group = request.new_group(GroupTag::Operation);
        group.add("attributes-charset", Value::Charset("koi8-r".into()));
        group.add("attributes-natural-language", Value::Language("en".into()));
        group.add("printer-uri", Value::Uri("ipp://h/ipp/print/p".into()));
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::CHARSET_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn unknown_printer_is_not_found() {
        let (_spool, state, _printer) = fixture().await;
        let request =
            build_request(op::GET_PRINTER_ATTRIBUTES, "printer-uri", "ipp://h/ipp/print/nope");
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_operation_is_not_supported_without_side_effects() {
        let (_spool, state, printer) = fixture().await;
        let request = printer_request(0x3FFF);
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::OPERATION_NOT_SUPPORTED);
        assert!(printer.inner.read().await.jobs.is_empty());
    }

    // -- S1: Print-Job happy path ------------------------------------------

    #[tokio::test]
    async fn print_job_happy_path() {
        let (_spool, state, printer) = fixture().await;
        let mut request = printer_request(op::PRINT_JOB);
        request
            .group_mut(GroupTag::Operation)
            .add("document-format", Value::MimeType("application/pdf".into()));
        request.data = b"%PDF-1.7 minimal".to_vec();

        let response = run(&state, &request).await;
        assert_eq!(response.code, status::OK);

        let job_group = response.group(GroupTag::Job).expect("job group");
        assert_eq!(job_group.get_integer("job-id"), Some(1));
        assert_eq!(
            job_group.get_string("job-uri"),
            Some("ipp://h:8631/ipp/print/p/1")
        );
        let job_state = job_group.get_integer("job-state").expect("job-state");
        assert!(
            job_state == JobState::Pending.value() || job_state == JobState::Processing.value(),
            "job-state was {job_state}"
        );

        let job = printer.inner.read().await.jobs.get(&1).cloned().expect("job stored");
        assert_eq!(job.inner.read().await.format, "application/pdf");
    }

    // -- S2: Create-Job + Send-Document with detection ----------------------

    #[tokio::test]
    async fn create_job_then_send_document_detects_postscript() {
        let (_spool, state, printer) = fixture().await;

        let response = run(&state, &printer_request(op::CREATE_JOB)).await;
        assert_eq!(response.code, status::OK);
        let job_id = response
            .group(GroupTag::Job)
            .and_then(|g| g.get_integer("job-id"))
            .expect("job-id");

        let mut send = printer_request(op::SEND_DOCUMENT);
        {
            let group = send.group_mut(GroupTag::Operation);
            group.add("job-id", Value::Integer(job_id));
            group.add("last-document", Value::Boolean(true));
        }
        send.data = b"%!PS-Adobe-3.0\n".to_vec();

        let response = run(&state, &send).await;
        assert_eq!(response.code, status::OK);

        let job = printer
            .inner
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .expect("job");
        let inner = job.inner.read().await;
        assert_eq!(inner.format, "application/postscript");
        assert!(inner.filename.is_some(), "document must be spooled");
        assert_eq!(
            inner.doc_attrs.get_string("document-format-detected"),
            Some("application/postscript")
        );
    }

    #[tokio::test]
    async fn send_document_requires_last_document() {
        let (_spool, state, _printer) = fixture().await;
        let response = run(&state, &printer_request(op::CREATE_JOB)).await;
        let job_id = response
            .group(GroupTag::Job)
            .and_then(|g| g.get_integer("job-id"))
            .expect("job-id");

        let mut send = printer_request(op::SEND_DOCUMENT);
        send.group_mut(GroupTag::Operation).add("job-id", Value::Integer(job_id));
        send.data = b"data".to_vec();
        let response = run(&state, &send).await;
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);
    }

    // -- S3: cancel while held ----------------------------------------------

    #[tokio::test]
    async fn cancel_held_job_completes_and_notifies() {
        let (_spool, state, printer) = fixture().await;

        // A printer subscription for job events.
        let mut subscribe = printer_request(op::CREATE_PRINTER_SUBSCRIPTIONS);
        {
            let group = subscribe.new_group(GroupTag::Subscription);
            group.add("notify-pull-method", Value::Keyword("ippget".into()));
            group.add_all(
                "notify-events",
                vec![
                    Value::Keyword("job-completed".into()),
                    Value::Keyword("job-state-changed".into()),
                ],
            );
            group.add("notify-lease-duration", Value::Integer(60));
        }
        let response = run(&state, &subscribe).await;
        assert_eq!(response.code, status::OK);
        let sub_id = response
            .group(GroupTag::Subscription)
            .and_then(|g| g.get_integer("notify-subscription-id"))
            .expect("subscription id");

        // Held job.
        let mut create = printer_request(op::CREATE_JOB);
        create
            .group_mut(GroupTag::Operation)
            .add("job-hold-until", Value::Keyword("indefinite".into()));
        let response = run(&state, &create).await;
        let job_id = response
            .group(GroupTag::Job)
            .and_then(|g| g.get_integer("job-id"))
            .expect("job-id");

        let job = printer.inner.read().await.jobs.get(&job_id).cloned().expect("job");
        assert_eq!(job.inner.read().await.state, JobState::PendingHeld);

        // Cancel it.
        let mut cancel = printer_request(op::CANCEL_JOB);
        cancel.group_mut(GroupTag::Operation).add("job-id", Value::Integer(job_id));
        let response = run(&state, &cancel).await;
        assert_eq!(response.code, status::OK);

        {
            let inner = job.inner.read().await;
            assert_eq!(inner.state, JobState::Canceled);
            assert!(inner.completed.is_some(), "completed timestamp must be set");
        }
        // The job left the active queue (invariant 1 upkeep).
        assert!(printer.inner.read().await.active_jobs.is_empty());

        // The subscription saw the completion.
        let sub = state.find_subscription(sub_id).await.expect("subscription");
        let events: Vec<_> = sub.inner.read().await.events_since(1);
        assert!(
            events.iter().any(|e| {
                e.attrs.get_string("notify-subscribed-event") == Some("job-completed")
            }),
            "expected a job-completed notification"
        );
    }

    // -- S4: Get-Notifications with wait -------------------------------------

    #[tokio::test]
    async fn get_notifications_wait_wakes_on_new_event() {
        let (_spool, state, _printer) = fixture().await;

        let mut subscribe = printer_request(op::CREATE_PRINTER_SUBSCRIPTIONS);
        {
            let group = subscribe.new_group(GroupTag::Subscription);
            group.add("notify-pull-method", Value::Keyword("ippget".into()));
            group.add("notify-events", Value::Keyword("job-state-changed".into()));
            group.add("notify-lease-duration", Value::Integer(60));
        }
        let response = run(&state, &subscribe).await;
        let sub_id = response
            .group(GroupTag::Subscription)
            .and_then(|g| g.get_integer("notify-subscription-id"))
            .expect("subscription id");

        // Create a job shortly after the poll starts blocking.
        let submit_state = Arc::clone(&state);
        let submitter = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let mut print = printer_request(op::PRINT_JOB);
            print.data = b"%PDF-1.7 x".to_vec();
            run(&submit_state, &print).await
        });

        let mut poll = printer_request(op::GET_NOTIFICATIONS);
        {
            let group = poll.group_mut(GroupTag::Operation);
            group.add("notify-subscription-ids", Value::Integer(sub_id));
            group.add("notify-sequence-numbers", Value::Integer(1));
            group.add("notify-wait", Value::Boolean(true));
        }
        let response = run(&state, &poll).await;
        submitter.await.expect("submitter");

        assert_eq!(response.code, status::OK);
        let events: Vec<_> = response.groups_tagged(GroupTag::EventNotification).collect();
        assert!(!events.is_empty(), "expected at least one event group");
        assert_eq!(
            events[0].get_string("notify-subscribed-event"),
            Some("job-state-changed")
        );
        assert_eq!(events[0].get_integer("notify-sequence-number"), Some(1));
    }

    #[tokio::test]
    async fn push_subscriptions_are_rejected() {
        let (_spool, state, _printer) = fixture().await;
        let mut subscribe = printer_request(op::CREATE_PRINTER_SUBSCRIPTIONS);
        {
            let group = subscribe.new_group(GroupTag::Subscription);
            group.add(
                "notify-recipient-uri",
                Value::Uri("mailto:ops@example.com".into()),
            );
        }
        let response = run(&state, &subscribe).await;
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);
    }

    // -- S6: unsupported attribute value -------------------------------------

    #[tokio::test]
    async fn zero_copies_is_unsupported_and_creates_nothing() {
        let (_spool, state, printer) = fixture().await;
        let mut request = printer_request(op::PRINT_JOB);
        request.new_group(GroupTag::Job).add("copies", Value::Integer(0));
        request.data = b"%PDF-1.7 x".to_vec();

        let response = run(&state, &request).await;
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);

        let unsupported = response.group(GroupTag::Unsupported).expect("unsupported group");
        let copies = unsupported.find("copies").expect("copies copied out");
        assert_eq!(copies.values, vec![Value::Integer(0)]);

        assert!(printer.inner.read().await.jobs.is_empty(), "no job may be created");
    }

    // -- Printer state operations -------------------------------------------

    #[tokio::test]
    async fn pause_resume_cycle() {
        let (_spool, state, printer) = fixture().await;

        let response = run(&state, &printer_request(op::PAUSE_PRINTER)).await;
        assert_eq!(response.code, status::OK);
        {
            let inner = printer.inner.read().await;
            assert_eq!(inner.state, platen_core::PrinterState::Stopped);
            assert!(inner.reasons.contains(platen_core::PrinterReasons::PAUSED));
        }

        let response = run(&state, &printer_request(op::RESUME_PRINTER)).await;
        assert_eq!(response.code, status::OK);
        {
            let inner = printer.inner.read().await;
            assert_eq!(inner.state, platen_core::PrinterState::Idle);
            assert!(!inner.reasons.contains(platen_core::PrinterReasons::PAUSED));
        }
    }

    #[tokio::test]
    async fn shutdown_gates_requests_until_startup() {
        let (_spool, state, _printer) = fixture().await;

        let response = run(&state, &printer_request(op::SHUTDOWN_PRINTER)).await;
        assert_eq!(response.code, status::OK);

        let response = run(&state, &printer_request(op::GET_PRINTER_ATTRIBUTES)).await;
        assert_eq!(response.code, status::SERVICE_UNAVAILABLE);

        let response = run(&state, &printer_request(op::STARTUP_PRINTER)).await;
        assert_eq!(response.code, status::OK);

        let response = run(&state, &printer_request(op::GET_PRINTER_ATTRIBUTES)).await;
        assert_eq!(response.code, status::OK);
    }

    #[tokio::test]
    async fn get_printer_attributes_reports_capabilities() {
        let (_spool, state, _printer) = fixture().await;
        let response = run(&state, &printer_request(op::GET_PRINTER_ATTRIBUTES)).await;
        assert_eq!(response.code, status::OK);
        let group = response.group(GroupTag::Printer).expect("printer group");
        assert_eq!(group.get_string("printer-name"), Some("p"));
        assert_eq!(group.get_integer("printer-state"), Some(3));
        assert!(group.get_string("printer-uuid").is_some());
        assert!(group.contains_string("document-format-supported", "application/pdf"));
    }

    // -- System operations ---------------------------------------------------

    #[tokio::test]
    async fn create_and_delete_printer_via_system() {
        let (_spool, state, _printer) = fixture().await;

        let mut create = build_request(op::CREATE_PRINTER, "system-uri", "ipp://h/ipp/system");
        create
            .group_mut(GroupTag::Operation)
            .add("printer-name", Value::Name("lab".into()));
        let response = run(&state, &create).await;
        assert_eq!(response.code, status::OK);
        let printer_id = response
            .group(GroupTag::Printer)
            .and_then(|g| g.get_integer("printer-id"))
            .expect("printer-id");

        assert!(state.find_printer("/ipp/print/lab").await.is_some());

        // Duplicate name is refused.
        let response = run(&state, &create).await;
        assert_eq!(response.code, status::NOT_POSSIBLE);

        let mut delete = build_request(op::DELETE_PRINTER, "system-uri", "ipp://h/ipp/system");
        delete
            .group_mut(GroupTag::Operation)
            .add("printer-id", Value::Integer(printer_id));
        let response = run(&state, &delete).await;
        assert_eq!(response.code, status::OK);
        assert!(state.find_printer("/ipp/print/lab").await.is_none());
    }

    #[tokio::test]
    async fn get_printers_lists_every_printer() {
        let (_spool, state, _printer) = fixture().await;
        let request = build_request(op::GET_PRINTERS, "system-uri", "ipp://h/ipp/system");
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::OK);
        let groups: Vec<_> = response.groups_tagged(GroupTag::Printer).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].get_string("printer-name"), Some("p"));
    }

    #[tokio::test]
    async fn set_system_attributes_is_atomic() {
        let (_spool, state, _printer) = fixture().await;

        // One good and one badly typed attribute: nothing may change.
        let mut request =
            build_request(op::SET_SYSTEM_ATTRIBUTES, "system-uri", "ipp://h/ipp/system");
        {
            let group = request.new_group(GroupTag::System);
            group.add("system-location", Value::Text("attic".into()));
            group.add("system-name", Value::Integer(5));
        }
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::ATTRIBUTES_NOT_SETTABLE);
        assert!(state.system.read().await.attrs.find("system-location").is_none());

        // All-good request applies.
        let mut request =
            build_request(op::SET_SYSTEM_ATTRIBUTES, "system-uri", "ipp://h/ipp/system");
        request
            .new_group(GroupTag::System)
            .add("system-location", Value::Text("attic".into()));
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::OK);
        assert_eq!(
            state.system.read().await.attrs.get_string("system-location"),
            Some("attic".to_string()).as_deref()
        );
    }

    // -- Jobs listing --------------------------------------------------------

    #[tokio::test]
    async fn get_jobs_filters_my_jobs() {
        let (_spool, state, _printer) = fixture().await;

        for user in ["alice", "bob", "alice"] {
            let mut print = printer_request(op::PRINT_JOB);
            print
                .group_mut(GroupTag::Operation)
                .add("requesting-user-name", Value::Name(user.into()));
            print.data = b"%PDF-1.7 x".to_vec();
            // Hold them so they stay active and listable.
            print
                .group_mut(GroupTag::Operation)
                .add("job-hold-until", Value::Keyword("indefinite".into()));
            let response = run(&state, &print).await;
            assert_eq!(response.code, status::OK);
        }

        let mut list = printer_request(op::GET_JOBS);
        {
            let group = list.group_mut(GroupTag::Operation);
            group.add("my-jobs", Value::Boolean(true));
            group.add("requesting-user-name", Value::Name("alice".into()));
        }
        let response = run(&state, &list).await;
        let groups: Vec<_> = response.groups_tagged(GroupTag::Job).collect();
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn privacy_filter_hides_job_name_from_strangers() {
        // An admin group must be configured, otherwise administration (and
        // with it full job visibility) is open to everyone.
        let spool = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.spool_dir = spool.path().to_path_buf();
        config.admin_group = Some("wheel".into());
        let state = Arc::new(ServerState::new(config));
        let printer = Arc::new(Printer::new(
            state.next_printer_id(),
            "p",
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(Arc::clone(&printer)).await;

        let mut print = printer_request(op::PRINT_JOB);
        {
            let group = print.group_mut(GroupTag::Operation);
            group.add("requesting-user-name", Value::Name("alice".into()));
            group.add("job-name", Value::Name("payroll".into()));
        }
        print.data = b"%PDF-1.7 x".to_vec();
        let response = run(&state, &print).await;
        let job_id = response
            .group(GroupTag::Job)
            .and_then(|g| g.get_integer("job-id"))
            .expect("job-id");

        let mut get = printer_request(op::GET_JOB_ATTRIBUTES);
        {
            let group = get.group_mut(GroupTag::Operation);
            group.add("job-id", Value::Integer(job_id));
            group.add("requesting-user-name", Value::Name("mallory".into()));
        }
        let response = run(&state, &get).await;
        let group = response.group(GroupTag::Job).expect("job group");
        assert!(group.find("job-name").is_none(), "job-name must be private");
        assert_eq!(group.get_integer("job-id"), Some(job_id));

        // The owner still sees it.
        let mut get = printer_request(op::GET_JOB_ATTRIBUTES);
        {
            let group = get.group_mut(GroupTag::Operation);
            group.add("job-id", Value::Integer(job_id));
            group.add("requesting-user-name", Value::Name("alice".into()));
        }
        let response = run(&state, &get).await;
        let group = response.group(GroupTag::Job).expect("job group");
        assert_eq!(group.get_string("job-name"), Some("payroll"));
    }

    // -- HTTP framing ---------------------------------------------------------

    #[test]
    fn http_head_parsing() {
        let head = parse_http_head(
            "POST /ipp/print/p HTTP/1.1\r\nHost: h\r\nContent-Type: application/ipp\r\nContent-Length: 42\r\nAuthorization: Basic abc\r\n",
        )
        .expect("parse");
        assert_eq!(head.method, "POST");
        assert_eq!(head.content_length, 42);
        assert_eq!(head.authorization.as_deref(), Some("Basic abc"));
        assert!(head.keep_alive);
        assert!(!head.expect_continue);
    }

    #[test]
    fn http_10_defaults_to_close() {
        let head = parse_http_head("POST / HTTP/1.0\r\nContent-Length: 0\r\n").expect("parse");
        assert!(!head.keep_alive);
    }

    #[test]
    fn connection_close_is_honored() {
        let head =
            parse_http_head("POST / HTTP/1.1\r\nConnection: close\r\nContent-Length: 0\r\n")
                .expect("parse");
        assert!(!head.keep_alive);
    }

    #[test]
    fn find_subsequence_basic() {
        assert_eq!(find_subsequence(b"hello world", b"world"), Some(6));
        assert_eq!(find_subsequence(b"hello", b"xyz"), None);
        assert_eq!(find_subsequence(b"a\r\n\r\nb", b"\r\n\r\n"), Some(1));
    }

    // -- End-to-end over TCP --------------------------------------------------

    #[tokio::test]
    async fn tcp_round_trip_get_printer_attributes() {
        let spool = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.spool_dir = spool.path().to_path_buf();
        config.bind_address = "127.0.0.1".into();
        config.port = 0;
        config.server_name = "127.0.0.1".into();

        let state = Arc::new(ServerState::new(config));
        let printer = Arc::new(Printer::new(
            state.next_printer_id(),
            "p",
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(printer).await;

        let mut server = IppServer::new(Arc::clone(&state));
        server.start().await.expect("start");
        let addr = server.local_addr().expect("addr");

        let body = printer_request(op::GET_PRINTER_ATTRIBUTES).encode();
        let http = format!(
            "POST /ipp/print/p HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/ipp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(http.as_bytes()).await.expect("write head");
        stream.write_all(&body).await.expect("write body");

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.expect("read");
        let header_end = find_subsequence(&reply, b"\r\n\r\n").expect("header end") + 4;
        assert!(reply.starts_with(b"HTTP/1.1 200 OK"));

        let response = Message::parse(&reply[header_end..]).expect("IPP response");
        assert_eq!(response.code, status::OK);
        assert_eq!(
            response
                .group(GroupTag::Printer)
                .and_then(|g| g.get_string("printer-name")),
            Some("p")
        );

        server.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn tcp_malformed_body_yields_ipp_bad_request() {
        let spool = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.spool_dir = spool.path().to_path_buf();
        config.bind_address = "127.0.0.1".into();
        config.port = 0;

        let state = Arc::new(ServerState::new(config));
        let mut server = IppServer::new(Arc::clone(&state));
        server.start().await.expect("start");
        let addr = server.local_addr().expect("addr");

        let body = [0x02u8, 0x00]; // truncated header
        let http = format!(
            "POST /ipp/print/p HTTP/1.1\r\nContent-Type: application/ipp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(http.as_bytes()).await.expect("write");
        stream.write_all(&body).await.expect("write body");

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.expect("read");
        let header_end = find_subsequence(&reply, b"\r\n\r\n").expect("header end") + 4;
        let response = Message::parse(&reply[header_end..]).expect("IPP response");
        assert_eq!(response.code, status::BAD_REQUEST);

        server.stop().await.expect("stop");
    }

    // -- Concurrency ---------------------------------------------------------

    /// A burst of interleaved submissions, cancels, and queries must drain
    /// without deadlock while the single-processing-job rule holds.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_request_burst_keeps_invariants() {
        let (_spool, state, printer) = fixture().await;

        let mut tasks = Vec::new();
        for i in 0..10i32 {
            let task_state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                let mut print = printer_request(op::PRINT_JOB);
                print
                    .group_mut(GroupTag::Operation)
                    .add("requesting-user-name", Value::Name(format!("user{}", i % 3)));
                print.data = b"%PDF-1.7 burst".to_vec();
                run(&task_state, &print).await;
            }));
        }
        for i in 1..=10i32 {
            let task_state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                let mut cancel = printer_request(op::CANCEL_JOB);
                cancel.group_mut(GroupTag::Operation).add("job-id", Value::Integer(i));
                // Cancels may race creation; any IPP outcome is fine.
                run(&task_state, &cancel).await;
            }));
        }
        for _ in 0..10 {
            let task_state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                run(&task_state, &printer_request(op::GET_JOBS)).await;
                run(&task_state, &printer_request(op::GET_PRINTER_ATTRIBUTES)).await;
            }));
        }

        for task in tasks {
            tokio::time::timeout(std::time::Duration::from_secs(30), task)
                .await
                .expect("request task must not deadlock")
                .expect("join");
        }

        // Drain: every job reaches a terminal state.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(20);
        loop {
            let inner = printer.inner.read().await;

            // At most one job processes at a time, and processing_job
            // agrees with that job's state.
            let mut processing = 0usize;
            for job in inner.jobs.values() {
                if job.inner.read().await.state == JobState::Processing {
                    processing += 1;
                }
            }
            assert!(processing <= 1, "more than one job in processing");
            if let Some(id) = inner.processing_job {
                let job = inner.jobs.get(&id).expect("processing job exists");
                let job_state = job.inner.read().await.state;
                assert!(
                    matches!(job_state, JobState::Processing | JobState::ProcessingStopped),
                    "processing_job points at a job in state {job_state:?}"
                );
            }

            if inner.active_jobs.is_empty() {
                assert_eq!(inner.jobs.len(), 10, "all submissions must be recorded");
                break;
            }
            drop(inner);
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue failed to drain"
            );
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    // -- Unsupported attribute copying on validation ------------------------

    #[tokio::test]
    async fn validate_job_reports_bad_values_without_side_effects() {
        let (_spool, state, printer) = fixture().await;
        let mut request = printer_request(op::VALIDATE_JOB);
        request
            .new_group(GroupTag::Job)
            .add("media", Value::Keyword("iso_a0_841x1189mm".into()));
        let response = run(&state, &request).await;
        assert_eq!(response.code, status::ATTRIBUTES_OR_VALUES);
        assert!(printer.inner.read().await.jobs.is_empty());
    }
}
