// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transform subprocess execution.
//
// The transform command is invoked as `[command, spool_file]` with the
// inherited environment plus CONTENT_TYPE, DEVICE_URI, OUTPUT_TYPE,
// SERVER_LOGLEVEL, and one IPP_<NAME> entry per forwarded attribute.
// stdout carries printer-ready bytes (mode-dependent); stderr is a
// line-oriented sideband:
//
//   STATE: [+|-]keyword[,keyword...]   adjust state-reasons bit sets
//   ATTR: name=value [name=value...]   update job/printer attributes
//   anything else                      logged verbatim
//
// Lines longer than the 2 KiB bound are discarded whole rather than
// truncated, so attribute names never arrive clipped.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use platen_core::error::Result;
use platen_core::{JobReasons, JobState, PlatenError, PrinterReasons};
use platen_ipp::Value;

use crate::job::{spool_filename, Job};
use crate::printer::Printer;
use crate::store::ServerState;

/// Maximum sideband line length; longer lines are discarded.
const LINE_MAX: usize = 2048;

/// Maximum environment entries handed to the transform.
const ENV_MAX: usize = 1000;

/// Where the transform's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Job processing: the command delivers output itself; stdout is
    /// discarded.  ATTR: may update completed-impression counters.
    Command,
    /// Stream printer-ready bytes back to the requesting client.
    ToClient,
    /// Write printer-ready bytes to a second-generation spool file.
    ToFile,
    /// Discard output (validation runs).
    ToDiscard,
}

/// Result of a finished transform run.
pub struct TransformOutcome {
    /// Exit disposition: true on exit 0, or on SIGTERM death (the
    /// Stop-Job/cancel path is not a transform failure).
    pub success: bool,
    /// Collected stdout in `ToClient` mode.
    pub client_bytes: Vec<u8>,
    /// The output spool file in `ToFile` mode.
    pub output_file: Option<PathBuf>,
}

/// Run the transform command over a job's spool file.
pub async fn run_transform(
    state: &Arc<ServerState>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    command: &str,
    mode: TransformMode,
) -> Result<TransformOutcome> {
    let command_path = if command.starts_with('/') {
        PathBuf::from(command)
    } else {
        state.config.bin_dir.join(command)
    };

    let (spool, env, output_format) = {
        let printer_inner = printer.inner.read().await;
        let job_inner = job.inner.read().await;
        let spool = job_inner
            .filename
            .clone()
            .ok_or_else(|| PlatenError::Transform("job has no spool file".into()))?;
        let env = build_environment(state, &printer_inner, &job_inner)?;
        (spool, env, printer_inner.device_format.clone())
    };

    debug!(
        command = %command_path.display(),
        spool = %spool.display(),
        ?mode,
        "running transform command"
    );
    let started = std::time::Instant::now();

    let mut cmd = Command::new(&command_path);
    cmd.arg(&spool)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stderr(Stdio::piped());

    let mut output_file = None;
    match mode {
        TransformMode::ToClient => {
            cmd.stdout(Stdio::piped());
        }
        TransformMode::ToFile => {
            let format = output_format.as_deref().unwrap_or("application/octet-stream");
            let path = spool_filename(&state.config, &job.printer_name, job.id, format, Some("t"));
            let file = std::fs::File::create(&path)?;
            cmd.stdout(Stdio::from(file));
            output_file = Some(path);
        }
        TransformMode::Command | TransformMode::ToDiscard => {
            cmd.stdout(Stdio::null());
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| PlatenError::Transform(format!("unable to start \"{command}\": {e}")))?;

    if let Some(pid) = child.id() {
        job.inner.write().await.transform_pid = Some(pid);
    }

    // Drain stdout (ToClient) concurrently with the stderr sideband.
    let stdout_task = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut bytes = Vec::new();
            let _ = stdout.read_to_end(&mut bytes).await;
            bytes
        })
    });

    if let Some(stderr) = child.stderr.take() {
        read_sideband(state, printer, job, mode, stderr).await;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| PlatenError::Transform(format!("wait for \"{command}\": {e}")))?;

    job.inner.write().await.transform_pid = None;

    let client_bytes = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let elapsed = started.elapsed();
    let success = transform_success(&status);
    if success {
        info!(
            job_id = job.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "transform finished"
        );
    } else {
        error!(
            job_id = job.id,
            status = %status,
            "transform command failed"
        );
    }

    Ok(TransformOutcome { success, client_bytes, output_file })
}

/// Exit 0 succeeds; death by SIGTERM (Stop-Job / cancel) is not a failure.
fn transform_success(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.success() || status.signal() == Some(libc::SIGTERM)
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Whether a printer attribute is forwarded to the transform: `pwg-*` or a
/// `*-default` name.
fn forwarded_printer_attribute(name: &str) -> bool {
    name.starts_with("pwg-") || name.ends_with("-default")
}

/// `IPP_<UPPER_SNAKE>` environment name for an attribute.
fn env_name(attr_name: &str) -> String {
    let mut out = String::with_capacity(4 + attr_name.len());
    out.push_str("IPP_");
    for c in attr_name.chars() {
        if c == '-' {
            out.push('_');
        } else {
            out.push(c.to_ascii_uppercase());
        }
    }
    out
}

/// Build the transform environment: the inherited environment plus the
/// standard entries and IPP_* forwards: device attributes then printer
/// attributes (device wins), then document then job attributes (document
/// wins).
fn build_environment(
    state: &Arc<ServerState>,
    printer: &crate::printer::PrinterInner,
    job: &crate::job::JobInner,
) -> Result<Vec<(String, String)>> {
    let mut env: Vec<(String, String)> = std::env::vars().collect();

    env.push(("CONTENT_TYPE".into(), job.format.clone()));
    if let Some(device_uri) = &printer.device_uri {
        env.push(("DEVICE_URI".into(), device_uri.clone()));
    }
    if let Some(format) = &printer.device_format {
        env.push(("OUTPUT_TYPE".into(), format.clone()));
    }
    env.push((
        "SERVER_LOGLEVEL".into(),
        state.config.log_level.as_str().into(),
    ));

    for attr in &printer.dev_attrs {
        if forwarded_printer_attribute(&attr.name) {
            env.push((env_name(&attr.name), attr.values_wire_string()));
        }
    }
    for attr in &printer.attrs {
        if forwarded_printer_attribute(&attr.name) && printer.dev_attrs.find(&attr.name).is_none() {
            env.push((env_name(&attr.name), attr.values_wire_string()));
        }
    }
    for attr in &job.doc_attrs {
        env.push((env_name(&attr.name), attr.values_wire_string()));
    }
    for attr in &job.attrs {
        if job.doc_attrs.find(&attr.name).is_none() {
            env.push((env_name(&attr.name), attr.values_wire_string()));
        }
    }

    if env.len() > ENV_MAX {
        return Err(PlatenError::Transform(
            "too many environment variables to transform job".into(),
        ));
    }
    Ok(env)
}

// ---------------------------------------------------------------------------
// Sideband reading
// ---------------------------------------------------------------------------

/// Read the stderr sideband to EOF, assembling bounded lines.  Incomplete
/// trailing bytes survive between reads; overlong lines are discarded.
async fn read_sideband(
    state: &Arc<ServerState>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    mode: TransformMode,
    mut stderr: tokio::process::ChildStderr,
) {
    let mut line = Vec::with_capacity(LINE_MAX);
    let mut skipping = false;
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(job_id = job.id, error = %err, "transform stderr read failed");
                break;
            }
        };

        for &byte in &chunk[..n] {
            if byte == b'\n' {
                if skipping {
                    skipping = false;
                } else if !line.is_empty() {
                    let text = String::from_utf8_lossy(&line).into_owned();
                    process_sideband_line(state, printer, job, mode, &text).await;
                }
                line.clear();
            } else if skipping {
                // Discarding until the next newline.
            } else if line.len() >= LINE_MAX {
                warn!(job_id = job.id, "discarding overlong transform sideband line");
                line.clear();
                skipping = true;
            } else {
                line.push(byte);
            }
        }
    }

    if !line.is_empty() && !skipping {
        debug!(job_id = job.id, line = %String::from_utf8_lossy(&line), "transform stderr (unterminated)");
    }
}

async fn process_sideband_line(
    state: &Arc<ServerState>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    mode: TransformMode,
    text: &str,
) {
    if let Some(body) = text.strip_prefix("STATE:") {
        apply_state_message(printer, job, body).await;
    } else if let Some(body) = text.strip_prefix("ATTR:") {
        apply_attr_message(state, printer, job, mode, body).await;
    } else {
        debug!(job_id = job.id, line = %text, "transform stderr");
    }
}

// ---------------------------------------------------------------------------
// STATE: messages
// ---------------------------------------------------------------------------

/// Parsed effect of one STATE: line.
#[derive(Debug, PartialEq, Eq)]
pub struct StateUpdate {
    pub job_reasons: JobReasons,
    pub printer_reasons: PrinterReasons,
    /// A keyword carried an `-error` suffix: the job aborts.
    pub abort: bool,
}

/// Interpret a STATE: message body against the current reason sets.
///
/// `-keyword` removes, `+keyword` adds; a bare keyword list replaces the
/// printer set with exactly the named bits while job reasons remain
/// add-only.  Job keywords match before suffix stripping; `-report` and
/// `-warning` suffixes strip to the base printer keyword, `-error`
/// additionally aborts the job.
pub fn parse_state_message(
    body: &str,
    current_job: JobReasons,
    current_printer: PrinterReasons,
) -> StateUpdate {
    let body = body.trim_start_matches([' ', '\t']);

    let (remove, mut job_reasons, mut printer_reasons, rest) = match body.as_bytes().first() {
        Some(b'-') => (true, current_job, current_printer, &body[1..]),
        Some(b'+') => (false, current_job, current_printer, &body[1..]),
        _ => (false, current_job, PrinterReasons::empty(), body),
    };

    let mut abort = false;
    for keyword in rest.split(',') {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            continue;
        }

        // Job reasons match the keyword as written, before suffix strip.
        if let Some(bit) = JobReasons::from_keyword(keyword) {
            if remove {
                job_reasons -= bit;
            } else {
                job_reasons |= bit;
            }
        }

        let base = if let Some(base) = keyword.strip_suffix("-error") {
            abort = true;
            base
        } else if let Some(base) = keyword.strip_suffix("-report") {
            base
        } else if let Some(base) = keyword.strip_suffix("-warning") {
            base
        } else {
            keyword
        };

        if let Some(bit) = PrinterReasons::from_keyword(base) {
            if remove {
                printer_reasons -= bit;
            } else {
                printer_reasons |= bit;
            }
        }
    }

    StateUpdate { job_reasons, printer_reasons, abort }
}

async fn apply_state_message(printer: &Arc<Printer>, job: &Arc<Job>, body: &str) {
    let mut printer_inner = printer.inner.write().await;
    let mut job_inner = job.inner.write().await;

    let update = parse_state_message(body, job_inner.reasons, printer_inner.reasons);
    job_inner.reasons = update.job_reasons;
    printer_inner.reasons = update.printer_reasons;
    if update.abort && !job_inner.state.is_terminal() {
        job_inner.state = JobState::Aborted;
    }
}

// ---------------------------------------------------------------------------
// ATTR: messages
// ---------------------------------------------------------------------------

/// Decode a %XX-escaped string.
fn url_unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse an ATTR: body into name=value pairs (values %XX-unescaped).
pub fn parse_attr_pairs(body: &str) -> Vec<(String, String)> {
    body.split_whitespace()
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), url_unescape(value)))
        })
        .collect()
}

/// A comma-separated ATTR: value becomes a 1setOf; each element parses as
/// an integer when it can.
fn attr_values(raw: &str) -> Vec<Value> {
    raw.split(',')
        .map(|part| match part.parse::<i32>() {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Text(part.to_string()),
        })
        .collect()
}

async fn apply_attr_message(
    state: &Arc<ServerState>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    mode: TransformMode,
    body: &str,
) {
    let pairs = parse_attr_pairs(body);
    let mut printer_changed = false;

    for (name, value) in pairs {
        match name.as_str() {
            "job-impressions" => {
                if let Ok(n) = value.parse::<i32>() {
                    job.inner.write().await.impressions = n;
                }
            }
            "job-impressions-completed" if mode == TransformMode::Command => {
                if let Ok(n) = value.parse::<i32>() {
                    let mut inner = job.inner.write().await;
                    // Monotonic until the job terminates.
                    if n >= inner.impressions_completed {
                        inner.impressions_completed = n;
                    }
                }
            }
            "job-impressions-col" | "job-media-sheets" | "job-media-sheets-col" | "job-pages"
            | "job-pages-col" => {
                let mut inner = job.inner.write().await;
                inner.attrs.set(&name, attr_values(&value));
            }
            "job-impressions-completed-col" | "job-media-sheets-completed"
            | "job-media-sheets-completed-col" | "job-pages-completed"
            | "job-pages-completed-col"
                if mode == TransformMode::Command =>
            {
                let mut inner = job.inner.write().await;
                inner.attrs.set(&name, attr_values(&value));
            }
            _ if name.starts_with("marker-")
                || name == "printer-alert"
                || name == "printer-supply"
                || name == "printer-supply-description" =>
            {
                let mut inner = printer.inner.write().await;
                inner.attrs.set(&name, attr_values(&value));
                printer_changed = true;
            }
            _ => {
                debug!(job_id = job.id, attr = %name, "ignoring transform attribute");
            }
        }
    }

    if printer_changed {
        crate::events::add_event(
            state,
            Some(printer),
            None,
            crate::events::Event::PRINTER_CONFIG_CHANGED,
            "Supply levels updated.",
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_suffixes_strip_for_printer_reasons() {
        // The S5 shape: a -warning suffix maps to the base keyword.
        let update = parse_state_message(
            " +media-empty-warning,paused",
            JobReasons::empty(),
            PrinterReasons::empty(),
        );
        assert!(update.printer_reasons.contains(PrinterReasons::MEDIA_EMPTY));
        assert!(update.printer_reasons.contains(PrinterReasons::PAUSED));
        assert!(!update.abort);
    }

    #[test]
    fn state_error_suffix_aborts() {
        let update = parse_state_message(
            "+media-jam-error",
            JobReasons::empty(),
            PrinterReasons::empty(),
        );
        assert!(update.abort);
        assert!(update.printer_reasons.contains(PrinterReasons::MEDIA_JAM));
    }

    #[test]
    fn state_minus_removes_from_both_sets() {
        let update = parse_state_message(
            "-media-empty,job-printing",
            JobReasons::JOB_PRINTING | JobReasons::JOB_QUEUED,
            PrinterReasons::MEDIA_EMPTY | PrinterReasons::PAUSED,
        );
        assert_eq!(update.job_reasons, JobReasons::JOB_QUEUED);
        assert_eq!(update.printer_reasons, PrinterReasons::PAUSED);
    }

    #[test]
    fn state_bare_list_replaces_printer_reasons_only() {
        let update = parse_state_message(
            "media-low",
            JobReasons::JOB_PRINTING,
            PrinterReasons::PAUSED | PrinterReasons::MEDIA_EMPTY,
        );
        // Printer set replaced with exactly the new bits.
        assert_eq!(update.printer_reasons, PrinterReasons::MEDIA_LOW);
        // Job reasons stay additive.
        assert!(update.job_reasons.contains(JobReasons::JOB_PRINTING));
    }

    #[test]
    fn state_job_keywords_match_before_stripping() {
        let update = parse_state_message(
            "+job-stopped",
            JobReasons::empty(),
            PrinterReasons::empty(),
        );
        assert!(update.job_reasons.contains(JobReasons::JOB_STOPPED));
        assert!(update.printer_reasons.is_empty());
    }

    #[test]
    fn attr_pairs_unescape_values() {
        let pairs = parse_attr_pairs(" job-impressions=5 printer-alert=code%3DmediaLow%20group%3Dinput");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("job-impressions".into(), "5".into()));
        assert_eq!(
            pairs[1],
            ("printer-alert".into(), "code=mediaLow group=input".into())
        );
    }

    #[test]
    fn attr_pairs_skip_malformed_entries() {
        let pairs = parse_attr_pairs("novalue =orphan ok=1");
        assert_eq!(pairs, vec![("ok".to_string(), "1".to_string())]);
    }

    #[test]
    fn attr_values_split_comma_sets() {
        let values = attr_values("1,2,3");
        assert_eq!(
            values,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        let values = attr_values("levels");
        assert_eq!(values, vec![Value::Text("levels".into())]);
    }

    #[test]
    fn env_names_uppercase_and_underscore() {
        assert_eq!(env_name("media-default"), "IPP_MEDIA_DEFAULT");
        assert_eq!(env_name("pwg-raster-document-sheet-back"), "IPP_PWG_RASTER_DOCUMENT_SHEET_BACK");
        assert_eq!(env_name("copies"), "IPP_COPIES");
    }

    #[test]
    fn forwarded_printer_attributes() {
        assert!(forwarded_printer_attribute("media-default"));
        assert!(forwarded_printer_attribute("pwg-raster-document-type-supported"));
        assert!(!forwarded_printer_attribute("media-supported"));
        assert!(!forwarded_printer_attribute("printer-name"));
    }

    #[test]
    fn url_unescape_handles_partial_escapes() {
        assert_eq!(url_unescape("a%20b"), "a b");
        assert_eq!(url_unescape("trailing%2"), "trailing%2");
        assert_eq!(url_unescape("%zz"), "%zz");
        assert_eq!(url_unescape("plain"), "plain");
    }

    // -- Subprocess end to end ------------------------------------------------

    use crate::printer::Printer;
    use crate::store::ServerState;
    use platen_core::{ServerConfig, ServiceType};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    /// Server state, printer, and a job with a spooled document, plus an
    /// executable script to run as the transform.
    async fn fixture(script: &str) -> (tempfile::TempDir, Arc<ServerState>, Arc<Printer>, Arc<Job>, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.spool_dir = dir.path().to_path_buf();
        let state = Arc::new(ServerState::new(config));

        let printer = Arc::new(Printer::new(
            1,
            "p",
            ServiceType::Print,
            &state.config,
        ));
        let job = Arc::new(Job::for_tests(1, 1, "p", 50));

        let spool = dir.path().join("p-1.pdf");
        std::fs::write(&spool, b"%PDF-1.7 data").expect("spool");
        job.inner.write().await.filename = Some(spool);

        let script_path = dir.path().join("transform.sh");
        std::fs::write(&script_path, script).expect("script");
        let mut perms = std::fs::metadata(&script_path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).expect("chmod");

        let command = script_path.to_string_lossy().into_owned();
        (dir, state, printer, job, command)
    }

    #[tokio::test]
    async fn sideband_updates_job_and_printer() {
        let script = "#!/bin/sh\n\
                      echo 'STATE: +media-empty-warning,paused' 1>&2\n\
                      echo 'ATTR: job-impressions=3 job-impressions-completed=3' 1>&2\n\
                      exit 0\n";
        let (_dir, state, printer, job, command) = fixture(script).await;

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::Command)
            .await
            .expect("transform runs");
        assert!(outcome.success);

        let printer_inner = printer.inner.read().await;
        assert!(printer_inner.reasons.contains(PrinterReasons::MEDIA_EMPTY));
        assert!(printer_inner.reasons.contains(PrinterReasons::PAUSED));

        let job_inner = job.inner.read().await;
        assert_eq!(job_inner.impressions, 3);
        assert_eq!(job_inner.impressions_completed, 3);
        assert_eq!(job_inner.transform_pid, None);
    }

    #[tokio::test]
    async fn error_suffix_aborts_the_job() {
        let script = "#!/bin/sh\n\
                      echo 'STATE: +media-jam-error' 1>&2\n\
                      exit 0\n";
        let (_dir, state, printer, job, command) = fixture(script).await;

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::Command)
            .await
            .expect("transform runs");
        assert!(outcome.success, "exit 0 is still a clean exit");
        assert_eq!(job.inner.read().await.state, JobState::Aborted);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let script = "#!/bin/sh\nexit 3\n";
        let (_dir, state, printer, job, command) = fixture(script).await;

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::Command)
            .await
            .expect("transform runs");
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn sigterm_death_is_not_a_failure() {
        let script = "#!/bin/sh\nkill -TERM $$\n";
        let (_dir, state, printer, job, command) = fixture(script).await;

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::Command)
            .await
            .expect("transform runs");
        assert!(outcome.success, "SIGTERM is the Stop-Job path");
    }

    #[tokio::test]
    async fn to_client_mode_collects_stdout() {
        let script = "#!/bin/sh\nprintf 'rendered-bytes'\n";
        let (_dir, state, printer, job, command) = fixture(script).await;

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::ToClient)
            .await
            .expect("transform runs");
        assert!(outcome.success);
        assert_eq!(outcome.client_bytes, b"rendered-bytes");
    }

    #[tokio::test]
    async fn environment_carries_ipp_variables() {
        // The script proves the env by reflecting it into the sideband.
        let script = "#!/bin/sh\n\
                      echo \"ATTR: job-impressions=$IPP_COPIES\" 1>&2\n\
                      [ \"$CONTENT_TYPE\" = application/octet-stream ] || exit 9\n\
                      exit 0\n";
        let (_dir, state, printer, job, command) = fixture(script).await;
        job.inner
            .write()
            .await
            .attrs
            .set("copies", vec![Value::Integer(7)]);

        let outcome = run_transform(&state, &printer, &job, &command, TransformMode::Command)
            .await
            .expect("transform runs");
        assert!(outcome.success, "CONTENT_TYPE must be forwarded");
        assert_eq!(job.inner.read().await.impressions, 7);
    }
}
