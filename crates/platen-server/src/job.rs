// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Job object and the job engine.
//
// Jobs are created by the job-submission handlers, spool a single document
// to disk, and are picked up by the scheduler (`check_jobs`) which runs the
// transform command over the spool file.  All state transitions funnel
// through `finish_job` / the printer's `finalize_job_state` hook so that
// the one-processing-job-per-printer invariant holds.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use platen_core::{spool_extension, JobReasons, JobState, PrinterState, ServerConfig};
use platen_ipp::Attributes;

use crate::events::{self, Event};
use crate::printer::Printer;
use crate::store::ServerState;
use crate::transform::{self, TransformMode};

/// Mutable job state, guarded by the job's lock.
pub struct JobInner {
    pub state: JobState,
    pub reasons: JobReasons,
    /// Job Template and Description attributes approved at creation.
    pub attrs: Attributes,
    /// Document attributes for the single document.
    pub doc_attrs: Attributes,
    /// Effective document format (MIME media type).
    pub format: String,
    pub filename: Option<PathBuf>,
    /// True while the spool file is still receiving data.
    pub spool_open: bool,
    pub name: String,
    pub username: String,
    pub priority: i32,
    /// SHA-256 of the received document bytes.
    pub sha256: Option<String>,
    pub impressions: i32,
    pub impressions_completed: i32,
    pub cancel_requested: bool,
    pub hold_until_keyword: Option<String>,
    pub hold_until_time: Option<DateTime<Utc>>,
    /// Held because the printer had hold-new-jobs set at creation; these
    /// are the jobs Release-Held-New-Jobs releases.
    pub held_by_printer: bool,
    pub processing: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub transform_pid: Option<u32>,
    /// Output device this job was acknowledged by (proxy protocol).
    pub dev_uuid: Option<String>,
    pub dev_state: Option<JobState>,
    pub dev_reasons: JobReasons,
    pub dev_message: Option<String>,
}

/// A print job.  Owned by exactly one printer.
pub struct Job {
    pub id: i32,
    pub uuid: String,
    pub printer_id: i32,
    pub printer_name: String,
    pub created: DateTime<Utc>,
    /// Priority mirror for lock-free active-queue ordering.
    priority: AtomicI32,
    pub inner: RwLock<JobInner>,
}

impl Job {
    pub fn new(
        id: i32,
        printer_id: i32,
        printer_name: &str,
        name: &str,
        username: &str,
        priority: i32,
    ) -> Self {
        Self {
            id,
            uuid: format!("urn:uuid:{}", Uuid::new_v4()),
            printer_id,
            printer_name: printer_name.to_string(),
            created: Utc::now(),
            priority: AtomicI32::new(priority),
            inner: RwLock::new(JobInner {
                state: JobState::Pending,
                reasons: JobReasons::JOB_INCOMING,
                attrs: Attributes::new(),
                doc_attrs: Attributes::new(),
                format: "application/octet-stream".into(),
                filename: None,
                spool_open: false,
                name: name.to_string(),
                username: username.to_string(),
                priority,
                sha256: None,
                impressions: 0,
                impressions_completed: 0,
                cancel_requested: false,
                hold_until_keyword: None,
                hold_until_time: None,
                held_by_printer: false,
                processing: None,
                completed: None,
                transform_pid: None,
                dev_uuid: None,
                dev_state: None,
                dev_reasons: JobReasons::empty(),
                dev_message: None,
            }),
        }
    }

    pub fn cached_priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_cached_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn for_tests(id: i32, printer_id: i32, printer_name: &str, priority: i32) -> Self {
        Self::new(id, printer_id, printer_name, "test", "anonymous", priority)
    }
}

impl JobInner {
    /// Whether a pending-held job may be scheduled now.
    pub fn hold_expired(&self) -> bool {
        match (&self.hold_until_keyword, &self.hold_until_time) {
            (Some(keyword), _) if keyword == "indefinite" => false,
            (_, Some(time)) => *time <= Utc::now(),
            (Some(keyword), None) => keyword == "no-hold",
            (None, None) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Spool files and format detection
// ---------------------------------------------------------------------------

/// Spool path for a job document: `{spool}/{printer}-{jobid}.{ext}`.
///
/// `generation` distinguishes transform output from the received document
/// (`{printer}-{jobid}-t.{ext}`).
pub fn spool_filename(
    config: &ServerConfig,
    printer_name: &str,
    job_id: i32,
    format: &str,
    generation: Option<&str>,
) -> PathBuf {
    let ext = spool_extension(format);
    let name = match generation {
        Some(suffix) => format!("{printer_name}-{job_id}-{suffix}.{ext}"),
        None => format!("{printer_name}-{job_id}.{ext}"),
    };
    config.spool_dir.join(name)
}

/// Auto-detect the document format from the first 8 bytes.
pub fn detect_format(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if header.starts_with(b"%!") {
        Some("application/postscript")
    } else if header.len() >= 4
        && header.starts_with(&[0xFF, 0xD8, 0xFF])
        && (0xE0..=0xEF).contains(&header[3])
    {
        Some("image/jpeg")
    } else if header.starts_with(b"\x89PNG") {
        Some("image/png")
    } else if header.starts_with(b"RAS2") {
        Some("image/pwg-raster")
    } else if header.starts_with(b"UNIRAST") && header.len() >= 8 {
        Some("image/urf")
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Re-evaluate a printer's queue: if it is accepting, not stopped, and has
/// no processing job, promote the best schedulable pending job.
///
/// On a printer with registered output devices and no local transform
/// command, promotion means marking the job fetchable for the proxy
/// instead of processing it here.
// Returns a boxed future (rather than being declared `async fn`) to break
// the recursive Send-inference cycle with `process_job`: `check_jobs` spawns
// `process_job`, which calls back into `check_jobs` on completion. Through
// an opaque `async fn` return type that cycle cannot be proven `Send`; a
// concrete `dyn Future + Send` return type breaks it.
pub fn check_jobs<'a>(
    state: &'a Arc<ServerState>,
    printer: &'a Arc<Printer>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(check_jobs_inner(state, printer))
}

async fn check_jobs_inner(state: &Arc<ServerState>, printer: &Arc<Printer>) {
    enum Promotion {
        Process(Arc<Job>),
        Fetchable(Arc<Job>),
    }

    let promotion = {
        let mut inner = printer.inner.write().await;
        if !inner.is_accepting
            || inner.state == PrinterState::Stopped
            || inner.is_shutdown
            || inner.is_deleted
            || inner.processing_job.is_some()
        {
            return;
        }
        let proxied = !inner.devices.is_empty() && inner.command.is_none();

        // active_jobs is already priority-then-id ordered.  A job is
        // schedulable once it is pending, unheld, and its document has
        // finished spooling.
        let mut candidate = None;
        for job in inner.active_jobs.clone() {
            let job_inner = job.inner.read().await;
            if job_inner.state == JobState::Pending
                && job_inner.hold_expired()
                && job_inner.filename.is_some()
                && !job_inner.spool_open
                && (!proxied || !job_inner.reasons.contains(JobReasons::JOB_FETCHABLE))
            {
                candidate = Some(Arc::clone(&job));
                break;
            }
        }

        let Some(job) = candidate else { return };

        if proxied {
            let mut job_inner = job.inner.write().await;
            job_inner.reasons |= JobReasons::JOB_FETCHABLE;
            Promotion::Fetchable(Arc::clone(&job))
        } else {
            {
                let mut job_inner = job.inner.write().await;
                job_inner.state = JobState::Processing;
                job_inner.processing = Some(Utc::now());
                job_inner.reasons -= JobReasons::JOB_QUEUED | JobReasons::JOB_INCOMING;
                job_inner.reasons |= JobReasons::JOB_PRINTING;
            }
            inner.processing_job = Some(job.id);
            inner.state = PrinterState::Processing;
            inner.state_time = Utc::now();
            Promotion::Process(job)
        }
    };

    match promotion {
        Promotion::Fetchable(job) => {
            info!(printer = %printer.name, job_id = job.id, "job available for fetch");
            events::add_event(
                state,
                Some(printer),
                Some(&job),
                Event::JOB_FETCHABLE,
                "Job fetchable.",
            )
            .await;
        }
        Promotion::Process(job) => {
            info!(printer = %printer.name, job_id = job.id, "job scheduled for processing");
            events::add_event(
                state,
                Some(printer),
                Some(&job),
                Event::JOB_STATE_CHANGED,
                "Job processing.",
            )
            .await;

            let state = Arc::clone(state);
            let printer = Arc::clone(printer);
            tokio::spawn(async move {
                process_job(&state, &printer, &job).await;
            });
        }
    }
}

/// Process one job: run the transform command over the spool file, or
/// simulate printing when no command is configured.
async fn process_job(state: &Arc<ServerState>, printer: &Arc<Printer>, job: &Arc<Job>) {
    let command = printer.inner.read().await.command.clone();

    let failed = match command {
        Some(command) => {
            {
                let mut inner = job.inner.write().await;
                inner.reasons |= JobReasons::JOB_TRANSFORMING;
            }
            let result =
                transform::run_transform(state, printer, job, &command, TransformMode::Command)
                    .await;
            {
                let mut inner = job.inner.write().await;
                inner.reasons -= JobReasons::JOB_TRANSFORMING;
            }
            match result {
                Ok(outcome) => !outcome.success,
                Err(err) => {
                    error!(job_id = job.id, error = %err, "transform failed to run");
                    true
                }
            }
        }
        None => {
            // No transform configured: consume the document locally so the
            // pipeline is observable end to end.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let mut inner = job.inner.write().await;
            if inner.impressions == 0 {
                inner.impressions = 1;
            }
            inner.impressions_completed = inner.impressions;
            false
        }
    };

    let (final_state, extra) = {
        let inner = job.inner.read().await;
        if inner.state == JobState::Aborted {
            // A STATE: keyword with an -error suffix already aborted it.
            (JobState::Aborted, JobReasons::ABORTED_BY_SYSTEM)
        } else if inner.cancel_requested {
            (JobState::Canceled, JobReasons::JOB_CANCELED_BY_USER)
        } else if failed {
            (JobState::Aborted, JobReasons::ABORTED_BY_SYSTEM)
        } else {
            (JobState::Completed, JobReasons::JOB_COMPLETED_SUCCESSFULLY)
        }
    };

    finish_job(state, printer, job, final_state, extra).await;
}

/// Finalize a job into a terminal state (or record an already-terminal
/// one), maintain the printer's queue invariants, emit events, and kick
/// the scheduler.
pub async fn finish_job(
    state: &Arc<ServerState>,
    printer: &Arc<Printer>,
    job: &Arc<Job>,
    final_state: JobState,
    extra_reasons: JobReasons,
) {
    debug_assert!(final_state.is_terminal());
    let was_processing;
    {
        let mut printer_inner = printer.inner.write().await;
        {
            let mut inner = job.inner.write().await;
            was_processing = matches!(
                inner.state,
                JobState::Processing | JobState::ProcessingStopped
            );
            if !inner.state.is_terminal() {
                inner.state = final_state;
            }
            if inner.completed.is_none() {
                inner.completed = Some(Utc::now());
            }
            inner.reasons -= JobReasons::JOB_INCOMING
                | JobReasons::JOB_QUEUED
                | JobReasons::JOB_PRINTING
                | JobReasons::JOB_TRANSFORMING
                | JobReasons::PROCESSING_TO_STOP_POINT
                | JobReasons::JOB_HOLD_UNTIL_SPECIFIED
                | JobReasons::JOB_FETCHABLE;
            inner.reasons |= extra_reasons;
            inner.transform_pid = None;
        }
        printer_inner.finalize_job_state(job.id, true, was_processing);
        if was_processing && printer_inner.state == PrinterState::Processing {
            // A pause-after-current-job takes effect once the job drains.
            if printer_inner
                .reasons
                .contains(platen_core::PrinterReasons::MOVING_TO_PAUSED)
            {
                printer_inner.reasons -= platen_core::PrinterReasons::MOVING_TO_PAUSED;
                printer_inner.reasons |= platen_core::PrinterReasons::PAUSED;
                printer_inner.state = PrinterState::Stopped;
            } else {
                printer_inner.state = PrinterState::Idle;
            }
            printer_inner.state_time = Utc::now();
        }
    }

    info!(
        printer = %printer.name,
        job_id = job.id,
        state = final_state.keyword(),
        "job finished"
    );
    events::add_event(
        state,
        Some(printer),
        Some(job),
        Event::JOB_COMPLETED | Event::JOB_STATE_CHANGED,
        "Job completed.",
    )
    .await;

    // Job subscriptions end with their job; the completion event above is
    // the last thing they see.
    {
        let subs = state.subscriptions.read().await;
        for sub in subs.iter() {
            let mut sub_inner = sub.inner.write().await;
            if sub_inner.job_id == Some(job.id) {
                sub_inner.truncate_lease();
            }
        }
    }

    // A slot opened up; see whether another job can run.
    check_jobs(state, printer).await;
}

/// Stop a processing job: flip it to processing-stopped and signal the
/// transform subprocess.  The transform task is the reaper and finalizes
/// state once the child exits.
pub async fn stop_job(state: &Arc<ServerState>, printer: &Arc<Printer>, job: &Arc<Job>) {
    let pid = {
        let mut inner = job.inner.write().await;
        if inner.state != JobState::Processing {
            return;
        }
        inner.state = JobState::ProcessingStopped;
        inner.reasons |= JobReasons::JOB_STOPPED;
        inner.transform_pid
    };

    if let Some(pid) = pid {
        terminate(pid);
    }

    events::add_event(
        state,
        Some(printer),
        Some(job),
        Event::JOB_STATE_CHANGED,
        "Job stopped.",
    )
    .await;
}

/// Request cancellation of a job.
///
/// Pending and held jobs cancel immediately; a processing job gets its
/// cancel flag set and its transform signalled, and the reaper finalizes.
pub async fn cancel_job(state: &Arc<ServerState>, printer: &Arc<Printer>, job: &Arc<Job>) {
    let pid = {
        let mut inner = job.inner.write().await;
        if inner.state.is_terminal() {
            return;
        }
        inner.cancel_requested = true;
        match inner.state {
            JobState::Processing | JobState::ProcessingStopped => {
                inner.reasons |= JobReasons::PROCESSING_TO_STOP_POINT;
                inner.transform_pid
            }
            _ => None,
        }
    };

    match pid {
        Some(pid) => terminate(pid),
        None => {
            let processing = {
                let inner = job.inner.read().await;
                matches!(
                    inner.state,
                    JobState::Processing | JobState::ProcessingStopped
                )
            };
            if !processing {
                finish_job(
                    state,
                    printer,
                    job,
                    JobState::Canceled,
                    JobReasons::JOB_CANCELED_BY_USER,
                )
                .await;
            }
        }
    }
}

/// Deliver SIGTERM to a transform subprocess.  Exit-by-SIGTERM is not
/// treated as a transform failure.
fn terminate(pid: u32) {
    debug!(pid, "terminating transform subprocess");
    // SAFETY: plain kill(2) with a pid we spawned ourselves.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_format_magic_table() {
        assert_eq!(detect_format(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(detect_format(b"%!PS-Ado"), Some("application/postscript"));
        assert_eq!(
            detect_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0]),
            Some("image/jpeg")
        );
        assert_eq!(
            detect_format(&[0xFF, 0xD8, 0xFF, 0xEF, 0, 0, 0, 0]),
            Some("image/jpeg")
        );
        assert_eq!(
            detect_format(&[0xFF, 0xD8, 0xFF, 0xF0, 0, 0, 0, 0]),
            None,
            "JPEG marker above 0xEF is not app0..app15"
        );
        assert_eq!(detect_format(b"\x89PNG\r\n\x1a\n"), Some("image/png"));
        assert_eq!(detect_format(b"RAS2...."), Some("image/pwg-raster"));
        assert_eq!(detect_format(b"UNIRAST\0"), Some("image/urf"));
        assert_eq!(detect_format(b"hello!!!"), None);
    }

    #[test]
    fn detect_format_is_idempotent() {
        for header in [&b"%PDF-1.7"[..], b"%!PS", b"\x89PNG\r\n\x1a\n", b"plain"] {
            assert_eq!(detect_format(header), detect_format(header));
        }
    }

    #[test]
    fn spool_filenames() {
        let mut config = ServerConfig::default();
        config.spool_dir = PathBuf::from("/tmp/spool");
        assert_eq!(
            spool_filename(&config, "office", 12, "application/pdf", None),
            PathBuf::from("/tmp/spool/office-12.pdf")
        );
        assert_eq!(
            spool_filename(&config, "office", 12, "image/pwg-raster", Some("t")),
            PathBuf::from("/tmp/spool/office-12-t.pwg")
        );
    }

    #[tokio::test]
    async fn hold_expiry_rules() {
        let job = Job::for_tests(1, 1, "p", 50);
        {
            let inner = job.inner.read().await;
            assert!(inner.hold_expired(), "no hold configured");
        }
        {
            let mut inner = job.inner.write().await;
            inner.hold_until_keyword = Some("indefinite".into());
        }
        assert!(!job.inner.read().await.hold_expired());

        {
            let mut inner = job.inner.write().await;
            inner.hold_until_keyword = None;
            inner.hold_until_time = Some(Utc::now() - chrono::Duration::seconds(5));
        }
        assert!(job.inner.read().await.hold_expired());

        {
            let mut inner = job.inner.write().await;
            inner.hold_until_time = Some(Utc::now() + chrono::Duration::seconds(3600));
        }
        assert!(!job.inner.read().await.hold_expired());
    }
}
