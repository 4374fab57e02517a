// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Printer object.
//
// A printer owns its jobs.  `active_jobs` holds every job not yet in a
// terminal state, ordered by priority (descending) then id (ascending); at
// most one job per printer is in the processing state, tracked by
// `processing_job`.  Both facts are maintained by `finalize_job_state`,
// the single hook run after every job state transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use platen_core::{PrinterReasons, PrinterState, ServerConfig, ServiceType};
use platen_ipp::{Attribute, Attributes, Value};

use crate::device::OutputDevice;
use crate::job::Job;

/// Mutable printer state, guarded by the printer's lock.
pub struct PrinterInner {
    pub state: PrinterState,
    pub reasons: PrinterReasons,
    pub is_accepting: bool,
    pub is_shutdown: bool,
    pub is_deleted: bool,
    /// Static description and capability attributes.
    pub attrs: Attributes,
    /// Capability snapshot supplied by registered output devices.
    pub dev_attrs: Attributes,
    /// Every job this printer has ever created, by id.
    pub jobs: BTreeMap<i32, Arc<Job>>,
    /// Non-terminal jobs, priority descending then id ascending.
    pub active_jobs: Vec<Arc<Job>>,
    /// Id of the single job in the processing state, if any.
    pub processing_job: Option<i32>,
    pub devices: Vec<Arc<OutputDevice>>,
    /// Ids of resources allocated to this printer.
    pub resources: Vec<i32>,
    pub hold_new_jobs: bool,
    pub identify_actions: Vec<String>,
    pub identify_message: Option<String>,
    pub state_time: DateTime<Utc>,
    pub config_time: DateTime<Utc>,
    /// Overrides of the global auth groups, settable per printer.
    pub print_group: Option<String>,
    pub proxy_group: Option<String>,
    pub device_uri: Option<String>,
    /// Destination format handed to the transform as OUTPUT_TYPE.
    pub device_format: Option<String>,
    /// Per-printer transform command override.
    pub command: Option<String>,
    pub max_devices: usize,
}

/// A logical printer.
pub struct Printer {
    pub id: i32,
    pub name: String,
    /// Resource path, e.g. `/ipp/print/office`.
    pub path: String,
    pub service: ServiceType,
    /// `urn:uuid:...` identity.
    pub uuid: String,
    pub start_time: DateTime<Utc>,
    pub inner: RwLock<PrinterInner>,
}

impl Printer {
    pub fn new(id: i32, name: &str, service: ServiceType, config: &ServerConfig) -> Self {
        let uuid = format!("urn:uuid:{}", Uuid::new_v4());
        let path = format!("{}/{}", service.prefix(), name);
        let now = Utc::now();

        let mut reasons = PrinterReasons::empty();
        let mut hold_new_jobs = false;
        if config.default_hold_new_jobs {
            reasons |= PrinterReasons::HOLD_NEW_JOBS;
            hold_new_jobs = true;
        }

        Self {
            id,
            name: name.to_string(),
            path,
            service,
            uuid,
            start_time: now,
            inner: RwLock::new(PrinterInner {
                state: PrinterState::Idle,
                reasons,
                is_accepting: true,
                is_shutdown: false,
                is_deleted: false,
                attrs: default_attributes(name),
                dev_attrs: Attributes::new(),
                jobs: BTreeMap::new(),
                active_jobs: Vec::new(),
                processing_job: None,
                devices: Vec::new(),
                resources: Vec::new(),
                hold_new_jobs,
                identify_actions: Vec::new(),
                identify_message: None,
                state_time: now,
                config_time: now,
                print_group: config.print_group.clone(),
                proxy_group: config.proxy_group.clone(),
                device_uri: None,
                device_format: None,
                command: config
                    .transform_command
                    .as_ref()
                    .map(|c| c.to_string_lossy().into_owned()),
                max_devices: 4,
            }),
        }
    }

    /// Cheap deleted check without holding the caller's lock open.
    pub fn is_deleted(&self) -> bool {
        match self.inner.try_read() {
            Ok(inner) => inner.is_deleted,
            // Contended lock: treat as live, the registry sweep will catch up.
            Err(_) => false,
        }
    }
}

impl PrinterInner {
    /// Insert a new job into both the full map and the active list,
    /// keeping the active list ordered by priority (descending) then id
    /// (ascending).
    pub fn add_job(&mut self, job: Arc<Job>, priority: i32) {
        self.jobs.insert(job.id, Arc::clone(&job));
        let pos = self
            .active_jobs
            .iter()
            .position(|other| {
                let other_priority = other.cached_priority();
                other_priority < priority || (other_priority == priority && other.id > job.id)
            })
            .unwrap_or(self.active_jobs.len());
        self.active_jobs.insert(pos, job);
    }

    /// Run after any job state transition: drop terminal jobs from
    /// `active_jobs` and clear `processing_job` when it no longer matches.
    pub fn finalize_job_state(&mut self, job_id: i32, terminal: bool, was_processing: bool) {
        if terminal {
            self.active_jobs.retain(|j| j.id != job_id);
        }
        if was_processing && self.processing_job == Some(job_id) {
            self.processing_job = None;
        }
    }

    /// Number of not-yet-terminal jobs.
    pub fn queued_job_count(&self) -> usize {
        self.active_jobs.len()
    }

    pub fn find_device(&self, uuid: &str) -> Option<Arc<OutputDevice>> {
        self.devices.iter().find(|d| d.uuid == uuid).cloned()
    }
}

/// Default description and capability attributes for a new printer.
///
/// Create-Printer and template resources layer on top of these.
fn default_attributes(name: &str) -> Attributes {
    let mut attrs = Attributes::new();

    attrs.add("printer-name", Value::Name(name.into()));
    attrs.add("printer-info", Value::Text(name.into()));
    attrs.add(
        "printer-make-and-model",
        Value::Text("Platen Virtual Printer".into()),
    );
    attrs.add("printer-location", Value::Text(String::new()));

    attrs.add_all(
        "ipp-versions-supported",
        vec![Value::Keyword("1.1".into()), Value::Keyword("2.0".into())],
    );
    attrs.add_all(
        "document-format-supported",
        vec![
            Value::MimeType("application/octet-stream".into()),
            Value::MimeType("application/pdf".into()),
            Value::MimeType("application/postscript".into()),
            Value::MimeType("image/jpeg".into()),
            Value::MimeType("image/png".into()),
            Value::MimeType("image/pwg-raster".into()),
            Value::MimeType("image/urf".into()),
        ],
    );
    attrs.add(
        "document-format-default",
        Value::MimeType("application/octet-stream".into()),
    );

    attrs.add_all(
        "job-creation-attributes-supported",
        [
            "copies",
            "document-format",
            "document-name",
            "finishings",
            "job-hold-until",
            "job-hold-until-time",
            "job-name",
            "job-priority",
            "media",
            "media-col",
            "multiple-document-handling",
            "orientation-requested",
            "output-bin",
            "page-ranges",
            "print-color-mode",
            "print-quality",
            "printer-resolution",
            "sides",
        ]
        .iter()
        .map(|k| Value::Keyword((*k).into()))
        .collect(),
    );

    attrs.add_all(
        "media-supported",
        vec![
            Value::Keyword("iso_a4_210x297mm".into()),
            Value::Keyword("iso_a5_148x210mm".into()),
            Value::Keyword("na_letter_8.5x11in".into()),
            Value::Keyword("na_legal_8.5x14in".into()),
        ],
    );
    attrs.add("media-default", Value::Keyword("iso_a4_210x297mm".into()));

    attrs.add_all(
        "sides-supported",
        vec![
            Value::Keyword("one-sided".into()),
            Value::Keyword("two-sided-long-edge".into()),
            Value::Keyword("two-sided-short-edge".into()),
        ],
    );
    attrs.add("sides-default", Value::Keyword("one-sided".into()));

    attrs.add("copies-default", Value::Integer(1));
    attrs.add(
        "copies-supported",
        Value::RangeOfInteger { lower: 1, upper: 99 },
    );
    attrs.add("job-priority-default", Value::Integer(50));
    attrs.add(
        "job-priority-supported",
        Value::Integer(100),
    );
    attrs.add(
        "job-hold-until-default",
        Value::Keyword("no-hold".into()),
    );
    attrs.add_all(
        "job-hold-until-supported",
        vec![Value::Keyword("no-hold".into()), Value::Keyword("indefinite".into())],
    );

    attrs.add("color-supported", Value::Boolean(true));
    attrs.add_all(
        "print-color-mode-supported",
        vec![
            Value::Keyword("auto".into()),
            Value::Keyword("color".into()),
            Value::Keyword("monochrome".into()),
        ],
    );
    attrs.add("print-color-mode-default", Value::Keyword("auto".into()));
    attrs.add(
        "printer-resolution-default",
        Value::Resolution { x: 600, y: 600, units: 3 },
    );
    attrs.add_all(
        "printer-resolution-supported",
        vec![
            Value::Resolution { x: 300, y: 300, units: 3 },
            Value::Resolution { x: 600, y: 600, units: 3 },
        ],
    );
    attrs.add("print-quality-default", Value::Enum(4));
    attrs.add_all(
        "print-quality-supported",
        vec![Value::Enum(3), Value::Enum(4), Value::Enum(5)],
    );

    attrs.add("charset-configured", Value::Charset("utf-8".into()));
    attrs.add_all(
        "charset-supported",
        vec![Value::Charset("us-ascii".into()), Value::Charset("utf-8".into())],
    );
    attrs.add("natural-language-configured", Value::Language("en".into()));
    attrs.add(
        "generated-natural-language-supported",
        Value::Language("en".into()),
    );

    attrs.add("uri-security-supported", Value::Keyword("none".into()));
    attrs.add(
        "uri-authentication-supported",
        Value::Keyword("requesting-user-name".into()),
    );
    attrs.add("compression-supported", Value::Keyword("none".into()));
    attrs.add(
        "pdl-override-supported",
        Value::Keyword("not-attempted".into()),
    );
    attrs.add(
        "multiple-document-jobs-supported",
        Value::Boolean(false),
    );
    attrs.add(
        "identify-actions-supported",
        Value::Keyword("display".into()),
    );
    attrs.push(Attribute::with_values(
        "identify-actions-default",
        vec![Value::Keyword("display".into())],
    ));
    attrs.add(
        "which-jobs-supported",
        Value::Keyword("not-completed".into()),
    );
    attrs.push(Attribute::with_values(
        "notify-events-supported",
        crate::events::Event::KEYWORDS
            .iter()
            .map(|k| Value::Keyword((*k).into()))
            .collect(),
    ));
    attrs.add("notify-events-default", Value::Keyword("job-completed".into()));
    attrs.add("notify-lease-duration-default", Value::Integer(86400));
    attrs.add(
        "notify-pull-method-supported",
        Value::Keyword("ippget".into()),
    );

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use platen_core::JobState;

    fn printer() -> Printer {
        Printer::new(1, "test", ServiceType::Print, &ServerConfig::default())
    }

    fn job(id: i32, priority: i32) -> Arc<Job> {
        Arc::new(Job::for_tests(id, 1, "test", priority))
    }

    #[tokio::test]
    async fn path_follows_service_prefix() {
        let p = printer();
        assert_eq!(p.path, "/ipp/print/test");
        assert!(p.uuid.starts_with("urn:uuid:"));
    }

    #[tokio::test]
    async fn active_jobs_order_priority_then_id() {
        let p = printer();
        let mut inner = p.inner.write().await;
        inner.add_job(job(1, 50), 50);
        inner.add_job(job(2, 80), 80);
        inner.add_job(job(3, 50), 50);
        inner.add_job(job(4, 10), 10);

        let order: Vec<i32> = inner.active_jobs.iter().map(|j| j.id).collect();
        assert_eq!(order, vec![2, 1, 3, 4]);
    }

    #[tokio::test]
    async fn finalize_removes_terminal_jobs_and_clears_processing() {
        let p = printer();
        let mut inner = p.inner.write().await;
        let j = job(7, 50);
        inner.add_job(Arc::clone(&j), 50);
        inner.processing_job = Some(7);

        {
            let mut job_inner = j.inner.write().await;
            job_inner.state = JobState::Completed;
        }
        inner.finalize_job_state(7, true, true);

        assert!(inner.active_jobs.is_empty());
        assert_eq!(inner.processing_job, None);
        // Terminal jobs are retained in the full map.
        assert!(inner.jobs.contains_key(&7));
    }

    #[tokio::test]
    async fn default_attributes_cover_the_basics() {
        let p = printer();
        let inner = p.inner.read().await;
        assert_eq!(inner.attrs.get_string("printer-name"), Some("test"));
        assert!(inner.attrs.contains_string("ipp-versions-supported", "2.0"));
        assert!(inner
            .attrs
            .contains_string("document-format-supported", "application/pdf"));
        assert_eq!(
            inner.attrs.get_string("notify-pull-method-supported"),
            Some("ippget")
        );
    }
}
