// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the platen IPP server.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a printer (RFC 8011 §5.4.11 `printer-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    /// IPP `printer-state` enum value.
    pub fn value(&self) -> i32 {
        match self {
            Self::Idle => 3,
            Self::Processing => 4,
            Self::Stopped => 5,
        }
    }

    /// IPP keyword form, as used in `printer-state-message` text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Stopped => "stopped",
        }
    }
}

/// Lifecycle states of a job (RFC 8011 §5.3.7 `job-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    PendingHeld,
    Processing,
    ProcessingStopped,
    Canceled,
    Aborted,
    Completed,
}

impl JobState {
    /// IPP `job-state` enum value.
    pub fn value(&self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::PendingHeld => 4,
            Self::Processing => 5,
            Self::ProcessingStopped => 6,
            Self::Canceled => 7,
            Self::Aborted => 8,
            Self::Completed => 9,
        }
    }

    /// Parse an IPP `job-state` enum value (used by the proxy protocol,
    /// where output devices report job states numerically).
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Pending),
            4 => Some(Self::PendingHeld),
            5 => Some(Self::Processing),
            6 => Some(Self::ProcessingStopped),
            7 => Some(Self::Canceled),
            8 => Some(Self::Aborted),
            9 => Some(Self::Completed),
            _ => None,
        }
    }

    /// IPP keyword form (e.g. for `output-device-job-states`).
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingHeld => "pending-held",
            Self::Processing => "processing",
            Self::ProcessingStopped => "processing-stopped",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
        }
    }

    /// A terminal job never changes state again and is retained read-only.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }
}

/// Lifecycle states of a resource (PWG 5100.22 `resource-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    Pending,
    Available,
    Installed,
    Canceled,
    Aborted,
}

impl ResourceState {
    /// IPP `resource-state` enum value.
    pub fn value(&self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::Available => 4,
            Self::Installed => 5,
            Self::Canceled => 6,
            Self::Aborted => 7,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Installed => "installed",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
        }
    }
}

bitflags! {
    /// `job-state-reasons` bit set.
    ///
    /// Bit order matches [`JobReasons::KEYWORDS`]; the two tables must stay
    /// in sync for keyword round-tripping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JobReasons: u32 {
        const ABORTED_BY_SYSTEM            = 0x0000_0001;
        const COMPRESSION_ERROR            = 0x0000_0002;
        const DOCUMENT_ACCESS_ERROR        = 0x0000_0004;
        const DOCUMENT_FORMAT_ERROR        = 0x0000_0008;
        const DOCUMENT_PASSWORD_ERROR      = 0x0000_0010;
        const DOCUMENT_PERMISSION_ERROR    = 0x0000_0020;
        const DOCUMENT_SECURITY_ERROR      = 0x0000_0040;
        const DOCUMENT_UNPRINTABLE_ERROR   = 0x0000_0080;
        const ERRORS_DETECTED              = 0x0000_0100;
        const JOB_CANCELED_AT_DEVICE       = 0x0000_0200;
        const JOB_CANCELED_BY_USER         = 0x0000_0400;
        const JOB_COMPLETED_SUCCESSFULLY   = 0x0000_0800;
        const JOB_COMPLETED_WITH_ERRORS    = 0x0000_1000;
        const JOB_COMPLETED_WITH_WARNINGS  = 0x0000_2000;
        const JOB_DATA_INSUFFICIENT        = 0x0000_4000;
        const JOB_FETCHABLE                = 0x0000_8000;
        const JOB_HOLD_UNTIL_SPECIFIED     = 0x0001_0000;
        const JOB_INCOMING                 = 0x0002_0000;
        const JOB_PASSWORD_WAIT            = 0x0004_0000;
        const JOB_PRINTING                 = 0x0008_0000;
        const JOB_QUEUED                   = 0x0010_0000;
        const JOB_SPOOLING                 = 0x0020_0000;
        const JOB_STOPPED                  = 0x0040_0000;
        const JOB_TRANSFORMING             = 0x0080_0000;
        const PRINTER_STOPPED              = 0x0100_0000;
        const PRINTER_STOPPED_PARTLY       = 0x0200_0000;
        const PROCESSING_TO_STOP_POINT     = 0x0400_0000;
        const QUEUED_IN_DEVICE             = 0x0800_0000;
        const WARNINGS_DETECTED            = 0x1000_0000;
    }
}

impl JobReasons {
    /// Keyword for bit i is `KEYWORDS[i]`.
    pub const KEYWORDS: [&'static str; 29] = [
        "aborted-by-system",
        "compression-error",
        "document-access-error",
        "document-format-error",
        "document-password-error",
        "document-permission-error",
        "document-security-error",
        "document-unprintable-error",
        "errors-detected",
        "job-canceled-at-device",
        "job-canceled-by-user",
        "job-completed-successfully",
        "job-completed-with-errors",
        "job-completed-with-warnings",
        "job-data-insufficient",
        "job-fetchable",
        "job-hold-until-specified",
        "job-incoming",
        "job-password-wait",
        "job-printing",
        "job-queued",
        "job-spooling",
        "job-stopped",
        "job-transforming",
        "printer-stopped",
        "printer-stopped-partly",
        "processing-to-stop-point",
        "queued-in-device",
        "warnings-detected",
    ];

    /// Look up a single reason bit by its keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .position(|k| *k == keyword)
            .map(|i| Self::from_bits_truncate(1 << i))
    }

    /// The set as IPP keywords, or `["none"]` when empty.
    pub fn keywords(&self) -> Vec<&'static str> {
        if self.is_empty() {
            return vec!["none"];
        }
        Self::KEYWORDS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bits() & (1 << i) != 0)
            .map(|(_, k)| *k)
            .collect()
    }
}

bitflags! {
    /// `printer-state-reasons` bit set.
    ///
    /// Bit order matches [`PrinterReasons::KEYWORDS`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrinterReasons: u32 {
        const OTHER                      = 0x0000_0001;
        const COVER_OPEN                 = 0x0000_0002;
        const INPUT_TRAY_MISSING         = 0x0000_0004;
        const MARKER_SUPPLY_EMPTY        = 0x0000_0008;
        const MARKER_SUPPLY_LOW          = 0x0000_0010;
        const MARKER_WASTE_ALMOST_FULL   = 0x0000_0020;
        const MARKER_WASTE_FULL          = 0x0000_0040;
        const MEDIA_EMPTY                = 0x0000_0080;
        const MEDIA_JAM                  = 0x0000_0100;
        const MEDIA_LOW                  = 0x0000_0200;
        const MEDIA_NEEDED               = 0x0000_0400;
        const MOVING_TO_PAUSED           = 0x0000_0800;
        const PAUSED                     = 0x0000_1000;
        const SPOOL_AREA_FULL            = 0x0000_2000;
        const TONER_EMPTY                = 0x0000_4000;
        const TONER_LOW                  = 0x0000_8000;
        const DELETED                    = 0x0001_0000;
        const IDENTIFY_PRINTER_REQUESTED = 0x0002_0000;
        const HOLD_NEW_JOBS              = 0x0004_0000;
    }
}

impl PrinterReasons {
    /// Keyword for bit i is `KEYWORDS[i]`.
    pub const KEYWORDS: [&'static str; 19] = [
        "other",
        "cover-open",
        "input-tray-missing",
        "marker-supply-empty",
        "marker-supply-low",
        "marker-waste-almost-full",
        "marker-waste-full",
        "media-empty",
        "media-jam",
        "media-low",
        "media-needed",
        "moving-to-paused",
        "paused",
        "spool-area-full",
        "toner-empty",
        "toner-low",
        "deleted",
        "identify-printer-requested",
        "hold-new-jobs",
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .position(|k| *k == keyword)
            .map(|i| Self::from_bits_truncate(1 << i))
    }

    /// The set as IPP keywords, or `["none"]` when empty.
    pub fn keywords(&self) -> Vec<&'static str> {
        if self.is_empty() {
            return vec!["none"];
        }
        Self::KEYWORDS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bits() & (1 << i) != 0)
            .map(|(_, k)| *k)
            .collect()
    }
}

/// IPP service types a printer can be created under, keyed by the resource
/// path prefix of its printer URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Print,
    Print3d,
    Faxout,
}

impl ServiceType {
    /// Resource path prefix (no trailing slash).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Print => "/ipp/print",
            Self::Print3d => "/ipp/print3d",
            Self::Faxout => "/ipp/faxout",
        }
    }

    /// Classify a resource path by its service prefix.
    pub fn from_path(path: &str) -> Option<Self> {
        for service in [Self::Print, Self::Print3d, Self::Faxout] {
            let prefix = service.prefix();
            if path == prefix || path.strip_prefix(prefix).is_some_and(|r| r.starts_with('/')) {
                return Some(service);
            }
        }
        None
    }
}

/// Spool filename extension for a MIME media type.
///
/// Unknown formats fall back to `prn` (raw printer data).
pub fn spool_extension(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => "pdf",
        "application/postscript" => "ps",
        "application/ipp" => "ipp",
        "application/vnd.iccprofile" => "icc",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/pwg-raster" => "pwg",
        "image/urf" => "urf",
        "text/plain" => "txt",
        "text/strings" => "strings",
        _ => "prn",
    }
}
