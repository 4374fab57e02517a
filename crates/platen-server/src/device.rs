// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output devices: remote printer agents speaking the proxy protocol
// (Register-Output-Device, Fetch-Job, Acknowledge-*, Update-*).

use tokio::sync::RwLock;

use platen_ipp::Attributes;

/// A registered output device, identified by its client-chosen UUID and
/// owned by the printer it registered against.
pub struct OutputDevice {
    pub uuid: String,
    /// The device's claimed capability snapshot, merged into the printer's
    /// `dev_attrs` on Update-Output-Device-Attributes.
    pub attrs: RwLock<Attributes>,
}

impl OutputDevice {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            attrs: RwLock::new(Attributes::new()),
        }
    }
}
