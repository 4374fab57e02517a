// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Resource object (PWG 5100.22).
//
// Lifecycle: Create-Resource (pending) → Send-Resource-Data (available) →
// Install-Resource (installed) → allocation to printers.  Cancel-Resource
// on an in-use resource defers the state change by setting the cancel flag;
// the transition happens when the use count drops to zero.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use platen_core::ResourceState;
use platen_ipp::Attributes;

/// Resource type keywords accepted by Create-Resource.
pub const RESOURCE_TYPES: [&str; 6] = [
    "static-icc-profile",
    "static-image",
    "static-strings",
    "template-document",
    "template-job",
    "template-printer",
];

/// Payload formats accepted by Send-Resource-Data.
pub const RESOURCE_FORMATS: [&str; 6] = [
    "application/ipp",
    "application/pdf",
    "application/vnd.iccprofile",
    "image/jpeg",
    "image/png",
    "text/strings",
];

/// Whether a resource type keyword names a template resource.
///
/// Templates are never allocated to printers; their stored attribute set
/// is applied to Create-Printer and job-creation requests instead.
pub fn is_template_type(rtype: &str) -> bool {
    rtype.starts_with("template-")
}

/// Mutable resource state, guarded by the resource's lock.
pub struct ResourceInner {
    pub rtype: String,
    pub state: ResourceState,
    pub format: Option<String>,
    pub filename: Option<PathBuf>,
    /// Number of printers currently holding an allocation.
    pub use_count: usize,
    pub cancel_requested: bool,
    pub attrs: Attributes,
    pub state_time: DateTime<Utc>,
}

/// A stored resource.
pub struct Resource {
    pub id: i32,
    pub uuid: String,
    pub created: DateTime<Utc>,
    pub inner: RwLock<ResourceInner>,
}

impl Resource {
    pub fn new(id: i32, rtype: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            uuid: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            created: now,
            inner: RwLock::new(ResourceInner {
                rtype: rtype.to_string(),
                state: ResourceState::Pending,
                format: None,
                filename: None,
                use_count: 0,
                cancel_requested: false,
                attrs: Attributes::new(),
                state_time: now,
            }),
        }
    }
}

impl ResourceInner {
    /// Drop one allocation; applies a deferred cancel when the last user
    /// releases the resource.  Returns true when the resource transitioned
    /// to canceled.
    pub fn release(&mut self) -> bool {
        self.use_count = self.use_count.saturating_sub(1);
        if self.use_count == 0 && self.cancel_requested {
            self.state = ResourceState::Canceled;
            self.state_time = Utc::now();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_detection() {
        assert!(is_template_type("template-printer"));
        assert!(is_template_type("template-job"));
        assert!(!is_template_type("static-image"));
    }

    #[tokio::test]
    async fn deferred_cancel_waits_for_use_count() {
        let resource = Resource::new(1, "static-image");
        let mut inner = resource.inner.write().await;
        inner.state = ResourceState::Installed;
        inner.use_count = 2;
        inner.cancel_requested = true;

        assert!(!inner.release());
        assert_eq!(inner.state, ResourceState::Installed);
        assert!(inner.release());
        assert_eq!(inner.state, ResourceState::Canceled);
    }
}
