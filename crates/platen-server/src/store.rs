// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide object registries.
//
// Locking order, never violated:
//
//   system lock → printers registry → printer → job
//   subscriptions registry → subscription (alone, or after its owner)
//   resources registry → resource
//
// A read lock is never upgraded in place; release it and reacquire for
// writing.  Object ids come from monotonic wells and are never reused
// within a process lifetime.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tracing::info;

use platen_core::ServerConfig;
use platen_ipp::Attributes;

use crate::printer::Printer;
use crate::resource::Resource;
use crate::subscription::Subscription;

/// System-scope mutable state.
pub struct SystemInfo {
    /// System description attributes (system-name, system-location, ...).
    pub attrs: Attributes,
    /// First created printer doubles as the default target for
    /// Get-Printer-Attributes on the system URI.
    pub default_printer_id: Option<i32>,
    pub config_time: DateTime<Utc>,
    pub state_time: DateTime<Utc>,
}

/// Shared state for the whole server process.
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: DateTime<Utc>,

    pub printers: RwLock<Vec<Arc<Printer>>>,
    pub subscriptions: RwLock<Vec<Arc<Subscription>>>,
    pub resources: RwLock<Vec<Arc<Resource>>>,
    pub system: RwLock<SystemInfo>,

    next_printer_id: AtomicI32,
    next_job_id: AtomicI32,
    next_subscription_id: AtomicI32,
    next_resource_id: AtomicI32,

    /// Broadcast on every event enqueue; Get-Notifications waiters and the
    /// job scheduler listen here.
    pub event_notify: Notify,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let now = Utc::now();
        let mut attrs = Attributes::new();
        attrs.add(
            "system-name",
            platen_ipp::Value::Name(config.server_name.clone()),
        );
        Self {
            config,
            start_time: now,
            printers: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            system: RwLock::new(SystemInfo {
                attrs,
                default_printer_id: None,
                config_time: now,
                state_time: now,
            }),
            next_printer_id: AtomicI32::new(1),
            next_job_id: AtomicI32::new(1),
            next_subscription_id: AtomicI32::new(1),
            next_resource_id: AtomicI32::new(1),
            event_notify: Notify::new(),
        }
    }

    // -- Id wells -----------------------------------------------------------

    pub fn next_printer_id(&self) -> i32 {
        self.next_printer_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_job_id(&self) -> i32 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_subscription_id(&self) -> i32 {
        self.next_subscription_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_resource_id(&self) -> i32 {
        self.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Seconds since server start, the IPP `printer-up-time` clock.
    pub fn uptime(&self) -> i32 {
        (Utc::now() - self.start_time).num_seconds().max(1) as i32
    }

    // -- Printers -----------------------------------------------------------

    /// Find a printer by its resource path (e.g. `/ipp/print/office`).
    pub async fn find_printer(&self, path: &str) -> Option<Arc<Printer>> {
        let printers = self.printers.read().await;
        printers.iter().find(|p| p.path == path && !p.is_deleted()).cloned()
    }

    pub async fn find_printer_by_id(&self, id: i32) -> Option<Arc<Printer>> {
        let printers = self.printers.read().await;
        printers.iter().find(|p| p.id == id && !p.is_deleted()).cloned()
    }

    pub async fn add_printer(&self, printer: Arc<Printer>) {
        {
            let mut printers = self.printers.write().await;
            printers.push(Arc::clone(&printer));
        }
        let mut system = self.system.write().await;
        if system.default_printer_id.is_none() {
            system.default_printer_id = Some(printer.id);
        }
        system.config_time = Utc::now();
        info!(printer = %printer.name, id = printer.id, "printer registered");
    }

    /// Remove a printer from the registry.  Callers are responsible for
    /// aborting its jobs and truncating its subscriptions first.
    pub async fn remove_printer(&self, id: i32) -> Option<Arc<Printer>> {
        let removed = {
            let mut printers = self.printers.write().await;
            let pos = printers.iter().position(|p| p.id == id)?;
            Some(printers.remove(pos))
        };
        if removed.is_some() {
            let mut system = self.system.write().await;
            if system.default_printer_id == Some(id) {
                system.default_printer_id = None;
            }
            system.config_time = Utc::now();
        }
        removed
    }

    /// The default printer (first registered), if any.
    pub async fn default_printer(&self) -> Option<Arc<Printer>> {
        let id = self.system.read().await.default_printer_id?;
        self.find_printer_by_id(id).await
    }

    // -- Subscriptions ------------------------------------------------------

    pub async fn find_subscription(&self, id: i32) -> Option<Arc<Subscription>> {
        let subs = self.subscriptions.read().await;
        subs.iter().find(|s| s.id == id).cloned()
    }

    pub async fn add_subscription(&self, sub: Arc<Subscription>) {
        self.subscriptions.write().await.push(sub);
    }

    pub async fn remove_subscription(&self, id: i32) -> bool {
        let mut subs = self.subscriptions.write().await;
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    // -- Resources ----------------------------------------------------------

    pub async fn find_resource(&self, id: i32) -> Option<Arc<Resource>> {
        let resources = self.resources.read().await;
        resources.iter().find(|r| r.id == id).cloned()
    }

    pub async fn add_resource(&self, resource: Arc<Resource>) {
        self.resources.write().await.push(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platen_core::ServiceType;

    fn state() -> ServerState {
        ServerState::new(ServerConfig::default())
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_never_reused() {
        let state = state();
        let a = state.next_job_id();
        let b = state.next_job_id();
        let c = state.next_job_id();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn printer_lookup_by_path_and_id() {
        let state = state();
        let printer = Arc::new(Printer::new(
            state.next_printer_id(),
            "office",
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(Arc::clone(&printer)).await;

        let found = state.find_printer("/ipp/print/office").await.expect("found");
        assert_eq!(found.id, printer.id);
        assert!(state.find_printer("/ipp/print/other").await.is_none());
        assert!(state.find_printer_by_id(printer.id).await.is_some());
    }

    #[tokio::test]
    async fn first_printer_becomes_default() {
        let state = state();
        let first = Arc::new(Printer::new(
            state.next_printer_id(),
            "one",
            ServiceType::Print,
            &state.config,
        ));
        let second = Arc::new(Printer::new(
            state.next_printer_id(),
            "two",
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(Arc::clone(&first)).await;
        state.add_printer(second).await;

        let default = state.default_printer().await.expect("default");
        assert_eq!(default.id, first.id);

        state.remove_printer(first.id).await;
        assert!(state.default_printer().await.is_none());
    }
}
