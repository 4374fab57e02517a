// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platen core: types, configuration, and error definitions shared across
// all crates of the platen IPP server.

pub mod config;
pub mod error;
pub mod types;

pub use config::ServerConfig;
pub use error::PlatenError;
pub use types::*;
