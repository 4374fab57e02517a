// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platen IPP: the attribute kernel and binary message codec.
//
// IPP messages (RFC 8010) are a fixed 8-byte header followed by tagged
// attribute groups and optional document data.  This crate provides the
// typed attribute model (group tags, value tags including out-of-band
// values, nested collections), set operations over attributes (find, copy,
// filter, validate), and the wire parser/encoder.  It performs no I/O.

pub mod attribute;
pub mod message;
pub mod op;
pub mod status;
pub mod tag;
pub mod value;

pub use attribute::{Attribute, Attributes};
pub use message::{AttributeGroup, Message};
pub use value::{IppDateTime, Value};
