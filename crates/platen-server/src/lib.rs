// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platen server: the IPP request pipeline and its object machinery.
//
// An HTTP POST carrying an `application/ipp` body enters the connection
// layer (`server`), is decoded by `platen-ipp`, triaged and routed by
// `dispatch`, and handled by one of the operation handlers under `ops`.
// Handlers mutate the object store (`store` and the per-object modules),
// emit events (`events`), and the job engine (`job` + `transform`) runs
// the external RIP over spooled documents.

pub mod auth;
pub mod device;
pub mod dispatch;
pub mod events;
pub mod fetch;
pub mod job;
pub mod ops;
pub mod printer;
pub mod resource;
pub mod server;
pub mod store;
pub mod subscription;
pub mod transform;
pub mod validate;

pub use server::IppServer;
pub use store::ServerState;
