// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback HTTP surface of the broker: webhook ingestion, the JSON-RPC
//! control plane, and its SSE notification stream.

pub mod handlers;
pub mod rpc;
pub mod server;
pub mod sse;

pub use server::{bind, router, serve, IngressState};
