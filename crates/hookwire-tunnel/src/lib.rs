// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Managed lifecycle of the cloudflared tunnel subprocess.
//!
//! The supervisor locates (or downloads) the binary, spawns it in named or
//! quick mode, discovers the public URL from the config file or child
//! output, restarts on crashes and failed health checks, and broadcasts
//! every state transition.

pub mod binary;
pub mod config_file;
pub mod supervisor;

pub use supervisor::{
    TunnelMode, TunnelState, TunnelStatus, TunnelSupervisor, TunnelTimings,
};
