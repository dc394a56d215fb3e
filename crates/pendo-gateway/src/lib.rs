// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Pendo chat core.
//!
//! Exposes every boundary operation over REST (`/v1`) and realtime room
//! subscriptions over `/ws`. The gateway is deliberately thin: all
//! routing/claim/escalation semantics live in `pendo-router`; this crate
//! translates HTTP and WebSocket frames to and from it.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
