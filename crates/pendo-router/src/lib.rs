// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session routing for the Pendo chat core.
//!
//! The [`SessionRouter`] implements every boundary operation: opening or
//! reusing a conversation, appending to its log, the atomic claim, the
//! idempotent end, monotone escalation, and video-session fan-out. The
//! [`InactivitySweeper`] closes abandoned assigned sessions.

pub mod metrics;
pub mod router;
pub mod sweeper;

pub use router::SessionRouter;
pub use sweeper::InactivitySweeper;
