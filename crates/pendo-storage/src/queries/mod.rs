// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the single-writer database.

pub mod conversations;
pub mod messages;
