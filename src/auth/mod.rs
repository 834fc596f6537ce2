// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Caller Identity
//!
//! Transport security and caller authentication are provided by the channel
//! in front of this service. That channel asserts the caller through two
//! headers:
//!
//! - `x-custody-role`: `admin` or `guardian`
//! - `x-guardian-id`: the Guardian id, required for `guardian`
//!
//! Handlers pick the extractor matching the operation:
//! [`AdminOnly`] for ceremony control and Guardian management,
//! [`GuardianAuth`] for share submission.

pub mod error;
pub mod extractor;
pub mod roles;

pub use error::AuthError;
pub use extractor::{AdminOnly, Caller, GuardianAuth, GUARDIAN_ID_HEADER, ROLE_HEADER};
pub use roles::Role;
