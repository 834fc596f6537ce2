// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Key Custody - Master key custody and Guardian ceremonies
//!
//! The master encryption key (MEK) is held in process memory only while the
//! service is unsealed. It is split across human Guardians with Shamir
//! secret sharing; a quorum of Guardians brings a sealed service back.
//!
//! ## Modules
//!
//! - `crypto` - Shamir secret sharing, AES-256-GCM envelope encryption, secret buffers
//! - `vault` - Envelope-encrypted persona records on disk
//! - `guardians` - Guardian registry and ceremony history (redb)
//! - `ceremony` - Ceremony state machine, orchestration, expiry sweeper
//! - `seal` - Seal/unseal state machine owning the MEK
//! - `clock` - Injectable time source
//! - `audit` - Append-only custody audit log
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Caller identity from the authenticated channel

pub mod api;
pub mod audit;
pub mod auth;
pub mod ceremony;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guardians;
pub mod seal;
pub mod state;
pub mod vault;
