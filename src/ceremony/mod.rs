// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Ceremonies
//!
//! - [`session`] - the per-ceremony state machine holding submitted shares
//! - [`orchestrator`] - [`KeyCeremonies`], which checks preconditions against
//!   the Guardian registry and applies each ceremony's side effect
//! - [`sweeper`] - background task that records passive expiry

pub mod orchestrator;
pub mod session;
pub mod sweeper;

pub use orchestrator::{
    CompletionOutcome, InitialSplitOutcome, IssuedShare, KeyCeremonies, KeyCeremonyError,
};
pub use session::{
    CeremonyContext, CeremonyEvent, CeremonyKind, CeremonySession, CeremonySnapshot,
    CeremonyStatus, SubmitReceipt,
};
pub use sweeper::CeremonySweeper;

/// Errors raised by ceremony sessions and their preconditions.
#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    /// No session is open (never started, or already terminal).
    #[error("no active ceremony")]
    NoActiveCeremony,

    /// The Guardian already submitted a share in this session.
    #[error("guardian {0} already submitted a share in this ceremony")]
    DuplicateSubmission(String),

    /// Another Guardian already submitted the share with this index.
    #[error("share index {0} was already submitted")]
    DuplicateShareIndex(u8),

    /// The share cannot belong to this session's split.
    #[error("share does not belong to this ceremony: {0}")]
    ShareMismatch(String),

    /// A session is already open.
    #[error("a ceremony is already in progress")]
    AlreadyActive,

    #[error("threshold not met: {collected} of {needed} shares collected")]
    ThresholdNotMet { collected: usize, needed: u8 },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Ceremony history does not allow this ceremony type now.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Guardian unknown, revoked, or submitting someone else's share index.
    #[error("guardian not eligible: {0}")]
    GuardianIneligible(String),
}

/// Result type for ceremony operations.
pub type CeremonyResult<T> = Result<T, CeremonyError>;
