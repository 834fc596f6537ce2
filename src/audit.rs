// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit log for custody operations.
//!
//! Seal transitions, ceremony steps, Guardian changes and record destruction
//! are appended to a daily JSONL file under `audit/{date}/events.jsonl`.
//! Events carry ids and counts only, never key material or share values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::vault::{VaultError, VaultResult, VaultStorage};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Seal events
    SealOpened,
    SealClosed,

    // Ceremony events
    CeremonyStarted,
    ShareAccepted,
    ShareRejected,
    CeremonyCompleted,
    CeremonyFailed,
    CeremonyCancelled,
    CeremonyExpired,

    // Guardian events
    GuardianAdded,
    GuardianRevoked,
    GuardianDeleted,

    // Vault events
    RecordDestroyed,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Caller that triggered the event: `admin`, a Guardian id, or `system`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Append-only audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    storage: Option<VaultStorage>,
}

impl AuditLog {
    pub fn new(storage: VaultStorage) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// A log that drops every event.
    pub fn disabled() -> Self {
        Self { storage: None }
    }

    /// Append an event to its day's file.
    pub fn log(&self, event: &AuditEvent) -> VaultResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = storage.paths().audit_events_file(&date);
        let line = serde_json::to_vec(event)?;
        storage.append_line(&path, &line)
    }

    /// Append an event; a failed write is logged and otherwise ignored.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> VaultResult<Vec<AuditEvent>> {
        let Some(storage) = &self.storage else {
            return Ok(Vec::new());
        };
        let day = parse_date(date)?;
        let path = storage
            .paths()
            .audit_events_file(&day.format("%Y-%m-%d").to_string());
        if !storage.exists(&path) {
            return Ok(Vec::new());
        }

        let content = storage.read_raw(&path)?;
        let content = String::from_utf8(content)
            .map_err(|e| VaultError::MalformedRecord(format!("invalid UTF-8 in audit log: {e}")))?;

        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Read events for an inclusive date range.
    pub fn read_events_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> VaultResult<Vec<AuditEvent>> {
        let start = parse_date(start_date)?;
        let end = parse_date(end_date)?;

        let mut all_events = Vec::new();
        let mut current = start;
        while current <= end {
            all_events.extend(self.read_events(&current.format("%Y-%m-%d").to_string())?);
            current = current
                .succ_opt()
                .ok_or_else(|| VaultError::MalformedRecord("date overflow".to_string()))?;
        }
        Ok(all_events)
    }
}

fn parse_date(date: &str) -> VaultResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| VaultError::InvalidRecordId(format!("invalid date: {date}")))
}
