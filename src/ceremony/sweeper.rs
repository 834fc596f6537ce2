// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ceremony Sweeper
//!
//! Background task that records expiry of an abandoned ceremony. Expiry is
//! already visible passively on every read; the sweeper makes sure the
//! history row and audit event are written even when nobody is looking.
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. The
//! history and audit writes are blocking, so each sweep runs on the blocking
//! pool.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::KeyCeremonies;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub struct CeremonySweeper {
    ceremonies: Arc<KeyCeremonies>,
    interval: Duration,
}

impl CeremonySweeper {
    pub fn new(ceremonies: Arc<KeyCeremonies>) -> Self {
        Self {
            ceremonies,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Ceremony sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Ceremony sweeper shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Ceremony sweeper shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        let ceremonies = self.ceremonies.clone();
        match tokio::task::spawn_blocking(move || ceremonies.expire_stale()).await {
            Ok(Some(id)) => debug!(ceremony_id = %id, "Sweeper expired ceremony"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ceremony sweep task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::ceremony::{CeremonyKind, CeremonyStatus};
    use crate::guardians::{GuardianRegistry, NewGuardian};
    use crate::seal::{ManualClock, SealManager};
    use chrono::Utc;

    #[tokio::test]
    async fn sweeper_records_expiry_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(GuardianRegistry::open(&dir.path().join("g.redb")).unwrap());
        for name in ["a", "b"] {
            registry
                .add(NewGuardian {
                    display_name: name.to_string(),
                    ..Default::default()
                })
                .unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let seal = Arc::new(SealManager::with_clock(clock.clone()));
        let ceremonies = Arc::new(KeyCeremonies::new(
            seal.clone(),
            registry.clone(),
            AuditLog::disabled(),
            chrono::Duration::minutes(10),
        ));

        ceremonies.initial_split(2).unwrap();
        seal.seal();
        clock.advance(chrono::Duration::seconds(1));
        ceremonies
            .start(CeremonyKind::Recovery, None, None, None)
            .unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            CeremonySweeper::new(ceremonies.clone())
                .with_interval(Duration::from_millis(10))
                .run(shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let history = registry.ceremonies().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, CeremonyKind::Recovery);
        assert_eq!(history[1].status, CeremonyStatus::Expired);
    }
}
