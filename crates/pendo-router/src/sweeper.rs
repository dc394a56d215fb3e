// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inactivity sweeper for abandoned assigned sessions.
//!
//! A counsellor who claims a conversation and then disappears would
//! otherwise hold it forever -- assignment is monotonic and there is no
//! auto-release back to the queue. The sweeper uses the one legal exit,
//! `ASSIGNED -> ENDED`: sessions with no message activity past the
//! configured threshold get a closing system message and are ended.
//! Disabled by default (`chat.stale_session_minutes = 0`).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pendo_config::model::ChatConfig;
use pendo_core::types::SenderRole;
use pendo_core::PendoError;

use crate::router::SessionRouter;

/// Sender id recorded on sweeper-generated system messages.
const SYSTEM_SENDER: &str = "pendo";

/// Log line appended before a stale session is closed.
const CLOSING_MESSAGE: &str = "This session was closed after a period of inactivity.";

/// Periodically closes assigned conversations that have gone silent.
pub struct InactivitySweeper {
    router: Arc<SessionRouter>,
    stale_after: chrono::Duration,
    interval: Duration,
}

impl InactivitySweeper {
    /// Build a sweeper from config. Returns `None` when sweeping is
    /// disabled (`stale_session_minutes = 0`).
    pub fn from_config(router: Arc<SessionRouter>, config: &ChatConfig) -> Option<Self> {
        if config.stale_session_minutes == 0 {
            return None;
        }
        Some(Self::new(
            router,
            chrono::Duration::minutes(config.stale_session_minutes as i64),
            Duration::from_secs(config.sweep_interval_secs),
        ))
    }

    pub fn new(
        router: Arc<SessionRouter>,
        stale_after: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            router,
            stale_after,
            interval,
        }
    }

    /// Run until the shutdown token fires. Sweep failures are logged and
    /// retried on the next tick, never propagated.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            stale_after_minutes = self.stale_after.num_minutes(),
            "inactivity sweeper started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("inactivity sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "inactivity sweep failed (non-fatal)");
                    }
                }
            }
        }
    }

    /// One sweep pass. Returns the number of sessions closed.
    pub async fn sweep_once(&self) -> Result<usize, PendoError> {
        let cutoff = (chrono::Utc::now() - self.stale_after)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let stale = self.router.store().stale_assigned(&cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut closed = 0;
        for conv in stale {
            // The closing marker lands in the log before the state change
            // so the student sees why the room went quiet.
            if let Err(e) = self
                .router
                .append(&conv.id, SenderRole::System, SYSTEM_SENDER, CLOSING_MESSAGE)
                .await
            {
                warn!(conversation_id = %conv.id, error = %e, "failed to append closing message");
            }
            match self.router.end(&conv.id).await {
                Ok(_) => {
                    closed += 1;
                    info!(conversation_id = %conv.id, "stale session closed");
                }
                // Raced with a manual end between the scan and here.
                Err(e) if e.is_conflict() => {}
                Err(e) => {
                    warn!(conversation_id = %conv.id, error = %e, "failed to close stale session");
                }
            }
        }
        Ok(closed)
    }
}
