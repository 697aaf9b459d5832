//! One full audit run: launch → connect → gather → audit.
//!
//! The browser handle is scoped to the run: whatever happens after launch —
//! success, gathering failure, or cooperative cancellation — the runner
//! kills the process before returning, so the debugging port and profile
//! directory are always released.

use crate::audit::{self, AuditResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gather::{ArtifactStore, Pipeline};
use crate::launcher::{BrowserHandle, Launcher};
use crate::protocol::Session;
use crate::status::{StatusChannel, StatusSink};
use crate::trace::{self, SyntheticIds, TraceEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The complete output of one run: every audit's result, always.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub url: String,
    pub generated_time: chrono::DateTime<chrono::Utc>,
    pub results: BTreeMap<String, AuditResult>,
    /// Synthetic interval events for trace visualization; empty when the
    /// run had no correlatable trace.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub measurement_events: Vec<TraceEvent>,
}

/// Drives the whole pipeline for one URL.
pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run to completion without an external cancellation signal.
    pub async fn run(&self, url: &str) -> Result<RunReport> {
        let (_guard, cancel) = watch::channel(false);
        self.run_with_shutdown(url, cancel).await
    }

    /// Run to completion, aborting gathering when `shutdown` flips to true.
    /// A cancelled run still kills the browser before returning.
    pub async fn run_with_shutdown(
        &self,
        url: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        let channel = StatusChannel::open();
        let status = channel.sink();

        status.status("launch", "starting browser");
        let launcher = Launcher::new(self.config.browser.clone());
        let handle = launcher.launch().await?;

        let gathered = tokio::select! {
            result = self.gather(&handle, url, &status) => result,
            _ = wait_for_shutdown(&mut shutdown) => {
                status.warning("gather", "run cancelled; releasing browser");
                Err(Error::Cancelled)
            }
        };

        // Guaranteed release: the kill happens before any error propagates.
        if let Err(error) = handle.kill().await {
            tracing::warn!(%error, "browser kill failed during teardown");
        }

        let artifacts = Arc::new(gathered?);

        let audits = audit::default_audits();
        let results = audit::run_all(&audits, Arc::clone(&artifacts), &status).await;

        let measurement_events = synthesize_for_report(&artifacts);

        drop(status);
        let _ = channel.close().await;
        Ok(RunReport {
            run_id: uuid::Uuid::new_v4(),
            url: url.to_string(),
            generated_time: chrono::Utc::now(),
            results,
            measurement_events,
        })
    }

    async fn gather(
        &self,
        handle: &BrowserHandle,
        url: &str,
        status: &StatusSink,
    ) -> Result<ArtifactStore> {
        let command_timeout = Duration::from_millis(self.config.protocol.command_timeout_ms);
        let session = Session::connect(&handle.ws_url, command_timeout).await?;
        let pipeline = Pipeline::new(&self.config.protocol);
        pipeline.run(&self.config.passes(), url, &session, status).await
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone with no signal: never cancel.
            std::future::pending::<()>().await;
        }
    }
}

/// Augment the report with measurement intervals when the trace correlates.
/// A trace that fails to correlate already surfaced through the paint audit;
/// visualization is best-effort on top.
fn synthesize_for_report(artifacts: &ArtifactStore) -> Vec<TraceEvent> {
    let Some(events) = artifacts.default_trace() else {
        return Vec::new();
    };
    match trace::correlate(events) {
        Ok(milestones) => {
            let ids = SyntheticIds::new();
            trace::synthesize_measurements(&milestones, &ids)
        }
        Err(error) => {
            tracing::debug!(%error, "skipping measurement synthesis");
            Vec::new()
        }
    }
}
