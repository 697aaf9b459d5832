//! Sequential pass execution over one protocol session.
//!
//! Passes share one browser tab, so they never overlap. Within a pass the
//! lifecycle is fixed: every gatherer's `before_pass` in declared order,
//! then the pass body (navigation plus optional trace/network recording),
//! then every gatherer's `after_pass`. Gatherer failures are recorded as
//! sentinel artifacts and never abort the pass.

use super::network::{NetworkRecord, NetworkRecorder};
use super::{Artifact, ArtifactStore, Gatherer, PassContext, PassLoadData};
use crate::config::{PassConfig, ProtocolConfig};
use crate::error::{Error, Result};
use crate::protocol::{ProtocolEvent, Session};
use crate::status::StatusSink;
use crate::trace::TraceEvent;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Categories recorded when a pass enables tracing.
const TRACE_CATEGORIES: &str = "-*,toplevel,blink.console,blink.user_timing,\
     devtools.timeline,disabled-by-default-devtools.timeline";

/// How long to wait for buffered trace chunks after `Tracing.end`.
const TRACE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs configured passes against one session, producing the artifact store.
pub struct Pipeline {
    command_timeout: Duration,
    load_timeout: Duration,
    pause_after_load: Duration,
}

impl Pipeline {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            load_timeout: Duration::from_millis(config.load_timeout_ms),
            pause_after_load: Duration::from_millis(config.pause_after_load_ms),
        }
    }

    /// Execute every pass in order and return the finalized store.
    pub async fn run(
        &self,
        passes: &[PassConfig],
        url: &str,
        session: &Session,
        status: &StatusSink,
    ) -> Result<ArtifactStore> {
        let mut store = ArtifactStore::default();
        for pass in passes {
            status.status("gather", format!("running pass `{}`", pass.name));
            self.run_pass(pass, url, session, &mut store).await?;
        }
        Ok(store)
    }

    async fn run_pass(
        &self,
        pass: &PassConfig,
        url: &str,
        session: &Session,
        store: &mut ArtifactStore,
    ) -> Result<()> {
        let gatherers = resolve_gatherers(&pass.gatherers)?;
        let ctx = PassContext {
            session,
            url,
            command_timeout: self.command_timeout,
        };

        // A failing before_pass costs only that gatherer's artifact; its
        // after_pass is skipped so it cannot compute over half-installed
        // instrumentation.
        let mut failed_setup: HashMap<&'static str, String> = HashMap::new();
        for gatherer in &gatherers {
            if let Err(error) = gatherer.before_pass(&ctx).await {
                tracing::warn!(gatherer = gatherer.name(), %error, "before_pass failed");
                failed_setup.insert(gatherer.name(), error.to_string());
            }
        }

        let network = if pass.record_network {
            Some(start_network_collection(session).await?)
        } else {
            None
        };
        let trace = if pass.record_trace {
            Some(start_trace_recording(session).await?)
        } else {
            None
        };

        self.navigate(session, url, &pass.name).await?;

        if let Some(recording) = trace {
            let events = self.end_trace_recording(session, recording).await?;
            tracing::debug!(pass = %pass.name, events = events.len(), "trace recorded");
            store.insert_trace(pass.name.clone(), events);
        }
        if let Some(collector) = network {
            let records = collector.stop().await;
            tracing::debug!(pass = %pass.name, records = records.len(), "network records assembled");
            store.insert_network_records(pass.name.clone(), records);
        }

        let load = PassLoadData {
            trace_events: store.trace(&pass.name).map(<[TraceEvent]>::to_vec).unwrap_or_default(),
            network_records: store
                .network_records(&pass.name)
                .map(<[NetworkRecord]>::to_vec)
                .unwrap_or_default(),
        };

        for gatherer in &gatherers {
            let name = gatherer.name();
            if let Some(message) = failed_setup.remove(name) {
                store.insert(name, Artifact::error(message));
                continue;
            }
            let artifact = match gatherer.after_pass(&ctx, &load).await {
                Ok(value) => Artifact::Value(value),
                Err(error) => {
                    tracing::warn!(gatherer = name, %error, "after_pass failed; recording sentinel");
                    Artifact::error(error.to_string())
                }
            };
            store.insert(name, artifact);
        }

        Ok(())
    }

    async fn navigate(&self, session: &Session, url: &str, pass_name: &str) -> Result<()> {
        session.send("Page.enable", json!({})).await?;
        let mut load_fired = session.subscribe("Page.loadEventFired").await;
        session.send("Page.navigate", json!({ "url": url })).await?;

        if tokio::time::timeout(self.load_timeout, load_fired.recv()).await.is_err() {
            tracing::warn!(
                pass = %pass_name,
                timeout_ms = self.load_timeout.as_millis() as u64,
                "load event never fired; proceeding with what loaded"
            );
        }
        tokio::time::sleep(self.pause_after_load).await;
        Ok(())
    }

    async fn end_trace_recording(
        &self,
        session: &Session,
        mut recording: TraceRecording,
    ) -> Result<Vec<TraceEvent>> {
        session.send("Tracing.end", json!({})).await?;

        let mut events = Vec::new();
        let flush_deadline = tokio::time::sleep(TRACE_FLUSH_TIMEOUT);
        tokio::pin!(flush_deadline);
        loop {
            tokio::select! {
                Some(chunk) = recording.data.recv() => append_chunk(&mut events, &chunk),
                Some(_) = recording.complete.recv() => break,
                _ = &mut flush_deadline => {
                    tracing::warn!("trace flush deadline passed without completion signal");
                    break;
                }
            }
        }
        // Chunks dispatched ahead of the completion signal may still be
        // queued; the channel preserves connection order.
        while let Ok(chunk) = recording.data.try_recv() {
            append_chunk(&mut events, &chunk);
        }
        Ok(events)
    }
}

fn resolve_gatherers(names: &[String]) -> Result<Vec<Arc<dyn Gatherer>>> {
    names
        .iter()
        .map(|name| {
            super::gatherer_by_name(name)
                .ok_or_else(|| Error::Config(format!("unknown gatherer `{name}`")))
        })
        .collect()
}

fn append_chunk(events: &mut Vec<TraceEvent>, chunk: &ProtocolEvent) {
    let Some(items) = chunk.params.get("value").and_then(Value::as_array) else {
        return;
    };
    for item in items {
        match serde_json::from_value::<TraceEvent>(item.clone()) {
            Ok(event) => events.push(event),
            Err(error) => tracing::debug!(%error, "skipping unparseable trace event"),
        }
    }
}

struct TraceRecording {
    data: mpsc::UnboundedReceiver<ProtocolEvent>,
    complete: mpsc::UnboundedReceiver<ProtocolEvent>,
}

async fn start_trace_recording(session: &Session) -> Result<TraceRecording> {
    let data = session.subscribe("Tracing.dataCollected").await;
    let complete = session.subscribe("Tracing.tracingComplete").await;
    session
        .send(
            "Tracing.start",
            json!({ "categories": TRACE_CATEGORIES, "options": "sampling-frequency=10000" }),
        )
        .await?;
    Ok(TraceRecording { data, complete })
}

struct NetworkCollector {
    handle: JoinHandle<Vec<NetworkRecord>>,
    stop: oneshot::Sender<()>,
}

impl NetworkCollector {
    async fn stop(self) -> Vec<NetworkRecord> {
        let _ = self.stop.send(());
        self.handle.await.unwrap_or_default()
    }
}

async fn start_network_collection(session: &Session) -> Result<NetworkCollector> {
    let mut sent = session.subscribe("Network.requestWillBeSent").await;
    let mut received = session.subscribe("Network.responseReceived").await;
    let mut finished = session.subscribe("Network.loadingFinished").await;
    let mut failed = session.subscribe("Network.loadingFailed").await;
    session.send("Network.enable", json!({})).await?;

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let mut recorder = NetworkRecorder::new();
        loop {
            tokio::select! {
                Some(event) = sent.recv() => recorder.observe(&event),
                Some(event) = received.recv() => recorder.observe(&event),
                Some(event) = finished.recv() => recorder.observe(&event),
                Some(event) = failed.recv() => recorder.observe(&event),
                _ = &mut stop_rx => break,
            }
        }
        // Anything that raced the stop signal is still buffered.
        while let Ok(event) = sent.try_recv() {
            recorder.observe(&event);
        }
        while let Ok(event) = received.try_recv() {
            recorder.observe(&event);
        }
        while let Ok(event) = finished.try_recv() {
            recorder.observe(&event);
        }
        while let Ok(event) = failed.try_recv() {
            recorder.observe(&event);
        }
        recorder.into_records()
    });

    Ok(NetworkCollector { handle, stop: stop_tx })
}
