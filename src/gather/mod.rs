//! Artifact gathering: passes, gatherer lifecycle, artifact store.

pub mod network;
pub mod pipeline;
pub mod tags_blocking_first_paint;
pub mod url;

pub use network::NetworkRecord;
pub use pipeline::Pipeline;

use crate::error::Result;
use crate::protocol::Session;
use crate::trace::TraceEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Name of the pass a default configuration runs.
pub const DEFAULT_PASS: &str = "default";

/// Artifact key the per-pass traces answer to.
pub const TRACES_ARTIFACT: &str = "traces";

/// Artifact key the per-pass network records answer to.
pub const NETWORK_RECORDS_ARTIFACT: &str = "network-records";

/// Failure sentinel stored when a gatherer cannot produce its artifact.
///
/// Serializes as `{"rawValue": -1, "debugString": ...}` so downstream
/// consumers can tell collection failure from empty data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactError {
    #[serde(rename = "rawValue")]
    pub raw_value: i64,
    #[serde(rename = "debugString")]
    pub debug_string: String,
}

/// One collected artifact: the gatherer's value, or the failure sentinel
/// recorded in its place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Error(ArtifactError),
    Value(serde_json::Value),
}

impl Artifact {
    /// Build the failure sentinel.
    pub fn error(debug_string: impl Into<String>) -> Self {
        Artifact::Error(ArtifactError {
            raw_value: -1,
            debug_string: debug_string.into(),
        })
    }

    pub fn as_error(&self) -> Option<&ArtifactError> {
        match self {
            Artifact::Error(sentinel) => Some(sentinel),
            Artifact::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Artifact::Error(_) => None,
            Artifact::Value(value) => Some(value),
        }
    }
}

/// Run-scoped store of named artifacts plus per-pass load data.
///
/// The pipeline is the only writer while gathering runs; audits get a shared
/// read-only reference afterwards.
#[derive(Debug, Default, Serialize)]
pub struct ArtifactStore {
    artifacts: BTreeMap<String, Artifact>,
    traces: BTreeMap<String, Vec<TraceEvent>>,
    network_records: BTreeMap<String, Vec<NetworkRecord>>,
}

impl ArtifactStore {
    pub fn insert(&mut self, name: impl Into<String>, artifact: Artifact) {
        let name = name.into();
        if self.artifacts.insert(name.clone(), artifact).is_some() {
            tracing::warn!(artifact = %name, "artifact overwritten by a later pass");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Whether an audit's required artifact is satisfiable from this store.
    pub fn contains(&self, name: &str) -> bool {
        match name {
            TRACES_ARTIFACT => !self.traces.is_empty(),
            NETWORK_RECORDS_ARTIFACT => !self.network_records.is_empty(),
            _ => self.artifacts.contains_key(name),
        }
    }

    pub fn insert_trace(&mut self, pass: impl Into<String>, events: Vec<TraceEvent>) {
        self.traces.insert(pass.into(), events);
    }

    pub fn trace(&self, pass: &str) -> Option<&[TraceEvent]> {
        self.traces.get(pass).map(Vec::as_slice)
    }

    /// The default pass's trace, falling back to the first recorded one when
    /// the run used custom pass names.
    pub fn default_trace(&self) -> Option<&[TraceEvent]> {
        self.traces
            .get(DEFAULT_PASS)
            .or_else(|| self.traces.values().next())
            .map(Vec::as_slice)
    }

    pub fn insert_network_records(&mut self, pass: impl Into<String>, records: Vec<NetworkRecord>) {
        self.network_records.insert(pass.into(), records);
    }

    pub fn network_records(&self, pass: &str) -> Option<&[NetworkRecord]> {
        self.network_records.get(pass).map(Vec::as_slice)
    }
}

/// Everything a gatherer hook needs to talk to the page.
pub struct PassContext<'a> {
    pub session: &'a Session,
    /// URL the pass navigates to.
    pub url: &'a str,
    /// Deadline applied to each command the hook issues.
    pub command_timeout: Duration,
}

/// Load-time data one pass collected, handed to every `after_pass`.
#[derive(Debug, Clone, Default)]
pub struct PassLoadData {
    pub trace_events: Vec<TraceEvent>,
    pub network_records: Vec<NetworkRecord>,
}

/// A unit that collects one artifact via lifecycle hooks around a pass.
///
/// `before_pass` installs in-page instrumentation before navigation;
/// `after_pass` computes the artifact from whatever the pass recorded. A
/// hook returning `Err` costs only this gatherer's artifact — the pipeline
/// records the sentinel and moves on.
#[async_trait]
pub trait Gatherer: Send + Sync + std::fmt::Debug {
    /// Artifact key this gatherer writes.
    fn name(&self) -> &'static str;

    async fn before_pass(&self, ctx: &PassContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    async fn after_pass(
        &self,
        ctx: &PassContext<'_>,
        load: &PassLoadData,
    ) -> Result<serde_json::Value>;
}

/// Resolve a configured gatherer name.
pub fn gatherer_by_name(name: &str) -> Option<Arc<dyn Gatherer>> {
    match name {
        "url" => Some(Arc::new(url::UrlGatherer)),
        "tags-blocking-first-paint" => {
            Some(Arc::new(tags_blocking_first_paint::TagsBlockingFirstPaint))
        }
        _ => None,
    }
}
