//! Audit contract: static metadata, pure computation, uniform results.
//!
//! An audit is a typed record of metadata paired with a pure function over
//! the finalized artifact store. Audits never see the browser or the
//! session; they read artifacts and return one [`AuditResult`], so they can
//! run concurrently once gathering completes.

pub mod first_meaningful_paint;
pub mod link_blocking_first_paint;
pub mod runner;

pub use runner::run_all;

use crate::error::Result;
use crate::gather::{ArtifactError, ArtifactStore};
use serde::Serialize;
use std::sync::Arc;

/// Static metadata an audit declares once. Never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMeta {
    pub category: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub help_text: &'static str,
    /// Artifact names that must be present before the audit runs.
    pub required_artifacts: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_value: Option<&'static str>,
}

/// Raw audit value: a measurement, a pass/fail, or the failure sentinel.
///
/// The sentinel serializes as `-1`, matching the artifact error shape, so
/// report consumers need a single check for "collection or audit failed".
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Bool(bool),
    Error,
}

impl Serialize for RawValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RawValue::Number(value) => serializer.serialize_f64(*value),
            RawValue::Bool(value) => serializer.serialize_bool(*value),
            RawValue::Error => serializer.serialize_i64(-1),
        }
    }
}

/// The uniform result record every audit produces, exactly once per run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub raw_value: RawValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_info: Option<serde_json::Value>,
}

impl AuditResult {
    /// The failure sentinel, carrying a human-readable reason.
    pub fn error(debug_string: impl Into<String>) -> Self {
        Self {
            raw_value: RawValue::Error,
            score: None,
            display_value: None,
            debug_string: Some(debug_string.into()),
            optimal_value: None,
            extended_info: None,
        }
    }

    /// Propagate an upstream gatherer failure as this audit's result.
    pub fn from_artifact_error(sentinel: &ArtifactError) -> Self {
        Self::error(sentinel.debug_string.clone())
    }

    pub fn is_error(&self) -> bool {
        self.raw_value == RawValue::Error
    }
}

/// Execution state of one audit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditState {
    NotRun,
    Running,
    Succeeded,
    Failed,
}

impl AuditState {
    pub fn can_transition_to(self, target: AuditState) -> bool {
        use AuditState::*;
        matches!(
            (self, target),
            (NotRun, Running) | (Running, Succeeded) | (Running, Failed)
        )
    }
}

/// A scoring routine over the finalized artifact store.
pub trait Audit: Send + Sync {
    fn meta(&self) -> &'static AuditMeta;

    /// Pure over the store: no session access, no side effects.
    fn audit(&self, artifacts: &ArtifactStore) -> Result<AuditResult>;
}

/// The audits a default run executes.
pub fn default_audits() -> Vec<Arc<dyn Audit>> {
    vec![
        Arc::new(first_meaningful_paint::FirstMeaningfulPaint),
        Arc::new(link_blocking_first_paint::LinkBlockingFirstPaint),
    ]
}
