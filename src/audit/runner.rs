//! Executes every registered audit, isolating per-audit failures.
//!
//! Each audit runs on its own task over the shared read-only store. Any
//! failure — a missing required artifact, an upstream gatherer sentinel, an
//! `Err` from the audit body, even a panic — is converted into that audit's
//! failure sentinel. The result map always has one entry per audit.

use super::{Audit, AuditResult, AuditState};
use crate::gather::{Artifact, ArtifactStore};
use crate::status::StatusSink;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Run every audit and collect results keyed by audit name.
pub async fn run_all(
    audits: &[Arc<dyn Audit>],
    artifacts: Arc<ArtifactStore>,
    status: &StatusSink,
) -> BTreeMap<String, AuditResult> {
    let mut handles = Vec::with_capacity(audits.len());
    for audit in audits {
        let audit = Arc::clone(audit);
        let artifacts = Arc::clone(&artifacts);
        let name = audit.meta().name;
        status.status("audit", format!("running {name}"));
        handles.push((name, tokio::spawn(async move { run_one(audit.as_ref(), &artifacts) })));
    }

    let mut results = BTreeMap::new();
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            // A panicking audit still yields a well-formed failure entry.
            Err(join_error) => {
                tracing::error!(audit = name, %join_error, "audit panicked");
                AuditResult::error(format!("audit panicked: {join_error}"))
            }
        };
        results.insert(name.to_string(), result);
    }
    results
}

fn run_one(audit: &dyn Audit, artifacts: &ArtifactStore) -> AuditResult {
    let meta = audit.meta();
    let mut state = AuditState::NotRun;
    debug_assert!(state.can_transition_to(AuditState::Running));
    state = AuditState::Running;

    for required in meta.required_artifacts {
        if !artifacts.contains(required) {
            // The pass list never scheduled a gatherer for this artifact —
            // a configuration error, reported loudly but still isolated.
            tracing::error!(audit = meta.name, artifact = required, "required artifact missing");
            finish(meta.name, &mut state, AuditState::Failed);
            return AuditResult::error(format!("required artifact `{required}` was never collected"));
        }
        if let Some(Artifact::Error(sentinel)) = artifacts.get(required) {
            // Upstream collection failed; propagate its sentinel untouched
            // instead of computing over absent data.
            finish(meta.name, &mut state, AuditState::Failed);
            return AuditResult::from_artifact_error(sentinel);
        }
    }

    match audit.audit(artifacts) {
        Ok(result) => {
            finish(meta.name, &mut state, AuditState::Succeeded);
            result
        }
        Err(error) => {
            tracing::warn!(audit = meta.name, %error, "audit failed");
            finish(meta.name, &mut state, AuditState::Failed);
            AuditResult::error(error.to_string())
        }
    }
}

fn finish(name: &str, state: &mut AuditState, target: AuditState) {
    debug_assert!(state.can_transition_to(target));
    *state = target;
    tracing::debug!(audit = name, state = ?target, "audit finished");
}
