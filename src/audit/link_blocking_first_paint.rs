//! Flags resources that delayed first paint.

use super::{Audit, AuditMeta, AuditResult, RawValue};
use crate::error::Result;
use crate::gather::tags_blocking_first_paint::BlockingTagSummary;
use crate::gather::ArtifactStore;
use anyhow::{anyhow, Context as _};

static META: AuditMeta = AuditMeta {
    category: "Performance",
    name: "link-blocking-first-paint",
    description: "Site does not use link elements that delay first paint",
    help_text: "Synchronous stylesheets and HTML imports in the head hold \
                back rendering until they finish downloading.",
    required_artifacts: &["tags-blocking-first-paint"],
    optimal_value: None,
};

/// Passes when no confirmed blocking tag remains after cross-referencing
/// the DOM candidates with the pass's network records.
pub struct LinkBlockingFirstPaint;

impl Audit for LinkBlockingFirstPaint {
    fn meta(&self) -> &'static AuditMeta {
        &META
    }

    fn audit(&self, artifacts: &ArtifactStore) -> Result<AuditResult> {
        let artifact = artifacts
            .get("tags-blocking-first-paint")
            .ok_or_else(|| anyhow!("tags-blocking-first-paint artifact absent"))?;
        if let Some(sentinel) = artifact.as_error() {
            return Ok(AuditResult::from_artifact_error(sentinel));
        }

        let summary: BlockingTagSummary = serde_json::from_value(
            artifact.as_value().cloned().unwrap_or_default(),
        )
        .context("tags-blocking-first-paint artifact has an unexpected shape")?;

        let count = summary.items.len();
        Ok(AuditResult {
            raw_value: RawValue::Bool(count == 0),
            score: None,
            display_value: Some(format!(
                "{count} resources delayed first paint by {}ms",
                summary.total_spend_time_ms
            )),
            debug_string: None,
            optimal_value: None,
            extended_info: Some(serde_json::to_value(&summary).map_err(anyhow::Error::from)?),
        })
    }
}
