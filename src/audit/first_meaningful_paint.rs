//! Scores time to first meaningful paint on a log-normal curve.

use super::{Audit, AuditMeta, AuditResult, RawValue};
use crate::error::Result;
use crate::gather::ArtifactStore;
use crate::scoring::{self, ScoringCurve};
use crate::trace::{self, Milestones};
use anyhow::anyhow;
use serde_json::json;

// Control points (in ms) for log-normal scoring:
//   < 1100ms: score ~100, 4000ms: score 50, >= 14000ms: score ~0.
const SCORING_MEDIAN: f64 = 4000.0;
const SCORING_POINT_OF_DIMINISHING_RETURNS: f64 = 1600.0;

static META: AuditMeta = AuditMeta {
    category: "Performance",
    name: "first-meaningful-paint",
    description: "First meaningful paint",
    help_text: "First meaningful paint measures when the primary content of \
                a page is visible.",
    required_artifacts: &["traces"],
    optimal_value: Some("1,600ms"),
};

/// Time from navigation start to the paint of the page's primary content,
/// extracted from the default pass's trace.
pub struct FirstMeaningfulPaint;

impl Audit for FirstMeaningfulPaint {
    fn meta(&self) -> &'static AuditMeta {
        &META
    }

    fn audit(&self, artifacts: &ArtifactStore) -> Result<AuditResult> {
        let events = artifacts
            .default_trace()
            .ok_or_else(|| anyhow!("no trace recorded for any pass"))?;
        // Correlation failure propagates as Err; the runner turns it into
        // this audit's failure sentinel.
        let milestones = trace::correlate(events)?;
        Ok(score_milestones(&milestones))
    }
}

fn score_milestones(milestones: &Milestones) -> AuditResult {
    let fmp_ms = milestones.first_meaningful_paint_ms();
    let fcp_ms = milestones.first_contentful_paint_ms();

    let curve = ScoringCurve {
        median: SCORING_MEDIAN,
        point_of_diminishing_returns: SCORING_POINT_OF_DIMINISHING_RETURNS,
    };
    let score = scoring::score_rounded(fmp_ms, &curve);

    // Raw monotonic timestamps alongside durations relative to navigation
    // start, for trace viewers and downstream synthesis.
    let extended_info = json!({
        "timestamps": {
            "navStart": milestones.navigation_start.ts,
            "fCP": milestones.first_contentful_paint.ts,
            "fMP": milestones.first_meaningful_paint.ts,
        },
        "timings": {
            "navStart": 0.0,
            "fCP": fcp_ms,
            "fMP": fmp_ms,
        },
    });

    AuditResult {
        raw_value: RawValue::Number((fmp_ms * 10.0).round() / 10.0),
        score: Some(score),
        display_value: Some(format!("{fmp_ms:.1}ms")),
        debug_string: None,
        optimal_value: META.optimal_value.map(str::to_string),
        extended_info: Some(extended_info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather::{ArtifactStore, DEFAULT_PASS};
    use crate::trace::correlate::tests::{started_in_page, user_timing, PAGE};

    fn store_with_trace(events: Vec<crate::trace::TraceEvent>) -> ArtifactStore {
        let mut store = ArtifactStore::default();
        store.insert_trace(DEFAULT_PASS, events);
        store
    }

    #[test]
    fn median_paint_scores_fifty() {
        // FMP lands exactly 4000ms after navigation start.
        let store = store_with_trace(vec![
            started_in_page(500),
            user_timing("navigationStart", 1_000_000, PAGE),
            user_timing("firstContentfulPaint", 2_000_000, PAGE),
            user_timing("firstMeaningfulPaint", 5_000_000, PAGE),
        ]);
        let result = FirstMeaningfulPaint.audit(&store).unwrap();

        assert_eq!(result.raw_value, RawValue::Number(4000.0));
        assert_eq!(result.score, Some(50));
        assert_eq!(result.display_value.as_deref(), Some("4000.0ms"));
    }

    #[test]
    fn fast_paint_scores_high() {
        let store = store_with_trace(vec![
            started_in_page(500),
            user_timing("navigationStart", 1_000_000, PAGE),
            user_timing("firstContentfulPaint", 1_500_000, PAGE),
            user_timing("firstMeaningfulPaint", 1_800_000, PAGE),
        ]);
        let result = FirstMeaningfulPaint.audit(&store).unwrap();

        assert_eq!(result.raw_value, RawValue::Number(800.0));
        assert!(result.score.unwrap() >= 99);

        let info = result.extended_info.unwrap();
        assert_eq!(info["timings"]["fCP"], 500.0);
        assert_eq!(info["timings"]["fMP"], 800.0);
        assert_eq!(info["timestamps"]["navStart"], 1_000_000);
    }

    #[test]
    fn correlation_failure_surfaces_as_error() {
        // FCP/FMP with no navigationStart before them.
        let store = store_with_trace(vec![
            started_in_page(500),
            user_timing("firstContentfulPaint", 1_500_000, PAGE),
            user_timing("firstMeaningfulPaint", 1_800_000, PAGE),
        ]);
        let error = FirstMeaningfulPaint.audit(&store).unwrap_err();
        assert!(error.to_string().contains("navigationStart"));
    }

    #[test]
    fn empty_store_is_an_error() {
        let error = FirstMeaningfulPaint.audit(&ArtifactStore::default()).unwrap_err();
        assert!(error.to_string().contains("no trace"));
    }
}
