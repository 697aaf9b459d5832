//! Milestone correlation over a raw trace event stream.
//!
//! Pure and deterministic: the same input sequence always yields the same
//! milestones. The frame of interest is fixed by the first
//! `TracingStartedInPage` event; everything else filters to that frame.

use super::TraceEvent;
use crate::error::TraceError;

/// Milestone events for the frame of interest.
///
/// Every milestone carries its full trace event, so absolute monotonic
/// timestamps stay available; millisecond values relative to navigation
/// start are derived, never stored.
#[derive(Debug, Clone)]
pub struct Milestones {
    pub navigation_start: TraceEvent,
    pub first_contentful_paint: TraceEvent,
    pub first_meaningful_paint: TraceEvent,
}

/// A named milestone timestamp, as consumed by measurement synthesis.
#[derive(Debug, Clone)]
pub struct MilestoneRow {
    /// Human-readable title, used as the synthetic event name.
    pub title: &'static str,
    pub name: &'static str,
    /// Absolute monotonic microseconds; `None` when the milestone was not
    /// observed.
    pub ts: Option<u64>,
}

impl Milestones {
    /// Milliseconds from navigation start to first contentful paint.
    pub fn first_contentful_paint_ms(&self) -> f64 {
        (self.first_contentful_paint.ts - self.navigation_start.ts) as f64 / 1000.0
    }

    /// Milliseconds from navigation start to first meaningful paint.
    pub fn first_meaningful_paint_ms(&self) -> f64 {
        (self.first_meaningful_paint.ts - self.navigation_start.ts) as f64 / 1000.0
    }

    /// Milestone rows in presentation order, navigation start first.
    pub fn rows(&self) -> Vec<MilestoneRow> {
        vec![
            MilestoneRow {
                title: "Navigation Start",
                name: "navstart",
                ts: Some(self.navigation_start.ts),
            },
            MilestoneRow {
                title: "First Contentful Paint",
                name: "ttfcp",
                ts: Some(self.first_contentful_paint.ts),
            },
            MilestoneRow {
                title: "First Meaningful Paint",
                name: "ttfmp",
                ts: Some(self.first_meaningful_paint.ts),
            },
        ]
    }
}

/// Extract paint milestones from a raw trace.
///
/// Filters to `TracingStartedInPage` and `blink.user_timing` events, sorts
/// by timestamp (stable, so ties keep stream order), fixes the frame of
/// interest from the first `TracingStartedInPage`, then selects:
/// the first `firstContentfulPaint`; the **last** `navigationStart` strictly
/// before it (pages may navigate several times before the frame settles);
/// and the first `firstMeaningfulPaint` at or after it.
pub fn correlate(events: &[TraceEvent]) -> Result<Milestones, TraceError> {
    let mut keyed: Vec<&TraceEvent> = events
        .iter()
        .filter(|e| e.cat.contains("blink.user_timing") || e.name == "TracingStartedInPage")
        .collect();
    keyed.sort_by_key(|e| e.ts);

    let started = keyed
        .iter()
        .find(|e| e.name == "TracingStartedInPage")
        .ok_or(TraceError::MissingMilestone {
            kind: "TracingStartedInPage",
        })?;
    let page = started
        .args
        .pointer("/data/page")
        .and_then(serde_json::Value::as_str)
        .ok_or(TraceError::MissingMilestone {
            kind: "TracingStartedInPage",
        })?;

    // Only events attributed to the frame of interest count.
    let frame_events: Vec<&TraceEvent> =
        keyed.iter().copied().filter(|e| e.frame() == Some(page)).collect();

    let fcp = frame_events
        .iter()
        .find(|e| e.name == "firstContentfulPaint")
        .ok_or(TraceError::MissingMilestone {
            kind: "firstContentfulPaint",
        })?;

    let navigation_start = frame_events
        .iter()
        .filter(|e| e.name == "navigationStart" && e.ts < fcp.ts)
        .next_back()
        .ok_or(TraceError::MissingMilestone {
            kind: "navigationStart",
        })?;

    let fmp = frame_events
        .iter()
        .find(|e| e.name == "firstMeaningfulPaint" && e.ts >= fcp.ts)
        .ok_or(TraceError::MissingMilestone {
            kind: "firstMeaningfulPaint",
        })?;

    Ok(Milestones {
        navigation_start: (*navigation_start).clone(),
        first_contentful_paint: (*fcp).clone(),
        first_meaningful_paint: (*fmp).clone(),
    })
}
