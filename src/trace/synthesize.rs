//! Synthesized measurement events for trace visualization.
//!
//! For each milestone after navigation start, append a paired async
//! begin/end event spanning navigation start → milestone, cloned from the
//! navigation start event's process/thread identity so viewers place the
//! interval on the right track. Original events are never mutated.

use super::correlate::{MilestoneRow, Milestones};
use super::TraceEvent;
use std::sync::atomic::{AtomicU64, Ordering};

/// Id source for synthetic trace events. Uniqueness within a run is the
/// only requirement, so a monotonic counter is enough.
#[derive(Debug, Default)]
pub struct SyntheticIds(AtomicU64);

impl SyntheticIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, formatted the way real async trace events carry theirs.
    pub fn next_hex(&self) -> String {
        format!("0x{:x}", self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Build begin/end interval pairs for every observed milestone.
pub fn synthesize_measurements(milestones: &Milestones, ids: &SyntheticIds) -> Vec<TraceEvent> {
    synthesize_rows(&milestones.navigation_start, &milestones.rows(), ids)
}

fn synthesize_rows(
    navigation_start: &TraceEvent,
    rows: &[MilestoneRow],
    ids: &SyntheticIds,
) -> Vec<TraceEvent> {
    let mut out = Vec::new();
    for row in rows {
        // Navigation start anchors every interval; it gets no interval of
        // its own, and unobserved milestones are skipped.
        if row.name == "navstart" {
            continue;
        }
        let Some(ts) = row.ts else {
            continue;
        };

        let id = ids.next_hex();
        let begin = TraceEvent {
            pid: navigation_start.pid,
            tid: navigation_start.tid,
            ts: navigation_start.ts,
            ph: "b".to_string(),
            cat: "blink.user_timing".to_string(),
            name: row.title.to_string(),
            args: navigation_start.args.clone(),
            id: Some(id.clone()),
        };
        let end = TraceEvent {
            ts,
            ph: "e".to_string(),
            ..begin.clone()
        };
        out.push(begin);
        out.push(end);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::correlate::{correlate, tests::sample_trace};

    fn sample_milestones() -> Milestones {
        correlate(&sample_trace()).unwrap()
    }

    #[test]
    fn each_milestone_gets_a_begin_end_pair() {
        let ids = SyntheticIds::new();
        let events = synthesize_measurements(&sample_milestones(), &ids);

        // FCP and FMP, two events each; navigation start skipped.
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.name != "Navigation Start"));
        assert_eq!(events[0].ph, "b");
        assert_eq!(events[1].ph, "e");
        assert_eq!(events[0].name, "First Contentful Paint");
        assert_eq!(events[2].name, "First Meaningful Paint");
    }

    #[test]
    fn pairs_span_navigation_start_to_milestone() {
        let ids = SyntheticIds::new();
        let milestones = sample_milestones();
        let events = synthesize_measurements(&milestones, &ids);

        assert_eq!(events[0].ts, milestones.navigation_start.ts);
        assert_eq!(events[1].ts, milestones.first_contentful_paint.ts);
        assert_eq!(events[2].ts, milestones.navigation_start.ts);
        assert_eq!(events[3].ts, milestones.first_meaningful_paint.ts);
    }

    #[test]
    fn pairs_inherit_navigation_start_identity() {
        let ids = SyntheticIds::new();
        let milestones = sample_milestones();
        let events = synthesize_measurements(&milestones, &ids);

        for event in &events {
            assert_eq!(event.pid, milestones.navigation_start.pid);
            assert_eq!(event.tid, milestones.navigation_start.tid);
            assert_eq!(event.cat, "blink.user_timing");
        }
    }

    #[test]
    fn ids_are_unique_per_pair_and_shared_within_one() {
        let ids = SyntheticIds::new();
        let events = synthesize_measurements(&sample_milestones(), &ids);

        assert_eq!(events[0].id, events[1].id);
        assert_eq!(events[2].id, events[3].id);
        assert_ne!(events[0].id, events[2].id);
    }

    #[test]
    fn absent_milestones_are_skipped() {
        let milestones = sample_milestones();
        let rows = vec![
            MilestoneRow { title: "Navigation Start", name: "navstart", ts: Some(1_000) },
            MilestoneRow { title: "Perceptual Speed Index", name: "psi", ts: None },
            MilestoneRow { title: "First Contentful Paint", name: "ttfcp", ts: Some(1_500_000) },
        ];
        let ids = SyntheticIds::new();
        let events = synthesize_rows(&milestones.navigation_start, &rows, &ids);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "First Contentful Paint");
    }

    #[test]
    fn originals_are_untouched() {
        let milestones = sample_milestones();
        let before = milestones.clone();
        let ids = SyntheticIds::new();
        let _ = synthesize_measurements(&milestones, &ids);
        assert_eq!(milestones.navigation_start, before.navigation_start);
        assert_eq!(milestones.first_meaningful_paint, before.first_meaningful_paint);
    }
}
