//! Trace event model and milestone extraction.

pub mod correlate;
pub mod synthesize;

pub use correlate::{correlate, Milestones};
pub use synthesize::{synthesize_measurements, SyntheticIds};

use serde::{Deserialize, Serialize};

/// One record in the browser's trace event stream.
///
/// Timestamps are monotonic microseconds. They share a clock domain only
/// within one (pid, tid) pair — comparing `ts` across pids is meaningless
/// without first checking the domain matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub pid: i64,
    pub tid: i64,
    pub ts: u64,
    /// Phase marker: `B`/`E` duration, `I` instant, `R` mark, `b`/`e` async.
    pub ph: String,
    pub cat: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TraceEvent {
    /// The frame this event belongs to, when it declares one.
    pub fn frame(&self) -> Option<&str> {
        self.args.get("frame").and_then(serde_json::Value::as_str)
    }
}
