//! Network record assembly from protocol events.
//!
//! One record per request, stitched together across the `Network.*` event
//! sequence: `requestWillBeSent` opens it, `responseReceived` fills in the
//! response shape, `loadingFinished`/`loadingFailed` closes it.

use crate::protocol::ProtocolEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One observed network request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkRecord {
    pub url: String,
    pub mime_type: String,
    /// What triggered the request: "parser", "script", "preload", "other".
    pub initiator_type: String,
    pub transfer_size: u64,
    /// Seconds, on the protocol's monotonic request clock.
    pub start_time: f64,
    pub end_time: f64,
    pub finished: bool,
}

/// Accumulates `Network.*` events for one pass.
#[derive(Debug, Default)]
pub struct NetworkRecorder {
    records: HashMap<String, NetworkRecord>,
    order: Vec<String>,
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one protocol event into the record set. Events for requests the
    /// recorder never saw open are dropped.
    pub fn observe(&mut self, event: &ProtocolEvent) {
        let Some(request_id) = event.params.get("requestId").and_then(Value::as_str) else {
            return;
        };

        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                let record = NetworkRecord {
                    url: str_at(&event.params, "/request/url"),
                    initiator_type: str_at(&event.params, "/initiator/type"),
                    start_time: num_at(&event.params, "/timestamp"),
                    ..NetworkRecord::default()
                };
                if self.records.insert(request_id.to_string(), record).is_none() {
                    self.order.push(request_id.to_string());
                }
            }
            "Network.responseReceived" => {
                if let Some(record) = self.records.get_mut(request_id) {
                    record.mime_type = str_at(&event.params, "/response/mimeType");
                }
            }
            "Network.loadingFinished" => {
                if let Some(record) = self.records.get_mut(request_id) {
                    record.transfer_size = num_at(&event.params, "/encodedDataLength") as u64;
                    record.end_time = num_at(&event.params, "/timestamp");
                    record.finished = true;
                }
            }
            "Network.loadingFailed" => {
                if let Some(record) = self.records.get_mut(request_id) {
                    record.end_time = num_at(&event.params, "/timestamp");
                    record.finished = false;
                }
            }
            _ => {}
        }
    }

    /// Records in first-seen order.
    pub fn into_records(mut self) -> Vec<NetworkRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.remove(id))
            .collect()
    }
}

fn str_at(params: &Value, pointer: &str) -> String {
    params
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn num_at(params: &Value, pointer: &str) -> f64 {
    params.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
}
