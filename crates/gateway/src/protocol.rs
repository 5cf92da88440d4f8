//! Stream protocol message types.
//!
//! Every stream message carries the complete snapshot; there is no delta
//! encoding, so a consumer can apply any message without prior state.

use normalizer::Snapshot;
use serde::Serialize;

/// Message pushed from server to client on the event stream.
///
/// Serialized as `{"type": "snapshot" | "tick", "state": Snapshot}`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum StreamMessage<'a> {
    /// Full state sent once, immediately after a client connects.
    Snapshot(&'a Snapshot),
    /// Full state sent after every generator tick.
    Tick(&'a Snapshot),
}

impl StreamMessage<'_> {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Snapshot(_) => "snapshot",
            StreamMessage::Tick(_) => "tick",
        }
    }

    /// Serialize once for fan-out.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Health endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Connected stream clients.
    pub clients: usize,
    /// Generator ticks since start.
    pub ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_stream_message_envelope() {
        let snapshot = normalizer::build_demo_at(1_704_067_200_000);

        let json = StreamMessage::Snapshot(&snapshot).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["state"]["kpi"]["reductionPct"], 64);

        let json = StreamMessage::Tick(&snapshot).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "tick");
        assert_eq!(value["state"]["weekdaySeries"].as_array().unwrap().len(), 5);
    }
}
