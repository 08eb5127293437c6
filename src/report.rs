//! Report encoding
//!
//! This module defines what the report sink sees each frame (a [`Snapshot`]
//! plus any [`SessionEvent`]s) and encodes it into versioned JSON payloads
//! stamped with producer metadata.

use crate::balance::{BalanceSnapshot, TrialResult};
use crate::error::GateError;
use crate::pipeline::Stage;
use crate::positioning::PositioningSnapshot;
use crate::types::Foot;
use crate::{POSEGATE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "pose.report.v1";

/// Read-only view of the whole session, re-emitted every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: String,
    pub stage: Stage,
    /// Timestamp of the last processed frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioning: Option<PositioningSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceSnapshot>,
    /// Accessible, human-readable status
    pub status_text: String,
}

/// Signals for the stage controller, emitted on the frame they occur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Advanced { held_seconds: u32, at: DateTime<Utc> },
    TrialStarted { foot: Foot, at: DateTime<Utc> },
    TrialHoldTick { foot: Foot, seconds: u32 },
    TrialEnded { result: TrialResult },
    Completed { at: DateTime<Utc> },
}

/// Outcome of processing one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    pub snapshot: Snapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SessionEvent>,
}

/// Producer metadata stamped on every payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned per-frame payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_version: String,
    pub producer: ReportProducer,
    #[serde(flatten)]
    pub report: FrameReport,
}

/// Versioned end-of-session payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub report_version: String,
    pub producer: ReportProducer,
    pub session_id: String,
    pub completed: bool,
    pub results: Vec<TrialResult>,
}

/// Encoder for report payloads
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    fn producer(&self) -> ReportProducer {
        ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: POSEGATE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn encode(&self, report: &FrameReport) -> ReportPayload {
        ReportPayload {
            report_version: REPORT_VERSION.to_string(),
            producer: self.producer(),
            report: report.clone(),
        }
    }

    /// Encode a frame report to a single-line JSON string
    pub fn encode_to_json(&self, report: &FrameReport) -> Result<String, GateError> {
        serde_json::to_string(&self.encode(report))
            .map_err(|e| GateError::EncodingError(e.to_string()))
    }

    pub fn summarize(
        &self,
        session_id: &str,
        completed: bool,
        results: &[TrialResult],
    ) -> SessionSummary {
        SessionSummary {
            report_version: REPORT_VERSION.to_string(),
            producer: self.producer(),
            session_id: session_id.to_string(),
            completed,
            results: results.to_vec(),
        }
    }

    /// Encode the trial results of a session to JSON
    pub fn summary_to_json(
        &self,
        session_id: &str,
        completed: bool,
        results: &[TrialResult],
    ) -> Result<String, GateError> {
        serde_json::to_string(&self.summarize(session_id, completed, results))
            .map_err(|e| GateError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::TrialOutcome;
    use crate::types::PositionStatus;

    fn sample_report() -> FrameReport {
        let at = "2024-01-15T08:00:05Z".parse::<DateTime<Utc>>().unwrap();
        FrameReport {
            frame_id: Some("f-150".to_string()),
            snapshot: Snapshot {
                session_id: "session-1".to_string(),
                stage: Stage::BalanceTrial { foot: Foot::Left },
                timestamp: Some(at),
                positioning: None,
                balance: None,
                status_text: PositionStatus::PositionCorrect.message().to_string(),
            },
            events: vec![
                SessionEvent::Advanced { held_seconds: 5, at },
                SessionEvent::TrialStarted { foot: Foot::Left, at },
            ],
        }
    }

    #[test]
    fn test_encode_frame_report() {
        let encoder = ReportEncoder::with_instance_id("instance-1".to_string());
        let json = encoder.encode_to_json(&sample_report()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(payload["report_version"], REPORT_VERSION);
        assert_eq!(payload["producer"]["name"], "posegate");
        assert_eq!(payload["producer"]["instance_id"], "instance-1");
        assert_eq!(payload["frame_id"], "f-150");
        assert_eq!(payload["snapshot"]["stage"]["stage"], "balance_trial");
        assert_eq!(payload["snapshot"]["stage"]["foot"], "left");
        assert_eq!(payload["events"][0]["event"], "advanced");
        assert_eq!(payload["events"][0]["held_seconds"], 5);
        assert_eq!(payload["events"][1]["event"], "trial_started");
    }

    #[test]
    fn test_summary_lists_results() {
        let encoder = ReportEncoder::new();
        let result = TrialResult {
            foot: Foot::Right,
            outcome: TrialOutcome::FootDown,
            held_seconds: 12,
            hold_started_at: None,
            ended_at: "2024-01-15T08:01:00Z".parse().unwrap(),
        };

        let json = encoder.summary_to_json("session-1", false, &[result]).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(payload["completed"], false);
        assert_eq!(payload["results"][0]["foot"], "right");
        assert_eq!(payload["results"][0]["outcome"], "foot_down");
        assert_eq!(payload["results"][0]["held_seconds"], 12);
        assert!(payload["results"][0].get("hold_started_at").is_none());
    }

    #[test]
    fn test_event_round_trip() {
        let event = SessionEvent::TrialHoldTick { foot: Foot::Left, seconds: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"trial_hold_tick","foot":"left","seconds":3}"#);
        assert_eq!(serde_json::from_str::<SessionEvent>(&json).unwrap(), event);
    }
}
