//! pose.frame.v1 schema definition
//!
//! One record per processed video frame: a timestamp and whatever keypoints
//! the pose model produced for it. An absent, `null`, or empty keypoint list
//! all mean "nothing detected". A malformed entry only loses that keypoint.

use crate::types::{Keypoint, KeypointName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Current schema version
pub const SCHEMA_VERSION: &str = "pose.frame.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// `null` reads as an empty list; entries that are not a readable keypoint are dropped
fn lenient_keypoints<'de, D>(deserializer: D) -> Result<Vec<Keypoint>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Keypoint>(entry) {
            Ok(keypoint) => Some(keypoint),
            Err(e) => {
                debug!(error = %e, "dropping unreadable keypoint");
                None
            }
        })
        .collect())
}

/// Producer of the keypoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSource {
    /// Pose model (e.g., "movenet-lightning")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Camera or device identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// The main pose.frame.v1 record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Schema version identifier
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Optional frame identifier, echoed in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    /// Capture time (UTC); hold timers measure real seconds between these
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FrameSource>,
    #[serde(default, deserialize_with = "lenient_keypoints")]
    pub keypoints: Vec<Keypoint>,
}

impl FrameRecord {
    pub fn new(timestamp: DateTime<Utc>, keypoints: Vec<Keypoint>) -> Self {
        FrameRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            frame_id: None,
            timestamp,
            source: None,
            keypoints,
        }
    }

    /// A frame in which nothing was detected
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, Vec::new())
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }

    pub fn with_source(mut self, source: FrameSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Check the record against the schema.
    ///
    /// Processing does not require a valid record; invalid keypoints are
    /// simply treated as unusable. This is for tooling that wants to flag
    /// a misbehaving producer.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        for keypoint in &self.keypoints {
            if !(0.0..=1.0).contains(&keypoint.confidence) {
                return Err(ValidationError::ConfidenceOutOfRange {
                    name: keypoint.name.as_str().to_string(),
                    value: keypoint.confidence,
                });
            }
            if !keypoint.x.is_finite() || !keypoint.y.is_finite() {
                return Err(ValidationError::NonFiniteCoordinate {
                    name: keypoint.name.as_str().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Number of keypoints whose label is not a known body joint
    pub fn unknown_keypoint_count(&self) -> usize {
        self.keypoints
            .iter()
            .filter(|kp| matches!(kp.name, KeypointName::Other(_)))
            .count()
    }
}

/// Validation errors for frame records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Keypoint {name} has confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { name: String, value: f64 },

    #[error("Keypoint {name} has a non-finite coordinate")]
    NonFiniteCoordinate { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_frame() {
        let json = r#"{
            "schema_version": "pose.frame.v1",
            "frame_id": "f-1",
            "timestamp": "2024-01-15T08:30:00Z",
            "source": { "model": "movenet-lightning" },
            "keypoints": [
                { "name": "left_shoulder", "x": 150.0, "y": 100.0, "score": 0.92 },
                { "name": "right_shoulder", "x": 100.0, "y": 100.0, "confidence": 0.88 }
            ]
        }"#;

        let frame: FrameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(frame.frame_id.as_deref(), Some("f-1"));
        assert_eq!(frame.keypoints.len(), 2);
        assert_eq!(frame.keypoints[0].name, KeypointName::LeftShoulder);
        assert_eq!(frame.keypoints[0].confidence, 0.92);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_missing_and_null_keypoints_are_empty() {
        let missing: FrameRecord =
            serde_json::from_str(r#"{"timestamp": "2024-01-15T08:30:00Z"}"#).unwrap();
        assert!(missing.keypoints.is_empty());
        assert_eq!(missing.schema_version, SCHEMA_VERSION);

        let null: FrameRecord =
            serde_json::from_str(r#"{"timestamp": "2024-01-15T08:30:00Z", "keypoints": null}"#)
                .unwrap();
        assert!(null.keypoints.is_empty());
    }

    #[test]
    fn test_malformed_keypoint_entries_are_dropped() {
        let frame: FrameRecord = serde_json::from_str(
            r#"{"timestamp": "2024-01-15T08:30:00Z", "keypoints": [
                {"x": 1.0, "y": 2.0, "score": 0.9},
                {"name": "nose", "x": "left", "y": 2.0, "score": 0.9},
                {"name": "left_ankle", "x": 1.0, "y": 2.0, "score": null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(frame.keypoints.len(), 1);
        assert_eq!(frame.keypoints[0].name, KeypointName::LeftAnkle);
        assert_eq!(frame.keypoints[0].confidence, 0.0);
    }

    #[test]
    fn test_validation_flags_bad_confidence() {
        let frame = FrameRecord::new(
            Utc::now(),
            vec![Keypoint::new(KeypointName::Nose, 1.0, 1.0, 1.5)],
        );
        assert!(matches!(
            frame.validate(),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_validation_flags_schema_version() {
        let mut frame = FrameRecord::empty(Utc::now());
        frame.schema_version = "pose.frame.v0".to_string();
        assert!(matches!(
            frame.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_unknown_labels_are_counted() {
        let frame = FrameRecord::new(
            Utc::now(),
            vec![
                Keypoint::new(KeypointName::Other("left_heel".to_string()), 1.0, 1.0, 0.9),
                Keypoint::new(KeypointName::LeftAnkle, 1.0, 1.0, 0.9),
            ],
        );
        assert_eq!(frame.unknown_keypoint_count(), 1);
    }
}
