//! Core types for the posegate state machines
//!
//! This module defines the data that flows into the classifiers each frame
//! (keypoints) and the discrete values they emit (positioning status, expected
//! foot).

use serde::{Deserialize, Deserializer, Serialize};

/// Minimum confidence for a keypoint to be considered usable (exclusive).
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Body joint labels produced by the pose model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    /// Labels from other models are carried through but never looked up
    #[serde(untagged)]
    Other(String),
}

impl KeypointName {
    pub fn as_str(&self) -> &str {
        match self {
            KeypointName::Nose => "nose",
            KeypointName::LeftEye => "left_eye",
            KeypointName::RightEye => "right_eye",
            KeypointName::LeftEar => "left_ear",
            KeypointName::RightEar => "right_ear",
            KeypointName::LeftShoulder => "left_shoulder",
            KeypointName::RightShoulder => "right_shoulder",
            KeypointName::LeftElbow => "left_elbow",
            KeypointName::RightElbow => "right_elbow",
            KeypointName::LeftWrist => "left_wrist",
            KeypointName::RightWrist => "right_wrist",
            KeypointName::LeftHip => "left_hip",
            KeypointName::RightHip => "right_hip",
            KeypointName::LeftKnee => "left_knee",
            KeypointName::RightKnee => "right_knee",
            KeypointName::LeftAnkle => "left_ankle",
            KeypointName::RightAnkle => "right_ankle",
            KeypointName::Other(name) => name.as_str(),
        }
    }
}

/// A named, confidence-scored 2-D estimate of a body joint's image location.
///
/// Coordinates use a top-left image origin, so a smaller `y` is higher up.
///
/// Missing or `null` numbers deserialize to values [`Keypoint::is_usable`]
/// rejects, so a partial record drops out instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: KeypointName,
    #[serde(default = "missing_coordinate", deserialize_with = "coordinate_or_nan")]
    pub x: f64,
    #[serde(default = "missing_coordinate", deserialize_with = "coordinate_or_nan")]
    pub y: f64,
    /// Detection confidence (0.0 - 1.0)
    #[serde(alias = "score", default, deserialize_with = "confidence_or_zero")]
    pub confidence: f64,
}

fn missing_coordinate() -> f64 {
    f64::NAN
}

fn coordinate_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn confidence_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl Keypoint {
    pub fn new(name: KeypointName, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            name,
            x,
            y,
            confidence,
        }
    }

    /// Whether this keypoint can be trusted for geometry.
    ///
    /// NaN confidence and non-finite coordinates are never usable.
    pub fn is_usable(&self, threshold: f64) -> bool {
        self.confidence > threshold && self.x.is_finite() && self.y.is_finite()
    }
}

/// Look up a keypoint by name, ignoring entries that are not usable.
pub fn find_usable<'a>(
    keypoints: &'a [Keypoint],
    name: &KeypointName,
    threshold: f64,
) -> Option<&'a Keypoint> {
    keypoints
        .iter()
        .find(|kp| &kp.name == name && kp.is_usable(threshold))
}

/// Keep only the keypoints that pass the confidence gate.
pub fn usable_keypoints(keypoints: &[Keypoint], threshold: f64) -> Vec<Keypoint> {
    keypoints
        .iter()
        .filter(|kp| kp.is_usable(threshold))
        .cloned()
        .collect()
}

/// Leg expected to be raised during a balance trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Foot::Left => "left",
            Foot::Right => "right",
        }
    }

    pub fn opposite(&self) -> Foot {
        match self {
            Foot::Left => Foot::Right,
            Foot::Right => Foot::Left,
        }
    }

    /// Ankle keypoint that tracks this foot
    pub fn ankle(&self) -> KeypointName {
        match self {
            Foot::Left => KeypointName::LeftAnkle,
            Foot::Right => KeypointName::RightAnkle,
        }
    }
}

/// Discrete classification of whether/how the subject should move to be framed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Nothing evaluated yet
    #[default]
    Positioning,
    MoveForward,
    MoveBackward,
    PositionCorrect,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Positioning => "positioning",
            PositionStatus::MoveForward => "move_forward",
            PositionStatus::MoveBackward => "move_backward",
            PositionStatus::PositionCorrect => "position_correct",
        }
    }

    /// Accessible status text for screen readers and captions
    pub fn message(&self) -> &'static str {
        match self {
            PositionStatus::Positioning => "Stand facing the camera with your whole body in view",
            PositionStatus::MoveForward => "Step closer to the camera",
            PositionStatus::MoveBackward => "Step back from the camera",
            PositionStatus::PositionCorrect => "Good position, hold still",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_name_round_trip_and_fallback() {
        let name: KeypointName = serde_json::from_str("\"left_shoulder\"").unwrap();
        assert_eq!(name, KeypointName::LeftShoulder);

        let other: KeypointName = serde_json::from_str("\"left_big_toe\"").unwrap();
        assert_eq!(other, KeypointName::Other("left_big_toe".to_string()));
        assert_eq!(other.as_str(), "left_big_toe");
    }

    #[test]
    fn test_score_alias() {
        let kp: Keypoint =
            serde_json::from_str(r#"{"name":"nose","x":1.0,"y":2.0,"score":0.9}"#).unwrap();
        assert_eq!(kp.confidence, 0.9);
    }

    #[test]
    fn test_partial_keypoint_is_unusable_not_an_error() {
        let null_score: Keypoint =
            serde_json::from_str(r#"{"name":"left_ankle","x":1.0,"y":2.0,"score":null}"#).unwrap();
        assert_eq!(null_score.confidence, 0.0);
        assert!(!null_score.is_usable(CONFIDENCE_THRESHOLD));

        let no_score: Keypoint =
            serde_json::from_str(r#"{"name":"left_ankle","x":1.0,"y":2.0}"#).unwrap();
        assert_eq!(no_score.confidence, 0.0);

        let null_y: Keypoint =
            serde_json::from_str(r#"{"name":"left_ankle","x":1.0,"y":null,"score":0.9}"#).unwrap();
        assert!(null_y.y.is_nan());
        assert!(!null_y.is_usable(CONFIDENCE_THRESHOLD));
    }

    #[test]
    fn test_confidence_threshold_is_exclusive() {
        let at = Keypoint::new(KeypointName::Nose, 0.0, 0.0, 0.5);
        let above = Keypoint::new(KeypointName::Nose, 0.0, 0.0, 0.51);
        assert!(!at.is_usable(CONFIDENCE_THRESHOLD));
        assert!(above.is_usable(CONFIDENCE_THRESHOLD));
    }

    #[test]
    fn test_non_finite_coordinates_are_unusable() {
        let kp = Keypoint::new(KeypointName::Nose, f64::NAN, 0.0, 0.9);
        assert!(!kp.is_usable(CONFIDENCE_THRESHOLD));
    }

    #[test]
    fn test_find_usable_skips_low_confidence_duplicate() {
        let keypoints = vec![
            Keypoint::new(KeypointName::LeftAnkle, 10.0, 10.0, 0.2),
            Keypoint::new(KeypointName::LeftAnkle, 20.0, 20.0, 0.8),
        ];
        let found = find_usable(&keypoints, &KeypointName::LeftAnkle, CONFIDENCE_THRESHOLD);
        assert_eq!(found.map(|kp| kp.x), Some(20.0));
    }

    #[test]
    fn test_foot_helpers() {
        assert_eq!(Foot::Left.opposite(), Foot::Right);
        assert_eq!(Foot::Right.ankle(), KeypointName::RightAnkle);
    }
}
