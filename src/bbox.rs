//! Bounding box estimation
//!
//! Approximates the subject's on-screen silhouette from the two shoulders and
//! two ankles. Width spans shoulder to shoulder; height spans from the highest
//! shoulder down to the lowest ankle. This tracks a standing, front-facing
//! subject rather than a tight rectangle around every joint.

use crate::types::{Keypoint, KeypointName};
use serde::{Deserialize, Serialize};

/// Derived rectangle approximating the subject's silhouette
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
}

impl BoundingBox {
    /// Estimate the box from a frame's keypoints.
    ///
    /// Returns `None` when any shoulder or ankle is missing. Confidence is not
    /// checked here; callers pass already-filtered keypoints.
    pub fn estimate(keypoints: &[Keypoint]) -> Option<BoundingBox> {
        let find = |name: KeypointName| keypoints.iter().find(|kp| kp.name == name);

        let left_shoulder = find(KeypointName::LeftShoulder)?;
        let right_shoulder = find(KeypointName::RightShoulder)?;
        let left_ankle = find(KeypointName::LeftAnkle)?;
        let right_ankle = find(KeypointName::RightAnkle)?;

        let min_x = left_shoulder.x.min(right_shoulder.x);
        let max_x = left_shoulder.x.max(right_shoulder.x);
        let min_y = left_shoulder.y.min(right_shoulder.y);
        let max_y = left_ankle.y.max(right_ankle.y);

        let width = max_x - min_x;
        let height = max_y - min_y;

        Some(BoundingBox {
            x: min_x,
            y: min_y,
            width,
            height,
            area: width * height,
        })
    }
}
