//! Positioning classifier
//!
//! Classifies each frame into a [`PositionStatus`] from the bounding-box area
//! and gates stage advancement behind a continuous hold. The hold restarts
//! from zero whenever a frame breaks continuity, and the advance signal fires
//! at most once until [`PositioningClassifier::reset`] is called.

use crate::bbox::BoundingBox;
use crate::config::{GateConfig, PositioningConfig};
use crate::timer::{HoldTimer, TickToken};
use crate::types::{usable_keypoints, Keypoint, PositionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Edge-triggered signal that the subject held position long enough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceSignal {
    pub held_seconds: u32,
    pub at: DateTime<Utc>,
}

/// Read-only view of the classifier for the report sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningSnapshot {
    pub status: PositionStatus,
    pub elapsed_seconds: u32,
    pub required_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// State machine deciding whether the subject is correctly framed
#[derive(Debug, Clone)]
pub struct PositioningClassifier {
    config: PositioningConfig,
    confidence_threshold: f64,
    status: PositionStatus,
    bounding_box: Option<BoundingBox>,
    timer: HoldTimer,
    advanced: bool,
}

impl Default for PositioningClassifier {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

impl PositioningClassifier {
    pub fn new(config: PositioningConfig, confidence_threshold: f64) -> Self {
        let timer = HoldTimer::new(config.hold_seconds);
        Self {
            config,
            confidence_threshold,
            status: PositionStatus::Positioning,
            bounding_box: None,
            timer,
            advanced: false,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.positioning.clone(), config.confidence_threshold)
    }

    /// Classify a single frame without touching any state.
    ///
    /// Low-confidence keypoints are dropped before the bounding box is built,
    /// so a frame missing any usable shoulder or ankle reads as `MoveBackward`.
    /// Both ends of the area band are inclusive.
    pub fn classify(&self, keypoints: &[Keypoint]) -> (PositionStatus, Option<BoundingBox>) {
        if keypoints.is_empty() {
            return (PositionStatus::MoveBackward, None);
        }

        let usable = usable_keypoints(keypoints, self.confidence_threshold);
        let Some(bbox) = BoundingBox::estimate(&usable) else {
            return (PositionStatus::MoveBackward, None);
        };

        let status = if bbox.area.is_nan() || bbox.area > self.config.bounding_box_max {
            PositionStatus::MoveBackward
        } else if bbox.area < self.config.bounding_box_min {
            PositionStatus::MoveForward
        } else {
            PositionStatus::PositionCorrect
        };

        (status, Some(bbox))
    }

    /// Evaluate one frame and advance the hold gate.
    ///
    /// Returns the advance signal on the frame where the hold first reaches
    /// the required duration, and `None` on every other frame.
    pub fn evaluate(&mut self, keypoints: &[Keypoint], now: DateTime<Utc>) -> Option<AdvanceSignal> {
        let previous = self.status;
        let (status, bounding_box) = self.classify(keypoints);
        self.status = status;
        self.bounding_box = bounding_box;

        if status != previous {
            debug!(
                from = previous.as_str(),
                to = status.as_str(),
                area = bounding_box.map(|b| b.area),
                "positioning status changed"
            );
        }

        if status != PositionStatus::PositionCorrect {
            if self.timer.is_active() {
                debug!(elapsed = self.timer.elapsed_seconds(), "positioning hold broken");
            }
            self.timer.reset();
            return None;
        }

        if previous != PositionStatus::PositionCorrect && !self.advanced {
            self.timer.start(now);
            debug!(required = self.config.hold_seconds, "positioning hold started");
        }

        let mut signal = None;
        for token in self.timer.due(now) {
            if let Some(fired) = self.on_tick(token, now) {
                signal = Some(fired);
            }
        }
        signal
    }

    fn on_tick(&mut self, token: TickToken, now: DateTime<Utc>) -> Option<AdvanceSignal> {
        if self.status != PositionStatus::PositionCorrect || !self.timer.tick(token) {
            return None;
        }
        if !self.timer.is_complete() || self.advanced {
            return None;
        }

        self.advanced = true;
        self.timer.cancel();
        let held_seconds = self.timer.elapsed_seconds();
        info!(held_seconds, "position held, advancing");
        Some(AdvanceSignal {
            held_seconds,
            at: now,
        })
    }

    /// Return to the idle state, cancelling any running hold
    pub fn reset(&mut self) {
        self.timer.reset();
        self.status = PositionStatus::Positioning;
        self.bounding_box = None;
        self.advanced = false;
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.timer.elapsed_seconds()
    }

    pub fn has_advanced(&self) -> bool {
        self.advanced
    }

    pub fn is_holding(&self) -> bool {
        self.timer.is_active()
    }

    pub fn snapshot(&self) -> PositioningSnapshot {
        PositioningSnapshot {
            status: self.status,
            elapsed_seconds: self.timer.elapsed_seconds(),
            required_seconds: self.config.hold_seconds,
            bounding_box: self.bounding_box,
        }
    }
}
