//! Tunable thresholds for the positioning gate and balance trials
//!
//! Every field has a default equal to the reference constant, so a partial
//! JSON document only needs to name the values it overrides.

use crate::error::GateError;
use crate::types::{Foot, CONFIDENCE_THRESHOLD};
use serde::{Deserialize, Serialize};

/// Smallest acceptable bounding-box area (inclusive)
pub const BOUNDING_BOX_MIN: f64 = 15_000.0;

/// Largest acceptable bounding-box area (inclusive)
pub const BOUNDING_BOX_MAX: f64 = 50_000.0;

/// Seconds the subject must stay correctly positioned before advancing
pub const DEFAULT_HOLD_SECONDS: u32 = 5;

/// Ankle height difference (pixels) at or below which both feet count as grounded
pub const ANKLE_LEVEL_TOLERANCE: f64 = 10.0;

/// Seconds of single-leg stance after which a trial is scored as a full hold
pub const DEFAULT_MAX_HOLD_SECONDS: u32 = 30;

/// Positioning gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositioningConfig {
    pub bounding_box_min: f64,
    pub bounding_box_max: f64,
    pub hold_seconds: u32,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            bounding_box_min: BOUNDING_BOX_MIN,
            bounding_box_max: BOUNDING_BOX_MAX,
            hold_seconds: DEFAULT_HOLD_SECONDS,
        }
    }
}

/// Balance trial thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub ankle_level_tolerance: f64,
    /// `None` leaves the hold uncapped; the trial then ends only on foot-down or wrong leg
    pub max_hold_seconds: Option<u32>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            ankle_level_tolerance: ANKLE_LEVEL_TOLERANCE,
            max_hold_seconds: Some(DEFAULT_MAX_HOLD_SECONDS),
        }
    }
}

/// Full configuration for an assessment session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub confidence_threshold: f64,
    pub positioning: PositioningConfig,
    pub balance: BalanceConfig,
    /// Legs to test, in order
    pub trial_feet: Vec<Foot>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            positioning: PositioningConfig::default(),
            balance: BalanceConfig::default(),
            trial_feet: vec![Foot::Left, Foot::Right],
        }
    }
}

impl GateConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, GateError> {
        let config: GateConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, GateError> {
        serde_json::to_string_pretty(self).map_err(|e| GateError::EncodingError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(GateError::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }

        let positioning = &self.positioning;
        if !positioning.bounding_box_min.is_finite()
            || !positioning.bounding_box_max.is_finite()
            || positioning.bounding_box_min < 0.0
        {
            return Err(GateError::InvalidConfig(
                "bounding box limits must be finite and non-negative".to_string(),
            ));
        }
        if positioning.bounding_box_min > positioning.bounding_box_max {
            return Err(GateError::InvalidConfig(format!(
                "bounding_box_min ({}) exceeds bounding_box_max ({})",
                positioning.bounding_box_min, positioning.bounding_box_max
            )));
        }
        if positioning.hold_seconds == 0 {
            return Err(GateError::InvalidConfig(
                "positioning.hold_seconds must be at least 1".to_string(),
            ));
        }

        if !self.balance.ankle_level_tolerance.is_finite() || self.balance.ankle_level_tolerance < 0.0 {
            return Err(GateError::InvalidConfig(format!(
                "ankle_level_tolerance must be finite and non-negative, got {}",
                self.balance.ankle_level_tolerance
            )));
        }
        if self.balance.max_hold_seconds == Some(0) {
            return Err(GateError::InvalidConfig(
                "balance.max_hold_seconds must be at least 1 when set".to_string(),
            ));
        }

        if self.trial_feet.is_empty() {
            return Err(GateError::InvalidConfig(
                "trial_feet must name at least one leg".to_string(),
            ));
        }

        Ok(())
    }
}
