//! Stage orchestration
//!
//! This module provides the public API for posegate. It routes each frame to
//! the active stage: the positioning gate first, then one balance trial per
//! configured leg, then `Complete`.

use crate::balance::{BalanceTrial, TrialResult, TrialSignal};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::positioning::PositioningClassifier;
use crate::report::{FrameReport, ReportEncoder, ReportPayload, SessionEvent, Snapshot};
use crate::schema::{FrameAdapter, FrameRecord};
use crate::types::{Foot, PositionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which screen of the assessment is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Positioning,
    BalanceTrial { foot: Foot },
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Positioning => "positioning",
            Stage::BalanceTrial { .. } => "balance_trial",
            Stage::Complete => "complete",
        }
    }
}

/// Run a recorded NDJSON frame stream through a fresh session (stateless, one-shot).
///
/// # Arguments
/// * `frames_ndjson` - pose.frame.v1 records, one per line
///
/// # Returns
/// One report JSON payload per frame
///
/// # Example
/// ```ignore
/// let reports = assess_frames(recording)?;
/// ```
pub fn assess_frames(frames_ndjson: String) -> Result<Vec<String>, GateError> {
    assess_frames_with_config(&frames_ndjson, GateConfig::default())
}

/// Same as [`assess_frames`] with explicit thresholds
pub fn assess_frames_with_config(
    frames_ndjson: &str,
    config: GateConfig,
) -> Result<Vec<String>, GateError> {
    let frames = FrameAdapter::parse_ndjson(frames_ndjson)?;
    let mut processor = AssessmentProcessor::with_config(config)?;

    frames
        .iter()
        .map(|frame| processor.process_frame_to_json(frame))
        .collect()
}

/// Stateful processor that owns the classifiers for one assessment session.
///
/// Every status and timer cell is written only from `process_frame`,
/// `begin_trial`, and `reset`; consumers read through [`Snapshot`]s.
pub struct AssessmentProcessor {
    config: GateConfig,
    session_id: String,
    stage: Stage,
    positioning: PositioningClassifier,
    trial: Option<BalanceTrial>,
    next_trial: usize,
    results: Vec<TrialResult>,
    last_timestamp: Option<DateTime<Utc>>,
    encoder: ReportEncoder,
}

impl Default for AssessmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AssessmentProcessor {
    /// Create a processor with the reference thresholds
    pub fn new() -> Self {
        Self::build(GateConfig::default())
    }

    /// Create a processor with validated custom thresholds
    pub fn with_config(config: GateConfig) -> Result<Self, GateError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: GateConfig) -> Self {
        Self {
            positioning: PositioningClassifier::from_config(&config),
            config,
            session_id: Uuid::new_v4().to_string(),
            stage: Stage::Positioning,
            trial: None,
            next_trial: 0,
            results: Vec::new(),
            last_timestamp: None,
            encoder: ReportEncoder::new(),
        }
    }

    /// Process one frame and report the resulting state and events.
    ///
    /// Frame content never fails: missing or unusable keypoints only move the
    /// classifiers to their conservative states.
    pub fn process_frame(&mut self, frame: &FrameRecord) -> FrameReport {
        let now = frame.timestamp;
        if self.last_timestamp.is_some_and(|last| now < last) {
            warn!(frame_id = ?frame.frame_id, "frame timestamp went backwards");
        }
        self.last_timestamp = Some(now);

        let mut events = Vec::new();
        match self.stage {
            Stage::Positioning => {
                if let Some(signal) = self.positioning.evaluate(&frame.keypoints, now) {
                    events.push(SessionEvent::Advanced {
                        held_seconds: signal.held_seconds,
                        at: signal.at,
                    });
                    self.positioning.reset();
                    self.start_next_trial(now, &mut events);
                }
            }
            Stage::BalanceTrial { .. } => {
                let signals = match self.trial.as_mut() {
                    Some(trial) => trial.evaluate(&frame.keypoints, now),
                    None => Vec::new(),
                };
                for signal in signals {
                    match signal {
                        TrialSignal::HoldTick { foot, seconds } => {
                            events.push(SessionEvent::TrialHoldTick { foot, seconds });
                        }
                        TrialSignal::Ended(result) => {
                            self.results.push(result.clone());
                            events.push(SessionEvent::TrialEnded { result });
                            self.start_next_trial(now, &mut events);
                        }
                    }
                }
            }
            Stage::Complete => {
                debug!("session complete, frame ignored");
            }
        }

        FrameReport {
            frame_id: frame.frame_id.clone(),
            snapshot: self.snapshot(),
            events,
        }
    }

    /// Parse a frame from JSON, process it, and encode the report
    pub fn process_json(&mut self, frame_json: &str) -> Result<String, GateError> {
        let frame: FrameRecord = serde_json::from_str(frame_json)?;
        self.process_frame_to_json(&frame)
    }

    fn process_frame_to_json(&mut self, frame: &FrameRecord) -> Result<String, GateError> {
        let report = self.process_frame(frame);
        self.encoder.encode_to_json(&report)
    }

    /// Wrap a report in the versioned payload stamped with this session's producer
    pub fn payload(&self, report: &FrameReport) -> ReportPayload {
        self.encoder.encode(report)
    }

    fn start_next_trial(&mut self, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        match self.config.trial_feet.get(self.next_trial).copied() {
            Some(foot) => {
                self.next_trial += 1;
                events.push(self.enter_trial(foot, now));
            }
            None => {
                self.trial = None;
                self.stage = Stage::Complete;
                info!(trials = self.results.len(), "assessment complete");
                events.push(SessionEvent::Completed { at: now });
            }
        }
    }

    fn enter_trial(&mut self, foot: Foot, now: DateTime<Utc>) -> SessionEvent {
        if let Some(trial) = self.trial.as_mut() {
            trial.reset(foot);
        } else {
            self.trial = Some(BalanceTrial::new(foot, &self.config));
        }
        self.stage = Stage::BalanceTrial { foot };
        info!(foot = foot.as_str(), "balance trial started");
        SessionEvent::TrialStarted { foot, at: now }
    }

    /// Start a trial for `foot` immediately, zeroing every timer and flag.
    ///
    /// Used by external controllers that drive the leg sequence themselves.
    /// The configured trial order is not advanced.
    pub fn begin_trial(&mut self, foot: Foot, now: DateTime<Utc>) -> Result<SessionEvent, GateError> {
        if self.stage == Stage::Complete {
            return Err(GateError::InvalidStage(
                "cannot begin a trial after the assessment is complete".to_string(),
            ));
        }
        self.positioning.reset();
        Ok(self.enter_trial(foot, now))
    }

    /// Discard all progress and return to positioning
    pub fn reset(&mut self) {
        self.positioning.reset();
        self.trial = None;
        self.stage = Stage::Positioning;
        self.next_trial = 0;
        self.results.clear();
        self.last_timestamp = None;
        info!(session_id = %self.session_id, "assessment reset");
    }

    pub fn snapshot(&self) -> Snapshot {
        let (positioning, balance, status_text) = match self.stage {
            Stage::Positioning => {
                let snapshot = self.positioning.snapshot();
                let text = match snapshot.status {
                    PositionStatus::PositionCorrect => format!(
                        "{} ({} of {} seconds)",
                        snapshot.status.message(),
                        snapshot.elapsed_seconds,
                        snapshot.required_seconds
                    ),
                    status => status.message().to_string(),
                };
                (Some(snapshot), None, text)
            }
            Stage::BalanceTrial { .. } => {
                let snapshot = self.trial.as_ref().map(BalanceTrial::snapshot);
                let text = snapshot
                    .as_ref()
                    .map(|s| s.message())
                    .unwrap_or_default();
                (None, snapshot, text)
            }
            Stage::Complete => (None, None, "Assessment complete".to_string()),
        };

        Snapshot {
            session_id: self.session_id.clone(),
            stage: self.stage,
            timestamp: self.last_timestamp,
            positioning,
            balance,
            status_text,
        }
    }

    /// Encode the trial results recorded so far
    pub fn summary_json(&self) -> Result<String, GateError> {
        self.encoder
            .summary_to_json(&self.session_id, self.is_complete(), &self.results)
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}
