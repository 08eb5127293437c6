//! Single-leg balance analysis
//!
//! [`LegRaiseAnalyzer`] is a decision function: given a frame and the
//! per-trial [`LegRaiseState`], it decides which ankle is raised and drives
//! the caller's timer and wrong-leg reporter through [`LegRaiseHooks`]. It
//! owns no timer itself.
//!
//! [`BalanceTrial`] is the consumer that owns the hold timer for one trial,
//! turns analyzer decisions into hold ticks, and ends the trial on a wrong
//! leg, a foot-down after the hold began, or a full-length hold.

use crate::config::{BalanceConfig, GateConfig};
use crate::timer::HoldTimer;
use crate::types::{find_usable, Foot, Keypoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Callbacks the analyzer drives on each frame
pub trait LegRaiseHooks {
    fn start_timer(&mut self);
    fn stop_timer(&mut self);
    fn set_wrong_leg(&mut self, wrong: bool);
}

/// Per-trial analyzer state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRaiseState {
    /// Leg the subject was asked to raise; assigned by the stage controller
    pub current_foot: Foot,
    pub foot_in_air: bool,
    pub wrong_leg_flagged: bool,
}

impl LegRaiseState {
    pub fn new(current_foot: Foot) -> Self {
        Self {
            current_foot,
            foot_in_air: false,
            wrong_leg_flagged: false,
        }
    }
}

/// What the analyzer concluded for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegRaiseReading {
    /// No usable ankles; the hold is paused
    NoData,
    /// The leg opposite the expected one is raised
    WrongLeg,
    /// The expected leg is raised
    Raised,
    /// Ankles level within tolerance
    Grounded,
}

/// Decides which ankle is raised
#[derive(Debug, Clone)]
pub struct LegRaiseAnalyzer {
    ankle_level_tolerance: f64,
    confidence_threshold: f64,
}

impl Default for LegRaiseAnalyzer {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

impl LegRaiseAnalyzer {
    pub fn new(ankle_level_tolerance: f64, confidence_threshold: f64) -> Self {
        Self {
            ankle_level_tolerance,
            confidence_threshold,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.balance.ankle_level_tolerance,
            config.confidence_threshold,
        )
    }

    /// Evaluate one frame against `state`, driving `hooks`.
    ///
    /// A height difference at or below the tolerance counts as both feet
    /// grounded.
    pub fn analyze<H: LegRaiseHooks + ?Sized>(
        &self,
        keypoints: &[Keypoint],
        state: &mut LegRaiseState,
        hooks: &mut H,
    ) -> LegRaiseReading {
        let left = find_usable(keypoints, &Foot::Left.ankle(), self.confidence_threshold);
        let right = find_usable(keypoints, &Foot::Right.ankle(), self.confidence_threshold);

        let (Some(left), Some(right)) = (left, right) else {
            hooks.stop_timer();
            return LegRaiseReading::NoData;
        };

        let difference = right.y - left.y;
        if difference.abs() <= self.ankle_level_tolerance {
            hooks.stop_timer();
            state.foot_in_air = false;
            return LegRaiseReading::Grounded;
        }

        let raised = if difference > 0.0 { Foot::Left } else { Foot::Right };

        if raised != state.current_foot {
            state.wrong_leg_flagged = true;
            hooks.set_wrong_leg(true);
            hooks.stop_timer();
            return LegRaiseReading::WrongLeg;
        }

        state.wrong_leg_flagged = false;
        hooks.set_wrong_leg(false);
        hooks.start_timer();
        state.foot_in_air = true;
        LegRaiseReading::Raised
    }
}

/// How a balance trial ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Held for the full configured duration
    HeldFull,
    /// Raised foot came back down
    FootDown,
    /// Subject raised the other leg
    WrongLeg,
}

impl TrialOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialOutcome::HeldFull => "held_full",
            TrialOutcome::FootDown => "foot_down",
            TrialOutcome::WrongLeg => "wrong_leg",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TrialOutcome::WrongLeg)
    }
}

/// Scored result of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub foot: Foot,
    pub outcome: TrialOutcome,
    pub held_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

/// Signals a trial emits to the stage controller
#[derive(Debug, Clone, PartialEq)]
pub enum TrialSignal {
    HoldTick { foot: Foot, seconds: u32 },
    Ended(TrialResult),
}

/// Read-only view of a trial for the report sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub expected_foot: Foot,
    pub foot_in_air: bool,
    pub wrong_leg: bool,
    pub hold_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hold_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TrialOutcome>,
}

impl BalanceSnapshot {
    /// Accessible status text for the current trial state
    pub fn message(&self) -> String {
        let foot = self.expected_foot.as_str();
        match self.outcome {
            Some(TrialOutcome::HeldFull) => format!("Well done, you held your {foot} foot up"),
            Some(TrialOutcome::FootDown) => {
                format!("Trial over, you held for {} seconds", self.hold_seconds)
            }
            Some(TrialOutcome::WrongLeg) => format!("Wrong leg, this trial needed your {foot} foot"),
            None if self.wrong_leg => format!("Wrong leg, raise your {foot} foot instead"),
            None if self.foot_in_air => format!("Hold steady, {} seconds", self.hold_seconds),
            None => format!("Raise your {foot} foot off the ground"),
        }
    }
}

/// Adapts the analyzer's callbacks onto a trial's hold timer
struct TrialHooks<'a> {
    timer: &'a mut HoldTimer,
    now: DateTime<Utc>,
}

impl LegRaiseHooks for TrialHooks<'_> {
    fn start_timer(&mut self) {
        self.timer.resume(self.now);
    }

    fn stop_timer(&mut self) {
        self.timer.cancel();
    }

    fn set_wrong_leg(&mut self, wrong: bool) {
        if wrong {
            warn!("wrong leg raised");
        }
    }
}

/// One timed attempt at the single-leg balance hold
#[derive(Debug, Clone)]
pub struct BalanceTrial {
    analyzer: LegRaiseAnalyzer,
    state: LegRaiseState,
    timer: HoldTimer,
    hold_started_at: Option<DateTime<Utc>>,
    result: Option<TrialResult>,
}

impl BalanceTrial {
    pub fn new(foot: Foot, config: &GateConfig) -> Self {
        Self::with_parts(
            foot,
            LegRaiseAnalyzer::from_config(config),
            &config.balance,
        )
    }

    pub fn with_parts(foot: Foot, analyzer: LegRaiseAnalyzer, balance: &BalanceConfig) -> Self {
        Self {
            analyzer,
            state: LegRaiseState::new(foot),
            timer: HoldTimer::with_limit(balance.max_hold_seconds),
            hold_started_at: None,
            result: None,
        }
    }

    /// Zero every timer and flag and expect `foot` from now on
    pub fn reset(&mut self, foot: Foot) {
        self.state = LegRaiseState::new(foot);
        self.timer.reset();
        self.hold_started_at = None;
        self.result = None;
    }

    /// Evaluate one frame. Frames after the trial has ended are ignored.
    ///
    /// Seconds that fell due before `now` are credited first, under the state
    /// the previous frame left, so a late frame showing the foot down cannot
    /// erase time already held. A cap reached in that gap scores `HeldFull`.
    pub fn evaluate(&mut self, keypoints: &[Keypoint], now: DateTime<Utc>) -> Vec<TrialSignal> {
        if self.result.is_some() {
            return Vec::new();
        }

        let mut signals = self.credit_due(now);
        if self.result.is_some() {
            return signals;
        }

        let was_in_air = self.state.foot_in_air;
        let mut hooks = TrialHooks {
            timer: &mut self.timer,
            now,
        };
        let reading = self.analyzer.analyze(keypoints, &mut self.state, &mut hooks);

        match reading {
            LegRaiseReading::WrongLeg => {
                signals.push(self.finish(TrialOutcome::WrongLeg, now));
            }
            LegRaiseReading::Grounded if was_in_air => {
                signals.push(self.finish(TrialOutcome::FootDown, now));
            }
            LegRaiseReading::Raised if self.hold_started_at.is_none() => {
                info!(foot = self.state.current_foot.as_str(), "balance hold started");
                self.hold_started_at = Some(now);
            }
            LegRaiseReading::NoData => {
                debug!("ankles not visible, balance hold paused");
            }
            _ => {}
        }
        signals
    }

    fn credit_due(&mut self, now: DateTime<Utc>) -> Vec<TrialSignal> {
        let mut signals = Vec::new();
        for token in self.timer.due(now) {
            if !self.state.foot_in_air || !self.timer.tick(token) {
                continue;
            }
            signals.push(TrialSignal::HoldTick {
                foot: self.state.current_foot,
                seconds: self.timer.elapsed_seconds(),
            });
            if self.timer.is_complete() {
                signals.push(self.finish(TrialOutcome::HeldFull, now));
                break;
            }
        }
        signals
    }

    fn finish(&mut self, outcome: TrialOutcome, now: DateTime<Utc>) -> TrialSignal {
        self.timer.cancel();
        let result = TrialResult {
            foot: self.state.current_foot,
            outcome,
            held_seconds: self.timer.elapsed_seconds(),
            hold_started_at: self.hold_started_at,
            ended_at: now,
        };
        info!(
            foot = result.foot.as_str(),
            outcome = outcome.as_str(),
            held_seconds = result.held_seconds,
            "balance trial ended"
        );
        self.result = Some(result.clone());
        TrialSignal::Ended(result)
    }

    pub fn foot(&self) -> Foot {
        self.state.current_foot
    }

    pub fn state(&self) -> &LegRaiseState {
        &self.state
    }

    pub fn result(&self) -> Option<&TrialResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            expected_foot: self.state.current_foot,
            foot_in_air: self.state.foot_in_air,
            wrong_leg: self.state.wrong_leg_flagged,
            hold_seconds: self.timer.elapsed_seconds(),
            max_hold_seconds: self.timer.required_seconds(),
            outcome: self.result.as_ref().map(|r| r.outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeypointName;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    enum Call {
        Start,
        Stop,
        WrongLeg(bool),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl LegRaiseHooks for Recorder {
        fn start_timer(&mut self) {
            self.calls.push(Call::Start);
        }

        fn stop_timer(&mut self) {
            self.calls.push(Call::Stop);
        }

        fn set_wrong_leg(&mut self, wrong: bool) {
            self.calls.push(Call::WrongLeg(wrong));
        }
    }

    fn ankles(left_y: f64, right_y: f64) -> Vec<Keypoint> {
        vec![
            Keypoint::new(KeypointName::LeftAnkle, 120.0, left_y, 0.9),
            Keypoint::new(KeypointName::RightAnkle, 180.0, right_y, 0.9),
        ]
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_expected_leg_raised() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Left);
        let mut hooks = Recorder::default();

        let reading = analyzer.analyze(&ankles(100.0, 200.0), &mut state, &mut hooks);

        assert_eq!(reading, LegRaiseReading::Raised);
        assert_eq!(hooks.calls, vec![Call::WrongLeg(false), Call::Start]);
        assert!(state.foot_in_air);
        assert!(!state.wrong_leg_flagged);
    }

    #[test]
    fn test_wrong_leg_raised() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Left);
        let mut hooks = Recorder::default();

        let reading = analyzer.analyze(&ankles(200.0, 100.0), &mut state, &mut hooks);

        assert_eq!(reading, LegRaiseReading::WrongLeg);
        assert_eq!(hooks.calls, vec![Call::WrongLeg(true), Call::Stop]);
        assert!(!state.foot_in_air);
        assert!(state.wrong_leg_flagged);
    }

    #[test]
    fn test_wrong_leg_leaves_in_air_untouched() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Right);
        state.foot_in_air = true;

        analyzer.analyze(&ankles(100.0, 200.0), &mut state, &mut Recorder::default());
        assert!(state.foot_in_air);
    }

    #[test]
    fn test_empty_keypoints_stop_without_mutation() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Left);
        state.foot_in_air = true;
        let mut hooks = Recorder::default();

        let reading = analyzer.analyze(&[], &mut state, &mut hooks);

        assert_eq!(reading, LegRaiseReading::NoData);
        assert_eq!(hooks.calls, vec![Call::Stop]);
        assert!(state.foot_in_air);
    }

    #[test]
    fn test_low_confidence_ankle_is_missing() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Left);
        let mut keypoints = ankles(100.0, 200.0);
        keypoints[1].confidence = 0.3;
        let mut hooks = Recorder::default();

        let reading = analyzer.analyze(&keypoints, &mut state, &mut hooks);

        assert_eq!(reading, LegRaiseReading::NoData);
        assert_eq!(hooks.calls, vec![Call::Stop]);
    }

    #[test]
    fn test_near_level_ankles_are_grounded() {
        let analyzer = LegRaiseAnalyzer::default();
        let mut state = LegRaiseState::new(Foot::Left);
        state.foot_in_air = true;
        let mut hooks = Recorder::default();

        // Exactly at tolerance still counts as level
        let reading = analyzer.analyze(&ankles(390.0, 400.0), &mut state, &mut hooks);

        assert_eq!(reading, LegRaiseReading::Grounded);
        assert_eq!(hooks.calls, vec![Call::Stop]);
        assert!(!state.foot_in_air);

        let reading = analyzer.analyze(&ankles(389.0, 400.0), &mut state, &mut hooks);
        assert_eq!(reading, LegRaiseReading::Raised);
    }

    #[test]
    fn test_trial_counts_hold_and_ends_on_foot_down() {
        let mut trial = BalanceTrial::new(Foot::Left, &GateConfig::default());

        // Standing: waiting, not a failure
        assert!(trial.evaluate(&ankles(400.0, 400.0), at(0)).is_empty());

        assert!(trial.evaluate(&ankles(300.0, 400.0), at(500)).is_empty());
        let ticks = trial.evaluate(&ankles(300.0, 400.0), at(2_600));
        assert_eq!(
            ticks,
            vec![
                TrialSignal::HoldTick { foot: Foot::Left, seconds: 1 },
                TrialSignal::HoldTick { foot: Foot::Left, seconds: 2 },
            ]
        );

        let ended = trial.evaluate(&ankles(400.0, 402.0), at(3_000));
        let TrialSignal::Ended(result) = &ended[0] else {
            panic!("expected trial end, got {ended:?}");
        };
        assert_eq!(result.outcome, TrialOutcome::FootDown);
        assert_eq!(result.held_seconds, 2);
        assert_eq!(result.hold_started_at, Some(at(500)));

        // Finished trials ignore further frames
        assert!(trial.evaluate(&ankles(300.0, 400.0), at(4_000)).is_empty());
    }

    #[test]
    fn test_trial_fails_on_wrong_leg() {
        let mut trial = BalanceTrial::new(Foot::Right, &GateConfig::default());

        let signals = trial.evaluate(&ankles(300.0, 400.0), at(0));

        assert!(matches!(
            signals.as_slice(),
            [TrialSignal::Ended(TrialResult { outcome: TrialOutcome::WrongLeg, .. })]
        ));
        assert!(trial.snapshot().wrong_leg);
        assert!(trial.snapshot().outcome.unwrap().is_failure());
    }

    #[test]
    fn test_trial_full_hold() {
        let mut config = GateConfig::default();
        config.balance.max_hold_seconds = Some(3);
        let mut trial = BalanceTrial::new(Foot::Left, &config);

        trial.evaluate(&ankles(300.0, 400.0), at(0));
        let signals = trial.evaluate(&ankles(300.0, 400.0), at(10_000));

        assert_eq!(signals.len(), 4);
        assert!(matches!(
            signals.last(),
            Some(TrialSignal::Ended(TrialResult { outcome: TrialOutcome::HeldFull, held_seconds: 3, .. }))
        ));
    }

    #[test]
    fn test_late_foot_down_keeps_seconds_already_due() {
        let mut config = GateConfig::default();
        config.balance.max_hold_seconds = Some(3);
        let mut trial = BalanceTrial::new(Foot::Left, &config);

        trial.evaluate(&ankles(300.0, 400.0), at(0));
        assert_eq!(trial.evaluate(&ankles(300.0, 400.0), at(2_900)).len(), 2);

        // The third second fell due at 3.0s, before this frame showed the foot down
        let signals = trial.evaluate(&ankles(400.0, 400.0), at(3_500));
        assert_eq!(signals[0], TrialSignal::HoldTick { foot: Foot::Left, seconds: 3 });
        assert!(matches!(
            signals.last(),
            Some(TrialSignal::Ended(TrialResult { outcome: TrialOutcome::HeldFull, held_seconds: 3, .. }))
        ));
    }

    #[test]
    fn test_late_foot_down_below_cap_credits_gap() {
        let mut trial = BalanceTrial::new(Foot::Left, &GateConfig::default());

        trial.evaluate(&ankles(300.0, 400.0), at(0));
        let signals = trial.evaluate(&ankles(400.0, 400.0), at(4_200));

        assert_eq!(signals.len(), 5);
        let Some(TrialSignal::Ended(result)) = signals.last() else {
            panic!("expected trial end, got {signals:?}");
        };
        assert_eq!(result.outcome, TrialOutcome::FootDown);
        assert_eq!(result.held_seconds, 4);
    }

    #[test]
    fn test_missing_ankles_pause_hold() {
        let mut trial = BalanceTrial::new(Foot::Left, &GateConfig::default());

        trial.evaluate(&ankles(300.0, 400.0), at(0));
        trial.evaluate(&ankles(300.0, 400.0), at(1_000));
        assert_eq!(trial.snapshot().hold_seconds, 1);

        // Ankles drop out for several seconds: nothing is counted
        assert!(trial.evaluate(&[], at(1_500)).is_empty());
        assert!(trial.evaluate(&[], at(5_000)).is_empty());
        assert_eq!(trial.snapshot().hold_seconds, 1);
        assert!(!trial.is_finished());

        // Visible again: resumes from the kept count
        trial.evaluate(&ankles(300.0, 400.0), at(5_100));
        trial.evaluate(&ankles(300.0, 400.0), at(6_100));
        assert_eq!(trial.snapshot().hold_seconds, 2);
    }

    #[test]
    fn test_reset_zeroes_trial() {
        let mut trial = BalanceTrial::new(Foot::Right, &GateConfig::default());
        trial.evaluate(&ankles(300.0, 400.0), at(0));
        assert!(trial.is_finished());

        trial.reset(Foot::Left);
        let snapshot = trial.snapshot();
        assert_eq!(snapshot.expected_foot, Foot::Left);
        assert!(!snapshot.wrong_leg);
        assert!(!snapshot.foot_in_air);
        assert_eq!(snapshot.hold_seconds, 0);
        assert_eq!(snapshot.outcome, None);
    }

    #[test]
    fn test_snapshot_messages() {
        let mut trial = BalanceTrial::new(Foot::Left, &GateConfig::default());
        assert_eq!(trial.snapshot().message(), "Raise your left foot off the ground");

        trial.evaluate(&ankles(300.0, 400.0), at(0));
        assert_eq!(trial.snapshot().message(), "Hold steady, 0 seconds");
    }
}
