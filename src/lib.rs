//! posegate - Real-time pose gating and single-leg balance hold state machines
//!
//! posegate turns a stream of per-frame body keypoints into the signals that
//! drive a physical assessment: positioning → hold gate → balance trials.
//!
//! ## Modules
//!
//! - **Positioning**: classify framing from a shoulder/ankle bounding box and
//!   gate stage advancement behind a continuous hold
//! - **Balance**: decide which leg is raised, track the hold, and end a trial
//!   on the wrong leg or a foot-down
//! - **Pipeline**: orchestrate stages and emit per-frame reports

pub mod balance;
pub mod bbox;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod positioning;
pub mod report;
pub mod schema;
pub mod timer;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use balance::{BalanceTrial, LegRaiseAnalyzer, LegRaiseHooks, LegRaiseState, TrialOutcome, TrialResult};
pub use bbox::BoundingBox;
pub use config::GateConfig;
pub use error::GateError;
pub use pipeline::{assess_frames, AssessmentProcessor, Stage};
pub use positioning::{AdvanceSignal, PositioningClassifier};
pub use report::{FrameReport, ReportPayload, SessionEvent, Snapshot, REPORT_VERSION};
pub use timer::{HoldTimer, TickToken};
pub use types::{Foot, Keypoint, KeypointName, PositionStatus};

// Schema exports
pub use schema::{FrameAdapter, FrameRecord, SCHEMA_VERSION};

/// posegate version embedded in all report payloads
pub const POSEGATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report payloads
pub const PRODUCER_NAME: &str = "posegate";
