//! pose.frame.v1 input schema
//!
//! This module defines the per-frame keypoint record produced by the pose
//! model and the helpers that parse and validate batches of them.

mod frame;
mod adapter;

pub use frame::*;
pub use adapter::*;
