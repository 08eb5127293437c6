//! Parsing and validation helpers for batches of pose.frame.v1 records

use crate::error::GateError;
use crate::schema::frame::*;

/// Adapter for reading frame records from JSON documents
pub struct FrameAdapter;

impl FrameAdapter {
    /// Parse a JSON string containing an array of frames
    pub fn parse_array(json: &str) -> Result<Vec<FrameRecord>, GateError> {
        let frames: Vec<FrameRecord> = serde_json::from_str(json)?;
        Ok(frames)
    }

    /// Parse NDJSON (newline-delimited JSON) containing frames
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FrameRecord>, GateError> {
        let mut frames = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            frames.push(Self::parse_line(trimmed, line_num + 1)?);
        }
        Ok(frames)
    }

    /// Parse a single NDJSON line; `line_num` is 1-based and only used in errors
    pub fn parse_line(line: &str, line_num: usize) -> Result<FrameRecord, GateError> {
        serde_json::from_str::<FrameRecord>(line).map_err(|e| {
            GateError::ParseError(format!("Failed to parse line {}: {}", line_num, e))
        })
    }

    /// Validate a batch of frames, returning only the failures
    pub fn validate_frames(frames: &[FrameRecord]) -> Vec<ValidationResult> {
        frames
            .iter()
            .enumerate()
            .filter_map(|(idx, frame)| {
                frame.validate().err().map(|error| ValidationResult {
                    index: idx,
                    frame_id: frame.frame_id.clone(),
                    error,
                })
            })
            .collect()
    }

    /// Whether frame timestamps never go backwards
    pub fn is_chronological(frames: &[FrameRecord]) -> bool {
        frames
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }
}

/// A frame that failed validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub index: usize,
    pub frame_id: Option<String>,
    pub error: ValidationError,
}
