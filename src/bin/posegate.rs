//! posegate CLI - Command-line interface for posegate
//!
//! Commands:
//! - replay: Run a recorded frame stream through a session (batch mode)
//! - run: Process streaming frames from stdin (streaming mode)
//! - validate: Validate frame schema
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use posegate::config::GateConfig;
use posegate::report::ReportPayload;
use posegate::schema::{FrameAdapter, FrameRecord, SCHEMA_VERSION};
use posegate::{AssessmentProcessor, GateError, POSEGATE_VERSION, PRODUCER_NAME, REPORT_VERSION};

/// posegate - Pose gating and single-leg balance assessment
#[derive(Parser)]
#[command(name = "posegate")]
#[command(version = POSEGATE_VERSION)]
#[command(about = "Turn pose keypoint streams into positioning and balance signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Threshold overrides shared by the processing commands
#[derive(clap::Args, Clone)]
struct ConfigArgs {
    /// Load thresholds from a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the positioning hold (seconds)
    #[arg(long)]
    hold_seconds: Option<u32>,

    /// Override the balance trial cap (seconds)
    #[arg(long)]
    max_hold_seconds: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frames through one session (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Only emit reports for frames that produced events
        #[arg(long)]
        events_only: bool,

        /// Write the session summary (trial results) to a file
        #[arg(long)]
        summary: Option<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Process streaming frames from stdin (streaming mode)
    Run {
        /// Only emit reports for frames that produced events
        #[arg(long)]
        events_only: bool,

        /// Write the session summary (trial results) to a file on exit
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate frame schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (pose.frame.v1)
    Input,
    /// Output schema (pose.report.v1)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posegate=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PosegateCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            events_only,
            summary,
            config,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            events_only,
            summary.as_deref(),
            &config,
        ),

        Commands::Run {
            events_only,
            summary,
            flush,
            config,
        } => cmd_run(events_only, summary.as_deref(), flush, &config),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema { schema_type, json_schema } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    events_only: bool,
    summary: Option<&Path>,
    config: &ConfigArgs,
) -> Result<(), PosegateCliError> {
    let input_data = read_input(input)?;

    let frames = match input_format {
        InputFormat::Ndjson => FrameAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => FrameAdapter::parse_array(&input_data)?,
    };

    if frames.is_empty() {
        return Err(PosegateCliError::NoFrames);
    }
    if !FrameAdapter::is_chronological(&frames) {
        warn!("frame timestamps are not in order; holds will not count across the jump");
    }

    let mut processor = AssessmentProcessor::with_config(load_config(config)?)?;
    let mut payloads: Vec<ReportPayload> = Vec::new();

    for frame in &frames {
        if let Some(payload) = process_one(&mut processor, frame, events_only) {
            payloads.push(payload);
        }
    }

    info!(
        frames = frames.len(),
        reports = payloads.len(),
        trials = processor.results().len(),
        complete = processor.is_complete(),
        "replay finished"
    );

    if let Some(summary_path) = summary {
        fs::write(summary_path, processor.summary_json()?)?;
    }

    let output_data = format_output(&payloads, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    events_only: bool,
    summary: Option<&Path>,
    flush: bool,
    config: &ConfigArgs,
) -> Result<(), PosegateCliError> {
    let mut processor = AssessmentProcessor::with_config(load_config(config)?)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut frame_count = 0usize;

    for (idx, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        // A bad line must not end a live session
        let frame = match FrameAdapter::parse_line(trimmed, idx + 1) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping unreadable frame");
                continue;
            }
        };
        frame_count += 1;

        // Invalid frames still go through; bad keypoints are simply unusable
        if let Err(e) = frame.validate() {
            warn!(line = idx + 1, error = %e, "frame failed schema validation");
        }

        if let Some(payload) = process_one(&mut processor, &frame, events_only) {
            writeln!(stdout, "{}", serde_json::to_string(&payload)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    stdout.flush()?;
    info!(frames = frame_count, trials = processor.results().len(), "input closed");

    if let Some(summary_path) = summary {
        fs::write(summary_path, processor.summary_json()?)?;
    }

    Ok(())
}

fn process_one(
    processor: &mut AssessmentProcessor,
    frame: &FrameRecord,
    events_only: bool,
) -> Option<ReportPayload> {
    let report = processor.process_frame(frame);
    if events_only && report.events.is_empty() {
        return None;
    }
    Some(processor.payload(&report))
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), PosegateCliError> {
    let input_data = read_input(input)?;

    let frames = match input_format {
        InputFormat::Ndjson => FrameAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => FrameAdapter::parse_array(&input_data)?,
    };

    let results = FrameAdapter::validate_frames(&frames);

    let report = ValidationReport {
        total_frames: frames.len(),
        valid_frames: frames.len() - results.len(),
        invalid_frames: results.len(),
        chronological: FrameAdapter::is_chronological(&frames),
        unknown_keypoints: frames.iter().map(FrameRecord::unknown_keypoint_count).sum(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                frame_id: r.frame_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total frames:      {}", report.total_frames);
        println!("Valid frames:      {}", report.valid_frames);
        println!("Invalid frames:    {}", report.invalid_frames);
        println!("Chronological:     {}", if report.chronological { "yes" } else { "no" });
        println!("Unknown keypoints: {}", report.unknown_keypoints);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Frame {} (index {}): {}",
                    err.frame_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(PosegateCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PosegateCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "posegate_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("posegate version {}", POSEGATE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}, output schema: {}", SCHEMA_VERSION, REPORT_VERSION),
    });

    let config_check = match config {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file; using reference thresholds".to_string(),
        },
        Some(path) if !path.exists() => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist".to_string(),
        },
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match GateConfig::from_json(&content) {
                Ok(parsed) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (area {}..={}, hold {}s, {} trials)",
                        parsed.positioning.bounding_box_min,
                        parsed.positioning.bounding_box_max,
                        parsed.positioning.hold_seconds,
                        parsed.trial_feet.len()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        },
    };
    checks.push(config_check);

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: POSEGATE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("posegate Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PosegateCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), PosegateCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per video frame:");
                println!();
                println!("- schema_version: \"{}\" (optional)", SCHEMA_VERSION);
                println!("- frame_id: echoed in reports (optional)");
                println!("- timestamp: RFC 3339 capture time; holds count real seconds between frames");
                println!("- source: {{ model, device_id }} (optional)");
                println!("- keypoints: [{{ name, x, y, confidence }}] (absent or null means nothing detected)");
                println!();
                println!("Keypoint names: nose, left_eye, right_eye, left_ear, right_ear,");
                println!("  left_shoulder, right_shoulder, left_elbow, right_elbow, left_wrist,");
                println!("  right_wrist, left_hip, right_hip, left_knee, right_knee, left_ankle, right_ankle");
                println!();
                println!("`score` is accepted as an alias for `confidence`. Keypoints at or below");
                println!("the confidence threshold are ignored.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: {}", REPORT_VERSION);
                println!();
                println!("One report per processed frame:");
                println!();
                println!("- report_version: Schema version ({})", REPORT_VERSION);
                println!("- producer: {{ name, version, instance_id }}");
                println!("- frame_id: copied from the input frame");
                println!("- snapshot:");
                println!("  - session_id, stage {{ stage, foot? }}, timestamp, status_text");
                println!("  - positioning: {{ status, elapsed_seconds, required_seconds, bounding_box }}");
                println!("  - balance: {{ expected_foot, foot_in_air, wrong_leg, hold_seconds, max_hold_seconds, outcome }}");
                println!("- events: advanced, trial_started, trial_hold_tick, trial_ended, completed");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, PosegateCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(args: &ConfigArgs) -> Result<GateConfig, PosegateCliError> {
    let mut config = match &args.config {
        Some(path) => GateConfig::from_json(&fs::read_to_string(path)?)?,
        None => GateConfig::default(),
    };

    if let Some(seconds) = args.hold_seconds {
        config.positioning.hold_seconds = seconds;
    }
    if let Some(seconds) = args.max_hold_seconds {
        config.balance.max_hold_seconds = Some(seconds);
    }

    config.validate()?;
    Ok(config)
}

fn format_output(payloads: &[ReportPayload], format: &OutputFormat) -> Result<String, PosegateCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for payload in payloads {
                output.push_str(&serde_json::to_string(payload)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(serde_json::to_string(payloads)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(payloads)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Per-frame pose keypoints",
        "type": "object",
        "required": ["timestamp"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "frame_id": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
            "source": {
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "device_id": { "type": "string" }
                }
            },
            "keypoints": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["name", "x", "y"],
                    "properties": {
                        "name": { "type": "string" },
                        "x": { "type": "number" },
                        "y": { "type": "number" },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                        "score": { "type": "number", "minimum": 0, "maximum": 1 }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": REPORT_VERSION,
        "description": "Per-frame assessment report",
        "type": "object",
        "required": ["report_version", "producer", "snapshot"],
        "properties": {
            "report_version": { "type": "string" },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "frame_id": { "type": "string" },
            "snapshot": {
                "type": "object",
                "required": ["session_id", "stage", "status_text"],
                "properties": {
                    "session_id": { "type": "string" },
                    "stage": {
                        "type": "object",
                        "properties": {
                            "stage": { "type": "string", "enum": ["positioning", "balance_trial", "complete"] },
                            "foot": { "type": "string", "enum": ["left", "right"] }
                        }
                    },
                    "timestamp": { "type": "string", "format": "date-time" },
                    "positioning": { "type": "object" },
                    "balance": { "type": "object" },
                    "status_text": { "type": "string" }
                }
            },
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["event"],
                    "properties": {
                        "event": {
                            "type": "string",
                            "enum": ["advanced", "trial_started", "trial_hold_tick", "trial_ended", "completed"]
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum PosegateCliError {
    Io(io::Error),
    Gate(GateError),
    Json(serde_json::Error),
    NoFrames,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PosegateCliError {
    fn from(e: io::Error) -> Self {
        PosegateCliError::Io(e)
    }
}

impl From<GateError> for PosegateCliError {
    fn from(e: GateError) -> Self {
        PosegateCliError::Gate(e)
    }
}

impl From<serde_json::Error> for PosegateCliError {
    fn from(e: serde_json::Error) -> Self {
        PosegateCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PosegateCliError> for CliError {
    fn from(e: PosegateCliError) -> Self {
        match e {
            PosegateCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PosegateCliError::Gate(GateError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'posegate doctor --config <file>' for details".to_string()),
            },
            PosegateCliError::Gate(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
            },
            PosegateCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PosegateCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PosegateCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} frames failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PosegateCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    chronological: bool,
    unknown_keypoints: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    frame_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
