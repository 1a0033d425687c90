//! viewpulse CLI - Command-line interface for viewpulse
//!
//! Commands:
//! - replay: Drive a dispatcher with a recorded command stream
//! - doctor: Diagnose configuration and saved session state
//! - schema: Print command and payload vocabulary information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use viewpulse::dispatcher::{Command, CommandOutcome, SessionState, ViewDispatcher};
use viewpulse::report::keys;
use viewpulse::store::MemoryPreferenceStore;
use viewpulse::{PRODUCER_NAME, SDK_VERSION};

/// Payload key vocabulary, in emission order
const PAYLOAD_KEYS: &[(&str, &str)] = &[
    (keys::VIEW_ID, "view id"),
    (keys::VIEW_TITLE, "view title"),
    (keys::INTERNAL_REFERRER, "internal referrer (omitted for external entry)"),
    (keys::TOKEN, "per-install user token"),
    (keys::TIME_ON_VIEW_MINUTES, "engaged minutes, one decimal place"),
    (keys::SCROLL_POSITION_TOP, "latest scroll offset (px)"),
    (keys::SCROLL_WINDOW_HEIGHT, "viewport height (px)"),
    (keys::TOTAL_CONTENT_HEIGHT, "full content height (px)"),
    (keys::FULLY_RENDERED_DOC_WIDTH, "rendered document width (px)"),
    (keys::MAX_SCROLL_DEPTH, "max scroll offset reached (px)"),
    (keys::SECTIONS, "content sections (omitted when unset)"),
    (keys::AUTHORS, "content authors (omitted when unset)"),
    (keys::ZONES, "content zones (omitted when unset)"),
    (keys::PAGE_LOAD_TIME, "page load time (seconds)"),
];

/// viewpulse - Client-side view engagement analytics core
#[derive(Parser)]
#[command(name = "viewpulse")]
#[command(author = "Viewpulse Maintainers")]
#[command(version = SDK_VERSION)]
#[command(about = "Replay and inspect view engagement command streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a dispatcher with a recorded command stream (NDJSON)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Load session-cache state from file before replaying
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save session-cache state to file after replaying
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Diagnose configuration and saved session state
    Doctor {
        /// Check a session-cache state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (command or payload)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one outcome per line)
    Ndjson,
    /// JSON array of outcomes
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Command stream schema (tagged JSON objects)
    Command,
    /// Reporting payload key vocabulary
    Payload,
}

fn main() -> ExitCode {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ViewpulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            load_state,
            save_state,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            load_state.as_deref(),
            save_state.as_deref(),
        ),

        Commands::Doctor { state, json } => cmd_doctor(state.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &PathBuf,
    output: &PathBuf,
    output_format: OutputFormat,
    load_state: Option<&std::path::Path>,
    save_state: Option<&std::path::Path>,
) -> Result<(), ViewpulseCliError> {
    // Read input
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut dispatcher = ViewDispatcher::new(MemoryPreferenceStore::new());

    // Resume from a saved session cache if provided
    if let Some(state_path) = load_state {
        let state_json = fs::read_to_string(state_path)?;
        dispatcher.load_state(&state_json)?;
    }

    // Dispatch each command in order
    let mut outcomes: Vec<CommandOutcome> = Vec::new();
    for (line_no, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command: Command = serde_json::from_str(trimmed).map_err(|e| {
            ViewpulseCliError::ParseError(format!("line {}: {}", line_no + 1, e))
        })?;
        outcomes.push(dispatcher.apply(command));
    }

    if outcomes.is_empty() {
        return Err(ViewpulseCliError::NoCommands);
    }

    // Persist the session cache if requested
    if let Some(state_path) = save_state {
        let state_json = dispatcher.save_state()?;
        fs::write(state_path, state_json)?;
    }

    // Write output
    let output_data = format_output(&outcomes, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_doctor(state: Option<&std::path::Path>, json: bool) -> Result<(), ViewpulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    // Check viewpulse version
    checks.push(DoctorCheck {
        name: "viewpulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("viewpulse version {}", SDK_VERSION),
    });

    // Check payload vocabulary
    checks.push(DoctorCheck {
        name: "payload_vocabulary".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} payload keys, emission order fixed", PAYLOAD_KEYS.len()),
    });

    // Check session state file if provided
    if let Some(state_path) = state {
        if state_path.exists() {
            match fs::read_to_string(state_path) {
                Ok(content) => match serde_json::from_str::<SessionState>(&content) {
                    Ok(session) => {
                        checks.push(DoctorCheck {
                            name: "session_state".to_string(),
                            status: CheckStatus::Ok,
                            message: format!(
                                "State file valid (account {})",
                                session.account_id
                            ),
                        });
                    }
                    Err(e) => {
                        checks.push(DoctorCheck {
                            name: "session_state".to_string(),
                            status: CheckStatus::Error,
                            message: format!("Invalid state JSON: {}", e),
                        });
                    }
                },
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "session_state".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Cannot read state file: {}", e),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "session_state".to_string(),
                status: CheckStatus::Warning,
                message: "State file does not exist".to_string(),
            });
        }
    }

    // Check stdin is available (for replaying from a pipe)
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
            message: "stdin is a pipe (replay mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SDK_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("viewpulse Doctor Report");
        println!("=======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ViewpulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), ViewpulseCliError> {
    match schema_type {
        SchemaType::Command => {
            if json_schema {
                println!("{}", get_command_json_schema());
            } else {
                println!("Command Schema");
                println!();
                println!("One tagged JSON object per line, e.g.:");
                println!(r#"  {{"action":"init","account_id":"acct-1","domain":"news.example.com"}}"#);
                println!(r#"  {{"action":"track_view","view_id":"v1","view_title":"Home"}}"#);
                println!();
                println!("Actions:");
                println!("  init               - initialize the session for an account");
                println!("  track_view         - a view became active (geometry optional, -1 = unknown)");
                println!("  left_view          - the user left a view; emits its final payload");
                println!("  set_position       - new scroll geometry for the live view");
                println!("  set_sections       - set content sections for the live view");
                println!("  set_authors        - set content authors for the live view");
                println!("  set_zones          - set content zones for the live view");
                println!("  set_view_load_time - report the live view's page load time (seconds)");
                println!("  set_app_referrer   - record the app-level referrer for the session");
                println!("  pause              - stop tracking, keep the cached account");
                println!("  stop               - stop tracking, forget the cached account");
            }
        }
        SchemaType::Payload => {
            if json_schema {
                println!("{}", get_payload_json_schema());
            } else {
                println!("Reporting Payload Vocabulary");
                println!();
                println!("Ordered string-to-string mapping; emission order is fixed:");
                println!();
                for (key, meaning) in PAYLOAD_KEYS {
                    println!("  {:<4} {}", key, meaning);
                }
            }
        }
    }

    Ok(())
}

// Helper functions

fn format_output(
    outcomes: &[CommandOutcome],
    format: &OutputFormat,
) -> Result<String, ViewpulseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for outcome in outcomes {
                lines.push(serde_json::to_string(outcome)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(outcomes)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(outcomes)?),
    }
}

fn get_command_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://viewpulse.dev/schemas/command.v1.json",
        "title": "viewpulse.command.v1",
        "description": "viewpulse dispatch command schema",
        "type": "object",
        "required": ["action"],
        "properties": {
            "action": {
                "type": "string",
                "enum": [
                    "init", "track_view", "left_view", "set_position",
                    "set_sections", "set_authors", "set_zones",
                    "set_view_load_time", "set_app_referrer", "pause", "stop"
                ]
            },
            "account_id": { "type": "string" },
            "domain": { "type": "string" },
            "view_id": { "type": "string" },
            "view_title": { "type": "string" },
            "scroll_position_top": { "type": "integer", "default": -1 },
            "scroll_window_height": { "type": "integer", "default": -1 },
            "total_content_height": { "type": "integer", "default": -1 },
            "fully_rendered_doc_width": { "type": "integer", "default": -1 },
            "sections": { "type": "string" },
            "authors": { "type": "string" },
            "zones": { "type": "string" },
            "seconds": { "type": "number" },
            "referrer": { "type": "string" }
        }
    })
    .to_string()
}

fn get_payload_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://viewpulse.dev/schemas/payload.v1.json",
        "title": "viewpulse.payload.v1",
        "description": "viewpulse reporting payload schema (ordered object; all values are strings)",
        "type": "object",
        "required": ["p", "i", "t", "c", "x", "w", "y", "o", "m", "b"],
        "properties": {
            "p": { "type": "string", "description": "view id" },
            "i": { "type": "string", "description": "view title" },
            "v": { "type": "string", "description": "internal referrer" },
            "t": { "type": "string", "description": "per-install user token" },
            "c": { "type": "string", "description": "engaged minutes, one decimal place" },
            "x": { "type": "string", "description": "latest scroll offset (px)" },
            "w": { "type": "string", "description": "viewport height (px)" },
            "y": { "type": "string", "description": "full content height (px)" },
            "o": { "type": "string", "description": "rendered document width (px)" },
            "m": { "type": "string", "description": "max scroll offset reached (px)" },
            "g0": { "type": "string", "description": "content sections" },
            "g1": { "type": "string", "description": "content authors" },
            "g2": { "type": "string", "description": "content zones" },
            "b": { "type": "string", "description": "page load time (seconds)" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum ViewpulseCliError {
    Io(io::Error),
    Tracker(viewpulse::TrackerError),
    Json(serde_json::Error),
    NoCommands,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for ViewpulseCliError {
    fn from(e: io::Error) -> Self {
        ViewpulseCliError::Io(e)
    }
}

impl From<viewpulse::TrackerError> for ViewpulseCliError {
    fn from(e: viewpulse::TrackerError) -> Self {
        ViewpulseCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for ViewpulseCliError {
    fn from(e: serde_json::Error) -> Self {
        ViewpulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ViewpulseCliError> for CliError {
    fn from(e: ViewpulseCliError) -> Self {
        match e {
            ViewpulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ViewpulseCliError::Tracker(e) => CliError {
                code: "TRACKER_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the session state file contents".to_string()),
            },
            ViewpulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ViewpulseCliError::NoCommands => CliError {
                code: "NO_COMMANDS".to_string(),
                message: "No commands found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            ViewpulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            ViewpulseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'viewpulse schema command' for the expected shape".to_string()),
            },
        }
    }
}

// Report types

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
