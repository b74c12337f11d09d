//! iclone - instance clone
//!
//! Duplicate an application instance directory by copying it or by linking
//! its files, powered by instclone.

mod logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use instclone::{
    ABORTED_MESSAGE, CommandElevator, CopyPreferences, DirInstance, ElevationLauncher,
    Error as InstcloneError, ErrorCode, FAILED_MESSAGE, FilterMode, InstanceCopyTask,
    LinkCapability, TaskReporter, TaskState, run_link_helper,
};
use logging::{LogFormat, LogLevel, init_tracing};
use serde_json::{Value, json};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;

/// iclone - copy or link-clone an instance
///
/// Usage:
///   iclone clone SOURCE STAGING
///   iclone clone --link --dont-link-saves --copy-saves SOURCE STAGING
#[derive(Parser, Debug)]
#[command(name = "iclone", version, about, long_about = None)]
struct Cli {
    /// Log verbosity (overridden by the ICLONE_LOG environment variable)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Log record format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Duplicate an instance into a new staging directory
    Clone(CloneArgs),

    /// Create links on behalf of an unprivileged iclone (run elevated)
    #[command(hide = true)]
    LinkHelper(LinkHelperArgs),
}

#[derive(Args, Debug)]
struct CloneArgs {
    /// Root directory of the instance to copy
    source: PathBuf,

    /// Directory to create the copy in (must not exist yet)
    staging: PathBuf,

    /// Name of the copy (default: the original's name)
    #[arg(long)]
    name: Option<String>,

    /// Icon key of the copy (default: "default")
    #[arg(long)]
    icon: Option<String>,

    /// Keep the accumulated playtime instead of resetting it
    #[arg(long)]
    keep_playtime: bool,

    /// Regular expression over relative paths (case-insensitive)
    ///
    /// Matching paths are left out, or with --include, only matching paths
    /// are copied.
    #[arg(long, value_name = "REGEX")]
    filter: Option<String>,

    /// Copy only paths matching --filter
    #[arg(long, requires = "filter")]
    include: bool,

    /// Link files to the original instead of copying them
    #[arg(long)]
    link: bool,

    /// Use hard links instead of symbolic links (implies --link)
    #[arg(long)]
    hard_links: bool,

    /// Keep the saves directory out of the link pass
    #[arg(long)]
    dont_link_saves: bool,

    /// Copy the saves directory separately (with --dont-link-saves)
    #[arg(long)]
    copy_saves: bool,

    /// Number of parallel file operations
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// JSON preferences file; flags override its values
    #[arg(long, value_name = "FILE")]
    prefs: Option<PathBuf>,

    /// Command used to run the link helper elevated when symlinks are
    /// refused (e.g. "sudo -n")
    #[arg(long, value_name = "COMMAND")]
    elevate_with: Option<String>,

    /// Seconds to wait for the elevated link helper (0 waits forever)
    #[arg(long, value_name = "SECS")]
    elevation_timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,
}

#[derive(Args, Debug)]
struct LinkHelperArgs {
    /// Request file written by the unprivileged side
    #[arg(long)]
    requests: PathBuf,

    /// Result file to write
    #[arg(long)]
    results: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read preferences: {path}: {source}")]
    PrefsRead { path: PathBuf, source: io::Error },

    #[error("Invalid preferences file: {path}: {source}")]
    PrefsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Cannot open source instance: {path}: {source}")]
    SourceOpen { path: PathBuf, source: io::Error },

    #[error("Staging path already exists: {path}")]
    StagingExists { path: PathBuf },

    #[error("--elevate-with needs a command")]
    EmptyElevationCommand,

    #[error("Cannot locate the iclone executable: {source}")]
    CurrentExe { source: io::Error },

    #[error("{message} ({detail})")]
    CopyFailed {
        message: &'static str,
        code: ErrorCode,
        detail: String,
    },

    #[error("Copy task ended without a result")]
    TaskIncomplete,

    #[error(transparent)]
    Library(#[from] InstcloneError),

    #[error("Invalid {env} value: {source}", env = logging::LOG_ENV)]
    LogFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },

    #[error("Failed to initialise logging: {source}")]
    LogInit {
        source: tracing_subscriber::util::TryInitError,
    },

    #[error("Failed to serialize JSON output: {source}")]
    JsonSerialize { source: serde_json::Error },
}

impl CliError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::PrefsRead { .. }
            | Self::PrefsParse { .. }
            | Self::SourceOpen { .. }
            | Self::StagingExists { .. }
            | Self::EmptyElevationCommand
            | Self::LogFilter { .. } => ErrorCode::InvalidInput,
            Self::CurrentExe { .. }
            | Self::TaskIncomplete
            | Self::LogInit { .. }
            | Self::JsonSerialize { .. } => ErrorCode::IoError,
            Self::CopyFailed { code, .. } => *code,
            Self::Library(source) => source.code(),
        }
    }

    fn to_json_value(&self) -> Value {
        let status = if self.code() == ErrorCode::Cancelled {
            "aborted"
        } else {
            "failed"
        };
        let (message, detail) = match self {
            Self::CopyFailed {
                message, detail, ..
            } => ((*message).to_string(), detail.clone()),
            other => (other.to_string(), String::new()),
        };
        json!({
            "status": status,
            "error_code": self.code().as_str(),
            "message": message,
            "detail": detail,
        })
    }
}

fn exit_code_for(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::InvalidInput => 2,
        ErrorCode::Cancelled => 130,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_tracing(cli.log_level, cli.log_format) {
        eprintln!("error[{}]: {}", error.code(), error);
        std::process::exit(exit_code_for(error.code()));
    }

    let output = match &cli.command {
        Command::Clone(args) => args.output,
        Command::LinkHelper(_) => OutputMode::Human,
    };

    let result = match cli.command {
        Command::Clone(args) => run_clone(&args),
        Command::LinkHelper(args) => {
            run_link_helper(&args.requests, &args.results).map_err(CliError::from)
        }
    };

    if let Err(error) = result {
        match output {
            OutputMode::Json => {
                println!("{}", error.to_json_value());
            }
            OutputMode::Human => {
                eprintln!("error[{}]: {}", error.code(), error);
            }
        }
        std::process::exit(exit_code_for(error.code()));
    }
}

/// Reporter printing the status line for humans; completion is reported by
/// `run_clone` itself.
struct ConsoleReporter {
    output: OutputMode,
}

impl TaskReporter for ConsoleReporter {
    fn set_status(&self, status: &str) {
        tracing::info!(status, "copy task status");
        if self.output == OutputMode::Human {
            eprintln!("{status}");
        }
    }

    fn emit_succeeded(&self) {
        tracing::info!("copy task succeeded");
    }

    fn emit_failed(&self, message: &str) {
        tracing::debug!(message, "copy task failed");
    }
}

fn load_preferences(args: &CloneArgs) -> CliResult<CopyPreferences> {
    let mut prefs = match &args.prefs {
        Some(path) => {
            let contents = fs::read_to_string(path).map_err(|source| CliError::PrefsRead {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| CliError::PrefsParse {
                path: path.clone(),
                source,
            })?
        }
        None => CopyPreferences::default(),
    };

    if args.keep_playtime {
        prefs.keep_playtime = true;
    }
    if let Some(filter) = &args.filter {
        prefs.filter_expression = filter.clone();
    }
    if args.include {
        prefs.filter_mode = FilterMode::Include;
    }
    if args.link || args.hard_links {
        prefs.use_links = true;
    }
    if args.hard_links {
        prefs.use_hard_links = true;
    }
    if args.dont_link_saves {
        prefs.dont_link_saves = true;
    }
    if args.copy_saves {
        prefs.copy_saves = true;
    }
    if let Some(jobs) = args.jobs {
        prefs.parallel = jobs.max(1);
    }
    if let Some(secs) = args.elevation_timeout {
        prefs.elevation_timeout_secs = (secs > 0).then_some(secs);
    }
    Ok(prefs)
}

fn link_capability(args: &CloneArgs) -> CliResult<LinkCapability> {
    match &args.elevate_with {
        Some(command) => {
            let prefix: Vec<OsString> = command.split_whitespace().map(OsString::from).collect();
            if prefix.is_empty() {
                return Err(CliError::EmptyElevationCommand);
            }
            let elevator = CommandElevator::current_exe(ElevationLauncher::Prefix(prefix))
                .map_err(|source| CliError::CurrentExe { source })?;
            Ok(LinkCapability::AttemptLinkWithElevationFallback(Arc::new(
                elevator,
            )))
        }
        None if cfg!(windows) => {
            let elevator = CommandElevator::current_exe(ElevationLauncher::WindowsRunAs)
                .map_err(|source| CliError::CurrentExe { source })?;
            Ok(LinkCapability::detect(Arc::new(elevator)))
        }
        None => Ok(LinkCapability::AttemptLink),
    }
}

fn strategy_name(prefs: &CopyPreferences) -> &'static str {
    match (prefs.use_links, prefs.use_hard_links) {
        (false, _) => "copy",
        (true, false) => "symlink",
        (true, true) => "hardlink",
    }
}

fn run_clone(args: &CloneArgs) -> CliResult<()> {
    let start_time = Instant::now();
    let prefs = load_preferences(args)?;

    let original = DirInstance::open(&args.source).map_err(|source| CliError::SourceOpen {
        path: args.source.clone(),
        source,
    })?;
    if fs::symlink_metadata(&args.staging).is_ok() {
        return Err(CliError::StagingExists {
            path: args.staging.clone(),
        });
    }

    let mut task = InstanceCopyTask::new(Arc::new(original), &prefs)?
        .with_capability(link_capability(args)?);
    task.set_staging_path(&args.staging)?;
    if let Some(name) = &args.name {
        task.set_name(name.clone());
    }
    if let Some(icon) = &args.icon {
        task.set_icon_key(icon.clone());
    }

    let cancel = task.cancel_handle();
    ctrlc::set_handler(move || {
        if cancel.load(Ordering::Relaxed) {
            eprintln!("\nForce quit.");
            std::process::exit(130);
        }
        cancel.store(true, Ordering::Relaxed);
        eprintln!("\nCancelling... Press Ctrl+C again to abort immediately.");
    })
    .ok();

    task.execute(Arc::new(ConsoleReporter {
        output: args.output,
    }))?;

    match task.wait() {
        TaskState::Succeeded => {}
        TaskState::Aborted => {
            return Err(CliError::CopyFailed {
                message: ABORTED_MESSAGE,
                code: ErrorCode::Cancelled,
                detail: InstcloneError::Cancelled.to_string(),
            });
        }
        TaskState::Failed => {
            let (code, detail) = task
                .last_error()
                .map_or((ErrorCode::IoError, String::from("unknown failure")), |e| {
                    (e.code(), e.to_string())
                });
            return Err(CliError::CopyFailed {
                message: FAILED_MESSAGE,
                code,
                detail,
            });
        }
        TaskState::Idle | TaskState::Running => return Err(CliError::TaskIncomplete),
    }

    let instance = task.take_instance().ok_or(CliError::TaskIncomplete)?;
    let elapsed = start_time.elapsed();

    match args.output {
        OutputMode::Human => {
            println!(
                "Created \"{}\" at {} ({}, {:.2}s)",
                instance.name(),
                display_path(instance.root()),
                strategy_name(&prefs),
                elapsed.as_secs_f64()
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "status": "succeeded",
                "source": display_path(&args.source),
                "staging": display_path(instance.root()),
                "name": instance.name(),
                "icon_key": instance.icon_key(),
                "strategy": strategy_name(&prefs),
                "saves_copied_separately": prefs.use_links && prefs.copy_saves_separately(),
                "playtime_kept": prefs.keep_playtime,
                "duration_ms": duration_ms(elapsed),
            });
            print_json_value(&payload)?;
        }
    }
    Ok(())
}

fn print_json_value(value: &Value) -> CliResult<()> {
    let serialized =
        serde_json::to_string(value).map_err(|source| CliError::JsonSerialize { source })?;
    println!("{serialized}");
    Ok(())
}

/// Milliseconds for JSON output, saturating at `u64::MAX`.
fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
