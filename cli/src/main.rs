//! backupctl - Command-line front end for the backup job engine.
//!
//! Manages the saved job list (create, list, remove), runs jobs with a live
//! progress bar and pause/resume/cancel from stdin, and shows the transfer log.

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Local, NaiveDate};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use engine::{
    AppConfig, BackupMode, ChannelListener, EngineError, Job, JobHandle, JobRegistry, JobSnapshot, JobState, JsonDailyLog,
    StateStore, TransferLogRecord,
};
use parking_lot::Mutex;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// backupctl - personal backup jobs
#[derive(Parser, Debug)]
#[command(name = "backupctl")]
#[command(version = "0.1.0")]
#[command(about = "Create, run and monitor backup jobs")]
struct Cli {
    /// Data directory holding config.toml, the job state file and the logs
    #[arg(long, value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a new backup job
    Create {
        /// Unique job name
        #[arg(long)]
        name: String,

        /// Source directory
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        /// Target directory
        #[arg(long, value_name = "PATH")]
        dst: PathBuf,

        /// Backup mode: full or differential
        #[arg(long, value_name = "MODE", default_value = "full")]
        mode: String,
    },

    /// Show all saved jobs and their last known progress
    List,

    /// Delete a saved job
    Remove {
        /// Name of the job to delete
        name: String,
    },

    /// Run jobs one after another: "2", "1-3" or "1;3"
    Run {
        /// Job selection (1-based positions as shown by `list`)
        selection: String,
    },

    /// Print the transfer log of one day
    Logs {
        /// Day to show (YYYY-MM-DD); defaults to the most recent day with records
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
}

/// Everything a command needs: configuration, saved jobs and the two sinks.
struct App {
    config: AppConfig,
    store: Arc<StateStore>,
    registry: JobRegistry,
    log: JsonDailyLog,
}

impl App {
    fn open(data_dir: Option<&Path>) -> anyhow::Result<App> {
        let config = AppConfig::discover(data_dir).context("Could not load configuration")?;
        let store = StateStore::open_recovering(&config.state_file)
            .with_context(|| format!("Could not open job state {}", config.state_file.display()))?;
        let registry = JobRegistry::from_snapshots(store.snapshots(), config.max_jobs);
        let log = JsonDailyLog::new(&config.log_dir);
        Ok(App {
            config,
            store: Arc::new(store),
            registry,
            log,
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        self.store
            .save_all(self.registry.snapshots())
            .context("Could not save job state")
    }
}

/// Renders job snapshots as a progress line on stderr.
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_render: Option<Instant>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_render: None,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u8) -> String {
        let filled = (percent.min(100) / 5) as usize;
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
    }

    fn render(&mut self, snapshot: &JobSnapshot) {
        match snapshot.state {
            JobState::Active if snapshot.files_remaining == snapshot.total_file_count => {
                eprintln!("Running '{}' ({} mode)", snapshot.name, snapshot.mode);
                eprintln!("  Source: {}", snapshot.source_root.display());
                eprintln!("  Target: {}", snapshot.target_root.display());
                eprintln!(
                    "  Total: {} across {} files",
                    Self::format_bytes(snapshot.total_byte_size),
                    snapshot.total_file_count
                );
                if std::io::stdin().is_terminal() {
                    eprintln!("  Type p + Enter to pause, r to resume, c to cancel");
                }
            }
            JobState::Paused => eprintln!("\nPaused ({} files left)", snapshot.files_remaining),
            JobState::Cancelled => eprintln!("\nCancelled ({} files left)", snapshot.files_remaining),
            JobState::Completed => {
                eprintln!("\r{}", Self::progress_bar(100));
                eprintln!("Completed in {}", Self::format_duration(self.start_time.elapsed()));
            }
            _ => self.render_progress(snapshot),
        }
    }

    fn render_progress(&mut self, snapshot: &JobSnapshot) {
        if self.verbose {
            if let Some(file) = &snapshot.current_source_file {
                eprintln!("[{:3}%] {}", snapshot.progress_percent, file.display());
            }
            return;
        }

        // Throttle progress updates to avoid spam (max once per 200ms)
        if let Some(last) = self.last_render {
            if last.elapsed() < Duration::from_millis(200) && snapshot.files_remaining > 0 {
                return;
            }
        }
        self.last_render = Some(Instant::now());

        let done_bytes = snapshot.total_byte_size.saturating_sub(snapshot.bytes_remaining);
        eprint!(
            "\r{} | {}/{} | {} files left ",
            Self::progress_bar(snapshot.progress_percent),
            Self::format_bytes(done_bytes),
            Self::format_bytes(snapshot.total_byte_size),
            snapshot.files_remaining
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }
}

/// Handle of whichever job is currently running, for the stdin reader.
type ControlSlot = Arc<Mutex<Option<JobHandle>>>;

/// Read p/r/c commands from stdin and apply them to the running job.
fn spawn_control_reader(slot: ControlSlot) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let Some(handle) = slot.lock().clone() else { continue };
            let accepted = match line.trim() {
                "p" | "pause" => handle.pause(),
                "r" | "resume" => handle.resume(),
                "c" | "cancel" => handle.cancel(),
                "" => continue,
                other => {
                    eprintln!("\nUnknown command '{}' (p, r or c)", other);
                    continue;
                }
            };
            if !accepted {
                eprintln!("\nCommand ignored in the current state");
            }
        }
    });
}

/// Run one job on a worker thread, persisting and rendering every snapshot.
fn run_one(
    job: &mut Job,
    store: &StateStore,
    log: &JsonDailyLog,
    slot: &ControlSlot,
    verbose: bool,
) -> anyhow::Result<JobState> {
    let (tx, rx) = unbounded();
    job.set_listener(ChannelListener::new(tx));
    *slot.lock() = Some(job.handle());

    let outcome = thread::scope(|s| {
        let worker = s.spawn(|| {
            let result = job.execute(log);
            // Dropping the listener closes the channel and ends the loop below
            job.clear_listener();
            result
        });

        let mut view = CliProgress::new(verbose);
        let mut store_failed = false;
        for snapshot in rx.iter() {
            if let Err(e) = store.upsert(&snapshot) {
                if !store_failed {
                    tracing::warn!("could not persist progress: {}", e);
                    store_failed = true;
                }
            }
            view.render(&snapshot);
        }

        worker.join()
    });
    *slot.lock() = None;

    let outcome = outcome.map_err(|_| anyhow!("worker thread for '{}' panicked", job.name()))?;
    store.upsert(&job.snapshot()).context("Could not save job state")?;
    Ok(outcome?)
}

/// Short label telling a job's setup problems apart from runtime failures.
fn failure_kind(error: &anyhow::Error) -> &'static str {
    match error.downcast_ref::<EngineError>() {
        Some(e) if e.is_configuration() => "check the job settings",
        _ => "I/O failure",
    }
}

/// Failed transfers logged for `job_name` since `since`.
fn failures_since(log: &JsonDailyLog, job_name: &str, since: DateTime<Local>) -> anyhow::Result<Vec<TransferLogRecord>> {
    let mut failed = Vec::new();
    for day in log.days()?.into_iter().filter(|d| *d >= since.date_naive()) {
        failed.extend(
            log.read_day(day)?
                .into_iter()
                .filter(|r| r.job_name == job_name && r.timestamp >= since && r.is_failure()),
        );
    }
    Ok(failed)
}

fn cmd_create(app: &mut App, name: &str, src: &Path, dst: &Path, mode: &str) -> anyhow::Result<()> {
    let mode: BackupMode = mode.parse()?;
    if !src.is_dir() {
        tracing::warn!("source {} does not exist yet; the job will not run until it does", src.display());
    }
    app.registry
        .create(name, src, dst, mode)
        .with_context(|| format!("Could not create job '{}'", name))?;
    app.save()?;
    eprintln!("Created job '{}' ({} of {})", name, app.registry.len(), app.registry.max_jobs());
    Ok(())
}

fn cmd_list(app: &App) {
    if app.registry.is_empty() {
        println!("No jobs configured.");
        return;
    }
    for (i, job) in app.registry.iter().enumerate() {
        println!("{}. [Name: {}] [Type: {}] [State: {}] [{}%]", i + 1, job.name(), job.mode(), job.state(), job.progress_percent());
        println!("   Source: {}", job.source_root().display());
        println!("   Target: {}", job.target_root().display());
        if let Some(at) = job.last_action_timestamp() {
            println!("   Last activity: {}", at.format("%d/%m/%Y %H:%M:%S"));
        }
    }
    println!("State file: {}", app.store.path().display());
}

fn cmd_remove(app: &mut App, name: &str) -> anyhow::Result<()> {
    app.registry.remove(name)?;
    app.save()?;
    eprintln!("Removed job '{}'", name);
    Ok(())
}

fn cmd_run(app: &mut App, selection: &str, verbose: bool) -> anyhow::Result<()> {
    let indices = engine::parse_selection(selection)?;
    let slot: ControlSlot = Arc::new(Mutex::new(None));
    if std::io::stdin().is_terminal() {
        spawn_control_reader(Arc::clone(&slot));
    }

    let mut problems = 0;
    let total = app.registry.len();
    for index in indices {
        let Some(job) = app.registry.by_index_mut(index) else {
            eprintln!("Error: Job index {} is out of range (1-{}).", index, total);
            problems += 1;
            continue;
        };

        let started = Local::now();
        let previous_run = job.last_run_id();
        eprintln!("> [{}] Starting job {}: {}", started.format("%H:%M:%S"), index, job.name());
        match run_one(job, &app.store, &app.log, &slot, verbose) {
            Ok(_) if job.last_run_id() == previous_run => eprintln!("Nothing to copy: source tree is empty."),
            Ok(state) => {
                let failed = failures_since(&app.log, job.name(), started)?;
                if !failed.is_empty() {
                    problems += 1;
                    eprintln!("{} file(s) failed to copy:", failed.len());
                    for record in failed {
                        eprintln!("  {}", record.source_path);
                    }
                }
                eprintln!("> [{}] Job {} {}.", Local::now().format("%H:%M:%S"), index, state.to_string().to_lowercase());
            }
            Err(e) => {
                problems += 1;
                eprintln!("Error: job '{}' did not run ({}): {:#}", job.name(), failure_kind(&e), e);
            }
        }
    }

    if problems > 0 {
        bail!("{} job(s) had problems", problems);
    }
    Ok(())
}

fn cmd_logs(app: &App, date: Option<&str>) -> anyhow::Result<()> {
    let day = match date {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", text))?,
        None => match app.log.days()?.last() {
            Some(day) => *day,
            None => {
                println!("No transfers logged yet ({}).", app.log.dir().display());
                return Ok(());
            }
        },
    };

    let records = app.log.read_day(day)?;
    println!("{} transfer(s) on {}", records.len(), day);
    for record in records {
        let outcome = if record.is_failure() {
            "FAILED".to_string()
        } else {
            format!("{} ms", record.transfer_duration_millis)
        };
        println!(
            "{} [{}] {} -> {} ({}, {})",
            record.timestamp.format("%H:%M:%S"),
            record.job_name,
            record.source_path,
            record.target_path,
            CliProgress::format_bytes(record.file_size_bytes),
            outcome
        );
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse arguments, then dispatch the command
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run_cli(&cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    let mut app = App::open(cli.data_dir.as_deref())?;
    tracing::debug!(max_jobs = app.config.max_jobs, "loaded {} job(s)", app.registry.len());

    match &cli.command {
        Command::Create { name, src, dst, mode } => cmd_create(&mut app, name, src, dst, mode),
        Command::List => {
            cmd_list(&app);
            Ok(())
        }
        Command::Remove { name } => cmd_remove(&mut app, name),
        Command::Run { selection } => cmd_run(&mut app, selection, cli.verbose),
        Command::Logs { date } => cmd_logs(&app, date.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(data_dir: &TempDir, command: Command) -> Cli {
        Cli {
            data_dir: Some(data_dir.path().to_path_buf()),
            verbose: false,
            command,
        }
    }

    fn create(data_dir: &TempDir, name: &str, src: &Path, dst: &Path, mode: &str) -> anyhow::Result<()> {
        run_cli(&cli(
            data_dir,
            Command::Create {
                name: name.to_string(),
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                mode: mode.to_string(),
            },
        ))
    }

    #[test]
    fn test_create_persists_job() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let src_dir = TempDir::new().expect("Failed to create temp dir");

        create(&data_dir, "docs", src_dir.path(), &src_dir.path().join("out"), "differential")
            .expect("Create should succeed");

        let saved = StateStore::open(data_dir.path().join("state.json"))
            .expect("Failed to open state")
            .snapshots();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "docs");
        assert_eq!(saved[0].mode, BackupMode::Differential);
        assert_eq!(saved[0].state, JobState::Idle);
    }

    #[test]
    fn test_create_rejects_invalid_mode() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let result = create(&data_dir, "docs", Path::new("a"), Path::new("b"), "incremental");
        assert!(result.is_err(), "CLI should reject unsupported mode");
    }

    #[test]
    fn test_create_rejects_duplicate_and_limit() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(data_dir.path().join("config.toml"), "max_jobs = 2\n").expect("Failed to write config");
        let p = Path::new("x");

        create(&data_dir, "a", p, p, "full").expect("First job");
        assert!(create(&data_dir, "a", p, p, "full").is_err(), "duplicate name");
        create(&data_dir, "b", p, p, "full").expect("Second job");
        assert!(create(&data_dir, "c", p, p, "full").is_err(), "over the limit");
    }

    #[test]
    fn test_run_copies_and_logs() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        create(&data_dir, "job", src_dir.path(), dst_dir.path(), "full").expect("Create should succeed");
        run_cli(&cli(&data_dir, Command::Run { selection: "1".to_string() })).expect("Run should succeed");

        assert_eq!(std::fs::read_to_string(dst_dir.path().join("test.txt")).unwrap(), "hello");

        let saved = StateStore::open(data_dir.path().join("state.json")).unwrap().snapshots();
        assert_eq!(saved[0].state, JobState::Completed);
        assert_eq!(saved[0].progress_percent, 100);

        let log = JsonDailyLog::new(data_dir.path().join("Logs"));
        let day = *log.days().unwrap().last().expect("A log file should exist");
        let records = log.read_day(day).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_size_bytes, 5);

        run_cli(&cli(&data_dir, Command::Logs { date: None })).expect("Logs should print");
    }

    #[test]
    fn test_run_reports_out_of_range_and_missing_source() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let base = TempDir::new().expect("Failed to create temp dir");

        create(&data_dir, "ghost", &base.path().join("missing"), &base.path().join("out"), "full")
            .expect("Create should succeed even if the source is missing");

        let result = run_cli(&cli(&data_dir, Command::Run { selection: "1;4".to_string() }));
        assert!(result.is_err(), "missing source and bad index are both problems");

        let saved = StateStore::open(data_dir.path().join("state.json")).unwrap().snapshots();
        assert_eq!(saved[0].state, JobState::Idle);
    }

    #[test]
    fn test_failure_kind_separates_configuration_errors() {
        let missing = anyhow::Error::new(EngineError::SourceNotFound { path: PathBuf::from("gone") });
        assert_eq!(failure_kind(&missing), "check the job settings");

        let io = anyhow::Error::new(EngineError::ReadError {
            path: PathBuf::from("f"),
            source: std::io::Error::other("disk"),
        });
        assert_eq!(failure_kind(&io), "I/O failure");
    }

    #[test]
    fn test_rerun_on_emptied_source_keeps_completed() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("one.txt"), "1").expect("Failed to write file");

        create(&data_dir, "job", src_dir.path(), dst_dir.path(), "full").expect("Create should succeed");
        run_cli(&cli(&data_dir, Command::Run { selection: "1".to_string() })).expect("First run");

        std::fs::remove_file(src_dir.path().join("one.txt")).expect("Failed to empty source");
        run_cli(&cli(&data_dir, Command::Run { selection: "1".to_string() })).expect("Empty rerun is not a problem");

        let saved = StateStore::open(data_dir.path().join("state.json")).unwrap().snapshots();
        assert_eq!(saved[0].state, JobState::Completed);
    }

    #[test]
    fn test_run_rejects_bad_selection() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let result = run_cli(&cli(&data_dir, Command::Run { selection: "two".to_string() }));
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_and_list() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let p = Path::new("x");
        create(&data_dir, "a", p, p, "full").expect("Create should succeed");

        run_cli(&cli(&data_dir, Command::List)).expect("List should succeed");
        run_cli(&cli(&data_dir, Command::Remove { name: "a".to_string() })).expect("Remove should succeed");
        assert!(run_cli(&cli(&data_dir, Command::Remove { name: "a".to_string() })).is_err());

        let saved = StateStore::open(data_dir.path().join("state.json")).unwrap().snapshots();
        assert!(saved.is_empty());
    }

    #[test]
    fn test_logs_rejects_bad_date() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let result = run_cli(&cli(&data_dir, Command::Logs { date: Some("27/01/2026".to_string()) }));
        assert!(result.is_err());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(2048), "2.00 KB");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(CliProgress::progress_bar(50), format!("[{}{}]  50%", "=".repeat(10), " ".repeat(10)));
    }
}
