//! spark-lane CLI
//!
//! Entry point for the `spark-lane` command-line tool.

use clap::{Parser, Subcommand};
use spark_submit_lane::command::MASK;
use spark_submit_lane::signal::{self, EXIT_CODE_CANCELLED};
use spark_submit_lane::{
    logging, CommandBuilder, JobStatus, LaneError, LaneSettings, StatusPoller, StatusRequest,
    SubmissionConfig, SubmissionReport, SubmitTask,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const EXIT_FAILED: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_UNKNOWN: i32 = 3;
const EXIT_LAUNCH_ERROR: i32 = 4;

#[derive(Parser)]
#[command(name = "spark-lane")]
#[command(about = "Submit and track Spark jobs through spark-submit", version)]
struct Cli {
    /// Debug logging (overridden by SPARK_LANE_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and follow it to completion
    Submit {
        /// Path to the job config file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Override the application path from the config
        #[arg(long)]
        application: Option<String>,

        /// Seconds a cancelled submit process gets before it is killed
        #[arg(long)]
        grace_seconds: Option<u64>,

        /// Consecutive failed status queries before giving up
        #[arg(long)]
        max_missed_reports: Option<u32>,

        /// Seconds a status query or remote kill may take
        #[arg(long)]
        command_timeout: Option<u64>,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the command line a job would run, secrets masked
    Render {
        /// Path to the job config file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Query a standalone-cluster driver once
    Status {
        /// Path to the job config file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Driver id, e.g. driver-20240101120000-0001
        driver_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Submit {
            config,
            application,
            grace_seconds,
            max_missed_reports,
            command_timeout,
            json,
        } => {
            let mut settings = LaneSettings::default();
            if let Some(secs) = grace_seconds {
                settings.termination_grace = Duration::from_secs(secs);
            }
            if let Some(max) = max_missed_reports {
                settings.max_missed_reports = max;
            }
            if let Some(secs) = command_timeout {
                settings.command_timeout = Duration::from_secs(secs);
            }
            run_submit(&config, application, settings, json);
        }
        Commands::Render { config, json } => {
            run_render(&config, json);
        }
        Commands::Status {
            config,
            driver_id,
            json,
        } => {
            run_status(&config, &driver_id, json);
        }
    }
}

fn load_config(path: &Path) -> SubmissionConfig {
    match SubmissionConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error ({}): {}", path.display(), e);
            process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

fn run_submit(path: &Path, application: Option<String>, settings: LaneSettings, json: bool) {
    let mut config = load_config(path);
    if let Some(application) = application {
        config.application = application;
    }

    let task = Arc::new(SubmitTask::new(config, settings));
    let killer = Arc::clone(&task);
    if let Err(e) = signal::install(move || killer.on_kill()) {
        warn!(error = %e, "could not install signal handler");
    }

    match task.execute() {
        Ok(report) => {
            print_report(&report, json);
            process::exit(exit_code(report.status));
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            let code = match e {
                LaneError::Config(_) => EXIT_CONFIG_ERROR,
                LaneError::Launch(_) => EXIT_LAUNCH_ERROR,
                LaneError::AlreadyStarted => EXIT_FAILED,
            };
            process::exit(code);
        }
    }
}

fn exit_code(status: JobStatus) -> i32 {
    match status {
        JobStatus::Succeeded => 0,
        JobStatus::Failed => EXIT_FAILED,
        JobStatus::Killed => EXIT_CODE_CANCELLED,
        JobStatus::Unknown | JobStatus::Pending | JobStatus::Running => EXIT_UNKNOWN,
    }
}

fn print_report(report: &SubmissionReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(EXIT_FAILED);
            }
        }
        return;
    }

    println!("Status: {}", report.status);
    if let Some(submission) = &report.submission {
        println!("  Attempt: {}", submission.id);
        if let Some(driver_id) = &submission.driver_id {
            println!("  Driver: {}", driver_id);
        }
        if let Some(app_id) = &submission.application_id {
            println!("  Application: {}", app_id);
        }
        if let Some(pod) = &submission.driver_pod {
            println!("  Driver pod: {}", pod);
        }
        if let Some(code) = submission.exit_code {
            println!("  Exit code: {}", code);
        }
    }
    if !report.succeeded() {
        if let Some(message) = &report.message {
            println!();
            println!("{}", message);
        }
    }
}

fn run_render(path: &Path, json: bool) {
    let config = load_config(path);
    let spec = match CommandBuilder::new().build(&config) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if json {
        let output = serde_json::json!({
            "command": spec.masked(),
            "env": spec.env.keys().collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&output) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(EXIT_FAILED);
            }
        }
    } else {
        println!("{}", spec.masked());
        for key in spec.env.keys() {
            println!("  env {}={}", key, MASK);
        }
    }
}

fn run_status(path: &Path, driver_id: &str, json: bool) {
    let config = load_config(path);
    let request = StatusRequest {
        command: CommandBuilder::new().status_command(&config, driver_id),
        driver_id: driver_id.to_string(),
    };

    match StatusPoller::default().query_once(&request) {
        Ok(snapshot) => {
            if json {
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(EXIT_FAILED);
                    }
                }
            } else {
                println!("{}: {}", driver_id, snapshot.status);
                if let Some(message) = &snapshot.message {
                    println!("  {}", message);
                }
            }
        }
        Err(e) => {
            eprintln!("Status query failed: {}", e);
            process::exit(EXIT_UNKNOWN);
        }
    }
}
