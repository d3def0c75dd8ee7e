//! api-harvest main entry point
//!
//! This is the command-line interface for validating captured requests,
//! running crawl jobs and inspecting their logs.

use anyhow::{bail, Context};
use api_harvest::config::{load_config_with_hash, Config};
use api_harvest::crawler::{
    build_http_client, build_service, validate_curl, CrawlService, JobConfig, JobHandle,
    RunOutcome,
};
use api_harvest::logbus::StreamEvent;
use api_harvest::storage::open_storage;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// api-harvest: turn a captured curl command into a paginated crawl
#[derive(Parser, Debug)]
#[command(name = "api-harvest")]
#[command(version)]
#[command(about = "Recurring, paginated API ingestion from a curl command", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the request once and report pagination and schema
    Validate {
        /// The curl command, quoted as one argument
        curl: String,
    },

    /// Create a job and run it, streaming its log until it ends
    Run {
        /// Table the records are stored in
        #[arg(long)]
        table: String,

        /// Seconds between requests, either N or START..END
        #[arg(long, value_parser = parse_interval)]
        interval: Option<(u64, u64)>,

        /// Always wait the start interval instead of a random one
        #[arg(long)]
        no_randomize: bool,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<u64>,

        /// Stop once this RFC 3339 timestamp has passed
        #[arg(long)]
        end_date: Option<DateTime<Utc>>,

        /// The curl command, quoted as one argument
        curl: String,
    },

    /// Launch an existing job that is not running
    Start { job_id: String },

    /// Resume a paused job from its saved progress
    Resume { job_id: String },

    /// Print a job's durable log
    Logs {
        job_id: String,

        /// Number of most recent entries
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Only entries newer than this log id
        #[arg(long)]
        since: Option<i64>,
    },

    /// List all jobs
    Jobs,

    /// List notifications, newest first
    Notifications {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,

        /// Mark this notification as read
        #[arg(long, value_name = "ID")]
        mark_read: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Command::Validate { curl } = &cli.command {
        return handle_validate(&config, curl).await;
    }

    let storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;
    let service = build_service(storage, &config)?;

    match cli.command {
        Command::Validate { .. } => Ok(()),
        Command::Run {
            table,
            interval,
            no_randomize,
            max_pages,
            end_date,
            curl,
        } => {
            let mut job = JobConfig::new(curl, table);
            if let Some((start, end)) = interval {
                job.start_interval = Some(start);
                job.end_interval = Some(end);
            }
            job.randomize_interval = !no_randomize;
            job.max_pages = max_pages;
            job.end_date = end_date;

            let job_id = service.create_job(job).await?;
            println!("Created job {}", job_id);
            let handle = service.start(&job_id)?;
            follow(&service, handle).await
        }
        Command::Start { job_id } => {
            let handle = service.start(&job_id)?;
            follow(&service, handle).await
        }
        Command::Resume { job_id } => {
            let handle = service.resume(&job_id)?;
            follow(&service, handle).await
        }
        Command::Logs {
            job_id,
            limit,
            since,
        } => {
            for entry in service.bus().read_page(&job_id, limit, since)? {
                println!("{:>6} {}", entry.id.unwrap_or_default(), entry);
            }
            Ok(())
        }
        Command::Jobs => {
            for job in service.jobs()? {
                println!(
                    "{}  {:<9}  {:<12}  page {:<5} records {:<7} {}",
                    job.id,
                    job.status,
                    job.pagination_type,
                    job.current_page,
                    job.total_records,
                    job.table_name
                );
            }
            Ok(())
        }
        Command::Notifications { unread, mark_read } => {
            if let Some(id) = mark_read {
                if !service.mark_notification_read(&id)? {
                    bail!("Notification not found: {}", id);
                }
            }
            for notification in service.notifications(unread)? {
                println!(
                    "{} [{:<7}] {}{}",
                    notification.created_at,
                    notification.kind,
                    notification.message,
                    if notification.is_read { "" } else { " (unread)" }
                );
            }
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Job log entries are printed from the stream, not mirrored
            0 => EnvFilter::new("api_harvest=info,api_harvest::joblog=off,warn"),
            1 => EnvFilter::new("api_harvest=debug,api_harvest::joblog=off,info"),
            2 => EnvFilter::new("api_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `validate`: sends the request once and prints the report
async fn handle_validate(config: &Config, curl: &str) -> anyhow::Result<()> {
    let client = build_http_client(&config.http)?;
    let report = validate_curl(&client, curl).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Streams a run's log until it ends; Ctrl-C pauses the job
async fn follow(service: &CrawlService, mut handle: JobHandle) -> anyhow::Result<()> {
    let job_id = handle.job_id().to_string();
    let mut subscription = service.bus().subscribe(&job_id);
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            biased;
            event = subscription.next() => match event {
                Some(StreamEvent::Entry(entry)) => println!("{}", entry),
                Some(StreamEvent::Keepalive { .. }) => {}
                None => break handle.wait().await,
            },
            outcome = handle.wait() => break outcome,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                println!("Interrupted, pausing job {}", job_id);
                if let Err(e) = service.pause(&job_id) {
                    tracing::warn!("Could not pause job {}: {}", job_id, e);
                    service.scheduler().cancel(&job_id);
                }
            }
        }
    };

    while let Some(entry) = subscription.try_next() {
        println!("{}", entry);
    }

    match outcome {
        RunOutcome::Completed { reason } => println!("Job {} completed: {}", job_id, reason),
        RunOutcome::Cancelled => println!("Job {} paused; resume with `api-harvest resume {}`", job_id, job_id),
        RunOutcome::Failed { message } => bail!("Job {} failed: {}", job_id, message),
    }
    Ok(())
}

/// Parses `N` or `START..END` into an interval in seconds
fn parse_interval(value: &str) -> Result<(u64, u64), String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| format!("'{}' is not a number of seconds", s))
    };

    match value.split_once("..") {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(format!("start ({}) must not exceed end ({})", start, end));
            }
            Ok((start, end))
        }
        None => {
            let secs = parse(value)?;
            Ok((secs, secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("10"), Ok((10, 10)));
        assert_eq!(parse_interval("5..15"), Ok((5, 15)));
        assert!(parse_interval("15..5").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "api-harvest",
            "-v",
            "run",
            "--table",
            "users",
            "--interval",
            "1..3",
            "--max-pages",
            "5",
            "curl https://api.example.com/users",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Run {
                table,
                interval,
                max_pages,
                ..
            } => {
                assert_eq!(table, "users");
                assert_eq!(interval, Some((1, 3)));
                assert_eq!(max_pages, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
