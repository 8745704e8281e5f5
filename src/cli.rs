//! Command-line interface

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{default_config_path, TransferConfig};
use crate::request::{EmailAddress, LabelName, TransferRequest};
use crate::transfer::TransferReport;

#[derive(Parser, Debug)]
#[command(name = "gmail-mover")]
#[command(version)]
#[command(about = "Move Gmail messages between labels and accounts", long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to ~/.config/gmail-mover/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize access to a Gmail account and cache its token
    Auth {
        /// Account to authorize
        email: EmailAddress,

        /// Force re-authentication even if a token exists
        #[arg(long)]
        force: bool,
    },

    /// List the labels of an account
    Labels {
        /// Account to inspect
        email: EmailAddress,
    },

    /// Move messages now
    Move(MoveArgs),

    /// Save a move as a job file without running it
    Define {
        /// Job file to create
        file: PathBuf,

        #[command(flatten)]
        args: MoveArgs,
    },

    /// Run a saved job file
    Run {
        /// Job file to run
        file: PathBuf,

        /// Force dry run regardless of the job setting
        #[arg(long)]
        dry_run: bool,

        /// Approve every message without prompting
        #[arg(short, long)]
        yes: bool,

        /// Offer the [d]elay choice at the approval prompt
        #[arg(long)]
        allow_delay: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file (defaults to the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    /// Source account
    #[arg(long)]
    pub src: EmailAddress,

    /// Destination account (may equal --src to relabel in place)
    #[arg(long)]
    pub dst: EmailAddress,

    /// Source label, repeatable. Use '*' for all messages.
    #[arg(long = "src-label")]
    pub src_labels: Vec<LabelName>,

    /// Destination label, repeatable
    #[arg(long = "dst-label")]
    pub dst_labels: Vec<LabelName>,

    /// Extra Gmail search terms
    #[arg(long)]
    pub search: Option<String>,

    /// Only messages before this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub before: Option<NaiveDate>,

    /// Only messages after this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub after: Option<NaiveDate>,

    /// Maximum number of messages to process
    #[arg(long)]
    pub max: Option<usize>,

    /// Keep the source copy after a cross-account move
    #[arg(long)]
    pub keep: bool,

    /// Show what would be moved without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failed message
    #[arg(long)]
    pub fail_fast: bool,

    /// Approve every message without prompting
    #[arg(short, long)]
    pub yes: bool,

    /// Offer the [d]elay choice at the approval prompt
    #[arg(long)]
    pub allow_delay: bool,
}

impl MoveArgs {
    /// Build a request, taking unset values from the config
    pub fn to_request(&self, defaults: &TransferConfig) -> TransferRequest {
        let mut request = TransferRequest::new(self.src.clone(), self.dst.clone());
        request.src_labels = self.src_labels.clone();
        request.dst_labels = self.dst_labels.clone();
        request.search_query = self
            .search
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        request.before = self.before;
        request.after = self.after;
        request.max_messages = self.max.unwrap_or(defaults.max_messages);
        request.delete_after_move = !self.keep;
        request.dry_run = self.dry_run;
        request.fail_fast = self.fail_fast || defaults.fail_fast;
        request
    }
}

/// Accepts `YYYY-MM-DD` or the Gmail-style `YYYY/MM/DD`
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

/// One-paragraph summary printed after a run
pub fn format_summary(report: &TransferReport, dry_run: bool) -> String {
    let verb = if dry_run { "Would transfer" } else { "Transferred" };
    let mut summary = format!(
        "{} {} message(s), skipped {}, failed {}",
        verb, report.transferred, report.skipped, report.failed
    );
    if !report.run_id.is_empty() {
        summary.push_str(&format!(" (run {})", report.run_id));
    }
    summary
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: Arc<MultiProgress>) -> Self {
        // Use {elapsed} for human-readable format (e.g., "1s", "234ms")
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }

    pub fn fail_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        eprintln!("  ✗ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(Arc::new(MultiProgress::new()))
    }
}
