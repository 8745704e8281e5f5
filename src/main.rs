use anyhow::{Context, Result};
use clap::Parser;
use gmail_mover::approval::{Approver, AutoApprover, TerminalApprover};
use gmail_mover::auth;
use gmail_mover::cli::{self, Cli, Commands, LogFormat, ProgressReporter};
use gmail_mover::client::{MailboxClient, ProductionGmailClient};
use gmail_mover::config::Config;
use gmail_mover::error::MoverError;
use gmail_mover::job::{Job, MoveJobSpec};
use gmail_mover::move_log::FileMoveLog;
use gmail_mover::request::{EmailAddress, TransferRequest};
use gmail_mover::transfer::TransferEngine;
use gmail_mover::ui::{Console, OutputWriter};
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            // Remove trailing newline for cleaner output
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: Arc::clone(&self.multi),
            buffer: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(e) if is_cancellation(&e) => {
            println!("Operation cancelled by user");
        }
        Err(e) => {
            display_error(&e);
            eprintln!("\nFor help, run: gmail-mover --help");
            process::exit(1);
        }
    }
}

fn is_cancellation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<MoverError>()
        .is_some_and(MoverError::is_cancelled)
}

fn init_tracing(cli: &Cli, multi: &Arc<MultiProgress>) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_mover=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_mover=info,warn"))
    };

    // Logs print above any active spinner
    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(multi),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Cancel the token on Ctrl-C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not listen for SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::debug!("Shutdown signal received");
        cancel.cancel();
    });
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs (better performance, FIPS support)
    // On Windows, use ring (better compatibility, no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, &multi_progress);
    let reporter = ProgressReporter::new(Arc::clone(&multi_progress));

    let config_path = cli.config_path();

    // init-config must work even when the existing file is invalid
    if let Commands::InitConfig { output, force } = &cli.command {
        let output = output.clone().unwrap_or(config_path);
        if output.exists() && !force {
            anyhow::bail!(
                "Config file already exists at {}. Use --force to overwrite.",
                output.display()
            );
        }
        Config::create_example(&output).await?;
        println!("Created example configuration at {}", output.display());
        return Ok(());
    }

    let config = Config::load(&config_path).await?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match cli.command {
        Commands::Auth { email, force } => {
            if force && auth::forget_account(&config.paths, &email).await? {
                println!("Removed cached token for {}", email);
            }
            let (_, address) = connect(&config, &email, &reporter).await?;
            println!("Authorized {}", address);
        }

        Commands::Labels { email } => {
            let (client, _) = connect(&config, &email, &reporter).await?;
            let mut labels = client.list_labels().await?;
            labels.sort_by(|a, b| a.name.cmp(&b.name));
            for label in labels {
                println!("{:<40} {}", label.name, label.id);
            }
        }

        Commands::Move(args) => {
            let request = args.to_request(&config.transfer);
            execute_transfer(&config, request, &cancel, &reporter, args.yes, args.allow_delay)
                .await?;
        }

        Commands::Define { file, args } => {
            let request = args.to_request(&config.transfer);
            request.validate()?;
            let job = Job::new(MoveJobSpec::from_request(&request));
            job.save(&file).await?;
            println!("Saved job '{}' to {}", job.name, file.display());
        }

        Commands::Run {
            file,
            dry_run,
            yes,
            allow_delay,
        } => {
            let job = Job::load(&file).await?;
            tracing::info!("Running job '{}'", job.name);

            let mut request = job.spec.to_request();
            request.dry_run |= dry_run;
            request.fail_fast |= config.transfer.fail_fast;
            execute_transfer(&config, request, &cancel, &reporter, yes, allow_delay).await?;
        }

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Authenticate one account behind a spinner and wrap it in the retrying client
async fn connect(
    config: &Config,
    email: &EmailAddress,
    reporter: &ProgressReporter,
) -> Result<(Arc<ProductionGmailClient>, String)> {
    let spinner = reporter.add_spinner(&format!("Connecting to {}...", email));

    let connected = async {
        let hub = auth::connect_account(&config.paths, email).await?;
        let address = auth::verify_account(&hub, email).await?;
        Ok::<_, MoverError>((hub, address))
    }
    .await;

    match connected {
        Ok((hub, address)) => {
            reporter.finish_spinner(&spinner, &format!("Connected to {}", address));
            Ok((Arc::new(ProductionGmailClient::new(hub)), address))
        }
        Err(e) => {
            reporter.fail_spinner(&spinner, &format!("Could not connect to {}", email));
            Err(e.into())
        }
    }
}

async fn execute_transfer(
    config: &Config,
    request: TransferRequest,
    cancel: &CancellationToken,
    reporter: &ProgressReporter,
    yes: bool,
    allow_delay: bool,
) -> Result<()> {
    // Fail before opening a browser for consent
    request.validate()?;

    let request = if config.transfer.add_tracking_labels {
        request.with_tracking_labels(chrono::Local::now().date_naive())
    } else {
        request
    };

    let (src, _) = connect(config, &request.src_account, reporter).await?;
    let src: Arc<dyn MailboxClient> = src;
    let dst: Arc<dyn MailboxClient> = if request.is_same_account() {
        Arc::clone(&src)
    } else {
        connect(config, &request.dst_account, reporter).await?.0
    };

    let output: Arc<dyn OutputWriter> = Arc::new(Console);
    let approver: Box<dyn Approver> = if yes {
        Box::new(AutoApprover)
    } else {
        Box::new(TerminalApprover::new(Arc::clone(&output), allow_delay))
    };

    let move_log = FileMoveLog::in_dir(&config.paths.config_dir())
        .context("Failed to open move log")?;
    tracing::debug!("Recording moves in {}", move_log.path().display());

    let mut engine = TransferEngine::new(
        src,
        dst,
        approver,
        Arc::new(move_log),
        Arc::clone(&output),
        config.transfer.settings(),
    );

    let report = engine.run(cancel, &request).await?;
    output.line(&cli::format_summary(&report, request.dry_run));
    Ok(())
}

fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    // Display error chain
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    // Display helpful hints based on error type
    if let Some(err) = error.downcast_ref::<MoverError>() {
        match err {
            MoverError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-mover auth <email> --force");
            }
            MoverError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few minutes and try again, or raise transfer.move_delay_ms.");
            }
            MoverError::ValidationError(_) => {
                eprintln!("\nHint: Check the move arguments. Run: gmail-mover move --help");
            }
            MoverError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-mover init-config --force");
            }
            MoverError::JobError(_) => {
                eprintln!("\nHint: Job files are created with: gmail-mover define <file> ...");
            }
            _ => {}
        }
    }
}
