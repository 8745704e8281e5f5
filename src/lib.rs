//! Gmail Message Mover
//!
//! Moves messages between Gmail labels and between Gmail accounts, one
//! operator-approved message at a time.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 with one cached token per account
//! - **Querying**: Gmail search queries built from labels, dates and free text
//! - **Approval**: per-message prompts with approve-all and delay latches
//! - **Moving**: raw copy + label + delete across accounts, relabel within one
//! - **Logging**: an append-only JSON Lines record of every attempted move
//! - **Jobs**: saved move definitions that can be re-run later
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_mover::approval::AutoApprover;
//! use gmail_mover::client::{MailboxClient, ProductionGmailClient};
//! use gmail_mover::config::Config;
//! use gmail_mover::move_log::FileMoveLog;
//! use gmail_mover::request::TransferRequest;
//! use gmail_mover::transfer::TransferEngine;
//! use gmail_mover::ui::Console;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let src_email = "me@example.com".parse()?;
//!     let dst_email = "archive@example.com".parse()?;
//!     let src_hub = gmail_mover::auth::connect_account(&config.paths, &src_email).await?;
//!     let dst_hub = gmail_mover::auth::connect_account(&config.paths, &dst_email).await?;
//!
//!     let mut request = TransferRequest::new(src_email, dst_email);
//!     request.src_labels = vec!["INBOX".parse()?];
//!     request.dst_labels = vec!["Archive".parse()?];
//!
//!     let src: Arc<dyn MailboxClient> = Arc::new(ProductionGmailClient::new(src_hub));
//!     let dst: Arc<dyn MailboxClient> = Arc::new(ProductionGmailClient::new(dst_hub));
//!     let mut engine = TransferEngine::new(
//!         src,
//!         dst,
//!         Box::new(AutoApprover),
//!         Arc::new(FileMoveLog::in_dir(&config.paths.config_dir())?),
//!         Arc::new(Console),
//!         config.transfer.settings(),
//!     );
//!
//!     let report = engine.run(&CancellationToken::new(), &request).await?;
//!     println!("moved {}", report.transferred);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`approval`] - Approval prompts and the latched approval gate
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line arguments and progress display
//! - [`client`] - Mailbox trait and the retrying Gmail API client
//! - [`config`] - Configuration management
//! - [`error`] - Error types, classification and result alias
//! - [`job`] - Job file load/save
//! - [`labels`] - Label name to id resolution
//! - [`models`] - Message descriptions and move log entries
//! - [`move_log`] - Move log sinks
//! - [`mover`] - Single-message move execution
//! - [`query`] - Search query building and paged id collection
//! - [`request`] - Transfer request and validated value types
//! - [`transfer`] - Transfer orchestration
//! - [`ui`] - Operator-facing output

pub mod approval;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod labels;
pub mod models;
pub mod move_log;
pub mod mover;
pub mod query;
pub mod request;
pub mod transfer;
pub mod ui;

// Re-export commonly used types for convenience
pub use error::{ErrorClass, MoverError, Result};

pub use models::{MessageHeaders, MessageInfo, MoveLogEntry};

pub use request::{EmailAddress, LabelName, TransferRequest};

pub use config::Config;

pub use client::{MailboxClient, ProductionGmailClient};

pub use approval::{ApprovalGate, ApprovalResponse, Approver, AutoApprover, TerminalApprover};

pub use move_log::{FileMoveLog, MemoryMoveLog, MoveLogSink};

pub use transfer::{TransferEngine, TransferReport, TransferSettings};

pub use job::{Job, MoveJobSpec};
