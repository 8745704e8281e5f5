//! Transfer orchestration: label iteration, the per-message state machine,
//! the message ceiling and run-level abort decisions.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalGate, ApprovalResponse, Approver};
use crate::client::{MailboxClient, MAX_PAGE_SIZE};
use crate::error::{ErrorClass, MoverError, Result};
use crate::models::{MessageInfo, MoveLogEntry};
use crate::move_log::{MoveLogSink, MoveLogger};
use crate::mover::MessageMover;
use crate::query::{collect_message_ids, SearchQuery};
use crate::request::TransferRequest;
use crate::ui::OutputWriter;

/// Pacing knobs for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Ids requested per list call
    pub page_size: u32,
    /// Pause after every live move
    pub move_delay: Duration,
    /// Pause before each message once the operator picks Delay
    pub approval_delay: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            move_delay: Duration::from_millis(100),
            approval_delay: Duration::from_secs(3),
        }
    }
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub run_id: String,
    /// Successful moves, or would-be moves in a dry run
    pub transferred: usize,
    /// Declined by the approver
    pub skipped: usize,
    /// Recoverable per-message failures
    pub failed: usize,
    /// Every message that got far enough to be described
    pub messages: Vec<MessageInfo>,
}

/// Where one message is in its trip through the engine
#[derive(Debug)]
pub enum MessageStep {
    /// An id from the listing, nothing fetched yet
    Candidate(String),
    /// Headers fetched, awaiting a decision
    Described(MessageInfo),
    /// Operator (or latched state) said yes
    Approved(MessageInfo),
    /// Operator said no
    Skipped(MessageInfo),
    /// Approved, but nothing was changed
    DryRun(MessageInfo),
    Moved(MessageInfo),
    Failed {
        message_id: String,
        info: Option<MessageInfo>,
        error: MoverError,
    },
}

impl MessageStep {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            MessageStep::Skipped(_)
                | MessageStep::DryRun(_)
                | MessageStep::Moved(_)
                | MessageStep::Failed { .. }
        )
    }

    fn failed(info: MessageInfo, error: MoverError) -> Self {
        MessageStep::Failed {
            message_id: info.id.clone(),
            info: Some(info),
            error,
        }
    }
}

/// What the label loop should do after a message reached a final step
enum Flow {
    Continue,
    Stop,
}

/// Drives a transfer request against a source and destination mailbox
pub struct TransferEngine {
    src: Arc<dyn MailboxClient>,
    dst: Arc<dyn MailboxClient>,
    gate: ApprovalGate,
    move_log: Arc<dyn MoveLogSink>,
    output: Arc<dyn OutputWriter>,
    settings: TransferSettings,
}

/// Mutable bookkeeping shared by the loops of one run
struct RunState<'m> {
    run_id: String,
    mover: MessageMover<'m>,
    report: TransferReport,
    /// Counts successful transfers and approval skips against the ceiling
    consumed: usize,
}

impl TransferEngine {
    pub fn new(
        src: Arc<dyn MailboxClient>,
        dst: Arc<dyn MailboxClient>,
        approver: Box<dyn Approver>,
        move_log: Arc<dyn MoveLogSink>,
        output: Arc<dyn OutputWriter>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            src,
            dst,
            gate: ApprovalGate::new(approver, settings.approval_delay),
            move_log,
            output,
            settings,
        }
    }

    /// Run one transfer to completion, cancellation, or abort.
    ///
    /// Validation happens before any remote call. The number of transferred
    /// messages is logged on every exit path.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        request: &TransferRequest,
    ) -> Result<TransferReport> {
        request.validate()?;

        let src = Arc::clone(&self.src);
        let dst = Arc::clone(&self.dst);
        let mut state = RunState {
            run_id: Uuid::new_v4().to_string(),
            mover: MessageMover::new(&*src, &*dst, request, self.settings.move_delay),
            report: TransferReport::default(),
            consumed: 0,
        };
        state.report.run_id = state.run_id.clone();

        info!(
            run_id = %state.run_id,
            src = %request.src_account,
            dst = %request.dst_account,
            labels = ?request.src_label_names(),
            max_messages = request.max_messages,
            "Processing messages"
        );
        if request.dry_run {
            info!("DRY RUN MODE - No messages will be moved");
        }

        let outcome = self.run_labels(cancel, request, &*src, &mut state).await;

        info!(
            message_count = state.report.transferred,
            skipped = state.report.skipped,
            failed = state.report.failed,
            "Messages successfully transferred"
        );

        match outcome {
            Ok(()) => Ok(state.report),
            Err(e) => {
                if e.is_cancelled() {
                    info!("Operation cancelled by user");
                }
                Err(e)
            }
        }
    }

    async fn run_labels(
        &mut self,
        cancel: &CancellationToken,
        request: &TransferRequest,
        src: &dyn MailboxClient,
        state: &mut RunState<'_>,
    ) -> Result<()> {
        for label in &request.src_labels {
            if state.consumed >= request.max_messages {
                break;
            }

            // Failed candidates don't count toward the ceiling, so each label is
            // listed up to the full limit and the loop below stops the run
            let query = SearchQuery::for_label(request, label).build();
            debug!(label = %label, query = %query, consumed = state.consumed, "Querying messages");

            let ids = match collect_message_ids(
                src,
                &query,
                request.max_messages,
                self.settings.page_size,
            )
            .await
            {
                Ok(ids) => ids,
                Err(e) if request.fail_fast || e.class() != ErrorClass::Recoverable => {
                    error!(label = %label, error = %e, "Error getting messages");
                    return Err(e);
                }
                Err(e) => {
                    error!(label = %label, error = %e, "Error getting messages");
                    continue;
                }
            };
            info!(label = %label, count = ids.len(), "Found messages");

            for id in ids {
                if cancel.is_cancelled() {
                    return Err(MoverError::cancelled());
                }
                if state.consumed >= request.max_messages {
                    info!(message_limit = request.max_messages, "Reached max message limit");
                    return Ok(());
                }

                self.gate.pause_if_delaying(cancel).await?;

                let step = self
                    .process_message(cancel, request, state, MessageStep::Candidate(id))
                    .await;
                if let Flow::Stop = Self::record(request, state, step)? {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Advance one message until it reaches a final step
    async fn process_message(
        &mut self,
        cancel: &CancellationToken,
        request: &TransferRequest,
        state: &mut RunState<'_>,
        mut step: MessageStep,
    ) -> MessageStep {
        while !step.is_final() {
            step = self.advance(cancel, request, state, step).await;
        }
        step
    }

    async fn advance(
        &mut self,
        cancel: &CancellationToken,
        request: &TransferRequest,
        state: &mut RunState<'_>,
        step: MessageStep,
    ) -> MessageStep {
        match step {
            MessageStep::Candidate(id) => match self.src.get_message_metadata(&id).await {
                Ok(headers) => MessageStep::Described(MessageInfo::from_headers(&id, &headers)),
                Err(error) => {
                    warn!(message_id = %id, stage = "fetch_metadata", error = %error, "Could not describe message");
                    MessageStep::Failed {
                        message_id: id,
                        info: None,
                        error,
                    }
                }
            },

            MessageStep::Described(info) => {
                info!(details = %info, "Transferring message");
                self.output.line(&info.to_string());

                match self.gate.decide(cancel, &request.approval_prompt).await {
                    Ok(ApprovalResponse::Cancel) => {
                        MessageStep::failed(info, MoverError::cancelled())
                    }
                    Ok(response) if response.is_approved() => MessageStep::Approved(info),
                    Ok(_) => {
                        info!(id = %info.id, subject = %info.subject, "Message skipped by user");
                        MessageStep::Skipped(info)
                    }
                    Err(error) => MessageStep::failed(info, error),
                }
            }

            MessageStep::Approved(mut info) => {
                if request.dry_run {
                    info!(src_id = %info.id, subject = %info.subject, "DRY RUN: Would move message");
                    self.output.line(&format!("DRY RUN: would move message {}", info.id));
                    return MessageStep::DryRun(info);
                }

                let outcome = state.mover.move_message(&mut info).await;
                let entry = MoveLogEntry::new(
                    &state.run_id,
                    request,
                    &info,
                    outcome.as_ref().err().map(|e| e.to_string()),
                );
                if let Err(e) = MoveLogger::new(&*self.move_log).log(entry) {
                    error!(message_id = %info.id, error = %e, "Failed to write move log entry");
                }

                match outcome {
                    Ok(()) => MessageStep::Moved(info),
                    Err(error) => MessageStep::failed(info, error),
                }
            }

            // Final steps are returned unchanged
            other => other,
        }
    }

    /// Fold a finished message into the report and decide whether the run goes on
    fn record(request: &TransferRequest, state: &mut RunState<'_>, step: MessageStep) -> Result<Flow> {
        match step {
            MessageStep::Moved(info) | MessageStep::DryRun(info) => {
                state.consumed += 1;
                state.report.transferred += 1;
                state.report.messages.push(info);
            }
            MessageStep::Skipped(info) => {
                state.consumed += 1;
                state.report.skipped += 1;
                state.report.messages.push(info);
            }
            MessageStep::Failed {
                message_id,
                info,
                error,
            } => {
                if let Some(info) = info {
                    state.report.messages.push(info);
                }
                match error.class() {
                    ErrorClass::Cancelled => return Err(error),
                    ErrorClass::Terminal => {
                        error!(message_id = %message_id, error = %error, "Terminal error - cannot continue");
                        return Err(error);
                    }
                    ErrorClass::Recoverable => {
                        state.report.failed += 1;
                        error!(message_id = %message_id, error = %error, "Error transferring message");
                        if request.fail_fast {
                            return Err(error);
                        }
                    }
                }
            }
            MessageStep::Candidate(_) | MessageStep::Described(_) | MessageStep::Approved(_) => {
                return Err(MoverError::Unknown(
                    "message processing stopped before a final step".to_string(),
                ));
            }
        }

        if state.consumed >= request.max_messages {
            info!(message_limit = request.max_messages, "Reached max message limit");
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}
