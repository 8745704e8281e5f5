//! Per-message approval: operator prompts, auto-approval and the latched gate

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{MoverError, Result};
use crate::ui::OutputWriter;

/// Byte sent by Ctrl-C when the terminal is in raw mode
const ETX: char = '\u{3}';

/// How often the raw-mode reader checks for cancellation
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Operator decision for one candidate message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResponse {
    Yes,
    No,
    ApproveAll,
    Delay,
    Cancel,
}

impl ApprovalResponse {
    /// Map a typed key to a response. `d` is only accepted when delay is enabled.
    pub fn from_key(key: char, allow_delay: bool) -> Result<Self> {
        match key {
            'y' | 'Y' => Ok(ApprovalResponse::Yes),
            'n' | 'N' => Ok(ApprovalResponse::No),
            'a' | 'A' => Ok(ApprovalResponse::ApproveAll),
            'd' | 'D' if allow_delay => Ok(ApprovalResponse::Delay),
            'c' | 'C' | ETX => Ok(ApprovalResponse::Cancel),
            other => Err(MoverError::InvalidApprovalInput(format!(
                "unexpected key {:?}",
                other
            ))),
        }
    }

    /// Whether the message should be moved
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            ApprovalResponse::Yes | ApprovalResponse::ApproveAll | ApprovalResponse::Delay
        )
    }
}

/// Source of approval decisions
#[async_trait]
pub trait Approver: Send + Sync {
    /// Ask for a decision on the message described by `prompt`.
    ///
    /// Must return promptly with a cancellation error once `cancel` fires.
    async fn approve(&self, cancel: &CancellationToken, prompt: &str) -> Result<ApprovalResponse>;
}

/// Approves everything without asking
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn approve(&self, cancel: &CancellationToken, _prompt: &str) -> Result<ApprovalResponse> {
        if cancel.is_cancelled() {
            return Err(MoverError::cancelled());
        }
        Ok(ApprovalResponse::ApproveAll)
    }
}

/// Asks the operator on the controlling terminal.
///
/// Uses single-keystroke raw mode when the terminal supports it and falls
/// back to reading a whole line otherwise.
pub struct TerminalApprover {
    output: Arc<dyn OutputWriter>,
    allow_delay: bool,
}

impl TerminalApprover {
    pub fn new(output: Arc<dyn OutputWriter>, allow_delay: bool) -> Self {
        Self {
            output,
            allow_delay,
        }
    }

    fn choices(&self) -> &'static str {
        if self.allow_delay {
            "[y]es/[n]o/[a]ll/[d]elay/[c]ancel"
        } else {
            "[y]es/[n]o/[a]ll/[c]ancel"
        }
    }

    async fn read_key_raw(&self, cancel: &CancellationToken) -> Result<Option<char>> {
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || -> io::Result<Option<KeyEvent>> {
            loop {
                if token.is_cancelled() {
                    return Ok(None);
                }
                if !event::poll(KEY_POLL_INTERVAL)? {
                    continue;
                }
                // Only handle Press events to avoid key bounce on Windows
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        return Ok(Some(key));
                    }
                }
            }
        });

        let key = handle
            .await
            .map_err(|e| MoverError::ApprovalInput(io::Error::new(io::ErrorKind::Other, e)))?
            .map_err(MoverError::ApprovalInput)?;

        Ok(key.map(|key| match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => ETX,
            KeyCode::Char(c) => c,
            KeyCode::Enter => '\n',
            KeyCode::Esc => '\u{1b}',
            _ => '\0',
        }))
    }
}

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn approve(&self, cancel: &CancellationToken, prompt: &str) -> Result<ApprovalResponse> {
        self.output.prompt(&format!("{} {}: ", prompt, self.choices()));

        let key = match RawModeGuard::enable() {
            Ok(guard) => {
                let key = self.read_key_raw(cancel).await;
                drop(guard);
                key?
            }
            Err(e) => {
                debug!("Raw mode unavailable ({}), reading a full line", e);
                read_line_until_cancelled(cancel, || {
                    let mut line = String::new();
                    let read = io::stdin().lock().read_line(&mut line)?;
                    if read == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "approval input closed",
                        ));
                    }
                    Ok(line)
                })
                .await?
                .map(|line| line.trim().chars().next().unwrap_or('\0'))
            }
        };

        let Some(key) = key else {
            self.output.line("");
            return Err(MoverError::cancelled());
        };

        if key.is_ascii_graphic() {
            self.output.line(&key.to_string());
        } else {
            self.output.line("");
        }

        ApprovalResponse::from_key(key, self.allow_delay)
    }
}

/// Run a blocking line read on the blocking pool and race it against
/// cancellation. Returns `Ok(None)` when cancellation wins; the abandoned
/// read is left to finish on its own.
pub async fn read_line_until_cancelled<F>(
    cancel: &CancellationToken,
    read_line: F,
) -> Result<Option<String>>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    let read = tokio::task::spawn_blocking(read_line);

    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        result = read => {
            let line = result
                .map_err(|e| MoverError::ApprovalInput(io::Error::new(io::ErrorKind::Other, e)))?
                .map_err(MoverError::ApprovalInput)?;
            Ok(Some(line))
        }
    }
}

/// Latched approval state for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Prompting,
    ApproveAll,
    Delaying,
}

/// Wraps an approver and remembers "approve all" and "delay" answers
pub struct ApprovalGate {
    approver: Box<dyn Approver>,
    state: GateState,
    delay: Duration,
}

impl ApprovalGate {
    pub fn new(approver: Box<dyn Approver>, delay: Duration) -> Self {
        Self {
            approver,
            state: GateState::Prompting,
            delay,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Sleep for the configured delay when a Delay answer has been latched.
    /// Wakes early with a cancellation error if the token fires.
    pub async fn pause_if_delaying(&self, cancel: &CancellationToken) -> Result<()> {
        if self.state != GateState::Delaying {
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(MoverError::cancelled()),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        }
    }

    /// Decide on one message. The approver is never consulted again once
    /// ApproveAll has been given.
    pub async fn decide(
        &mut self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<ApprovalResponse> {
        if self.state == GateState::ApproveAll {
            return Ok(ApprovalResponse::ApproveAll);
        }

        let response = self.approver.approve(cancel, prompt).await?;
        match response {
            ApprovalResponse::ApproveAll => {
                info!("All remaining messages approved");
                self.state = GateState::ApproveAll;
            }
            ApprovalResponse::Delay if self.state != GateState::Delaying => {
                info!(delay = ?self.delay, "Delaying before each remaining message");
                self.state = GateState::Delaying;
            }
            _ => {}
        }

        Ok(response)
    }
}
