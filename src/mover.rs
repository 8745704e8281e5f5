//! Executes one approved message transfer

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{InternalDateSource, MailboxClient};
use crate::error::{MoverError, Result};
use crate::labels::LabelResolver;
use crate::models::MessageInfo;
use crate::request::{LabelName, TransferRequest};

/// Sub-step of a move, reported alongside failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStage {
    FetchRaw,
    Insert,
    ResolveLabels,
    ApplyLabels,
    DeleteSource,
    ModifyLabels,
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MoveStage::FetchRaw => "fetch_raw",
            MoveStage::Insert => "insert",
            MoveStage::ResolveLabels => "resolve_labels",
            MoveStage::ApplyLabels => "apply_labels",
            MoveStage::DeleteSource => "delete_source",
            MoveStage::ModifyLabels => "modify_labels",
        };
        f.write_str(name)
    }
}

type StepResult = std::result::Result<(), (MoveStage, MoverError)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveMode {
    /// Copy to another mailbox, optionally deleting the original
    CrossAccount { delete_after_move: bool },
    /// Relabel in place
    SameAccount,
}

/// Moves messages from one mailbox to another (or relabels within one)
pub struct MessageMover<'a> {
    src: &'a dyn MailboxClient,
    dst: &'a dyn MailboxClient,
    mode: MoveMode,
    labels_to_apply: Vec<LabelName>,
    labels_to_remove: Vec<LabelName>,
    resolver: LabelResolver,
    move_delay: Duration,
}

impl<'a> MessageMover<'a> {
    pub fn new(
        src: &'a dyn MailboxClient,
        dst: &'a dyn MailboxClient,
        request: &TransferRequest,
        move_delay: Duration,
    ) -> Self {
        let mode = if request.is_same_account() {
            MoveMode::SameAccount
        } else {
            MoveMode::CrossAccount {
                delete_after_move: request.delete_after_move,
            }
        };

        Self {
            src,
            dst,
            mode,
            labels_to_apply: request.dst_labels.clone(),
            labels_to_remove: request.labels_to_remove(),
            resolver: LabelResolver::new(),
            move_delay,
        }
    }

    /// Move one message, updating the outcome flags on `info` as each step
    /// succeeds. Always waits the configured delay afterwards.
    pub async fn move_message(&mut self, info: &mut MessageInfo) -> Result<()> {
        let result = match self.mode {
            MoveMode::CrossAccount { delete_after_move } => {
                self.move_across_accounts(info, delete_after_move).await
            }
            MoveMode::SameAccount => self.relabel_in_place(info).await,
        };

        if let Err((stage, e)) = &result {
            warn!(message_id = %info.id, stage = %stage, error = %e, "Move step failed");
        }

        if !self.move_delay.is_zero() {
            tokio::time::sleep(self.move_delay).await;
        }

        result.map_err(|(_, e)| e)
    }

    async fn move_across_accounts(
        &mut self,
        info: &mut MessageInfo,
        delete_after_move: bool,
    ) -> StepResult {
        let raw = self
            .src
            .get_raw_message(&info.id)
            .await
            .map_err(|e| (MoveStage::FetchRaw, e))?;
        debug!(message_id = %info.id, bytes = raw.len(), "Fetched raw message");

        let new_id = self
            .dst
            .insert_message(&raw, InternalDateSource::DateHeader)
            .await
            .map_err(|e| (MoveStage::Insert, e))?;
        info.moved = true;

        if !self.labels_to_apply.is_empty() {
            let label_ids = self
                .resolver
                .resolve_or_create(self.dst, &self.labels_to_apply)
                .await
                .map_err(|e| (MoveStage::ResolveLabels, e))?;
            self.dst
                .modify_labels(&new_id, &label_ids, &[])
                .await
                .map_err(|e| (MoveStage::ApplyLabels, e))?;
            info.labeled = true;
        }

        if delete_after_move {
            self.src
                .delete_message(&info.id)
                .await
                .map_err(|e| (MoveStage::DeleteSource, e))?;
            info.deleted = true;
        }

        info!(src_id = %info.id, dst_id = %new_id, "Moved message");
        Ok(())
    }

    async fn relabel_in_place(
        &mut self,
        info: &mut MessageInfo,
    ) -> StepResult {
        let add_ids = self
            .resolver
            .resolve_or_create(self.dst, &self.labels_to_apply)
            .await
            .map_err(|e| (MoveStage::ResolveLabels, e))?;
        let remove_ids = self
            .resolver
            .resolve_existing(self.dst, &self.labels_to_remove)
            .await
            .map_err(|e| (MoveStage::ResolveLabels, e))?;

        self.dst
            .modify_labels(&info.id, &add_ids, &remove_ids)
            .await
            .map_err(|e| (MoveStage::ModifyLabels, e))?;
        info.moved = true;
        info.labeled = true;

        info!(
            message_id = %info.id,
            added = add_ids.len(),
            removed = remove_ids.len(),
            "Relabeled message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(MoveStage::DeleteSource.to_string(), "delete_source");
        assert_eq!(MoveStage::Insert.to_string(), "insert");
    }
}
