//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_mover::approval::{ApprovalResponse, Approver};
use gmail_mover::client::{InternalDateSource, LabelInfo, MailboxClient, MessagePage};
use gmail_mover::error::{MoverError, Result};
use gmail_mover::models::MessageHeaders;
use gmail_mover::move_log::{MemoryMoveLog, MoveLogSink};
use gmail_mover::request::{LabelName, TransferRequest};
use gmail_mover::transfer::{TransferEngine, TransferSettings};
use gmail_mover::ui::{MemoryOutput, OutputWriter};
use mockall::mock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// System labels whose id equals their name
const SYSTEM_LABELS: &[&str] = &["INBOX", "SENT", "TRASH", "SPAM", "UNREAD"];

// Mock implementation of MailboxClient for expectation-style tests
mock! {
    pub Mailbox {}

    #[async_trait]
    impl MailboxClient for Mailbox {
        async fn list_messages(
            &self,
            query: &str,
            page_token: Option<String>,
            page_size: u32,
        ) -> Result<MessagePage>;
        async fn get_message_metadata(&self, id: &str) -> Result<MessageHeaders>;
        async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>>;
        async fn insert_message(&self, raw: &[u8], date_source: InternalDateSource) -> Result<String>;
        async fn modify_labels(
            &self,
            id: &str,
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
        async fn delete_message(&self, id: &str) -> Result<()>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
    }
}

/// Every call the fake mailbox received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { query: String, page_token: Option<String> },
    GetMetadata(String),
    GetRaw(String),
    Insert { date_source: InternalDateSource },
    Modify { id: String, add: Vec<String>, remove: Vec<String> },
    Delete(String),
    ListLabels,
    CreateLabel(String),
}

impl Call {
    /// Whether the call changes the mailbox
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::Insert { .. } | Call::Modify { .. } | Call::Delete(_) | Call::CreateLabel(_)
        )
    }
}

/// Operations failures can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    GetMetadata,
    GetRaw,
    Insert,
    Modify,
    Delete,
    CreateLabel,
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub headers: MessageHeaders,
    pub raw: Vec<u8>,
    pub label_ids: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    messages: Vec<FakeMessage>,
    labels: Vec<LabelInfo>,
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<MoverError>>,
    next_id: usize,
}

/// In-memory mailbox that understands `label:` search terms and pages its
/// results
pub struct FakeMailbox {
    state: Mutex<FakeState>,
    page_size: Option<u32>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        let labels = SYSTEM_LABELS
            .iter()
            .map(|name| LabelInfo {
                id: name.to_string(),
                name: name.to_string(),
            })
            .collect();

        Self {
            state: Mutex::new(FakeState {
                labels,
                ..FakeState::default()
            }),
            page_size: None,
        }
    }

    /// Serve at most `size` ids per page regardless of the requested size
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn add_label(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("Label_{}", state.next_id);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    /// Add a message carrying the named labels (created if missing)
    pub fn add_message(&self, id: &str, subject: &str, labels: &[&str]) {
        let label_ids: Vec<String> = labels
            .iter()
            .map(|name| self.label_id(name).unwrap_or_else(|| self.add_label(name)))
            .collect();

        let headers = MessageHeaders {
            subject: Some(subject.to_string()),
            from: Some("sender@example.com".to_string()),
            to: Some("me@example.com".to_string()),
            date: Some("Mon, 1 Jan 2024 10:00:00 -0800".to_string()),
        };

        self.state.lock().unwrap().messages.push(FakeMessage {
            id: id.to_string(),
            raw: raw_message(subject),
            headers,
            label_ids,
        });
    }

    /// Queue an error for the next call of `op`
    pub fn fail_next(&self, op: Op, error: MoverError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
    }

    pub fn message(&self, id: &str) -> Option<FakeMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn messages(&self) -> Vec<FakeMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Names of the labels on a message
    pub fn label_names_of(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(message) = state.messages.iter().find(|m| m.id == id) else {
            return Vec::new();
        };
        message
            .label_ids
            .iter()
            .filter_map(|label_id| state.labels.iter().find(|l| &l.id == label_id))
            .map(|l| l.name.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    fn record(&self, call: Call, op: Option<Op>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(op) = op {
            if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
                return Err(error);
            }
        }
        Ok(())
    }

    /// Ids matching the `label:` term of a query, or every id when there is none
    fn matching_ids(&self, query: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let wanted = query
            .split_whitespace()
            .find_map(|term| term.strip_prefix("label:"));

        let Some(wanted) = wanted else {
            return state.messages.iter().map(|m| m.id.clone()).collect();
        };

        let Some(label) = state
            .labels
            .iter()
            .find(|l| l.name.replace(' ', "-") == wanted)
        else {
            return Vec::new();
        };

        state
            .messages
            .iter()
            .filter(|m| m.label_ids.contains(&label.id))
            .map(|m| m.id.clone())
            .collect()
    }
}

impl Default for FakeMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<MessagePage> {
        self.record(
            Call::List {
                query: query.to_string(),
                page_token: page_token.clone(),
            },
            Some(Op::List),
        )?;

        let ids = self.matching_ids(query);
        let size = self.page_size.unwrap_or(page_size).max(1) as usize;
        let start: usize = page_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let end = (start + size).min(ids.len());

        Ok(MessagePage {
            ids: ids[start.min(end)..end].to_vec(),
            next_page_token: (end < ids.len()).then(|| end.to_string()),
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<MessageHeaders> {
        self.record(Call::GetMetadata(id.to_string()), Some(Op::GetMetadata))?;
        self.message(id)
            .map(|m| m.headers)
            .ok_or_else(|| MoverError::MessageNotFound(id.to_string()))
    }

    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>> {
        self.record(Call::GetRaw(id.to_string()), Some(Op::GetRaw))?;
        self.message(id)
            .map(|m| m.raw)
            .ok_or_else(|| MoverError::MessageNotFound(id.to_string()))
    }

    async fn insert_message(&self, raw: &[u8], date_source: InternalDateSource) -> Result<String> {
        self.record(Call::Insert { date_source }, Some(Op::Insert))?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("inserted-{}", state.next_id);
        state.messages.push(FakeMessage {
            id: id.clone(),
            headers: MessageHeaders::default(),
            raw: raw.to_vec(),
            label_ids: Vec::new(),
        });
        Ok(id)
    }

    async fn modify_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.record(
            Call::Modify {
                id: id.to_string(),
                add: add_label_ids.to_vec(),
                remove: remove_label_ids.to_vec(),
            },
            Some(Op::Modify),
        )?;

        let mut state = self.state.lock().unwrap();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MoverError::MessageNotFound(id.to_string()))?;
        message.label_ids.retain(|l| !remove_label_ids.contains(l));
        for label in add_label_ids {
            if !message.label_ids.contains(label) {
                message.label_ids.push(label.clone());
            }
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.record(Call::Delete(id.to_string()), Some(Op::Delete))?;
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        if state.messages.len() == before {
            return Err(MoverError::MessageNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.record(Call::ListLabels, None)?;
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.record(Call::CreateLabel(name.to_string()), Some(Op::CreateLabel))?;
        if self.label_id(name).is_some() {
            return Err(MoverError::LabelError(format!("label '{}' already exists", name)));
        }
        Ok(self.add_label(name))
    }
}

/// Replays a fixed list of answers, then declines everything
pub struct ScriptedApprover {
    answers: Mutex<VecDeque<std::result::Result<ApprovalResponse, fn() -> MoverError>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedApprover {
    pub fn new(answers: &[ApprovalResponse]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().map(Ok).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then(self, answer: ApprovalResponse) -> Self {
        self.answers.lock().unwrap().push_back(Ok(answer));
        self
    }

    /// Answer with an error produced by `make` on the next prompt
    pub fn then_error(self, make: fn() -> MoverError) -> Self {
        self.answers.lock().unwrap().push_back(Err(make));
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn approve(&self, cancel: &CancellationToken, _prompt: &str) -> Result<ApprovalResponse> {
        if cancel.is_cancelled() {
            return Err(MoverError::cancelled());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(make)) => Err(make()),
            None => Ok(ApprovalResponse::No),
        }
    }
}

/// Minimal RFC 822 message
pub fn raw_message(subject: &str) -> Vec<u8> {
    format!(
        "From: sender@example.com\r\nTo: me@example.com\r\nSubject: {}\r\nDate: Mon, 1 Jan 2024 10:00:00 -0800\r\n\r\nBody of {}\r\n",
        subject, subject
    )
    .into_bytes()
}

pub fn labels(names: &[&str]) -> Vec<LabelName> {
    names.iter().map(|n| n.parse().unwrap()).collect()
}

/// Cross- or same-account request with the given labels
pub fn request(src: &str, dst: &str, src_labels: &[&str], dst_labels: &[&str]) -> TransferRequest {
    let mut request = TransferRequest::new(src.parse().unwrap(), dst.parse().unwrap());
    request.src_labels = labels(src_labels);
    request.dst_labels = labels(dst_labels);
    request
}

/// Settings with every pause removed
pub fn fast_settings() -> TransferSettings {
    TransferSettings {
        page_size: 500,
        move_delay: Duration::ZERO,
        approval_delay: Duration::ZERO,
    }
}

/// Mailbox seeded with `count` INBOX messages named m1..mN
pub fn inbox_with(count: usize) -> Arc<FakeMailbox> {
    let mailbox = FakeMailbox::new();
    for i in 1..=count {
        mailbox.add_message(&format!("m{}", i), &format!("Subject {}", i), &["INBOX"]);
    }
    Arc::new(mailbox)
}

/// Collaborators of one engine run that tests inspect afterwards
pub struct Harness {
    pub engine: TransferEngine,
    pub log: Arc<MemoryMoveLog>,
    pub output: Arc<MemoryOutput>,
}

pub fn harness(
    src: &Arc<FakeMailbox>,
    dst: &Arc<FakeMailbox>,
    approver: impl Approver + 'static,
) -> Harness {
    let log = Arc::new(MemoryMoveLog::new());
    let output = Arc::new(MemoryOutput::new());
    let src: Arc<dyn MailboxClient> = src.clone();
    let dst: Arc<dyn MailboxClient> = dst.clone();
    let sink: Arc<dyn MoveLogSink> = log.clone();
    let writer: Arc<dyn OutputWriter> = output.clone();
    let engine = TransferEngine::new(src, dst, Box::new(approver), sink, writer, fast_settings());
    Harness {
        engine,
        log,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_mailbox_filters_by_label() {
        let mailbox = FakeMailbox::new();
        mailbox.add_message("m1", "one", &["INBOX"]);
        mailbox.add_message("m2", "two", &["Old Mail"]);

        let page = mailbox.list_messages("label:Old-Mail", None, 10).await.unwrap();
        assert_eq!(page.ids, vec!["m2"]);

        let page = mailbox.list_messages("", None, 10).await.unwrap();
        assert_eq!(page.ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_fake_mailbox_pages() {
        let mailbox = inbox_with(5);
        let first = mailbox.list_messages("label:INBOX", None, 2).await.unwrap();
        assert_eq!(first.ids, vec!["m1", "m2"]);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = mailbox
            .list_messages("label:INBOX", Some("4".to_string()), 2)
            .await
            .unwrap();
        assert_eq!(last.ids, vec!["m5"]);
        assert_eq!(last.next_page_token, None);
    }

    #[tokio::test]
    async fn test_fake_mailbox_injected_failure_is_used_once() {
        let mailbox = inbox_with(1);
        mailbox.fail_next(Op::Delete, MoverError::NetworkError("reset".to_string()));

        assert!(mailbox.delete_message("m1").await.is_err());
        assert!(mailbox.delete_message("m1").await.is_ok());
    }
}
