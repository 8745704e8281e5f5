//! Gmail API client with retry logic

use async_trait::async_trait;
use google_gmail1::api::{Label, Message, ModifyMessageRequest};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, MAIL_SCOPE};
use crate::error::{MoverError, Result};
use crate::models::MessageHeaders;

/// Largest page the messages.list endpoint will return
pub const MAX_PAGE_SIZE: u32 = 500;

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of message ids from a list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Where the destination mailbox takes a message's internal date from on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalDateSource {
    /// Use the Date header of the inserted message
    DateHeader,
}

impl InternalDateSource {
    pub fn as_api_value(&self) -> &'static str {
        match self {
            InternalDateSource::DateHeader => "dateHeader",
        }
    }
}

/// Narrow view of one mailbox used by the transfer engine
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List one page of message ids matching a search query
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<MessagePage>;

    /// Fetch Subject/From/To/Date headers for a message
    async fn get_message_metadata(&self, id: &str) -> Result<MessageHeaders>;

    /// Fetch the full RFC 822 bytes of a message
    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>>;

    /// Insert a raw message, returning the new message id
    async fn insert_message(&self, raw: &[u8], date_source: InternalDateSource) -> Result<String>;

    /// Add and remove labels on a message in one call
    async fn modify_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;

    /// Permanently delete a message
    async fn delete_message(&self, id: &str) -> Result<()>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;
}

/// Production Gmail client
///
/// Every call is retried with exponential backoff on rate limits, server
/// errors and network failures.
pub struct ProductionGmailClient {
    hub: GmailHub,
    max_retries: u32,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            max_retries: 3,
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    let wait = retry_wait(&e, delay);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// How long to wait before the next attempt: the backoff delay, stretched to
/// the server's Retry-After on rate limits
fn retry_wait(error: &MoverError, backoff: Duration) -> Duration {
    match error {
        MoverError::RateLimitExceeded { retry_after } => {
            backoff.max(Duration::from_secs(*retry_after))
        }
        _ => backoff,
    }
}

/// Pull the headers the engine cares about out of a metadata-format message
fn extract_headers(msg: &Message) -> MessageHeaders {
    let mut headers = MessageHeaders::default();

    let Some(list) = msg.payload.as_ref().and_then(|p| p.headers.as_ref()) else {
        return headers;
    };

    for header in list {
        let (Some(name), Some(value)) = (header.name.as_deref(), header.value.as_ref()) else {
            continue;
        };
        let slot = match name.to_ascii_lowercase().as_str() {
            "subject" => &mut headers.subject,
            "from" => &mut headers.from,
            "to" => &mut headers.to,
            "date" => &mut headers.date,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.clone());
        }
    }

    headers
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<MessagePage> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        Self::with_retry("list_messages", self.max_retries, || async {
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(page_size);

            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scope(MAIL_SCOPE).doit().await?;

            let ids = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|msg_ref| msg_ref.id)
                .collect();

            Ok(MessagePage {
                ids,
                next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
            })
        })
        .await
    }

    async fn get_message_metadata(&self, id: &str) -> Result<MessageHeaders> {
        Self::with_retry("get_message_metadata", self.max_retries, || async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get("me", id)
                .format("metadata")
                .add_metadata_headers("Subject")
                .add_metadata_headers("From")
                .add_metadata_headers("To")
                .add_metadata_headers("Date")
                .add_scope(MAIL_SCOPE)
                .doit()
                .await?;

            Ok(extract_headers(&msg))
        })
        .await
    }

    async fn get_raw_message(&self, id: &str) -> Result<Vec<u8>> {
        Self::with_retry("get_raw_message", self.max_retries, || async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get("me", id)
                .format("raw")
                .add_scope(MAIL_SCOPE)
                .doit()
                .await?;

            match msg.raw {
                Some(raw) if !raw.is_empty() => Ok(raw),
                _ => Err(MoverError::InvalidMessageFormat(format!(
                    "Message {} has no raw content",
                    id
                ))),
            }
        })
        .await
    }

    async fn insert_message(&self, raw: &[u8], date_source: InternalDateSource) -> Result<String> {
        Self::with_retry("insert_message", self.max_retries, || async {
            let (_, inserted) = self
                .hub
                .users()
                .messages_insert(Message::default(), "me")
                .internal_date_source(date_source.as_api_value())
                .add_scope(MAIL_SCOPE)
                .upload(
                    Cursor::new(raw.to_vec()),
                    "message/rfc822".parse().map_err(|e| {
                        MoverError::InvalidMessageFormat(format!("Invalid upload type: {}", e))
                    })?,
                )
                .await?;

            inserted.id.ok_or_else(|| {
                MoverError::InvalidMessageFormat("Inserted message has no ID".to_string())
            })
        })
        .await
    }

    async fn modify_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        Self::with_retry("modify_labels", self.max_retries, || async {
            let modify_request = ModifyMessageRequest {
                add_label_ids: (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec()),
                remove_label_ids: (!remove_label_ids.is_empty())
                    .then(|| remove_label_ids.to_vec()),
            };

            self.hub
                .users()
                .messages_modify(modify_request, "me", id)
                .add_scope(MAIL_SCOPE)
                .doit()
                .await?;

            Ok(())
        })
        .await
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        Self::with_retry("delete_message", self.max_retries, || async {
            self.hub
                .users()
                .messages_delete("me", id)
                .add_scope(MAIL_SCOPE)
                .doit()
                .await?;
            Ok(())
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.max_retries, || async {
            // Wrap API call in timeout to prevent indefinite hangs
            let timeout_duration = Duration::from_secs(30);
            let api_call = async {
                debug!("Calling Gmail API to list labels...");
                self.hub
                    .users()
                    .labels_list("me")
                    .add_scope(MAIL_SCOPE)
                    .doit()
                    .await
            };

            let (_, response) = match tokio::time::timeout(timeout_duration, api_call).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Gmail API list_labels call timed out after {:?}", timeout_duration);
                    return Err(MoverError::NetworkError(format!(
                        "API call timed out after {:?}",
                        timeout_duration
                    )));
                }
            };

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        Self::with_retry("create_label", self.max_retries, || async {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created_label) = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope(MAIL_SCOPE)
                .doit()
                .await?;

            created_label
                .id
                .ok_or_else(|| MoverError::LabelError("Created label has no ID".to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn message_with_headers(headers: Vec<MessagePartHeader>) -> Message {
        Message {
            payload: Some(MessagePart {
                headers: Some(headers),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_wait_honours_longer_retry_after() {
        let error = MoverError::RateLimitExceeded { retry_after: 10 };
        assert_eq!(retry_wait(&error, Duration::from_secs(1)), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_wait_keeps_longer_backoff() {
        let error = MoverError::RateLimitExceeded { retry_after: 2 };
        assert_eq!(retry_wait(&error, Duration::from_secs(8)), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_wait_ignores_other_errors() {
        let error = MoverError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert_eq!(retry_wait(&error, Duration::from_secs(4)), Duration::from_secs(4));
    }

    #[test]
    fn test_extract_headers() {
        let msg = message_with_headers(vec![
            header("Subject", "Hello"),
            header("FROM", "alice@example.com"),
            header("to", "bob@example.com"),
            header("Date", "Mon, 02 Jan 2006 15:04:05 +0000"),
            header("X-Mailer", "ignored"),
        ]);

        let headers = extract_headers(&msg);
        assert_eq!(headers.subject.as_deref(), Some("Hello"));
        assert_eq!(headers.from.as_deref(), Some("alice@example.com"));
        assert_eq!(headers.to.as_deref(), Some("bob@example.com"));
        assert_eq!(
            headers.date.as_deref(),
            Some("Mon, 02 Jan 2006 15:04:05 +0000")
        );
    }

    #[test]
    fn test_extract_headers_keeps_first_duplicate() {
        let msg = message_with_headers(vec![header("Subject", "first"), header("Subject", "second")]);
        assert_eq!(extract_headers(&msg).subject.as_deref(), Some("first"));
    }

    #[test]
    fn test_extract_headers_without_payload() {
        assert_eq!(extract_headers(&Message::default()), MessageHeaders::default());
    }

    #[test]
    fn test_internal_date_source_values() {
        assert_eq!(InternalDateSource::DateHeader.as_api_value(), "dateHeader");
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MoverError::NetworkError("Connection reset".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_permanent_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(MoverError::BadRequest("Invalid query".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(MoverError::BadRequest(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 1, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(MoverError::RateLimitExceeded { retry_after: 1 })
            }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus one retry
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }
}
