//! Search query construction and paginated message id retrieval

use chrono::NaiveDate;
use tracing::debug;

use crate::client::{MailboxClient, MAX_PAGE_SIZE};
use crate::error::Result;
use crate::request::{LabelName, TransferRequest};

/// Label value that matches every message instead of filtering by label
pub const ALL_MESSAGES_LABEL: &str = "*";

/// Search expression for one source label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub label: Option<LabelName>,
    pub before: Option<NaiveDate>,
    pub after: Option<NaiveDate>,
    pub text: Option<String>,
}

impl SearchQuery {
    pub fn for_label(request: &TransferRequest, label: &LabelName) -> Self {
        Self {
            label: Some(label.clone()),
            before: request.before,
            after: request.after,
            text: request.search_query.clone(),
        }
    }

    /// Render as a Gmail search string, e.g. `label:INBOX before:2024/01/31 from:boss`
    pub fn build(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);

        if let Some(label) = &self.label {
            if label.as_str() != ALL_MESSAGES_LABEL {
                // Gmail search uses dashes where label names have spaces
                parts.push(format!("label:{}", label.as_str().replace(' ', "-")));
            }
        }
        if let Some(before) = self.before {
            parts.push(format!("before:{}", before.format("%Y/%m/%d")));
        }
        if let Some(after) = self.after {
            parts.push(format!("after:{}", after.format("%Y/%m/%d")));
        }
        if let Some(text) = self.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }

        parts.join(" ")
    }
}

/// Page through `query` until `max` ids are collected or the listing ends.
///
/// Every page requests `page_size` ids regardless of how many are still
/// wanted; the result is truncated to `max`. Any page failure discards what
/// was already fetched.
pub async fn collect_message_ids(
    client: &dyn MailboxClient,
    query: &str,
    max: usize,
    page_size: u32,
) -> Result<Vec<String>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;

    if max == 0 {
        return Ok(ids);
    }

    loop {
        let page = client.list_messages(query, page_token, page_size).await?;
        debug!(query, fetched = page.ids.len(), "Fetched message page");
        ids.extend(page.ids);

        page_token = page.next_page_token;
        if ids.len() >= max || page_token.is_none() {
            break;
        }
    }

    ids.truncate(max);
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> Option<LabelName> {
        Some(name.parse().unwrap())
    }

    #[test]
    fn test_build_label_only() {
        let query = SearchQuery {
            label: label("INBOX"),
            before: None,
            after: None,
            text: None,
        };
        assert_eq!(query.build(), "label:INBOX");
    }

    #[test]
    fn test_build_all_parts() {
        let query = SearchQuery {
            label: label("Old Mail"),
            before: NaiveDate::from_ymd_opt(2024, 1, 31),
            after: NaiveDate::from_ymd_opt(2023, 2, 1),
            text: Some("from:boss@example.com".to_string()),
        };
        assert_eq!(
            query.build(),
            "label:Old-Mail before:2024/01/31 after:2023/02/01 from:boss@example.com"
        );
    }

    #[test]
    fn test_build_omits_empty_parts() {
        let query = SearchQuery {
            label: label(ALL_MESSAGES_LABEL),
            before: None,
            after: None,
            text: Some("   ".to_string()),
        };
        assert_eq!(query.build(), "");
    }

    #[test]
    fn test_for_label_copies_request_filters() {
        let mut request = TransferRequest::new(
            "a@example.com".parse().unwrap(),
            "b@example.com".parse().unwrap(),
        );
        request.after = NaiveDate::from_ymd_opt(2020, 5, 4);
        request.search_query = Some("has:attachment".to_string());

        let query = SearchQuery::for_label(&request, &"Receipts".parse().unwrap());
        assert_eq!(query.build(), "label:Receipts after:2020/05/04 has:attachment");
    }
}
