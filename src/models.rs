use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request::TransferRequest;

/// Header values pulled from a metadata-format message fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
}

/// Details about a candidate message, used for approval prompts and the move log.
///
/// The outcome flags start out false and are flipped by the mover as each
/// sub-step completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: DateTime<Utc>,
    /// False when the Date header was missing or unparseable and `date` is
    /// the time the message was inspected instead
    pub date_parsed: bool,
    pub moved: bool,
    pub deleted: bool,
    pub labeled: bool,
}

impl MessageInfo {
    pub fn from_headers(id: &str, headers: &MessageHeaders) -> Self {
        let (date, date_parsed) = match headers.date.as_deref() {
            Some(raw) => parse_email_date(raw),
            None => (Utc::now(), false),
        };

        Self {
            id: id.to_string(),
            subject: non_empty_or(headers.subject.as_deref(), "(no subject)"),
            from: non_empty_or(headers.from.as_deref(), "(unknown sender)"),
            to: non_empty_or(headers.to.as_deref(), "(unknown recipient)"),
            date,
            date_parsed,
            moved: false,
            deleted: false,
            labeled: false,
        }
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Id: {}, From: {}, To: {}, Date: {}, Subject: {}",
            self.id,
            self.from,
            self.to,
            self.date.format("%Y-%m-%d"),
            self.subject
        )
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Parse an RFC 2822 style Date header.
///
/// Returns the parsed date and whether parsing succeeded. On failure the
/// current time is substituted so the message can still be moved and logged.
pub fn parse_email_date(raw: &str) -> (DateTime<Utc>, bool) {
    let trimmed = strip_trailing_comment(raw.trim());

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return (dt.with_timezone(&Utc), true);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return (dt.with_timezone(&Utc), true);
    }

    // Variants seen in the wild that the strict RFC 2822 parser rejects
    const FALLBACK_FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%a %b %e %H:%M:%S %Y %z",
    ];
    for format in FALLBACK_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return (dt.with_timezone(&Utc), true);
        }
    }

    tracing::warn!(date_header = raw, "Failed to parse email date header");
    (Utc::now(), false)
}

/// Drop a trailing "(UTC)" style zone comment
fn strip_trailing_comment(value: &str) -> &str {
    if value.ends_with(')') {
        if let Some(start) = value.rfind('(') {
            return value[..start].trim_end();
        }
    }
    value
}

/// One durable record per attempted move, written as a JSON line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLogEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub message_id: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub to: String,
    pub from: String,
    pub src_account: String,
    pub dst_account: String,
    pub src_labels: Vec<String>,
    pub dst_labels: Vec<String>,
    pub moved: bool,
    pub deleted: bool,
    pub labeled: bool,
    pub date_parsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MoveLogEntry {
    pub fn new(
        run_id: &str,
        request: &TransferRequest,
        info: &MessageInfo,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            message_id: info.id.clone(),
            subject: info.subject.clone(),
            date: info.date,
            to: info.to.clone(),
            from: info.from.clone(),
            src_account: request.src_account.to_string(),
            dst_account: request.dst_account.to_string(),
            src_labels: request.src_label_names(),
            dst_labels: request.dst_label_names(),
            moved: info.moved,
            deleted: info.deleted,
            labeled: info.labeled,
            date_parsed: info.date_parsed,
            error,
        }
    }
}
