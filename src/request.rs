//! Transfer request and the validated values it is built from

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{MoverError, Result};

/// Default ceiling applied when a request does not name one
pub const DEFAULT_MAX_MESSAGES: usize = 10_000;

/// Prompt shown to the operator for each candidate message
pub const DEFAULT_APPROVAL_PROMPT: &str = "Move Email?";

/// Label applied to every moved message so moves can be found later
pub const MOVED_MARKER_LABEL: &str = "[Gmoved]";

/// A syntactically plausible email address identifying a mailbox
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EmailAddress {
    type Err = MoverError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoverError::ValidationError(
                "email address cannot be empty".to_string(),
            ));
        }

        let valid = match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !trimmed.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(MoverError::ValidationError(format!(
                "invalid email address '{}'",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = MoverError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Gmail label name. Forward slashes nest labels; backslashes are not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LabelName(String);

impl LabelName {
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LabelName {
    type Err = MoverError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoverError::ValidationError(
                "label name cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('\\') {
            return Err(MoverError::ValidationError(format!(
                "label name '{}' contains invalid characters (\\)",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for LabelName {
    type Error = MoverError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LabelName> for String {
    fn from(value: LabelName) -> Self {
        value.0
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything one transfer run needs to know. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub src_account: EmailAddress,
    pub src_labels: Vec<LabelName>,
    pub dst_account: EmailAddress,
    pub dst_labels: Vec<LabelName>,
    pub search_query: Option<String>,
    pub before: Option<NaiveDate>,
    pub after: Option<NaiveDate>,
    pub max_messages: usize,
    pub delete_after_move: bool,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub approval_prompt: String,
    /// Requests loaded from a job file skip the live label checks
    pub from_job_file: bool,
}

impl TransferRequest {
    pub fn new(src_account: EmailAddress, dst_account: EmailAddress) -> Self {
        Self {
            src_account,
            src_labels: Vec::new(),
            dst_account,
            dst_labels: Vec::new(),
            search_query: None,
            before: None,
            after: None,
            max_messages: DEFAULT_MAX_MESSAGES,
            delete_after_move: true,
            dry_run: false,
            fail_fast: false,
            approval_prompt: DEFAULT_APPROVAL_PROMPT.to_string(),
            from_job_file: false,
        }
    }

    pub fn is_same_account(&self) -> bool {
        self.src_account.as_str().eq_ignore_ascii_case(self.dst_account.as_str())
    }

    /// Check the request before any remote call is made
    pub fn validate(&self) -> Result<()> {
        if !self.from_job_file {
            if self.src_labels.is_empty() {
                return Err(MoverError::ValidationError(
                    "source label is required to prevent accidental mass operations (use --src-label, or '*' for all messages)"
                        .to_string(),
                ));
            }
            if self.dst_labels.is_empty() {
                return Err(MoverError::ValidationError(
                    "destination label is required for organizing moved messages (use --dst-label)"
                        .to_string(),
                ));
            }
        }

        if self.max_messages == 0 {
            return Err(MoverError::ValidationError(
                "max messages must be greater than zero".to_string(),
            ));
        }

        if let (Some(before), Some(after)) = (self.before, self.after) {
            if before <= after {
                return Err(MoverError::ValidationError(format!(
                    "before date {} must be later than after date {}",
                    before, after
                )));
            }
        }

        if self.is_same_account() {
            let src: HashSet<&LabelName> = self.src_labels.iter().collect();
            let dst: HashSet<&LabelName> = self.dst_labels.iter().collect();
            if src == dst {
                return Err(MoverError::ValidationError(
                    "source and destination cannot be the same (same email and same labels)"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Source labels to strip during a same-account move: every source label
    /// that is not also a destination label. Empty for cross-account moves.
    pub fn labels_to_remove(&self) -> Vec<LabelName> {
        if !self.is_same_account() {
            return Vec::new();
        }
        labels_difference(&self.src_labels, &self.dst_labels)
    }

    /// Append the `[Gmoved]` and `Moved-<date>` tracking labels to the
    /// destination labels, skipping any already present
    pub fn with_tracking_labels(mut self, today: NaiveDate) -> Self {
        for name in tracking_label_names(today) {
            if let Ok(label) = name.parse::<LabelName>() {
                if !self.dst_labels.contains(&label) {
                    self.dst_labels.push(label);
                }
            }
        }
        self
    }

    pub fn src_label_names(&self) -> Vec<String> {
        self.src_labels.iter().map(|l| l.to_string()).collect()
    }

    pub fn dst_label_names(&self) -> Vec<String> {
        self.dst_labels.iter().map(|l| l.to_string()).collect()
    }
}

/// Ordered set difference `left - right`, keeping the order of `left`
pub fn labels_difference(left: &[LabelName], right: &[LabelName]) -> Vec<LabelName> {
    let exclude: HashSet<&LabelName> = right.iter().collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|label| !exclude.contains(label) && seen.insert(*label))
        .cloned()
        .collect()
}

pub fn tracking_label_names(today: NaiveDate) -> [String; 2] {
    [
        MOVED_MARKER_LABEL.to_string(),
        format!("Moved-{}", today.format("%Y-%m-%d")),
    ]
}
