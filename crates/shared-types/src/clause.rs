//! Clauses and their comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::risk::RiskAssessment;
use crate::ValidationError;

/// Separator used by derived clause keys (`"<category>::<index>"`)
pub const DERIVED_KEY_SEPARATOR: &str = "::";

/// Identifier of a clause within one document.
///
/// Either assigned by the server or derived from the category/index pair of a
/// generated clause map. Derived keys are built only through
/// [`ClauseKey::derived`] so generation and persistence agree on one format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClauseKey(String);

impl ClauseKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Canonical key for a clause generated under `category` at `index`
    pub fn derived(category: &str, index: &str) -> Self {
        Self(format!("{}{}{}", category, DERIVED_KEY_SEPARATOR, index))
    }

    /// Display name used for generated clauses (`"Rent #0"`)
    pub fn derived_name(category: &str, index: &str) -> String {
        format!("{} #{}", category, index)
    }

    /// Keys under which a persisted record for a generated clause may be stored.
    ///
    /// The canonical derived key comes first. The display name and the bare
    /// index are legacy conventions still found in older documents.
    pub fn lookup_aliases(category: &str, index: &str) -> [String; 3] {
        [
            Self::derived(category, index).0,
            Self::derived_name(category, index),
            index.to_string(),
        ]
    }

    /// Split a derived key back into `(category, index)`
    pub fn split_derived(&self) -> Option<(&str, &str)> {
        self.0.split_once(DERIVED_KEY_SEPARATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClauseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClauseKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClauseKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Review status of a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClauseStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    NeedReview,
}

impl ClauseStatus {
    pub const ALL: [ClauseStatus; 4] = [
        ClauseStatus::Pending,
        ClauseStatus::Approved,
        ClauseStatus::Rejected,
        ClauseStatus::NeedReview,
    ];

    /// Parse a status string, falling back to `Pending` for anything unknown
    pub fn parse_lenient(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    /// Strict parse; accepts the spellings the backend has been seen to use
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pending" => Some(ClauseStatus::Pending),
            "approved" | "accepted" => Some(ClauseStatus::Approved),
            "rejected" => Some(ClauseStatus::Rejected),
            "need-review" | "needs-review" => Some(ClauseStatus::NeedReview),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseStatus::Pending => "pending",
            ClauseStatus::Approved => "approved",
            ClauseStatus::Rejected => "rejected",
            ClauseStatus::NeedReview => "need-review",
        }
    }

    /// Approved and rejected clauses count as reviewed
    pub fn is_decided(&self) -> bool {
        matches!(self, ClauseStatus::Approved | ClauseStatus::Rejected)
    }
}

impl fmt::Display for ClauseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ClauseStatus {
    fn from(raw: String) -> Self {
        Self::parse_lenient(&raw)
    }
}

impl From<ClauseStatus> for String {
    fn from(status: ClauseStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Where a comment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentOrigin {
    /// Persisted on the server
    Server,
    /// Added in this client and not yet part of a server payload
    Local,
}

/// Free-text annotation attached to one clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub origin: CommentOrigin,
}

impl Comment {
    /// Comment typed by the local user, stamped with the client clock
    pub fn local(text: &str, author: Option<&str>) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment);
        }
        Ok(Self {
            text: text.to_string(),
            author: author
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            created_at: Some(Utc::now()),
            origin: CommentOrigin::Local,
        })
    }

    /// Comment read from a server payload
    pub fn server(text: String, author: Option<String>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            text,
            author: author.filter(|a| !a.trim().is_empty()),
            created_at,
            origin: CommentOrigin::Server,
        }
    }
}

/// Merge server and locally added comments into display order.
///
/// Ordering is chronological. Comments without a timestamp sort before any
/// timestamped one and keep their server order; on equal timestamps server
/// comments stay ahead of local ones.
pub fn merge_comments(server: &[Comment], local: &[Comment]) -> Vec<Comment> {
    let mut merged: Vec<Comment> = server.iter().chain(local.iter()).cloned().collect();
    // Stable sort: equal keys keep the server-then-local concatenation order.
    merged.sort_by_key(|c| c.created_at);
    merged
}

/// One negotiable provision of a lease or LOI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub key: ClauseKey,
    /// Server record id, used in request paths when present
    pub record_id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub text: String,
    pub suggestion: Option<String>,
    pub risk: Option<RiskAssessment>,
    pub status: ClauseStatus,
    pub comments: Vec<Comment>,
    pub confidence: Option<f64>,
}

impl Clause {
    pub fn new(key: ClauseKey, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key,
            record_id: None,
            name: name.into(),
            category: None,
            text: text.into(),
            suggestion: None,
            risk: None,
            status: ClauseStatus::Pending,
            comments: Vec::new(),
            confidence: None,
        }
    }

    /// Identifier to put in request paths: server id if known, else the key
    pub fn path_id(&self) -> &str {
        self.record_id.as_deref().unwrap_or(self.key.as_str())
    }

    /// Text an "accept" action commits: the AI suggestion, else the current text
    pub fn accepted_text(&self) -> &str {
        self.suggestion
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.text)
    }
}
