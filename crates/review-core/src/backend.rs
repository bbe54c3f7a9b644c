//! Seams between the review engine and the outside world

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{
    AiSuggestion, ClauseKey, Document, DocumentSummary, LoiForm, SubmitReceipt, TemplateData,
};
use std::fmt;
use std::str::FromStr;

/// Which side of the negotiation is reviewing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    #[default]
    Tenant,
    Landlord,
}

impl FromStr for Panel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tenant" => Ok(Panel::Tenant),
            "landlord" => Ok(Panel::Landlord),
            other => Err(format!("unknown panel '{}', expected tenant or landlord", other)),
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Panel::Tenant => "tenant",
            Panel::Landlord => "landlord",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseAction {
    ManualEdit,
    AcceptAiSuggestion,
    Rejected,
}

impl ClauseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseAction::ManualEdit => "manual_edit",
            ClauseAction::AcceptAiSuggestion => "accept_ai_suggestion",
            ClauseAction::Rejected => "rejected",
        }
    }
}

/// One clause mutation sent to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseUpdate {
    pub document_id: String,
    /// Id used in the request path (record id, else the clause key)
    pub clause_id: String,
    pub clause_key: ClauseKey,
    pub details: Option<String>,
    pub action: ClauseAction,
    pub panel: Panel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClauseComment {
    pub document_id: String,
    pub clause_key: ClauseKey,
    pub comment: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiRequest {
    pub document_id: String,
    pub clause_key: ClauseKey,
    pub prompt: String,
    pub current_text: String,
}

/// Clause-level review calls
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    async fn fetch_document(&self, id: &str) -> Result<Document, ApiError>;

    async fn update_clause(&self, update: &ClauseUpdate) -> Result<(), ApiError>;

    async fn approve_all(&self, document_id: &str) -> Result<(), ApiError>;

    async fn add_comment(&self, comment: &ClauseComment) -> Result<(), ApiError>;

    async fn ai_assist(&self, request: &AiRequest) -> Result<AiSuggestion, ApiError>;
}

/// Whole-document calls
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn list_drafts(&self) -> Result<Vec<DocumentSummary>, ApiError>;

    async fn delete_document(&self, id: &str) -> Result<(), ApiError>;

    async fn submit_loi(&self, form: &LoiForm) -> Result<SubmitReceipt, ApiError>;

    async fn download_template(&self, id: &str) -> Result<TemplateData, ApiError>;
}

// ============================================================
// Notifications
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// User-facing message produced by an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Sink for action feedback (toasts in a UI, stderr in a terminal)
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "action failed"),
            _ => tracing::info!(message = %notice.message, "action completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_parse() {
        assert_eq!("Landlord".parse::<Panel>(), Ok(Panel::Landlord));
        assert_eq!(" tenant ".parse::<Panel>(), Ok(Panel::Tenant));
        assert!("broker".parse::<Panel>().is_err());
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_value(ClauseAction::AcceptAiSuggestion).unwrap(),
            serde_json::json!("accept_ai_suggestion")
        );
        assert_eq!(ClauseAction::ManualEdit.as_str(), "manual_edit");
    }
}
