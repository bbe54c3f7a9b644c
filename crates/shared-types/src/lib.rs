//! Domain types shared by the review engine, the API client and the CLI

pub mod clause;
pub mod document;
pub mod risk;

pub use clause::{merge_comments, Clause, ClauseKey, ClauseStatus, Comment, CommentOrigin};
pub use document::{
    AiSuggestion, Document, DocumentKind, DocumentSummary, FinancialTerms, LoiForm, Party,
    PropertyDetails, SubmissionStatus, SubmitReceipt, TemplateData,
};
pub use risk::{RiskAssessment, RiskLevel};

/// Rejected domain values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Comment text must not be empty")]
    EmptyComment,

    #[error("Clause text must not be empty")]
    EmptyClauseText,
}
