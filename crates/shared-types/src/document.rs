//! Lease and LOI documents

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of negotiated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Loi,
    Lease,
}

/// Overall submission status of a document.
///
/// Independent of the statuses of the individual clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    #[default]
    Draft,
    Submitted,
    InReview,
    Finalized,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "Draft",
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::InReview => "In Review",
            SubmissionStatus::Finalized => "Finalized",
            SubmissionStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SubmissionStatus {
    fn from(raw: String) -> Self {
        match raw
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .as_str()
        {
            "submitted" => SubmissionStatus::Submitted,
            "in review" | "inreview" => SubmissionStatus::InReview,
            "finalized" | "finalised" => SubmissionStatus::Finalized,
            "rejected" => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Draft,
        }
    }
}

impl From<SubmissionStatus> for String {
    fn from(status: SubmissionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Landlord or tenant contact block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl Party {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.address.is_none()
    }
}

/// Money terms of the deal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialTerms {
    #[serde(default, deserialize_with = "number_or_string")]
    pub monthly_rent: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub security_deposit: Option<f64>,
    /// Annual escalation in percent
    #[serde(default, deserialize_with = "number_or_string")]
    pub escalation_percent: Option<f64>,
}

/// Premises being leased
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub address: Option<String>,
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub square_feet: Option<f64>,
    pub intended_use: Option<String>,
    pub lease_term_months: Option<u32>,
    pub start_date: Option<NaiveDate>,
}

/// Aggregate root: one LOI or lease with its raw clause payloads.
///
/// Clause payloads are kept as received; the review layer normalizes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub kind: DocumentKind,
    pub title: String,
    pub landlord: Party,
    pub tenant: Party,
    pub financial: FinancialTerms,
    pub property: PropertyDetails,
    pub status: SubmissionStatus,
    /// `clauses` field as sent by the server (array, flat map or nested map)
    pub clauses: Option<serde_json::Value>,
    /// `template_data` field; may carry generated clauses under `clauses.data`
    pub template_data: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row of the "my drafts" list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub status: SubmissionStatus,
    pub property_address: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            status: doc.status,
            property_address: doc.property.address.clone(),
            updated_at: doc.updated_at,
        }
    }
}

/// Payload of an LOI submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoiForm {
    pub title: String,
    #[serde(default)]
    pub landlord: Party,
    #[serde(default)]
    pub tenant: Party,
    #[serde(default)]
    pub financial: FinancialTerms,
    #[serde(default)]
    pub property: PropertyDetails,
    /// Whether the backend should store the LOI as a draft instead of submitting
    #[serde(default)]
    pub save_as_draft: bool,
    /// Additional form fields passed through unchanged
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Backend answer to an LOI submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: String,
    pub status: SubmissionStatus,
}

/// Field data returned for client-side export of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub document_id: String,
    pub title: String,
    /// Flat field map (party names, rent, dates, ...)
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Clause payload in any of the shapes the normalizer accepts
    pub clauses: Option<serde_json::Value>,
}

/// AI suggestion for one clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub text: String,
    pub confidence: Option<f64>,
    pub risk: Option<String>,
}

/// Accept JSON numbers or numeric strings ("5,000.00", "$1200") for amounts
pub fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount(&s),
        _ => None,
    }))
}

/// Parse a user-entered amount, ignoring currency symbols and separators
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_submission_status_wire_names() {
        assert_eq!(SubmissionStatus::from("In Review".to_string()), SubmissionStatus::InReview);
        assert_eq!(SubmissionStatus::from("in_review".to_string()), SubmissionStatus::InReview);
        assert_eq!(SubmissionStatus::from("FINALIZED".to_string()), SubmissionStatus::Finalized);
        assert_eq!(SubmissionStatus::from("whatever".to_string()), SubmissionStatus::Draft);
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::InReview).unwrap(),
            "\"In Review\""
        );
    }

    #[test]
    fn test_financial_terms_accept_strings() {
        let terms: FinancialTerms = serde_json::from_str(
            r#"{
                "monthly_rent": "$5,250.50",
                "security_deposit": 10000,
                "escalation_percent": null
            }"#,
        )
        .unwrap();
        assert_eq!(
            terms,
            FinancialTerms {
                monthly_rent: Some(5250.5),
                security_deposit: Some(10000.0),
                escalation_percent: None,
            }
        );
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!(parse_amount("3%"), Some(3.0));
    }

    #[test]
    fn test_summary_from_document() {
        let doc = Document {
            id: "loi-1".into(),
            title: "Suite 400".into(),
            status: SubmissionStatus::Submitted,
            property: PropertyDetails {
                address: Some("1 Main St".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let summary = DocumentSummary::from(&doc);
        assert_eq!(summary.id, "loi-1");
        assert_eq!(summary.status, SubmissionStatus::Submitted);
        assert_eq!(summary.property_address.as_deref(), Some("1 Main St"));
    }
}
