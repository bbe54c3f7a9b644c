//! Backend JSON shapes and their conversion to domain types

use chrono::{DateTime, NaiveDate, Utc};
use review_core::{ApiError, ClauseAction, ClauseComment, ClauseUpdate, Panel};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::document::number_or_string;
use shared_types::{
    AiSuggestion, Document, DocumentKind, FinancialTerms, LoiForm, Party, PropertyDetails,
    SubmissionStatus, SubmitReceipt, TemplateData,
};
use std::collections::BTreeMap;

/// Strip the `{ success, message, data }` envelope.
///
/// `success:false` becomes [`ApiError::Rejected`] even on HTTP 200. Without a
/// `data` field the remaining object is the payload.
pub fn unwrap_envelope(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    match value {
        Value::Object(mut map) => {
            if map.get("success").and_then(Value::as_bool) == Some(false) {
                return Err(ApiError::Rejected(
                    message_of(&map).unwrap_or_else(|| "Request failed".to_string()),
                ));
            }
            if let Some(data) = map.remove("data") {
                return Ok(data);
            }
            map.remove("success");
            map.remove("message");
            Ok(Value::Object(map))
        }
        other => Ok(other),
    }
}

/// Human message from an error body, if it has one
pub fn error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Object(map) => message_of(&map),
        _ => None,
    }
}

fn message_of(map: &Map<String, Value>) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|f| map.get(*f).and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

// ============================================================
// Documents
// ============================================================

/// Document as the backend stores it: flat party and term fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDocument {
    #[serde(alias = "_id", alias = "loi_id")]
    pub id: String,
    #[serde(default, alias = "loi_title", alias = "name")]
    pub title: Option<String>,
    #[serde(default, alias = "document_type", alias = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub landlord_name: Option<String>,
    #[serde(default)]
    pub landlord_email: Option<String>,
    #[serde(default)]
    pub landlord_address: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_email: Option<String>,
    #[serde(default)]
    pub tenant_address: Option<String>,

    #[serde(default, alias = "rent", deserialize_with = "number_or_string")]
    pub monthly_rent: Option<f64>,
    #[serde(default, alias = "deposit", deserialize_with = "number_or_string")]
    pub security_deposit: Option<f64>,
    #[serde(default, alias = "rent_escalation", deserialize_with = "number_or_string")]
    pub escalation_percent: Option<f64>,

    #[serde(default)]
    pub property_address: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default, alias = "square_feet", deserialize_with = "number_or_string")]
    pub square_footage: Option<f64>,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default, alias = "lease_term_months")]
    pub lease_term: Option<Value>,
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub clauses: Option<Value>,
    #[serde(default)]
    pub template_data: Option<Value>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

fn party(name: Option<String>, email: Option<String>, address: Option<String>) -> Party {
    Party {
        name,
        email,
        address,
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    // Accept a bare date or the date part of a timestamp
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

fn parse_months(raw: Option<&Value>) -> Option<u32> {
    match raw? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<u32>().ok()),
        _ => None,
    }
}

impl From<WireDocument> for Document {
    fn from(w: WireDocument) -> Self {
        let kind = match w.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("lease") => DocumentKind::Lease,
            _ => DocumentKind::Loi,
        };
        Document {
            title: w.title.unwrap_or_default(),
            kind,
            landlord: party(w.landlord_name, w.landlord_email, w.landlord_address),
            tenant: party(w.tenant_name, w.tenant_email, w.tenant_address),
            financial: FinancialTerms {
                monthly_rent: w.monthly_rent,
                security_deposit: w.security_deposit,
                escalation_percent: w.escalation_percent,
            },
            property: PropertyDetails {
                address: w.property_address,
                property_type: w.property_type,
                square_feet: w.square_footage,
                intended_use: w.intended_use,
                lease_term_months: parse_months(w.lease_term.as_ref()),
                start_date: parse_date(w.start_date.as_deref()),
            },
            status: w
                .status
                .map(SubmissionStatus::from)
                .unwrap_or_default(),
            clauses: w.clauses,
            template_data: w.template_data,
            created_at: parse_timestamp(w.created_at.as_deref()),
            updated_at: parse_timestamp(w.updated_at.as_deref()),
            id: w.id,
        }
    }
}

/// Drafts may arrive as a bare list or wrapped in a named field
pub fn document_list(value: Value) -> Result<Vec<Document>, ApiError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match ["drafts", "lois", "items"]
            .iter()
            .find_map(|k| map.remove(*k))
        {
            Some(Value::Array(items)) => items,
            _ => return Err(ApiError::Decode("expected a list of documents".into())),
        },
        Value::Null => Vec::new(),
        _ => return Err(ApiError::Decode("expected a list of documents".into())),
    };
    items
        .into_iter()
        .map(|item| decode::<WireDocument>(item).map(Document::from))
        .collect()
}

// ============================================================
// Requests
// ============================================================

/// Body of `submit_loi`
#[derive(Debug, Clone, Serialize)]
pub struct LoiRequest<'a> {
    pub title: &'a str,
    pub landlord_name: Option<&'a str>,
    pub landlord_email: Option<&'a str>,
    pub landlord_address: Option<&'a str>,
    pub tenant_name: Option<&'a str>,
    pub tenant_email: Option<&'a str>,
    pub tenant_address: Option<&'a str>,
    pub monthly_rent: Option<f64>,
    pub security_deposit: Option<f64>,
    pub rent_escalation: Option<f64>,
    pub property_address: Option<&'a str>,
    pub property_type: Option<&'a str>,
    pub square_footage: Option<f64>,
    pub intended_use: Option<&'a str>,
    pub lease_term: Option<u32>,
    pub start_date: Option<String>,
    pub status: &'static str,
    #[serde(flatten)]
    pub extra: &'a BTreeMap<String, Value>,
}

impl<'a> From<&'a LoiForm> for LoiRequest<'a> {
    fn from(form: &'a LoiForm) -> Self {
        LoiRequest {
            title: &form.title,
            landlord_name: form.landlord.name.as_deref(),
            landlord_email: form.landlord.email.as_deref(),
            landlord_address: form.landlord.address.as_deref(),
            tenant_name: form.tenant.name.as_deref(),
            tenant_email: form.tenant.email.as_deref(),
            tenant_address: form.tenant.address.as_deref(),
            monthly_rent: form.financial.monthly_rent,
            security_deposit: form.financial.security_deposit,
            rent_escalation: form.financial.escalation_percent,
            property_address: form.property.address.as_deref(),
            property_type: form.property.property_type.as_deref(),
            square_footage: form.property.square_feet,
            intended_use: form.property.intended_use.as_deref(),
            lease_term: form.property.lease_term_months,
            start_date: form.property.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
            status: if form.save_as_draft {
                SubmissionStatus::Draft.as_str()
            } else {
                SubmissionStatus::Submitted.as_str()
            },
            extra: &form.extra,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireReceipt {
    #[serde(alias = "_id", alias = "loi_id")]
    id: String,
    #[serde(default)]
    status: Option<String>,
}

pub fn submit_receipt(value: Value, form: &LoiForm) -> Result<SubmitReceipt, ApiError> {
    let receipt: WireReceipt = decode(value)?;
    let fallback = if form.save_as_draft {
        SubmissionStatus::Draft
    } else {
        SubmissionStatus::Submitted
    };
    Ok(SubmitReceipt {
        id: receipt.id,
        status: receipt.status.map(SubmissionStatus::from).unwrap_or(fallback),
    })
}

/// Tenant-panel clause update (edits and accepts)
#[derive(Debug, Serialize)]
pub struct ClauseDetailBody<'a> {
    pub clause_id: &'a str,
    pub clause_key: &'a str,
    pub details: Option<&'a str>,
    pub action: ClauseAction,
}

/// Landlord-panel approve or reject of one clause
#[derive(Debug, Serialize)]
pub struct LandlordDecisionBody<'a> {
    pub loi_id: &'a str,
    pub clause_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a str>,
    pub action: ClauseAction,
}

/// Which endpoint family handles an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRoute {
    ClauseDetail,
    LandlordDecision,
}

pub fn update_route(update: &ClauseUpdate) -> UpdateRoute {
    match (update.action, update.panel) {
        (ClauseAction::ManualEdit, _) => UpdateRoute::ClauseDetail,
        (ClauseAction::AcceptAiSuggestion, Panel::Tenant) => UpdateRoute::ClauseDetail,
        (ClauseAction::AcceptAiSuggestion, Panel::Landlord) => UpdateRoute::LandlordDecision,
        (ClauseAction::Rejected, _) => UpdateRoute::LandlordDecision,
    }
}

#[derive(Debug, Serialize)]
pub struct CommentBody<'a> {
    pub clause_key: &'a str,
    pub comment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<&'a str>,
}

impl<'a> From<&'a ClauseComment> for CommentBody<'a> {
    fn from(c: &'a ClauseComment) -> Self {
        CommentBody {
            clause_key: c.clause_key.as_str(),
            comment: &c.comment,
            author: c.author.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AiAssistBody<'a> {
    pub loi_id: &'a str,
    pub clause_key: &'a str,
    pub prompt: &'a str,
    pub current_text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DownloadBody<'a> {
    pub loi_id: &'a str,
}

// ============================================================
// Responses
// ============================================================

/// Assistant reply: either a bare string or an object with aliased fields
pub fn ai_suggestion(value: Value) -> Result<AiSuggestion, ApiError> {
    match value {
        Value::String(text) => Ok(AiSuggestion {
            text,
            confidence: None,
            risk: None,
        }),
        Value::Object(map) => {
            let text = ["suggestion", "ai_suggestion", "suggested_text", "text", "response"]
                .iter()
                .find_map(|f| map.get(*f).and_then(Value::as_str))
                .ok_or_else(|| ApiError::Decode("assistant reply has no suggestion".into()))?;
            let confidence = ["confidence", "ai_confidence"]
                .iter()
                .find_map(|f| map.get(*f))
                .and_then(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                });
            let risk = ["risk", "risk_level"]
                .iter()
                .find_map(|f| map.get(*f))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(format!("{}/10", n)),
                    _ => None,
                });
            Ok(AiSuggestion {
                text: text.to_string(),
                confidence,
                risk,
            })
        }
        _ => Err(ApiError::Decode("unexpected assistant reply".into())),
    }
}

/// Export payload: known fields are lifted out, the rest kept for rendering
pub fn template_data(requested_id: &str, value: Value) -> Result<TemplateData, ApiError> {
    let Value::Object(mut map) = value else {
        return Err(ApiError::Decode("template data is not an object".into()));
    };
    let id = ["_id", "id", "loi_id"]
        .iter()
        .find_map(|f| map.remove(*f))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| requested_id.to_string());
    let title = ["title", "loi_title"]
        .iter()
        .find_map(|f| map.remove(*f))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let clauses = map.remove("clauses");

    Ok(TemplateData {
        document_id: id,
        title,
        fields: map.into_iter().collect(),
        clauses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_envelope_with_data() {
        let v = unwrap_envelope(r#"{"success":true,"message":"ok","data":{"a":1}}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn test_envelope_without_data_is_payload() {
        let v = unwrap_envelope(r#"{"success":true,"message":"ok","_id":"x"}"#).unwrap();
        assert_eq!(v, json!({"_id": "x"}));
    }

    #[test]
    fn test_success_false_is_rejected() {
        let e = unwrap_envelope(r#"{"success":false,"message":"Clause is locked"}"#).unwrap_err();
        assert_eq!(e, ApiError::Rejected("Clause is locked".into()));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(unwrap_envelope("<html>"), Err(ApiError::Decode(_))));
        assert_eq!(unwrap_envelope("  ").unwrap(), Value::Null);
    }

    #[test]
    fn test_wire_document_flattens_parties() {
        let wire: WireDocument = decode(json!({
            "_id": "loi-9",
            "title": "Suite 200",
            "landlord_name": "Acme Holdings",
            "tenant_email": "t@example.com",
            "monthly_rent": "$4,500.00",
            "security_deposit": 9000,
            "lease_term": "60 months",
            "start_date": "2025-03-01T00:00:00.000Z",
            "status": "In Review",
            "createdAt": "2025-01-02T03:04:05Z"
        }))
        .unwrap();
        let doc = Document::from(wire);

        assert_eq!(doc.id, "loi-9");
        assert_eq!(doc.landlord.name.as_deref(), Some("Acme Holdings"));
        assert_eq!(doc.tenant.email.as_deref(), Some("t@example.com"));
        assert_eq!(doc.financial.monthly_rent, Some(4500.0));
        assert_eq!(doc.financial.security_deposit, Some(9000.0));
        assert_eq!(doc.property.lease_term_months, Some(60));
        assert_eq!(doc.property.start_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(doc.status, SubmissionStatus::InReview);
        assert!(doc.created_at.is_some());
    }

    #[test]
    fn test_update_routes() {
        let mut update = ClauseUpdate {
            document_id: "d".into(),
            clause_id: "c".into(),
            clause_key: "k".into(),
            details: None,
            action: ClauseAction::AcceptAiSuggestion,
            panel: Panel::Tenant,
        };
        assert_eq!(update_route(&update), UpdateRoute::ClauseDetail);
        update.panel = Panel::Landlord;
        assert_eq!(update_route(&update), UpdateRoute::LandlordDecision);
        update.action = ClauseAction::ManualEdit;
        assert_eq!(update_route(&update), UpdateRoute::ClauseDetail);
        update.action = ClauseAction::Rejected;
        update.panel = Panel::Tenant;
        assert_eq!(update_route(&update), UpdateRoute::LandlordDecision);
    }

    #[test]
    fn test_loi_request_body() {
        let mut form = LoiForm {
            title: "Suite 200".into(),
            save_as_draft: true,
            ..Default::default()
        };
        form.financial.escalation_percent = Some(3.0);
        form.extra.insert("broker".into(), json!("Jane"));

        let body = serde_json::to_value(LoiRequest::from(&form)).unwrap();
        assert_eq!(body["status"], json!("Draft"));
        assert_eq!(body["rent_escalation"], json!(3.0));
        assert_eq!(body["broker"], json!("Jane"));
    }

    #[test]
    fn test_ai_suggestion_shapes() {
        let s = ai_suggestion(json!("Shorter clause")).unwrap();
        assert_eq!(s.text, "Shorter clause");

        let s =
            ai_suggestion(json!({"ai_suggestion": "X", "confidence": "0.7", "risk": 6})).unwrap();
        assert_eq!(s.confidence, Some(0.7));
        assert_eq!(s.risk.as_deref(), Some("6/10"));

        assert!(ai_suggestion(json!({"nothing": true})).is_err());
    }

    #[test]
    fn test_template_data_lifts_known_fields() {
        let data = template_data(
            "loi-1",
            json!({"title": "Suite 200", "monthly_rent": 4500, "clauses": []}),
        )
        .unwrap();
        assert_eq!(data.document_id, "loi-1");
        assert_eq!(data.title, "Suite 200");
        assert_eq!(data.clauses, Some(json!([])));
        assert_eq!(data.fields.get("monthly_rent"), Some(&json!(4500)));
    }
}
