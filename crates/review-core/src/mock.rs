//! In-memory backend for session and workspace tests

use crate::backend::{
    AiRequest, ClauseComment, ClauseUpdate, DocumentBackend, Notice, Notifier, ReviewBackend,
};
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::json;
use shared_types::{
    AiSuggestion, Document, DocumentKind, DocumentSummary, LoiForm, SubmissionStatus,
    SubmitReceipt, TemplateData,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// LOI with a generated nested clause map and one persisted record
pub fn fixture() -> Document {
    Document {
        id: "loi-1".into(),
        kind: DocumentKind::Loi,
        title: "Suite 200 LOI".into(),
        clauses: Some(json!([
            {
                "_id": "rec-rent-0",
                "clause_key": "Rent::0",
                "ai_suggestion": "Base rent is $9,500 per month",
                "risk": "High (8/10)",
                "comments": ["S1", "S2"]
            }
        ])),
        template_data: Some(json!({
            "clauses": {
                "data": {
                    "Term": { "0": "Five year initial term" },
                    "Rent": {
                        "0": "Base rent is $10,000 per month",
                        "1": "Escalation of 3% annually"
                    }
                }
            }
        })),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockBackend {
    document: Mutex<Document>,
    drafts: Mutex<Vec<DocumentSummary>>,
    calls: Mutex<Vec<&'static str>>,
    updates: Mutex<Vec<ClauseUpdate>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl MockBackend {
    pub fn new(document: Document) -> Self {
        let second = Document {
            id: "loi-2".into(),
            title: "Warehouse LOI".into(),
            ..Default::default()
        };
        Self {
            drafts: Mutex::new(vec![
                DocumentSummary::from(&document),
                DocumentSummary::from(&second),
            ]),
            document: Mutex::new(document),
            ..Default::default()
        }
    }

    /// Swap the document the backend serves
    pub fn set_document(&self, document: Document) {
        *self.document.lock().unwrap() = document;
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub fn updates(&self) -> Vec<ClauseUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fail_next(&self, call: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(call, error);
    }

    pub fn delay_next(&self, call: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(call, delay);
    }

    pub fn fail_next_update(&self, error: ApiError) {
        self.fail_next("update_clause", error);
    }

    pub fn fail_next_comment(&self, error: ApiError) {
        self.fail_next("add_comment", error);
    }

    pub fn fail_next_approve_all(&self, error: ApiError) {
        self.fail_next("approve_all", error);
    }

    pub fn delay_next_update(&self, delay: Duration) {
        self.delay_next("update_clause", delay);
    }

    async fn enter(&self, call: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        let delay = self.delays.lock().unwrap().remove(call);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().remove(call);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReviewBackend for MockBackend {
    async fn fetch_document(&self, id: &str) -> Result<Document, ApiError> {
        self.enter("fetch_document").await?;
        let document = self.document.lock().unwrap().clone();
        if document.id == id {
            Ok(document)
        } else {
            Err(ApiError::NotFound(format!("/dashboard/get_single_loi/{}", id)))
        }
    }

    async fn update_clause(&self, update: &ClauseUpdate) -> Result<(), ApiError> {
        self.updates.lock().unwrap().push(update.clone());
        self.enter("update_clause").await
    }

    async fn approve_all(&self, _document_id: &str) -> Result<(), ApiError> {
        self.enter("approve_all").await
    }

    async fn add_comment(&self, _comment: &ClauseComment) -> Result<(), ApiError> {
        self.enter("add_comment").await
    }

    async fn ai_assist(&self, request: &AiRequest) -> Result<AiSuggestion, ApiError> {
        self.enter("ai_assist").await?;
        Ok(AiSuggestion {
            text: format!("Suggested: {}", request.prompt),
            confidence: Some(0.8),
            risk: Some("Low".into()),
        })
    }
}

#[async_trait]
impl DocumentBackend for MockBackend {
    async fn list_drafts(&self) -> Result<Vec<DocumentSummary>, ApiError> {
        self.enter("list_drafts").await?;
        Ok(self.drafts.lock().unwrap().clone())
    }

    async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        self.enter("delete_document").await?;
        self.drafts.lock().unwrap().retain(|d| d.id != id);
        Ok(())
    }

    async fn submit_loi(&self, form: &LoiForm) -> Result<SubmitReceipt, ApiError> {
        self.enter("submit_loi").await?;
        Ok(SubmitReceipt {
            id: "loi-new".into(),
            status: if form.save_as_draft {
                SubmissionStatus::Draft
            } else {
                SubmissionStatus::Submitted
            },
        })
    }

    async fn download_template(&self, id: &str) -> Result<TemplateData, ApiError> {
        self.enter("download_template").await?;
        let document = self.document.lock().unwrap().clone();
        Ok(TemplateData {
            document_id: id.to_string(),
            title: document.title,
            fields: BTreeMap::new(),
            clauses: document.clauses,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().unwrap().last().cloned()
    }

    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}
