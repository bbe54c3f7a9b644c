//! HTTP client for the lease backend
//!
//! Every call goes through [`LeaseClient::send`], which attaches the bearer
//! token, classifies the HTTP status, and strips the response envelope. A
//! 401 forgets the stored token.

use crate::session::SessionStore;
use crate::wire::{
    self, AiAssistBody, ClauseDetailBody, CommentBody, DownloadBody, LandlordDecisionBody,
    LoiRequest, UpdateRoute, WireDocument,
};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use review_core::{
    AiRequest, ApiError, ClauseComment, ClauseUpdate, DocumentBackend, ReviewBackend,
};
use serde::Serialize;
use serde_json::Value;
use shared_types::{AiSuggestion, Document, DocumentSummary, LoiForm, SubmitReceipt, TemplateData};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct LeaseClient {
    http: Client,
    base_url: Url,
    session: Arc<SessionStore>,
}

impl LeaseClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<SessionStore>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Base URL joined with percent-encoded path segments
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let token = self.session.access_token().ok_or(ApiError::NotAuthenticated)?;
        let url = self.url(segments);
        let path = url.path().to_string();

        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(%method, %path, "backend request");

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let error = ApiError::from_status(status.as_u16(), &path, wire::error_message(&text));
            warn!(status = status.as_u16(), %path, "backend request failed");
            if error.is_session_expired() {
                if let Err(e) = self.session.clear_token() {
                    warn!(error = %e, "failed to clear expired token");
                }
            }
            return Err(error);
        }
        wire::unwrap_envelope(&text)
    }

    async fn get(&self, segments: &[&str]) -> Result<Value, ApiError> {
        self.send::<Value>(Method::GET, segments, None).await
    }
}

#[async_trait]
impl ReviewBackend for LeaseClient {
    async fn fetch_document(&self, id: &str) -> Result<Document, ApiError> {
        let value = self.get(&["dashboard", "get_single_loi", id]).await?;
        Ok(wire::decode::<WireDocument>(value)?.into())
    }

    async fn update_clause(&self, update: &ClauseUpdate) -> Result<(), ApiError> {
        match wire::update_route(update) {
            UpdateRoute::ClauseDetail => {
                let body = ClauseDetailBody {
                    clause_id: &update.clause_id,
                    clause_key: update.clause_key.as_str(),
                    details: update.details.as_deref(),
                    action: update.action,
                };
                self.send(
                    Method::PUT,
                    &[
                        "clause",
                        "clause_detail_or_current_version_update_single_clauses_of_single_lease",
                        update.clause_id.as_str(),
                    ],
                    Some(&body),
                )
                .await?;
            }
            UpdateRoute::LandlordDecision => {
                let body = LandlordDecisionBody {
                    loi_id: &update.document_id,
                    clause_key: update.clause_key.as_str(),
                    details: update.details.as_deref(),
                    action: update.action,
                };
                self.send(
                    Method::PUT,
                    &[
                        "landlord_loi",
                        "reject_or_approve_single_clauses_of_single_LOI",
                        update.clause_id.as_str(),
                    ],
                    Some(&body),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn approve_all(&self, document_id: &str) -> Result<(), ApiError> {
        self.send::<Value>(
            Method::PUT,
            &["landlord_loi", "approve_all_clauses_of_single_LOI", document_id],
            None,
        )
        .await?;
        Ok(())
    }

    async fn add_comment(&self, comment: &ClauseComment) -> Result<(), ApiError> {
        self.send(
            Method::POST,
            &[
                "landlord_loi",
                "comment_on_single_clauses_of_single_LOI",
                comment.document_id.as_str(),
            ],
            Some(&CommentBody::from(comment)),
        )
        .await?;
        Ok(())
    }

    async fn ai_assist(&self, request: &AiRequest) -> Result<AiSuggestion, ApiError> {
        let body = AiAssistBody {
            loi_id: &request.document_id,
            clause_key: request.clause_key.as_str(),
            prompt: &request.prompt,
            current_text: &request.current_text,
        };
        // Path spelling matches the deployed backend
        let value = self
            .send(Method::POST, &["dashboard", "ai_assistent"], Some(&body))
            .await?;
        wire::ai_suggestion(value)
    }
}

#[async_trait]
impl DocumentBackend for LeaseClient {
    async fn list_drafts(&self) -> Result<Vec<DocumentSummary>, ApiError> {
        let value = self.get(&["dashboard", "mydraft_loi"]).await?;
        Ok(wire::document_list(value)?
            .iter()
            .map(DocumentSummary::from)
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        self.send::<Value>(Method::DELETE, &["dashboard", "delete_loi", id], None)
            .await?;
        Ok(())
    }

    async fn submit_loi(&self, form: &LoiForm) -> Result<SubmitReceipt, ApiError> {
        let value = self
            .send(
                Method::POST,
                &["dashboard", "submit_loi"],
                Some(&LoiRequest::from(form)),
            )
            .await?;
        wire::submit_receipt(value, form)
    }

    async fn download_template(&self, id: &str) -> Result<TemplateData, ApiError> {
        let value = self
            .send(
                Method::POST,
                &["dashboard", "download_template_data"],
                Some(&DownloadBody { loi_id: id }),
            )
            .await?;
        wire::template_data(id, value)
    }
}
