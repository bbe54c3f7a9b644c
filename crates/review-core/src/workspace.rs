//! Document list and whole-document actions

use crate::backend::{DocumentBackend, Notice, Notifier, Panel, ReviewBackend};
use crate::dispatch::{ActionOutcome, ReviewSession, RollbackPolicy};
use crate::error::{ApiError, ReviewError};
use crate::inflight::{ActionKey, InFlightRegistry};
use shared_types::{DocumentSummary, LoiForm, SubmitReceipt, TemplateData};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub struct DocumentWorkspace<B> {
    backend: Arc<B>,
    notifier: Arc<dyn Notifier>,
    inflight: InFlightRegistry,
    panel: Panel,
    policy: RollbackPolicy,
    drafts: Mutex<Vec<DocumentSummary>>,
}

impl<B> DocumentWorkspace<B>
where
    B: ReviewBackend + DocumentBackend + 'static,
{
    pub fn new(
        backend: Arc<B>,
        notifier: Arc<dyn Notifier>,
        panel: Panel,
        policy: RollbackPolicy,
    ) -> Self {
        Self {
            backend,
            notifier,
            inflight: InFlightRegistry::new(),
            panel,
            policy,
            drafts: Mutex::new(Vec::new()),
        }
    }

    fn drafts_mut(&self) -> MutexGuard<'_, Vec<DocumentSummary>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last fetched draft list
    pub fn drafts(&self) -> Vec<DocumentSummary> {
        self.drafts_mut().clone()
    }

    pub async fn refresh_drafts(&self) -> Result<Vec<DocumentSummary>, ApiError> {
        match self.backend.list_drafts().await {
            Ok(drafts) => {
                info!(count = drafts.len(), "drafts refreshed");
                *self.drafts_mut() = drafts.clone();
                Ok(drafts)
            }
            Err(e) => {
                self.notifier.notify(Notice::error(e.user_message()));
                Err(e)
            }
        }
    }

    /// Start reviewing one document
    pub async fn open(&self, id: &str) -> Result<ReviewSession, ReviewError> {
        let session = ReviewSession::new(
            self.backend.clone(),
            self.notifier.clone(),
            self.panel,
            self.policy,
        );
        session.load(id).await?;
        Ok(session)
    }

    /// Delete a document; the summary leaves the list only once the server
    /// has confirmed.
    pub async fn delete(&self, id: &str) -> ActionOutcome {
        let Some(_guard) = self.inflight.try_acquire(ActionKey::Delete(id.to_string())) else {
            return ActionOutcome::AlreadyRunning;
        };
        match self.backend.delete_document(id).await {
            Ok(()) => {
                self.drafts_mut().retain(|d| d.id != id);
                info!(document_id = %id, "document deleted");
                self.notifier.notify(Notice::success("Document deleted"));
                ActionOutcome::Applied(())
            }
            Err(e) => self.report(e),
        }
    }

    /// Submit an LOI, or save it as a draft. Ignored while a submit is running.
    pub async fn submit(&self, form: &LoiForm) -> ActionOutcome<SubmitReceipt> {
        let Some(_guard) = self.inflight.try_acquire(ActionKey::Submit) else {
            self.notifier.notify(Notice::info("Submission already in progress"));
            return ActionOutcome::AlreadyRunning;
        };
        match self.backend.submit_loi(form).await {
            Ok(receipt) => {
                info!(document_id = %receipt.id, status = %receipt.status, "LOI submitted");
                let message = if form.save_as_draft {
                    "Draft saved"
                } else {
                    "LOI submitted"
                };
                self.notifier.notify(Notice::success(message));
                ActionOutcome::Applied(receipt)
            }
            Err(e) => self.report(e),
        }
    }

    /// Fetch the export payload. Ignored while the same download is running.
    pub async fn download(&self, id: &str) -> ActionOutcome<TemplateData> {
        let Some(_guard) = self.inflight.try_acquire(ActionKey::Download(id.to_string())) else {
            self.notifier.notify(Notice::info("Download already in progress"));
            return ActionOutcome::AlreadyRunning;
        };
        match self.backend.download_template(id).await {
            Ok(data) => ActionOutcome::Applied(data),
            Err(e) => self.report(e),
        }
    }

    pub fn is_downloading(&self, id: &str) -> bool {
        self.inflight.is_busy(&ActionKey::Download(id.to_string()))
    }

    pub fn is_submitting(&self) -> bool {
        self.inflight.is_busy(&ActionKey::Submit)
    }

    fn report<T>(&self, error: ApiError) -> ActionOutcome<T> {
        warn!(error = %error, "document action failed");
        self.notifier.notify(Notice::error(error.user_message()));
        ActionOutcome::Failed(error)
    }
}
