//! Review session: optimistic clause actions against one document
//!
//! Each action mutates the overlay first, sends exactly one request, then
//! settles the overlay revision it created. Backend failures are reported
//! through the [`Notifier`] and returned as an [`ActionOutcome`]; they are
//! never retried.

use crate::backend::{
    AiRequest, ClauseAction, ClauseComment, ClauseUpdate, Notice, Notifier, Panel, ReviewBackend,
};
use crate::error::{ApiError, ReviewError};
use crate::inflight::{ActionKey, InFlightRegistry};
use crate::normalize::normalize_document;
use crate::overlay::{OverlayStore, Revision};
use crate::projection::{project, Projection, ProjectionCache, ReviewFilter};
use serde::{Deserialize, Serialize};
use shared_types::{Clause, ClauseKey, ClauseStatus, Document, RiskAssessment};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What happens to an optimistic change when its request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// Restore the last confirmed value
    #[default]
    Revert,
    /// Leave the optimistic value in place
    KeepOptimistic,
}

impl FromStr for RollbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "revert" => Ok(RollbackPolicy::Revert),
            "keep-optimistic" | "keep" => Ok(RollbackPolicy::KeepOptimistic),
            other => Err(format!(
                "unknown rollback policy '{}', expected revert or keep-optimistic",
                other
            )),
        }
    }
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RollbackPolicy::Revert => "revert",
            RollbackPolicy::KeepOptimistic => "keep-optimistic",
        })
    }
}

/// Result of one user action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome<T = ()> {
    Applied(T),
    Failed(ApiError),
    /// A newer action on the same target replaced this one
    Superseded,
    /// The same action is already running
    AlreadyRunning,
}

impl<T> ActionOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied(_))
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            ActionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a text edit. On failure the rejected draft is handed back.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub outcome: ActionOutcome,
    pub draft: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Status(Revision),
    Text(Revision),
    Comment(Revision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Commit,
    Revert,
}

#[derive(Default)]
struct SessionState {
    document: Option<Document>,
    clauses: Vec<Clause>,
    /// Bumped whenever the server clause list changes
    revision: u64,
    overlay: OverlayStore,
    cache: ProjectionCache,
}

impl SessionState {
    fn settle(&mut self, key: &ClauseKey, changes: &[Change], settle: Settle) {
        for change in changes {
            let applied = match (change, settle) {
                (Change::Status(r), Settle::Commit) => self.overlay.commit_status(key, *r),
                (Change::Status(r), Settle::Revert) => self.overlay.revert_status(key, *r),
                (Change::Text(r), Settle::Commit) => self.overlay.commit_text(key, *r),
                (Change::Text(r), Settle::Revert) => self.overlay.revert_text(key, *r),
                (Change::Comment(r), Settle::Commit) => self.overlay.commit_comment(key, *r),
                (Change::Comment(r), Settle::Revert) => self.overlay.revert_comment(key, *r),
            };
            if !applied {
                debug!(clause = %key, ?change, "revision already settled");
            }
        }
    }

    fn replace_clause(&mut self, fresh: Clause) -> bool {
        match self.clauses.iter_mut().find(|c| c.key == fresh.key) {
            Some(slot) => {
                *slot = fresh;
                self.revision += 1;
                true
            }
            None => false,
        }
    }
}

/// Review of one document from one panel
pub struct ReviewSession {
    backend: Arc<dyn ReviewBackend>,
    notifier: Arc<dyn Notifier>,
    inflight: InFlightRegistry,
    panel: Panel,
    policy: RollbackPolicy,
    state: Mutex<SessionState>,
}

impl ReviewSession {
    pub fn new(
        backend: Arc<dyn ReviewBackend>,
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
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================================
    // Loading and reads
    // ============================================================

    /// Fetch and normalize a document, keeping pending overlay entries
    pub async fn load(&self, id: &str) -> Result<(), ReviewError> {
        let document = self.backend.fetch_document(id).await.map_err(|e| {
            self.notifier.notify(Notice::error(e.user_message()));
            e
        })?;
        let clauses = normalize_document(&document);
        info!(document_id = %document.id, clauses = clauses.len(), "document loaded");

        let mut state = self.state();
        if state.document.as_ref().is_some_and(|d| d.id != document.id) {
            state.overlay.clear();
            state.cache.invalidate();
        }
        let keys: Vec<ClauseKey> = clauses.iter().map(|c| c.key.clone()).collect();
        state.overlay.rebase(keys.iter());
        state.clauses = clauses;
        state.document = Some(document);
        state.revision += 1;
        Ok(())
    }

    pub fn document(&self) -> Option<Document> {
        self.state().document.clone()
    }

    /// Server clauses with the overlay applied
    pub fn clauses(&self) -> Vec<Clause> {
        let state = self.state();
        state.overlay.merge(&state.clauses)
    }

    pub fn clause(&self, key: &ClauseKey) -> Option<Clause> {
        let state = self.state();
        state
            .clauses
            .iter()
            .find(|c| &c.key == key)
            .map(|c| state.overlay.merge_one(c))
    }

    /// Loading flag for a clause: its own action, a suggestion, or approve-all
    pub fn is_busy(&self, key: &ClauseKey) -> bool {
        self.inflight.is_busy(&ActionKey::Clause(key.clone()))
            || self.inflight.is_busy(&ActionKey::Suggest(key.clone()))
            || self.is_approving_all()
    }

    pub fn is_approving_all(&self) -> bool {
        let state = self.state();
        state
            .document
            .as_ref()
            .is_some_and(|d| self.inflight.is_busy(&ActionKey::ApproveAll(d.id.clone())))
    }

    pub fn projection(&self, filter: &ReviewFilter) -> Projection {
        let mut guard = self.state();
        let state = &mut *guard;
        let overlay = &state.overlay;
        let clauses = &state.clauses;
        state
            .cache
            .get_or_compute(state.revision, overlay.generation(), filter, || {
                project(&overlay.merge(clauses), filter, |k| overlay.is_pending(k))
            })
    }

    fn target(&self, key: &ClauseKey) -> Result<(String, Clause), ReviewError> {
        let state = self.state();
        let document = state.document.as_ref().ok_or(ReviewError::NotLoaded)?;
        let clause = state
            .clauses
            .iter()
            .find(|c| &c.key == key)
            .map(|c| state.overlay.merge_one(c))
            .ok_or_else(|| ReviewError::UnknownClause(key.clone()))?;
        Ok((document.id.clone(), clause))
    }

    // ============================================================
    // Clause actions
    // ============================================================

    /// Approve a clause, adopting the AI suggestion when there is one
    pub async fn accept(&self, key: &ClauseKey) -> Result<ActionOutcome, ReviewError> {
        let (document_id, clause) = self.target(key)?;
        let details = clause.accepted_text().to_string();
        let changes = {
            let mut state = self.state();
            [
                Change::Status(state.overlay.set_status(key, ClauseStatus::Approved)),
                Change::Text(state.overlay.set_text(key, details.clone())),
            ]
        };
        let update = ClauseUpdate {
            document_id,
            clause_id: clause.path_id().to_string(),
            clause_key: key.clone(),
            details: Some(details),
            action: ClauseAction::AcceptAiSuggestion,
            panel: self.panel,
        };

        let result = self
            .superseding(ActionKey::Clause(key.clone()), self.backend.update_clause(&update))
            .await;
        Ok(self.finish(key, &changes, result, "Clause approved", self.policy))
    }

    /// Reject a clause; other clauses are untouched
    pub async fn reject(&self, key: &ClauseKey) -> Result<ActionOutcome, ReviewError> {
        let (document_id, clause) = self.target(key)?;
        let changes = [Change::Status(
            self.state().overlay.set_status(key, ClauseStatus::Rejected),
        )];
        let update = ClauseUpdate {
            document_id,
            clause_id: clause.path_id().to_string(),
            clause_key: key.clone(),
            details: None,
            action: ClauseAction::Rejected,
            panel: self.panel,
        };

        let result = self
            .superseding(ActionKey::Clause(key.clone()), self.backend.update_clause(&update))
            .await;
        Ok(self.finish(key, &changes, result, "Clause rejected", self.policy))
    }

    /// Replace a clause's text. A failed or superseded save is always
    /// reverted and the draft is returned so the editor can be reopened with it.
    pub async fn edit_text(&self, key: &ClauseKey, text: &str) -> Result<EditOutcome, ReviewError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(shared_types::ValidationError::EmptyClauseText.into());
        }
        let (document_id, clause) = self.target(key)?;
        let changes = [Change::Text(self.state().overlay.set_text(key, text))];
        let update = ClauseUpdate {
            document_id: document_id.clone(),
            clause_id: clause.path_id().to_string(),
            clause_key: key.clone(),
            details: Some(text.to_string()),
            action: ClauseAction::ManualEdit,
            panel: self.panel,
        };

        let result = self
            .superseding(ActionKey::Clause(key.clone()), self.backend.update_clause(&update))
            .await;
        let outcome = self.finish(key, &changes, result, "Clause updated", RollbackPolicy::Revert);

        let draft = match &outcome {
            ActionOutcome::Applied(()) => {
                self.refresh_clause(&document_id, key).await;
                None
            }
            ActionOutcome::Failed(_) | ActionOutcome::Superseded => Some(text.to_string()),
            ActionOutcome::AlreadyRunning => None,
        };
        Ok(EditOutcome { outcome, draft })
    }

    /// Add a comment. Comments never supersede each other.
    pub async fn comment(
        &self,
        key: &ClauseKey,
        text: &str,
        author: Option<&str>,
    ) -> Result<ActionOutcome, ReviewError> {
        let (document_id, _) = self.target(key)?;
        let revision = self.state().overlay.append_comment(key, text, author)?;
        let request = ClauseComment {
            document_id,
            clause_key: key.clone(),
            comment: text.trim().to_string(),
            author: author.map(str::to_string),
        };

        let result = Some(self.backend.add_comment(&request).await);
        Ok(self.finish(
            key,
            &[Change::Comment(revision)],
            result,
            "Comment added",
            self.policy,
        ))
    }

    /// Ask the assistant for a new suggestion for one clause
    pub async fn suggest(
        &self,
        key: &ClauseKey,
        prompt: &str,
    ) -> Result<ActionOutcome, ReviewError> {
        let (document_id, clause) = self.target(key)?;
        let request = AiRequest {
            document_id,
            clause_key: key.clone(),
            prompt: prompt.to_string(),
            current_text: clause.text.clone(),
        };

        let result = self
            .superseding(ActionKey::Suggest(key.clone()), self.backend.ai_assist(&request))
            .await;
        Ok(match result {
            None => ActionOutcome::Superseded,
            Some(Err(e)) => self.report(e),
            Some(Ok(suggestion)) => {
                let mut state = self.state();
                if let Some(target) = state.clauses.iter_mut().find(|c| &c.key == key) {
                    target.suggestion = Some(suggestion.text);
                    target.confidence = suggestion.confidence.filter(|c| (0.0..=1.0).contains(c));
                    if let Some(risk) = suggestion.risk.as_deref().and_then(RiskAssessment::parse) {
                        target.risk = Some(risk);
                    }
                }
                state.revision += 1;
                drop(state);
                self.notifier.notify(Notice::success("Suggestion ready"));
                ActionOutcome::Applied(())
            }
        })
    }

    /// Approve every clause with one bulk request
    pub async fn approve_all(&self) -> Result<ActionOutcome, ReviewError> {
        let document_id = self
            .state()
            .document
            .as_ref()
            .map(|d| d.id.clone())
            .ok_or(ReviewError::NotLoaded)?;
        let Some(_guard) = self
            .inflight
            .try_acquire(ActionKey::ApproveAll(document_id.clone()))
        else {
            return Ok(ActionOutcome::AlreadyRunning);
        };

        let changes: Vec<(ClauseKey, Change)> = {
            let mut guard = self.state();
            let SessionState {
                clauses, overlay, ..
            } = &mut *guard;
            clauses
                .iter()
                .map(|c| {
                    let revision = overlay.set_status(&c.key, ClauseStatus::Approved);
                    (c.key.clone(), Change::Status(revision))
                })
                .collect()
        };

        let result = self.backend.approve_all(&document_id).await;
        let settle = match (&result, self.policy) {
            (Ok(()), _) | (Err(_), RollbackPolicy::KeepOptimistic) => Settle::Commit,
            (Err(_), RollbackPolicy::Revert) => Settle::Revert,
        };
        {
            let mut state = self.state();
            for (key, change) in &changes {
                state.settle(key, std::slice::from_ref(change), settle);
            }
        }

        Ok(match result {
            Ok(()) => {
                info!(document_id = %document_id, clauses = changes.len(), "all clauses approved");
                self.notifier.notify(Notice::success("All clauses approved"));
                ActionOutcome::Applied(())
            }
            Err(e) => self.report(e),
        })
    }

    // ============================================================
    // Plumbing
    // ============================================================

    /// Run `request` as the current holder of `key`. `None` when a newer
    /// action on the same key cancelled it.
    async fn superseding<T>(
        &self,
        key: ActionKey,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Option<Result<T, ApiError>> {
        let guard = self.inflight.supersede(key);
        tokio::select! {
            biased;
            _ = guard.cancelled() => {
                debug!(action = ?guard.key(), "request superseded");
                None
            }
            result = request => guard.is_current().then_some(result),
        }
    }

    fn finish(
        &self,
        key: &ClauseKey,
        changes: &[Change],
        result: Option<Result<(), ApiError>>,
        success: &str,
        policy: RollbackPolicy,
    ) -> ActionOutcome {
        let settle = match (&result, policy) {
            (None, _) => Settle::Revert,
            (Some(Ok(())), _) => Settle::Commit,
            (Some(Err(_)), RollbackPolicy::KeepOptimistic) => Settle::Commit,
            (Some(Err(_)), RollbackPolicy::Revert) => Settle::Revert,
        };
        self.state().settle(key, changes, settle);

        match result {
            None => ActionOutcome::Superseded,
            Some(Ok(())) => {
                debug!(clause = %key, "{}", success);
                self.notifier.notify(Notice::success(success));
                ActionOutcome::Applied(())
            }
            Some(Err(e)) => {
                warn!(clause = %key, error = %e, "clause action failed");
                self.report(e)
            }
        }
    }

    fn report<T>(&self, error: ApiError) -> ActionOutcome<T> {
        self.notifier.notify(Notice::error(error.user_message()));
        ActionOutcome::Failed(error)
    }

    async fn refresh_clause(&self, document_id: &str, key: &ClauseKey) {
        match self.backend.fetch_document(document_id).await {
            Ok(document) => {
                let fresh = normalize_document(&document).into_iter().find(|c| &c.key == key);
                let replaced = fresh.is_some_and(|f| self.state().replace_clause(f));
                if !replaced {
                    warn!(clause = %key, "edited clause missing from refreshed document");
                }
            }
            Err(e) => warn!(clause = %key, error = %e, "could not refresh edited clause"),
        }
    }
}
