//! Optimistic overlay of client-side clause changes
//!
//! Every status or text override is either confirmed or pending. A pending
//! value sits on top of whatever the slot held when it was proposed, which
//! may itself still be pending. Settling a revision acts on it wherever it
//! sits in that stack: reverting the top restores what lies beneath it, and
//! a late answer for a buried revision rewrites the layer a later revert
//! would fall back to.

use shared_types::{merge_comments, Clause, ClauseKey, ClauseStatus, Comment, ValidationError};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Monotonic id of one overlay mutation
pub type Revision = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Tracked<T> {
    Confirmed(T),
    Pending {
        proposed: T,
        /// Slot content before this proposal; `None` means the server value
        underneath: Option<Box<Tracked<T>>>,
        revision: Revision,
    },
}

impl<T> Tracked<T> {
    pub fn value(&self) -> &T {
        match self {
            Tracked::Confirmed(v) => v,
            Tracked::Pending { proposed, .. } => proposed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Tracked::Pending { .. })
    }

    /// Value a full rollback of every pending layer would land on
    pub fn baseline(&self) -> Option<&T> {
        match self {
            Tracked::Confirmed(v) => Some(v),
            Tracked::Pending { underneath, .. } => {
                underneath.as_deref().and_then(Tracked::baseline)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LocalComment {
    comment: Comment,
    revision: Revision,
    confirmed: bool,
}

#[derive(Debug, Clone, Default)]
struct ClauseOverlay {
    status: Option<Tracked<ClauseStatus>>,
    text: Option<Tracked<String>>,
    comments: Vec<LocalComment>,
}

impl ClauseOverlay {
    fn is_empty(&self) -> bool {
        self.status.is_none() && self.text.is_none() && self.comments.is_empty()
    }

    fn has_pending(&self) -> bool {
        self.status.as_ref().is_some_and(Tracked::is_pending)
            || self.text.as_ref().is_some_and(Tracked::is_pending)
            || self.comments.iter().any(|c| !c.confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolve {
    Commit,
    Revert,
}

fn propose<T>(current: Option<Tracked<T>>, proposed: T, revision: Revision) -> Tracked<T> {
    Tracked::Pending {
        proposed,
        underneath: current.map(Box::new),
        revision,
    }
}

/// Settle `revision` at any depth; false if it is no longer in the stack.
///
/// A commit turns the layer into a confirmed value and discards everything
/// below it. A revert splices the layer out.
fn resolve<T>(slot: &mut Option<Tracked<T>>, revision: Revision, how: Resolve) -> bool {
    match slot.take() {
        Some(Tracked::Pending {
            proposed,
            underneath,
            revision: r,
        }) if r == revision => {
            *slot = match how {
                Resolve::Commit => Some(Tracked::Confirmed(proposed)),
                Resolve::Revert => underneath.map(|b| *b),
            };
            true
        }
        Some(Tracked::Pending {
            proposed,
            underneath,
            revision: r,
        }) => {
            let mut below = underneath.map(|b| *b);
            let found = resolve(&mut below, revision, how);
            *slot = Some(Tracked::Pending {
                proposed,
                underneath: below.map(Box::new),
                revision: r,
            });
            found
        }
        other => {
            *slot = other;
            false
        }
    }
}

/// Drop confirmed values, which the reloaded server payload now carries
fn forget_confirmed<T>(slot: &mut Option<Tracked<T>>) {
    match slot {
        Some(Tracked::Confirmed(_)) => *slot = None,
        Some(Tracked::Pending { underneath, .. }) => {
            let mut below = underneath.take().map(|b| *b);
            forget_confirmed(&mut below);
            *underneath = below.map(Box::new);
        }
        None => {}
    }
}

/// Client-only clause changes layered over server state.
///
/// Writes are last-write-wins; no status transition is refused.
#[derive(Debug, Default)]
pub struct OverlayStore {
    entries: HashMap<ClauseKey, ClauseOverlay>,
    last_revision: Revision,
    generation: u64,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&mut self) -> Revision {
        self.last_revision += 1;
        self.generation += 1;
        self.last_revision
    }

    /// Changes on every mutation; used as a memoization key
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ============================================================
    // Status
    // ============================================================

    pub fn set_status(&mut self, key: &ClauseKey, status: ClauseStatus) -> Revision {
        let revision = self.next_revision();
        let entry = self.entries.entry(key.clone()).or_default();
        entry.status = Some(propose(entry.status.take(), status, revision));
        revision
    }

    /// Make a pending status final; false if `revision` is already settled
    pub fn commit_status(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| resolve(&mut e.status, revision, Resolve::Commit))
    }

    /// Withdraw a pending status; false if `revision` is already settled
    pub fn revert_status(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| resolve(&mut e.status, revision, Resolve::Revert))
    }

    pub fn status_override(&self, key: &ClauseKey) -> Option<ClauseStatus> {
        self.entries
            .get(key)
            .and_then(|e| e.status.as_ref())
            .map(|t| *t.value())
    }

    // ============================================================
    // Text
    // ============================================================

    pub fn set_text(&mut self, key: &ClauseKey, text: impl Into<String>) -> Revision {
        let revision = self.next_revision();
        let entry = self.entries.entry(key.clone()).or_default();
        entry.text = Some(propose(entry.text.take(), text.into(), revision));
        revision
    }

    pub fn commit_text(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| resolve(&mut e.text, revision, Resolve::Commit))
    }

    pub fn revert_text(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| resolve(&mut e.text, revision, Resolve::Revert))
    }

    // ============================================================
    // Comments
    // ============================================================

    /// Add a comment stamped with the client clock
    pub fn append_comment(
        &mut self,
        key: &ClauseKey,
        text: &str,
        author: Option<&str>,
    ) -> Result<Revision, ValidationError> {
        let comment = Comment::local(text, author)?;
        let revision = self.next_revision();
        self.entries
            .entry(key.clone())
            .or_default()
            .comments
            .push(LocalComment {
                comment,
                revision,
                confirmed: false,
            });
        Ok(revision)
    }

    pub fn commit_comment(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| {
            e.comments
                .iter_mut()
                .find(|c| c.revision == revision && !c.confirmed)
                .map(|c| c.confirmed = true)
                .is_some()
        })
    }

    pub fn revert_comment(&mut self, key: &ClauseKey, revision: Revision) -> bool {
        self.settle(key, |e| {
            let before = e.comments.len();
            e.comments.retain(|c| c.revision != revision);
            e.comments.len() != before
        })
    }

    pub fn local_comments(&self, key: &ClauseKey) -> Vec<Comment> {
        self.entries
            .get(key)
            .map(|e| e.comments.iter().map(|c| c.comment.clone()).collect())
            .unwrap_or_default()
    }

    // ============================================================
    // Reads
    // ============================================================

    /// True while any change to this clause awaits the server
    pub fn is_pending(&self, key: &ClauseKey) -> bool {
        self.entries.get(key).is_some_and(ClauseOverlay::has_pending)
    }

    /// Apply the overlay to one server clause
    pub fn merge_one(&self, clause: &Clause) -> Clause {
        let mut merged = clause.clone();
        if let Some(entry) = self.entries.get(&clause.key) {
            if let Some(status) = &entry.status {
                merged.status = *status.value();
            }
            if let Some(text) = &entry.text {
                merged.text = text.value().clone();
            }
            if !entry.comments.is_empty() {
                let local: Vec<Comment> =
                    entry.comments.iter().map(|c| c.comment.clone()).collect();
                merged.comments = merge_comments(&clause.comments, &local);
            }
        }
        merged
    }

    /// Apply the overlay to a clause list; overlay values win for the same key
    pub fn merge(&self, clauses: &[Clause]) -> Vec<Clause> {
        clauses.iter().map(|c| self.merge_one(c)).collect()
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Reconcile with a freshly loaded document.
    ///
    /// Confirmed changes are now part of the server payload and are dropped.
    /// Pending changes survive. Entries for keys that no longer exist are
    /// discarded.
    pub fn rebase<'a>(&mut self, known: impl IntoIterator<Item = &'a ClauseKey>) {
        let known: HashSet<&ClauseKey> = known.into_iter().collect();
        let before = self.entries.len();

        self.entries.retain(|key, entry| {
            if !known.contains(key) {
                if entry.has_pending() {
                    warn!(clause = %key, "dropping pending overlay for clause gone after reload");
                }
                return false;
            }
            forget_confirmed(&mut entry.status);
            forget_confirmed(&mut entry.text);
            entry.comments.retain(|c| !c.confirmed);
            !entry.is_empty()
        });

        if self.entries.len() != before {
            tracing::debug!(dropped = before - self.entries.len(), "overlay rebased");
        }
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    fn settle(&mut self, key: &ClauseKey, f: impl FnOnce(&mut ClauseOverlay) -> bool) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let changed = f(entry);
        if entry.is_empty() {
            self.entries.remove(key);
        }
        if changed {
            self.generation += 1;
        }
        changed
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn status() -> impl Strategy<Value = ClauseStatus> {
        prop::sample::select(ClauseStatus::ALL.to_vec())
    }

    proptest! {
        /// Property: whenever an override exists, the merged status equals it
        #[test]
        fn override_always_takes_precedence(
            server in status(),
            over in status(),
            commit_it in any::<bool>(),
        ) {
            let mut overlay = OverlayStore::new();
            let key = ClauseKey::from("k");
            let r = overlay.set_status(&key, over);
            if commit_it {
                overlay.commit_status(&key, r);
            }
            let mut clause = Clause::new(key.clone(), "k", "t");
            clause.status = server;
            prop_assert_eq!(overlay.merge_one(&clause).status, over);
        }
    }
}
