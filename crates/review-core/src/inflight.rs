//! In-flight request registry
//!
//! Two disciplines share one map of running actions:
//! - a latch (`try_acquire`) for whole-document actions such as download or
//!   submit, where a second trigger while one runs is ignored;
//! - supersede (`supersede`) for clause actions, where a newer action on the
//!   same clause cancels the older request.
//!
//! Slots are released when the guard drops, whatever the outcome.

use shared_types::ClauseKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Identity of an action for exclusion purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKey {
    Download(String),
    Submit,
    Delete(String),
    ApproveAll(String),
    /// Status and text changes on one clause
    Clause(ClauseKey),
    Suggest(ClauseKey),
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<ActionKey, Slot>,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` unless an action already holds it
    pub fn try_acquire(&self, key: ActionKey) -> Option<InFlightGuard> {
        let mut inner = self.lock();
        if inner.slots.contains_key(&key) {
            return None;
        }
        let (generation, cancel) = inner.register(key.clone());
        drop(inner);
        Some(InFlightGuard {
            registry: self.clone(),
            key,
            generation,
            cancel,
        })
    }

    /// Claim `key`, cancelling whichever action held it before
    pub fn supersede(&self, key: ActionKey) -> InFlightGuard {
        let mut inner = self.lock();
        let (generation, cancel) = inner.register(key.clone());
        drop(inner);
        InFlightGuard {
            registry: self.clone(),
            key,
            generation,
            cancel,
        }
    }

    /// Loading flag for `key`
    pub fn is_busy(&self, key: &ActionKey) -> bool {
        self.lock().slots.contains_key(key)
    }

    fn release(&self, key: &ActionKey, generation: u64) {
        let mut inner = self.lock();
        if inner
            .slots
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            inner.slots.remove(key);
        }
    }

    fn holds(&self, key: &ActionKey, generation: u64) -> bool {
        self.lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
    }
}

impl Inner {
    fn register(&mut self, key: ActionKey) -> (u64, CancellationToken) {
        self.generation = self.generation.wrapping_add(1);
        let cancel = CancellationToken::new();
        let previous = self.slots.insert(
            key,
            Slot {
                generation: self.generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        (self.generation, cancel)
    }
}

/// Ownership of one in-flight slot
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    key: ActionKey,
    generation: u64,
    cancel: CancellationToken,
}

impl InFlightGuard {
    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    /// Resolves once a newer action has superseded this one
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// False once superseded
    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.registry.holds(&self.key, self.generation)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_latch_is_not_reentrant() {
        let registry = InFlightRegistry::new();
        let key = ActionKey::Download("d1".into());

        let guard = registry.try_acquire(key.clone());
        assert!(guard.is_some());
        assert!(registry.try_acquire(key.clone()).is_none());
        assert!(registry.is_busy(&key));

        drop(guard);
        assert!(!registry.is_busy(&key));
        assert!(registry.try_acquire(key).is_some());
    }

    #[test]
    fn test_download_and_submit_do_not_exclude_each_other() {
        let registry = InFlightRegistry::new();
        let _download = registry.try_acquire(ActionKey::Download("d1".into())).unwrap();
        assert!(registry.try_acquire(ActionKey::Submit).is_some());
    }

    #[test]
    fn test_supersede_cancels_previous_holder() {
        let registry = InFlightRegistry::new();
        let key = ActionKey::Clause("Rent::0".into());

        let first = registry.supersede(key.clone());
        assert!(first.is_current());
        let second = registry.supersede(key.clone());

        assert!(!first.is_current());
        assert!(second.is_current());

        // Dropping the stale guard must not free the newer slot.
        drop(first);
        assert!(registry.is_busy(&key));
        drop(second);
        assert!(!registry.is_busy(&key));
    }

    #[test]
    fn test_other_clauses_are_independent() {
        let registry = InFlightRegistry::new();
        let a = registry.supersede(ActionKey::Clause("a".into()));
        let _b = registry.supersede(ActionKey::Clause("b".into()));
        assert!(a.is_current());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_supersede() {
        let registry = InFlightRegistry::new();
        let key = ActionKey::Clause("a".into());
        let first = registry.supersede(key.clone());

        let waiter = async {
            tokio::select! {
                _ = first.cancelled() => true,
                _ = tokio::time::sleep(Duration::from_secs(5)) => false,
            }
        };
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.supersede(key.clone())
        };

        let (was_cancelled, _second) = tokio::join!(waiter, trigger);
        assert!(was_cancelled);
    }
}
