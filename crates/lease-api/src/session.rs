//! Persisted client state: access token and transient auth-flow context
//!
//! Everything is sealed on disk through [`SealedStore`]. There is no
//! client-side expiry; a 401 from the backend is what ends a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_crypto::{SealError, SealedStore, StoreError};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

const RECORD: &str = "client-state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPurpose {
    PasswordReset,
    Signup,
}

impl FromStr for AuthPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "password-reset" | "reset" => Ok(AuthPurpose::PasswordReset),
            "signup" | "sign-up" => Ok(AuthPurpose::Signup),
            other => Err(format!(
                "unknown auth purpose '{}', expected password-reset or signup",
                other
            )),
        }
    }
}

impl fmt::Display for AuthPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthPurpose::PasswordReset => "password-reset",
            AuthPurpose::Signup => "signup",
        })
    }
}

/// Context carried between the steps of a password reset or sign-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub email: String,
    pub purpose: AuthPurpose,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub access_token: Option<String>,
    pub auth_context: Option<AuthContext>,
}

pub struct SessionStore {
    store: SealedStore,
    state: Mutex<ClientState>,
}

impl SessionStore {
    /// Open the state under `dir`.
    ///
    /// A record that cannot be opened (foreign key or tampered file) is
    /// discarded so the user can log in again.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Self::from_store(SealedStore::open(dir)?)
    }

    pub fn from_store(store: SealedStore) -> Result<Self, StoreError> {
        let state = match store.get::<ClientState>(RECORD) {
            Ok(state) => state.unwrap_or_default(),
            Err(StoreError::Seal(e @ (SealError::KeyMismatch | SealError::Tampered))) => {
                warn!(error = %e, "discarding unreadable client state");
                store.remove(RECORD)?;
                ClientState::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a copy and adopt it only once the copy is on disk
    fn update(&self, f: impl FnOnce(&mut ClientState)) -> Result<(), StoreError> {
        let mut state = self.lock();
        let mut next = state.clone();
        f(&mut next);
        self.store.put(RECORD, &next)?;
        *state = next;
        Ok(())
    }

    pub fn snapshot(&self) -> ClientState {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock().access_token.is_some()
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        let token = token.trim().to_string();
        self.update(|s| s.access_token = Some(token))?;
        info!("access token stored");
        Ok(())
    }

    /// Forget the token, keeping any auth-flow context
    pub fn clear_token(&self) -> Result<(), StoreError> {
        self.update(|s| s.access_token = None)
    }

    pub fn begin_auth_flow(&self, email: &str, purpose: AuthPurpose) -> Result<(), StoreError> {
        let context = AuthContext {
            email: email.trim().to_string(),
            purpose,
            issued_at: Utc::now(),
        };
        self.update(|s| s.auth_context = Some(context))
    }

    pub fn auth_context(&self) -> Option<AuthContext> {
        self.lock().auth_context.clone()
    }

    pub fn finish_auth_flow(&self) -> Result<(), StoreError> {
        self.update(|s| s.auth_context = None)
    }

    /// Log out: drop every persisted value
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.store.remove(RECORD)?;
        *state = ClientState::default();
        Ok(())
    }
}
