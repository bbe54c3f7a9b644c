//! REST client for the lease/LOI backend
//!
//! Implements the review engine's backend traits over `reqwest`, keeps the
//! access token in encrypted local storage and renders export payloads.

pub mod client;
pub mod export;
pub mod session;
pub mod wire;

pub use client::{ClientError, LeaseClient, DEFAULT_TIMEOUT};
pub use export::render_markdown;
pub use session::{AuthContext, AuthPurpose, ClientState, SessionStore};
