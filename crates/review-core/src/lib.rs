//! Clause review engine for LOI and lease documents
//!
//! Turns heterogeneous clause payloads into one clause list, layers
//! optimistic client changes on top, runs review actions against a backend
//! and derives the views a reviewer sees.
//!
//! ## Modules
//!
//! - `normalize`: raw payload shapes to `Vec<Clause>`
//! - `overlay`: pending and confirmed client-side changes
//! - `dispatch`: per-document review session and its actions
//! - `workspace`: draft list, submit, download, delete
//! - `inflight`: request exclusion and supersession
//! - `projection`: counts, progress, filtered rows

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod inflight;
pub mod normalize;
pub mod overlay;
pub mod projection;
pub mod workspace;

#[cfg(test)]
mod mock;

pub use backend::{
    AiRequest, ClauseAction, ClauseComment, ClauseUpdate, DocumentBackend, Notice, NoticeLevel,
    Notifier, Panel, ReviewBackend, TracingNotifier,
};
pub use dispatch::{ActionOutcome, EditOutcome, ReviewSession, RollbackPolicy};
pub use error::{ApiError, ReviewError};
pub use inflight::{ActionKey, InFlightGuard, InFlightRegistry};
pub use normalize::{normalize, normalize_document};
pub use overlay::{OverlayStore, Revision, Tracked};
pub use projection::{ClauseRow, Projection, ReviewFilter, StatusCounts};
pub use workspace::DocumentWorkspace;
