//! Correlation ("tracker") IDs carried through one unit of work.
//!
//! The inbound middleware assigns a fresh ID per request and runs the rest
//! of the pipeline inside [`scope`]; outbound calls and database tracers
//! read it back with [`current`]. Reading outside a scope yields an empty
//! string rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use uuid::Uuid;

/// Well-known name of the correlation value.
pub const TRACKER_ID_KEY: &str = "tracker_id";

tokio::task_local! {
    static TRACKER_ID: TrackerId;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Run `fut` with `id` as the current tracker ID.
pub async fn scope<F: Future>(id: TrackerId, fut: F) -> F::Output {
    TRACKER_ID.scope(id, fut).await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(id: TrackerId, f: impl FnOnce() -> R) -> R {
    TRACKER_ID.sync_scope(id, f)
}

/// Tracker ID of the enclosing scope, or `""` outside any scope.
pub fn current() -> String {
    TRACKER_ID
        .try_with(|id| id.0.clone())
        .unwrap_or_default()
}
