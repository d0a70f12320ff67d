//! Remote moment storage.
//!
//! The real archive is an HTTP service (`POST moment`,
//! `GET moments-by-session`) owned by the application. The core only
//! depends on this trait; [`MemoryArchive`] stands in for development and
//! tests.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::moment::Moment;

use super::StoreError;

/// Where signed moments are posted and fetched back per session.
#[async_trait]
pub trait MomentArchive: Send + Sync {
    async fn post_moment(&self, session: &str, moment: &Moment) -> Result<(), StoreError>;

    async fn moments_by_session(&self, session: &str) -> Result<Vec<Moment>, StoreError>;
}

/// In-memory [`MomentArchive`]. Rejects moments whose issuer signature
/// does not verify and ignores exact duplicates.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    sessions: DashMap<String, Vec<Moment>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl MomentArchive for MemoryArchive {
    async fn post_moment(&self, session: &str, moment: &Moment) -> Result<(), StoreError> {
        if session.is_empty() {
            return Err(StoreError::Rejected("session id is empty".into()));
        }
        if !moment.verify_with_issuer() {
            return Err(StoreError::Rejected(
                "moment signature does not verify against its issuer".into(),
            ));
        }
        let mut entry = self.sessions.entry(session.to_string()).or_default();
        if !entry.iter().any(|m| m.signature == moment.signature) {
            entry.push(moment.clone());
            debug!(session, count = entry.len(), "moment archived");
        }
        Ok(())
    }

    async fn moments_by_session(&self, session: &str) -> Result<Vec<Moment>, StoreError> {
        Ok(self
            .sessions
            .get(session)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }
}
