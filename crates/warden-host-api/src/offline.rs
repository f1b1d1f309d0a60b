//! Resolver for running without a platform adapter

use async_trait::async_trait;
use tracing::debug;
use warden_util::SubjectId;

use crate::{HostResult, ResolvedSubject, SubjectResolver};

/// Treats every subject as absent from the domain.
///
/// Sanctions are still recorded and reversed on schedule, but no external
/// action is taken. Used when no adapter is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineResolver;

#[async_trait]
impl SubjectResolver for OfflineResolver {
    async fn resolve(&self, id: &SubjectId) -> HostResult<Option<ResolvedSubject>> {
        debug!(subject = %id, "Offline resolver: subject treated as absent");
        Ok(None)
    }

    fn has_exempt_capability(&self, _subject: &ResolvedSubject) -> bool {
        false
    }

    async fn apply_sanction(&self, _subject: &ResolvedSubject, _reason: &str) -> HostResult<()> {
        Ok(())
    }

    async fn revert_sanction(&self, id: &SubjectId) -> HostResult<()> {
        debug!(subject = %id, "Offline resolver: nothing to revert");
        Ok(())
    }

    async fn notify(&self, _subject: &ResolvedSubject, _message: &str) -> HostResult<()> {
        Ok(())
    }
}
