use std::sync::Arc;

use async_trait::async_trait;

use super::endpoint::{EndpointReply, SyncEndpointClient};
use super::identity::{IdentityProvider, Session};
use super::{read_projects, write_project, PushOutcome, RemoteAdapter, RemoteError, Result, RowStore, SkipReason};
use crate::storage::Project;

const SKIPPED: PushOutcome = PushOutcome::Skipped(SkipReason::Unauthenticated);

/// Remote adapter that prefers the sync endpoint and falls back to the
/// table client when the endpoint cannot be reached.
pub struct HybridRemote {
    endpoint: Option<SyncEndpointClient>,
    rows: Arc<dyn RowStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl HybridRemote {
    pub fn new(
        endpoint: Option<SyncEndpointClient>,
        rows: Arc<dyn RowStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            endpoint,
            rows,
            identity,
        }
    }

    /// Cached session first, network check only when the cache is empty
    async fn resolve_identity(&self, user_hint: Option<&str>) -> Option<Session> {
        let session = match self.identity.cached_session() {
            Some(session) => Some(session),
            None => match self.identity.fetch_session().await {
                Ok(session) => session,
                Err(e) => {
                    log::debug!("Remote: identity check failed: {}", e);
                    None
                }
            },
        }?;

        if let Some(hint) = user_hint {
            if hint != session.user_id {
                log::warn!(
                    "Remote: caller expected user {} but the session belongs to {}; using the session",
                    hint,
                    session.user_id
                );
            }
        }
        Some(session)
    }

    /// Primary path. `None` means fall back to the table client.
    async fn via_endpoint<'a, F, Fut>(&'a self, call: F) -> Option<Result<PushOutcome>>
    where
        F: FnOnce(&'a SyncEndpointClient, Session) -> Fut,
        Fut: std::future::Future<Output = EndpointReply>,
    {
        let endpoint = self.endpoint.as_ref()?;
        let session = self.identity.cached_session()?;

        match call(endpoint, session).await {
            EndpointReply::Synced => Some(Ok(PushOutcome::Pushed)),
            EndpointReply::Unauthenticated => {
                log::debug!("Remote: sync endpoint did not recognise the session");
                Some(Ok(SKIPPED))
            }
            EndpointReply::Rejected(message) => Some(Err(RemoteError::Rejected(message))),
            EndpointReply::Unavailable(reason) => {
                log::debug!("Remote: sync endpoint unavailable ({}), using table client", reason);
                None
            }
        }
    }
}

#[async_trait]
impl RemoteAdapter for HybridRemote {
    async fn fetch_all(&self) -> Option<Vec<Project>> {
        let session = self.resolve_identity(None).await?;
        match read_projects(self.rows.as_ref(), &session).await {
            Ok(projects) => Some(projects),
            Err(e) => {
                log::warn!("Remote: failed to fetch projects: {}", e);
                None
            }
        }
    }

    async fn upsert_project(&self, project: &Project, user_hint: Option<&str>) -> Result<PushOutcome> {
        if let Some(result) = self
            .via_endpoint(|endpoint, session| async move {
                endpoint.push(&session.access_token, project).await
            })
            .await
        {
            return result;
        }

        let Some(session) = self.resolve_identity(user_hint).await else {
            return Ok(SKIPPED);
        };
        write_project(self.rows.as_ref(), &session, project).await?;
        Ok(PushOutcome::Pushed)
    }

    async fn delete_project(&self, project_id: &str, user_hint: Option<&str>) -> Result<PushOutcome> {
        if let Some(result) = self
            .via_endpoint(|endpoint, session| async move {
                endpoint.delete(&session.access_token, project_id).await
            })
            .await
        {
            return result;
        }

        let Some(session) = self.resolve_identity(user_hint).await else {
            return Ok(SKIPPED);
        };
        self.rows.delete_project(&session, project_id).await?;
        Ok(PushOutcome::Pushed)
    }
}
