//! Directly-authenticated client for a PostgREST-style table API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::identity::Session;
use super::rows::{ProjectRow, SectionRow};
use super::{RemoteError, Result, RowStore};

pub struct RestRowClient {
    client: Client,
    base_url: String,
}

/// `in.(a,b,c)` filter value
fn in_list(ids: &[String]) -> String {
    format!("in.({})", ids.join(","))
}

impl RestRowClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn send(request: RequestBuilder, session: &Session) -> Result<Response> {
        let response = request.bearer_auth(&session.access_token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
            status if !status.is_success() => Err(RemoteError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => Ok(response),
        }
    }

    async fn read<T: DeserializeOwned>(request: RequestBuilder, session: &Session) -> Result<T> {
        let response = Self::send(request, session).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RowStore for RestRowClient {
    async fn fetch_projects(&self, session: &Session) -> Result<Vec<ProjectRow>> {
        let request = self.client.get(self.table("projects")).query(&[
            ("select", "*".to_string()),
            ("owner_id", format!("eq.{}", session.user_id)),
            ("order", "updated_at.desc".to_string()),
        ]);
        Self::read(request, session).await
    }

    async fn fetch_sections(&self, session: &Session, project_ids: &[String]) -> Result<Vec<SectionRow>> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.client.get(self.table("sections")).query(&[
            ("select", "*".to_string()),
            ("project_id", in_list(project_ids)),
        ]);
        Self::read(request, session).await
    }

    async fn upsert_project(&self, session: &Session, row: &ProjectRow) -> Result<()> {
        let request = self
            .client
            .post(self.table("projects"))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row]);
        Self::send(request, session).await?;
        Ok(())
    }

    async fn upsert_sections(&self, session: &Session, rows: &[SectionRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.table("sections"))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows);
        Self::send(request, session).await?;
        Ok(())
    }

    async fn delete_sections_except(&self, session: &Session, project_id: &str, keep: &[String]) -> Result<()> {
        let mut query = vec![("project_id", format!("eq.{}", project_id))];
        if !keep.is_empty() {
            query.push(("id", format!("not.{}", in_list(keep))));
        }
        let request = self.client.delete(self.table("sections")).query(&query);
        Self::send(request, session).await?;
        Ok(())
    }

    async fn delete_project(&self, session: &Session, project_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.table("projects"))
            .query(&[("id", format!("eq.{}", project_id))]);
        Self::send(request, session).await?;
        Ok(())
    }
}
