use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::storage::Project;

/// Cookie carrying the session token to the sync endpoint
pub const SESSION_COOKIE: &str = "gdd_session";

/// What the sync endpoint said about a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointReply {
    Synced,
    /// 401: the server could not resolve a session
    Unauthenticated,
    /// Any other 4xx; the request itself is bad
    Rejected(String),
    /// Transport error, 5xx, or the route is missing
    Unavailable(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the server-mediated write path (`/api/projects/sync`)
pub struct SyncEndpointClient {
    client: Client,
    url: String,
}

impl SyncEndpointClient {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn push(&self, token: &str, project: &Project) -> EndpointReply {
        let request = self
            .client
            .post(&self.url)
            .header(reqwest::header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .json(&json!({ "project": project }));
        Self::classify(request.send().await).await
    }

    pub async fn delete(&self, token: &str, project_id: &str) -> EndpointReply {
        let request = self
            .client
            .delete(&self.url)
            .header(reqwest::header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .json(&json!({ "projectId": project_id }));
        Self::classify(request.send().await).await
    }

    async fn classify(sent: reqwest::Result<reqwest::Response>) -> EndpointReply {
        let response = match sent {
            Ok(response) => response,
            Err(e) => return EndpointReply::Unavailable(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return EndpointReply::Synced;
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);

        match status {
            StatusCode::UNAUTHORIZED => EndpointReply::Unauthenticated,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
                EndpointReply::Unavailable(format!("{} {}", status.as_u16(), message))
            }
            s if s.is_client_error() => EndpointReply::Rejected(message),
            s => EndpointReply::Unavailable(format!("{} {}", s.as_u16(), message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::any, Json, Router};

    /// Serve a fixed reply on `/api/projects/sync`, return the endpoint URL
    async fn stub_endpoint(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/api/projects/sync",
            any(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}/api/projects/sync", addr)
    }

    #[tokio::test]
    async fn test_reply_classification() {
        let project = Project::new("Classified".to_string(), String::new());

        let ok = SyncEndpointClient::new(stub_endpoint(StatusCode::OK, json!({ "ok": true })).await);
        assert_eq!(ok.push("tok", &project).await, EndpointReply::Synced);

        let unauth = SyncEndpointClient::new(
            stub_endpoint(StatusCode::UNAUTHORIZED, json!({ "error": "unauthenticated" })).await,
        );
        assert_eq!(unauth.delete("tok", &project.id).await, EndpointReply::Unauthenticated);

        let invalid = SyncEndpointClient::new(
            stub_endpoint(StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": "title too long" })).await,
        );
        assert_eq!(
            invalid.push("tok", &project).await,
            EndpointReply::Rejected("title too long".to_string())
        );

        let broken = SyncEndpointClient::new(
            stub_endpoint(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "db down" })).await,
        );
        match broken.push("tok", &project).await {
            EndpointReply::Unavailable(reason) => assert!(reason.starts_with("500")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_route_is_unavailable() {
        let url = stub_endpoint(StatusCode::OK, json!({ "ok": true })).await;
        let client = SyncEndpointClient::new(url.replace("/api/projects/sync", "/api/nowhere"));
        let project = Project::new("Lost".to_string(), String::new());

        match client.push("tok", &project).await {
            EndpointReply::Unavailable(reason) => assert!(reason.starts_with("404")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = SyncEndpointClient::new("http://127.0.0.1:9/api/projects/sync".to_string());
        let project = Project::new("Offline".to_string(), String::new());

        match client.push("tok", &project).await {
            EndpointReply::Unavailable(_) => {}
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }
}
