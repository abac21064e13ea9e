//! Remote topology endpoints.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::model::{EdgeDraft, GraphPayload, NodePosition, RawEdge};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("endpoint not available: {0}")]
    Unsupported(String),
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpAction {
    Start,
    Stop,
}

#[async_trait]
pub trait TopologyApi: Send + Sync {
    async fn fetch_graph(&self, scope: Option<&str>) -> Result<GraphPayload, ApiError>;

    async fn update_node_position(&self, id: &str, x: f32, y: f32) -> Result<(), ApiError>;

    /// Batched position write. Backends without it answer [`ApiError::Unsupported`].
    async fn update_node_positions(&self, items: &[NodePosition]) -> Result<(), ApiError>;

    async fn create_edge(&self, draft: &EdgeDraft) -> Result<RawEdge, ApiError>;

    async fn delete_edge(&self, id: i64) -> Result<(), ApiError>;

    async fn issue_pump_command(
        &self,
        pump_id: &str,
        action: PumpAction,
        credential: &str,
    ) -> Result<(), ApiError>;
}

/// JSON over HTTP.
pub struct HttpApi {
    http: Client,
    base: String,
}

impl HttpApi {
    pub fn new(base: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Decide what a status means for `endpoint`. `None` means success; a
/// `Status` error still needs its body filled in.
fn classify(status: StatusCode, endpoint: &str) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }
    if endpoint == BATCH_ENDPOINT
        && matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        )
    {
        return Some(ApiError::Unsupported(endpoint.to_string()));
    }
    Some(ApiError::Status {
        status: status.as_u16(),
        body: String::new(),
    })
}

/// Map a non-success status to an error, keeping a short body excerpt.
async fn check(response: reqwest::Response, endpoint: &str) -> Result<reqwest::Response, ApiError> {
    match classify(response.status(), endpoint) {
        None => Ok(response),
        Some(ApiError::Status { status, .. }) => {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status,
                body: body.chars().take(200).collect(),
            })
        }
        Some(err) => Err(err),
    }
}

const BATCH_ENDPOINT: &str = "/topology/nodes/positions";

#[derive(Serialize)]
struct PositionBody {
    x: f32,
    y: f32,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    items: &'a [NodePosition],
}

#[derive(Serialize)]
struct CommandBody<'a> {
    action: PumpAction,
    credential: &'a str,
}

#[async_trait]
impl TopologyApi for HttpApi {
    async fn fetch_graph(&self, scope: Option<&str>) -> Result<GraphPayload, ApiError> {
        let mut request = self.http.get(self.url("/topology/graph"));
        if let Some(scope) = scope {
            request = request.query(&[("company_id", scope)]);
        }
        let response = check(request.send().await?, "/topology/graph").await?;
        Ok(response.json().await?)
    }

    async fn update_node_position(&self, id: &str, x: f32, y: f32) -> Result<(), ApiError> {
        let path = format!("/topology/nodes/{id}/position");
        let response = self
            .http
            .put(self.url(&path))
            .json(&PositionBody { x, y })
            .send()
            .await?;
        check(response, &path).await?;
        Ok(())
    }

    async fn update_node_positions(&self, items: &[NodePosition]) -> Result<(), ApiError> {
        let response = self
            .http
            .put(self.url(BATCH_ENDPOINT))
            .json(&BatchBody { items })
            .send()
            .await?;
        check(response, BATCH_ENDPOINT).await?;
        Ok(())
    }

    async fn create_edge(&self, draft: &EdgeDraft) -> Result<RawEdge, ApiError> {
        let response = self
            .http
            .post(self.url("/topology/edges"))
            .json(draft)
            .send()
            .await?;
        let response = check(response, "/topology/edges").await?;
        Ok(response.json().await?)
    }

    async fn delete_edge(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("/topology/edges/{id}");
        let response = self.http.delete(self.url(&path)).send().await?;
        check(response, &path).await?;
        Ok(())
    }

    async fn issue_pump_command(
        &self,
        pump_id: &str,
        action: PumpAction,
        credential: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/topology/pumps/{pump_id}/command");
        let response = self
            .http
            .post(self.url(&path))
            .json(&CommandBody { action, credential })
            .send()
            .await?;
        check(response, &path).await?;
        Ok(())
    }
}
