use iced::futures::future::join_all;
use std::sync::Arc;

use crate::api::{ApiError, PumpAction, TopologyApi};
use crate::cache::LayoutCache;
use crate::model::{Edge, EdgeDraft, GraphPayload, NodePosition};
use crate::normalize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{failed} of {total} position updates failed")]
    Partial { failed: usize, total: usize },
}

/// Bridges edits to the local layout cache and the remote API.
///
/// Cheap to clone; remote calls are made on a clone moved into a task.
#[derive(Clone)]
pub struct Persistence {
    api: Arc<dyn TopologyApi>,
    cache: LayoutCache,
    chunk_size: usize,
}

impl Persistence {
    pub fn new(api: Arc<dyn TopologyApi>, cache: LayoutCache, chunk_size: usize) -> Self {
        Self {
            api,
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn cached_layout(&self) -> Vec<NodePosition> {
        self.cache.load()
    }

    /// Synchronous local write, done before any remote call so a reload keeps
    /// the edit even if the network write never lands.
    pub fn remember(&self, layout: &[NodePosition]) {
        self.cache.store(layout);
    }

    pub async fn fetch_graph(&self, scope: Option<String>) -> Result<GraphPayload, ApiError> {
        self.api.fetch_graph(scope.as_deref()).await
    }

    pub async fn save_position(&self, item: NodePosition) -> Result<(), PersistError> {
        self.api
            .update_node_position(&item.id, item.x, item.y)
            .await?;
        tracing::debug!(id = %item.id, "position saved");
        Ok(())
    }

    /// Prefer the batch endpoint; without it, send per-node writes in
    /// concurrent chunks of `chunk_size`, one chunk at a time.
    pub async fn save_layout(&self, items: Vec<NodePosition>) -> Result<(), PersistError> {
        match self.api.update_node_positions(&items).await {
            Ok(()) => return Ok(()),
            Err(ApiError::Unsupported(endpoint)) => {
                tracing::debug!(%endpoint, "batch write unavailable, falling back to chunks");
            }
            Err(err) => return Err(err.into()),
        }

        let total = items.len();
        let mut failed = 0;
        for chunk in items.chunks(self.chunk_size) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|item| self.api.update_node_position(&item.id, item.x, item.y)),
            )
            .await;
            for err in results.into_iter().filter_map(Result::err) {
                tracing::warn!(%err, "position write failed");
                failed += 1;
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(PersistError::Partial { failed, total })
        }
    }

    pub async fn create_edge(&self, draft: EdgeDraft) -> Result<Edge, ApiError> {
        let mut raw = self.api.create_edge(&draft).await?;
        // Backends often echo only the id; fill the rest from what was asked for.
        raw.a.get_or_insert_with(|| draft.a.clone().into());
        raw.b.get_or_insert_with(|| draft.b.clone().into());
        raw.a_port.get_or_insert_with(|| draft.a_port.clone());
        raw.b_port.get_or_insert_with(|| draft.b_port.clone());
        normalize::edge_from_raw(&raw, |_| None)
            .ok_or_else(|| ApiError::Decode("created edge has no usable id".into()))
    }

    pub async fn delete_edge(&self, id: i64) -> Result<(), ApiError> {
        self.api.delete_edge(id).await
    }

    pub async fn pump_command(
        &self,
        pump_id: String,
        action: PumpAction,
        credential: String,
    ) -> Result<(), ApiError> {
        self.api
            .issue_pump_command(&pump_id, action, &credential)
            .await
    }
}

/// Identifies one graph fetch so late answers can be recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    scope: Option<String>,
    generation: u64,
}

/// Only the most recent fetch may update the graph; older ones are superseded.
#[derive(Debug, Default)]
pub struct FetchTracker {
    generation: u64,
    current: Option<FetchTicket>,
}

impl FetchTracker {
    pub fn begin(&mut self, scope: Option<String>) -> FetchTicket {
        self.generation += 1;
        let ticket = FetchTicket {
            scope,
            generation: self.generation,
        };
        if let Some(previous) = self.current.replace(ticket.clone()) {
            tracing::debug!(generation = previous.generation, "superseding graph fetch");
        }
        ticket
    }

    /// Consumes the in-flight slot if `ticket` is still current.
    pub fn accept(&mut self, ticket: &FetchTicket) -> bool {
        if self.current.as_ref() == Some(ticket) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }
}
