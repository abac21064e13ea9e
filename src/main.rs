mod api;
mod cache;
mod canvas;
mod config;
mod editor;
mod flow;
mod graph;
mod hit;
mod layout;
mod model;
mod normalize;
mod persist;
mod ports;

use std::sync::Arc;

use iced::widget::canvas as canvas_widget;
use iced::{Element, Length, Task, Theme};
use tracing_subscriber::EnvFilter;

use api::{ApiError, HttpApi, PumpAction, TopologyApi};
use cache::LayoutCache;
use canvas::{Board, BoardMessage};
use config::Config;
use editor::{Effect, Panel};
use graph::Graph;
use layout::compute_bbox;
use model::{Edge, GraphPayload, NodeKind};
use persist::{FetchTicket, FetchTracker, PersistError, Persistence};

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aqueduct=info")),
        )
        .init();

    iced::application(init, update, view)
        .title("Aqueduct")
        .theme(theme)
        .antialiasing(true)
        .run()
}

fn theme(_state: &Aqueduct) -> Theme {
    Theme::Dark
}

fn init() -> (Aqueduct, Task<Message>) {
    let config = Config::load().unwrap_or_default().with_env();
    tracing::info!(api_base = %config.api_base, scope = ?config.scope, "starting");

    let api: Option<Arc<dyn TopologyApi>> = match HttpApi::new(config.api_base.clone()) {
        Ok(api) => Some(Arc::new(api)),
        Err(err) => {
            tracing::error!(%err, "could not build http client, running offline");
            None
        }
    };
    let persistence =
        api.map(|api| Persistence::new(api, LayoutCache::open(), config.batch_chunk_size));

    let mut state = Aqueduct {
        board: Board::new(Graph::new(config.passability())),
        persistence,
        fetches: FetchTracker::default(),
        fetch_handle: None,
        config,
    };
    let task = state.refresh();
    (state, task)
}

#[derive(Debug, Clone)]
pub enum Message {
    Board(BoardMessage),
    GraphFetched(FetchTicket, Result<GraphPayload, ApiError>),
    PositionSaved(Result<(), PersistError>),
    LayoutSaved(Result<(), PersistError>),
    EdgeCreated(Result<Edge, ApiError>),
    EdgeDeleted(i64, Result<(), ApiError>),
    PumpCommandDone(Result<(), ApiError>),
}

struct Aqueduct {
    board: Board,
    /// `None` when the HTTP client could not be built.
    persistence: Option<Persistence>,
    fetches: FetchTracker,
    fetch_handle: Option<iced::task::Handle>,
    config: Config,
}

impl Aqueduct {
    /// Start a graph fetch, aborting whichever one is still running.
    fn refresh(&mut self) -> Task<Message> {
        let Some(persistence) = self.persistence.clone() else {
            return Task::none();
        };
        if let Some(handle) = self.fetch_handle.take() {
            handle.abort();
        }

        let scope = self.config.scope.clone();
        let ticket = self.fetches.begin(scope.clone());
        self.board.loading = true;

        let (task, handle) = Task::perform(
            async move { persistence.fetch_graph(scope).await },
            move |result| Message::GraphFetched(ticket, result),
        )
        .abortable();
        self.fetch_handle = Some(handle);
        task
    }

    fn apply_graph(&mut self, payload: GraphPayload) {
        let cached = self
            .persistence
            .as_ref()
            .map(Persistence::cached_layout)
            .unwrap_or_default();
        let (nodes, edges) = normalize::normalize(&payload.nodes, &payload.edges, &cached);
        tracing::info!(nodes = nodes.len(), edges = edges.len(), "graph loaded");

        self.board.graph.replace(nodes, edges);
        self.board.editor.reconcile(&self.board.graph);
        self.reframe();
    }

    fn reframe(&mut self) {
        self.board.viewbox = compute_bbox(
            &self.board.graph.ordered_nodes(),
            self.config.bbox_padding,
            self.config.bbox_limits(),
        );
    }

    fn run(&mut self, effect: Effect) -> Task<Message> {
        let Some(persistence) = self.persistence.clone() else {
            tracing::warn!(?effect, "no backend, change kept locally only");
            return Task::none();
        };

        match effect {
            Effect::SavePosition(item) => {
                persistence.remember(&self.board.graph.positions());
                Task::perform(
                    async move { persistence.save_position(item).await },
                    Message::PositionSaved,
                )
            }
            Effect::SaveLayout(items) => {
                persistence.remember(&items);
                Task::perform(
                    async move { persistence.save_layout(items).await },
                    Message::LayoutSaved,
                )
            }
            Effect::CreateEdge(draft) => Task::perform(
                async move { persistence.create_edge(draft).await },
                Message::EdgeCreated,
            ),
            Effect::DeleteEdge(id) => Task::perform(
                async move { persistence.delete_edge(id).await },
                move |result| Message::EdgeDeleted(id, result),
            ),
        }
    }

    fn pump_command(&mut self, action: PumpAction) -> Task<Message> {
        let Some(Panel::Node(id)) = self.board.editor.panel().cloned() else {
            return Task::none();
        };
        if self
            .board
            .graph
            .node(&id)
            .is_none_or(|node| node.kind != NodeKind::Pump)
        {
            return Task::none();
        }
        let Some(credential) = self.config.pump_credential.clone() else {
            self.board.alert = Some("No pump credential configured".to_string());
            return Task::none();
        };
        let Some(persistence) = self.persistence.clone() else {
            return Task::none();
        };

        tracing::info!(pump = %id, ?action, "sending pump command");
        Task::perform(
            async move { persistence.pump_command(id, action, credential).await },
            Message::PumpCommandDone,
        )
    }

    fn write_failed(&mut self, what: &str, err: impl std::fmt::Display) {
        tracing::warn!(%err, "{what} failed");
        self.board.alert = Some(format!("{what} failed: {err}"));
    }
}

fn update(state: &mut Aqueduct, message: Message) -> Task<Message> {
    match message {
        Message::Board(msg) => return update_board(state, msg),
        Message::GraphFetched(ticket, result) => {
            if !state.fetches.accept(&ticket) {
                tracing::debug!("dropping superseded graph fetch");
                return Task::none();
            }
            state.fetch_handle = None;
            state.board.loading = false;
            match result {
                Ok(payload) => state.apply_graph(payload),
                // Keep whatever graph was already on screen.
                Err(err) => tracing::warn!(%err, "graph fetch failed"),
            }
        }
        Message::PositionSaved(result) => {
            if let Err(err) = result {
                state.write_failed("Saving position", err);
            }
        }
        Message::LayoutSaved(result) => {
            if let Err(err) = result {
                state.write_failed("Saving layout", err);
            }
        }
        Message::EdgeCreated(result) => match result {
            Ok(edge) => {
                let id = edge.id;
                if let Err(rejection) = state.board.graph.insert_edge(edge) {
                    tracing::debug!(id, ?rejection, "created edge already present");
                }
            }
            Err(err) => state.write_failed("Creating pipe", err),
        },
        Message::EdgeDeleted(id, result) => {
            if let Err(err) = result {
                state.write_failed(&format!("Deleting pipe {id}"), err);
            }
        }
        Message::PumpCommandDone(result) => match result {
            Ok(()) => return state.refresh(),
            Err(err) => state.write_failed("Pump command", err),
        },
    }
    Task::none()
}

fn update_board(state: &mut Aqueduct, message: BoardMessage) -> Task<Message> {
    let board = &mut state.board;
    let effect = match message {
        BoardMessage::PointerDown(at) => {
            board.editor.pointer_down(&board.graph, at);
            None
        }
        BoardMessage::PointerMoved(at) => {
            board.editor.pointer_move(&mut board.graph, at);
            None
        }
        BoardMessage::PointerUp(at) => board.editor.pointer_up(&board.graph, at),
        BoardMessage::Key(key) => {
            if key == editor::Key::Escape {
                board.alert = None;
            }
            board.editor.key(key, &mut board.graph)
        }
        BoardMessage::ToggleEdit => board.editor.toggle_edit(&board.graph),
        BoardMessage::ToggleConnect => {
            board.editor.toggle_connect();
            None
        }
        BoardMessage::AutoArrange => {
            let effect = board.editor.auto_arrange(&mut board.graph);
            if effect.is_some() {
                state.reframe();
            }
            effect
        }
        BoardMessage::Refresh => return state.refresh(),
        BoardMessage::PumpCommand(action) => return state.pump_command(action),
    };

    match effect {
        Some(effect) => state.run(effect),
        None => Task::none(),
    }
}

fn view(state: &Aqueduct) -> Element<'_, Message> {
    canvas_widget(&state.board)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}
