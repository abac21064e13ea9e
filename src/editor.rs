use iced::{Point, Vector};

use crate::graph::Graph;
use crate::hit;
use crate::model::{EdgeDraft, NodePosition};
use crate::ports::{PortRef, PortSide};

/// Editing mode. Connecting is only representable as a sub-mode of editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    View,
    Edit,
    Connect,
}

impl Mode {
    pub fn is_editing(&self) -> bool {
        matches!(self, Mode::Edit | Mode::Connect)
    }
}

/// What the pointer is doing right now.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Dragging {
        node_id: String,
        /// Pointer position relative to the node center at grab time.
        grab: Vector,
    },
    Connecting {
        from: PortRef,
        cursor: Point,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Panel {
    Node(String),
    Location(String),
}

/// Work the shell has to carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SavePosition(NodePosition),
    SaveLayout(Vec<NodePosition>),
    CreateEdge(EdgeDraft),
    DeleteEdge(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Escape,
}

#[derive(Debug, Default)]
pub struct Editor {
    mode: Mode,
    gesture: Gesture,
    selected_edge: Option<i64>,
    panel: Option<Panel>,
}

impl Editor {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn selected_edge(&self) -> Option<i64> {
        self.selected_edge
    }

    pub fn panel(&self) -> Option<&Panel> {
        self.panel.as_ref()
    }

    /// Leaving edit mid-drag ends the drag, so the moved node is still saved.
    pub fn toggle_edit(&mut self, graph: &Graph) -> Option<Effect> {
        let mut effect = None;
        self.mode = match self.mode {
            Mode::View => {
                self.panel = None;
                Mode::Edit
            }
            Mode::Edit | Mode::Connect => {
                if let Gesture::Dragging { node_id, .. } = std::mem::take(&mut self.gesture) {
                    effect = graph
                        .node(&node_id)
                        .map(|node| Effect::SavePosition(NodePosition::from(node)));
                }
                self.selected_edge = None;
                Mode::View
            }
        };
        tracing::debug!(mode = ?self.mode, "editor mode changed");
        effect
    }

    /// Only has an effect while editing.
    pub fn toggle_connect(&mut self) {
        self.mode = match self.mode {
            Mode::View => return,
            Mode::Edit => Mode::Connect,
            Mode::Connect => {
                if matches!(self.gesture, Gesture::Connecting { .. }) {
                    self.gesture = Gesture::Idle;
                }
                Mode::Edit
            }
        };
        tracing::debug!(mode = ?self.mode, "editor mode changed");
    }

    pub fn pointer_down(&mut self, graph: &Graph, at: Point) {
        if !self.mode.is_editing() {
            self.click_in_view(graph, at);
            return;
        }

        if self.mode == Mode::Connect {
            if let Some(from) = hit::port_at(graph, at, Some(PortSide::Out)) {
                self.selected_edge = None;
                self.gesture = Gesture::Connecting { from, cursor: at };
                return;
            }
        }

        if let Some(node) = hit::node_at(graph, at) {
            self.gesture = Gesture::Dragging {
                node_id: node.id.clone(),
                grab: at - node.position,
            };
        } else {
            self.selected_edge = hit::edge_at(graph, at);
        }
    }

    fn click_in_view(&mut self, graph: &Graph, at: Point) {
        if let Some(node) = hit::node_at(graph, at) {
            // Offline and silent nodes have nothing to show or command.
            if node.online == Some(true) {
                self.panel = Some(Panel::Node(node.id.clone()));
            }
        } else if let Some(location) = hit::location_at(graph, at) {
            self.panel = Some(Panel::Location(location));
        }
    }

    /// Returns `true` when something visible changed.
    pub fn pointer_move(&mut self, graph: &mut Graph, at: Point) -> bool {
        match &mut self.gesture {
            Gesture::Dragging { node_id, grab } => graph.move_node(node_id, at - *grab),
            Gesture::Connecting { cursor, .. } => {
                *cursor = at;
                true
            }
            Gesture::Idle => false,
        }
    }

    pub fn pointer_up(&mut self, graph: &Graph, at: Point) -> Option<Effect> {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => None,
            Gesture::Dragging { node_id, .. } => graph
                .node(&node_id)
                .map(|node| Effect::SavePosition(NodePosition::from(node))),
            Gesture::Connecting { from, .. } => {
                let to = hit::inlet_at(graph, at, &from.node_id)?;
                if let Err(rejection) = graph.check_connection(&from.node_id, &to.node_id) {
                    tracing::debug!(?rejection, a = %from.node_id, b = %to.node_id, "connection rejected");
                    return None;
                }
                Some(Effect::CreateEdge(EdgeDraft {
                    a: from.node_id,
                    b: to.node_id,
                    a_port: from.port_id,
                    b_port: to.port_id,
                }))
            }
        }
    }

    pub fn key(&mut self, key: Key, graph: &mut Graph) -> Option<Effect> {
        match key {
            Key::Delete => {
                if !self.mode.is_editing() {
                    return None;
                }
                let id = self.selected_edge.take()?;
                graph.remove_edge(id).map(|edge| Effect::DeleteEdge(edge.id))
            }
            Key::Escape => {
                self.selected_edge = None;
                self.panel = None;
                if matches!(self.gesture, Gesture::Connecting { .. }) {
                    self.gesture = Gesture::Idle;
                }
                None
            }
        }
    }

    pub fn auto_arrange(&mut self, graph: &mut Graph) -> Option<Effect> {
        if !self.mode.is_editing() {
            return None;
        }
        graph.auto_arrange();
        Some(Effect::SaveLayout(graph.positions()))
    }

    /// Forget selections that refer to edges or nodes no longer in the graph.
    pub fn reconcile(&mut self, graph: &Graph) {
        if self.selected_edge.is_some_and(|id| graph.edge(id).is_none()) {
            self.selected_edge = None;
        }
        if let Some(Panel::Node(id)) = &self.panel {
            if graph.node(id).is_none() {
                self.panel = None;
            }
        }
        if let Gesture::Dragging { node_id, .. } = &self.gesture {
            if graph.node(node_id).is_none() {
                self.gesture = Gesture::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{edge, node, sample};
    use crate::model::NodeKind;

    const PUMP_OUT: Point = Point::new(126.0, 100.0);
    const MANIFOLD_IN: Point = Point::new(240.0, 100.0);
    // Tank at (500, 100), first inlet at (460, 70).
    const TANK_IN: Point = Point::new(460.0, 70.0);

    fn connecting() -> Editor {
        let mut editor = Editor::default();
        editor.toggle_edit(&sample());
        editor.toggle_connect();
        editor
    }

    #[test]
    fn connect_requires_edit() {
        let mut editor = Editor::default();
        editor.toggle_connect();
        assert_eq!(editor.mode(), Mode::View);

        editor.toggle_edit(&sample());
        assert_eq!(editor.mode(), Mode::Edit);
        editor.toggle_connect();
        assert_eq!(editor.mode(), Mode::Connect);
        editor.toggle_connect();
        assert_eq!(editor.mode(), Mode::Edit);
    }

    #[test]
    fn leaving_edit_clears_everything() {
        let graph = sample();
        let mut editor = connecting();
        editor.pointer_down(&graph, PUMP_OUT);
        assert!(matches!(editor.gesture(), Gesture::Connecting { .. }));

        editor.toggle_edit(&graph);
        assert_eq!(editor.mode(), Mode::View);
        assert_eq!(editor.gesture(), &Gesture::Idle);
        assert_eq!(editor.selected_edge(), None);
    }

    #[test]
    fn drag_moves_locally_and_saves_once() {
        let mut graph = sample();
        let mut editor = Editor::default();

        // Dragging is ignored outside edit mode.
        editor.pointer_down(&graph, Point::new(300.0, 100.0));
        assert_eq!(editor.gesture(), &Gesture::Idle);

        editor.toggle_edit(&graph);
        editor.pointer_down(&graph, Point::new(305.0, 100.0));
        assert!(editor.pointer_move(&mut graph, Point::new(355.0, 150.0)));
        assert!(editor.pointer_move(&mut graph, Point::new(405.0, 200.0)));
        assert_eq!(graph.node("m").unwrap().position, Point::new(400.0, 200.0));

        let effect = editor.pointer_up(&graph, Point::new(405.0, 200.0));
        assert_eq!(
            effect,
            Some(Effect::SavePosition(NodePosition {
                id: "m".into(),
                x: 400.0,
                y: 200.0
            }))
        );
        assert_eq!(editor.pointer_up(&graph, Point::new(405.0, 200.0)), None);
    }

    #[test]
    fn leaving_edit_mid_drag_still_saves() {
        let mut graph = sample();
        let mut editor = Editor::default();
        editor.toggle_edit(&graph);
        editor.pointer_down(&graph, Point::new(305.0, 100.0));
        editor.pointer_move(&mut graph, Point::new(505.0, 400.0));

        let effect = editor.toggle_edit(&graph);
        assert_eq!(
            effect,
            Some(Effect::SavePosition(NodePosition {
                id: "m".into(),
                x: 500.0,
                y: 400.0
            }))
        );
        assert_eq!(editor.mode(), Mode::View);
        assert_eq!(editor.pointer_up(&graph, Point::new(505.0, 400.0)), None);

        // Nothing to save when no drag was running.
        editor.toggle_edit(&graph);
        assert_eq!(editor.toggle_edit(&graph), None);
    }

    #[test]
    fn own_inlet_does_not_shadow_a_neighbour() {
        let mut graph = Graph::default();
        graph.replace(
            vec![
                node("m", NodeKind::Manifold, 300.0, 100.0),
                // Inlet at (234, 110), within reach of m's own inlet at (240, 100).
                node("q", NodeKind::Pump, 260.0, 110.0),
            ],
            vec![],
        );

        let mut editor = connecting();
        editor.pointer_down(&graph, Point::new(360.0, 100.0 - 13.2));
        match editor.pointer_up(&graph, Point::new(238.0, 103.0)) {
            Some(Effect::CreateEdge(draft)) => {
                assert_eq!((draft.a.as_str(), draft.b.as_str()), ("m", "q"));
                assert_eq!(draft.b_port, "in");
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn connection_creates_draft() {
        let graph = sample();
        let mut editor = connecting();
        editor.pointer_down(&graph, PUMP_OUT);
        assert!(editor.pointer_move(&mut sample(), Point::new(400.0, 60.0)));
        match editor.gesture() {
            Gesture::Connecting { cursor, .. } => assert_eq!(*cursor, Point::new(400.0, 60.0)),
            other => panic!("unexpected gesture {other:?}"),
        }

        let effect = editor.pointer_up(&graph, TANK_IN);
        assert_eq!(
            effect,
            Some(Effect::CreateEdge(EdgeDraft {
                a: "p".into(),
                b: "t".into(),
                a_port: "out".into(),
                b_port: "in_1".into(),
            }))
        );
    }

    #[test]
    fn duplicate_connection_is_silent() {
        let mut graph = sample();
        graph.insert_edge(edge(2, "p", "t")).unwrap();
        let before = graph.edges().len();

        let mut editor = connecting();
        editor.pointer_down(&graph, PUMP_OUT);
        assert_eq!(editor.pointer_up(&graph, TANK_IN), None);

        // p -> m already exists as well.
        editor.pointer_down(&graph, PUMP_OUT);
        assert_eq!(editor.pointer_up(&graph, MANIFOLD_IN), None);
        assert_eq!(graph.edges().len(), before);
    }

    #[test]
    fn self_loop_and_stray_release_cancel() {
        let mut graph = Graph::default();
        graph.replace(vec![node("m", NodeKind::Manifold, 300.0, 100.0)], vec![]);

        let mut editor = connecting();
        editor.pointer_down(&graph, Point::new(360.0, 100.0 - 13.2));
        assert!(matches!(editor.gesture(), Gesture::Connecting { .. }));
        assert_eq!(editor.pointer_up(&graph, MANIFOLD_IN), None);

        editor.pointer_down(&graph, Point::new(360.0, 100.0 - 13.2));
        assert_eq!(editor.pointer_up(&graph, Point::new(900.0, 900.0)), None);
        assert_eq!(editor.gesture(), &Gesture::Idle);
    }

    #[test]
    fn select_and_delete_edge() {
        let mut graph = sample();
        let mut editor = Editor::default();
        editor.toggle_edit(&graph);

        editor.pointer_down(&graph, Point::new(180.0, 104.0));
        assert_eq!(editor.selected_edge(), Some(1));
        editor.pointer_up(&graph, Point::new(180.0, 104.0));

        assert_eq!(editor.key(Key::Delete, &mut graph), Some(Effect::DeleteEdge(1)));
        assert!(graph.edges().is_empty());
        assert_eq!(editor.selected_edge(), None);
        assert_eq!(editor.key(Key::Delete, &mut graph), None);
    }

    #[test]
    fn clicking_empty_space_clears_selection() {
        let graph = sample();
        let mut editor = Editor::default();
        editor.toggle_edit(&graph);
        editor.pointer_down(&graph, Point::new(180.0, 100.0));
        assert_eq!(editor.selected_edge(), Some(1));
        editor.pointer_down(&graph, Point::new(180.0, 700.0));
        assert_eq!(editor.selected_edge(), None);
    }

    #[test]
    fn escape_clears_pending_state() {
        let graph = sample();
        let mut editor = connecting();
        editor.pointer_down(&graph, PUMP_OUT);
        editor.key(Key::Escape, &mut sample());
        assert_eq!(editor.gesture(), &Gesture::Idle);
        assert_eq!(editor.mode(), Mode::Connect);
    }

    #[test]
    fn panels_only_open_in_view_mode() {
        let mut graph = sample();
        let mut editor = Editor::default();

        editor.pointer_down(&graph, Point::new(100.0, 100.0));
        assert_eq!(editor.panel(), Some(&Panel::Node("p".into())));
        editor.key(Key::Escape, &mut graph);
        assert_eq!(editor.panel(), None);

        editor.toggle_edit(&graph);
        editor.pointer_down(&graph, Point::new(100.0, 100.0));
        editor.pointer_up(&graph, Point::new(100.0, 100.0));
        assert_eq!(editor.panel(), None);
    }

    #[test]
    fn offline_nodes_have_no_panel() {
        let mut graph = Graph::default();
        let mut pump = node("p", NodeKind::Pump, 100.0, 100.0);
        pump.online = Some(false);
        pump.location_id = Some("yard".into());
        graph.replace(vec![pump], vec![]);

        let mut editor = Editor::default();
        editor.pointer_down(&graph, Point::new(100.0, 100.0));
        assert_eq!(editor.panel(), None);

        // The location background around it still answers.
        editor.pointer_down(&graph, Point::new(100.0, 135.0));
        assert_eq!(editor.panel(), Some(&Panel::Location("yard".into())));
    }

    #[test]
    fn auto_arrange_only_while_editing() {
        let mut graph = sample();
        let mut editor = Editor::default();
        assert_eq!(editor.auto_arrange(&mut graph), None);

        editor.toggle_edit(&graph);
        match editor.auto_arrange(&mut graph) {
            Some(Effect::SaveLayout(items)) => assert_eq!(items.len(), 3),
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn reconcile_drops_stale_selection() {
        let mut graph = sample();
        let mut editor = Editor::default();
        editor.toggle_edit(&graph);
        editor.pointer_down(&graph, Point::new(180.0, 100.0));
        assert_eq!(editor.selected_edge(), Some(1));

        let nodes = graph.ordered_nodes();
        graph.replace(nodes, vec![]);
        editor.reconcile(&graph);
        assert_eq!(editor.selected_edge(), None);
    }
}
