use iced::Point;
use std::collections::HashMap;

use crate::flow::{Flow, FlowState, OnlineOnly, Passability};
use crate::layout::{self, LocationGroup};
use crate::model::{Edge, Node, NodePosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    SelfLoop,
    Duplicate,
    UnknownNode,
}

/// The in-memory topology: nodes by id, edges newest first, and everything
/// derived from them.
pub struct Graph {
    nodes: HashMap<String, Node>,
    /// Node ids in backend order, used for drawing and layout.
    order: Vec<String>,
    edges: Vec<Edge>,
    groups: Vec<LocationGroup>,
    flow: FlowState,
    passability: Box<dyn Passability>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(Box::new(OnlineOnly))
    }
}

impl Graph {
    pub fn new(passability: Box<dyn Passability>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            groups: Vec::new(),
            flow: FlowState::default(),
            passability,
        }
    }

    pub fn set_passability(&mut self, passability: Box<dyn Passability>) {
        self.passability = passability;
        self.flow.invalidate();
        self.refresh_flow();
    }

    /// Swap in a freshly fetched graph. Duplicate node ids keep the first row.
    pub fn replace(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.nodes.clear();
        self.order.clear();
        for node in nodes {
            if self.nodes.contains_key(&node.id) {
                tracing::debug!(id = %node.id, "duplicate node id ignored");
                continue;
            }
            self.order.push(node.id.clone());
            self.nodes.insert(node.id.clone(), node);
        }
        self.edges = edges;
        self.regroup();
        self.refresh_flow();
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in stable order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: i64) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn groups(&self) -> &[LocationGroup] {
        &self.groups
    }

    pub fn flow(&self, edge_id: i64) -> Flow {
        self.flow.get(edge_id)
    }

    pub fn positions(&self) -> Vec<NodePosition> {
        self.nodes().map(NodePosition::from).collect()
    }

    pub fn ordered_nodes(&self) -> Vec<Node> {
        self.nodes().cloned().collect()
    }

    /// Reposition a node. Flow is untouched: position never affects reachability.
    pub fn move_node(&mut self, id: &str, position: Point) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.position = position;
        self.regroup();
        true
    }

    pub fn auto_arrange(&mut self) {
        for node in layout::auto_layout(&self.ordered_nodes()) {
            self.nodes.insert(node.id.clone(), node);
        }
        self.regroup();
    }

    pub fn check_connection(&self, a: &str, b: &str) -> Result<(), Rejection> {
        if a == b {
            return Err(Rejection::SelfLoop);
        }
        if !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return Err(Rejection::UnknownNode);
        }
        if self.edges.iter().any(|e| e.a == a && e.b == b) {
            return Err(Rejection::Duplicate);
        }
        Ok(())
    }

    /// Prepend a confirmed edge unless it would duplicate a directed pair or loop.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), Rejection> {
        if edge.a == edge.b {
            return Err(Rejection::SelfLoop);
        }
        if self
            .edges
            .iter()
            .any(|e| e.id == edge.id || (e.a == edge.a && e.b == edge.b))
        {
            return Err(Rejection::Duplicate);
        }
        self.edges.insert(0, edge);
        self.refresh_flow();
        Ok(())
    }

    pub fn remove_edge(&mut self, id: i64) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.id == id)?;
        let edge = self.edges.remove(index);
        self.refresh_flow();
        Some(edge)
    }

    fn refresh_flow(&mut self) {
        self.flow
            .refresh(&self.edges, &self.nodes, self.passability.as_ref());
    }

    fn regroup(&mut self) {
        self.groups = layout::location_groups(&self.ordered_nodes());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::NodeKind;

    pub(crate) fn node(id: &str, kind: NodeKind, x: f32, y: f32) -> Node {
        let mut n = Node::new(id, kind, Point::new(x, y));
        n.online = Some(true);
        n
    }

    pub(crate) fn edge(id: i64, a: &str, b: &str) -> Edge {
        Edge {
            id,
            a: a.into(),
            b: b.into(),
            a_port: "out".into(),
            b_port: "in".into(),
            relacion: None,
            prioridad: None,
        }
    }

    /// Pump at (100, 100), manifold at (300, 100), tank at (500, 100); pump running.
    pub(crate) fn sample() -> Graph {
        let mut pump = node("p", NodeKind::Pump, 100.0, 100.0);
        pump.state = Some("run".into());
        let mut graph = Graph::default();
        graph.replace(
            vec![
                pump,
                node("m", NodeKind::Manifold, 300.0, 100.0),
                node("t", NodeKind::Tank, 500.0, 100.0),
            ],
            vec![edge(1, "p", "m")],
        );
        graph
    }

    #[test]
    fn duplicate_and_self_loop_are_rejected() {
        let mut graph = sample();
        assert_eq!(graph.check_connection("p", "p"), Err(Rejection::SelfLoop));
        assert_eq!(graph.check_connection("p", "m"), Err(Rejection::Duplicate));
        assert_eq!(graph.check_connection("p", "zz"), Err(Rejection::UnknownNode));
        assert_eq!(graph.check_connection("m", "p"), Ok(()));

        assert_eq!(graph.insert_edge(edge(2, "p", "t")), Ok(()));
        assert_eq!(graph.insert_edge(edge(3, "p", "t")), Err(Rejection::Duplicate));
        assert_eq!(graph.insert_edge(edge(4, "t", "t")), Err(Rejection::SelfLoop));
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.edges()[0].id, 2);
    }

    #[test]
    fn edge_changes_update_flow() {
        let mut graph = sample();
        assert!(graph.flow(1).on);

        graph.insert_edge(edge(2, "m", "t")).unwrap();
        assert!(graph.flow(2).on);

        graph.remove_edge(1);
        assert!(!graph.flow(2).on);
        assert!(graph.remove_edge(1).is_none());
    }

    #[test]
    fn passability_swap_recomputes() {
        let mut graph = sample();
        assert!(graph.flow(1).on);
        graph.set_passability(Box::new(|n: &Node| n.kind != NodeKind::Pump));
        assert!(!graph.flow(1).on);
    }

    #[test]
    fn moving_regroups_locations() {
        let mut pump = node("p", NodeKind::Pump, 0.0, 0.0);
        pump.location_id = Some("L".into());
        let mut graph = Graph::default();
        graph.replace(vec![pump], vec![]);
        assert!(graph.groups()[0].bounds.contains(Point::ORIGIN));

        assert!(graph.move_node("p", Point::new(800.0, 800.0)));
        assert!(!graph.groups()[0].bounds.contains(Point::ORIGIN));
        assert!(!graph.move_node("missing", Point::ORIGIN));
    }

    #[test]
    fn auto_arrange_twice_is_stable() {
        let mut graph = sample();
        graph.auto_arrange();
        let first = graph.positions();
        graph.move_node("t", Point::new(-500.0, 9000.0));
        graph.auto_arrange();
        assert_eq!(first, graph.positions());
    }
}
