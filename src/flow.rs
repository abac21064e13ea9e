use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use crate::model::{Edge, Node, NodeKind};

static PUMP_RUNNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(run|running|on|1|true)\s*$").expect("static pattern")
});

static VALVE_CLOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(closed|close|cerrada|cerrado|0|false|off)\s*$").expect("static pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow {
    pub on: bool,
    /// Always 1: flow follows the edge direction.
    pub dir: i8,
    pub strength: u8,
}

impl Flow {
    const IDLE: Flow = Flow {
        on: false,
        dir: 1,
        strength: 0,
    };
    const FLOWING: Flow = Flow {
        on: true,
        dir: 1,
        strength: 1,
    };
}

/// Decides whether flow may continue through a node.
pub trait Passability {
    fn is_passable(&self, node: &Node) -> bool;
}

impl<F: Fn(&Node) -> bool> Passability for F {
    fn is_passable(&self, node: &Node) -> bool {
        self(node)
    }
}

/// Blocks nodes that explicitly report offline. Unknown telemetry passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineOnly;

impl Passability for OnlineOnly {
    fn is_passable(&self, node: &Node) -> bool {
        node.online != Some(false)
    }
}

/// [`OnlineOnly`] plus closed valves cut the flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValveGated;

impl Passability for ValveGated {
    fn is_passable(&self, node: &Node) -> bool {
        if !OnlineOnly.is_passable(node) {
            return false;
        }
        match (node.kind, node.state.as_deref()) {
            (NodeKind::Valve, Some(state)) => !VALVE_CLOSED.is_match(state),
            _ => true,
        }
    }
}

pub fn is_running_pump(node: &Node) -> bool {
    node.kind == NodeKind::Pump
        && node
            .state
            .as_deref()
            .is_some_and(|state| PUMP_RUNNING.is_match(state))
}

/// Mark every edge whose source is reachable from a running pump.
///
/// The result is aligned with `edges`. Seeds and every node entered during the
/// walk must satisfy `passable`; edges leaving a reached node flow even when
/// their destination is blocked.
pub fn simulate(
    edges: &[Edge],
    nodes: &HashMap<String, Node>,
    passable: &dyn Passability,
) -> Vec<Flow> {
    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, edge) in edges.iter().enumerate() {
        adjacency.entry(edge.a.as_str()).or_default().push(index);
    }

    let mut flows = vec![Flow::IDLE; edges.len()];
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    let mut seeds: Vec<&Node> = nodes
        .values()
        .filter(|n| is_running_pump(n) && passable.is_passable(n))
        .collect();
    seeds.sort_by(|a, b| a.id.cmp(&b.id));
    for seed in seeds {
        if visited.insert(seed.id.as_str()) {
            queue.push_back(seed.id.as_str());
        }
    }

    while let Some(current) = queue.pop_front() {
        let Some(outgoing) = adjacency.get(current) else {
            continue;
        };
        for &index in outgoing {
            flows[index] = Flow::FLOWING;
            let target = edges[index].b.as_str();
            if visited.contains(target) {
                continue;
            }
            if let Some(node) = nodes.get(target) {
                if passable.is_passable(node) {
                    visited.insert(node.id.as_str());
                    queue.push_back(node.id.as_str());
                }
            }
        }
    }

    flows
}

/// Flow results keyed by edge id, recomputed only when something that can
/// change reachability changes.
#[derive(Debug, Default)]
pub struct FlowState {
    signature: Option<u64>,
    flows: HashMap<i64, Flow>,
}

impl FlowState {
    pub fn get(&self, edge_id: i64) -> Flow {
        self.flows.get(&edge_id).copied().unwrap_or(Flow::IDLE)
    }

    /// Returns `true` when the simulation actually ran.
    pub fn refresh(
        &mut self,
        edges: &[Edge],
        nodes: &HashMap<String, Node>,
        passable: &dyn Passability,
    ) -> bool {
        let signature = signature(edges, nodes);
        if self.signature == Some(signature) {
            return false;
        }

        let flows = simulate(edges, nodes, passable);
        self.flows = edges.iter().map(|e| e.id).zip(flows).collect();
        self.signature = Some(signature);
        tracing::debug!(
            edges = edges.len(),
            flowing = self.flows.values().filter(|f| f.on).count(),
            "flow recomputed"
        );
        true
    }

    pub fn invalidate(&mut self) {
        self.signature = None;
    }
}

/// Hash of everything the simulation reads. Positions are deliberately absent.
fn signature(edges: &[Edge], nodes: &HashMap<String, Node>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for edge in edges {
        (edge.id, &edge.a, &edge.b).hash(&mut hasher);
    }
    let mut ids: Vec<&String> = nodes.keys().collect();
    ids.sort_unstable();
    for id in ids {
        let node = &nodes[id];
        (id, node.kind, node.online, &node.state).hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced::Point;

    fn node(id: &str, kind: NodeKind, online: Option<bool>, state: Option<&str>) -> Node {
        let mut n = Node::new(id, kind, Point::ORIGIN);
        n.online = online;
        n.state = state.map(str::to_string);
        n
    }

    fn edge(id: i64, a: &str, b: &str) -> Edge {
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

    fn by_id(nodes: Vec<Node>) -> HashMap<String, Node> {
        nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
    }

    fn chain(pump_online: bool) -> (Vec<Edge>, HashMap<String, Node>) {
        let nodes = by_id(vec![
            node("p", NodeKind::Pump, Some(pump_online), Some("run")),
            node("m", NodeKind::Manifold, Some(true), None),
            node("t", NodeKind::Tank, Some(true), None),
        ]);
        (vec![edge(1, "p", "m"), edge(2, "m", "t")], nodes)
    }

    #[test]
    fn running_pump_feeds_the_chain() {
        let (edges, nodes) = chain(true);
        let flows = simulate(&edges, &nodes, &OnlineOnly);
        assert!(flows.iter().all(|f| f.on && f.strength == 1 && f.dir == 1));
    }

    #[test]
    fn offline_pump_is_not_a_seed() {
        let (edges, nodes) = chain(false);
        let flows = simulate(&edges, &nodes, &OnlineOnly);
        assert!(flows.iter().all(|f| !f.on && f.strength == 0));
    }

    #[test]
    fn pump_state_vocabulary() {
        for state in ["run", "RUNNING", " On ", "1", "True"] {
            assert!(is_running_pump(&node("p", NodeKind::Pump, None, Some(state))), "{state}");
        }
        for state in ["stop", "off", "0", "runs", ""] {
            assert!(!is_running_pump(&node("p", NodeKind::Pump, None, Some(state))), "{state}");
        }
        assert!(!is_running_pump(&node("v", NodeKind::Valve, None, Some("on"))));
    }

    #[test]
    fn offline_node_blocks_downstream_but_its_inlet_flows() {
        let nodes = by_id(vec![
            node("p", NodeKind::Pump, Some(true), Some("on")),
            node("m", NodeKind::Manifold, Some(false), None),
            node("t", NodeKind::Tank, None, None),
        ]);
        let edges = vec![edge(1, "p", "m"), edge(2, "m", "t")];
        let flows = simulate(&edges, &nodes, &OnlineOnly);
        assert!(flows[0].on);
        assert!(!flows[1].on);
    }

    #[test]
    fn flow_follows_direction_only() {
        let nodes = by_id(vec![
            node("p", NodeKind::Pump, Some(true), Some("run")),
            node("t1", NodeKind::Tank, Some(true), None),
            node("t2", NodeKind::Tank, Some(true), None),
        ]);
        // t2 -> p points into the pump, nothing reaches t2.
        let edges = vec![edge(1, "p", "t1"), edge(2, "t2", "p")];
        let flows = simulate(&edges, &nodes, &OnlineOnly);
        assert!(flows[0].on);
        assert!(!flows[1].on);
    }

    #[test]
    fn cycles_terminate_and_mark_every_edge() {
        let nodes = by_id(vec![
            node("p", NodeKind::Pump, Some(true), Some("run")),
            node("a", NodeKind::Manifold, None, None),
            node("b", NodeKind::Manifold, None, None),
        ]);
        let edges = vec![edge(1, "p", "a"), edge(2, "a", "b"), edge(3, "b", "a")];
        let flows = simulate(&edges, &nodes, &OnlineOnly);
        assert!(flows.iter().all(|f| f.on));
    }

    #[test]
    fn valve_gating_is_opt_in() {
        let nodes = by_id(vec![
            node("p", NodeKind::Pump, Some(true), Some("run")),
            node("v", NodeKind::Valve, Some(true), Some("closed")),
            node("t", NodeKind::Tank, Some(true), None),
        ]);
        let edges = vec![edge(1, "p", "v"), edge(2, "v", "t")];

        let ungated = simulate(&edges, &nodes, &OnlineOnly);
        assert!(ungated[1].on);

        let gated = simulate(&edges, &nodes, &ValveGated);
        assert!(gated[0].on);
        assert!(!gated[1].on);

        let never = |_: &Node| false;
        assert!(simulate(&edges, &nodes, &never).iter().all(|f| !f.on));
    }

    #[test]
    fn state_skips_recompute_on_moves() {
        let (edges, mut nodes) = chain(true);
        let mut state = FlowState::default();
        assert!(state.refresh(&edges, &nodes, &OnlineOnly));
        assert!(state.get(2).on);

        if let Some(tank) = nodes.get_mut("t") {
            tank.position = Point::new(400.0, 400.0);
        }
        assert!(!state.refresh(&edges, &nodes, &OnlineOnly));

        if let Some(pump) = nodes.get_mut("p") {
            pump.state = Some("stop".into());
        }
        assert!(state.refresh(&edges, &nodes, &OnlineOnly));
        assert!(!state.get(1).on);
        assert!(!state.get(99).on);
    }
}
