//! Geometry queries from a point in layout space to whatever sits under it.
//!
//! Nothing here knows about the renderer; the canvas converts screen
//! coordinates to layout coordinates before asking.

use iced::{Point, Rectangle, Size};

use crate::graph::Graph;
use crate::model::{Edge, Node};
use crate::ports::{self, PortRef, PortSide};

/// Ports are small; give the pointer some slack.
pub const PORT_HIT_RADIUS: f32 = 12.0;
/// Half of the invisible stroke around each pipe. The visible pipe is 3 units wide.
pub const EDGE_HIT_HALF_WIDTH: f32 = 8.0;

const CURVE_SAMPLES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    Port(PortRef),
    Node(String),
    Edge(i64),
    Location(String),
    None,
}

/// Topmost target under `point`, in priority order port, node, edge, location.
pub fn hit_test(graph: &Graph, point: Point, side: Option<PortSide>) -> Hit {
    if let Some(port) = port_at(graph, point, side) {
        return Hit::Port(port);
    }
    if let Some(node) = node_at(graph, point) {
        return Hit::Node(node.id.clone());
    }
    if let Some(edge) = edge_at(graph, point) {
        return Hit::Edge(edge);
    }
    if let Some(location) = location_at(graph, point) {
        return Hit::Location(location);
    }
    Hit::None
}

pub fn port_at(graph: &Graph, point: Point, side: Option<PortSide>) -> Option<PortRef> {
    nearest_port(graph, point, side, None)
}

/// Nearest inlet under `point` on any node other than `source`.
pub fn inlet_at(graph: &Graph, point: Point, source: &str) -> Option<PortRef> {
    nearest_port(graph, point, Some(PortSide::In), Some(source))
}

fn nearest_port(
    graph: &Graph,
    point: Point,
    side: Option<PortSide>,
    skip: Option<&str>,
) -> Option<PortRef> {
    let mut best: Option<(f32, PortRef)> = None;
    for node in graph.nodes().filter(|n| skip != Some(n.id.as_str())) {
        let set = ports::ports(node.kind);
        for candidate in [PortSide::In, PortSide::Out] {
            if side.is_some_and(|s| s != candidate) {
                continue;
            }
            for port_id in set.side(candidate) {
                let Some(pos) = ports::port_position(node, port_id) else {
                    continue;
                };
                let dist = point.distance(pos);
                if dist <= PORT_HIT_RADIUS && best.as_ref().is_none_or(|(d, _)| dist < *d) {
                    best = Some((
                        dist,
                        PortRef {
                            node_id: node.id.clone(),
                            side: candidate,
                            port_id: port_id.to_string(),
                        },
                    ));
                }
            }
        }
    }
    best.map(|(_, port)| port)
}

pub fn node_bounds(node: &Node) -> Rectangle {
    let half = ports::half_extent(node.kind);
    Rectangle::new(
        Point::new(node.position.x - half.x, node.position.y - half.y),
        Size::new(half.x * 2.0, half.y * 2.0),
    )
}

/// Later nodes are drawn on top, so they win.
pub fn node_at<'a>(graph: &'a Graph, point: Point) -> Option<&'a Node> {
    graph
        .nodes()
        .filter(|node| node_bounds(node).contains(point))
        .last()
}

pub fn edge_at(graph: &Graph, point: Point) -> Option<i64> {
    graph
        .edges()
        .iter()
        .filter_map(|edge| distance_to_edge(graph, point, edge).map(|d| (d, edge.id)))
        .filter(|(d, _)| *d <= EDGE_HIT_HALF_WIDTH)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id)
}

pub fn location_at(graph: &Graph, point: Point) -> Option<String> {
    graph
        .groups()
        .iter()
        .rev()
        .find(|group| group.bounds.contains(point))
        .map(|group| group.key.clone())
}

/// Endpoints of an edge's pipe, if both nodes exist.
pub fn edge_endpoints(graph: &Graph, edge: &Edge) -> Option<(Point, Point)> {
    let from = graph.node(&edge.a)?;
    let to = graph.node(&edge.b)?;
    Some((
        ports::anchor(from, PortSide::Out, &edge.a_port),
        ports::anchor(to, PortSide::In, &edge.b_port),
    ))
}

/// Control points for the pipe curve between two ports.
pub fn pipe_controls(start: Point, end: Point) -> (Point, Point) {
    let offset = ((end.x - start.x).abs() / 2.0).max(40.0);
    (
        Point::new(start.x + offset, start.y),
        Point::new(end.x - offset, end.y),
    )
}

fn distance_to_edge(graph: &Graph, point: Point, edge: &Edge) -> Option<f32> {
    let (start, end) = edge_endpoints(graph, edge)?;
    let (ctrl1, ctrl2) = pipe_controls(start, end);

    let mut min_dist = f32::MAX;
    let mut previous = start;
    for i in 1..=CURVE_SAMPLES {
        let t = i as f32 / CURVE_SAMPLES as f32;
        let next = cubic_bezier(start, ctrl1, ctrl2, end, t);
        min_dist = min_dist.min(distance_to_segment(point, previous, next));
        previous = next;
    }
    Some(min_dist)
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

pub fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;
    let mt = 1.0 - t;
    let mt2 = mt * mt;
    let mt3 = mt2 * mt;

    Point::new(
        mt3 * p0.x + 3.0 * mt2 * t * p1.x + 3.0 * mt * t2 * p2.x + t3 * p3.x,
        mt3 * p0.y + 3.0 * mt2 * t * p1.y + 3.0 * mt * t2 * p2.y + t3 * p3.y,
    )
}
