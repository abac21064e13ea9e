use iced::Point;
use serde_json::Value;
use std::collections::HashMap;

use crate::layout;
use crate::model::{Edge, Node, NodeKind, NodePosition, RawEdge, RawNode};
use crate::ports::{self, PortSide};

/// Turn backend rows into the in-memory graph.
///
/// Rows without a usable id (or, for nodes, kind) are dropped. Nodes the
/// backend never placed are packed into their kind's row, and any entry in
/// `cached` with finite coordinates overrides whatever position was chosen.
pub fn normalize(
    raw_nodes: &[RawNode],
    raw_edges: &[RawEdge],
    cached: &[NodePosition],
) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::with_capacity(raw_nodes.len());
    let mut placed = Vec::with_capacity(raw_nodes.len());
    for raw in raw_nodes {
        match node_from_raw(raw) {
            Some((node, has_position)) => {
                nodes.push(node);
                placed.push(has_position);
            }
            None => tracing::debug!(id = ?raw.id, "dropping malformed node row"),
        }
    }

    apply_fallback_layout(&mut nodes, &placed);
    apply_cached_layout(&mut nodes, cached);

    let kinds: HashMap<&str, NodeKind> = nodes.iter().map(|n| (n.id.as_str(), n.kind)).collect();
    let edges = raw_edges
        .iter()
        .filter_map(|raw| {
            let edge = edge_from_raw(raw, |id| kinds.get(id).copied());
            if edge.is_none() {
                tracing::debug!(id = ?raw.id, "dropping malformed edge row");
            }
            edge
        })
        .collect();

    (nodes, edges)
}

/// Returns the node and whether the backend supplied a usable position.
fn node_from_raw(raw: &RawNode) -> Option<(Node, bool)> {
    let id = raw.id.as_ref().and_then(as_id)?;
    let kind = raw.r#type.as_deref().and_then(NodeKind::parse)?;

    let x = raw.x.as_ref().and_then(as_f64);
    let y = raw.y.as_ref().and_then(as_f64);
    let (position, has_position) = match (x, y) {
        (Some(x), Some(y)) if layout::is_placed(x) && layout::is_placed(y) => {
            (Point::new(x as f32, y as f32), true)
        }
        _ => (Point::ORIGIN, false),
    };

    let node = Node {
        name: raw
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.clone()),
        id,
        kind,
        position,
        online: raw.online.as_ref().and_then(as_bool),
        state: raw.state.as_ref().and_then(as_id),
        level_pct: raw.level_pct.as_ref().and_then(as_f64).map(|l| l as f32),
        location_id: raw.location_id.as_ref().and_then(as_id),
        location_name: raw.location_name.clone().filter(|n| !n.trim().is_empty()),
    };
    Some((node, has_position))
}

/// Map one edge row, resolving default ports from the endpoint kinds.
pub fn edge_from_raw(raw: &RawEdge, kind_of: impl Fn(&str) -> Option<NodeKind>) -> Option<Edge> {
    let id = raw.id.as_ref().and_then(as_i64)?;
    let a = raw.a.as_ref().and_then(as_id)?;
    let b = raw.b.as_ref().and_then(as_id)?;

    let a_port = raw
        .a_port
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| kind_of(&a).map(|k| ports::canonical_port(k, PortSide::Out).to_string()))
        .unwrap_or_else(|| "out".to_string());
    let b_port = raw
        .b_port
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| kind_of(&b).map(|k| ports::canonical_port(k, PortSide::In).to_string()))
        .unwrap_or_else(|| "in".to_string());

    Some(Edge {
        id,
        a,
        b,
        a_port,
        b_port,
        relacion: raw.relacion.clone(),
        prioridad: raw.prioridad.clone(),
    })
}

fn apply_fallback_layout(nodes: &mut [Node], placed: &[bool]) {
    let mut seen: HashMap<NodeKind, usize> = HashMap::new();
    for (node, &has_position) in nodes.iter_mut().zip(placed) {
        let index = seen.entry(node.kind).or_insert(0);
        if !has_position {
            node.position = layout::packed_position(node.kind, *index);
        }
        *index += 1;
    }
}

fn apply_cached_layout(nodes: &mut [Node], cached: &[NodePosition]) {
    let overrides: HashMap<&str, Point> = cached
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| (p.id.as_str(), Point::new(p.x, p.y)))
        .collect();
    for node in nodes {
        if let Some(&position) = overrides.get(node.id.as_str()) {
            node.position = position;
        }
    }
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "online" => Some(true),
            "false" | "0" | "no" | "offline" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
