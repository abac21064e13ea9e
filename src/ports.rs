use iced::{Point, Vector};

use crate::model::{Node, NodeKind};

/// Fraction of the node height that side ports are spread across.
const PORT_SPREAD: f32 = 0.6;

pub const PORT_RADIUS: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSide {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node_id: String,
    pub side: PortSide,
    pub port_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSet {
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

impl PortSet {
    pub fn side(&self, side: PortSide) -> &'static [&'static str] {
        match side {
            PortSide::In => self.inputs,
            PortSide::Out => self.outputs,
        }
    }

    pub fn side_of(&self, port_id: &str) -> Option<PortSide> {
        if self.inputs.contains(&port_id) {
            Some(PortSide::In)
        } else if self.outputs.contains(&port_id) {
            Some(PortSide::Out)
        } else {
            None
        }
    }
}

pub fn ports(kind: NodeKind) -> PortSet {
    match kind {
        NodeKind::Tank => PortSet {
            inputs: &["in_1", "in_2", "in_top"],
            outputs: &["out_1", "out_2", "out_bottom"],
        },
        NodeKind::Pump | NodeKind::Valve => PortSet {
            inputs: &["in"],
            outputs: &["out"],
        },
        NodeKind::Manifold => PortSet {
            inputs: &["in"],
            outputs: &["out_1", "out_2", "out_3", "out_4"],
        },
    }
}

/// Half width and half height of the node body.
pub fn half_extent(kind: NodeKind) -> Vector {
    match kind {
        NodeKind::Tank => Vector::new(40.0, 50.0),
        NodeKind::Pump => Vector::new(26.0, 26.0),
        NodeKind::Valve => Vector::new(22.0, 18.0),
        NodeKind::Manifold => Vector::new(60.0, 22.0),
    }
}

pub fn canonical_port(kind: NodeKind, side: PortSide) -> &'static str {
    // Every kind declares at least one port per side.
    ports(kind).side(side)[0]
}

/// Offset of a port from the node center, or `None` if the kind has no such port.
pub fn port_offset(kind: NodeKind, port_id: &str) -> Option<Vector> {
    let half = half_extent(kind);
    match port_id {
        "in_top" if kind == NodeKind::Tank => return Some(Vector::new(0.0, -half.y)),
        "out_bottom" if kind == NodeKind::Tank => return Some(Vector::new(0.0, half.y)),
        _ => {}
    }

    let set = ports(kind);
    let side = set.side_of(port_id)?;
    let spread: Vec<&str> = set
        .side(side)
        .iter()
        .copied()
        .filter(|p| !matches!(*p, "in_top" | "out_bottom"))
        .collect();
    let index = spread.iter().position(|p| *p == port_id)?;

    let x = match side {
        PortSide::In => -half.x,
        PortSide::Out => half.x,
    };
    Some(Vector::new(x, spread_offset(index, spread.len(), half.y * 2.0)))
}

fn spread_offset(index: usize, count: usize, height: f32) -> f32 {
    if count <= 1 {
        return 0.0;
    }
    let span = height * PORT_SPREAD;
    -span / 2.0 + span * index as f32 / (count - 1) as f32
}

pub fn port_position(node: &Node, port_id: &str) -> Option<Point> {
    port_offset(node.kind, port_id).map(|offset| node.position + offset)
}

/// Like [`port_position`], falling back to the canonical port of `side` for ids
/// the node kind does not declare.
pub fn anchor(node: &Node, side: PortSide, port_id: &str) -> Point {
    port_position(node, port_id).unwrap_or_else(|| {
        let fallback = canonical_port(node.kind, side);
        port_position(node, fallback).unwrap_or(node.position)
    })
}
