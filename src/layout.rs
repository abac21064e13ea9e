use iced::{Point, Rectangle, Size};
use std::collections::BTreeMap;

use crate::model::{Node, NodeKind};
use crate::ports;

const GRID_SPACING_X: f32 = 160.0;
const INITIAL_X: f32 = 80.0;

// Row positions for the different node kinds
const PUMP_Y: f32 = 80.0;
const VALVE_Y: f32 = 240.0;
const MANIFOLD_Y: f32 = 400.0;
const TANK_Y: f32 = 580.0;

/// Viewport used when there is nothing to frame.
pub const DEFAULT_VIEWPORT: BBox = BBox {
    min_x: 0.0,
    min_y: 0.0,
    w: 1000.0,
    h: 700.0,
};

const LOCATION_PADDING: f32 = 24.0;

fn row_y(kind: NodeKind) -> f32 {
    match kind {
        NodeKind::Pump => PUMP_Y,
        NodeKind::Valve => VALVE_Y,
        NodeKind::Manifold => MANIFOLD_Y,
        NodeKind::Tank => TANK_Y,
    }
}

/// Slot `index` of the row reserved for `kind`.
pub fn packed_position(kind: NodeKind, index: usize) -> Point {
    Point::new(INITIAL_X + index as f32 * GRID_SPACING_X, row_y(kind))
}

/// Coordinates at or below 1 in magnitude are treated as "never placed".
pub fn is_placed(value: f64) -> bool {
    value.is_finite() && value.abs() > 1.0
}

/// Arrange every node into its kind's row, ordered by id.
///
/// Prior positions are ignored, so the result only depends on the node set.
pub fn auto_layout(nodes: &[Node]) -> Vec<Node> {
    let mut by_kind: BTreeMap<NodeKind, Vec<&str>> = BTreeMap::new();
    for node in nodes {
        by_kind.entry(node.kind).or_default().push(&node.id);
    }
    for ids in by_kind.values_mut() {
        ids.sort_unstable();
    }

    nodes
        .iter()
        .map(|node| {
            let index = by_kind
                .get(&node.kind)
                .and_then(|ids| ids.iter().position(|id| *id == node.id))
                .unwrap_or(0);
            Node {
                position: packed_position(node.kind, index),
                ..node.clone()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f32,
    pub min_y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBoxLimits {
    pub max_width: f32,
    pub max_height: f32,
}

impl Default for BBoxLimits {
    fn default() -> Self {
        Self {
            max_width: 4000.0,
            max_height: 3000.0,
        }
    }
}

/// Bounding box of all node centers, padded on every side and capped to `limits`.
pub fn compute_bbox(nodes: &[Node], padding: f32, limits: BBoxLimits) -> BBox {
    let mut points = nodes
        .iter()
        .map(|n| n.position)
        .filter(|p| p.x.is_finite() && p.y.is_finite());

    let Some(first) = points.next() else {
        return DEFAULT_VIEWPORT;
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let min_x = min_x - padding;
    let min_y = min_y - padding;
    let w = (max_x - min_x + padding).max(1.0);
    let h = (max_y - min_y + padding).max(1.0);

    BBox {
        min_x,
        min_y,
        w: w.min(limits.max_width.max(1.0)),
        h: h.min(limits.max_height.max(1.0)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationGroup {
    pub key: String,
    pub name: String,
    pub bounds: Rectangle,
    pub members: Vec<String>,
}

/// Background panel per location, covering the bodies of its member nodes.
pub fn location_groups(nodes: &[Node]) -> Vec<LocationGroup> {
    let mut groups: BTreeMap<String, LocationGroup> = BTreeMap::new();

    for node in nodes {
        let Some(key) = node.location_key() else {
            continue;
        };
        let half = ports::half_extent(node.kind);
        let body = Rectangle::new(
            Point::new(node.position.x - half.x, node.position.y - half.y),
            Size::new(half.x * 2.0, half.y * 2.0),
        );

        groups
            .entry(key.to_string())
            .and_modify(|group| {
                group.bounds = union(group.bounds, body);
                group.members.push(node.id.clone());
            })
            .or_insert_with(|| LocationGroup {
                key: key.to_string(),
                name: node
                    .location_name
                    .clone()
                    .unwrap_or_else(|| key.to_string()),
                bounds: body,
                members: vec![node.id.clone()],
            });
    }

    groups
        .into_values()
        .map(|mut group| {
            group.bounds = expand(group.bounds, LOCATION_PADDING);
            group
        })
        .collect()
}

fn union(a: Rectangle, b: Rectangle) -> Rectangle {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = (a.x + a.width).max(b.x + b.width);
    let bottom = (a.y + a.height).max(b.y + b.height);
    Rectangle::new(Point::new(x, y), Size::new(right - x, bottom - y))
}

fn expand(rect: Rectangle, by: f32) -> Rectangle {
    Rectangle::new(
        Point::new(rect.x - by, rect.y - by),
        Size::new(rect.width + by * 2.0, rect.height + by * 2.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind, x: f32, y: f32) -> Node {
        Node::new(id, kind, Point::new(x, y))
    }

    #[test]
    fn auto_layout_is_deterministic() {
        let nodes = vec![
            node("t2", NodeKind::Tank, 5.0, 9.0),
            node("p1", NodeKind::Pump, 900.0, 10.0),
            node("t1", NodeKind::Tank, -40.0, 3.0),
            node("t3", NodeKind::Tank, 0.0, 0.0),
        ];
        let first = auto_layout(&nodes);
        let second = auto_layout(&first);
        assert_eq!(first, second);

        // Input order is kept, slots follow id order within the kind.
        assert_eq!(first[0].id, "t2");
        assert_eq!(first[0].position, packed_position(NodeKind::Tank, 1));
        assert_eq!(first[2].position, packed_position(NodeKind::Tank, 0));
        assert_eq!(first[1].position, packed_position(NodeKind::Pump, 0));
    }

    #[test]
    fn bbox_pads_and_clamps() {
        let nodes = vec![
            node("a", NodeKind::Pump, 100.0, 100.0),
            node("b", NodeKind::Tank, 300.0, 200.0),
        ];
        let bbox = compute_bbox(&nodes, 50.0, BBoxLimits::default());
        assert_eq!(
            bbox,
            BBox {
                min_x: 50.0,
                min_y: 50.0,
                w: 300.0,
                h: 200.0
            }
        );

        let far = vec![
            node("a", NodeKind::Pump, 0.0, 0.0),
            node("b", NodeKind::Pump, 1.0e9, -1.0e9),
        ];
        let limits = BBoxLimits {
            max_width: 2000.0,
            max_height: 1500.0,
        };
        let clamped = compute_bbox(&far, 10.0, limits);
        assert_eq!(clamped.min_x, -10.0);
        assert!(clamped.w <= 2000.0);
        assert!(clamped.h <= 1500.0);
    }

    #[test]
    fn bbox_degenerate_inputs() {
        assert_eq!(
            compute_bbox(&[], 40.0, BBoxLimits::default()),
            DEFAULT_VIEWPORT
        );
        let single = compute_bbox(
            &[node("a", NodeKind::Valve, 10.0, 10.0)],
            0.0,
            BBoxLimits::default(),
        );
        assert!(single.w >= 1.0 && single.h >= 1.0);
    }

    #[test]
    fn groups_cover_members() {
        let mut a = node("a", NodeKind::Pump, 100.0, 100.0);
        let mut b = node("b", NodeKind::Tank, 400.0, 300.0);
        let c = node("c", NodeKind::Valve, 900.0, 900.0);
        a.location_id = Some("L1".into());
        a.location_name = Some("North".into());
        b.location_id = Some("L1".into());

        let groups = location_groups(&[a.clone(), b.clone(), c]);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.name, "North");
        assert_eq!(group.members, vec!["a".to_string(), "b".to_string()]);
        assert!(group.bounds.contains(a.position));
        assert!(group.bounds.contains(b.position));
        assert!(!group.bounds.contains(Point::new(900.0, 900.0)));
    }
}
