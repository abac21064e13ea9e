use iced::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Pump,
    Valve,
    Manifold,
    Tank,
}

impl NodeKind {
    /// Row order used by the packing layout, top to bottom.
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Pump,
        NodeKind::Valve,
        NodeKind::Manifold,
        NodeKind::Tank,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "tank" | "tanque" | "estanque" => Some(NodeKind::Tank),
            "pump" | "bomba" => Some(NodeKind::Pump),
            "valve" | "valvula" | "válvula" => Some(NodeKind::Valve),
            "manifold" | "colector" | "manifol" => Some(NodeKind::Manifold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Tank => "tank",
            NodeKind::Pump => "pump",
            NodeKind::Valve => "valve",
            NodeKind::Manifold => "manifold",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Center of the node in layout units.
    pub position: Point,
    /// `None` when the node has never reported telemetry.
    pub online: Option<bool>,
    pub state: Option<String>,
    pub level_pct: Option<f32>,
    pub location_id: Option<String>,
    pub location_name: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, position: Point) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            position,
            online: None,
            state: None,
            level_pct: None,
            location_id: None,
            location_name: None,
        }
    }

    /// Gauge value for tanks, clamped for display.
    pub fn level_display(&self) -> Option<f32> {
        match self.kind {
            NodeKind::Tank => self.level_pct.map(|l| l.clamp(0.0, 100.0)),
            _ => None,
        }
    }

    /// Grouping key for location panels. Prefers the id, falls back to the name.
    pub fn location_key(&self) -> Option<&str> {
        self.location_id
            .as_deref()
            .or(self.location_name.as_deref())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: i64,
    pub a: String,
    pub b: String,
    pub a_port: String,
    pub b_port: String,
    pub relacion: Option<Value>,
    pub prioridad: Option<Value>,
}

/// A connection the user asked for that the backend has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDraft {
    pub a: String,
    pub b: String,
    pub a_port: String,
    pub b_port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

impl From<&Node> for NodePosition {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            x: node.position.x,
            y: node.position.y,
        }
    }
}

/// Node row as delivered by the backend. Fields are loosely typed on purpose:
/// the normalizer coerces them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, alias = "tipo", alias = "kind")]
    pub r#type: Option<String>,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default)]
    pub x: Option<Value>,
    #[serde(default)]
    pub y: Option<Value>,
    #[serde(default)]
    pub online: Option<Value>,
    #[serde(default, alias = "estado")]
    pub state: Option<Value>,
    #[serde(default, alias = "nivel")]
    pub level_pct: Option<Value>,
    #[serde(default, alias = "ubicacion_id")]
    pub location_id: Option<Value>,
    #[serde(default, alias = "ubicacion_nombre")]
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEdge {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, alias = "origen", alias = "source")]
    pub a: Option<Value>,
    #[serde(default, alias = "destino", alias = "target")]
    pub b: Option<Value>,
    #[serde(default)]
    pub a_port: Option<String>,
    #[serde(default)]
    pub b_port: Option<String>,
    #[serde(default)]
    pub relacion: Option<Value>,
    #[serde(default)]
    pub prioridad: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}
