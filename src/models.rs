//! Modelos de dominio: nodos del documento de Figma y respuestas de su API REST.
//!
//! Los nodos se deserializan de forma tolerante: cualquier campo puede faltar
//! y los campos desconocidos se ignoran.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tipo de nodo de Figma. Conjunto abierto: lo que no conocemos se conserva tal cual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Document,
    Canvas,
    Frame,
    Section,
    Group,
    Component,
    ComponentSet,
    Instance,
    Text,
    Rectangle,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "DOCUMENT",
            Self::Canvas => "CANVAS",
            Self::Frame => "FRAME",
            Self::Section => "SECTION",
            Self::Group => "GROUP",
            Self::Component => "COMPONENT",
            Self::ComponentSet => "COMPONENT_SET",
            Self::Instance => "INSTANCE",
            Self::Text => "TEXT",
            Self::Rectangle => "RECTANGLE",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for NodeType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "DOCUMENT" => Self::Document,
            "CANVAS" => Self::Canvas,
            "FRAME" => Self::Frame,
            "SECTION" => Self::Section,
            "GROUP" => Self::Group,
            "COMPONENT" => Self::Component,
            "COMPONENT_SET" => Self::ComponentSet,
            "INSTANCE" => Self::Instance,
            "TEXT" => Self::Text,
            "RECTANGLE" => Self::Rectangle,
            _ => Self::Other(raw),
        }
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    #[serde(default)]
    pub r: f64,
    #[serde(default)]
    pub g: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default = "one")]
    pub a: f64,
}

fn one() -> f64 {
    1.0
}

/// Relleno o trazo (SOLID, GRADIENT_*, IMAGE, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    #[serde(rename = "type", default)]
    pub paint_type: String,
    pub visible: Option<bool>,
    pub opacity: Option<f64>,
    pub color: Option<Rgba>,
    #[serde(default)]
    pub gradient_stops: Vec<serde_json::Value>,
    pub image_ref: Option<String>,
    pub scale_mode: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Efecto visual (sombras, desenfoques).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Effect {
    #[serde(rename = "type", default)]
    pub effect_type: String,
    pub visible: Option<bool>,
    pub radius: Option<f64>,
    pub color: Option<Rgba>,
    pub offset: Option<Offset>,
}

/// Nodo del árbol de documento de Figma. Los hijos son propiedad del padre.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    pub visible: Option<bool>,
    #[serde(default)]
    pub children: Vec<DesignNode>,

    #[serde(alias = "boundingBox")]
    pub absolute_bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub fills: Vec<Paint>,
    #[serde(default)]
    pub strokes: Vec<Paint>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    pub corner_radius: Option<f64>,
    pub rectangle_corner_radii: Option<Vec<f64>>,
    pub opacity: Option<f64>,
    pub blend_mode: Option<String>,

    // Auto layout
    pub layout_mode: Option<String>,
    pub primary_axis_sizing_mode: Option<String>,
    pub counter_axis_sizing_mode: Option<String>,
    pub primary_axis_align_items: Option<String>,
    pub counter_axis_align_items: Option<String>,
    pub item_spacing: Option<f64>,
    pub padding_left: Option<f64>,
    pub padding_right: Option<f64>,
    pub padding_top: Option<f64>,
    pub padding_bottom: Option<f64>,
    pub layout_wrap: Option<String>,
    pub counter_axis_spacing: Option<f64>,

    // Sólo en nodos TEXT
    pub characters: Option<String>,
    pub style: Option<serde_json::Value>,
}

impl DesignNode {
    pub fn is_visible(&self) -> bool {
        self.visible != Some(false)
    }

    pub fn is(&self, node_type: &NodeType) -> bool {
        self.node_type.as_ref() == Some(node_type)
    }
}

/// Resultado del triaje: proyección `{id, name, type}` de un nodo seleccionado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestingNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

/// Respuesta de `GET /v1/files/:key`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    #[serde(default)]
    pub name: String,
    pub last_modified: Option<String>,
    pub thumbnail_url: Option<String>,
    pub version: Option<String>,
    pub document: DesignNode,
}

/// Componente publicado en un fichero (`GET /v1/files/:key/components`), normalizado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentDescriptor {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub node_id: String,
    pub thumbnail_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Forma cruda de cada componente tal y como llega de Figma.
#[derive(Debug, Clone, Deserialize)]
pub struct RawComponent {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(alias = "nodeId")]
    pub node_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsMeta {
    #[serde(default)]
    pub components: Vec<RawComponent>,
}

/// Respuesta de `GET /v1/files/:key/components`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsResponse {
    #[serde(default)]
    pub meta: Option<ComponentsMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeEnvelope {
    pub document: Option<DesignNode>,
}

/// Respuesta de `GET /v1/files/:key/nodes?ids=...`. Los ids inexistentes llegan como `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodesResponse {
    #[serde(default)]
    pub nodes: HashMap<String, Option<NodeEnvelope>>,
}
