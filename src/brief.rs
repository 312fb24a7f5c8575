//! Construcción del "brief": resumen compacto y serializable de un subárbol de
//! Figma, pensado como carga útil del prompt del LLM.
//!
//! Es una transformación pura: no hace llamadas de red y nunca falla.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{DesignNode, Effect, NodeType, Paint, Rgba};

/// Máximo de pinturas (fills/strokes) y efectos por nodo.
pub const MAX_PAINTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Descriptor compacto de una pintura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PaintSummary {
    Solid {
        #[serde(rename = "type")]
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        r: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        g: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        b: Option<f64>,
        a: f64,
    },
    Gradient {
        #[serde(rename = "type")]
        kind: String,
        stops: usize,
    },
    Image {
        #[serde(rename = "type")]
        kind: String,
        #[serde(rename = "imageRef")]
        image_ref: Option<String>,
    },
    Other {
        #[serde(rename = "type")]
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Padding {
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub top: Option<f64>,
    pub bottom: Option<f64>,
}

/// Parámetros de auto layout copiados tal cual (un campo ausente es `null`, no 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoLayout {
    pub layout_mode: String,
    pub primary_axis_sizing_mode: Option<String>,
    pub counter_axis_sizing_mode: Option<String>,
    pub primary_axis_align_items: Option<String>,
    pub counter_axis_align_items: Option<String>,
    pub item_spacing: Option<f64>,
    pub padding: Padding,
    pub wrap: Option<String>,
    pub counter_axis_spacing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextRun {
    pub id: String,
    pub name: String,
    pub characters: String,
    pub style: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChildRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    #[schemars(with = "Option<String>")]
    pub node_type: Option<NodeType>,
}

/// Resumen de un subárbol. Es un valor: no guarda referencias al nodo original.
/// También llega desde el cliente en la generación sin estado, de ahí que las
/// listas sean opcionales al deserializar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    #[schemars(with = "Option<String>")]
    pub node_type: Option<NodeType>,
    pub size: Size,
    pub position: Position,
    pub visible: bool,
    #[serde(default)]
    pub fills: Vec<PaintSummary>,
    #[serde(default)]
    pub strokes: Vec<PaintSummary>,
    pub corner_radius: Option<f64>,
    pub rectangle_corner_radii: Option<Vec<f64>>,
    pub opacity: Option<f64>,
    pub blend_mode: Option<String>,
    #[serde(default)]
    pub effects: Vec<EffectSummary>,
    pub autolayout: Option<AutoLayout>,
    #[serde(default)]
    pub text: Vec<TextRun>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
}

/// Construye el brief de un nodo y su subárbol.
pub fn build_brief(node: &DesignNode) -> Brief {
    let bbox = node.absolute_bounding_box.unwrap_or_default();

    Brief {
        id: node.id.clone(),
        name: node.name.clone(),
        node_type: node.node_type.clone(),
        size: Size {
            width: bbox.width,
            height: bbox.height,
        },
        position: Position {
            x: bbox.x,
            y: bbox.y,
        },
        visible: node.is_visible(),
        fills: summarize_paints(&node.fills),
        strokes: summarize_paints(&node.strokes),
        corner_radius: node.corner_radius,
        rectangle_corner_radii: node.rectangle_corner_radii.clone(),
        opacity: node.opacity,
        blend_mode: node.blend_mode.clone(),
        effects: summarize_effects(&node.effects),
        autolayout: autolayout(node),
        text: collect_text(node),
        children: node
            .children
            .iter()
            .map(|c| ChildRef {
                id: c.id.clone(),
                name: c.name.clone(),
                node_type: c.node_type.clone(),
            })
            .collect(),
    }
}

/// Esquema JSON del brief, publicado para el cliente.
pub fn brief_schema() -> schemars::Schema {
    schemars::schema_for!(Brief)
}

/// Recorre todo el subárbol con una pila y recoge cada nodo TEXT con `characters`.
fn collect_text(root: &DesignNode) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut stack = vec![root];

    while let Some(cur) = stack.pop() {
        if cur.is(&NodeType::Text) {
            if let Some(characters) = &cur.characters {
                runs.push(TextRun {
                    id: cur.id.clone(),
                    name: cur.name.clone(),
                    characters: characters.clone(),
                    style: cur.style.clone(),
                });
            }
        }
        // En orden inverso para que la pila devuelva el orden de documento.
        stack.extend(cur.children.iter().rev());
    }

    runs
}

fn summarize_paints(paints: &[Paint]) -> Vec<PaintSummary> {
    paints.iter().take(MAX_PAINTS).map(summarize_paint).collect()
}

fn summarize_paint(paint: &Paint) -> PaintSummary {
    let kind = paint.paint_type.clone();
    if kind == "SOLID" {
        return PaintSummary::Solid {
            kind,
            r: paint.color.map(|c| c.r),
            g: paint.color.map(|c| c.g),
            b: paint.color.map(|c| c.b),
            a: paint.opacity.unwrap_or(1.0),
        };
    }
    if kind.starts_with("GRADIENT") {
        return PaintSummary::Gradient {
            kind,
            stops: paint.gradient_stops.len(),
        };
    }
    if kind == "IMAGE" {
        return PaintSummary::Image {
            kind,
            image_ref: paint.image_ref.clone(),
        };
    }
    PaintSummary::Other { kind }
}

fn summarize_effects(effects: &[Effect]) -> Vec<EffectSummary> {
    effects
        .iter()
        .filter(|e| e.visible != Some(false))
        .take(MAX_PAINTS)
        .map(|e| {
            let is_shadow = e.effect_type == "DROP_SHADOW" || e.effect_type == "INNER_SHADOW";
            EffectSummary {
                kind: e.effect_type.clone(),
                radius: e.radius.unwrap_or(0.0),
                color: if is_shadow { e.color.map(rgba_to_hex) } else { None },
                offset: if is_shadow {
                    let o = e.offset.unwrap_or_default();
                    Some(Position { x: o.x, y: o.y })
                } else {
                    None
                },
            }
        })
        .collect()
}

fn autolayout(node: &DesignNode) -> Option<AutoLayout> {
    let mode = node.layout_mode.as_deref()?;
    if mode == "NONE" {
        return None;
    }
    Some(AutoLayout {
        layout_mode: mode.to_string(),
        primary_axis_sizing_mode: node.primary_axis_sizing_mode.clone(),
        counter_axis_sizing_mode: node.counter_axis_sizing_mode.clone(),
        primary_axis_align_items: node.primary_axis_align_items.clone(),
        counter_axis_align_items: node.counter_axis_align_items.clone(),
        item_spacing: node.item_spacing,
        padding: Padding {
            left: node.padding_left,
            right: node.padding_right,
            top: node.padding_top,
            bottom: node.padding_bottom,
        },
        wrap: node.layout_wrap.clone(),
        counter_axis_spacing: node.counter_axis_spacing,
    })
}

fn clamp255(x: f64) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}

/// `#RRGGBB` en mayúsculas; el canal alfa se ignora.
pub fn rgba_to_hex(c: Rgba) -> String {
    format!("#{:02X}{:02X}{:02X}", clamp255(c.r), clamp255(c.g), clamp255(c.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> DesignNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_includes_every_text_descendant() {
        let root = node(json!({
            "id": "1", "type": "FRAME",
            "children": [
                {"id": "2", "type": "TEXT", "name": "Title", "characters": "Hola"},
                {"id": "3", "type": "GROUP", "children": [
                    {"id": "4", "type": "GROUP", "children": [
                        {"id": "5", "type": "TEXT", "characters": "", "style": {"fontSize": 12}}
                    ]},
                    {"id": "6", "type": "RECTANGLE"}
                ]},
                {"id": "7", "type": "TEXT", "characters": "Fin"}
            ]
        }));
        let brief = build_brief(&root);
        let ids: Vec<_> = brief.text.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "5", "7"]);
        assert_eq!(brief.text[1].characters, "");
        assert_eq!(brief.text[1].style, Some(json!({"fontSize": 12})));
    }

    #[test]
    fn root_text_node_is_collected_too() {
        let brief = build_brief(&node(json!({"id": "t", "type": "TEXT", "characters": "x"})));
        assert_eq!(brief.text.len(), 1);
    }

    #[test]
    fn children_are_direct_only() {
        let root = node(json!({
            "id": "1", "type": "FRAME",
            "children": [
                {"id": "a", "name": "A", "type": "GROUP", "children": [{"id": "a1", "type": "TEXT", "characters": "deep"}]},
                {"id": "b", "name": "B", "type": "RECTANGLE"}
            ]
        }));
        let brief = build_brief(&root);
        assert_eq!(brief.children.len(), 2);
        assert_eq!(brief.children[0].id, "a");
        assert_eq!(brief.children[1].node_type, Some(NodeType::Rectangle));
    }

    #[test]
    fn fills_are_capped_at_six() {
        let fills: Vec<_> = (0..10)
            .map(|_| json!({"type": "SOLID", "color": {"r": 1.0, "g": 0.5, "b": 0.0, "a": 1.0}}))
            .collect();
        let brief = build_brief(&node(json!({"id": "1", "type": "FRAME", "fills": fills})));
        assert_eq!(brief.fills.len(), 6);
    }

    #[test]
    fn paints_are_summarized_by_type() {
        let brief = build_brief(&node(json!({
            "id": "1", "type": "FRAME",
            "fills": [
                {"type": "SOLID", "color": {"r": 0.1, "g": 0.2, "b": 0.3, "a": 1.0}},
                {"type": "SOLID", "opacity": 0.4, "color": {"r": 0.0, "g": 0.0, "b": 0.0}},
                {"type": "GRADIENT_LINEAR", "gradientStops": [{}, {}, {}]},
                {"type": "IMAGE", "imageRef": "abc"},
                {"type": "IMAGE"},
                {"type": "EMOJI"}
            ],
            "strokes": [{"type": "GRADIENT_RADIAL"}]
        })));
        let fills = serde_json::to_value(&brief.fills).unwrap();
        assert_eq!(
            fills,
            json!([
                {"type": "SOLID", "r": 0.1, "g": 0.2, "b": 0.3, "a": 1.0},
                {"type": "SOLID", "r": 0.0, "g": 0.0, "b": 0.0, "a": 0.4},
                {"type": "GRADIENT_LINEAR", "stops": 3},
                {"type": "IMAGE", "imageRef": "abc"},
                {"type": "IMAGE", "imageRef": null},
                {"type": "EMOJI"}
            ])
        );
        assert_eq!(
            brief.strokes,
            vec![PaintSummary::Gradient {
                kind: "GRADIENT_RADIAL".to_string(),
                stops: 0
            }]
        );
    }

    #[test]
    fn autolayout_is_null_without_layout_mode_or_when_none() {
        let plain = build_brief(&node(json!({"id": "1", "type": "FRAME"})));
        assert!(plain.autolayout.is_none());
        let none = build_brief(&node(json!({"id": "1", "type": "FRAME", "layoutMode": "NONE"})));
        assert!(none.autolayout.is_none());
    }

    #[test]
    fn autolayout_keeps_missing_fields_as_null() {
        let brief = build_brief(&node(json!({
            "id": "1", "type": "FRAME",
            "layoutMode": "VERTICAL",
            "itemSpacing": 0,
            "paddingLeft": 16
        })));
        let layout = serde_json::to_value(brief.autolayout.unwrap()).unwrap();
        assert_eq!(layout["layoutMode"], json!("VERTICAL"));
        assert_eq!(layout["itemSpacing"], json!(0.0));
        assert_eq!(layout["padding"]["left"], json!(16.0));
        assert_eq!(layout["padding"]["right"], json!(null));
        assert_eq!(layout["wrap"], json!(null));
    }

    #[test]
    fn missing_geometry_defaults_to_zero() {
        let brief = build_brief(&node(json!({"id": "1"})));
        assert_eq!(brief.size, Size { width: 0.0, height: 0.0 });
        assert_eq!(brief.position, Position { x: 0.0, y: 0.0 });
        assert!(brief.visible);
        assert!(brief.node_type.is_none());
    }

    #[test]
    fn shadows_carry_hex_color_and_hidden_effects_are_dropped() {
        let brief = build_brief(&node(json!({
            "id": "1", "type": "FRAME",
            "effects": [
                {"type": "DROP_SHADOW", "radius": 4, "color": {"r": 1, "g": 0, "b": 0, "a": 0.5}, "offset": {"x": 0, "y": 2}},
                {"type": "LAYER_BLUR", "radius": 8, "visible": false},
                {"type": "BACKGROUND_BLUR", "radius": 3}
            ]
        })));
        assert_eq!(brief.effects.len(), 2);
        assert_eq!(brief.effects[0].color.as_deref(), Some("#FF0000"));
        assert_eq!(brief.effects[0].offset, Some(Position { x: 0.0, y: 2.0 }));
        assert_eq!(brief.effects[1].color, None);
    }

    #[test]
    fn schema_describes_the_brief() {
        let schema = serde_json::to_value(brief_schema()).unwrap();
        assert!(schema["properties"]["autolayout"].is_object());
        assert!(schema["properties"]["text"].is_object());
    }
}
