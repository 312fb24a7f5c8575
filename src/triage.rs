//! Triaje del árbol de documento: elige qué nodos merece la pena convertir en código.
//!
//! Las páginas (`CANVAS`) son raíces de recorrido, nunca candidatas.
//! Se seleccionan:
//!   - `COMPONENT` y `COMPONENT_SET` a cualquier profundidad;
//!   - `FRAME` y `SECTION` sólo cuando son hijos directos de una página.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{DesignNode, InterestingNode, NodeType};

/// Tope por defecto de nodos devueltos por el triaje.
pub const DEFAULT_MAX_NODES: usize = 300;

/// Recorre el documento en profundidad (orden de documento) y devuelve los nodos
/// interesantes, sin duplicados y como mucho `max_nodes`.
pub fn select_interesting_nodes(root: &DesignNode, max_nodes: usize) -> Vec<InterestingNode> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for page in pages(root) {
        if !page.is_visible() {
            continue;
        }
        for child in &page.children {
            visit(child, 1, &mut seen, &mut out, max_nodes);
            if out.len() >= max_nodes {
                return out;
            }
        }
    }

    out
}

fn pages(root: &DesignNode) -> Vec<&DesignNode> {
    if root.is(&NodeType::Canvas) {
        return vec![root];
    }
    root.children
        .iter()
        .filter(|n| n.is(&NodeType::Canvas))
        .collect()
}

fn visit(
    node: &DesignNode,
    depth: usize,
    seen: &mut HashSet<String>,
    out: &mut Vec<InterestingNode>,
    max_nodes: usize,
) {
    if out.len() >= max_nodes || !node.is_visible() {
        return;
    }

    if let Some(node_type) = &node.node_type {
        if is_candidate(node_type, depth) && seen.insert(node.id.clone()) {
            out.push(InterestingNode {
                id: node.id.clone(),
                name: node.name.clone(),
                node_type: node_type.clone(),
            });
        }
    }

    for child in &node.children {
        visit(child, depth + 1, seen, out, max_nodes);
    }
}

fn is_candidate(node_type: &NodeType, depth: usize) -> bool {
    match node_type {
        NodeType::Component | NodeType::ComponentSet => true,
        NodeType::Frame | NodeType::Section => depth == 1,
        _ => false,
    }
}

/// Frame listado por página, con la URL para abrirlo en Figma.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    pub id: String,
    pub id_dash: String,
    pub name: String,
    pub page: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub w: Option<f64>,
    pub h: Option<f64>,
    pub url: String,
}

/// Lista todos los `FRAME` de todas las páginas, a cualquier profundidad.
pub fn list_frames(root: &DesignNode, file_key: &str) -> Vec<FrameSummary> {
    let mut out = Vec::new();
    for page in pages(root) {
        let page_name = if page.name.is_empty() {
            "Untitled"
        } else {
            page.name.as_str()
        };
        // Pila con los hijos en orden inverso para salir en orden de documento.
        let mut stack: Vec<&DesignNode> = page.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.is(&NodeType::Frame) {
                let id_dash = node.id.replace(':', "-");
                out.push(FrameSummary {
                    url: format!("https://www.figma.com/design/{file_key}/?node-id={id_dash}"),
                    id: node.id.clone(),
                    id_dash,
                    name: node.name.clone(),
                    page: page_name.to_string(),
                    node_type: NodeType::Frame,
                    w: node.absolute_bounding_box.map(|b| b.width),
                    h: node.absolute_bounding_box.map(|b| b.height),
                });
            }
            stack.extend(node.children.iter().rev());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> DesignNode {
        serde_json::from_value(value).unwrap()
    }

    fn ids(nodes: &[InterestingNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn empty_document_yields_nothing() {
        let root = doc(json!({"id": "0:0", "type": "DOCUMENT"}));
        assert!(select_interesting_nodes(&root, DEFAULT_MAX_NODES).is_empty());
    }

    #[test]
    fn only_top_level_frames_are_selected() {
        let root = doc(json!({
            "id": "0:0", "type": "DOCUMENT",
            "children": [{
                "id": "0:1", "type": "CANVAS", "name": "Page 1",
                "children": [{
                    "id": "1:1", "type": "FRAME", "name": "Screen",
                    "children": [{
                        "id": "1:2", "type": "GROUP",
                        "children": [{"id": "1:3", "type": "FRAME", "name": "Nested"}]
                    }]
                }]
            }]
        }));
        let picked = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        assert_eq!(ids(&picked), vec!["1:1"]);
        assert_eq!(picked[0].node_type, NodeType::Frame);
    }

    #[test]
    fn components_are_selected_at_any_depth_in_document_order() {
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [{
                "type": "CANVAS",
                "children": [
                    {"id": "a", "type": "SECTION", "children": [
                        {"id": "b", "type": "FRAME", "children": [
                            {"id": "c", "type": "COMPONENT_SET", "children": [
                                {"id": "d", "type": "COMPONENT"}
                            ]}
                        ]}
                    ]},
                    {"id": "e", "type": "COMPONENT"}
                ]
            }]
        }));
        let picked = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        assert_eq!(ids(&picked), vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn invisible_nodes_hide_their_whole_subtree() {
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [{
                "type": "CANVAS",
                "children": [
                    {"id": "hidden", "type": "FRAME", "visible": false, "children": [
                        {"id": "inner", "type": "COMPONENT"}
                    ]},
                    {"id": "group", "type": "GROUP", "children": [
                        {"id": "ghost", "type": "INSTANCE", "visible": false, "children": [
                            {"id": "deep", "type": "COMPONENT"}
                        ]},
                        {"id": "shown", "type": "COMPONENT"}
                    ]}
                ]
            }]
        }));
        let picked = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        assert_eq!(ids(&picked), vec!["shown"]);
    }

    #[test]
    fn untyped_nodes_are_skipped_but_walked() {
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [{
                "type": "CANVAS",
                "children": [{"id": "x", "children": [{"id": "y", "type": "COMPONENT"}]}]
            }]
        }));
        assert_eq!(ids(&select_interesting_nodes(&root, 10)), vec!["y"]);
    }

    #[test]
    fn duplicates_are_removed_and_cap_is_enforced() {
        let children: Vec<_> = (0..20)
            .map(|i| json!({"id": format!("c{}", i % 5), "type": "COMPONENT"}))
            .collect();
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [{"type": "CANVAS", "children": children}]
        }));
        let all = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        assert_eq!(ids(&all), vec!["c0", "c1", "c2", "c3", "c4"]);

        let capped = select_interesting_nodes(&root, 3);
        assert_eq!(ids(&capped), vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn triage_is_deterministic() {
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [
                {"type": "CANVAS", "children": [
                    {"id": "1", "type": "FRAME"},
                    {"id": "2", "type": "COMPONENT", "children": [{"id": "3", "type": "COMPONENT"}]}
                ]},
                {"type": "CANVAS", "children": [{"id": "4", "type": "SECTION"}]}
            ]
        }));
        let first = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        let second = select_interesting_nodes(&root, DEFAULT_MAX_NODES);
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn frames_are_listed_with_page_and_url() {
        let root = doc(json!({
            "type": "DOCUMENT",
            "children": [{
                "type": "CANVAS", "name": "Mobile",
                "children": [{
                    "id": "12:345", "type": "FRAME", "name": "Login",
                    "absoluteBoundingBox": {"x": 0, "y": 0, "width": 360, "height": 800},
                    "children": [{"id": "12:346", "type": "FRAME", "name": "Card"}]
                }]
            }]
        }));
        let frames = list_frames(&root, "KEY123");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id_dash, "12-345");
        assert_eq!(frames[0].page, "Mobile");
        assert_eq!(frames[0].w, Some(360.0));
        assert_eq!(
            frames[0].url,
            "https://www.figma.com/design/KEY123/?node-id=12-345"
        );
        assert_eq!(frames[1].name, "Card");
    }
}
