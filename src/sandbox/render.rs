//! Árbol de render: conversión del valor devuelto por el componente a un árbol
//! Rust serializable, y de ese árbol a HTML estático.

use boa_engine::{JsObject, JsValue};
use serde::Serialize;
use serde_json::{Map, Value};

use super::runtime::Runtime;

/// Profundidad máxima de anidamiento (elementos + componentes expandidos).
pub const MAX_RENDER_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RenderNode {
    Element {
        tag: String,
        props: Map<String, Value>,
        children: Vec<RenderNode>,
    },
    Text {
        text: String,
    },
    Fragment {
        children: Vec<RenderNode>,
    },
    Empty,
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Etiquetas que nunca se emiten en la previsualización.
const BLOCKED_TAGS: &[&str] = &["script", "iframe", "object", "embed", "base", "meta", "link"];

/// Atributos cuyo valor el navegador interpreta como URL.
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "srcset",
    "action",
    "formaction",
    "xlink:href",
    "poster",
    "background",
    "cite",
    "data",
    "ping",
    "manifest",
    "codebase",
];

/// Esquemas que ejecutan código al navegar.
const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:text/html"];

/// Propiedades CSS numéricas que no llevan `px`.
const UNITLESS: &[&str] = &[
    "opacity",
    "zIndex",
    "fontWeight",
    "lineHeight",
    "flex",
    "flexGrow",
    "flexShrink",
    "order",
    "zoom",
    "aspectRatio",
    "gridRow",
    "gridColumn",
];

pub(crate) fn to_render_tree(rt: &mut Runtime, value: &JsValue) -> Result<RenderNode, String> {
    convert(rt, value, 0)
}

fn convert(rt: &mut Runtime, value: &JsValue, depth: usize) -> Result<RenderNode, String> {
    if depth > MAX_RENDER_DEPTH {
        return Err("Maximum render depth exceeded".to_string());
    }
    if value.is_null_or_undefined() || value.as_boolean().is_some() {
        return Ok(RenderNode::Empty);
    }
    if let Some(s) = value.as_string() {
        return Ok(RenderNode::Text {
            text: s.to_std_string_escaped(),
        });
    }
    if value.as_number().is_some() || value.is_bigint() {
        let text = rt.to_text(value).map_err(|e| e.to_string())?;
        return Ok(RenderNode::Text { text });
    }

    let Some(obj) = value.as_object().cloned() else {
        return Ok(RenderNode::Empty);
    };

    if obj.is_array() {
        return Ok(RenderNode::Fragment {
            children: convert_list(rt, &obj, depth)?,
        });
    }

    let marker = rt.get(&obj, "$$typeof").map_err(|e| e.to_string())?;
    let is_element = marker
        .as_string()
        .map(|s| s.to_std_string_escaped() == "react.element")
        .unwrap_or(false);
    if !is_element {
        return Err("Objects are not valid as a React child".to_string());
    }

    let element_type = rt.get(&obj, "type").map_err(|e| e.to_string())?;
    let props = rt.get(&obj, "props").map_err(|e| e.to_string())?;

    if let Some(component) = element_type.as_callable().cloned() {
        let output = rt.call(&component, &props).map_err(|e| e.to_string())?;
        return convert(rt, &output, depth + 1);
    }

    let Some(tag) = element_type.as_string().map(|s| s.to_std_string_escaped()) else {
        return Err("Element type is invalid: expected a string or a function".to_string());
    };

    let children = match props.as_object().cloned() {
        Some(p) => {
            let raw = rt.get(&p, "children").map_err(|e| e.to_string())?;
            convert_children(rt, &raw, depth)?
        }
        None => Vec::new(),
    };

    if tag == "react.fragment" {
        return Ok(RenderNode::Fragment { children });
    }

    Ok(RenderNode::Element {
        tag,
        props: rt.props_to_json(&props),
        children,
    })
}

fn convert_children(
    rt: &mut Runtime,
    raw: &JsValue,
    depth: usize,
) -> Result<Vec<RenderNode>, String> {
    match raw.as_object() {
        Some(obj) if obj.is_array() => convert_list(rt, obj, depth),
        _ => match convert(rt, raw, depth + 1)? {
            RenderNode::Empty => Ok(Vec::new()),
            node => Ok(vec![node]),
        },
    }
}

fn convert_list(rt: &mut Runtime, arr: &JsObject, depth: usize) -> Result<Vec<RenderNode>, String> {
    let len = rt.length(arr).map_err(|e| e.to_string())?;
    let mut out = Vec::with_capacity(len.min(1024) as usize);
    for i in 0..len as usize {
        let item = rt.get_index(arr, i).map_err(|e| e.to_string())?;
        match convert(rt, &item, depth + 1)? {
            RenderNode::Empty => {}
            node => out.push(node),
        }
    }
    Ok(out)
}

impl RenderNode {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            RenderNode::Empty => {}
            RenderNode::Text { text } => out.push_str(&escape_html(text)),
            RenderNode::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
            RenderNode::Element {
                tag,
                props,
                children,
            } => {
                let tag = tag.to_ascii_lowercase();
                if BLOCKED_TAGS.contains(&tag.as_str()) {
                    return;
                }
                let tag = if is_valid_tag(&tag) { tag } else { "div".to_string() };

                out.push('<');
                out.push_str(&tag);
                write_attributes(props, out);
                out.push('>');

                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
        }
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn write_attributes(props: &Map<String, Value>, out: &mut String) {
    for (key, value) in props {
        if key == "key" || key == "dangerouslySetInnerHTML" || is_event_handler(key) {
            continue;
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            continue;
        }

        let name = match key.as_str() {
            "className" => "class",
            "htmlFor" => "for",
            other => other,
        };

        let rendered = match value {
            Value::Null => continue,
            Value::Bool(false) => continue,
            Value::Bool(true) => {
                out.push(' ');
                out.push_str(name);
                continue;
            }
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Object(map) if name == "style" => style_to_css(map),
            _ => continue,
        };

        if is_url_attribute(name) && is_dangerous_url(&rendered) {
            continue;
        }

        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_html(&rendered));
        out.push('"');
    }
}

/// Cualquier `on*`, sin importar mayúsculas: `onClick`, `onerror`, `ONLOAD`.
fn is_event_handler(key: &str) -> bool {
    key.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

fn is_url_attribute(name: &str) -> bool {
    URL_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(name))
}

/// El navegador ignora espacios y caracteres de control dentro del esquema
/// (`java\tscript:`), así que se eliminan antes de comparar.
fn is_dangerous_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect::<String>()
        .to_ascii_lowercase();
    DANGEROUS_SCHEMES.iter().any(|s| compact.starts_with(s))
}

/// `{backgroundColor: "red", padding: 8}` → `background-color: red; padding: 8px`.
pub fn style_to_css(style: &Map<String, Value>) -> String {
    let mut decls = Vec::new();
    for (prop, value) in style {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                let is_zero = n.as_f64() == Some(0.0);
                if UNITLESS.contains(&prop.as_str()) || is_zero || prop.starts_with("--") {
                    n.to_string()
                } else {
                    format!("{n}px")
                }
            }
            _ => continue,
        };
        decls.push(format!("{}: {}", css_property(prop), value));
    }
    decls.join("; ")
}

fn css_property(prop: &str) -> String {
    if prop.starts_with("--") {
        return prop.to_string();
    }
    let mut out = String::with_capacity(prop.len() + 4);
    for (i, c) in prop.chars().enumerate() {
        if c.is_ascii_uppercase() {
            // WebkitTransform → -webkit-transform
            if i > 0 || prop.starts_with("Webkit") || prop.starts_with("Moz") {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    if prop.starts_with("ms") && prop.chars().nth(2).is_some_and(|c| c.is_ascii_uppercase()) {
        out.insert(0, '-');
    }
    out
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
