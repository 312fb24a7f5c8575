//! Detección del punto de entrada y reescritura de `export` sobre el árbol
//! sintáctico de tree-sitter (gramática TSX).

use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser};

/// Resultado del análisis: nombre detectado (si lo hay) y código sin `export`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAnalysis {
    pub name: Option<String>,
    pub code: String,
}

struct Edit {
    start: usize,
    end: usize,
    replacement: &'static str,
}

pub fn analyze(code: &str) -> Result<EntryAnalysis> {
    let mut parser = Parser::new();
    parser
        .set_language(tree_sitter_typescript::language_tsx())
        .map_err(|e| anyhow!("No se pudo cargar la gramática TSX: {e}"))?;
    let tree = parser
        .parse(code, None)
        .ok_or_else(|| anyhow!("tree-sitter no devolvió árbol"))?;
    let root = tree.root_node();
    let src = code.as_bytes();

    let name = default_export_name(root, src)
        .or_else(|| first_named_function(root, src))
        .or_else(|| first_const_arrow(root, src));

    let mut edits = export_edits(root, code);
    // De atrás hacia delante para no invalidar los offsets pendientes.
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = code.to_string();
    for edit in edits {
        out.replace_range(edit.start..edit.end, edit.replacement);
    }

    Ok(EntryAnalysis { name, code: out })
}

fn children<'a>(node: Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn has_default(stmt: Node) -> bool {
    children(stmt).iter().any(|c| c.kind() == "default")
}

fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function"
            | "function_expression"
            | "generator_function"
    )
}

fn name_of(node: Node, src: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(src).ok())
        .map(str::to_string)
}

/// Prioridades (a) `export default function Name` y (b) `export default Name`.
fn default_export_name(root: Node, src: &[u8]) -> Option<String> {
    let stmts: Vec<Node> = export_statements(root)
        .into_iter()
        .filter(|n| has_default(*n))
        .collect();

    for stmt in &stmts {
        let target = stmt
            .child_by_field_name("declaration")
            .or_else(|| stmt.child_by_field_name("value"));
        if let Some(target) = target {
            if is_function_like(target.kind()) {
                if let Some(name) = name_of(target, src) {
                    return Some(name);
                }
            }
        }
    }

    stmts.iter().find_map(|stmt| {
        let value = stmt.child_by_field_name("value")?;
        (value.kind() == "identifier")
            .then(|| value.utf8_text(src).ok().map(str::to_string))
            .flatten()
    })
}

/// Sentencias `export` en orden de aparición, estén donde estén: con código
/// algo roto tree-sitter las deja dentro de nodos ERROR o de bloques.
fn export_statements(root: Node) -> Vec<Node> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "export_statement" {
            found.push(node);
            continue;
        }
        // Al revés para que la pila devuelva los hijos en orden.
        stack.extend(children(node).into_iter().rev());
    }
    found
}

/// `export` sueltos que la recuperación de errores no agrupó en una sentencia.
/// `export` es palabra reservada, así que como token aislado siempre sobra.
fn stray_exports<'a>(root: Node<'a>, src: &[u8]) -> Vec<Node<'a>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "export_statement" {
            continue;
        }
        if node.child_count() == 0 {
            let is_token = matches!(node.kind(), "export" | "identifier");
            if is_token && node.utf8_text(src).ok() == Some("export") {
                found.push(node);
            }
            continue;
        }
        stack.extend(children(node));
    }
    found
}

/// Prioridad (c): primera función con nombre en preorden.
fn first_named_function(node: Node, src: &[u8]) -> Option<String> {
    if is_function_like(node.kind()) {
        if let Some(name) = name_of(node, src) {
            return Some(name);
        }
    }
    children(node)
        .into_iter()
        .find_map(|child| first_named_function(child, src))
}

/// Prioridad (d): primer `const Name = (...) =>`.
fn first_const_arrow(node: Node, src: &[u8]) -> Option<String> {
    if node.kind() == "lexical_declaration" {
        let is_const = children(node).first().map(|c| c.kind()) == Some("const");
        if is_const {
            let found = children(node).into_iter().find_map(|decl| {
                if decl.kind() != "variable_declarator" {
                    return None;
                }
                let value = decl.child_by_field_name("value")?;
                let name = decl.child_by_field_name("name")?;
                (value.kind() == "arrow_function" && name.kind() == "identifier")
                    .then(|| name.utf8_text(src).ok().map(str::to_string))
                    .flatten()
            });
            if found.is_some() {
                return found;
            }
        }
    }
    children(node)
        .into_iter()
        .find_map(|child| first_const_arrow(child, src))
}

/// Ediciones que eliminan toda sintaxis de módulo de nivel superior.
fn export_edits(root: Node, code: &str) -> Vec<Edit> {
    let mut edits = Vec::new();

    for token in stray_exports(root, code.as_bytes()) {
        let rest = &code[token.end_byte()..];
        let after_ws = rest.trim_start();
        let is_default = after_ws.starts_with("default")
            && !after_ws["default".len()..]
                .starts_with(|c: char| c.is_alphanumeric() || c == '_' || c == '$');
        if is_default {
            let end = token.end_byte() + (rest.len() - after_ws.len()) + "default".len();
            edits.push(Edit {
                start: token.start_byte(),
                end,
                replacement: "module.exports.default =",
            });
        } else {
            edits.push(Edit {
                start: token.start_byte(),
                end: token.end_byte(),
                replacement: "",
            });
        }
    }

    for stmt in export_statements(root) {
        let start = stmt.start_byte();

        if let Some(decl) = stmt.child_by_field_name("declaration") {
            edits.push(Edit {
                start,
                end: decl.start_byte(),
                replacement: "",
            });
            continue;
        }

        if let Some(value) = stmt.child_by_field_name("value") {
            let keeps_binding = value.kind() == "identifier"
                || ((is_function_like(value.kind()) || value.kind() == "class")
                    && value.child_by_field_name("name").is_some());
            edits.push(Edit {
                start,
                end: value.start_byte(),
                replacement: if keeps_binding {
                    ""
                } else {
                    "module.exports.default = "
                },
            });
            continue;
        }

        let parts = children(stmt);
        let is_reexport = parts
            .iter()
            .any(|c| matches!(c.kind(), "export_clause" | "namespace_export" | "*"));
        if is_reexport {
            // export { a, b } / export * from '...'
            edits.push(Edit {
                start,
                end: stmt.end_byte(),
                replacement: "",
            });
            continue;
        }

        // Sentencia incompleta: sólo se quitan las palabras clave.
        let body = parts
            .iter()
            .find(|c| !matches!(c.kind(), "export" | "default"))
            .map_or(stmt.end_byte(), |c| c.start_byte());
        edits.push(Edit {
            start,
            end: body,
            replacement: if has_default(stmt) {
                "module.exports.default = "
            } else {
                ""
            },
        });
    }

    edits
}
