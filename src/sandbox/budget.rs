//! Instrumentación del código para el presupuesto de ejecución: cada cuerpo de
//! función y de bucle empieza llamando a [`BUDGET_HOOK`], que el contexto define
//! como una función nativa que lanza un error al vencer el plazo.

use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser};

/// Global que comprueba el plazo. No modificable desde el código generado.
pub const BUDGET_HOOK: &str = "__previewBudget";

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function",
    "function_expression",
    "generator_function",
    "method_definition",
    "arrow_function",
];

const LOOP_KINDS: &[&str] = &[
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
];

struct Insertion {
    at: usize,
    text: String,
    opening: bool,
    depth: usize,
}

impl Insertion {
    /// En la misma posición: primero los cierres (el más interno antes) y luego
    /// las aperturas (la más externa antes).
    fn sort_key(&self) -> (usize, bool, i64) {
        let depth = self.depth as i64;
        (self.at, self.opening, if self.opening { depth } else { -depth })
    }
}

pub fn instrument(code: &str) -> Result<String> {
    let mut parser = Parser::new();
    parser
        .set_language(tree_sitter_typescript::language_tsx())
        .map_err(|e| anyhow!("No se pudo cargar la gramática TSX: {e}"))?;
    let tree = parser
        .parse(code, None)
        .ok_or_else(|| anyhow!("tree-sitter no devolvió árbol"))?;

    let mut insertions = Vec::new();
    let mut stack = vec![(tree.root_node(), 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if let Some(body) = instrumented_body(node) {
            insertions.extend(body_insertions(node, body, depth));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push((child, depth + 1));
        }
    }

    insertions.sort_by_key(Insertion::sort_key);
    let mut out = String::with_capacity(code.len() + insertions.len() * (BUDGET_HOOK.len() + 6));
    let mut cursor = 0;
    for ins in insertions {
        out.push_str(&code[cursor..ins.at]);
        out.push_str(&ins.text);
        cursor = ins.at;
    }
    out.push_str(&code[cursor..]);
    Ok(out)
}

fn instrumented_body(node: Node) -> Option<Node> {
    let kind = node.kind();
    if !FUNCTION_KINDS.contains(&kind) && !LOOP_KINDS.contains(&kind) {
        return None;
    }
    let body = node.child_by_field_name("body")?;
    (!body.is_missing() && body.end_byte() > body.start_byte()).then_some(body)
}

fn body_insertions(owner: Node, body: Node, depth: usize) -> Vec<Insertion> {
    let tick = format!("{BUDGET_HOOK}();");

    if body.kind() == "statement_block" {
        return vec![Insertion {
            at: body.start_byte() + 1,
            text: tick,
            opening: true,
            depth,
        }];
    }

    // Arrow con cuerpo expresión: `x => expr` pasa a `x => (tick, expr)`.
    let (open, close) = if owner.kind() == "arrow_function" {
        (format!("({BUDGET_HOOK}(), "), ")".to_string())
    } else {
        (format!("{{ {tick} "), " }".to_string())
    };
    vec![
        Insertion {
            at: body.start_byte(),
            text: open,
            opening: true,
            depth,
        },
        Insertion {
            at: body.end_byte(),
            text: close,
            opening: false,
            depth,
        },
    ]
}
