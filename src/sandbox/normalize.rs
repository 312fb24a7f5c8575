//! Limpieza textual del código generado antes de analizarlo: vallas de markdown
//! e `import` (no hay resolución de módulos dentro del sandbox).

use std::sync::OnceLock;

use regex::Regex;

static FENCE_REGEX: OnceLock<Regex> = OnceLock::new();
static IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_REGEX.get_or_init(|| {
        // La línea de apertura puede faltar: ```jsx código``` en una sola línea.
        Regex::new(
            r"(?s)```[ \t]*(?:(?:tsx|jsx|typescript|javascript|ts|js|react)\b)?(?:[^\n`]*\n|[ \t]*)(.*?)```",
        )
        .unwrap()
    })
}

fn import_re() -> &'static Regex {
    IMPORT_REGEX.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*import\b(?:[^;\n]*\{[^}]*\}[^;\n]*|[^;\n]*);?[ \t]*$").unwrap()
    })
}

/// Devuelve el contenido del primer bloque vallado (recortado). Si sólo hay una
/// valla de apertura se descarta esa línea; sin vallas el texto queda igual.
pub fn unwrap_fences(raw: &str) -> String {
    if let Some(block) = fence_re().captures(raw).and_then(|c| c.get(1)) {
        return block.as_str().trim().to_string();
    }

    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        let body = trimmed.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        return body.trim().to_string();
    }

    raw.to_string()
}

/// Elimina toda sentencia `import` anclada a inicio de línea.
pub fn strip_imports(code: &str) -> String {
    import_re().replace_all(code, "").into_owned()
}
