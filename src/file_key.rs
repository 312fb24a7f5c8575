//! Extracción de la clave de fichero (y del nodo opcional) a partir de lo que pega
//! el usuario: una clave suelta, una URL de Figma o un `<iframe>` de embed.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub file_key: String,
    /// Valor de `node-id` tal como venga en la URL (`12-345` o `12:345`).
    pub node_id: Option<String>,
}

/// Devuelve `None` si la entrada no contiene una referencia reconocible.
pub fn extract(input: &str) -> Option<FileRef> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if is_raw_key(input) {
        return Some(FileRef {
            file_key: input.to_string(),
            node_id: None,
        });
    }

    let candidate = iframe_src(input).unwrap_or_else(|| input.to_string());
    from_url(&candidate, 0)
}

fn is_raw_key(s: &str) -> bool {
    s.len() >= 10
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

static IFRAME_SRC_REGEX: OnceLock<Regex> = OnceLock::new();

fn iframe_src_re() -> &'static Regex {
    IFRAME_SRC_REGEX.get_or_init(|| Regex::new(r#"src\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn iframe_src(input: &str) -> Option<String> {
    if !input.contains("<iframe") {
        return None;
    }
    iframe_src_re()
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

fn from_url(raw: &str, depth: u8) -> Option<FileRef> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    if host != "figma.com" && !host.ends_with(".figma.com") {
        return None;
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    // Embed antiguo: https://www.figma.com/embed?embed_host=...&url=<url codificada>
    if segments.first() == Some(&"embed") && depth == 0 {
        let inner = url
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())?;
        return from_url(&inner, depth + 1);
    }

    let ix = segments
        .iter()
        .position(|p| matches!(*p, "file" | "design" | "proto" | "board"))?;
    let file_key = segments.get(ix + 1)?.to_string();

    let node_id = url
        .query_pairs()
        .find(|(k, _)| k == "node-id")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());

    Some(FileRef { file_key, node_id })
}
