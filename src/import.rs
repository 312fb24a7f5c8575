//! Pipeline de importación de un fichero de Figma: componentes publicados (o
//! triaje del documento), descarga de nodos y un brief por nodo.
//!
//! Los pasos son estrictamente secuenciales y el progreso se refleja en el
//! `Status` compartido.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::app_state::{set_status, Status};
use crate::brief::build_brief;
use crate::figma_client::{DesignSource, FigmaError};
use crate::triage::select_interesting_nodes;
use crate::workspace::{ItemKind, NewItem};

/// De dónde salió la lista de ítems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    Components,
    Triage,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub file_name: Option<String>,
    pub source: ImportSource,
    pub items: Vec<NewItem>,
    /// Nodos seleccionados que Figma no devolvió (quedan sin brief).
    pub missing: Vec<String>,
    pub message: String,
}

struct Candidate {
    node_id: String,
    name: String,
    kind: ItemKind,
}

pub async fn import_file(
    source: &dyn DesignSource,
    token: &str,
    file_key: &str,
    max_nodes: usize,
    status: &Mutex<Status>,
) -> Result<ImportOutcome> {
    set_status(status, true, format!("Importando {file_key}..."), 0.0);

    match run(source, token, file_key, max_nodes, status).await {
        Ok(outcome) => {
            set_status(status, false, outcome.message.clone(), 1.0);
            Ok(outcome)
        }
        Err(e) => {
            set_status(status, false, format!("Error en la importación: {e}"), 0.0);
            Err(e)
        }
    }
}

async fn run(
    source: &dyn DesignSource,
    token: &str,
    file_key: &str,
    max_nodes: usize,
    status: &Mutex<Status>,
) -> Result<ImportOutcome> {
    // 1. Componentes publicados en el fichero
    set_status(status, true, "Consultando componentes publicados...", 0.1);
    let mut components_404: Option<FigmaError> = None;
    let components = match source.list_components(token, file_key).await {
        Ok(list) => list,
        Err(e) if e.is_not_found() => {
            warn!("Listado de componentes no disponible ({}); se usará el triaje", e);
            components_404 = Some(e);
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let mut file_name = None;
    let (source_kind, candidates) = if !components.is_empty() {
        let candidates = components
            .into_iter()
            .take(max_nodes)
            .map(|c| Candidate {
                node_id: c.node_id,
                name: c.name,
                kind: ItemKind::Component,
            })
            .collect::<Vec<_>>();
        (ImportSource::Components, candidates)
    } else {
        // 2. Sin componentes: triaje del documento completo
        set_status(status, true, "Analizando el documento...", 0.3);
        let doc = source.get_document(token, file_key).await?;
        let selected = select_interesting_nodes(&doc.document, max_nodes);
        file_name = Some(doc.name);

        if selected.is_empty() {
            if let Some(e) = components_404 {
                return Err(anyhow!(
                    "No hay componentes ({e}) y el documento no contiene nodos seleccionables"
                ));
            }
            return Ok(ImportOutcome {
                file_name,
                source: ImportSource::Triage,
                items: Vec::new(),
                missing: Vec::new(),
                message: "El documento no contiene componentes ni frames de primer nivel".to_string(),
            });
        }

        let candidates = selected
            .into_iter()
            .map(|n| Candidate {
                kind: ItemKind::from_node_type(&n.node_type),
                node_id: n.id,
                name: n.name,
            })
            .collect::<Vec<_>>();
        (ImportSource::Triage, candidates)
    };

    // 3. Nodos completos y un brief por nodo
    set_status(
        status,
        true,
        format!("Descargando {} nodos...", candidates.len()),
        0.6,
    );
    let ids: Vec<String> = candidates.iter().map(|c| c.node_id.clone()).collect();
    let nodes = source.get_nodes(token, file_key, &ids).await?;

    let mut missing = Vec::new();
    let items: Vec<NewItem> = candidates
        .into_iter()
        .map(|c| {
            let brief = nodes.get(&c.node_id).map(build_brief);
            if brief.is_none() {
                warn!("Figma no devolvió el nodo {} ('{}')", c.node_id, c.name);
                missing.push(c.node_id.clone());
            }
            NewItem {
                name: c.name,
                kind: c.kind,
                node_id: c.node_id,
                brief,
            }
        })
        .collect();

    let message = format!(
        "Importados {} ítems ({} sin datos)",
        items.len(),
        missing.len()
    );
    info!("{}", message);

    Ok(ImportOutcome {
        file_name,
        source: source_kind,
        items,
        missing,
        message,
    })
}
