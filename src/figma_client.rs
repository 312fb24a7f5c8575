//! Cliente REST de Figma (documento, componentes, nodos y usuario actual).
//!
//! `DesignSource` es la costura que usa el pipeline de importación; en los tests
//! se sustituye por una implementación en memoria.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FigmaConfig;
use crate::models::{
    ComponentDescriptor, ComponentsResponse, DesignNode, FileDocument, NodesResponse, RawComponent,
};

#[derive(Debug, Error)]
pub enum FigmaError {
    #[error("Figma respondió {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("Error de red con Figma: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Respuesta de Figma no válida: {0}")]
    Decode(String),
}

impl FigmaError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Fuente del documento de diseño. Todas las llamadas son de sólo lectura.
#[async_trait]
pub trait DesignSource: Send + Sync {
    async fn list_components(
        &self,
        token: &str,
        file_key: &str,
    ) -> Result<Vec<ComponentDescriptor>, FigmaError>;

    async fn get_document(&self, token: &str, file_key: &str) -> Result<FileDocument, FigmaError>;

    /// Nodos por id. Los ids ausentes o con documento nulo no aparecen en el mapa.
    async fn get_nodes(
        &self,
        token: &str,
        file_key: &str,
        ids: &[String],
    ) -> Result<HashMap<String, DesignNode>, FigmaError>;

    async fn me(&self, token: &str) -> Result<serde_json::Value, FigmaError>;
}

pub struct FigmaClient {
    http: reqwest::Client,
    api_base: String,
    batch_size: usize,
}

impl FigmaClient {
    pub fn new(config: &FigmaConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("No se pudo construir el cliente HTTP de Figma")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            batch_size: config.node_batch_size.max(1),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FigmaError> {
        let url = format!("{}{}", self.api_base, path);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(FigmaError::Http {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FigmaError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DesignSource for FigmaClient {
    async fn list_components(
        &self,
        token: &str,
        file_key: &str,
    ) -> Result<Vec<ComponentDescriptor>, FigmaError> {
        let path = format!("/v1/files/{}/components", encode(file_key));
        let resp: ComponentsResponse = self.get_json(token, &path, &[]).await?;
        let raw = resp.meta.map(|m| m.components).unwrap_or_default();
        Ok(normalize_components(file_key, raw))
    }

    async fn get_document(&self, token: &str, file_key: &str) -> Result<FileDocument, FigmaError> {
        let path = format!("/v1/files/{}", encode(file_key));
        let doc: FileDocument = self.get_json(token, &path, &[]).await?;
        info!("Documento '{}' descargado", doc.name);
        Ok(doc)
    }

    async fn get_nodes(
        &self,
        token: &str,
        file_key: &str,
        ids: &[String],
    ) -> Result<HashMap<String, DesignNode>, FigmaError> {
        let path = format!("/v1/files/{}/nodes", encode(file_key));
        let mut out = HashMap::new();

        // Lotes secuenciales: un fallo aborta el resto.
        for (i, chunk) in ids.chunks(self.batch_size).enumerate() {
            debug!("Lote de nodos {} ({} ids)", i + 1, chunk.len());
            let resp: NodesResponse = self
                .get_json(token, &path, &[("ids", chunk.join(","))])
                .await?;
            out.extend(collect_documents(resp));
        }

        Ok(out)
    }

    async fn me(&self, token: &str) -> Result<serde_json::Value, FigmaError> {
        self.get_json(token, "/v1/me", &[]).await
    }
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

/// `err` o `message` del cuerpo de error de Figma; si no, el cuerpo tal cual.
fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["err", "message", "error"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 500 {
        trimmed.chars().take(500).collect()
    } else {
        trimmed.to_string()
    }
}

fn normalize_components(file_key: &str, raw: Vec<RawComponent>) -> Vec<ComponentDescriptor> {
    raw.into_iter()
        .filter_map(|c| {
            let node_id = c.node_id.filter(|id| !id.is_empty())?;
            Some(ComponentDescriptor {
                key: file_key.to_string(),
                name: c.name,
                description: c.description,
                node_id,
                thumbnail_url: c.thumbnail_url,
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
        })
        .collect()
}

fn collect_documents(resp: NodesResponse) -> impl Iterator<Item = (String, DesignNode)> {
    resp.nodes
        .into_iter()
        .filter_map(|(id, envelope)| envelope.and_then(|e| e.document).map(|doc| (id, doc)))
}
