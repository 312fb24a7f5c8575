//! Conexión con Figma por OAuth (authorization code + PKCE) y sesiones en memoria.
//!
//! El navegador sólo guarda un identificador opaco (`figma_session`); los tokens
//! viven en el servidor. `figma_connected=1` es una pista legible desde JS.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context as _;
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::app_state::lock;
use crate::config::FigmaConfig;
use crate::figma_client::FigmaError;
use crate::workspace::WorkspaceHandle;

pub const SESSION_COOKIE: &str = "figma_session";
pub const HINT_COOKIE: &str = "figma_connected";

/// Validez de un `state` pendiente de callback.
const PENDING_TTL_SECS: i64 = 600;
const COOKIE_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;
/// Si Figma no indica caducidad asumimos una hora.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Contrato mínimo que necesitan los adaptadores: ¿hay sesión? ¿con qué token?
pub trait AuthProvider: Send + Sync {
    fn has_valid_session(&self, sid: &Uuid) -> bool;
    fn bearer_token(&self, sid: &Uuid) -> Option<String>;
}

/// Respuesta de `POST /v1/oauth/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

struct Session {
    access_token: String,
    #[allow(dead_code)]
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    workspace: Option<WorkspaceHandle>,
}

struct PendingLogin {
    verifier: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    pending: Mutex<HashMap<String, PendingLogin>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&self, state: String, verifier: String) {
        let now = Utc::now();
        let mut pending = lock(&self.pending);
        pending.retain(|_, p| (now - p.created_at).num_seconds() < PENDING_TTL_SECS);
        pending.insert(
            state,
            PendingLogin {
                verifier,
                created_at: now,
            },
        );
    }

    /// Consume el `state` y devuelve su verificador PKCE si sigue vigente.
    pub fn take_pending(&self, state: &str) -> Option<String> {
        self.take_pending_at(state, Utc::now())
    }

    fn take_pending_at(&self, state: &str, now: DateTime<Utc>) -> Option<String> {
        let login = lock(&self.pending).remove(state)?;
        if (now - login.created_at).num_seconds() >= PENDING_TTL_SECS {
            warn!("State de OAuth caducado");
            return None;
        }
        Some(login.verifier)
    }

    /// Crea una sesión nueva. De paso descarta las caducadas (y sus workspaces).
    pub fn create(&self, tokens: &TokenResponse) -> Uuid {
        let sid = Uuid::new_v4();
        let now = Utc::now();
        let expires_in = tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let session = Session {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: now + chrono::Duration::seconds(expires_in),
            workspace: None,
        };

        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        if sessions.len() < before {
            debug!("Descartadas {} sesiones caducadas", before - sessions.len());
        }
        sessions.insert(sid, session);
        info!("Nueva sesión de Figma creada");
        sid
    }

    /// Elimina la sesión y, con ella, su espacio de trabajo.
    pub fn remove(&self, sid: &Uuid) -> bool {
        lock(&self.sessions).remove(sid).is_some()
    }

    pub fn expires_at(&self, sid: &Uuid) -> Option<DateTime<Utc>> {
        lock(&self.sessions).get(sid).map(|s| s.expires_at)
    }

    /// Espacio de trabajo de la sesión (se crea la primera vez que se pide).
    /// Una sesión caducada se elimina y no devuelve nada.
    pub fn workspace(&self, sid: &Uuid) -> Option<WorkspaceHandle> {
        let mut sessions = lock(&self.sessions);
        if sessions.get(sid)?.expires_at <= Utc::now() {
            sessions.remove(sid);
            return None;
        }
        let session = sessions.get_mut(sid)?;
        Some(
            session
                .workspace
                .get_or_insert_with(WorkspaceHandle::spawn)
                .clone(),
        )
    }
}

impl AuthProvider for SessionStore {
    fn has_valid_session(&self, sid: &Uuid) -> bool {
        lock(&self.sessions)
            .get(sid)
            .map(|s| !s.access_token.is_empty() && s.expires_at > Utc::now())
            .unwrap_or(false)
    }

    fn bearer_token(&self, sid: &Uuid) -> Option<String> {
        lock(&self.sessions)
            .get(sid)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.access_token.clone())
    }
}

/// Cliente OAuth de Figma.
pub struct FigmaOAuth {
    http: reqwest::Client,
    config: FigmaConfig,
}

impl FigmaOAuth {
    pub fn new(config: &FigmaConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("No se pudo construir el cliente HTTP de OAuth")?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn authorize_url(&self, state: &str, challenge: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            &self.config.oauth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.config.scopes.as_str()),
                ("state", state),
                ("code_challenge", challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .with_context(|| format!("FIGMA_OAUTH_URL inválida: {}", self.config.oauth_url))?;
        Ok(url.into())
    }

    /// Genera `state` + PKCE, los deja pendientes y devuelve la URL de autorización.
    pub fn begin(&self, store: &SessionStore) -> anyhow::Result<String> {
        let state = Uuid::new_v4().to_string();
        let (verifier, challenge) = pkce_pair();
        let url = self.authorize_url(&state, &challenge)?;
        store.insert_pending(state, verifier);
        Ok(url)
    }

    /// Canjea el código de autorización por tokens.
    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<TokenResponse, FigmaError> {
        let url = format!("{}/v1/oauth/token", self.config.api_base.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("code_verifier", verifier),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FigmaError::Http {
                status: status.as_u16(),
                detail: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| FigmaError::Decode(e.to_string()))
    }
}

/// Par (verificador, desafío S256).
pub fn pkce_pair() -> (String, String) {
    let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let challenge = code_challenge(&verifier);
    (verifier, challenge)
}

pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Valor de una cookie en las cabeceras de la petición.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    cookie_value(headers, SESSION_COOKIE).and_then(|v| Uuid::parse_str(&v).ok())
}

/// Cabeceras `Set-Cookie` para una sesión nueva.
pub fn session_cookies(sid: &Uuid) -> [String; 2] {
    [
        format!(
            "{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax; Max-Age={COOKIE_MAX_AGE_SECS}"
        ),
        format!("{HINT_COOKIE}=1; Path=/; SameSite=Lax; Max-Age={COOKIE_MAX_AGE_SECS}"),
    ]
}

pub fn clear_cookies() -> [String; 2] {
    [
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
        format!("{HINT_COOKIE}=; Path=/; SameSite=Lax; Max-Age=0"),
    ]
}

/// Página que devuelve el callback: avisa a la ventana que abrió el popup y se cierra.
pub fn popup_close_html(origin: &str) -> String {
    let origin = serde_json::to_string(origin).unwrap_or_else(|_| "\"*\"".to_string());
    format!(
        "<!doctype html><html><body><script>\n\
         try {{ if (window.opener) {{ window.opener.postMessage({{ type: 'figma:connected' }}, {origin}); }} }} catch (e) {{}}\n\
         window.close();\n\
         </script></body></html>"
    )
}
