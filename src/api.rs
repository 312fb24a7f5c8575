use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::{lock, set_status, try_begin_busy, AppState, Status},
    auth::{self, AuthProvider},
    brief::{brief_schema, Brief},
    figma_client::FigmaError,
    file_key::{self, FileRef},
    import::{import_file, ImportSource},
    preview::{preview_source_blocking, ContainerSize, PreviewFrame, PreviewState},
    triage::{list_frames, FrameSummary},
    workspace::{GenerationOutcome, ItemView, PreviewTicket, WorkspaceError, WorkspaceHandle},
};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<T, ApiError>;

/// Política del documento de previsualización servido desde el origen de la app.
const PREVIEW_CSP: &str = "sandbox allow-scripts";

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ResolvePayload {
    input: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct NodesQuery {
    ids: Option<String>,
}

#[derive(Deserialize)]
pub struct CodePayload {
    code: String,
}

#[derive(Deserialize)]
pub struct PreviewPayload {
    code: String,
    container: Option<ContainerSize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    connected: bool,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramesResponse {
    file_name: String,
    frames: Vec<FrameSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    #[serde(flatten)]
    file: FileRef,
    file_name: Option<String>,
    source: ImportSource,
    missing: Vec<String>,
    message: String,
    items: Vec<ItemView>,
}

#[derive(Deserialize)]
pub struct GeneratePayload {
    brief: Brief,
}

#[derive(Debug, Serialize)]
pub struct GeneratedCode {
    code: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    applied: bool,
    item: ItemView,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    preview: PreviewState,
    html: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .route("/api/figma/login", get(login_handler))
        .route("/api/figma/callback", get(callback_handler))
        .route("/api/figma/session", get(session_handler))
        .route("/api/figma/me", get(me_handler))
        .route("/api/figma/logout", post(logout_handler))
        .route("/api/figma/resolve", post(resolve_handler))
        .route("/api/figma/files/:key/components", get(components_handler))
        .route("/api/figma/files/:key/frames", get(frames_handler))
        .route("/api/figma/files/:key/nodes", get(nodes_handler))
        .route("/api/import", post(import_handler))
        .route("/api/workspace", get(workspace_handler))
        .route("/api/workspace/items/:index/brief", get(brief_handler))
        .route("/api/workspace/items/:index/code", put(code_handler))
        .route("/api/workspace/items/:index/generate", post(generate_handler))
        .route("/api/workspace/items/:index/preview/resize", post(resize_handler))
        .route("/api/workspace/items/:index/preview.html", get(preview_html_handler))
        .route("/api/generate", post(generate_from_brief_handler))
        .route("/api/preview", post(preview_handler))
        .route("/api/brief/schema", get(brief_schema_handler))
        .with_state(app_state)
}

// --- Errores ---

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Conserva el código y el detalle que devolvió Figma.
fn figma_error(e: &FigmaError) -> ApiError {
    match e {
        FigmaError::Http { status, detail } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(json!({ "error": e.to_string(), "status": status, "detail": detail })),
        ),
        other => api_error(StatusCode::BAD_GATEWAY, other.to_string()),
    }
}

fn workspace_error(e: WorkspaceError) -> ApiError {
    match e {
        WorkspaceError::NoSuchItem(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        WorkspaceError::MissingBrief(_) => api_error(StatusCode::CONFLICT, e.to_string()),
        WorkspaceError::Closed => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn unauthorized() -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "No hay sesión de Figma activa.")
}

// --- Sesión ---

/// Identificador de sesión y token de acceso, o 401.
fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<(Uuid, String)> {
    let sid = auth::session_id(headers).ok_or_else(unauthorized)?;
    if !state.sessions.has_valid_session(&sid) {
        return Err(unauthorized());
    }
    let token = state.sessions.bearer_token(&sid).ok_or_else(unauthorized)?;
    Ok((sid, token))
}

fn workspace_for(state: &AppState, headers: &HeaderMap) -> ApiResult<WorkspaceHandle> {
    let (sid, _) = authorize(state, headers)?;
    state.sessions.workspace(&sid).ok_or_else(unauthorized)
}

/// Ejecuta la previsualización fuera del espacio de trabajo y le entrega el resultado.
async fn run_preview(state: &AppState, workspace: &WorkspaceHandle, ticket: PreviewTicket) -> ApiResult<()> {
    let result = preview_source_blocking(
        ticket.code.clone(),
        ticket.container,
        state.config.sandbox,
        state.config.canvas,
    )
    .await;
    if let Err(e) = &result {
        debug!("Previsualización fallida ({}): {}", e.kind, e.message);
    }
    let applied = workspace
        .complete_preview(ticket, result)
        .await
        .map_err(workspace_error)?;
    if !applied {
        debug!("Resultado de previsualización obsoleto descartado");
    }
    Ok(())
}

// --- Handlers ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(lock(&state.status).clone())
}

#[axum::debug_handler]
async fn login_handler(State(state): State<AppState>) -> ApiResult<Response> {
    let url = state.oauth.begin(&state.sessions).map_err(|e| {
        error!("No se pudo preparar el login de Figma: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

#[axum::debug_handler]
async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    if let Some(reason) = query.error {
        warn!("Figma rechazó la autorización: {}", reason);
        return Err(api_error(StatusCode::BAD_REQUEST, format!("Autorización denegada: {reason}")));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Faltan los parámetros code y state."));
    };
    let verifier = state
        .sessions
        .take_pending(&oauth_state)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "State de OAuth inválido o caducado."))?;

    let tokens = state.oauth.exchange(&code, &verifier).await.map_err(|e| {
        error!("Error canjeando el código de Figma: {}", e);
        figma_error(&e)
    })?;
    let sid = state.sessions.create(&tokens);

    let cookies = auth::session_cookies(&sid).map(|c| (header::SET_COOKIE, c));
    Ok((
        AppendHeaders(cookies),
        Html(auth::popup_close_html(&state.config.app_url)),
    )
        .into_response())
}

#[axum::debug_handler]
async fn session_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionInfo> {
    let info = match auth::session_id(&headers) {
        Some(sid) if state.sessions.has_valid_session(&sid) => SessionInfo {
            connected: true,
            expires_at: state.sessions.expires_at(&sid),
        },
        _ => SessionInfo {
            connected: false,
            expires_at: None,
        },
    };
    Json(info)
}

#[axum::debug_handler]
async fn me_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let (_, token) = authorize(&state, &headers)?;
    let me = state.figma.me(&token).await.map_err(|e| figma_error(&e))?;
    Ok(Json(json!({ "connected": true, "me": me })))
}

#[axum::debug_handler]
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = auth::session_id(&headers) {
        if state.sessions.remove(&sid) {
            info!("Sesión de Figma cerrada");
        }
    }
    let cookies = auth::clear_cookies().map(|c| (header::SET_COOKIE, c));
    (AppendHeaders(cookies), Json(json!({ "ok": true }))).into_response()
}

#[axum::debug_handler]
async fn resolve_handler(Json(payload): Json<ResolvePayload>) -> ApiResult<Json<FileRef>> {
    file_key::extract(&payload.input)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No se reconoce una URL o clave de Figma."))
}

#[axum::debug_handler]
async fn components_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let (_, token) = authorize(&state, &headers)?;
    let components = state
        .figma
        .list_components(&token, &key)
        .await
        .map_err(|e| figma_error(&e))?;
    Ok(Json(json!({ "components": components })))
}

#[axum::debug_handler]
async fn frames_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<FramesResponse>> {
    let (_, token) = authorize(&state, &headers)?;
    let doc = state
        .figma
        .get_document(&token, &key)
        .await
        .map_err(|e| figma_error(&e))?;
    let frames = list_frames(&doc.document, &key);
    Ok(Json(FramesResponse {
        file_name: doc.name,
        frames,
    }))
}

#[axum::debug_handler]
async fn nodes_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<NodesQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let ids: Vec<String> = query
        .ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Falta el parámetro ids."));
    }
    let (_, token) = authorize(&state, &headers)?;
    let nodes = state
        .figma
        .get_nodes(&token, &key, &ids)
        .await
        .map_err(|e| figma_error(&e))?;
    Ok(Json(json!({ "nodes": nodes })))
}

#[axum::debug_handler]
async fn import_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResolvePayload>,
) -> ApiResult<Json<ImportResponse>> {
    let file = file_key::extract(&payload.input)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No se reconoce una URL o clave de Figma."))?;
    let (sid, token) = authorize(&state, &headers)?;
    let workspace = state.sessions.workspace(&sid).ok_or_else(unauthorized)?;

    if !try_begin_busy(&state.status, format!("Importando {}...", file.file_key)) {
        return Err(api_error(StatusCode::CONFLICT, "Ya hay una operación en curso."));
    }

    let outcome = import_file(
        state.figma.as_ref(),
        &token,
        &file.file_key,
        state.config.triage_max_nodes,
        &state.status,
    )
    .await
    .map_err(|e| {
        error!("Error de importación: {:#}", e);
        match e.downcast_ref::<FigmaError>() {
            Some(figma) => figma_error(figma),
            None => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
        }
    })?;

    workspace
        .replace(outcome.items)
        .await
        .map_err(workspace_error)?;
    let items = workspace.list().await.map_err(workspace_error)?;

    Ok(Json(ImportResponse {
        file,
        file_name: outcome.file_name,
        source: outcome.source,
        missing: outcome.missing,
        message: outcome.message,
        items,
    }))
}

#[axum::debug_handler]
async fn workspace_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let workspace = workspace_for(&state, &headers)?;
    let items = workspace.list().await.map_err(workspace_error)?;
    Ok(Json(json!({ "items": items })))
}

#[axum::debug_handler]
async fn brief_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> ApiResult<Json<Brief>> {
    let workspace = workspace_for(&state, &headers)?;
    workspace
        .brief(index)
        .await
        .map_err(workspace_error)?
        .map(Json)
        .ok_or_else(|| workspace_error(WorkspaceError::MissingBrief(index)))
}

#[axum::debug_handler]
async fn code_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
    Json(payload): Json<CodePayload>,
) -> ApiResult<Json<ItemView>> {
    let workspace = workspace_for(&state, &headers)?;
    if let Some(ticket) = workspace
        .set_code(index, payload.code)
        .await
        .map_err(workspace_error)?
    {
        run_preview(&state, &workspace, ticket).await?;
    }
    let item = workspace.get(index).await.map_err(workspace_error)?;
    Ok(Json(item))
}

#[axum::debug_handler]
async fn generate_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> ApiResult<Json<GenerateResponse>> {
    let workspace = workspace_for(&state, &headers)?;
    let ticket = workspace
        .begin_generation(index)
        .await
        .map_err(workspace_error)?;

    // 1. Pedir el código al LLM
    set_status(
        &state.status,
        true,
        format!("Generando '{}'...", ticket.brief.name),
        0.5,
    );
    let result = state.generator.generate(&ticket.brief).await;
    let generated = match result {
        Ok(code) => code,
        Err(e) => {
            error!("Error generando el componente {}: {:#}", index, e);
            set_status(&state.status, false, format!("Error en la generación: {e}"), 0.0);
            workspace
                .abort_generation(ticket)
                .await
                .map_err(workspace_error)?;
            return Err(api_error(StatusCode::BAD_GATEWAY, e.to_string()));
        }
    };
    set_status(&state.status, false, "Componente generado.", 1.0);

    // 2. Aplicarlo sólo si la generación sigue vigente
    let outcome = workspace
        .finish_generation(ticket, generated.into_inner())
        .await
        .map_err(workspace_error)?;
    let applied = match outcome {
        GenerationOutcome::Applied(preview) => {
            // 3. Previsualizar el código nuevo
            if let Some(preview) = preview {
                run_preview(&state, &workspace, preview).await?;
            }
            true
        }
        GenerationOutcome::Stale => false,
    };

    let item = workspace.get(index).await.map_err(workspace_error)?;
    Ok(Json(GenerateResponse { applied, item }))
}

#[axum::debug_handler]
async fn resize_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
    Json(container): Json<ContainerSize>,
) -> ApiResult<Json<PreviewState>> {
    let workspace = workspace_for(&state, &headers)?;
    let preview = workspace
        .resize(index, container)
        .await
        .map_err(workspace_error)?;
    Ok(Json(preview))
}

#[axum::debug_handler]
async fn preview_html_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let workspace = workspace_for(&state, &headers)?;
    let item = workspace.get(index).await.map_err(workspace_error)?;
    match item.preview {
        // Origen opaco: el documento no ve las cookies ni el almacenamiento de la app.
        PreviewState::Rendered { frame } => Ok((
            [(header::CONTENT_SECURITY_POLICY, PREVIEW_CSP)],
            Html(frame.to_html()),
        )
            .into_response()),
        _ => Err(api_error(StatusCode::NOT_FOUND, "El ítem no tiene previsualización.")),
    }
}

/// Generación sin estado a partir de un brief enviado por el cliente (no
/// necesita sesión ni toca el workspace).
#[axum::debug_handler]
async fn generate_from_brief_handler(
    State(state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> ApiResult<Json<GeneratedCode>> {
    let brief = payload.brief;
    set_status(&state.status, true, format!("Generando '{}'...", brief.name), 0.5);

    let result = state.generator.generate(&brief).await;
    match result {
        Ok(code) => {
            set_status(&state.status, false, "Componente generado.", 1.0);
            Ok(Json(GeneratedCode {
                code: code.into_inner(),
            }))
        }
        Err(e) => {
            error!("Error generando '{}': {:#}", brief.name, e);
            set_status(&state.status, false, format!("Error en la generación: {e}"), 0.0);
            Err(api_error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

/// Resolver + renderizar sin estado (no necesita sesión).
#[axum::debug_handler]
async fn preview_handler(
    State(state): State<AppState>,
    Json(payload): Json<PreviewPayload>,
) -> ApiResult<Json<PreviewResponse>> {
    if payload.code.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Falta el código a previsualizar."));
    }
    let result = preview_source_blocking(
        payload.code,
        payload.container.unwrap_or_default(),
        state.config.sandbox,
        state.config.canvas,
    )
    .await;

    let response = match result {
        Ok(frame) => PreviewResponse {
            html: Some(PreviewFrame::to_html(&frame)),
            preview: PreviewState::Rendered { frame },
        },
        Err(error) => PreviewResponse {
            html: None,
            preview: PreviewState::Failed { error },
        },
    };
    Ok(Json(response))
}

#[axum::debug_handler]
async fn brief_schema_handler() -> Json<schemars::Schema> {
    Json(brief_schema())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = lock(&state.shutdown_sender).take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FigmaOAuth, SessionStore, TokenResponse};
    use crate::config::{AppConfig, CanvasSize, FigmaConfig, LlmProvider, SandboxLimits};
    use crate::figma_client::DesignSource;
    use crate::llm::{extract_code, CodeGenerator, GeneratedSource};
    use crate::models::{ComponentDescriptor, DesignNode, FileDocument};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct FakeFigma;

    #[async_trait]
    impl DesignSource for FakeFigma {
        async fn list_components(
            &self,
            _token: &str,
            file_key: &str,
        ) -> Result<Vec<ComponentDescriptor>, FigmaError> {
            Ok(vec![ComponentDescriptor {
                key: file_key.to_string(),
                name: "Button".to_string(),
                description: None,
                node_id: "1:2".to_string(),
                thumbnail_url: None,
                created_at: None,
                updated_at: None,
            }])
        }

        async fn get_document(&self, _token: &str, _file_key: &str) -> Result<FileDocument, FigmaError> {
            Err(FigmaError::Http {
                status: 403,
                detail: "Invalid token".to_string(),
            })
        }

        async fn get_nodes(
            &self,
            _token: &str,
            _file_key: &str,
            ids: &[String],
        ) -> Result<HashMap<String, DesignNode>, FigmaError> {
            Ok(ids
                .iter()
                .map(|id| {
                    let node: DesignNode = serde_json::from_value(
                        json!({"id": id, "name": "Button", "type": "COMPONENT"}),
                    )
                    .unwrap();
                    (id.clone(), node)
                })
                .collect())
        }

        async fn me(&self, _token: &str) -> Result<Value, FigmaError> {
            Ok(json!({"handle": "ada"}))
        }
    }

    struct FakeGenerator;

    #[async_trait]
    impl CodeGenerator for FakeGenerator {
        async fn generate(&self, brief: &Brief) -> anyhow::Result<GeneratedSource> {
            extract_code(&format!(
                "```tsx\nfunction Button() {{ return React.createElement('button', null, '{}'); }}\n```",
                brief.name
            ))
        }
    }

    fn test_state() -> AppState {
        let figma = FigmaConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/api/figma/callback".to_string(),
            api_base: "https://api.figma.com".to_string(),
            oauth_url: "https://www.figma.com/oauth".to_string(),
            scopes: "file_content:read".to_string(),
            node_batch_size: 60,
        };
        let config = AppConfig {
            server_addr: "127.0.0.1:0".to_string(),
            app_url: "http://localhost:3000".to_string(),
            open_browser: false,
            figma: figma.clone(),
            triage_max_nodes: 300,
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            llm_max_tokens: 2000,
            sandbox: SandboxLimits::default(),
            canvas: CanvasSize::default(),
        };
        AppState {
            config,
            figma: Arc::new(FakeFigma),
            oauth: Arc::new(FigmaOAuth::new(&figma).unwrap()),
            sessions: Arc::new(SessionStore::new()),
            generator: Arc::new(FakeGenerator),
            status: Arc::new(Mutex::new(Status::ready("Servidor listo."))),
            shutdown_sender: Arc::new(Mutex::new(None)),
        }
    }

    fn logged_in(state: &AppState) -> HeaderMap {
        let sid = state.sessions.create(&TokenResponse {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("figma_session={sid}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn resolve_rejects_unrecognised_input() {
        let ok = resolve_handler(Json(ResolvePayload {
            input: "https://www.figma.com/design/AbCdEfGhIjKl/Mi-diseño?node-id=1-2".to_string(),
        }))
        .await
        .unwrap();
        assert_eq!(ok.0.file_key, "AbCdEfGhIjKl");

        let (status, _) = resolve_handler(Json(ResolvePayload {
            input: "https://example.com".to_string(),
        }))
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn workspace_requires_a_session() {
        let state = test_state();
        let (status, _) = workspace_handler(State(state), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upstream_errors_keep_status_and_detail() {
        let state = test_state();
        let headers = logged_in(&state);
        let (status, body) = frames_handler(State(state), Path("AbCdEfGhIjKl".to_string()), headers)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.0["detail"], "Invalid token");
    }

    #[tokio::test]
    async fn import_generate_and_preview_flow() {
        let state = test_state();
        let headers = logged_in(&state);

        let imported = import_handler(
            State(state.clone()),
            headers.clone(),
            Json(ResolvePayload {
                input: "AbCdEfGhIjKl".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(imported.0.items.len(), 1);
        assert!(imported.0.items[0].has_brief);

        let generated = generate_handler(State(state.clone()), Path(0), headers.clone())
            .await
            .unwrap();
        assert!(generated.0.applied);
        assert!(generated.0.item.code.contains("function Button"));
        assert!(matches!(generated.0.item.preview, PreviewState::Rendered { .. }));
        assert!(!lock(&state.status).is_busy);

        let page = preview_html_handler(State(state.clone()), Path(0), headers.clone())
            .await
            .unwrap();
        assert_eq!(
            page.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(),
            "sandbox allow-scripts"
        );
        let body = axum::body::to_bytes(page.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("<button>Button</button>"));

        let edited = code_handler(
            State(state.clone()),
            Path(0),
            headers.clone(),
            Json(CodePayload {
                code: "import x from 'y';".to_string(),
            }),
        )
        .await
        .unwrap();
        match edited.0.preview {
            PreviewState::Failed { error } => assert_eq!(error.kind, "not_found"),
            other => panic!("estado inesperado: {other:?}"),
        }

        let (status, _) = brief_handler(State(state), Path(7), headers).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn import_is_refused_while_another_operation_runs() {
        let state = test_state();
        let headers = logged_in(&state);
        assert!(try_begin_busy(&state.status, "Generando..."));

        let (status, _) = import_handler(
            State(state.clone()),
            headers,
            Json(ResolvePayload {
                input: "AbCdEfGhIjKl".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(lock(&state.status).message, "Generando...");
    }

    #[tokio::test]
    async fn stateless_generation_returns_code_for_a_client_brief() {
        let state = test_state();
        let payload: GeneratePayload = serde_json::from_value(json!({
            "brief": {
                "id": "1:2",
                "name": "Card",
                "type": "COMPONENT",
                "size": {"width": 120.0, "height": 40.0},
                "position": {"x": 0.0, "y": 0.0},
                "visible": true,
                "fills": [{"type": "SOLID", "r": 1.0, "g": 1.0, "b": 1.0, "a": 1.0}]
            }
        }))
        .unwrap();
        assert!(payload.brief.children.is_empty());

        let generated = generate_from_brief_handler(State(state.clone()), Json(payload))
            .await
            .unwrap();
        assert_eq!(
            generated.0.code,
            "function Button() { return React.createElement('button', null, 'Card'); }"
        );
        let status = lock(&state.status);
        assert!(!status.is_busy);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn stateless_preview_reports_failures_as_data() {
        let state = test_state();
        let (status, _) = preview_handler(
            State(state.clone()),
            Json(PreviewPayload {
                code: "   ".to_string(),
                container: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let ok = preview_handler(
            State(state),
            Json(PreviewPayload {
                code: "const Card = () => React.createElement('div', {className: 'p-4'}, 'hola');"
                    .to_string(),
                container: Some(ContainerSize {
                    width: 200.0,
                    height: 150.0,
                }),
            }),
        )
        .await
        .unwrap();
        assert!(ok.0.html.unwrap().contains("<div class=\"p-4\">hola</div>"));
    }
}
