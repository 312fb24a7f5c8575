// Módulos de la aplicación
mod api;
mod app_state;
mod auth;
mod brief;
mod config;
mod figma_client;
mod file_key;
mod import;
mod llm;
mod models;
mod preview;
mod sandbox;
mod triage;
mod workspace;

use crate::app_state::{AppState, Status};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Clientes de Figma (REST + OAuth)
    let figma = figma_client::FigmaClient::new(&cfg.figma).expect("Error creando el cliente de Figma");
    let oauth = auth::FigmaOAuth::new(&cfg.figma).expect("Error creando el cliente OAuth de Figma");

    // 4. Inicializar gestor de LLMs
    let llm_manager = llm::LlmManager::from_config(&cfg).expect("Error inicializando LLM Manager");

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        figma: Arc::new(figma),
        oauth: Arc::new(oauth),
        sessions: Arc::new(auth::SessionStore::new()),
        generator: Arc::new(llm_manager),
        status: Arc::new(Mutex::new(Status::ready("Servidor listo."))),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("Error al abrir el puerto del servidor");
    let server_url = app_state.config.app_url.clone();
    info!("🚀 Servidor escuchando en {} ({})", server_addr, &server_url);

    // Abrir el frontend en el navegador por defecto
    if app_state.config.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor");

    info!("✅ Servidor cerrado correctamente.");
}
