use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::{
    auth::{FigmaOAuth, SessionStore},
    config::AppConfig,
    figma_client::DesignSource,
    llm::CodeGenerator,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub figma: Arc<dyn DesignSource>,
    pub oauth: Arc<FigmaOAuth>,
    pub sessions: Arc<SessionStore>,
    pub generator: Arc<dyn CodeGenerator>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado de la última operación larga (importación o generación).
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn ready(message: &str) -> Self {
        Self {
            is_busy: false,
            message: message.to_string(),
            progress: 0.0,
        }
    }
}

/// Bloquea un mutex aunque otro hilo haya entrado en pánico con él tomado.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Actualiza el `Status` compartido.
pub fn set_status(status: &Mutex<Status>, is_busy: bool, message: impl Into<String>, progress: f32) {
    let mut guard = lock(status);
    guard.is_busy = is_busy;
    guard.message = message.into();
    guard.progress = progress.clamp(0.0, 1.0);
}

/// Marca el `Status` como ocupado sólo si estaba libre; comprobación y marca
/// ocurren con el mismo candado. Devuelve `false` si ya había una operación.
pub fn try_begin_busy(status: &Mutex<Status>, message: impl Into<String>) -> bool {
    let mut guard = lock(status);
    if guard.is_busy {
        return false;
    }
    guard.is_busy = true;
    guard.message = message.into();
    guard.progress = 0.0;
    true
}
