//! Resolución del código generado a un componente ejecutable dentro de un
//! intérprete JavaScript aislado.
//!
//! Flujo de `resolve`:
//!   1) quitar vallas de markdown;
//!   2) quitar `import`;
//!   3) detectar el punto de entrada y eliminar `export` (árbol sintáctico);
//!   4) instrumentar cuerpos de funciones y bucles con el presupuesto de tiempo
//!      y ejecutar en un contexto nuevo con globales restringidas;
//!   5) probar candidatos y, si ninguno sirve, `module.exports`.
//!
//! Cada llamada crea su propio contexto: no hay estado compartido entre resoluciones.

mod budget;
pub mod entry;
pub mod normalize;
mod render;
mod runtime;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::SandboxLimits;

pub use render::{escape_html, RenderNode};
use runtime::{Entry, Runtime};

/// Nombres probados, en orden, después del nombre detectado.
pub const FALLBACK_CANDIDATES: &[&str] = &["Component", "App", "Default", "Root", "Main"];

const NOT_FOUND_MESSAGE: &str =
    "Could not resolve a function component. Ensure your code defines or exports a component.";

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum ResolutionFailure {
    #[error("{message}")]
    #[serde(rename = "not_found")]
    NotFound { message: String },
    #[error("{message}")]
    #[serde(rename = "execution_error")]
    Execution { message: String },
}

impl ResolutionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Execution { .. } => "execution_error",
        }
    }

    fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

/// Componente resuelto, ligado al contexto que lo produjo. No es `Send`: se
/// resuelve y se renderiza en el mismo hilo.
pub struct ResolvedComponent {
    runtime: Runtime,
    entry: Entry,
    detected_name: Option<String>,
    chosen: String,
}

impl std::fmt::Debug for ResolvedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedComponent")
            .field("detected_name", &self.detected_name)
            .field("chosen", &self.chosen)
            .finish()
    }
}

impl ResolvedComponent {
    /// Nombre detectado en el código (puede no ser el que se eligió).
    pub fn detected_name(&self) -> Option<&str> {
        self.detected_name.as_deref()
    }

    /// Símbolo realmente usado como entrada.
    pub fn entry_name(&self) -> &str {
        &self.chosen
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.entry, Entry::Callable(_))
    }

    /// Invoca la entrada y convierte el resultado en un árbol de render. Lo que
    /// lance el componente es un error de ejecución.
    pub fn render(&mut self) -> Result<RenderNode, ResolutionFailure> {
        let output = self
            .runtime
            .invoke(&self.entry)
            .map_err(ResolutionFailure::execution)?;
        render::to_render_tree(&mut self.runtime, &output).map_err(ResolutionFailure::execution)
    }
}

pub fn resolve(
    source: &str,
    limits: &SandboxLimits,
) -> Result<ResolvedComponent, ResolutionFailure> {
    // 1) + 2)
    let code = normalize::strip_imports(&normalize::unwrap_fences(source));

    // 3)
    let analysis = entry::analyze(&code).map_err(|e| ResolutionFailure::execution(e.to_string()))?;
    debug!("Entrada detectada: {:?}", analysis.name);

    // 4)
    let code = budget::instrument(&analysis.code)
        .map_err(|e| ResolutionFailure::execution(e.to_string()))?;
    let mut runtime = Runtime::new(limits).map_err(ResolutionFailure::execution)?;
    runtime
        .eval(&code)
        .map_err(ResolutionFailure::execution)?;

    // 5)
    let mut candidates: Vec<String> = analysis.name.iter().cloned().collect();
    candidates.extend(
        FALLBACK_CANDIDATES
            .iter()
            .filter(|c| analysis.name.as_deref() != Some(**c))
            .map(|c| c.to_string()),
    );

    for candidate in candidates {
        if let Some(entry) = runtime.lookup(&candidate) {
            return Ok(ResolvedComponent {
                runtime,
                entry,
                detected_name: analysis.name,
                chosen: candidate,
            });
        }
    }

    let fallback = runtime
        .default_export()
        .map(|e| (e, "module.exports.default"))
        .or_else(|| runtime.exports_callable().map(|e| (e, "module.exports")));

    match fallback {
        Some((entry, chosen)) => Ok(ResolvedComponent {
            runtime,
            entry,
            detected_name: analysis.name,
            chosen: chosen.to_string(),
        }),
        None => Err(ResolutionFailure::NotFound {
            message: NOT_FOUND_MESSAGE.to_string(),
        }),
    }
}
