//! Escenario de previsualización: invoca el componente resuelto, lo escala al
//! contenedor y produce un documento HTML autónomo.
//!
//! El lienzo lógico es fijo (por defecto 360×800) y se escala con
//! `min(cw/W, ch/H, 1)`: nunca se amplía.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CanvasSize, SandboxLimits};
use crate::sandbox::{self, escape_html, RenderNode, ResolutionFailure, ResolvedComponent};

pub const SUGGESTION: &str = "Tip: return a single component (function Foo(){...}, const Foo = () => ..., export default function Foo())";

const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl Default for ContainerSize {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

pub fn fit_scale(container: ContainerSize, canvas: CanvasSize) -> f64 {
    let s = (container.width / canvas.width)
        .min(container.height / canvas.height)
        .min(1.0);
    if s.is_finite() && s > 0.0 {
        s
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFrame {
    pub entry_name: String,
    pub detected_name: Option<String>,
    pub scale: f64,
    pub canvas: CanvasSize,
    pub scaled_width: f64,
    pub scaled_height: f64,
    pub tree: RenderNode,
}

impl PreviewFrame {
    fn new(
        entry_name: String,
        detected_name: Option<String>,
        tree: RenderNode,
        canvas: CanvasSize,
        container: ContainerSize,
    ) -> Self {
        let mut frame = Self {
            entry_name,
            detected_name,
            scale: 1.0,
            canvas,
            scaled_width: canvas.width,
            scaled_height: canvas.height,
            tree,
        };
        frame.rescale(container);
        frame
    }

    /// Recalcula la escala sin volver a ejecutar el código.
    pub fn rescale(&mut self, container: ContainerSize) {
        self.scale = fit_scale(container, self.canvas);
        self.scaled_width = self.canvas.width * self.scale;
        self.scaled_height = self.canvas.height * self.scale;
    }

    /// Documento HTML autónomo: caja exterior del tamaño escalado y lienzo
    /// interior de tamaño lógico con `transform: scale(s)`.
    pub fn to_html(&self) -> String {
        format!(
            concat!(
                "<!doctype html>\n<html>\n<head>\n",
                "<meta charset=\"utf-8\">\n",
                "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
                "<title>{title}</title>\n",
                "<script src=\"{cdn}\"></script>\n",
                "<style>html, body {{ margin: 0; padding: 0; }}</style>\n",
                "</head>\n<body>\n",
                "<div data-preview-stage style=\"width: {sw}px; height: {sh}px; overflow: hidden;\">",
                "<div data-preview-canvas style=\"width: {w}px; height: {h}px; transform: scale({s}); ",
                "transform-origin: top left; position: relative; isolation: isolate;\" class=\"text-gray-900\">",
                "{body}",
                "</div></div>\n</body>\n</html>\n"
            ),
            title = escape_html(&self.entry_name),
            cdn = TAILWIND_CDN,
            sw = self.scaled_width,
            sh = self.scaled_height,
            w = self.canvas.width,
            h = self.canvas.height,
            s = self.scale,
            body = self.tree.to_html(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct PreviewError {
    pub kind: String,
    pub message: String,
    pub suggestion: String,
}

impl PreviewError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            suggestion: SUGGESTION.to_string(),
        }
    }
}

impl From<ResolutionFailure> for PreviewError {
    fn from(failure: ResolutionFailure) -> Self {
        Self::new(failure.kind(), failure.to_string())
    }
}

pub struct PreviewStage {
    canvas: CanvasSize,
}

impl PreviewStage {
    pub fn new(canvas: CanvasSize) -> Self {
        Self { canvas }
    }

    /// Invoca la entrada; cualquier excepción se devuelve como `execution_error`.
    pub fn render(
        &self,
        component: &mut ResolvedComponent,
        container: ContainerSize,
    ) -> Result<PreviewFrame, PreviewError> {
        let tree = component.render()?;
        Ok(PreviewFrame::new(
            component.entry_name().to_string(),
            component.detected_name().map(str::to_string),
            tree,
            self.canvas,
            container,
        ))
    }
}

/// Resolver + renderizar en una sola llamada síncrona.
pub fn preview_source(
    code: &str,
    container: ContainerSize,
    limits: &SandboxLimits,
    canvas: CanvasSize,
) -> Result<PreviewFrame, PreviewError> {
    let mut component = sandbox::resolve(code, limits)?;
    PreviewStage::new(canvas).render(&mut component, container)
}

/// Igual que `preview_source`, en un hilo bloqueante y con límite de tiempo.
pub async fn preview_source_blocking(
    code: String,
    container: ContainerSize,
    limits: SandboxLimits,
    canvas: CanvasSize,
) -> Result<PreviewFrame, PreviewError> {
    // El plazo real lo aplica el propio intérprete; este es el margen para lo
    // que el intérprete no interrumpe (llamadas nativas largas).
    let timeout = Duration::from_millis(limits.timeout_ms.saturating_mul(2));
    let task =
        tokio::task::spawn_blocking(move || preview_source(&code, container, &limits, canvas));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            warn!("La tarea de previsualización terminó de forma anómala: {}", join_err);
            Err(PreviewError::new("render_error", join_err.to_string()))
        }
        Err(_) => Err(PreviewError::new(
            "timeout",
            format!("Preview exceeded {} ms", limits.timeout_ms),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PreviewState {
    Empty,
    Resolving,
    Rendered { frame: PreviewFrame },
    Failed { error: PreviewError },
}

/// Estado de previsualización de un ítem. Cada cambio de código incrementa la
/// versión; sólo se aplica el resultado calculado para la versión vigente.
#[derive(Debug, Clone)]
pub struct PreviewSlot {
    version: u64,
    state: PreviewState,
    container: ContainerSize,
}

impl Default for PreviewSlot {
    fn default() -> Self {
        Self::new(ContainerSize::default())
    }
}

impl PreviewSlot {
    pub fn new(container: ContainerSize) -> Self {
        Self {
            version: 0,
            state: PreviewState::Empty,
            container,
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    /// Devuelve la versión a calcular, o `None` si el código está vacío.
    pub fn set_code(&mut self, code: &str) -> Option<u64> {
        self.version += 1;
        if code.trim().is_empty() {
            self.state = PreviewState::Empty;
            None
        } else {
            self.state = PreviewState::Resolving;
            Some(self.version)
        }
    }

    /// Aplica un resultado. Devuelve `false` si era de una versión antigua.
    pub fn complete(&mut self, version: u64, result: Result<PreviewFrame, PreviewError>) -> bool {
        if version != self.version {
            debug!(
                "Descartando previsualización obsoleta (v{} ≠ v{})",
                version, self.version
            );
            return false;
        }
        self.state = match result {
            Ok(mut frame) => {
                frame.rescale(self.container);
                PreviewState::Rendered { frame }
            }
            Err(error) => PreviewState::Failed { error },
        };
        true
    }

    pub fn resize(&mut self, container: ContainerSize) {
        self.container = container;
        if let PreviewState::Rendered { frame } = &mut self.state {
            frame.rescale(container);
        }
    }

    pub fn frame(&self) -> Option<&PreviewFrame> {
        match &self.state {
            PreviewState::Rendered { frame } => Some(frame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> CanvasSize {
        CanvasSize::default()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn scale_fits_container_and_never_enlarges() {
        let big = ContainerSize { width: 800.0, height: 600.0 };
        assert!(approx(fit_scale(big, canvas()), 0.75));

        let small = ContainerSize { width: 200.0, height: 150.0 };
        let s = fit_scale(small, canvas());
        assert!(approx(s, (200.0_f64 / 360.0).min(150.0 / 800.0)));
        assert!(s <= 1.0);

        let huge = ContainerSize { width: 4000.0, height: 4000.0 };
        assert_eq!(fit_scale(huge, canvas()), 1.0);
    }

    #[test]
    fn degenerate_containers_fall_back_to_one() {
        let zero = ContainerSize { width: 0.0, height: 0.0 };
        assert_eq!(fit_scale(zero, canvas()), 1.0);
        let nan = ContainerSize { width: f64::NAN, height: 100.0 };
        assert_eq!(fit_scale(nan, canvas()), 1.0);
        let negative = ContainerSize { width: -10.0, height: 100.0 };
        assert_eq!(fit_scale(negative, canvas()), 1.0);
    }

    #[test]
    fn preview_source_produces_a_scaled_document() {
        let frame = preview_source(
            "export default function Foo() { return React.createElement('p', null, 'hola'); }",
            ContainerSize { width: 180.0, height: 800.0 },
            &SandboxLimits::default(),
            canvas(),
        )
        .unwrap();
        assert_eq!(frame.entry_name, "Foo");
        assert!(approx(frame.scale, 0.5));
        assert!(approx(frame.scaled_width, 180.0));
        assert!(approx(frame.scaled_height, 400.0));

        let html = frame.to_html();
        assert!(html.contains("width: 180px; height: 400px;"));
        assert!(html.contains("width: 360px; height: 800px; transform: scale(0.5);"));
        assert!(html.contains("transform-origin: top left"));
        assert!(html.contains("<p>hola</p>"));
        assert!(html.contains(TAILWIND_CDN));
    }

    #[test]
    fn thrown_render_errors_carry_a_suggestion() {
        let err = preview_source(
            "function Foo() { throw new Error('kaput'); }",
            ContainerSize::default(),
            &SandboxLimits::default(),
            canvas(),
        )
        .unwrap_err();
        assert_eq!(err.kind, "execution_error");
        assert!(err.message.contains("kaput"));
        assert_eq!(err.suggestion, SUGGESTION);
    }

    #[test]
    fn undefined_reference_in_the_body_is_an_execution_error() {
        let err = preview_source(
            "function Foo(){return undefinedVar}",
            ContainerSize::default(),
            &SandboxLimits::default(),
            canvas(),
        )
        .unwrap_err();
        assert_eq!(err.kind, "execution_error");
        assert!(err.message.contains("undefinedVar"));
    }

    #[tokio::test]
    async fn slow_sources_fail_inside_the_engine_budget() {
        let limits = SandboxLimits {
            timeout_ms: 400,
            ..SandboxLimits::default()
        };
        let err = preview_source_blocking(
            "function f(n){return n<=0?0:f(n-1)+f(n-1)} f(21); function Foo(){return null}"
                .to_string(),
            ContainerSize::default(),
            limits,
            canvas(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, "execution_error");
    }

    #[test]
    fn resolution_failures_keep_their_kind() {
        let err = preview_source(
            "import x from 'y';",
            ContainerSize::default(),
            &SandboxLimits::default(),
            canvas(),
        )
        .unwrap_err();
        assert_eq!(err.kind, "not_found");
    }

    #[test]
    fn slot_discards_stale_results_and_rescales_on_resize() {
        let mut slot = PreviewSlot::new(ContainerSize { width: 360.0, height: 800.0 });
        assert_eq!(slot.state(), &PreviewState::Empty);

        let v1 = slot.set_code("function A() { return null; }").unwrap();
        let v2 = slot.set_code("function B() { return null; }").unwrap();
        assert!(v2 > v1);
        assert_eq!(slot.state(), &PreviewState::Resolving);

        let frame = |name: &str| {
            PreviewFrame::new(
                name.to_string(),
                None,
                RenderNode::Empty,
                canvas(),
                ContainerSize::default(),
            )
        };
        assert!(!slot.complete(v1, Ok(frame("A"))));
        assert_eq!(slot.state(), &PreviewState::Resolving);
        assert!(slot.complete(v2, Ok(frame("B"))));
        assert_eq!(slot.frame().unwrap().entry_name, "B");
        assert!(approx(slot.frame().unwrap().scale, 1.0));

        slot.resize(ContainerSize { width: 180.0, height: 800.0 });
        assert!(approx(slot.frame().unwrap().scale, 0.5));
        assert_eq!(slot.version(), v2);
    }

    #[test]
    fn blank_code_empties_the_slot() {
        let mut slot = PreviewSlot::default();
        let v = slot.set_code("function A() {}").unwrap();
        assert!(slot.set_code("   ").is_none());
        assert_eq!(slot.state(), &PreviewState::Empty);
        assert!(!slot.complete(v, Err(PreviewError::new("render_error", "x"))));
    }

    #[tokio::test]
    async fn blocking_preview_runs_off_the_runtime() {
        let frame = preview_source_blocking(
            "const Main = () => React.createElement('b', null, 1 + 1);".to_string(),
            ContainerSize::default(),
            SandboxLimits::default(),
            canvas(),
        )
        .await
        .unwrap();
        assert_eq!(frame.tree.to_html(), "<b>2</b>");
    }
}
