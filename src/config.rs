//! Carga y gestión de configuración de la aplicación (Figma + LLM + sandbox).
//!
//! Cada adaptador recibe su trozo de configuración al construirse; ningún
//! módulo fuera de este lee variables de entorno.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
        }
    }
}

/// Credenciales y endpoints de Figma (OAuth + REST).
#[derive(Clone, Debug)]
pub struct FigmaConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub oauth_url: String,
    pub scopes: String,
    /// Número máximo de ids por petición a `/v1/files/:key/nodes`.
    pub node_batch_size: usize,
}

/// Presupuesto de ejecución del código generado.
#[derive(Clone, Copy, Debug)]
pub struct SandboxLimits {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    pub timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 100_000,
            recursion_limit: 256,
            timeout_ms: 2_000,
        }
    }
}

/// Lienzo lógico de la previsualización (viewport móvil).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 360.0,
            height: 800.0,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub app_url: String,
    pub open_browser: bool,

    pub figma: FigmaConfig,
    /// Tope de nodos seleccionados por el triaje.
    pub triage_max_nodes: usize,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
    pub llm_max_tokens: u64,

    pub sandbox: SandboxLimits,
    pub canvas: CanvasSize,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let app_url = env::var("APP_URL").unwrap_or_else(|_| format!("http://{server_addr}"));
        let open_browser = parse_or("OPEN_BROWSER", true)?;

        let client_id = env::var("FIGMA_CLIENT_ID")
            .map_err(|_| anyhow!("Falta FIGMA_CLIENT_ID en el entorno"))?;
        let client_secret = env::var("FIGMA_CLIENT_SECRET")
            .map_err(|_| anyhow!("Falta FIGMA_CLIENT_SECRET en el entorno"))?;
        let redirect_uri = env::var("FIGMA_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{app_url}/api/figma/callback"));

        let figma = FigmaConfig {
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
            redirect_uri,
            api_base: env::var("FIGMA_API_BASE")
                .unwrap_or_else(|_| "https://api.figma.com".to_string()),
            oauth_url: env::var("FIGMA_OAUTH_URL")
                .unwrap_or_else(|_| "https://www.figma.com/oauth".to_string()),
            scopes: env::var("FIGMA_SCOPES").unwrap_or_else(|_| {
                "current_user:read file_content:read file_metadata:read".to_string()
            }),
            node_batch_size: parse_or("FIGMA_NODE_BATCH_SIZE", 60usize)?.max(1),
        };

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model = env::var("LLM_CHAT_MODEL")
            .unwrap_or_else(|_| llm_provider.default_chat_model().to_string());

        let defaults = SandboxLimits::default();
        let sandbox = SandboxLimits {
            loop_iteration_limit: parse_or("SANDBOX_LOOP_LIMIT", defaults.loop_iteration_limit)?,
            recursion_limit: parse_or("SANDBOX_RECURSION_LIMIT", defaults.recursion_limit)?,
            timeout_ms: parse_or("SANDBOX_TIMEOUT_MS", defaults.timeout_ms)?,
        };

        let canvas_defaults = CanvasSize::default();
        let canvas = CanvasSize {
            width: parse_or("PREVIEW_CANVAS_WIDTH", canvas_defaults.width)?,
            height: parse_or("PREVIEW_CANVAS_HEIGHT", canvas_defaults.height)?,
        };

        Ok(Self {
            server_addr,
            app_url,
            open_browser,
            figma,
            triage_max_nodes: parse_or("TRIAGE_MAX_NODES", crate::triage::DEFAULT_MAX_NODES)?,
            llm_provider,
            llm_chat_model,
            llm_temperature: parse_or("LLM_TEMPERATURE", 0.2f64)?,
            llm_max_tokens: parse_or("LLM_MAX_TOKENS", 2000u64)?,
            sandbox,
            canvas,
        })
    }
}

/// Lee una variable numérica/booleana; si no existe usa el valor por defecto.
fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
