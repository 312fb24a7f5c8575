//! Abstracción sobre Rig para generar componentes React a partir de un brief.
//! Proveedores soportados: OpenAI y Anthropic.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use tracing::{debug, info};

use crate::brief::Brief;
use crate::config::{AppConfig, LlmProvider};
use crate::sandbox::normalize::unwrap_fences;

const SYSTEM_PROMPT: &str = r#"
Eres un ingeniero senior de React.
Conviertes resúmenes de nodos de Figma en un único componente React autocontenido.
No añades explicaciones: sólo código.
"#;

/// Código devuelto por el modelo. No es de confianza: sólo se ejecuta en el sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource(String);

impl GeneratedSource {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Generador de código: un brief entra, una fuente sale. Una sola petición, sin reintentos.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, brief: &Brief) -> Result<GeneratedSource>;
}

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if cfg.llm_chat_model.trim().is_empty() {
            return Err(anyhow!("LLM_CHAT_MODEL no puede estar vacío"));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
            max_tokens: cfg.llm_max_tokens,
        })
    }

    async fn complete_with_openai(&self, prompt: &str) -> Result<String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        Ok(agent.prompt(prompt).await?)
    }

    async fn complete_with_anthropic(&self, prompt: &str) -> Result<String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::providers::anthropic;

        let client = anthropic::Client::from_env();
        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        Ok(agent.prompt(prompt).await?)
    }
}

#[async_trait]
impl CodeGenerator for LlmManager {
    async fn generate(&self, brief: &Brief) -> Result<GeneratedSource> {
        let prompt = build_prompt(brief)?;
        info!(
            "Generando componente para '{}' con {:?} ({})",
            brief.name, self.provider, self.chat_model
        );

        let answer = match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(&prompt).await,
            LlmProvider::Anthropic => self.complete_with_anthropic(&prompt).await,
        }
        .with_context(|| format!("El proveedor {:?} no respondió", self.provider))?;

        debug!("Respuesta del LLM: {} caracteres", answer.len());
        extract_code(&answer)
    }
}

/// Prompt de usuario con el brief embebido en JSON legible.
pub fn build_prompt(brief: &Brief) -> Result<String> {
    let brief_json =
        serde_json::to_string_pretty(brief).context("No se pudo serializar el brief")?;

    Ok([
        "Genera un único componente React autocontenido a partir del brief de Figma de abajo.",
        "- Usa React.createElement (sin JSX).",
        "- Sin imports. Una sola función.",
        "- Usa clases de Tailwind basadas en el diseño.",
        "",
        "Brief JSON:",
        "```json",
        &brief_json,
        "```",
        "",
        "Devuelve SÓLO un bloque vallado:",
        "```tsx",
        "// código aquí",
        "```",
    ]
    .join("\n"))
}

/// Reduce la respuesta al primer bloque vallado; una respuesta vacía es un error.
pub fn extract_code(answer: &str) -> Result<GeneratedSource> {
    let code = unwrap_fences(answer).trim().to_string();
    if code.is_empty() {
        return Err(anyhow!("El LLM devolvió una respuesta vacía"));
    }
    Ok(GeneratedSource(code))
}
