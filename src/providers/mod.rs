use anyhow::Result;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::warn;

mod google;
mod openai;
mod retry;

pub use google::GoogleFree;
pub use openai::OpenAI;

pub type TranslateFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// A translation backend: one request in, one translated text out.
pub trait Translate: Send + Sync {
    fn name(&self) -> &'static str;
    fn translate(&self, text: String) -> TranslateFuture;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "google" => Some(ProviderKind::Google),
            "openai" | "gpt" => Some(ProviderKind::OpenAI),
            _ => None,
        }
    }
}

/// Translator settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub provider: String,
    pub source_lang: String,
    pub target_lang: String,
    pub openai_model: String,
    pub openai_key: Option<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            source_lang: "auto".to_string(),
            target_lang: "zh-CN".to_string(),
            openai_model: openai::DEFAULT_MODEL.to_string(),
            openai_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    Google(GoogleFree),
    OpenAI(OpenAI),
}

impl ProviderImpl {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::Google(_) => ProviderKind::Google,
            ProviderImpl::OpenAI(_) => ProviderKind::OpenAI,
        }
    }
}

impl Translate for ProviderImpl {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn translate(&self, text: String) -> TranslateFuture {
        match self {
            ProviderImpl::Google(provider) => provider.translate(text),
            ProviderImpl::OpenAI(provider) => provider.translate(text),
        }
    }
}

/// Resolves a provider identifier to a translator.
///
/// Unknown identifiers and `openai` without an API key fall back to the free
/// Google endpoint.
pub fn build_translator(provider: &str, config: &TranslatorConfig) -> ProviderImpl {
    let google = || {
        ProviderImpl::Google(GoogleFree::new(
            config.source_lang.clone(),
            config.target_lang.clone(),
        ))
    };
    match ProviderKind::from_name(provider) {
        Some(ProviderKind::OpenAI) => match config.openai_key.as_deref() {
            Some(key) => ProviderImpl::OpenAI(
                OpenAI::new(key)
                    .with_model(config.openai_model.clone())
                    .with_target_lang(config.target_lang.clone()),
            ),
            None => {
                warn!("OpenAI API key not found, falling back to google");
                google()
            }
        },
        Some(ProviderKind::Google) => google(),
        None => {
            warn!("unknown translation provider '{}', using google", provider);
            google()
        }
    }
}

/// `OPENAI_API_KEY` from `./.env` when present, otherwise from the environment.
pub fn resolve_openai_key() -> Option<String> {
    read_dotenv_value(Path::new(".env"), "OPENAI_API_KEY").or_else(|| get_env("OPENAI_API_KEY"))
}

fn read_dotenv_value(path: &Path, name: &str) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        if key.trim() != name {
            return None;
        }
        let value = value.trim().trim_matches(['"', '\'']);
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
