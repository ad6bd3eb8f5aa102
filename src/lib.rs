use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::path::Path;
use tracing::{info, warn};

pub mod batch;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod session;
pub mod settings;
mod test_util;

pub use error::{OcrBackendError, PipelineError, RenderError};
pub use ocr::{Line, LineBox, OcrBackend, OcrChain, OcrConfig, TokenDetection, aggregate_lines};
pub use pipeline::{Pipeline, PipelineOutput};
pub use providers::{ProviderImpl, Translate, TranslatorConfig, build_translator};
pub use render::{OverlayConfig, OverlayRenderer};
pub use session::{CaptureSession, SessionUpdate};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image_path: Option<String>,
    pub output_path: Option<String>,
    pub provider: Option<String>,
    pub target_lang: Option<String>,
    pub source_lang: Option<String>,
    pub font_path: Option<String>,
    pub settings_path: Option<String>,
    pub no_native_ocr: bool,
}

/// Translates one capture read from `config.image_path` (or `image_bytes`)
/// and returns the text report. "No text" style outcomes are reports, not
/// errors.
pub async fn run(config: Config, image_bytes: Option<Vec<u8>>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    let image = load_image(config.image_path.as_deref(), image_bytes)?;
    info!("capture: {}x{}", image.width(), image.height());

    let ocr = OcrChain::from_config(&settings.ocr_config());
    if ocr.is_empty() {
        warn!("no OCR backend could be constructed");
    }
    let renderer = OverlayRenderer::new(&settings.overlay_config());
    let translator_config = settings.translator_config(providers::resolve_openai_key());
    let translator = build_translator(&translator_config.provider, &translator_config);
    info!("translator: {}", translator.name());

    let pipeline = Pipeline::new(ocr, renderer, translator);
    let output = match pipeline.process(&image).await {
        Ok(output) => output,
        Err(err @ (PipelineError::NoTextFound | PipelineError::NoOcrBackend)) => {
            warn!("{}", err);
            return Ok(err.user_message());
        }
        Err(err) => return Err(anyhow::Error::new(err).context("pipeline failed")),
    };

    for issue in &output.issues {
        warn!("{}", issue);
    }
    if let Some(path) = config.output_path.as_deref() {
        output
            .overlay
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write overlay: {}", path))?;
        info!("overlay written to {}", path);
    }
    Ok(format_output(&output))
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) {
    if let Some(provider) = non_empty(config.provider.as_deref()) {
        settings.provider = provider.to_string();
    }
    if let Some(lang) = non_empty(config.target_lang.as_deref()) {
        settings.target_lang = lang.to_string();
    }
    if let Some(lang) = non_empty(config.source_lang.as_deref()) {
        settings.source_lang = lang.to_string();
    }
    if let Some(path) = non_empty(config.font_path.as_deref()) {
        settings.overlay_font_path = Some(path.to_string());
    }
    if config.no_native_ocr {
        settings.ocr_native = false;
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn load_image(path: Option<&str>, bytes: Option<Vec<u8>>) -> Result<RgbaImage> {
    let image = match (path, bytes) {
        (Some(path), _) => {
            image::open(path).with_context(|| format!("failed to read image: {}", path))?
        }
        (None, Some(bytes)) if !bytes.is_empty() => {
            image::load_from_memory(&bytes).with_context(|| "failed to decode image from stdin")?
        }
        _ => return Err(anyhow!("no image given (use --image or pipe image bytes)")),
    };
    Ok(image.to_rgba8())
}

fn format_output(output: &PipelineOutput) -> String {
    format!("{}\n\n{}", output.original_text, output.translated_text)
}
