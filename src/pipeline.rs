use futures_util::FutureExt;
use image::RgbaImage;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::batch::{join_lines, translate_lines};
use crate::error::{PipelineError, panic_message};
use crate::ocr::{Line, OcrBackend, OcrBackendImpl, OcrChain, aggregate_lines};
use crate::providers::{ProviderImpl, Translate};
use crate::render::OverlayRenderer;

/// Result of one capture run through OCR, translation and rendering.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Line texts in aggregation order, joined with `\n`.
    pub original_text: String,
    /// Aligned translations joined with `\n`, or the translation error
    /// message when the translator failed.
    pub translated_text: String,
    pub overlay: RgbaImage,
    pub lines: Vec<Line>,
    pub translations: Vec<String>,
    /// Non-fatal problems: a failed translation or lines drawn without text.
    pub issues: Vec<PipelineError>,
}

impl PipelineOutput {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct Pipeline<B: OcrBackend = OcrBackendImpl, T: Translate = ProviderImpl> {
    ocr: Arc<OcrChain<B>>,
    renderer: Arc<OverlayRenderer>,
    translator: Arc<T>,
}

impl<B: OcrBackend, T: Translate> Clone for Pipeline<B, T> {
    fn clone(&self) -> Self {
        Self {
            ocr: self.ocr.clone(),
            renderer: self.renderer.clone(),
            translator: self.translator.clone(),
        }
    }
}

impl<B, T> Pipeline<B, T>
where
    B: OcrBackend + 'static,
    T: Translate,
{
    pub fn new(ocr: OcrChain<B>, renderer: OverlayRenderer, translator: T) -> Self {
        Self {
            ocr: Arc::new(ocr),
            renderer: Arc::new(renderer),
            translator: Arc::new(translator),
        }
    }

    /// Same OCR chain and renderer, different translator.
    pub fn with_translator<U: Translate>(&self, translator: U) -> Pipeline<B, U> {
        Pipeline {
            ocr: self.ocr.clone(),
            renderer: self.renderer.clone(),
            translator: Arc::new(translator),
        }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Runs the whole capture pipeline. `image` is never modified.
    ///
    /// Panics anywhere in the pipeline are reported as
    /// [`PipelineError::Internal`].
    pub async fn process(&self, image: &RgbaImage) -> Result<PipelineOutput, PipelineError> {
        match AssertUnwindSafe(self.run(image)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("pipeline: unexpected fault: {}", message);
                Err(PipelineError::Internal(message))
            }
        }
    }

    async fn run(&self, image: &RgbaImage) -> Result<PipelineOutput, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "{}x{} image",
                image.width(),
                image.height()
            )));
        }

        let ocr = self.ocr.clone();
        let capture = image.clone();
        let tokens = tokio::task::spawn_blocking(move || ocr.recognize(&capture))
            .await
            .map_err(|err| PipelineError::Internal(format!("OCR task failed: {}", err)))??;

        let lines = aggregate_lines(&tokens);
        if lines.is_empty() {
            info!("pipeline: {} token(s), no text lines", tokens.len());
            return Err(PipelineError::NoTextFound);
        }
        info!(
            "pipeline: {} token(s) grouped into {} line(s)",
            tokens.len(),
            lines.len()
        );
        let sources = lines.iter().map(|line| line.text.as_str()).collect::<Vec<_>>();
        let original_text = join_lines(&sources);

        let mut issues = Vec::new();
        let (translations, translated_text) =
            match translate_lines(&sources, self.translator.as_ref()).await {
                Ok(translations) => {
                    let text = join_lines(&translations);
                    (translations, text)
                }
                Err(err) => {
                    let message = err.user_message();
                    issues.push(err);
                    (vec![String::new(); lines.len()], message)
                }
            };

        let rendered = self.renderer.render(image, &lines, &translations)?;
        if let Some(partial) = rendered.partial_failure(lines.len()) {
            warn!("pipeline: {}", partial);
            issues.push(partial);
        }

        Ok(PipelineOutput {
            original_text,
            translated_text,
            overlay: rendered.image,
            lines,
            translations,
            issues,
        })
    }
}
