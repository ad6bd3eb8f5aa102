mod native;
mod parse;
mod preprocess;
mod tesseract;

use image::RgbaImage;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{OcrBackendError, PipelineError, panic_message};
use crate::ocr::TokenDetection;

pub use native::NativeBackend;
pub use tesseract::{TesseractBackend, list_tesseract_languages, resolve_tesseract_cmd};

/// Resolved OCR settings, built once at startup.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub native: bool,
    pub tesseract_cmd: PathBuf,
    pub languages: String,
    pub psm: u32,
    pub upscale: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            native: true,
            tesseract_cmd: PathBuf::from("tesseract"),
            languages: "eng".to_string(),
            psm: 3,
            upscale: true,
        }
    }
}

pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    Native,
    Tesseract,
}

impl OcrBackendKind {
    /// Fixed attempt order for [`OcrChain::from_config`].
    pub const PRIORITY: [OcrBackendKind; 2] = [OcrBackendKind::Native, OcrBackendKind::Tesseract];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendKind::Native => "native",
            OcrBackendKind::Tesseract => "tesseract",
        }
    }
}

pub enum OcrBackendImpl {
    Native(NativeBackend),
    Tesseract(TesseractBackend),
}

impl OcrBackend for OcrBackendImpl {
    fn name(&self) -> &'static str {
        match self {
            OcrBackendImpl::Native(backend) => backend.name(),
            OcrBackendImpl::Tesseract(backend) => backend.name(),
        }
    }

    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        match self {
            OcrBackendImpl::Native(backend) => backend.recognize(image),
            OcrBackendImpl::Tesseract(backend) => backend.recognize(image),
        }
    }
}

/// Backends tried in order until one of them returns a result.
///
/// An empty result is a valid answer and stops the chain; only errors and
/// panics fall through to the next backend.
pub struct OcrChain<B: OcrBackend = OcrBackendImpl> {
    backends: Vec<B>,
}

impl OcrChain<OcrBackendImpl> {
    pub fn from_config(config: &OcrConfig) -> Self {
        let mut backends = Vec::new();
        for kind in OcrBackendKind::PRIORITY {
            let built = match kind {
                OcrBackendKind::Native => {
                    if !config.native {
                        debug!("ocr: native backend disabled by settings");
                        continue;
                    }
                    NativeBackend::new().map(OcrBackendImpl::Native)
                }
                OcrBackendKind::Tesseract => {
                    TesseractBackend::new(config).map(OcrBackendImpl::Tesseract)
                }
            };
            match built {
                Ok(backend) => {
                    info!("ocr: registered {} backend", kind.as_str());
                    backends.push(backend);
                }
                Err(err) => warn!("ocr: skipping {} backend: {}", kind.as_str(), err),
            }
        }
        Self { backends }
    }
}

impl<B: OcrBackend> OcrChain<B> {
    pub fn new(backends: Vec<B>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    pub fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, PipelineError> {
        for backend in &self.backends {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.recognize(image)));
            match outcome {
                Ok(Ok(tokens)) => {
                    info!("ocr: {} returned {} token(s)", backend.name(), tokens.len());
                    return Ok(tokens);
                }
                Ok(Err(err)) => warn!("ocr: {}; falling back", err),
                Err(payload) => warn!(
                    "ocr: {} panicked ({}); falling back",
                    backend.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }
        Err(PipelineError::NoOcrBackend)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Script, ScriptedBackend, word};
    use super::*;
    use std::sync::atomic::Ordering;

    fn image() -> RgbaImage {
        RgbaImage::new(32, 32)
    }

    #[test]
    fn hard_failure_falls_through_to_next_backend() {
        let first = ScriptedBackend::new("first", Script::Fail);
        let second = ScriptedBackend::new("second", Script::Tokens(vec![word("hi", 0, 0, 0, 0)]));
        let second_calls = second.calls.clone();
        let chain = OcrChain::new(vec![first, second]);

        let tokens = chain.recognize(&image()).expect("tokens");
        assert_eq!(tokens.len(), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_backend_falls_through() {
        let chain = OcrChain::new(vec![
            ScriptedBackend::new("boom", Script::Panic),
            ScriptedBackend::new("ok", Script::Tokens(Vec::new())),
        ]);
        assert_eq!(chain.recognize(&image()), Ok(Vec::new()));
    }

    #[test]
    fn empty_result_does_not_trigger_fallback() {
        let first = ScriptedBackend::new("first", Script::Tokens(Vec::new()));
        let second = ScriptedBackend::new("second", Script::Tokens(vec![word("x", 0, 0, 0, 0)]));
        let second_calls = second.calls.clone();
        let chain = OcrChain::new(vec![first, second]);

        assert_eq!(chain.recognize(&image()), Ok(Vec::new()));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhausted_chain_reports_missing_backend() {
        let chain = OcrChain::new(vec![
            ScriptedBackend::new("a", Script::Fail),
            ScriptedBackend::new("b", Script::Fail),
        ]);
        assert_eq!(chain.recognize(&image()), Err(PipelineError::NoOcrBackend));

        let empty: OcrChain<ScriptedBackend> = OcrChain::new(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.recognize(&image()), Err(PipelineError::NoOcrBackend));
    }

    #[test]
    fn native_backend_is_skipped_when_disabled() {
        let config = OcrConfig {
            native: false,
            tesseract_cmd: PathBuf::from("definitely-not-a-tesseract-binary"),
            ..OcrConfig::default()
        };
        let chain = OcrChain::from_config(&config);
        assert_eq!(chain.names(), vec!["tesseract"]);
    }
}
