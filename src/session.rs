//! Keeps the latest capture around and runs the pipeline off the caller's
//! task, so a display can retranslate without taking a new screenshot.

use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::PipelineError;
use crate::ocr::{OcrBackend, OcrBackendImpl};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::providers::{ProviderImpl, Translate};

/// A finished pipeline run. `generation` counts requests in submission order.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub generation: u64,
    pub result: Result<Arc<PipelineOutput>, PipelineError>,
}

pub struct CaptureSession<B: OcrBackend = OcrBackendImpl, T: Translate = ProviderImpl> {
    pipeline: Mutex<Pipeline<B, T>>,
    last_capture: Mutex<Option<Arc<RgbaImage>>>,
    updates: Arc<watch::Sender<Option<SessionUpdate>>>,
    generation: AtomicU64,
}

impl<B, T> CaptureSession<B, T>
where
    B: OcrBackend + 'static,
    T: Translate + 'static,
{
    pub fn new(pipeline: Pipeline<B, T>) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            pipeline: Mutex::new(pipeline),
            last_capture: Mutex::new(None),
            updates: Arc::new(updates),
            generation: AtomicU64::new(0),
        }
    }

    /// The receiver always holds the most recently completed result. With
    /// several runs in flight the last one to finish wins.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUpdate>> {
        self.updates.subscribe()
    }

    pub fn latest(&self) -> Option<SessionUpdate> {
        self.updates.borrow().clone()
    }

    pub fn last_capture(&self) -> Option<Arc<RgbaImage>> {
        lock(&self.last_capture).clone()
    }

    /// Replaces the retained capture and processes it in the background.
    pub fn capture(&self, image: RgbaImage) -> JoinHandle<()> {
        let image = Arc::new(image);
        *lock(&self.last_capture) = Some(image.clone());
        self.spawn(image)
    }

    /// Later runs, including [`Self::retranslate`], use `translator`.
    pub fn set_translator(&self, translator: T) {
        let mut pipeline = lock(&self.pipeline);
        debug!("session: translator set to {}", translator.name());
        *pipeline = pipeline.with_translator(translator);
    }

    /// Runs the retained capture again; `None` when nothing was captured yet.
    pub fn retranslate(&self) -> Option<JoinHandle<()>> {
        let image = self.last_capture()?;
        Some(self.spawn(image))
    }

    fn spawn(&self, image: Arc<RgbaImage>) -> JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pipeline = lock(&self.pipeline).clone();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            let result = pipeline.process(&image).await.map(Arc::new);
            debug!("session: run {} finished (ok: {})", generation, result.is_ok());
            updates.send_replace(Some(SessionUpdate { generation, result }));
        })
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::FakeTranslator;
    use crate::ocr::OcrChain;
    use crate::ocr::engine::testing::{Script, ScriptedBackend, word};
    use crate::render::{OverlayConfig, OverlayFont, OverlayRenderer};
    use usvg::fontdb;

    fn session(translator: FakeTranslator) -> CaptureSession<ScriptedBackend, FakeTranslator> {
        let tokens = vec![word("Hello", 4, 4, 0, 0), word("there", 4, 30, 1, 0)];
        let pipeline = Pipeline::new(
            OcrChain::new(vec![ScriptedBackend::new("scripted", Script::Tokens(tokens))]),
            OverlayRenderer::with_font(
                &OverlayConfig::default(),
                OverlayFont::fallback(),
                fontdb::Database::new(),
            ),
            translator,
        );
        CaptureSession::new(pipeline)
    }

    fn capture() -> RgbaImage {
        RgbaImage::from_pixel(120, 60, image::Rgba([0, 0, 0, 255]))
    }

    #[tokio::test]
    async fn capture_publishes_the_result() {
        let session = session(FakeTranslator::replying("Hola\nAllí"));
        let mut updates = session.subscribe();
        session.capture(capture()).await.expect("task");

        updates.changed().await.expect("changed");
        let update = updates.borrow().clone().expect("update");
        assert_eq!(update.generation, 1);
        let output = update.result.expect("output");
        assert_eq!(output.translated_text, "Hola\nAllí");
        assert_eq!(session.last_capture().as_deref(), Some(&capture()));
    }

    #[tokio::test]
    async fn retranslate_reuses_the_capture_with_the_new_translator() {
        let session = session(FakeTranslator::replying("Hola\nAllí"));
        assert!(session.retranslate().is_none());

        session.capture(capture()).await.expect("task");
        let replacement = FakeTranslator::replying("Bonjour\nLà");
        session.set_translator(replacement.clone());
        session.retranslate().expect("retained capture").await.expect("task");

        let update = session.latest().expect("update");
        assert_eq!(update.generation, 2);
        assert_eq!(
            update.result.expect("output").translated_text,
            "Bonjour\nLà"
        );
        let requests = replacement.requests.lock().expect("lock");
        assert_eq!(requests.as_slice(), ["Hello\nthere"]);
    }

    #[tokio::test]
    async fn failures_are_published_too() {
        let session = session(FakeTranslator::identity());
        session.capture(RgbaImage::new(0, 0)).await.expect("task");
        let update = session.latest().expect("update");
        assert!(matches!(update.result, Err(PipelineError::InvalidImage(_))));
    }
}
