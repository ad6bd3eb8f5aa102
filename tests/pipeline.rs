use image::{Rgba, RgbaImage};
use overlay_translator_rust::render::{OverlayCanvas, OverlayFont, PatchRect, paint_overlay};
use overlay_translator_rust::{
    CaptureSession, OcrBackend, OcrBackendError, OcrChain, OverlayConfig, OverlayRenderer,
    Pipeline, PipelineError, RenderError, TokenDetection, Translate, aggregate_lines,
};
use overlay_translator_rust::providers::TranslateFuture;
use usvg::fontdb;

struct FixedOcr(Vec<TokenDetection>);

impl OcrBackend for FixedOcr {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        Ok(self.0.clone())
    }
}

struct BrokenOcr;

impl OcrBackend for BrokenOcr {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        Err(OcrBackendError::unavailable("broken", "not installed"))
    }
}

enum Ocr {
    Fixed(FixedOcr),
    Broken(BrokenOcr),
}

impl OcrBackend for Ocr {
    fn name(&self) -> &'static str {
        match self {
            Ocr::Fixed(inner) => inner.name(),
            Ocr::Broken(inner) => inner.name(),
        }
    }

    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        match self {
            Ocr::Fixed(inner) => inner.recognize(image),
            Ocr::Broken(inner) => inner.recognize(image),
        }
    }
}

/// Upper-cases every line, keeping line breaks.
struct Shouting;

impl Translate for Shouting {
    fn name(&self) -> &'static str {
        "shouting"
    }

    fn translate(&self, text: String) -> TranslateFuture {
        Box::pin(async move { Ok(text.to_uppercase()) })
    }
}

fn token(text: &str, left: u32, top: u32, block: u32, line: u32) -> TokenDetection {
    TokenDetection {
        text: text.to_string(),
        left,
        top,
        width: 10 * text.chars().count() as u32,
        height: 14,
        conf: 90.0,
        block,
        line,
    }
}

fn tokens() -> Vec<TokenDetection> {
    vec![
        token("File", 4, 4, 0, 0),
        token("Edit", 54, 4, 0, 0),
        token("Save", 4, 60, 1, 0),
        token("changes?", 54, 60, 1, 0),
        token("View", 104, 4, 0, 0),
    ]
}

fn renderer() -> OverlayRenderer {
    OverlayRenderer::with_font(
        &OverlayConfig::default(),
        OverlayFont::fallback(),
        fontdb::Database::new(),
    )
}

fn system_font_renderer() -> Option<OverlayRenderer> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if db.is_empty() {
        return None;
    }
    Some(OverlayRenderer::with_font(
        &OverlayConfig::default(),
        OverlayFont::fallback(),
        db,
    ))
}

fn dark_pixels(image: &RgbaImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> usize {
    y.flat_map(|row| x.clone().map(move |col| (col, row)))
        .filter(|&(col, row)| image.get_pixel(col, row).0[..3].iter().all(|c| *c < 128))
        .count()
}

fn capture() -> RgbaImage {
    RgbaImage::from_pixel(200, 100, Rgba([40, 44, 52, 255]))
}

#[test]
fn lines_follow_first_appearance_and_cover_their_tokens() {
    let tokens = tokens();
    let lines = aggregate_lines(&tokens);
    let summary = lines
        .iter()
        .map(|line| {
            format!(
                "{} [{},{} -> {},{}]",
                line.text, line.bbox.x_min, line.bbox.y_min, line.bbox.x_max, line.bbox.y_max
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(summary, @r"
    File Edit View [4,4 -> 144,18]
    Save changes? [4,60 -> 134,74]
    ");
    for token in &tokens {
        assert!(lines.iter().any(|line| line.bbox.contains_token(token)));
    }
}

#[tokio::test]
async fn capture_is_translated_and_painted_over() {
    let ocr = OcrChain::new(vec![Ocr::Broken(BrokenOcr), Ocr::Fixed(FixedOcr(tokens()))]);
    let pipeline = Pipeline::new(ocr, renderer(), Shouting);
    let image = capture();

    let output = pipeline.process(&image).await.expect("output");
    assert_eq!(output.original_text, "File Edit View\nSave changes?");
    assert_eq!(output.translated_text, "FILE EDIT VIEW\nSAVE CHANGES?");
    assert_eq!(
        output.issues,
        vec![PipelineError::RenderPartialFailure { failed: 2, total: 2 }]
    );
    assert_eq!(output.overlay.get_pixel(2, 2).0, [255, 255, 255, 255]);
    assert_eq!(output.overlay.get_pixel(190, 90).0, [40, 44, 52, 255]);
    assert_eq!(image, capture());
}

#[tokio::test]
async fn translated_text_reaches_the_overlay() {
    let Some(renderer) = system_font_renderer() else {
        return;
    };
    let ocr = OcrChain::new(vec![Ocr::Fixed(FixedOcr(tokens()))]);
    let pipeline = Pipeline::new(ocr, renderer, Shouting);

    let output = pipeline.process(&capture()).await.expect("output");
    assert!(output.is_complete(), "issues: {:?}", output.issues);
    // Both patches, first line [4,4 -> 144,18] and second [4,60 -> 134,74].
    assert!(dark_pixels(&output.overlay, 2..146, 2..20) > 0);
    assert!(dark_pixels(&output.overlay, 2..136, 58..76) > 0);
    assert_eq!(output.overlay.get_pixel(190, 90).0, [40, 44, 52, 255]);
}

#[tokio::test]
async fn no_working_backend_is_reported() {
    let pipeline = Pipeline::new(OcrChain::new(vec![Ocr::Broken(BrokenOcr)]), renderer(), Shouting);
    let err = pipeline.process(&capture()).await.expect_err("no backend");
    assert_eq!(err, PipelineError::NoOcrBackend);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn session_retranslates_the_retained_capture() {
    let ocr = OcrChain::new(vec![Ocr::Fixed(FixedOcr(tokens()))]);
    let session = CaptureSession::new(Pipeline::new(ocr, renderer(), Shouting));
    session.capture(capture()).await.expect("capture task");
    session.retranslate().expect("retained").await.expect("retranslate task");

    let update = session.latest().expect("update");
    assert_eq!(update.generation, 2);
    let output = update.result.expect("output");
    assert_eq!(output.translations, vec!["FILE EDIT VIEW", "SAVE CHANGES?"]);
}

#[derive(Default)]
struct OrderLog(Vec<&'static str>);

impl OverlayCanvas for OrderLog {
    fn fill_patch(&mut self, _patch: PatchRect) {
        self.0.push("patch");
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        text.len() as f32 * font_size * 0.5
    }

    fn draw_text(&mut self, _x: f32, _y: f32, _text: &str, _size: f32) -> Result<(), RenderError> {
        self.0.push("text");
        Ok(())
    }
}

#[test]
fn overlapping_lines_get_every_patch_before_any_text() {
    let lines = aggregate_lines(&[
        token("one", 0, 0, 0, 0),
        token("two", 0, 12, 0, 1),
        token("three", 0, 24, 0, 2),
    ]);
    let texts = vec!["uno".to_string(), "dos".to_string(), "tres".to_string()];
    let mut log = OrderLog::default();
    let failures = paint_overlay(&mut log, (100, 60), &lines, &texts);
    assert!(failures.is_empty());
    assert_eq!(log.0, vec!["patch", "patch", "patch", "text", "text", "text"]);
}
