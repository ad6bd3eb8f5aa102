mod aggregate;
pub mod engine;
mod geom;

pub use aggregate::aggregate_lines;
pub use engine::{
    NativeBackend, OcrBackend, OcrBackendImpl, OcrBackendKind, OcrChain, OcrConfig,
    TesseractBackend, list_tesseract_languages, resolve_tesseract_cmd,
};

/// One recognized word as reported by an OCR backend, in image pixels.
///
/// `block` and `line` are 0-based grouping keys assigned by the backend.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TokenDetection {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub conf: f32,
    pub block: u32,
    pub line: u32,
}

impl TokenDetection {
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    pub fn key(&self) -> (u32, u32) {
        (self.block, self.line)
    }
}

/// Inclusive-exclusive pixel rectangle `[x_min, x_max) x [y_min, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LineBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl LineBox {
    pub fn of_token(token: &TokenDetection) -> Self {
        Self {
            x_min: token.left,
            y_min: token.top,
            x_max: token.right(),
            y_max: token.bottom(),
        }
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains_token(&self, token: &TokenDetection) -> bool {
        geom::contains(self, &LineBox::of_token(token))
    }
}

/// Tokens sharing one (block, line) key, merged into a single text run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Line {
    pub text: String,
    pub bbox: LineBox,
    pub conf: f32,
}
