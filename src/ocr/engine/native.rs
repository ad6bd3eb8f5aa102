use image::RgbaImage;

use super::OcrBackend;
use crate::error::OcrBackendError;
use crate::ocr::TokenDetection;

const BACKEND_NAME: &str = "native";

/// Platform OCR engine. Only Windows ships one (`Windows.Media.Ocr`); on other
/// platforms construction fails and the chain moves on to tesseract.
pub struct NativeBackend {
    #[cfg(windows)]
    engine: windows::Media::Ocr::OcrEngine,
}

#[cfg(windows)]
impl NativeBackend {
    pub fn new() -> Result<Self, OcrBackendError> {
        use windows::Globalization::Language;
        use windows::Media::Ocr::OcrEngine;
        use windows::core::HSTRING;

        let engine = OcrEngine::TryCreateFromUserProfileLanguages()
            .or_else(|_| {
                let language = Language::CreateLanguage(&HSTRING::from("en-US"))?;
                OcrEngine::TryCreateFromLanguage(&language)
            })
            .map_err(|err| OcrBackendError::unavailable(BACKEND_NAME, err.message()))?;
        Ok(Self { engine })
    }

    fn run(&self, image: &RgbaImage) -> windows::core::Result<Vec<TokenDetection>> {
        use windows::Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap};
        use windows::Storage::Streams::DataWriter;

        let (width, height) = image.dimensions();
        let mut bgra = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            bgra.extend_from_slice(&[b, g, r, a]);
        }

        let writer = DataWriter::new()?;
        writer.WriteBytes(&bgra)?;
        let buffer = writer.DetachBuffer()?;
        let bitmap = SoftwareBitmap::CreateCopyFromBuffer(
            &buffer,
            BitmapPixelFormat::Bgra8,
            width as i32,
            height as i32,
        )?;
        let result = self.engine.RecognizeAsync(&bitmap)?.get()?;

        let mut tokens = Vec::new();
        for (line_idx, line) in result.Lines()?.into_iter().enumerate() {
            for word in line.Words()? {
                let rect = word.BoundingRect()?;
                tokens.push(TokenDetection {
                    text: word.Text()?.to_string(),
                    left: rect.X.max(0.0).round() as u32,
                    top: rect.Y.max(0.0).round() as u32,
                    width: rect.Width.max(0.0).round() as u32,
                    height: rect.Height.max(0.0).round() as u32,
                    // Windows.Media.Ocr does not report per-word confidence.
                    conf: 100.0,
                    block: 0,
                    line: line_idx as u32,
                });
            }
        }
        Ok(tokens)
    }
}

#[cfg(not(windows))]
impl NativeBackend {
    pub fn new() -> Result<Self, OcrBackendError> {
        Err(OcrBackendError::unavailable(
            BACKEND_NAME,
            "no platform OCR engine on this operating system",
        ))
    }

    fn run(&self, _image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        Err(OcrBackendError::unavailable(
            BACKEND_NAME,
            "no platform OCR engine on this operating system",
        ))
    }
}

impl OcrBackend for NativeBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrBackendError::unavailable(BACKEND_NAME, "empty image"));
        }
        #[cfg(windows)]
        {
            self.run(image).map_err(|err| {
                OcrBackendError::failed(BACKEND_NAME, anyhow::anyhow!("{}", err.message()))
            })
        }
        #[cfg(not(windows))]
        {
            self.run(image)
        }
    }
}
