use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use super::{OcrBackend, OcrConfig, parse, preprocess};
use crate::error::OcrBackendError;
use crate::ocr::TokenDetection;

const BACKEND_NAME: &str = "tesseract";

/// Generic OCR engine driven through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    command: PathBuf,
    languages: String,
    psm: u32,
    upscale: bool,
}

impl TesseractBackend {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrBackendError> {
        let languages = normalize_ocr_languages(&config.tesseract_cmd, &config.languages)
            .map_err(|err| OcrBackendError::unavailable(BACKEND_NAME, format!("{:#}", err)))?;
        Ok(Self {
            command: config.tesseract_cmd.clone(),
            languages,
            psm: config.psm,
            upscale: config.upscale,
        })
    }

    fn run_tsv(&self, path: &Path) -> Result<String, OcrBackendError> {
        let output = Command::new(&self.command)
            .args(tesseract_args(path, &self.languages, self.psm))
            .output()
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    OcrBackendError::unavailable(
                        BACKEND_NAME,
                        format!("{} not found", self.command.display()),
                    )
                } else {
                    OcrBackendError::failed(
                        BACKEND_NAME,
                        anyhow!(err).context("failed to run tesseract"),
                    )
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrBackendError::failed(
                BACKEND_NAME,
                anyhow!("tesseract exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TokenDetection>, OcrBackendError> {
        let (prepared, scale) = preprocess::prepare_for_ocr(image, self.upscale);
        let tmp = write_temp_png(&prepared)
            .map_err(|err| OcrBackendError::failed(BACKEND_NAME, err))?;
        debug!(
            "ocr: tesseract on {}x{} (scale {})",
            prepared.width(),
            prepared.height(),
            scale
        );
        let tsv = self.run_tsv(tmp.path())?;
        let tokens = parse::parse_tsv_tokens(&tsv);
        Ok(preprocess::scale_tokens(tokens, scale))
    }
}

/// Arguments for one TSV run. The page segmentation mode comes from settings
/// and defaults to fully automatic segmentation so that separate text blocks
/// in a large selection are all reported.
pub(super) fn tesseract_args(path: &Path, languages: &str, psm: u32) -> Vec<OsString> {
    vec![
        path.as_os_str().to_os_string(),
        OsString::from("stdout"),
        OsString::from("-l"),
        OsString::from(languages),
        OsString::from("--psm"),
        OsString::from(psm.to_string()),
        OsString::from("tsv"),
    ]
}

fn write_temp_png(image: &image::GrayImage) -> Result<tempfile::NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();
    Ok(tmp)
}

pub fn list_tesseract_languages(command: &Path) -> Result<Vec<String>> {
    let output = Command::new(command)
        .arg("--list-langs")
        .output()
        .with_context(|| format!("failed to run {} --list-langs", command.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_ocr_languages(command: &Path, requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    let available = match list_tesseract_languages(command) {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };
    select_languages(trimmed, &available)
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not installed: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not installed: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

/// Picks the tesseract executable: the configured value when set, otherwise
/// the first common install location that exists, otherwise `tesseract` from
/// `PATH`.
pub fn resolve_tesseract_cmd(configured: Option<&str>) -> PathBuf {
    if let Some(value) = configured.map(str::trim).filter(|value| !value.is_empty()) {
        return PathBuf::from(value);
    }
    default_tesseract_candidates()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from("tesseract"))
}

fn default_tesseract_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(windows) {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            let local = Path::new(&local);
            candidates.push(local.join(r"Programs\Tesseract-OCR\tesseract.exe"));
            candidates.push(local.join(r"Tesseract-OCR\tesseract.exe"));
        }
        candidates.push(PathBuf::from(r"C:\Program Files\Tesseract-OCR\tesseract.exe"));
    } else {
        candidates.push(PathBuf::from("/opt/homebrew/bin/tesseract"));
        candidates.push(PathBuf::from("/usr/local/bin/tesseract"));
        candidates.push(PathBuf::from("/usr/bin/tesseract"));
    }
    candidates
}
