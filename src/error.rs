use thiserror::Error;

/// Outcome classes surfaced by [`crate::Pipeline::process`].
///
/// `NoOcrBackend` and `NoTextFound` are ordinary results the caller is
/// expected to display, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("no OCR backend available")]
    NoOcrBackend,

    #[error("no text found")]
    NoTextFound,

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("{failed} of {total} line(s) could not be drawn")]
    RenderPartialFailure { failed: usize, total: usize },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short text suitable for a status line in the result window.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::NoOcrBackend => "No OCR engine is available".to_string(),
            PipelineError::NoTextFound => "No text found".to_string(),
            PipelineError::TranslationFailed(reason) => {
                format!("Translation Error: {}", truncate_reason(reason, 80))
            }
            PipelineError::RenderPartialFailure { failed, total } => {
                format!("{} of {} line(s) could not be drawn", failed, total)
            }
            PipelineError::InvalidImage(reason) => format!("Invalid capture: {}", reason),
            PipelineError::Internal(reason) => format!("Error: {}", truncate_reason(reason, 80)),
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::RenderPartialFailure { .. })
    }
}

#[derive(Debug, Error)]
pub enum OcrBackendError {
    /// The engine cannot be used on this machine (missing binary, unsupported
    /// platform, failed initialization).
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} failed: {source:#}")]
    Failed {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl OcrBackendError {
    pub fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        OcrBackendError::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub fn failed(backend: &'static str, source: anyhow::Error) -> Self {
        OcrBackendError::Failed { backend, source }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("line box has zero area ({width}x{height})")]
    EmptyBox { width: u32, height: u32 },

    #[error("failed to lay out text: {0}")]
    Text(String),
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn truncate_reason(reason: &str, max_chars: usize) -> String {
    if reason.chars().count() <= max_chars {
        return reason.to_string();
    }
    let mut out = reason.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
