//! One translation request per capture, split back into per-line results.
//!
//! Lines are joined with `\n` and the provider is trusted to keep the line
//! count. When it returns fewer lines the tail is padded with empty strings;
//! extra lines are dropped. A provider that merges two lines into one shifts
//! every later line by one; that case cannot be detected here.

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::providers::Translate;

pub const LINE_SEPARATOR: char = '\n';

pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `translated` on line breaks and fits the result to `expected`
/// entries by index.
pub fn align_lines(translated: &str, expected: usize) -> Vec<String> {
    let mut lines = translated
        .split(LINE_SEPARATOR)
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect::<Vec<_>>();
    if lines.len() != expected {
        debug!(
            "batch: provider returned {} line(s) for {} input line(s)",
            lines.len(),
            expected
        );
    }
    lines.resize(expected, String::new());
    lines
}

pub async fn translate_lines<S, T>(lines: &[S], translator: &T) -> Result<Vec<String>, PipelineError>
where
    S: AsRef<str>,
    T: Translate + ?Sized,
{
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let request = join_lines(lines);
    let response = translator.translate(request).await.map_err(|err| {
        warn!("batch: {} translation failed: {:#}", translator.name(), err);
        PipelineError::TranslationFailed(format!("{:#}", err))
    })?;
    Ok(align_lines(&response, lines.len()))
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    use crate::providers::{Translate, TranslateFuture};

    /// Returns a canned response (or the input when `None`) and records every
    /// request it receives.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTranslator {
        pub(crate) response: Option<String>,
        pub(crate) fail: bool,
        pub(crate) requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeTranslator {
        pub(crate) fn identity() -> Self {
            Self::default()
        }

        pub(crate) fn replying(response: &str) -> Self {
            Self {
                response: Some(response.to_string()),
                ..Self::default()
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    impl Translate for FakeTranslator {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn translate(&self, text: String) -> TranslateFuture {
            self.requests.lock().expect("requests lock").push(text.clone());
            let response = self.response.clone();
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    return Err(anyhow!("service unavailable"));
                }
                Ok(response.unwrap_or(text))
            })
        }
    }
}
