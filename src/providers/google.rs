use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::retry::send_with_retry;
use super::{Translate, TranslateFuture};

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// The keyless web endpoint used by browser extensions (`client=gtx`).
#[derive(Debug, Clone)]
pub struct GoogleFree {
    client: reqwest::Client,
    base_url: String,
    source_lang: String,
    target_lang: String,
}

impl GoogleFree {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: std::env::var("GOOGLE_TRANSLATE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }
}

impl Translate for GoogleFree {
    fn name(&self) -> &'static str {
        "google"
    }

    fn translate(&self, text: String) -> TranslateFuture {
        let provider = self.clone();
        Box::pin(async move {
            if text.trim().is_empty() {
                return Ok(String::new());
            }
            let url = format!("{}/translate_a/single", provider.base_url);
            let query = [
                ("client", "gtx"),
                ("sl", provider.source_lang.as_str()),
                ("tl", provider.target_lang.as_str()),
                ("dt", "t"),
            ];
            let body = send_with_retry(
                "Google",
                || {
                    provider
                        .client
                        .post(&url)
                        .query(&query)
                        .form(&[("q", text.as_str())])
                },
                |_| None,
            )
            .await?;
            extract_translation(&body)
        })
    }
}

/// The response is a nested array; element 0 lists `[translated, original, ...]`
/// segments, one per sentence, each carrying its own trailing line break.
fn extract_translation(body: &str) -> Result<String> {
    let payload: Value =
        serde_json::from_str(body).with_context(|| "failed to parse Google response JSON")?;
    let root = payload
        .as_array()
        .ok_or_else(|| anyhow!("unexpected Google response shape"))?;
    let segments = match root.first() {
        Some(Value::Array(segments)) => segments,
        Some(Value::Null) | None => return Ok(String::new()),
        Some(_) => return Err(anyhow!("unexpected Google response shape")),
    };
    let mut out = String::new();
    for segment in segments {
        if let Some(text) = segment.get(0).and_then(Value::as_str) {
            out.push_str(text);
        }
    }
    Ok(out)
}
