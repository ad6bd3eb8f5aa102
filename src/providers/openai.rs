use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::send_with_retry;
use super::{Translate, TranslateFuture};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    key: String,
    model: String,
    target_lang: String,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            target_lang: "zh-CN".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_target_lang(mut self, lang: impl Into<String>) -> Self {
        let lang = lang.into();
        if !lang.trim().is_empty() {
            self.target_lang = lang;
        }
        self
    }
}

impl Translate for OpenAI {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn translate(&self, text: String) -> TranslateFuture {
        let provider = self.clone();
        Box::pin(async move {
            if text.trim().is_empty() {
                return Ok(String::new());
            }
            let url = format!("{}/chat/completions", base_url());
            let body = json!({
                "model": provider.model,
                "messages": [
                    {"role": "system", "content": system_prompt(&provider.target_lang)},
                    {"role": "user", "content": text}
                ]
            });
            let response = send_with_retry(
                "OpenAI",
                || {
                    provider
                        .client
                        .post(&url)
                        .bearer_auth(&provider.key)
                        .json(&body)
                },
                extract_openai_error,
            )
            .await?;
            extract_content(&response)
        })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn system_prompt(target_lang: &str) -> String {
    format!(
        "You are a professional translator. Translate the user's text to {}. \
         IMPORTANT: Preserve the number of lines and line breaks exactly as they are \
         in the source text. Do not merge, split, or omit any lines. \
         Return only the translated text.",
        target_lang
    )
}

fn extract_content(text: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from OpenAI"))?;
    Ok(content.trim().to_string())
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trimmed_message_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "\n你好\n世界\n"}}]
        }"#;
        assert_eq!(extract_content(body).unwrap(), "你好\n世界");
    }

    #[test]
    fn missing_content_is_an_error() {
        assert!(extract_content(r#"{"choices": []}"#).is_err());
        assert!(extract_content(r#"{"choices": [{"message": {"content": null}}]}"#).is_err());
    }

    #[test]
    fn error_body_is_summarized() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error", "code": "invalid_api_key"}}"#;
        let summary = extract_openai_error(body).unwrap();
        insta::assert_snapshot!(summary, @"Incorrect API key provided | type: invalid_request_error | code: invalid_api_key");
        assert_eq!(extract_openai_error("not json"), None);
    }

    #[test]
    fn prompt_requires_line_preservation() {
        let prompt = system_prompt("ja");
        assert!(prompt.contains("to ja."));
        assert!(prompt.contains("Preserve the number of lines"));
    }
}
