use log::debug;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::Endpoints;
use crate::prompt::{SUMMARY_QUESTION, build_prompt};

/// Failures from the chat-completion API, one variant per user-facing message
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: the chat API rejected the prompt (400)")]
    InvalidRequest,

    #[error("unauthorized: check your Gemini API key (401)")]
    Unauthorized,

    #[error("forbidden: this API key may not use the chat model (403)")]
    Forbidden,

    #[error("rate limited: too many requests, try again later (429)")]
    RateLimited,

    #[error("the chat service had a server error (500)")]
    ServerError,

    #[error("chat request failed with status {0}")]
    Failed(StatusCode),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected chat API response format")]
    InvalidResponse,
}

impl ChatError {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ChatError::InvalidRequest,
            401 => ChatError::Unauthorized,
            403 => ChatError::Forbidden,
            429 => ChatError::RateLimited,
            500 => ChatError::ServerError,
            _ => ChatError::Failed(status),
        }
    }
}

/// Client for the Gemini generateContent endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints, model: &str) -> Self {
        Self {
            client,
            base_url: endpoints.gemini.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Send one prompt and return the completion text. No history is sent.
    pub async fn complete(&self, api_key: &str, prompt: &str) -> Result<String, ChatError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        debug!("Requesting completion from {} ({} prompt chars)", self.model, prompt.len());

        let body = serde_json::json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": prompt }]
                }
            ]
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            debug!("Chat API returned {status}: {body}");
            return Err(ChatError::from_status(status));
        }

        let body = resp.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            debug!("Chat API returned undecodable body: {e}");
            ChatError::InvalidResponse
        })?;
        extract_gemini_text(&json)
    }

    /// Ask the model for a structured summary of a video context block
    pub async fn summarize(&self, api_key: &str, context: &str) -> Result<String, ChatError> {
        self.complete(api_key, &build_prompt(context, SUMMARY_QUESTION)).await
    }
}

fn extract_gemini_text(json: &serde_json::Value) -> Result<String, ChatError> {
    let text = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text")?.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ChatError::InvalidResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatClient {
        let endpoints = Endpoints {
            gemini: server.uri(),
            ..Endpoints::default()
        };
        ChatClient::new(reqwest::Client::new(), &endpoints, "gemini-test")
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(ChatError::from_status(StatusCode::BAD_REQUEST), ChatError::InvalidRequest));
        assert!(matches!(ChatError::from_status(StatusCode::UNAUTHORIZED), ChatError::Unauthorized));
        assert!(matches!(ChatError::from_status(StatusCode::FORBIDDEN), ChatError::Forbidden));
        assert!(matches!(ChatError::from_status(StatusCode::TOO_MANY_REQUESTS), ChatError::RateLimited));
        assert!(matches!(
            ChatError::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            ChatError::ServerError
        ));
        assert!(matches!(
            ChatError::from_status(StatusCode::BAD_GATEWAY),
            ChatError::Failed(StatusCode::BAD_GATEWAY)
        ));
    }

    #[test]
    fn test_extract_gemini_text() {
        let json = serde_json::json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there."}]}}
            ]
        });
        assert_eq!(extract_gemini_text(&json).unwrap(), "Hello there.");
    }

    #[test]
    fn test_extract_gemini_text_empty() {
        let json = serde_json::json!({"candidates": []});
        assert!(matches!(extract_gemini_text(&json), Err(ChatError::InvalidResponse)));
    }

    #[tokio::test]
    async fn test_complete_sends_single_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "gm456"))
            .and(body_string_contains("what is borrowing?"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "An answer."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server).complete("gm456", "what is borrowing?").await.unwrap();
        assert_eq!(reply, "An answer.");
    }

    #[tokio::test]
    async fn test_complete_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).complete("gm456", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::RateLimited));
    }

    #[tokio::test]
    async fn test_complete_rejects_non_json_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway login</html>"))
            .mount(&server)
            .await;

        let err = client(&server).complete("gm456", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_summarize_uses_summary_question() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Summarize this video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "- point"}]}}]
            })))
            .mount(&server)
            .await;

        let summary = client(&server).summarize("gm456", "Video title: x").await.unwrap();
        assert_eq!(summary, "- point");
    }
}
