//! Gemini streaming chat endpoint.
//!
//! Talks to the Generative Language REST API with `streamGenerateContent`
//! over server-sent events. The API is stateless, so each session keeps the
//! conversation turns client-side and replays them with every request. A
//! turn pair is only recorded once its reply has streamed to completion.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use medipal_core::config::AssistantConfig;

use crate::endpoint::{ChatEndpoint, ChatSession, ReplyChunk, ReplyStream, SessionConfig};
use crate::error::ChatError;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Endpoint creating Gemini chat sessions.
#[derive(Clone)]
pub struct GeminiEndpoint {
    client: Client,
    api_base: String,
    model: String,
}

impl GeminiEndpoint {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(config.api_base.clone(), config.model.clone())
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    fn open(&self, config: &SessionConfig) -> Result<GeminiSession, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Init("API key must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Init("model name must not be empty".to_string()));
        }

        Ok(GeminiSession {
            client: self.client.clone(),
            url: self.stream_url(),
            api_key: config.api_key.clone(),
            system_instruction: Content::instruction(&config.system_instruction),
            turns: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl ChatEndpoint for GeminiEndpoint {
    fn create_session(&self, config: &SessionConfig) -> Result<Arc<dyn ChatSession>, ChatError> {
        let session = self.open(config)?;
        debug!(model = %self.model, "Gemini session created");
        Ok(Arc::new(session))
    }
}

/// One Gemini conversation.
pub struct GeminiSession {
    client: Client,
    url: String,
    api_key: String,
    system_instruction: Option<Content>,
    turns: Arc<Mutex<Vec<Content>>>,
}

impl GeminiSession {
    fn request_for(&self, text: &str) -> GenerateContentRequest {
        let mut contents = self
            .turns
            .lock()
            .map(|turns| turns.clone())
            .unwrap_or_default();
        contents.push(Content::turn("user", text));

        GenerateContentRequest {
            contents,
            system_instruction: self.system_instruction.clone(),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, ChatError> {
        let request = self.request_for(text);

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(ChatError::Stream(describe_http_error(status, &body)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let turns = Arc::clone(&self.turns);
        let user_text = text.to_string();

        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut reply = String::new();

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::Stream(e.to_string())));
                        return;
                    }
                };

                match parse_event(&event.data) {
                    Ok(Some(chunk)) => {
                        reply.push_str(&chunk);
                        if tx.send(Ok(ReplyChunk::new(chunk))).is_err() {
                            debug!("Reply receiver dropped, abandoning Gemini stream");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Gemini stream returned an unusable event");
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }

            if reply.is_empty() {
                debug!("Gemini stream ended without text, turn not recorded");
                return;
            }

            match turns.lock() {
                Ok(mut turns) => {
                    turns.push(Content::turn("user", &user_text));
                    turns.push(Content::turn("model", &reply));
                }
                Err(e) => warn!(error = %e, "Gemini turn history lock poisoned"),
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn turn(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    fn instruction(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self, fallback: &str) -> String {
        let message = self.message.clone().unwrap_or_else(|| fallback.to_string());
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => format!("{status}: {message}"),
            _ => message,
        }
    }
}

/// Extract the text carried by one SSE `data` payload.
///
/// `Ok(None)` means the event carried no text (e.g. a final usage report).
fn parse_event(data: &str) -> Result<Option<String>, ChatError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| ChatError::Stream(format!("malformed response from Gemini: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::Stream(error.describe("Gemini reported an error")));
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ChatError::Stream(format!("prompt blocked by Gemini ({reason})")));
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

fn describe_http_error(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe(body))
        .unwrap_or_else(|_| body.trim().to_string());

    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const STREAM_PATH: &str = "/models/gemini-2.5-flash:streamGenerateContent";

    fn sse(chunks: &[&str]) -> String {
        chunks
            .iter()
            .map(|text| {
                let payload = serde_json::json!({
                    "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
                });
                format!("data: {}\r\n\r\n", payload)
            })
            .collect()
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            api_key: "test-key".to_string(),
            system_instruction: "Be kind.".to_string(),
        }
    }

    async fn collect(stream: ReplyStream) -> Vec<Result<ReplyChunk, ChatError>> {
        stream.collect().await
    }

    #[test]
    fn test_parse_event_concatenates_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Sor"},{"text":"ry"}]}}]}"#;
        assert_eq!(parse_event(data).unwrap().as_deref(), Some("Sorry"));
    }

    #[test]
    fn test_parse_event_without_text() {
        let data = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":3}}"#;
        assert_eq!(parse_event(data).unwrap(), None);
        assert_eq!(parse_event("  ").unwrap(), None);
    }

    #[test]
    fn test_parse_event_errors() {
        let malformed = parse_event("not json").unwrap_err();
        assert!(malformed.to_string().contains("malformed response"));

        let blocked = parse_event(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(blocked.to_string().contains("SAFETY"));

        let reported = parse_event(
            r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            reported.to_string(),
            "Failed to get response: UNAVAILABLE: The model is overloaded."
        );
    }

    #[test]
    fn test_describe_http_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let message = describe_http_error(StatusCode::BAD_REQUEST, body);
        assert!(message.contains("400"));
        assert!(message.contains("INVALID_ARGUMENT: API key not valid."));

        assert_eq!(
            describe_http_error(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502 Bad Gateway"
        );
    }

    #[test]
    fn test_create_session_rejects_blank_key() {
        let endpoint = GeminiEndpoint::new("http://localhost", DEFAULT_GEMINI_MODEL);
        let config = SessionConfig {
            api_key: " ".to_string(),
            system_instruction: "Be kind.".to_string(),
        };
        assert!(matches!(
            endpoint.create_session(&config),
            Err(ChatError::Init(_))
        ));
    }

    #[test]
    fn test_request_includes_instruction_and_history() {
        let endpoint = GeminiEndpoint::new("http://localhost/", DEFAULT_GEMINI_MODEL);
        let session = endpoint.open(&session_config()).unwrap();
        session
            .turns
            .lock()
            .unwrap()
            .extend([Content::turn("user", "Hi"), Content::turn("model", "Hello!")]);

        let body = serde_json::to_value(session.request_for("I have a headache")).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert!(body["systemInstruction"].get("role").is_none());
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "I have a headache");
        assert_eq!(
            session.url,
            "http://localhost/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn test_stream_reply_yields_chunks_and_records_turns() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::Regex(
                r#""systemInstruction":\{"parts":\[\{"text":"Be kind\."\}\]\}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse(&["Sor", "ry to", "hear that..."]))
            .create_async()
            .await;

        let endpoint = GeminiEndpoint::new(server.url(), DEFAULT_GEMINI_MODEL);
        let session = endpoint.open(&session_config()).unwrap();

        let stream = session.stream_reply("I have a headache").await.unwrap();
        let chunks: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|item| item.unwrap().text)
            .collect();

        assert_eq!(chunks, vec!["Sor", "ry to", "hear that..."]);
        mock.assert_async().await;

        let turns = session.turns.lock().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role.as_deref(), Some("user"));
        assert_eq!(turns[1].role.as_deref(), Some("model"));
        assert_eq!(
            turns[1].parts[0].text.as_deref(),
            Some("Sorry to hear that...")
        );
    }

    #[tokio::test]
    async fn test_stream_reply_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(
                r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#,
            )
            .create_async()
            .await;

        let endpoint = GeminiEndpoint::new(server.url(), DEFAULT_GEMINI_MODEL);
        let session = endpoint.create_session(&session_config()).unwrap();

        let err = match session.stream_reply("hello").await {
            Ok(_) => panic!("expected HTTP error"),
            Err(e) => e,
        };
        assert!(matches!(err, ChatError::Stream(_)));
        assert!(err.to_string().contains("API key not valid."));
    }

    #[tokio::test]
    async fn test_stream_reply_mid_stream_failure_keeps_history_clean() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}data: {{broken\r\n\r\n", sse(&["Sor"]));
        let _mock = server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let endpoint = GeminiEndpoint::new(server.url(), DEFAULT_GEMINI_MODEL);
        let session = endpoint.open(&session_config()).unwrap();

        let items = collect(session.stream_reply("hello").await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "Sor");
        assert!(items[1].is_err());

        assert!(session.turns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_recorded() {
        let mut server = mockito::Server::new_async().await;
        let empty = "data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\r\n\r\n";
        let _empty_mock = server
            .mock("POST", STREAM_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r#""text":"hello""#.to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(empty)
            .create_async()
            .await;

        let endpoint = GeminiEndpoint::new(server.url(), DEFAULT_GEMINI_MODEL);
        let session = endpoint.open(&session_config()).unwrap();

        let items = collect(session.stream_reply("hello").await.unwrap()).await;
        assert!(items.is_empty());
        assert!(session.turns.lock().unwrap().is_empty());

        let body = serde_json::to_value(session.request_for("again")).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["parts"][0]["text"], "again");
    }
}
