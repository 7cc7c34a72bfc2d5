//! Google Gemini client over the Generative Language REST API

use super::{ChatTurn, InlineImage, LlmClient, LlmError, LlmRequest, Role};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
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

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gemini REST client
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            embedding_model: embedding_model.into(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn build_request(request: &LlmRequest) -> GenerateRequest {
        let mut contents: Vec<Content> = request.history.iter().map(history_content).collect();

        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        parts.extend(request.images.iter().map(image_part));
        contents.push(Content {
            role: Some("user".to_string()),
            parts,
        });

        let system_instruction = request.system.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part::Text { text: text.clone() }],
        });

        let generation_config = if request.wants_json() || request.temperature.is_some() {
            Some(GenerationConfig {
                temperature: request.temperature,
                response_mime_type: request
                    .wants_json()
                    .then(|| "application/json".to_string()),
                response_schema: request.json_schema.clone(),
            })
        } else {
            None
        };

        GenerateRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<String, LlmError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(map_api_error(status.as_u16(), &text));
        }
        Ok(text)
    }
}

fn history_content(turn: &ChatTurn) -> Content {
    let role = match turn.role {
        Role::User => "user",
        Role::Model => "model",
    };
    Content {
        role: Some(role.to_string()),
        parts: vec![Part::Text {
            text: turn.text.clone(),
        }],
    }
}

fn image_part(image: &InlineImage) -> Part {
    Part::InlineData {
        inline_data: Blob {
            mime_type: image.mime_type.clone(),
            data: image.to_base64(),
        },
    }
}

/// Map a non-success status and body to an error
fn map_api_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .map_or_else(|| body.to_string(), |e| e.message);

    match status {
        429 => LlmError::RateLimited(quota_message(&message)),
        _ => LlmError::Api { status, message },
    }
}

/// Turn Gemini's quota text into something a user can act on
fn quota_message(message: &str) -> String {
    if let Some(pos) = message.find("Please retry in ") {
        let rest = &message[pos + "Please retry in ".len()..];
        if let Some(end) = rest.find('s') {
            if let Ok(seconds) = rest[..end].parse::<f64>() {
                return format!(
                    "AI service quota exceeded. Please try again in {} seconds.",
                    seconds.ceil() as u64
                );
            }
        }
    }
    "AI service quota exceeded. Please wait a moment and try again.".to_string()
}

fn response_text(response: GenerateResponse) -> Result<String, LlmError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Api {
            status: 400,
            message: format!("prompt blocked: {reason}"),
        });
    }

    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = tracing::field::Empty, images = request.images.len()))]
    async fn generate(&self, request: LlmRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model).to_string();
        tracing::Span::current().record("model", model.as_str());

        let body = Self::build_request(&request);
        let url = self.endpoint(&model, "generateContent");

        debug!("Sending generateContent request");
        let raw = self.post_json(&url, &body).await?;

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Parse(e.to_string()))?;
        response_text(parsed)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_ref = format!("models/{}", self.embedding_model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: model_ref.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part::Text { text: text.clone() }],
                    },
                })
                .collect(),
        };
        let url = self.endpoint(&self.embedding_model, "batchEmbedContents");
        let raw = self.post_json(&url, &body).await?;

        let parsed: BatchEmbedResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Parse(e.to_string()))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(LlmError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            server.uri(),
            SecretString::new("test-key".to_string()),
            "gemini-test",
            "embed-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_sends_schema_and_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "generationConfig": {"responseMimeType": "application/json"},
                "contents": [{"role": "user", "parts": [
                    {"text": "plan"},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "AQI="}}
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"delegations\": []}"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = LlmRequest::new("plan")
            .with_system("sys")
            .with_schema(json!({"type": "OBJECT"}))
            .with_image(InlineImage::new("image/jpeg", vec![1, 2]));
        let text = client(&server).generate(request).await.unwrap();
        assert_eq!(text, "{\"delegations\": []}");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Quota exceeded. Please retry in 6.4s.", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate(LlmRequest::new("x")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "rate limited: AI service quota exceeded. Please try again in 7 seconds."
        );
    }

    #[tokio::test]
    async fn test_server_error_and_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server).generate(LlmRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Empty));

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&failing)
            .await;
        let err = client(&failing).generate(LlmRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_batch_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/embed-test:batchEmbedContents"))
            .and(body_partial_json(json!({
                "requests": [{"model": "models/embed-test"}, {"model": "models/embed-test"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]
            })))
            .mount(&server)
            .await;

        let vectors = client(&server)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_history_is_sent_before_prompt() {
        let request = LlmRequest::new("now")
            .with_history(vec![ChatTurn::user("before"), ChatTurn::model("reply")]);
        let body = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "now");
        assert!(body.get("generationConfig").is_none());
    }
}
