//! OpenAI HTTP 客户端：Whisper 转写、多图描述、提示词生成

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use crate::error::{ServiceError, ServiceResult};
use crate::http::{check_status, with_retry};
use crate::prompt::{KEYFRAME_PROMPT, SONG_PROMPT_TEMPLATE};
use crate::services::{FrameDescriber, PromptWriter, SpeechToText};

/// OpenAI 客户端配置
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    /// 提示词生成使用的模型
    pub chat_model: String,
    /// 关键帧描述使用的模型
    pub vision_model: String,
    /// 语音转写使用的模型
    pub whisper_model: String,
    pub vision_max_tokens: u32,
    pub prompt_max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    /// 第一次重试前的等待时间，之后每次翻倍
    pub retry_backoff: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            vision_model: "gpt-4o".to_string(),
            whisper_model: "whisper-1".to_string(),
            vision_max_tokens: 1000,
            prompt_max_tokens: 200,
            timeout: Duration::from_secs(300),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI 客户端
pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> ServiceResult<Self> {
        if config.api_key.is_empty() {
            return Err(ServiceError::NotConfigured(
                "未设置 OpenAI API Key（OPEN_AI_SECRET_KEY）".to_string(),
            ));
        }
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    async fn retry<F, Fut, T>(&self, operation: F) -> ServiceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        with_retry("OpenAI", self.config.max_retries, self.config.retry_backoff, operation).await
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> ServiceResult<String> {
        let url = self.url("chat/completions");
        debug!("发送 chat completion 请求: model={}", request.model);

        let response: ChatResponse = self
            .retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .json(request)
                    .send()
                    .await?;
                Ok::<_, ServiceError>(check_status(response).await?.json::<ChatResponse>().await?)
            })
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::UnexpectedResponse("响应中没有 choices".to_string()))
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, audio_path: &Path) -> ServiceResult<String> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let url = self.url("audio/transcriptions");
        debug!("上传音频进行转写: {} ({} 字节)", file_name, bytes.len());

        let response: TranscriptionResponse = self
            .retry(|| async {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str("audio/wav")?;
                let form = Form::new()
                    .text("model", self.config.whisper_model.clone())
                    .part("file", part);
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .multipart(form)
                    .send()
                    .await?;
                Ok::<_, ServiceError>(check_status(response).await?.json::<TranscriptionResponse>().await?)
            })
            .await?;

        Ok(response.text)
    }
}

#[async_trait]
impl FrameDescriber for OpenAiClient {
    async fn describe(&self, keyframe_paths: &[PathBuf]) -> ServiceResult<String> {
        let mut parts = vec![ContentPart::Text {
            text: KEYFRAME_PROMPT.to_string(),
        }];

        for (i, path) in keyframe_paths.iter().enumerate() {
            let bytes = tokio::fs::read(path).await?;
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{}", base64_engine.encode(&bytes)),
                },
            });
            parts.push(ContentPart::Text {
                text: format!("This is keyframe_{}.", i + 1),
            });
        }

        let request = ChatRequest {
            model: &self.config.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(parts),
            }],
            max_tokens: self.config.vision_max_tokens,
        };

        self.chat(&request).await
    }
}

#[async_trait]
impl PromptWriter for OpenAiClient {
    async fn write_prompt(&self, content: &str) -> ServiceResult<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SONG_PROMPT_TEMPLATE.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(content.to_string()),
                },
            ],
            max_tokens: self.config.prompt_max_tokens,
        };

        Ok(self.chat(&request).await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            retry_backoff: Duration::from_millis(5),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    fn chat_reply(content: &str) -> serde_json::Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            OpenAiClient::new(OpenAiConfig::default()),
            Err(ServiceError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_write_prompt_trims_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "max_tokens": 200 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("  A mellow lo-fi song about rain \n")))
            .expect(1)
            .mount(&server)
            .await;

        let prompt = client(&server).write_prompt("Keyframe 1: rain").await.unwrap();
        assert_eq!(prompt, "A mellow lo-fi song about rain");
    }

    #[tokio::test]
    async fn test_describe_sends_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "max_tokens": 1000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Keyframe 1: a cat")))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("keyframe_1.jpg");
        std::fs::write(&image_path, b"not really a jpeg").unwrap();

        let reply = client(&server).describe(&[image_path]).await.unwrap();
        assert_eq!(reply, "Keyframe 1: a cat");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[1]["type"], "image_url");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(content[2]["text"], "This is keyframe_1.");
    }

    #[tokio::test]
    async fn test_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "hello world" })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio_path = dir.path().join("chunk.wav");
        std::fs::write(&audio_path, b"RIFF").unwrap();

        let text = client(&server).transcribe(&audio_path).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("ok")))
            .mount(&server)
            .await;

        let prompt = client(&server).write_prompt("x").await.unwrap();
        assert_eq!(prompt, "ok");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).write_prompt("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::RequestFailed { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client(&server).write_prompt("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedResponse(_)));
    }
}
