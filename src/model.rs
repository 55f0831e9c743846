use crate::config::ModelConfig;
use crate::error::SqlChatError;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Text-in, text-out language model.
pub trait ModelClient: Send + Sync {
    fn invoke(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, SqlChatError>> + Send;
}

/// Anthropic models on the Bedrock runtime `InvokeModel` API, authenticated with a bearer API key.
pub struct BedrockClient {
    endpoint: String,
    model_id: String,
    api_key: Option<SecretString>,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct InvokeResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

enum Attempt {
    Done(Result<String, SqlChatError>),
    Retry(SqlChatError),
}

impl BedrockClient {
    pub fn new(config: &ModelConfig) -> Result<Self, SqlChatError> {
        let endpoint = config.endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", config.region)
        });
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SqlChatError::Config {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            api_key: config.api_key.as_ref().map(|k| SecretString::from(k.expose_secret().to_string())),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint, self.model_id)
    }

    async fn attempt(&self, prompt: &str) -> Attempt {
        let body = InvokeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(self.invoke_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Attempt::Retry(SqlChatError::Model {
                    message: format!("failed to reach model endpoint: {}", e),
                });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let err = Self::map_http_error(status);
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Attempt::Retry(err)
            } else {
                Attempt::Done(Err(err))
            };
        }

        let parsed: Result<InvokeResponse, _> = resp.json().await;
        Attempt::Done(match parsed {
            Ok(parsed) => parsed
                .content
                .into_iter()
                .find_map(|block| block.text)
                .ok_or_else(|| SqlChatError::Model {
                    message: "model response contained no text".to_string(),
                }),
            Err(e) => Err(SqlChatError::Model {
                message: format!("failed to parse model response: {}", e),
            }),
        })
    }

    fn map_http_error(status: StatusCode) -> SqlChatError {
        let message = match status.as_u16() {
            401 | 403 => "model access denied: check the Bedrock API key and model access".to_string(),
            404 => "model not found in this region".to_string(),
            429 => "model request throttled".to_string(),
            code => format!("HTTP error: {}", code),
        };
        SqlChatError::Model { message }
    }
}

impl ModelClient for BedrockClient {
    async fn invoke(&self, prompt: &str) -> Result<String, SqlChatError> {
        match self.attempt(prompt).await {
            Attempt::Done(result) => result,
            Attempt::Retry(first) => {
                tracing::warn!(error = %first, "model call failed, retrying once");
                tokio::time::sleep(RETRY_DELAY).await;
                match self.attempt(prompt).await {
                    Attempt::Done(result) => result,
                    Attempt::Retry(second) => Err(second),
                }
            }
        }
    }
}
