//! Remote agent invocation over OpenAI-compatible chat completion APIs
//!
//! The only network client in the system. The API key comes from the
//! environment variable named in config; transport failures and rate limits
//! get a bounded retry with exponential backoff, after which the invocation
//! fails as `Unavailable` and the orchestrator's own turn-level policy takes
//! over.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{AgentError, AgentInvoker, ChatMessage, Role};
use crate::config::AgentConfig;

/// Agent invoker backed by a remote OpenAI-compatible endpoint
#[derive(Debug)]
pub struct RemoteAgent {
    client: Client,
    config: AgentConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteAgent {
    /// Build a remote agent from config. Fails if the API key environment
    /// variable is unset.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            AgentError::Unavailable(format!("API key env var '{}' not set", config.api_key_env))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Unavailable(e.to_string()))?;

        info!(
            model = %config.model,
            api_url = %config.api_url,
            "RemoteAgent initialized"
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    async fn call_api(&self, request: &ChatCompletionRequest) -> Result<String, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        debug!("Calling agent API at: {}", url);

        let mut last_error = None;
        let mut delay = Duration::from_secs(1);
        const MAX_ATTEMPTS: u32 = 3;

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_ATTEMPTS,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(AgentError::Unavailable(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| AgentError::MalformedReply(e.to_string()))?;

                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| {
                            AgentError::MalformedReply("empty choices in response".to_string())
                        });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_ATTEMPTS - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_ATTEMPTS,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(AgentError::Unavailable(format!(
            "Failed after {} attempts: {}",
            MAX_ATTEMPTS,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

#[async_trait]
impl AgentInvoker for RemoteAgent {
    async fn invoke(
        &self,
        role_instructions: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: role_instructions.to_string(),
        });
        for msg in history {
            messages.push(WireMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: msg.content.clone(),
            });
        }

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: 0.4,
        };

        self.call_api(&request).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String) -> AgentConfig {
        AgentConfig {
            api_url,
            api_key_env: "REVERIE_TEST_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }

    fn reply_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"content": content}}]
        })
    }

    #[tokio::test]
    async fn test_remote_agent_missing_api_key() {
        // A dedicated env var so parallel tests setting the shared key
        // cannot interfere
        unsafe { env::remove_var("REVERIE_TEST_MISSING_KEY") };

        let config = AgentConfig {
            api_key_env: "REVERIE_TEST_MISSING_KEY".to_string(),
            ..create_test_config("https://api.example.com/v1".to_string())
        };
        let result = RemoteAgent::new(&config);

        assert!(result.is_err());
        let err = result.err().unwrap().to_string();
        assert!(err.contains("REVERIE_TEST_MISSING_KEY"));
    }

    #[tokio::test]
    async fn test_remote_agent_returns_reply_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("CST")))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("REVERIE_TEST_API_KEY", "test-key") };
        let agent = RemoteAgent::new(&create_test_config(mock_server.uri())).unwrap();

        let reply = agent
            .invoke("classify this", &[ChatMessage::user("I remember the beach")])
            .await
            .unwrap();
        assert_eq!(reply, "CST");
    }

    #[tokio::test]
    async fn test_remote_agent_retries_on_rate_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("SRT")))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("REVERIE_TEST_API_KEY", "test-key") };
        let agent = RemoteAgent::new(&create_test_config(mock_server.uri())).unwrap();

        let start = std::time::Instant::now();
        let reply = agent.invoke("classify", &[]).await.unwrap();
        assert_eq!(reply, "SRT");
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_remote_agent_server_error_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("REVERIE_TEST_API_KEY", "test-key") };
        let agent = RemoteAgent::new(&create_test_config(mock_server.uri())).unwrap();

        let result = agent.invoke("classify", &[]).await;
        assert!(matches!(result, Err(AgentError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_remote_agent_empty_choices_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("REVERIE_TEST_API_KEY", "test-key") };
        let agent = RemoteAgent::new(&create_test_config(mock_server.uri())).unwrap();

        let result = agent.invoke("classify", &[]).await;
        assert!(matches!(result, Err(AgentError::MalformedReply(_))));
    }
}
