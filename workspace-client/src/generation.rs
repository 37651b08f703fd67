use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    client::{Upstream, UpstreamClient, DEFAULT_TIMEOUT},
    types::{ChatRequest, GenerationRequest},
    workspace::workspace_path,
};

pub const BASE_GENERATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const PER_ITEM_GENERATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// `base + count * per_item`, saturating instead of overflowing.
pub fn scaled_timeout(base: Duration, per_item: Duration, count: u32) -> Duration {
    base.saturating_add(per_item.saturating_mul(count))
}

/// Timeout for generating `count` items with the stock constants.
pub fn generation_timeout(count: u32) -> Duration {
    scaled_timeout(BASE_GENERATION_TIMEOUT, PER_ITEM_GENERATION_TIMEOUT, count)
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub workspace_slug: String,
    pub model: String,
    pub temperature: f32,
    pub base_timeout: Duration,
    pub per_item_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workspace_slug: config.default_workspace_slug.clone(),
            model: config.default_model.clone(),
            temperature: config.generation_temperature,
            base_timeout: Duration::from_secs(config.generation_base_timeout_secs),
            per_item_timeout: Duration::from_secs(config.generation_per_item_timeout_secs),
        }
    }
}

/// Forwards generation and chat requests, scaling the timeout to the
/// requested workload and classifying local timeouts separately.
#[derive(Clone)]
pub struct GenerationProxy {
    upstream: Upstream,
    settings: GenerationSettings,
}

impl GenerationProxy {
    pub fn new(upstream: Upstream, settings: GenerationSettings) -> Self {
        Self { upstream, settings }
    }

    pub fn timeout_for(&self, count: u32) -> Duration {
        scaled_timeout(
            self.settings.base_timeout,
            self.settings.per_item_timeout,
            count,
        )
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Value, AppError> {
        let timeout = self.timeout_for(request.count);
        info!(
            count = request.count,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            slug = %self.settings.workspace_slug,
            "forwarding generation request"
        );

        let body = ChatRequest {
            message: request.prompt,
            mode: None,
            model: Some(request.model.unwrap_or_else(|| self.settings.model.clone())),
            temperature: Some(self.settings.temperature),
            stream: false,
        };

        let client = self.upstream.connect(Some(timeout)).await?;
        let outbound = self.chat_request(&client, &self.settings.workspace_slug, &body);
        send_classified(&client, "generate", outbound).await
    }

    /// Chat passthrough for an arbitrary workspace with the default timeout.
    pub async fn chat(&self, slug: &str, body: &ChatRequest) -> Result<Value, AppError> {
        info!(slug, mode = ?body.mode, "forwarding workspace chat");
        let client = self.upstream.connect(Some(DEFAULT_TIMEOUT)).await?;
        let outbound = self.chat_request(&client, slug, body);
        send_classified(&client, "chat", outbound).await
    }

    pub fn chat_request(
        &self,
        client: &UpstreamClient,
        slug: &str,
        body: &ChatRequest,
    ) -> RequestBuilder {
        let path = format!("{}/chat", workspace_path(slug));
        client.post(&path).json(body)
    }
}

async fn send_classified(
    client: &UpstreamClient,
    operation: &'static str,
    request: RequestBuilder,
) -> Result<Value, AppError> {
    client
        .execute(operation, request)
        .await
        .map_err(|err| classify(err, client.timeout()))
}

/// A local timeout asks the caller to shrink the request rather than retry
/// it as-is, so it gets its own error kind.
fn classify(err: AppError, timeout: Duration) -> AppError {
    if err.is_timeout() {
        warn!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "generation aborted by local timeout"
        );
        return AppError::GenerationTimeout { timeout };
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeUpstream, TEST_API_KEY};

    #[test]
    fn timeout_scales_linearly_with_count() {
        assert_eq!(generation_timeout(0), Duration::from_millis(600_000));
        assert_eq!(generation_timeout(1), Duration::from_millis(720_000));
        assert_eq!(generation_timeout(5), Duration::from_millis(1_200_000));
        for count in [0_u32, 3, 17, 250] {
            assert_eq!(
                generation_timeout(count).as_millis(),
                600_000 + u128::from(count) * 120_000
            );
        }
    }

    #[test]
    fn timeout_saturates_instead_of_panicking() {
        let huge = scaled_timeout(Duration::MAX, Duration::from_secs(1), u32::MAX);
        assert_eq!(huge, Duration::MAX);
    }

    #[tokio::test]
    async fn chat_call_for_five_items_carries_the_scaled_timeout() {
        let fake = FakeUpstream::start().await;
        let upstream = fake.upstream_with_key(Some(TEST_API_KEY)).await;
        let proxy = GenerationProxy::new(upstream.clone(), GenerationSettings::default());

        let timeout = proxy.timeout_for(5);
        let client = upstream.connect(Some(timeout)).await.expect("client");
        let request = proxy
            .chat_request(
                &client,
                "default",
                &ChatRequest {
                    message: "five questions".into(),
                    mode: None,
                    model: None,
                    temperature: None,
                    stream: false,
                },
            )
            .build()
            .expect("request");

        assert_eq!(request.timeout(), Some(&Duration::from_millis(1_200_000)));
        assert_eq!(request.url().path(), "/api/v1/workspace/default/chat");
    }

    #[tokio::test]
    async fn generate_forwards_prompt_model_and_defaults() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("default");
        let proxy = GenerationProxy::new(
            fake.upstream_with_key(Some(TEST_API_KEY)).await,
            GenerationSettings::default(),
        );

        let response = proxy
            .generate(GenerationRequest {
                prompt: "write 2 questions".into(),
                model: None,
                count: 2,
            })
            .await
            .expect("generate");

        assert_eq!(response["textResponse"], "echo: write 2 questions");
        let chats = fake.state.chats();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].0, "default");
        assert_eq!(chats[0].1.model.as_deref(), Some("llama2"));
        assert_eq!(chats[0].1.temperature, Some(0.7));
        assert!(!chats[0].1.stream);
    }

    #[tokio::test]
    async fn local_timeout_becomes_generation_timeout() {
        let fake = FakeUpstream::start().await;
        fake.state.insert_workspace("default");
        fake.state.set_chat_delay(Duration::from_secs(2));
        let settings = GenerationSettings {
            base_timeout: Duration::from_millis(100),
            per_item_timeout: Duration::ZERO,
            ..GenerationSettings::default()
        };
        let proxy = GenerationProxy::new(fake.upstream_with_key(Some(TEST_API_KEY)).await, settings);

        let err = proxy
            .generate(GenerationRequest {
                prompt: "slow".into(),
                model: Some("mistral".into()),
                count: 3,
            })
            .await
            .expect_err("should time out");

        assert!(matches!(
            err,
            AppError::GenerationTimeout { timeout } if timeout == Duration::from_millis(100)
        ));
    }

    #[tokio::test]
    async fn upstream_failures_are_not_reclassified() {
        let fake = FakeUpstream::start().await;
        let proxy = GenerationProxy::new(
            fake.upstream_with_key(Some(TEST_API_KEY)).await,
            GenerationSettings::default(),
        );

        // No such workspace on the fake, so the chat call 404s.
        let err = proxy
            .chat(
                "ghost",
                &ChatRequest {
                    message: "hi".into(),
                    mode: Some("chat".into()),
                    model: None,
                    temperature: None,
                    stream: false,
                },
            )
            .await
            .expect_err("404");

        assert_eq!(err.upstream_status(), Some(404));
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_generation() {
        let fake = FakeUpstream::start().await;
        let proxy = GenerationProxy::new(
            fake.upstream_with_key(None).await,
            GenerationSettings::default(),
        );

        let err = proxy
            .generate(GenerationRequest {
                prompt: "x".into(),
                model: None,
                count: 1,
            })
            .await
            .expect_err("no key");

        assert!(matches!(err, AppError::ConfigMissing(_)));
        assert_eq!(fake.state.request_count(), 0);
    }
}
