//! [`Oracle`] implementation backed by a chat-completion [`Provider`].

use std::time::Duration;

use async_trait::async_trait;
use divcon_common::util::{single_line, truncate_with_ellipsis};
use divcon_common::OracleConfig;
use divcon_core::{
    AnchorSet, Axis, Classification, Opinion, Oracle, PipelineError, Result, ScoreRecord, Topic,
    TopicDiscovery,
};
use serde::de::DeserializeOwned;

use crate::parse::{
    parse_reply, AnchorsReply, AxesReply, ClassificationsReply, ScoresReply, TopicsReply,
};
use crate::prompts::{self, Prompt};
use crate::provider::{ChatRequest, Message, OpenAIProvider, Provider};

/// Oracle that renders prompts, calls the provider and parses JSON replies.
pub struct LlmOracle<P> {
    provider: P,
    model: String,
    reasoning_effort: Option<String>,
    anchor_reasoning_effort: Option<String>,
    temperature: Option<f64>,
    label: String,
}

impl LlmOracle<OpenAIProvider> {
    /// Build the OpenAI-backed oracle from configuration.
    ///
    /// Fails when no API key is configured.
    pub fn from_config(config: &OracleConfig) -> divcon_common::Result<Self> {
        let api_key = config.require_api_key()?;
        let provider = OpenAIProvider::with_base_url(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        );

        Ok(Self::new(provider, &config.model)
            .with_reasoning_effort(non_empty(&config.reasoning_effort))
            .with_anchor_reasoning_effort(non_empty(&config.anchor_reasoning_effort))
            .with_temperature(config.temperature))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl<P: Provider> LlmOracle<P> {
    pub fn new(provider: P, model: &str) -> Self {
        let label = format!("{}:{}", provider.name(), model);
        Self {
            provider,
            model: model.to_string(),
            reasoning_effort: None,
            anchor_reasoning_effort: None,
            temperature: None,
            label,
        }
    }

    pub fn with_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    /// Effort used for anchor generation only; falls back to the general effort.
    pub fn with_anchor_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.anchor_reasoning_effort = effort;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    async fn ask<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        scope: String,
        prompt: Prompt,
        reasoning_effort: Option<&String>,
    ) -> Result<T> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt.user)],
            system: Some(prompt.system),
            temperature: self.temperature,
            reasoning_effort: reasoning_effort.cloned(),
            json_mode: true,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(request)
            .await
            .map_err(|e| PipelineError::oracle(operation, scope.as_str(), e))?;

        tracing::debug!(
            operation,
            scope = %scope,
            latency_ms = response.latency_ms,
            output_tokens = response.usage.output_tokens,
            "Oracle replied"
        );

        parse_reply(operation, &response.content).map_err(|e| {
            tracing::warn!(
                operation,
                scope = %scope,
                reply = %truncate_with_ellipsis(&single_line(&response.content), 200),
                "Unparseable oracle reply"
            );
            e.in_scope(scope)
        })
    }
}

#[async_trait]
impl<P: Provider> Oracle for LlmOracle<P> {
    fn name(&self) -> &str {
        &self.label
    }

    async fn discover_topics(&self, sample: &[Opinion]) -> Result<TopicDiscovery> {
        let reply: TopicsReply = self
            .ask(
                "discover_topics",
                format!("{} opinions", sample.len()),
                prompts::discover_topics(sample),
                self.reasoning_effort.as_ref(),
            )
            .await?;
        Ok(reply.into())
    }

    async fn classify(&self, topics: &[Topic], batch: &[Opinion]) -> Result<Vec<Classification>> {
        let reply: ClassificationsReply = self
            .ask(
                "classify",
                format!("{} opinions", batch.len()),
                prompts::classify(topics, batch),
                self.reasoning_effort.as_ref(),
            )
            .await?;
        Ok(reply.into())
    }

    async fn discover_axes(&self, topic: &Topic, sample: &[Opinion]) -> Result<Vec<Axis>> {
        let reply: AxesReply = self
            .ask(
                "discover_axes",
                format!("topic {}", topic.id),
                prompts::discover_axes(topic, sample),
                self.reasoning_effort.as_ref(),
            )
            .await?;
        Ok(reply.into())
    }

    async fn generate_anchors(&self, axis: &Axis, sample: &[Opinion]) -> Result<AnchorSet> {
        let effort = self
            .anchor_reasoning_effort
            .as_ref()
            .or(self.reasoning_effort.as_ref());
        let reply: AnchorsReply = self
            .ask(
                "generate_anchors",
                format!("axis {}", axis.id),
                prompts::generate_anchors(axis, sample),
                effort,
            )
            .await?;
        Ok(reply.into())
    }

    async fn score(
        &self,
        axis: &Axis,
        anchors: &AnchorSet,
        batch: &[Opinion],
    ) -> Result<Vec<ScoreRecord>> {
        let reply: ScoresReply = self
            .ask(
                "score",
                format!("axis {}", axis.id),
                prompts::score(axis, anchors, batch),
                self.reasoning_effort.as_ref(),
            )
            .await?;
        Ok(reply.into())
    }
}
