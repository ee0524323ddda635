//! Connector and streaming transport collaborators (spec §6.1).
//!
//! The full LLM connector registry is an external system the core only
//! consumes from. What the core actually needs is small: a way to
//! resolve a connector id to a handle exposing a settings map, and a
//! way to invoke that connector's streaming chat endpoint and receive
//! raw bytes. Both are modeled here as traits with a minimal concrete
//! registry and a `reqwest`-backed transport, so the crate is runnable
//! end to end without a larger host application.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::{Map, Value};

use crate::error::ChunkError;

/// Fallback chat model used when a connector's settings do not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings exposed by a connector: model/host/key plus any
/// provider-specific extras the transport may need.
#[derive(Debug, Clone, Default)]
pub struct ConnectorSettings {
    /// Chat model id, e.g. `"gpt-4o-mini"`. Overrides [`DEFAULT_MODEL`]
    /// when present.
    pub model: Option<String>,
    /// Base URL of the chat completions endpoint.
    pub host: Option<String>,
    /// Bearer credential sent to the endpoint.
    pub key: Option<String>,
    /// Provider-specific settings outside the common three.
    pub extra: Map<String, Value>,
}

impl ConnectorSettings {
    /// Returns the model to use: the connector's own setting, else
    /// [`DEFAULT_MODEL`].
    #[must_use]
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// A registered LLM connector: a stable id plus its settings.
pub trait Connector: Send + Sync {
    /// The connector's registration id.
    fn id(&self) -> &str;
    /// The connector's settings map.
    fn settings(&self) -> &ConnectorSettings;
}

/// A connector backed by a static [`ConnectorSettings`] value — the
/// common case for a host application that loads credentials once at
/// startup.
pub struct StaticConnector {
    id: String,
    settings: ConnectorSettings,
}

impl StaticConnector {
    /// Creates a connector with the given id and settings.
    #[must_use]
    pub const fn new(id: String, settings: ConnectorSettings) -> Self {
        Self { id, settings }
    }
}

impl Connector for StaticConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }
}

/// A minimal in-process registry mapping connector ids to handles. No
/// persistence, no discovery — callers register connectors up front
/// (typically once, at process startup) and the semantic chunker
/// resolves [`crate::model::SemanticOptions::connector`] against it.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connector`, keyed by its own [`Connector::id`].
    pub fn insert(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.id().to_string(), connector);
    }

    /// Resolves `id` to its connector.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::UnknownConnector`] if `id` was never
    /// registered.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Connector>, ChunkError> {
        self.connectors
            .get(id)
            .cloned()
            .ok_or_else(|| ChunkError::UnknownConnector(id.to_string()))
    }
}

/// A boxed stream of raw byte chunks from a streaming chat completion.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ChunkError>> + Send>>;

/// Invokes a connector's streaming chat completion endpoint.
///
/// The transport owns SSE framing concerns only to the extent of
/// delivering raw bytes promptly; the Semantic Stream Parser (C7)
/// tolerates `data:` prefixes and `[DONE]` sentinels regardless of
/// whether the transport already stripped them.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    /// Streams a chat completion for `body` against `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::Transport`] if the request could not be
    /// sent or the response was not successful.
    async fn stream_chat(
        &self,
        connector: &dyn Connector,
        body: Value,
    ) -> Result<BoxByteStream, ChunkError>;
}

/// The default [`StreamingTransport`], invoking an OpenAI-compatible
/// `POST {host}/chat/completions` endpoint over SSE via `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a fresh `reqwest::Client`.
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingTransport for ReqwestTransport {
    async fn stream_chat(
        &self,
        connector: &dyn Connector,
        body: Value,
    ) -> Result<BoxByteStream, ChunkError> {
        let settings = connector.settings();
        let host = settings
            .host
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let url = format!("{}/chat/completions", host.trim_end_matches('/'));

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &settings.key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ChunkError::Transport {
            message: format!("request to connector {:?} failed: {e}", connector.id()),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChunkError::Transport {
                message: format!("connector {:?} returned {status}: {text}", connector.id()),
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ChunkError::Transport { message: format!("stream read failed: {e}") })
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reqwest_transport_streams_chat_completions_response() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let connector = StaticConnector::new(
            "mine".to_string(),
            ConnectorSettings { host: Some(server.uri()), ..ConnectorSettings::default() },
        );
        let transport = ReqwestTransport::new();
        let mut stream = transport
            .stream_chat(&connector, serde_json::json!({"model": "gpt-4o-mini"}))
            .await
            .unwrap_or_else(|e| panic!("expected ok: {e}"));

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.unwrap_or_else(|e| panic!("expected ok chunk: {e}")));
        }
        let text = String::from_utf8(collected).unwrap_or_default();
        assert!(text.contains("\"content\":\"hi\""));
    }

    #[tokio::test]
    async fn reqwest_transport_surfaces_non_success_status_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let connector = StaticConnector::new(
            "mine".to_string(),
            ConnectorSettings { host: Some(server.uri()), ..ConnectorSettings::default() },
        );
        let transport = ReqwestTransport::new();
        let result = transport.stream_chat(&connector, serde_json::json!({})).await;
        assert!(matches!(result, Err(ChunkError::Transport { .. })));
    }

    fn settings(model: Option<&str>) -> ConnectorSettings {
        ConnectorSettings { model: model.map(str::to_string), ..ConnectorSettings::default() }
    }

    #[test]
    fn model_or_default_falls_back() {
        assert_eq!(settings(None).model_or_default(), DEFAULT_MODEL);
        assert_eq!(settings(Some("gpt-4o")).model_or_default(), "gpt-4o");
    }

    #[test]
    fn registry_resolves_registered_connector() {
        let mut registry = ConnectorRegistry::new();
        registry.insert(Arc::new(StaticConnector::new("mine".to_string(), settings(None))));
        let resolved = registry.resolve("mine").unwrap_or_else(|e| panic!("expected ok: {e}"));
        assert_eq!(resolved.id(), "mine");
    }

    #[test]
    fn registry_rejects_unknown_id() {
        let registry = ConnectorRegistry::new();
        assert!(matches!(registry.resolve("nope"), Err(ChunkError::UnknownConnector(_))));
    }
}
