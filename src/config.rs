//! Connector configuration for the CLI binary.
//!
//! Resolved in order: explicit CLI flag → environment variable →
//! default, mirroring how the teacher codebase layers agent
//! configuration. The library crate itself never reads the
//! environment; this module exists only to wire up a [`Connector`]
//! for the `chunkrag` binary without requiring a host application.

use chunkrag::connector::{Connector, ConnectorRegistry, ConnectorSettings, StaticConnector};
use std::sync::Arc;

/// Default connector id used when `--connector` is not given.
pub const DEFAULT_CONNECTOR_ID: &str = "default";

/// Builds a single-connector [`ConnectorRegistry`] for `connector_id`,
/// resolving model/host/key from CLI flags first, then environment
/// variables (`CHUNKRAG_MODEL`, `CHUNKRAG_BASE_URL`, `CHUNKRAG_API_KEY`,
/// falling back to `OPENAI_API_KEY` / `OPENAI_BASE_URL` for
/// compatibility with OpenAI-style tooling).
#[must_use]
pub fn build_registry(
    connector_id: &str,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
) -> ConnectorRegistry {
    let settings = ConnectorSettings {
        model: model.or_else(|| std::env::var("CHUNKRAG_MODEL").ok()),
        host: base_url
            .or_else(|| std::env::var("CHUNKRAG_BASE_URL").ok())
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok()),
        key: api_key
            .or_else(|| std::env::var("CHUNKRAG_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        extra: serde_json::Map::new(),
    };

    let connector: Arc<dyn Connector> = Arc::new(StaticConnector::new(connector_id.to_string(), settings));
    let mut registry = ConnectorRegistry::new();
    registry.insert(connector);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registry_resolves_the_given_id() {
        let registry = build_registry("mine", Some("gpt-4o".to_string()), None, None);
        let connector = registry.resolve("mine").unwrap_or_else(|e| panic!("expected ok: {e}"));
        assert_eq!(connector.settings().model.as_deref(), Some("gpt-4o"));
    }
}
