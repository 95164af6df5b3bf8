use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use nexus_agent::llm::OpenAiClient;
use nexus_agent::runtime::ChatAgent;
use nexus_agent::tools::ToolDispatcher;
use nexus_core::config::{AppConfig, ConfigError, LoadOptions};
use nexus_core::store::{InMemoryIdentityContextStore, InMemoryPendingActionStore};
use nexus_klaviyo::KlaviyoClient;
use thiserror::Error;
use tracing::info;

use crate::chat::{self, ChatState};
use crate::health;
use crate::sessions::InMemorySessionStore;

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
    /// Session registry the (external) OAuth callback glue populates.
    pub sessions: Arc<InMemorySessionStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("upstream client initialization failed: {0}")]
    Upstream(String),
    #[error("llm client initialization failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let klaviyo = Arc::new(
        KlaviyoClient::new(&config.klaviyo)
            .map_err(|error| BootstrapError::Upstream(error.to_string()))?,
    );
    let llm = Arc::new(
        OpenAiClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );

    let proposals = Arc::new(match config.approvals.pending_ttl_secs {
        Some(ttl_secs) => InMemoryPendingActionStore::with_ttl(Duration::from_secs(ttl_secs)),
        None => InMemoryPendingActionStore::new(),
    });
    let identity = Arc::new(InMemoryIdentityContextStore::new());

    let dispatcher = ToolDispatcher::new(
        klaviyo,
        proposals,
        identity,
        config.campaign.clone(),
        config.approvals.clone(),
    );
    let agent = Arc::new(ChatAgent::new(llm, dispatcher));
    let sessions = Arc::new(InMemorySessionStore::new());

    let router =
        health::router().merge(chat::router(ChatState { agent, sessions: sessions.clone() }));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        "application bootstrap complete"
    );

    Ok(Application { config, router, sessions })
}

#[cfg(test)]
mod tests {
    use nexus_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_an_llm_credential() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                campaign_from_email: Some("hello@acme-store.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap without api key must fail").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_succeeds_with_valid_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-test".to_string()),
                campaign_from_email: Some("hello@acme-store.com".to_string()),
                campaign_from_label: Some("Acme Store".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.config.klaviyo.base_url, "https://a.klaviyo.com/api");
        assert_eq!(app.config.klaviyo.revision, "2024-10-15");
    }
}
