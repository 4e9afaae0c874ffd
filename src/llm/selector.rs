use crate::config::{BackendKind, CadradsConfig};
use crate::llm::{EmbeddedClient, GenAIClient, LLMClient};
use anyhow::{Context, Result};
use genai::adapter::AdapterKind;
use std::sync::Arc;
use tracing::{debug, info};

/// The oracle chosen for a run
pub struct SelectedClient {
    pub client: Arc<dyn LLMClient>,
    pub backend: BackendKind,
    pub description: String,
}

impl std::fmt::Debug for SelectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedClient")
            .field("backend", &self.backend)
            .field("description", &self.description)
            .finish()
    }
}

/// Build the client named by `config.backend`.
///
/// There is no fallback between backends: a hosted run without credentials
/// fails here instead of silently loading a local model.
pub async fn select_llm_client(config: &CadradsConfig) -> Result<SelectedClient> {
    match config.backend {
        BackendKind::Hosted => hosted(config).await,
        BackendKind::Local => local(config).await,
    }
}

async fn hosted(config: &CadradsConfig) -> Result<SelectedClient> {
    let provider = config.provider;

    if !provider_has_credentials(provider) {
        let var = provider.default_key_env_name().unwrap_or("API key");
        anyhow::bail!(
            "No credentials for {}. Set {} or choose --backend local",
            provider.as_str(),
            var
        );
    }

    let client = GenAIClient::new(provider, config.model.clone(), config.request_timeout())
        .await
        .with_context(|| format!("Failed to initialize {}", provider.as_str()))?;

    let description = config.backend_description();
    info!("Using hosted backend: {}", description);

    Ok(SelectedClient {
        client: Arc::new(client),
        backend: BackendKind::Hosted,
        description,
    })
}

async fn local(config: &CadradsConfig) -> Result<SelectedClient> {
    debug!("Initializing embedded backend");
    let client = EmbeddedClient::initialize(&config.embedded_options())
        .await
        .context("Failed to initialize local model")?;

    let model_info = client
        .model_info()
        .unwrap_or_else(|| "embedded".to_string());
    info!("Using local backend: {}", model_info);

    Ok(SelectedClient {
        client,
        backend: BackendKind::Local,
        description: format!("local ({})", model_info),
    })
}

/// Check if provider has available credentials
pub fn provider_has_credentials(provider: AdapterKind) -> bool {
    match provider.default_key_env_name() {
        None => true,
        Some(env_var) => std::env::var(env_var)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_provider_credentials_check() {
        // Ollama needs no key
        assert!(provider_has_credentials(AdapterKind::Ollama));

        let _ = provider_has_credentials(AdapterKind::OpenAI);
        let _ = provider_has_credentials(AdapterKind::Anthropic);
    }

    #[tokio::test]
    #[serial]
    async fn test_hosted_without_credentials_is_configuration_error() {
        let key = "OPENAI_API_KEY";
        let saved = std::env::var(key).ok();
        std::env::remove_var(key);

        let mut config = CadradsConfig::default();
        config.backend = BackendKind::Hosted;
        config.provider = AdapterKind::OpenAI;

        let err = select_llm_client(&config).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        if let Some(v) = saved {
            std::env::set_var(key, v);
        }
    }

    #[tokio::test]
    async fn test_hosted_ollama_needs_no_credentials() {
        let mut config = CadradsConfig::default();
        config.backend = BackendKind::Hosted;
        config.provider = AdapterKind::Ollama;
        config.model = "llama3.1:8b".to_string();

        let selected = select_llm_client(&config).await.unwrap();
        assert_eq!(selected.backend, BackendKind::Hosted);
        assert!(selected.description.contains("llama3.1:8b"));
    }
}
