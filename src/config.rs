//! Environment-layered configuration.
//!
//! Values are resolved lowest to highest: built-in defaults, then
//! `PAMPAX_*` environment variables, then CLI flags (applied by the CLI
//! layer on top of the struct this module produces). Config-file loading
//! is an external collaborator and feeds in through the same env names.

use std::env;

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderChoice {
    /// Pick the best available provider from the configured credentials.
    #[default]
    Auto,
    OpenAi,
    Cohere,
    Ollama,
    Local,
}

impl ProviderChoice {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(ProviderChoice::Auto),
            "openai" => Some(ProviderChoice::OpenAi),
            "cohere" => Some(ProviderChoice::Cohere),
            "ollama" => Some(ProviderChoice::Ollama),
            "local" | "transformers" => Some(ProviderChoice::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderChoice::Auto => "auto",
            ProviderChoice::OpenAi => "openai",
            ProviderChoice::Cohere => "cohere",
            ProviderChoice::Ollama => "ollama",
            ProviderChoice::Local => "local",
        }
    }
}

/// Resolved configuration for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Raw master key material (base64 or hex); parsed by the chunk store.
    pub encryption_key: Option<String>,
    /// Whether new chunks are written encrypted.
    pub encrypt: bool,
    pub provider: ProviderChoice,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,

    pub cohere_api_key: Option<String>,
    pub cohere_model: Option<String>,

    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,

    /// Upper bound on tokens per embedded text, applied as a truncation hint.
    pub max_tokens: Option<usize>,
    /// Requested embedding dimensions, for providers that support it.
    pub dimensions: Option<usize>,
    /// Minimum milliseconds between provider batches (simple rate limit).
    pub rate_limit_ms: Option<u64>,

    pub reranker_url: Option<String>,
    pub reranker_api_key: Option<String>,
    pub reranker_model: Option<String>,
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Build a config from the `PAMPAX_*` environment.
    pub fn from_env() -> Self {
        Config {
            encryption_key: env_nonempty(crate::constants::ENV_ENCRYPTION_KEY),
            encrypt: false,
            provider: env_nonempty("PAMPAX_PROVIDER")
                .and_then(|v| ProviderChoice::parse(&v))
                .unwrap_or_default(),

            openai_api_key: env_nonempty("PAMPAX_OPENAI_API_KEY"),
            openai_base_url: env_nonempty("PAMPAX_OPENAI_BASE_URL"),
            openai_model: env_nonempty("PAMPAX_OPENAI_MODEL"),

            cohere_api_key: env_nonempty("PAMPAX_COHERE_API_KEY"),
            cohere_model: env_nonempty("PAMPAX_COHERE_MODEL"),

            ollama_base_url: env_nonempty("PAMPAX_OLLAMA_BASE_URL"),
            ollama_model: env_nonempty("PAMPAX_OLLAMA_MODEL"),

            max_tokens: env_nonempty("PAMPAX_MAX_TOKENS").and_then(|v| v.parse().ok()),
            dimensions: env_nonempty("PAMPAX_DIMENSIONS").and_then(|v| v.parse().ok()),
            rate_limit_ms: env_nonempty("PAMPAX_RATE_LIMIT").and_then(|v| v.parse().ok()),

            reranker_url: env_nonempty("PAMPAX_RERANKER_URL"),
            reranker_api_key: env_nonempty("PAMPAX_RERANKER_API_KEY"),
            reranker_model: env_nonempty("PAMPAX_RERANKER_MODEL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_choice_parse() {
        assert_eq!(ProviderChoice::parse("auto"), Some(ProviderChoice::Auto));
        assert_eq!(ProviderChoice::parse("OpenAI"), Some(ProviderChoice::OpenAi));
        assert_eq!(ProviderChoice::parse("ollama"), Some(ProviderChoice::Ollama));
        assert_eq!(ProviderChoice::parse("transformers"), Some(ProviderChoice::Local));
        assert_eq!(ProviderChoice::parse("bogus"), None);
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.provider, ProviderChoice::Auto);
        assert!(!cfg.encrypt);
        assert!(cfg.encryption_key.is_none());
    }
}
