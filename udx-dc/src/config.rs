//! Configuration resolution for udx-dc
//!
//! Model credentials resolve with Database → ENV → TOML priority; the
//! confusion example corpus resolves ENV → TOML → built-in. Credential
//! resolution is eager and loud: a missing API key is a deployment defect,
//! surfaced at startup rather than per document.

use crate::llm::examples::ExampleCorpus;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use udx_common::config::TomlConfig;
use udx_common::{Error, Result};

/// Default base URL for the generative model service
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier
pub const DEFAULT_LLM_MODEL: &str = "gemini-1.5-flash";

/// Resolved model service credentials
#[derive(Debug, Clone)]
pub struct LlmCredentials {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Resolve model credentials from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_llm_credentials(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<LlmCredentials> {
    let mut sources = Vec::new();

    // Tier 1: Database (authoritative)
    let db_key = crate::db::settings::get_llm_api_key(db).await?;
    if let Some(key) = &db_key {
        if is_valid_key(key) {
            sources.push("database");
        }
    }

    // Tier 2: Environment variable
    let env_key = std::env::var("UDX_LLM_API_KEY").ok();
    if let Some(key) = &env_key {
        if is_valid_key(key) {
            sources.push("environment");
        }
    }

    // Tier 3: TOML config
    let toml_key = toml_config.llm_api_key.as_ref();
    if let Some(key) = toml_key {
        if is_valid_key(key) {
            sources.push("TOML");
        }
    }

    if sources.len() > 1 {
        warn!(
            "Model API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let api_key = if let Some(key) = db_key.filter(|k| is_valid_key(k)) {
        info!("Model API key loaded from database");
        key
    } else if let Some(key) = env_key.filter(|k| is_valid_key(k)) {
        info!("Model API key loaded from environment variable");
        key
    } else if let Some(key) = toml_key.filter(|k| is_valid_key(k)) {
        info!("Model API key loaded from TOML config");
        key.clone()
    } else {
        return Err(Error::Config(
            "Model API key not configured. Please configure using one of:\n\
             1. Environment: UDX_LLM_API_KEY=your-key-here\n\
             2. TOML config: ~/.config/udx/udx-dc.toml (llm_api_key = \"your-key\")\n\
             3. Settings table: INSERT INTO settings (key, value) VALUES ('llm_api_key', 'your-key')"
                .to_string(),
        ));
    };

    Ok(LlmCredentials {
        api_key,
        base_url: resolve_llm_base_url(toml_config),
        model: resolve_llm_model(toml_config),
    })
}

/// Base URL: ENV → TOML → default; trailing slash stripped
pub fn resolve_llm_base_url(toml_config: &TomlConfig) -> String {
    let raw = std::env::var("UDX_LLM_BASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_config.llm_base_url.clone())
        .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
    raw.trim_end_matches('/').to_string()
}

/// Model identifier: ENV → TOML → default
pub fn resolve_llm_model(toml_config: &TomlConfig) -> String {
    std::env::var("UDX_LLM_MODEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_config.llm_model.clone())
        .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Load the confusion example corpus
///
/// **Priority:** ENV → TOML → built-in. A configured path that fails to
/// load or validate is a startup error, never a silent empty corpus.
pub fn load_confusion_corpus(toml_config: &TomlConfig) -> Result<ExampleCorpus> {
    if let Ok(path) = std::env::var("UDX_CONFUSION_EXAMPLES") {
        let corpus = ExampleCorpus::from_toml_file(std::path::Path::new(&path))?;
        info!(
            "Confusion example corpus loaded from environment path ({} examples)",
            corpus.len()
        );
        return Ok(corpus);
    }

    if let Some(path) = &toml_config.confusion_examples_path {
        let corpus = ExampleCorpus::from_toml_file(path)?;
        info!(
            "Confusion example corpus loaded from {} ({} examples)",
            path.display(),
            corpus.len()
        );
        return Ok(corpus);
    }

    Ok(ExampleCorpus::builtin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    async fn pool_with_settings_table() -> Pool<Sqlite> {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        udx_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    fn clear_env() {
        std::env::remove_var("UDX_LLM_API_KEY");
        std::env::remove_var("UDX_LLM_BASE_URL");
        std::env::remove_var("UDX_LLM_MODEL");
        std::env::remove_var("UDX_CONFUSION_EXAMPLES");
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_key_is_config_error_with_remediation() {
        clear_env();
        let pool = pool_with_settings_table().await;
        let err = resolve_llm_credentials(&pool, &TomlConfig::default())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("UDX_LLM_API_KEY"));
        assert!(message.contains("llm_api_key"));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_key_beats_toml() {
        clear_env();
        std::env::set_var("UDX_LLM_API_KEY", "env-key");
        let pool = pool_with_settings_table().await;
        let toml = TomlConfig {
            llm_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };

        let creds = resolve_llm_credentials(&pool, &toml).await.unwrap();
        assert_eq!(creds.api_key, "env-key");
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_database_key_beats_env() {
        clear_env();
        std::env::set_var("UDX_LLM_API_KEY", "env-key");
        let pool = pool_with_settings_table().await;
        crate::db::settings::set_llm_api_key(&pool, "db-key".to_string())
            .await
            .unwrap();

        let creds = resolve_llm_credentials(&pool, &TomlConfig::default())
            .await
            .unwrap();
        assert_eq!(creds.api_key, "db-key");
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_toml_key_used_when_no_other_source() {
        clear_env();
        let pool = pool_with_settings_table().await;
        let toml = TomlConfig {
            llm_api_key: Some("toml-key".to_string()),
            ..Default::default()
        };

        let creds = resolve_llm_credentials(&pool, &toml).await.unwrap();
        assert_eq!(creds.api_key, "toml-key");
        assert_eq!(creds.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(creds.model, DEFAULT_LLM_MODEL);
    }

    #[test]
    #[serial]
    fn test_base_url_strips_trailing_slash() {
        clear_env();
        let toml = TomlConfig {
            llm_base_url: Some("https://llm.internal/".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_llm_base_url(&toml), "https://llm.internal");
    }

    #[test]
    #[serial]
    fn test_corpus_defaults_to_builtin() {
        clear_env();
        let corpus = load_confusion_corpus(&TomlConfig::default()).unwrap();
        assert!(!corpus.is_empty());
    }

    #[test]
    #[serial]
    fn test_corpus_bad_env_path_is_loud() {
        clear_env();
        std::env::set_var("UDX_CONFUSION_EXAMPLES", "/nonexistent/corpus.toml");
        let err = load_confusion_corpus(&TomlConfig::default()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/corpus.toml"));
        clear_env();
    }
}
