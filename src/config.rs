use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub models: HashMap<String, ModelAlias>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Internal model id used to seed the default alias table when the
    /// config carries no `[models]` section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// One entry of the external-name → internal-model-id table, plus the
/// metadata surfaced on the model-listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAlias {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub vision: bool,
}

impl ModelAlias {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_length: None,
            vision: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_port() -> u16 {
    4333
}

fn default_api_key_env() -> String {
    "CONVERSE_API_KEY".to_string()
}

fn default_max_image_bytes() -> usize {
    // Converse-style providers cap inline image payloads in the low megabytes.
    5 * 1024 * 1024
}

/// Aliases used when the config supplies no `[models]` table at all.
pub fn default_model_aliases(internal_id: &str) -> HashMap<String, ModelAlias> {
    let mut map = HashMap::new();
    for name in ["gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"] {
        map.insert(name.to_string(), ModelAlias::new(internal_id));
    }
    map
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(ProxyError::config(format!(
            "No config file found. Searched: {}. Create one from config.example.toml",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Resolve the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var(&self.provider.api_key_env).map_err(|_| {
            ProxyError::config(format!(
                "Environment variable '{}' not set. Set it with your provider API key.",
                self.provider.api_key_env
            ))
        })
    }

    /// Provider base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.provider.base_url.trim_end_matches('/')
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("converse-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("converse-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg)
                    .join("converse-proxy")
                    .join("config.toml"),
            );
        }
        if let Some(home) = dirs_path() {
            paths.push(
                home.join(".config")
                    .join("converse-proxy")
                    .join("config.toml"),
            );
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".converse-proxy.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[provider]
name = "nova"
base_url = "https://bedrock-runtime.us-east-1.amazonaws.com"
api_key_env = "NOVA_API_KEY"

[models."gpt-4o-mini"]
id = "amazon.nova-lite-v1:0"
context_length = 128000
vision = true

[limits]
max_image_bytes = 1048576
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.provider.name, "nova");
        assert_eq!(config.limits.max_image_bytes, 1_048_576);

        let alias = config.models.get("gpt-4o-mini").unwrap();
        assert_eq!(alias.id, "amazon.nova-lite-v1:0");
        assert_eq!(alias.context_length, Some(128_000));
        assert!(alias.vision);
    }

    #[test]
    fn test_limits_default() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
[provider]
name = "nova"
base_url = "https://example.com/"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.limits.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(config.base_url(), "https://example.com");
        assert_eq!(config.provider.api_key_env, "CONVERSE_API_KEY");
    }

    #[test]
    fn test_default_model_aliases() {
        let map = default_model_aliases("amazon.nova-lite-v1:0");
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("gpt-4o").unwrap().id, "amazon.nova-lite-v1:0");
    }
}
