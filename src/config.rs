//! Ambient config layer: a `toml`-backed profile file generalizing the
//! teacher's `config.rs`, trimmed to the endpoint/model/context fields Milo
//! actually needs.
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_context_tokens")]
    pub context_tokens: u32,
    pub api_key: Option<String>,
}

fn default_context_tokens() -> u32 {
    200_000
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "qwen3:14b".to_string(),
            context_tokens: default_context_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl ConfigFile {
    pub fn load() -> Result<Self, StartupError> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| StartupError::Config(format!("{}: {e}", path.display())))
    }

    pub fn write_default_if_missing() -> Result<PathBuf, StartupError> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)?;
        Ok(path)
    }

    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

/// Final runtime config after merging the file's profile with CLI overrides
/// (CLI > config file > built-in default, per spec.md §6).
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub model: String,
    pub context_tokens: u32,
    pub api_key: Option<String>,
    pub profile_name: String,
}

impl ResolvedConfig {
    pub fn resolve(file: &ConfigFile, profile_override: Option<&str>, model_override: Option<&str>) -> Self {
        let profile_name = profile_override.unwrap_or(&file.default_profile).to_string();
        let base = file.resolve_profile(profile_override).cloned().unwrap_or_default();

        ResolvedConfig {
            endpoint: base.endpoint,
            model: model_override.map(str::to_string).unwrap_or(base.model),
            context_tokens: base.context_tokens,
            api_key: base.api_key,
            profile_name,
        }
    }
}

pub fn config_path() -> PathBuf {
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("milo").join("config.toml")
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
}

const DEFAULT_CONFIG_TOML: &str = r#"# Milo configuration

default_profile = "local"

[profiles.local]
endpoint       = "http://localhost:11434/v1/chat/completions"
model          = "qwen3:14b"
context_tokens = 32768

# [profiles.openai]
# endpoint       = "https://api.openai.com/v1/chat/completions"
# model          = "gpt-4o"
# context_tokens = 128000
# api_key        = "sk-..."
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_cli_model_override() {
        let mut file = ConfigFile::default();
        file.profiles.insert("local".to_string(), Profile { model: "base-model".into(), ..Default::default() });
        file.default_profile = "local".to_string();

        let resolved = ResolvedConfig::resolve(&file, None, Some("override-model"));
        assert_eq!(resolved.model, "override-model");
    }

    #[test]
    fn resolve_falls_back_to_profile_model() {
        let mut file = ConfigFile::default();
        file.profiles.insert("local".to_string(), Profile { model: "base-model".into(), ..Default::default() });
        file.default_profile = "local".to_string();

        let resolved = ResolvedConfig::resolve(&file, None, None);
        assert_eq!(resolved.model, "base-model");
    }

    #[test]
    fn missing_profile_falls_back_to_default() {
        let file = ConfigFile::default();
        let resolved = ResolvedConfig::resolve(&file, Some("nonexistent"), None);
        assert_eq!(resolved.profile_name, "nonexistent");
        assert_eq!(resolved.model, Profile::default().model);
    }
}
