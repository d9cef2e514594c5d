//! Texture cache configuration
//!
//! Loaded from the application's settings as JSON. Missing fields fall back
//! to their defaults.

use crate::error::{Result, TextureError};
use glam::UVec2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When `get` decodes an unloaded texture inline instead of queueing it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// First load blocks so the texture is ready this frame; reloads after
    /// eviction go to the background loader.
    #[default]
    BlockFirstLoad,
    /// Every load goes to the background loader.
    Background,
    /// Every load decodes on the calling thread.
    Blocking,
}

impl LoadPolicy {
    pub fn should_block(self, loaded_before: bool) -> bool {
        match self {
            LoadPolicy::BlockFirstLoad => !loaded_before,
            LoadPolicy::Background => false,
            LoadPolicy::Blocking => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureCacheConfig {
    /// Soft ceiling on resident texture memory, in bytes
    pub max_texture_memory: usize,
    pub load_policy: LoadPolicy,
    /// Size of the blank texture bound in place of textures that are not ready
    pub blank_extent: UVec2,
}

impl TextureCacheConfig {
    pub fn new(max_texture_memory: usize) -> Self {
        Self {
            max_texture_memory,
            ..Self::default()
        }
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Parse from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON settings file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_texture_memory == 0 {
            return Err(TextureError::Config(
                "max_texture_memory must be greater than zero".to_string(),
            ));
        }
        if self.blank_extent.x == 0 || self.blank_extent.y == 0 {
            return Err(TextureError::Config(format!(
                "blank_extent must be non-empty, got {}x{}",
                self.blank_extent.x, self.blank_extent.y
            )));
        }
        Ok(())
    }
}

impl Default for TextureCacheConfig {
    fn default() -> Self {
        Self {
            max_texture_memory: 512 * 1024 * 1024, // 512MB default
            load_policy: LoadPolicy::default(),
            blank_extent: UVec2::new(2, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = TextureCacheConfig::from_json_str(r#"{ "max_texture_memory": 1000 }"#).unwrap();
        assert_eq!(config.max_texture_memory, 1000);
        assert_eq!(config.load_policy, LoadPolicy::BlockFirstLoad);
        assert_eq!(config.blank_extent, UVec2::new(2, 2));
    }

    #[test]
    fn test_json_round_trip() {
        let config = TextureCacheConfig::new(4096).with_load_policy(LoadPolicy::Background);
        let json = config.to_json_string().unwrap();
        assert!(json.contains("\"background\""));
        assert_eq!(TextureCacheConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let err = TextureCacheConfig::from_json_str(r#"{ "max_texture_memory": 0 }"#).unwrap_err();
        assert!(matches!(err, TextureError::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            TextureCacheConfig::from_json_str("{ not json"),
            Err(TextureError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("textures.json");
        std::fs::write(&path, r#"{ "load_policy": "blocking" }"#).unwrap();
        let config = TextureCacheConfig::from_json_file(&path).unwrap();
        assert_eq!(config.load_policy, LoadPolicy::Blocking);
        assert_eq!(config.max_texture_memory, 512 * 1024 * 1024);
    }

    #[test]
    fn test_load_policy_blocking_decision() {
        assert!(LoadPolicy::BlockFirstLoad.should_block(false));
        assert!(!LoadPolicy::BlockFirstLoad.should_block(true));
        assert!(!LoadPolicy::Background.should_block(false));
        assert!(LoadPolicy::Blocking.should_block(true));
    }
}
