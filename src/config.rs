//! Configuration management for the proxy.
//!
//! Loaded once at startup from a JSON file (all fields defaulted) and passed
//! around behind an `Arc`; nothing mutates it after validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dither::DitherMethod;

/// Default configuration file path
#[allow(dead_code)]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ebd-proxy/config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the proxy listens on
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// User agent presented to upstream servers
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Output budget per page, and the cap on upstream page bodies, in bytes
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Cap on fetched image bodies, in bytes
    #[serde(default = "default_max_image_size")]
    pub max_image_size: usize,

    /// Cap on the base64 payload of a data: image URL, in bytes
    #[serde(default = "default_max_data_url_size")]
    pub max_data_url_size: usize,

    /// Images transcoded per page before the limit diagnostic kicks in
    #[serde(default = "default_max_images_per_page")]
    pub max_images_per_page: usize,

    /// Largest accepted source image dimension, in pixels
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    /// Cap on SVG source size, in bytes
    #[serde(default = "default_max_svg_size")]
    pub max_svg_size: usize,

    /// Wall-clock limit for rasterizing one SVG, in seconds
    #[serde(default = "default_svg_timeout_secs")]
    pub svg_timeout_secs: u64,

    /// Wall-clock limit for one whole image task, in seconds
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Dithering strategy: "quality" (Floyd-Steinberg) or "performance"
    /// (ordered)
    #[serde(default)]
    pub dither: DitherMethod,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_bind_port() -> u16 {
    4040
}

fn default_user_agent() -> String {
    "Mozilla/1.22 (compatible; MSIE 5.01; PalmOS 3.0) EBDProxy/0.1; 160x160".to_string()
}

fn default_http_timeout_secs() -> u64 {
    5
}

fn default_max_page_size() -> usize {
    512 * 1024
}

fn default_max_image_size() -> usize {
    2 * 1024 * 1024
}

fn default_max_data_url_size() -> usize {
    1024 * 1024
}

fn default_max_images_per_page() -> usize {
    100
}

fn default_max_image_dimension() -> u32 {
    4096
}

fn default_max_svg_size() -> usize {
    256 * 1024
}

fn default_svg_timeout_secs() -> u64 {
    5
}

fn default_image_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: default_bind_port(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
            max_page_size: default_max_page_size(),
            max_image_size: default_max_image_size(),
            max_data_url_size: default_max_data_url_size(),
            max_images_per_page: default_max_images_per_page(),
            max_image_dimension: default_max_image_dimension(),
            max_svg_size: default_max_svg_size(),
            svg_timeout_secs: default_svg_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            dither: DitherMethod::default(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Upstream request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Per-image task timeout
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    /// SVG rasterization timeout
    pub fn svg_timeout(&self) -> Duration {
        Duration::from_secs(self.svg_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_port == 0 {
            return Err(ConfigError::ValidationError(
                "bind_port must be greater than 0".to_string(),
            ));
        }

        if self.max_page_size < 1024 {
            return Err(ConfigError::ValidationError(
                "max_page_size must be at least 1024 bytes".to_string(),
            ));
        }

        if self.max_image_size == 0 || self.max_svg_size == 0 {
            return Err(ConfigError::ValidationError(
                "image and SVG size caps must be greater than 0".to_string(),
            ));
        }

        if self.max_images_per_page == 0 {
            return Err(ConfigError::ValidationError(
                "max_images_per_page must be greater than 0".to_string(),
            ));
        }

        if self.max_image_dimension < 16 {
            return Err(ConfigError::ValidationError(
                "max_image_dimension must be at least 16 pixels".to_string(),
            ));
        }

        if self.http_timeout_secs == 0 || self.image_timeout_secs == 0 || self.svg_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }
}
