//! Client configuration.

use crate::shapes::SerializableColor;
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding [`Config::broker_url`].
pub const BROKER_URL_ENV: &str = "PAIRSKETCH_BROKER";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client configuration, loaded from JSON. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket URL of the broker.
    pub broker_url: String,
    /// Drawing surface width.
    pub width: f64,
    /// Drawing surface height.
    pub height: f64,
    /// Grid overlay at startup.
    pub grid_enabled: bool,
    /// Uploaded images larger than this on either side are scaled down.
    pub upload_max_size: f64,
    /// Where uploaded images are placed.
    pub upload_x: f64,
    pub upload_y: f64,
    pub default_color: SerializableColor,
    pub default_size: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_url: "ws://localhost:3030/ws".to_string(),
            width: 1280.0,
            height: 800.0,
            grid_enabled: false,
            upload_max_size: 300.0,
            upload_x: 50.0,
            upload_y: 50.0,
            default_color: SerializableColor::black(),
            default_size: 5.0,
        }
    }
}

impl Config {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(BROKER_URL_ENV).filter(|u| !u.trim().is_empty()) {
            log::info!("Broker URL overridden from environment: {}", url);
            self.broker_url = url;
        }
        self
    }

    pub fn surface_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn upload_position(&self) -> Point {
        Point::new(self.upload_x, self.upload_y)
    }
}
