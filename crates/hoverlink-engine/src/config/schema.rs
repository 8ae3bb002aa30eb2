use crate::correlation::{DEFAULT_LINK_WINDOW_MS, DEFAULT_MAX_REQUESTS_PER_ELEMENT};
use crate::history::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoverlinkConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_link_window_ms")]
    pub default_link_window_ms: f64,
    #[serde(default = "default_capacity")]
    pub max_interactions: usize,
    #[serde(default = "default_capacity")]
    pub max_requests: usize,
    /// Range the presentation layer offers; the engine itself only requires a finite value.
    #[serde(default = "default_min_link_window_ms")]
    pub min_link_window_ms: f64,
    #[serde(default = "default_max_link_window_ms")]
    pub max_link_window_ms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_link_window_ms: default_link_window_ms(),
            max_interactions: default_capacity(),
            max_requests: default_capacity(),
            min_link_window_ms: default_min_link_window_ms(),
            max_link_window_ms: default_max_link_window_ms(),
        }
    }
}

impl SessionConfig {
    /// Never panics; an inverted range resolves to `max_link_window_ms`.
    pub fn clamp_link_window(&self, ms: f64) -> f64 {
        ms.max(self.min_link_window_ms).min(self.max_link_window_ms)
    }

    /// Checks the values the engine cannot work with, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let window = |name: &str, ms: f64| {
            if ms.is_finite() && ms >= 0.0 {
                Ok(())
            } else {
                Err(format!("session.{} must be a finite, non-negative number", name))
            }
        };
        window("default_link_window_ms", self.default_link_window_ms)?;
        window("min_link_window_ms", self.min_link_window_ms)?;
        window("max_link_window_ms", self.max_link_window_ms)?;
        if self.min_link_window_ms > self.max_link_window_ms {
            return Err(format!(
                "session.min_link_window_ms ({}) exceeds max_link_window_ms ({})",
                self.min_link_window_ms, self.max_link_window_ms
            ));
        }
        if self.max_interactions == 0 || self.max_requests == 0 {
            return Err("session history capacities must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_link_window_ms() -> f64 {
    DEFAULT_LINK_WINDOW_MS
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_min_link_window_ms() -> f64 {
    250.0
}

fn default_max_link_window_ms() -> f64 {
    5000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_max_requests_per_element")]
    pub max_requests_per_element: usize,
    #[serde(default = "default_tooltip_limit")]
    pub tooltip_limit: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_requests_per_element: default_max_requests_per_element(),
            tooltip_limit: default_tooltip_limit(),
        }
    }
}

fn default_max_requests_per_element() -> usize {
    DEFAULT_MAX_REQUESTS_PER_ELEMENT
}

fn default_tooltip_limit() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9011
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    std::env::temp_dir().join("hoverlink").join("session")
}
