// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a partial or missing config.toml still
// yields a complete configuration.

use crate::backend::ContextSettings;
use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::CString;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub decorated: bool,
    pub maximized: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "GPU Present".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            decorated: true,
            maximized: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub application_name: String,
    /// "mailbox" or "fifo"; mailbox falls back to FIFO when not offered.
    pub present_mode: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            application_name: "GPU Present".to_string(),
            present_mode: "mailbox".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub layers: Vec<String>,
    /// Log every instance extension and layer at startup
    pub print_capabilities: bool,
    /// env_logger filter string; overrides RUST_LOG
    pub log_filter: Option<String>,
    pub log_file: Option<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            print_capabilities: false,
            log_filter: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            // The logger is not up yet when the config is read
            eprintln!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    ///
    /// Only "mailbox" (MAILBOX when offered, else FIFO) and "fifo" (always
    /// FIFO) are meaningful.
    pub fn get_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            _ => {
                log::warn!(
                    "Unsupported present mode '{}' (expected mailbox or fifo), defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Settings for GraphicsContext::new
    pub fn context_settings(&self) -> ContextSettings {
        let validation_layers = self
            .debug
            .layers
            .iter()
            .filter_map(|name| match CString::new(name.as_str()) {
                Ok(name) => Some(name),
                Err(_) => {
                    log::warn!("Ignoring layer name with interior NUL: {:?}", name);
                    None
                }
            })
            .collect();

        ContextSettings {
            application_name: self.graphics.application_name.clone(),
            enable_diagnostics: self.debug.validation_layers,
            validation_layers,
            print_capabilities: self.debug.print_capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.window.resizable);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.debug.layers, vec!["VK_LAYER_KHRONOS_validation"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Demo"
            maximized = true

            [graphics]
            present_mode = "FIFO"

            [debug]
            validation_layers = true
            log_filter = "gpu_present=trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert!(config.window.maximized);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.debug.log_filter.as_deref(), Some("gpu_present=trace"));
        assert!(config.debug.log_file.is_none());
    }

    #[test]
    fn only_mailbox_or_fifo_are_honored() {
        let mut config = Config::default();
        for (name, expected) in [
            ("triple", vk::PresentModeKHR::MAILBOX),
            ("immediate", vk::PresentModeKHR::MAILBOX),
            ("fifo_relaxed", vk::PresentModeKHR::MAILBOX),
            ("Mailbox", vk::PresentModeKHR::MAILBOX),
            ("fifo", vk::PresentModeKHR::FIFO),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.get_present_mode(), expected, "{}", name);
        }
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("does/not/exist/config.toml").unwrap();
        assert_eq!(config.graphics.application_name, "GPU Present");
    }

    #[test]
    fn context_settings_carry_debug_section() {
        let config = Config::parse(
            r#"
            [graphics]
            application_name = "Viewer"

            [debug]
            validation_layers = true
            layers = ["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]
            print_capabilities = true
            "#,
        )
        .unwrap();

        let settings = config.context_settings();
        assert_eq!(settings.application_name, "Viewer");
        assert!(settings.enable_diagnostics);
        assert!(settings.print_capabilities);
        assert_eq!(settings.validation_layers.len(), 2);
        assert_eq!(settings.validation_layers[1].to_str().unwrap(), "VK_LAYER_LUNARG_monitor");
    }
}
