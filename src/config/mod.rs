//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/keyterm/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::constants::{DEFAULT_SEAT, INITIAL_REPEAT_TIMEOUT_MS, REPEAT_TIMEOUT_MS, US_LAYOUT};
use crate::input::{KeymapError, LayoutId, RepeatTiming};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keyboard settings
    pub keyboard: KeyboardConfig,
    /// Input device settings
    pub input: InputConfig,
    /// Terminal settings
    pub terminal: TerminalConfig,
}

/// Keyboard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Display layout: "<layout>" or "<layout>+<variant>" (default: "us")
    pub layout: String,
    /// Key repeat delay in milliseconds (default: 250)
    pub repeat_delay: u64,
    /// Key repeat interval in milliseconds (default: 33)
    pub repeat_rate: u64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            layout: US_LAYOUT.to_string(),
            repeat_delay: INITIAL_REPEAT_TIMEOUT_MS,
            repeat_rate: REPEAT_TIMEOUT_MS,
        }
    }
}

impl KeyboardConfig {
    pub fn layout_id(&self) -> Result<LayoutId, KeymapError> {
        self.layout.parse()
    }

    pub fn repeat_timing(&self) -> RepeatTiming {
        RepeatTiming {
            delay: Duration::from_millis(self.repeat_delay),
            // A zero interval would spin the main loop
            interval: Duration::from_millis(self.repeat_rate.max(1)),
        }
    }
}

/// Input device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// libinput seat (default: "seat0")
    pub seat: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            seat: DEFAULT_SEAT.to_string(),
        }
    }
}

/// Terminal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell command (empty = $SHELL, then /bin/sh)
    pub shell: String,
    /// TERM environment variable
    pub term_env: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: String::new(),
            term_env: "xterm-256color".to_string(),
        }
    }
}

impl TerminalConfig {
    /// Shell to spawn in each pane
    pub fn shell_command(&self) -> String {
        if !self.shell.is_empty() {
            return self.shell.clone();
        }
        std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

const TEMPLATE: &str = r#"# keyterm configuration
#
# Lookup order: $KEYTERM_CONFIG, ~/.config/keyterm/config.toml,
# /etc/keyterm/config.toml. Changes to the keyboard layout are applied
# while keyterm runs.

[keyboard]
# Display layout, "<layout>" or "<layout>+<variant>" (e.g. "de+nodeadkeys").
# Control chords always use the US layout.
layout = "us"
# Milliseconds before a held key starts repeating
repeat_delay = 250
# Milliseconds between repeats
repeat_rate = 33

[input]
# libinput seat to take keyboards from
seat = "seat0"

[terminal]
# Shell to run in each pane (empty = $SHELL, then /bin/sh)
shell = ""
# TERM for spawned shells
term_env = "xterm-256color"
"#;

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/keyterm/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. KEYTERM_CONFIG environment variable
        if let Ok(path) = std::env::var("KEYTERM_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/keyterm/config.toml
        if let Some(config_path) = user_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/keyterm/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. KEYTERM_CONFIG environment variable
    /// 2. ~/.config/keyterm/config.toml (user config)
    /// 3. /etc/keyterm/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the commented template to the user config path.
    /// An existing file is only replaced with `force`.
    pub fn write_template(force: bool) -> Result<PathBuf> {
        let config_path = user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Config directory not found"))?;
        Self::write_template_to(&config_path, force)?;
        Ok(config_path)
    }

    fn write_template_to(config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        std::fs::write(config_path, TEMPLATE)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }
}

/// Config file watcher (for hot reload)
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let file_name = config_path.file_name().map(|name| name.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };

            // Editors often save by writing a temp file and renaming it
            use notify::EventKind;
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }

            let ours = event
                .paths
                .iter()
                .any(|path| path.file_name().map(|n| n.to_os_string()) == file_name);
            if ours {
                let _ = tx.send(());
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking). Drains bursts.
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Get user config file path
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keyterm").join("config.toml"))
}
