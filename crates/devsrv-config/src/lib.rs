//! Configuration management for devsrv.
//!
//! Parses `devsrv.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories. Without a config
//! file the defaults serve and watch the current directory on port 8000
//! with a one second debounce.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `server.root`
//! - `watch[].path`
//! - `watch[].cwd`
//!
//! `watch[].command` is kept verbatim and expanded by the shell that runs it.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the served root directory.
    pub root: Option<PathBuf>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Replace the configured watch list with these paths.
    pub watch_paths: Option<Vec<PathBuf>>,
    /// Override the debounce delay of every watch.
    pub delay_ms: Option<u64>,
    /// Override the build command of every watch.
    pub command: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "devsrv.toml";

/// Port used when none is configured.
const DEFAULT_PORT: u16 = 8000;

/// Debounce delay used when a watch entry does not set one.
const DEFAULT_DELAY_MS: u64 = 1000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,
    /// Watch entries as parsed from TOML (`[[watch]]` tables).
    watch: Vec<WatchConfigRaw>,

    /// Resolved root directory to serve (set after loading).
    #[serde(skip)]
    pub root: PathBuf,
    /// Resolved watch registrations (set after loading).
    #[serde(skip)]
    pub watches: Vec<WatchConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Root directory, relative to the config file.
    root: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            root: None,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Raw watch entry as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WatchConfigRaw {
    path: String,
    delay_ms: Option<u64>,
    command: Option<String>,
    cwd: Option<String>,
    ignore: Option<Vec<String>>,
}

/// Resolved watch registration with absolute paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// File or directory to watch.
    pub path: PathBuf,
    /// Debounce delay.
    pub delay: Duration,
    /// Build command to run before notifying browsers.
    pub command: Option<CommandConfig>,
    /// Ignore glob patterns (`None` keeps the server defaults).
    pub ignore: Option<Vec<String>>,
}

impl WatchConfig {
    /// Watch `path` with the default delay and no build command.
    #[must_use]
    pub fn with_defaults(path: PathBuf) -> Self {
        Self {
            path,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            command: None,
            ignore: None,
        }
    }
}

/// Build command attached to a watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandConfig {
    /// Shell command line.
    pub command: String,
    /// Working directory (defaults to the process working directory).
    pub cwd: Option<PathBuf>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`watch[0].command`").
        field: String,
        /// Error message (e.g., "${`EMCC_FLAGS`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `devsrv.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.root {
            self.root.clone_from(root);
            // The implicit watch follows the root
            if self.watch.is_empty() {
                self.watches = vec![WatchConfig::with_defaults(root.clone())];
            }
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = live_reload_enabled;
        }
        if let Some(paths) = &settings.watch_paths {
            self.watches = paths
                .iter()
                .cloned()
                .map(WatchConfig::with_defaults)
                .collect();
        }
        if let Some(delay_ms) = settings.delay_ms {
            for watch in &mut self.watches {
                watch.delay = Duration::from_millis(delay_ms);
            }
        }
        if let Some(command) = &settings.command {
            for watch in &mut self.watches {
                let cwd = watch.command.take().and_then(|c| c.cwd);
                watch.command = Some(CommandConfig {
                    command: command.clone(),
                    cwd,
                });
            }
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            live_reload: LiveReloadConfig::default(),
            watch: Vec::new(),
            root: base.to_path_buf(),
            watches: vec![WatchConfig::with_defaults(base.to_path_buf())],
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Checks that all required fields are properly set and contain valid values.
    /// Called automatically by [`Config::load`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watches()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but a
        // preview URL nobody can predict is never what the user meant
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "server.root cannot be empty".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate watch entries.
    fn validate_watches(&self) -> Result<(), ConfigError> {
        for (i, watch) in self.watches.iter().enumerate() {
            if watch.path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "watch[{i}].path cannot be empty"
                )));
            }
            if let Some(command) = &watch.command {
                require_non_empty(&command.command, &format!("watch[{i}].command"))?;
            }
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(ref root) = self.server.root {
            self.server.root = Some(expand::expand_env(root, "server.root")?);
        }

        for (i, watch) in self.watch.iter_mut().enumerate() {
            // Commands are left alone; the shell expands them when they run
            watch.path = expand::expand_env(&watch.path, &format!("watch[{i}].path"))?;
            if let Some(ref cwd) = watch.cwd {
                watch.cwd = Some(expand::expand_env(cwd, &format!("watch[{i}].cwd"))?);
            }
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    ///
    /// Validates that `cwd` is only set together with `command`.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.root = config_dir.join(self.server.root.as_deref().unwrap_or("."));

        if self.watch.is_empty() {
            self.watches = vec![WatchConfig::with_defaults(self.root.clone())];
            return Ok(());
        }

        let mut watches = Vec::with_capacity(self.watch.len());
        for (i, raw) in self.watch.iter().enumerate() {
            let command = match (&raw.command, &raw.cwd) {
                (Some(command), cwd) => Some(CommandConfig {
                    command: command.clone(),
                    cwd: cwd.as_ref().map(|d| config_dir.join(d)),
                }),
                (None, Some(_)) => {
                    return Err(ConfigError::Validation(format!(
                        "watch[{i}].cwd requires watch[{i}].command to be set"
                    )));
                }
                (None, None) => None,
            };
            watches.push(WatchConfig {
                path: config_dir.join(&raw.path),
                delay: Duration::from_millis(raw.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
                command,
                ignore: raw.ignore.clone(),
            });
        }
        self.watches = watches;

        Ok(())
    }
}
