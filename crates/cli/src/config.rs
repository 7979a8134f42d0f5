//! Configuration loading from resolve-mcp.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dispatch::{DispatchOptions, ReconnectPolicy};
use serde::Deserialize;
use session::{BindingPaths, Lookup, MODULES_VAR, SCRIPT_API_VAR, SCRIPT_LIB_VAR};

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "resolve-mcp.toml";

/// Top-level configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub resolve: ResolveConfig,
    pub session: SessionConfig,
    pub tools: ToolsConfig,
    pub journal: JournalConfig,
    pub log: LogConfig,
}

/// Where the scripting binding lives and how to run the helper.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveConfig {
    pub script_api: Option<PathBuf>,
    pub script_lib: Option<PathBuf>,
    pub modules: Option<PathBuf>,
    /// Interpreter used to run the script host.
    pub python: String,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            script_api: None,
            script_lib: None,
            modules: None,
            python: default_python().to_string(),
        }
    }
}

fn default_python() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

impl ResolveConfig {
    /// Platform defaults, then this section, then the environment.
    pub fn binding_paths(&self) -> BindingPaths {
        self.binding_paths_with(|key| std::env::var(key).ok())
    }

    /// Like [`binding_paths`](Self::binding_paths) with an explicit
    /// environment lookup.
    pub fn binding_paths_with(&self, env: impl Fn(&str) -> Option<String>) -> BindingPaths {
        let config = |key: &str| {
            let value = match key {
                SCRIPT_API_VAR => self.script_api.as_ref(),
                SCRIPT_LIB_VAR => self.script_lib.as_ref(),
                MODULES_VAR => self.modules.as_ref(),
                _ => None,
            };
            value.map(|p| p.to_string_lossy().into_owned())
        };
        let layers: [Lookup; 2] = [&config, &env];
        BindingPaths::layered(&layers)
    }
}

/// Session and delegation tuning.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub call_timeout_ms: u64,
    pub max_consecutive_timeouts: u32,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: dispatch::DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            max_consecutive_timeouts: session::DEFAULT_MAX_CONSECUTIVE_TIMEOUTS,
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl SessionConfig {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            reconnect: self.reconnect,
        }
    }
}

/// Tool catalog selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Tools left out of the catalog.
    pub disabled: Vec<String>,
}

/// Invocation journal.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub enabled: bool,
    /// Defaults to `journal.db` in the platform data directory.
    pub path: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl JournalConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs_data_dir()
                .unwrap_or_else(|| ".resolve-mcp".into())
                .join("journal.db")
        })
    }
}

/// Logging.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load an explicit path, or `resolve-mcp.toml` if present, or defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.call_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.session.max_consecutive_timeouts == 0 {
            return Err(ConfigError::Invalid(
                "session.max_consecutive_timeouts must be at least 1".into(),
            ));
        }
        if self.resolve.python.trim().is_empty() {
            return Err(ConfigError::Invalid("resolve.python must not be empty".into()));
        }
        Ok(())
    }
}

/// Per-user data directory for the journal.
pub fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library/Application Support/resolve-mcp"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("resolve-mcp"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("resolve-mcp"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.session.call_timeout_ms, 10_000);
        assert_eq!(config.session.max_consecutive_timeouts, 3);
        assert_eq!(config.session.reconnect, ReconnectPolicy::Never);
        assert!(config.tools.disabled.is_empty());
        assert!(config.journal.enabled);
        assert_eq!(config.log.filter, "info");
        assert!(!config.resolve.python.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            r#"
            [resolve]
            script_api = "/srv/resolve/api"
            python = "/usr/bin/python3.11"

            [session]
            call_timeout_ms = 2500
            max_consecutive_timeouts = 5
            reconnect = "on_unavailable"

            [tools]
            disabled = ["create_timeline"]

            [journal]
            enabled = false
            path = "/tmp/journal.db"

            [log]
            filter = "debug,session=trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolve.python, "/usr/bin/python3.11");
        assert_eq!(config.session.reconnect, ReconnectPolicy::OnUnavailable);
        assert_eq!(config.tools.disabled, ["create_timeline"]);
        assert!(!config.journal.enabled);
        assert_eq!(config.journal.resolved_path(), PathBuf::from("/tmp/journal.db"));
        assert_eq!(config.log.filter, "debug,session=trace");

        let options = config.session.dispatch_options();
        assert_eq!(options.call_timeout, Duration::from_millis(2500));
        assert_eq!(options.reconnect, ReconnectPolicy::OnUnavailable);
    }

    #[test]
    fn invalid_reconnect_policy_is_rejected() {
        let err = Config::parse("[session]\nreconnect = \"always\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("[session]\ncall_timeout = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::parse("[session]\ncall_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn config_paths_override_platform_defaults() {
        let config = Config::parse("[resolve]\nscript_api = \"/srv/resolve/api\"").unwrap();
        let paths = config.resolve.binding_paths_with(|_| None);
        assert_eq!(paths.script_api, PathBuf::from("/srv/resolve/api"));
        assert_eq!(paths.modules, PathBuf::from("/srv/resolve/api/Modules"));
        assert_eq!(paths.script_lib, BindingPaths::platform_default().script_lib);
    }

    #[test]
    fn environment_wins_over_config() {
        let config = Config::parse(
            "[resolve]\nscript_api = \"/srv/resolve/api\"\nscript_lib = \"/srv/resolve/fusionscript.so\"",
        )
        .unwrap();
        let paths = config.resolve.binding_paths_with(|key| match key {
            SCRIPT_LIB_VAR => Some("/env/fusionscript.so".to_string()),
            MODULES_VAR => Some("/env/modules".to_string()),
            _ => None,
        });
        assert_eq!(paths.script_api, PathBuf::from("/srv/resolve/api"));
        assert_eq!(paths.script_lib, PathBuf::from("/env/fusionscript.so"));
        assert_eq!(paths.modules, PathBuf::from("/env/modules"));
    }

    #[test]
    fn config_modules_survive_environment_api_override() {
        let config = Config::parse("[resolve]\nmodules = \"/cfg/mods\"").unwrap();
        let paths = config.resolve.binding_paths_with(|key| match key {
            SCRIPT_API_VAR => Some("/env/api".to_string()),
            _ => None,
        });
        assert_eq!(paths.script_api, PathBuf::from("/env/api"));
        assert_eq!(paths.modules, PathBuf::from("/cfg/mods"));
    }

    #[test]
    fn load_reads_file_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[tools]\ndisabled = [\"switch_page\"]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.tools.disabled, ["switch_page"]);

        let err = Config::discover(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
